//! GGUF quantization types understood by llama.cpp.
//!
//! The pipeline always produces an F16 GGUF; the requested type is recorded
//! on the request and validated against this catalog so that an obvious typo
//! is surfaced in the logs before a long conversion starts.

use serde::Serialize;

/// One entry of the quantization catalog.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuantOption {
    pub name: &'static str,
    pub description: &'static str,
    pub bits_per_weight: f32,
    pub recommended: bool,
}

const fn option(
    name: &'static str,
    description: &'static str,
    bits_per_weight: f32,
    recommended: bool,
) -> QuantOption {
    QuantOption {
        name,
        description,
        bits_per_weight,
        recommended,
    }
}

#[rustfmt::skip]
const QUANT_OPTIONS: &[QuantOption] = &[
    option("Q2_K", "2-bit K-quant (smallest, lowest quality)", 3.35, false),
    option("Q3_K_S", "3-bit K-quant small", 3.50, false),
    option("Q3_K_M", "3-bit K-quant medium", 3.91, false),
    option("Q3_K_L", "3-bit K-quant large", 4.27, false),
    option("Q4_0", "4-bit legacy quant", 4.55, false),
    option("Q4_K_S", "4-bit K-quant small", 4.58, false),
    option("Q4_K_M", "4-bit K-quant medium, best balance of size and quality", 4.85, true),
    option("Q5_0", "5-bit legacy quant", 5.54, false),
    option("Q5_K_S", "5-bit K-quant small", 5.54, false),
    option("Q5_K_M", "5-bit K-quant medium", 5.69, false),
    option("Q6_K", "6-bit K-quant (high quality, larger)", 6.56, false),
    option("Q8_0", "8-bit (near-lossless)", 8.50, false),
    option("BF16", "Brain float 16-bit (no quality loss)", 16.0, false),
    option("F16", "Half-precision float 16-bit (no quality loss)", 16.0, false),
];

/// Every known quantization type, smallest first.
pub fn quant_options() -> &'static [QuantOption] {
    QUANT_OPTIONS
}

/// Case-insensitive lookup in the catalog.
pub fn find_quant(name: &str) -> Option<&'static QuantOption> {
    QUANT_OPTIONS
        .iter()
        .find(|q| q.name.eq_ignore_ascii_case(name))
}

pub fn is_known_quant(name: &str) -> bool {
    find_quant(name).is_some()
}
