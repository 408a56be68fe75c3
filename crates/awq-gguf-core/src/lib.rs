//! AWQ GGUF Core - turns AWQ-quantized hub checkpoints into GGUF files.
//!
//! The library inspects a Python environment for the capabilities the
//! conversion needs, provisions missing ones, and drives the conversion
//! pipeline (download, dequantize to FP16, format-convert with llama.cpp's
//! converter) while streaming line-delimited JSON progress events.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use awq_gguf_core::{ConvertArgs, Dispatcher, Mode, ProgressReporter, Settings};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> awq_gguf_core::Result<()> {
//!     let reporter = Arc::new(ProgressReporter::stdout());
//!     let dispatcher = Dispatcher::with_defaults(&Settings::default(), reporter)?;
//!
//!     let code = dispatcher
//!         .run(Mode::Convert(ConvertArgs {
//!             repo_id: "Qwen/Qwen2.5-7B-Instruct-AWQ".into(),
//!             output: Some("/models/qwen2.5-7b.gguf".into()),
//!             quant: "Q4_K_M".into(),
//!             use_accelerator: true,
//!         }))
//!         .await;
//!     std::process::exit(code);
//! }
//! ```

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inspect;
pub mod interpreter;
pub mod locator;
pub mod naming;
pub mod pipeline;
pub mod progress;
pub mod provision;
pub mod quant;
pub mod scripts;
pub mod subprocess;
pub mod workspace;

// Re-export commonly used types
pub use backend::{CheckpointRuntime, DequantizeStep, Device, PythonBackend, SnapshotSource};
pub use config::Settings;
pub use dispatch::{ConvertArgs, Dispatcher, Mode, SuccessPayload};
pub use error::{ConvertError, Result};
pub use inspect::{
    AcceleratorStatus, Capability, DependencyInspector, DependencyReport, EnvironmentProbe,
    InspectReport, PythonProbe,
};
pub use locator::{ConverterFetcher, ConverterHandle, ConverterLocator, HttpFetcher};
pub use pipeline::{ConversionPipeline, ConversionRequest};
pub use progress::{CaptureBuffer, ProgressEvent, ProgressReporter, ProgressStage};
pub use provision::{EnvironmentProvisioner, PipProvisioner};
