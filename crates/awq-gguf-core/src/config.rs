//! Centralized configuration for the converter.
//!
//! Constants live on unit structs grouped by concern. `Settings` is the
//! injectable runtime configuration built from them; tests replace search
//! paths, interpreter and version gate through it.

use std::path::PathBuf;
use std::time::Duration;

use semver::Version;

/// Conversion pipeline constants.
pub struct PipelineConfig;

impl PipelineConfig {
    /// Prefix of the per-conversion scratch directory under the temp dir.
    pub const WORKSPACE_PREFIX: &'static str = "awq_convert_";
    /// Subdirectory of the workspace holding the downloaded snapshot.
    pub const SNAPSHOT_DIR_NAME: &'static str = "awq_model";
    /// Subdirectory of the workspace holding the FP16 shard set.
    pub const FP16_DIR_NAME: &'static str = "fp16_model";
    /// Maximum size of one FP16 weight shard.
    pub const MAX_SHARD_SIZE: &'static str = "10GB";
    /// GGUF output type requested from the external converter.
    pub const CONVERTER_OUTTYPE: &'static str = "f16";
    /// Default quantization type recorded on a request.
    pub const DEFAULT_QUANT: &'static str = "Q4_K_M";
    /// Minimum supported interpreter version (major, minor).
    pub const MIN_INTERPRETER: (u64, u64) = (3, 9);
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const CONVERTER_URL: &'static str =
        "https://raw.githubusercontent.com/ggerganov/llama.cpp/master/convert_hf_to_gguf.py";
    pub const CONVERTER_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
    pub const USER_AGENT: &'static str = "awq-gguf/0.1";
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
}

/// Directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const CONVERTER_SCRIPT_NAME: &'static str = "convert_hf_to_gguf.py";
    pub const CONVERTER_DATA_DIR_NAME: &'static str = "llama.cpp";
    pub const SYSTEM_SHARE_DIR: &'static str = "/usr/local/share/llama.cpp";
    pub const APP_DATA_DIR_NAME: &'static str = "awq-gguf";
    pub const SCRIPTS_DIR_NAME: &'static str = "scripts";
}

/// Interpreter command candidates tried in order when none is configured.
pub const INTERPRETER_CANDIDATES: &[&str] = &[
    "python3",
    "python",
    "python3.12",
    "python3.11",
    "python3.10",
    "python3.9",
];

/// Runtime configuration shared by every component.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Interpreter used for helper scripts and the external converter.
    pub interpreter: PathBuf,
    /// Minimum interpreter version accepted by the version gate.
    pub min_interpreter: Version,
    /// Ordered converter search paths; the first also receives a fetched copy.
    pub converter_search_paths: Vec<PathBuf>,
    pub converter_url: String,
    pub converter_fetch_timeout: Duration,
    /// Parent of per-conversion workspaces.
    pub scratch_root: PathBuf,
    pub max_shard_size: String,
    /// Where embedded helper scripts are deployed.
    pub scripts_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let (major, minor) = PipelineConfig::MIN_INTERPRETER;
        Self {
            interpreter: PathBuf::from(INTERPRETER_CANDIDATES[0]),
            min_interpreter: Version::new(major, minor, 0),
            converter_search_paths: default_converter_search_paths(),
            converter_url: NetworkConfig::CONVERTER_URL.to_string(),
            converter_fetch_timeout: NetworkConfig::CONVERTER_FETCH_TIMEOUT,
            scratch_root: std::env::temp_dir(),
            max_shard_size: PipelineConfig::MAX_SHARD_SIZE.to_string(),
            scripts_dir: app_data_dir().join(PathsConfig::SCRIPTS_DIR_NAME),
        }
    }
}

impl Settings {
    /// Replace the interpreter command.
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }
}

/// User-local data directory, falling back to `~/.local/share`.
fn user_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
}

/// Per-user data directory of this tool.
pub fn app_data_dir() -> PathBuf {
    user_data_dir().join(PathsConfig::APP_DATA_DIR_NAME)
}

/// Well-known converter locations in search order.
///
/// 1. user-local data dir
/// 2. system-wide share dir
/// 3. next to the running executable
pub fn default_converter_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        user_data_dir()
            .join(PathsConfig::CONVERTER_DATA_DIR_NAME)
            .join(PathsConfig::CONVERTER_SCRIPT_NAME),
        PathBuf::from(PathsConfig::SYSTEM_SHARE_DIR).join(PathsConfig::CONVERTER_SCRIPT_NAME),
    ];
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
    {
        paths.push(exe_dir.join(PathsConfig::CONVERTER_SCRIPT_NAME));
    }
    paths
}
