//! Seams to the model hub and the tensor runtime.
//!
//! The pipeline only talks to `SnapshotSource` and `CheckpointRuntime`.
//! `PythonBackend` implements both by running the embedded helper scripts in
//! a Python interpreter; each script runs in its own process, so all model
//! and accelerator memory is returned to the OS when it exits.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::scripts::{self, AWQ_DEQUANTIZE_NAME, FP16_EXPORT_NAME, HUB_SNAPSHOT_NAME};
use crate::subprocess::run_streaming;
use crate::{ConvertError, Result};

/// Compute device for loading the quantized checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Accelerator when requested and available, otherwise the default device.
    pub fn select(use_accelerator: bool, accelerator_available: bool) -> Self {
        if use_accelerator && accelerator_available {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-steps reported while dequantizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequantizeStep {
    /// Quantized checkpoint is resident on the device.
    Loaded,
    /// FP16 weights are being serialized.
    Saving,
    /// Model and device memory have been released.
    Released,
}

/// Model-hub client.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Materialize every file of `repo_id` under `dest` as regular files (no
    /// symlinks). Returns the snapshot root.
    async fn fetch_snapshot(&self, repo_id: &str, dest: &Path) -> Result<PathBuf>;
}

/// Tensor runtime able to dequantize AWQ checkpoints.
#[async_trait]
pub trait CheckpointRuntime: Send + Sync {
    /// Load `snapshot` on `device`, force FP16, write config plus a safetensors
    /// shard set (each shard at most `max_shard_size`) into `out_dir`, then
    /// release all model memory before returning.
    async fn dequantize(
        &self,
        snapshot: &Path,
        device: Device,
        out_dir: &Path,
        max_shard_size: &str,
        on_step: &mut (dyn FnMut(DequantizeStep) + Send),
    ) -> Result<()>;

    /// Save the FP16 model in `fp16_dir` as a complete checkpoint at `dest`.
    async fn export_checkpoint(&self, fp16_dir: &Path, dest: &Path) -> Result<()>;
}

/// Default backend driving the embedded Python helper scripts.
pub struct PythonBackend {
    interpreter: PathBuf,
    scripts_dir: PathBuf,
}

impl PythonBackend {
    pub fn new(interpreter: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    fn script_command(&self, name: &str) -> Result<Command> {
        scripts::ensure_scripts_deployed(&self.scripts_dir)?;
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(scripts::script_path(&self.scripts_dir, name));
        Ok(cmd)
    }
}

#[async_trait]
impl SnapshotSource for PythonBackend {
    async fn fetch_snapshot(&self, repo_id: &str, dest: &Path) -> Result<PathBuf> {
        let mut cmd = self.script_command(HUB_SNAPSHOT_NAME)?;
        cmd.arg("--repo-id").arg(repo_id).arg("--dest").arg(dest);

        let mut snapshot = None;
        let outcome = run_streaming(cmd, HUB_SNAPSHOT_NAME, |line| {
            if line.stage == "downloaded" {
                snapshot = line.path.map(PathBuf::from);
            }
        })
        .await?;

        if !outcome.success() {
            return Err(ConvertError::DownloadFailed {
                repo_id: repo_id.to_string(),
                message: outcome.failure_detail(HUB_SNAPSHOT_NAME).trim().to_string(),
            });
        }

        let snapshot = snapshot.unwrap_or_else(|| dest.to_path_buf());
        info!("Snapshot of {} at {}", repo_id, snapshot.display());
        Ok(snapshot)
    }
}

#[async_trait]
impl CheckpointRuntime for PythonBackend {
    async fn dequantize(
        &self,
        snapshot: &Path,
        device: Device,
        out_dir: &Path,
        max_shard_size: &str,
        on_step: &mut (dyn FnMut(DequantizeStep) + Send),
    ) -> Result<()> {
        let mut cmd = self.script_command(AWQ_DEQUANTIZE_NAME)?;
        cmd.arg("--model-dir")
            .arg(snapshot)
            .arg("--out-dir")
            .arg(out_dir)
            .arg("--device")
            .arg(device.as_str())
            .arg("--max-shard-size")
            .arg(max_shard_size);

        let outcome = run_streaming(cmd, AWQ_DEQUANTIZE_NAME, |line| {
            let step = match line.stage.as_str() {
                "loaded" => DequantizeStep::Loaded,
                "saving" => DequantizeStep::Saving,
                "released" => DequantizeStep::Released,
                other => {
                    debug!("Ignoring dequantize stage {}", other);
                    return;
                }
            };
            on_step(step);
        })
        .await?;

        if !outcome.success() {
            return Err(ConvertError::DequantizeFailed {
                message: outcome.failure_detail(AWQ_DEQUANTIZE_NAME),
            });
        }
        Ok(())
    }

    async fn export_checkpoint(&self, fp16_dir: &Path, dest: &Path) -> Result<()> {
        let mut cmd = self.script_command(FP16_EXPORT_NAME)?;
        cmd.arg("--model-dir").arg(fp16_dir).arg("--dest").arg(dest);

        let outcome = run_streaming(cmd, FP16_EXPORT_NAME, |_| {}).await?;
        if !outcome.success() {
            return Err(ConvertError::DequantizeFailed {
                message: outcome.failure_detail(FP16_EXPORT_NAME),
            });
        }
        Ok(())
    }
}
