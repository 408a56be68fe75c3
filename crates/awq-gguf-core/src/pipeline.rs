//! AWQ checkpoint to GGUF conversion pipeline.
//!
//! Stages run strictly in order inside one scratch workspace:
//!
//! 1. acquire the snapshot from the hub (`download` 0..30)
//! 2. load and dequantize to an FP16 shard set (`convert` 30..70)
//! 3. format-convert with the external converter, or export an FP16
//!    checkpoint next to the requested output when no converter is
//!    available (`convert` 75..80)
//! 4. remove the workspace (`convert` 95) and report `complete` 100
//!
//! The workspace is removed on every exit path. The fallback branch always
//! ends in `ConvertError::FallbackIncomplete`; it never reports success.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::artifacts;
use crate::backend::{CheckpointRuntime, DequantizeStep, Device, SnapshotSource};
use crate::config::{PathsConfig, PipelineConfig, Settings};
use crate::error::IoResultExt;
use crate::inspect::DependencyReport;
use crate::locator::{ConverterHandle, ConverterLocator};
use crate::naming::fallback_checkpoint_path;
use crate::progress::{ProgressReporter, ProgressStage};
use crate::subprocess::run_streaming;
use crate::workspace::WorkspaceDir;
use crate::{ConvertError, Result};

/// One conversion job.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Hub repository id, `org/name`.
    pub source_repo_id: String,
    /// Destination GGUF file.
    pub output_path: PathBuf,
    /// Requested quantization type. Recorded only; the produced GGUF is F16.
    pub quantization_type: String,
    pub use_accelerator: bool,
}

impl ConversionRequest {
    pub fn new(source_repo_id: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            source_repo_id: source_repo_id.into(),
            output_path: output_path.into(),
            quantization_type: PipelineConfig::DEFAULT_QUANT.to_string(),
            use_accelerator: true,
        }
    }
}

pub struct ConversionPipeline {
    hub: Arc<dyn SnapshotSource>,
    runtime: Arc<dyn CheckpointRuntime>,
    locator: ConverterLocator,
    reporter: Arc<ProgressReporter>,
    interpreter: PathBuf,
    scratch_root: PathBuf,
    max_shard_size: String,
}

impl ConversionPipeline {
    pub fn new(
        settings: &Settings,
        hub: Arc<dyn SnapshotSource>,
        runtime: Arc<dyn CheckpointRuntime>,
        locator: ConverterLocator,
        reporter: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            hub,
            runtime,
            locator,
            reporter,
            interpreter: settings.interpreter.clone(),
            scratch_root: settings.scratch_root.clone(),
            max_shard_size: settings.max_shard_size.clone(),
        }
    }

    /// Run one conversion and return the GGUF path.
    ///
    /// Refuses to start unless `report` shows every capability installed.
    pub async fn run(
        &self,
        request: &ConversionRequest,
        report: &DependencyReport,
    ) -> Result<PathBuf> {
        if !report.all_installed() {
            return Err(ConvertError::MissingDependencies {
                missing: report.missing().iter().map(|m| m.to_string()).collect(),
            });
        }

        self.reporter.emit(
            ProgressStage::Download,
            0.0,
            format!("Loading model {}...", request.source_repo_id),
        );

        let workspace = WorkspaceDir::create(&self.scratch_root)?;
        info!(
            "Converting {} in workspace {}",
            request.source_repo_id,
            workspace.path().display()
        );

        match self
            .run_stages(request, report.accelerator.available, &workspace)
            .await
        {
            Ok(output) => {
                self.reporter.emit(
                    ProgressStage::Convert,
                    95.0,
                    "Cleaning up temporary files...",
                );
                workspace.remove();
                self.reporter.emit(
                    ProgressStage::Complete,
                    100.0,
                    format!("Done! Model saved: {}", output.display()),
                );
                Ok(output)
            }
            Err(e) => {
                debug!("Conversion stopped ({}), removing workspace", e);
                workspace.remove();
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &ConversionRequest,
        accelerator_available: bool,
        workspace: &WorkspaceDir,
    ) -> Result<PathBuf> {
        // Acquisition
        self.reporter
            .emit(ProgressStage::Download, 10.0, "Downloading AWQ model...");
        let snapshot = self
            .hub
            .fetch_snapshot(&request.source_repo_id, &workspace.snapshot_dir())
            .await?;
        self.reporter.emit(
            ProgressStage::Download,
            30.0,
            "Model downloaded, loading weights...",
        );

        // Dequantization
        let fp16_dir = workspace.fp16_dir();
        self.dequantize(&snapshot, &fp16_dir, request.use_accelerator, accelerator_available)
            .await?;
        self.reporter.emit(
            ProgressStage::Convert,
            70.0,
            "FP16 model created, converting to GGUF...",
        );

        // Format conversion
        info!(
            "Requested quantization {}; writing {} GGUF",
            request.quantization_type,
            PipelineConfig::CONVERTER_OUTTYPE
        );
        match self.locator.locate().await {
            ConverterHandle::Located(script) => {
                self.reporter.emit(
                    ProgressStage::Convert,
                    75.0,
                    "Converting with llama.cpp...",
                );
                self.convert_external(&script, &fp16_dir, &request.output_path)
                    .await?;
                Ok(request.output_path.clone())
            }
            ConverterHandle::NotFound => {
                self.reporter
                    .emit(ProgressStage::Convert, 75.0, "Using built-in conversion...");
                Err(self.convert_fallback(&fp16_dir, &request.output_path).await)
            }
        }
    }

    async fn dequantize(
        &self,
        snapshot: &Path,
        fp16_dir: &Path,
        use_accelerator: bool,
        accelerator_available: bool,
    ) -> Result<()> {
        self.reporter
            .emit(ProgressStage::Convert, 30.0, "Loading AWQ model...");
        let device = Device::select(use_accelerator, accelerator_available);
        if use_accelerator && !accelerator_available {
            warn!("Accelerator requested but unavailable, loading on {}", device);
        }
        self.reporter.emit(
            ProgressStage::Convert,
            35.0,
            format!("Using device: {device}"),
        );

        // Copied before the runtime writes, so its own config.json wins.
        let copied = artifacts::copy_auxiliary_artifacts(snapshot, fp16_dir)?;
        debug!("Auxiliary artifacts: {}", copied.join(", "));

        let reporter = &self.reporter;
        let mut on_step = |step: DequantizeStep| match step {
            DequantizeStep::Loaded => {
                reporter.emit(ProgressStage::Convert, 50.0, "Dequantizing AWQ -> FP16...")
            }
            DequantizeStep::Saving => {
                reporter.emit(ProgressStage::Convert, 60.0, "Saving FP16 weights...")
            }
            DequantizeStep::Released => debug!("Dequantize runtime released model memory"),
        };
        self.runtime
            .dequantize(snapshot, device, fp16_dir, &self.max_shard_size, &mut on_step)
            .await?;

        let (shards, bytes) = artifacts::shard_summary(fp16_dir);
        info!("FP16 shard set: {} shards, {} bytes", shards, bytes);
        Ok(())
    }

    /// Run the external converter on the FP16 shard set.
    async fn convert_external(&self, script: &Path, fp16_dir: &Path, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .arg(fp16_dir)
            .arg("--outfile")
            .arg(output)
            .arg("--outtype")
            .arg(PipelineConfig::CONVERTER_OUTTYPE);

        let outcome = run_streaming(cmd, PathsConfig::CONVERTER_SCRIPT_NAME, |_| {}).await?;
        if !outcome.success() {
            return Err(ConvertError::ConverterFailed {
                stderr: outcome.failure_detail(PathsConfig::CONVERTER_SCRIPT_NAME),
            });
        }
        info!("GGUF written to {}", output.display());
        Ok(())
    }

    /// Export a complete FP16 checkpoint next to `output`. Always returns the
    /// error that ends the run.
    async fn convert_fallback(&self, fp16_dir: &Path, output: &Path) -> ConvertError {
        let dest = fallback_checkpoint_path(output);
        self.reporter.emit(
            ProgressStage::Convert,
            80.0,
            format!("Saving FP16 checkpoint to {}...", dest.display()),
        );

        if let Err(e) = self.runtime.export_checkpoint(fp16_dir, &dest).await {
            return e;
        }
        // Tokenizer files travel with the checkpoint.
        if let Err(e) = artifacts::copy_auxiliary_artifacts(fp16_dir, &dest) {
            return e;
        }
        warn!(
            "No GGUF converter available; FP16 checkpoint left at {}",
            dest.display()
        );
        ConvertError::FallbackIncomplete { saved_to: dest }
    }
}
