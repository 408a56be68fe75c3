//! Environment provisioning (`--install`).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info};

use crate::progress::{ProgressReporter, ProgressStage};
use crate::subprocess::run_streaming;
use crate::{ConvertError, Result};

/// Packages installed by the default provisioner, in install order.
pub const PROVISION_PACKAGES: &[&str] = &[
    "torch",
    "transformers>=4.35.0",
    "autoawq>=0.1.8",
    "huggingface_hub",
    "safetensors",
    "accelerate",
];

/// Installs the capabilities the pipeline needs.
#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
    /// Install everything, emitting `install` progress. Stops at the first
    /// package that fails.
    async fn provision(&self, reporter: &ProgressReporter) -> Result<()>;
}

/// Installs packages one at a time with `python -m pip install`.
pub struct PipProvisioner {
    interpreter: PathBuf,
    packages: Vec<String>,
}

impl PipProvisioner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self::with_packages(interpreter, PROVISION_PACKAGES.iter().map(|p| p.to_string()))
    }

    pub fn with_packages(
        interpreter: impl Into<PathBuf>,
        packages: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            packages: packages.into_iter().collect(),
        }
    }

    async fn install_one(&self, package: &str) -> Result<()> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(["-m", "pip", "install", package, "-q"]);

        let outcome = run_streaming(cmd, "pip", |_| {})
            .await
            .map_err(|e| ConvertError::ProvisionFailed {
                package: package.to_string(),
                message: e.to_string(),
            })?;
        if !outcome.success() {
            return Err(ConvertError::ProvisionFailed {
                package: package.to_string(),
                message: outcome.failure_detail("pip").trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EnvironmentProvisioner for PipProvisioner {
    async fn provision(&self, reporter: &ProgressReporter) -> Result<()> {
        let total = self.packages.len().max(1) as f32;
        reporter.emit(ProgressStage::Install, 0.0, "Installing dependencies...");

        for (i, package) in self.packages.iter().enumerate() {
            let percent = i as f32 / total * 100.0;
            reporter.emit(
                ProgressStage::Install,
                percent,
                format!("Installing {package}..."),
            );
            info!("Installing {}", package);
            if let Err(e) = self.install_one(package).await {
                error!("Failed to install {}: {}", package, e);
                return Err(e);
            }
        }

        reporter.emit(ProgressStage::Install, 100.0, "All dependencies installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CaptureBuffer;

    #[test]
    fn test_default_packages() {
        assert_eq!(PROVISION_PACKAGES.len(), 6);
        assert!(PROVISION_PACKAGES.contains(&"autoawq>=0.1.8"));
        assert!(PROVISION_PACKAGES.contains(&"transformers>=4.35.0"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_fails_first_package() {
        let capture = CaptureBuffer::new();
        let reporter = ProgressReporter::new(capture.clone());
        let provisioner = PipProvisioner::new("/nonexistent/bin/python3");

        let err = provisioner.provision(&reporter).await.unwrap_err();
        match err {
            ConvertError::ProvisionFailed { package, .. } => assert_eq!(package, "torch"),
            other => panic!("unexpected error: {other:?}"),
        }
        let events = capture.events();
        assert!(events.iter().all(|e| e.percent < 100.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sequential_progress() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let python = tmp.path().join("fake-python");
        std::fs::write(&python, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let capture = CaptureBuffer::new();
        let reporter = ProgressReporter::new(capture.clone());
        let provisioner =
            PipProvisioner::with_packages(&python, ["a".to_string(), "b".to_string()]);
        provisioner.provision(&reporter).await.unwrap();

        let percents: Vec<f32> = capture.events().iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![0.0, 0.0, 50.0, 100.0]);
        assert!(capture
            .events()
            .iter()
            .all(|e| e.stage == ProgressStage::Install));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pip_failure_carries_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let python = tmp.path().join("fake-python");
        std::fs::write(
            &python,
            "#!/bin/sh\necho 'No matching distribution found' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let reporter = ProgressReporter::new(CaptureBuffer::new());
        let err = PipProvisioner::new(&python)
            .provision(&reporter)
            .await
            .unwrap_err();
        match err {
            ConvertError::ProvisionFailed { package, message } => {
                assert_eq!(package, "torch");
                assert_eq!(message, "No matching distribution found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
