//! Mode dispatch: inspect, provision or convert, and map the outcome to an
//! exit status.
//!
//! Every failure is reported as exactly one `error` progress event, written
//! here and nowhere else.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::PythonBackend;
use crate::config::Settings;
use crate::inspect::{DependencyInspector, PythonProbe};
use crate::locator::{ConverterLocator, HttpFetcher};
use crate::naming::{is_awq_repo, suggest_gguf_alternative};
use crate::pipeline::{ConversionPipeline, ConversionRequest};
use crate::progress::ProgressReporter;
use crate::provision::{EnvironmentProvisioner, PipProvisioner};
use crate::quant::is_known_quant;
use crate::{ConvertError, Result};

/// Exit status of a successful mode.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status of any failure.
pub const EXIT_FAILURE: i32 = 1;

/// What the process was asked to do.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Print the dependency report.
    Inspect,
    /// Install the missing capabilities.
    Provision,
    /// Convert a hub repository to a GGUF file.
    Convert(ConvertArgs),
}

#[derive(Debug, Clone)]
pub struct ConvertArgs {
    pub repo_id: String,
    pub output: Option<PathBuf>,
    pub quant: String,
    pub use_accelerator: bool,
}

/// Final payload written after a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub success: bool,
    pub output: String,
}

impl SuccessPayload {
    pub fn new(output: &std::path::Path) -> Self {
        Self {
            success: true,
            output: output.display().to_string(),
        }
    }
}

pub struct Dispatcher {
    reporter: Arc<ProgressReporter>,
    inspector: DependencyInspector,
    provisioner: Arc<dyn EnvironmentProvisioner>,
    pipeline: ConversionPipeline,
}

impl Dispatcher {
    pub fn new(
        reporter: Arc<ProgressReporter>,
        inspector: DependencyInspector,
        provisioner: Arc<dyn EnvironmentProvisioner>,
        pipeline: ConversionPipeline,
    ) -> Self {
        Self {
            reporter,
            inspector,
            provisioner,
            pipeline,
        }
    }

    /// Wire the Python-backed collaborators from `settings`.
    pub fn with_defaults(settings: &Settings, reporter: Arc<ProgressReporter>) -> Result<Self> {
        let backend = Arc::new(PythonBackend::new(
            settings.interpreter.clone(),
            settings.scripts_dir.clone(),
        ));
        let locator = ConverterLocator::new(
            settings.converter_search_paths.clone(),
            settings.converter_url.clone(),
            settings.converter_fetch_timeout,
            Arc::new(HttpFetcher::new()?),
        );
        let inspector = DependencyInspector::new(
            Arc::new(PythonProbe::new(settings.interpreter.clone())),
            settings.min_interpreter.clone(),
        );
        let pipeline = ConversionPipeline::new(
            settings,
            backend.clone(),
            backend,
            locator,
            reporter.clone(),
        );
        let provisioner = Arc::new(PipProvisioner::new(settings.interpreter.clone()));

        Ok(Self::new(reporter, inspector, provisioner, pipeline))
    }

    /// Wire the default collaborators and run `mode`. A wiring failure is
    /// reported like any other failure.
    pub async fn run_with_defaults(
        settings: &Settings,
        reporter: Arc<ProgressReporter>,
        mode: Mode,
    ) -> i32 {
        match Self::with_defaults(settings, reporter.clone()) {
            Ok(dispatcher) => dispatcher.run(mode).await,
            Err(e) => report_startup_failure(&reporter, &e),
        }
    }

    /// Run `mode` to completion and return the process exit status.
    pub async fn run(&self, mode: Mode) -> i32 {
        match mode {
            Mode::Inspect => self.inspect().await,
            Mode::Provision => self.provision().await,
            Mode::Convert(args) => self.convert(args).await,
        }
    }

    /// Always succeeds; an unusable environment is described, not reported.
    async fn inspect(&self) -> i32 {
        let report = self.inspector.inspect().await;
        if !report.interpreter_ok {
            warn!("Interpreter missing or older than required");
        }
        self.reporter.write_json(&report.to_wire());
        EXIT_SUCCESS
    }

    async fn provision(&self) -> i32 {
        if let Err(e) = self.inspector.check_interpreter().await {
            return self.fail("Unsupported Python interpreter", &e);
        }
        match self.provisioner.provision(&self.reporter).await {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => self.fail("Dependency installation failed", &e),
        }
    }

    async fn convert(&self, args: ConvertArgs) -> i32 {
        let Some(output) = args.output.filter(|p| !p.as_os_str().is_empty()) else {
            return self.fail(
                "Specify an --output path",
                &ConvertError::Config {
                    message: "--output is required with --convert".to_string(),
                },
            );
        };

        if let Err(e) = self.inspector.check_interpreter().await {
            return self.fail("Unsupported Python interpreter", &e);
        }

        let report = self.inspector.inspect().await;
        if !report.all_installed() {
            let missing = report.missing();
            error!("Missing dependencies: {}", missing.join(", "));
            self.reporter.emit_error(
                format!("Not installed: {}", missing.join(", ")),
                "Run with --install to set up the environment",
            );
            return EXIT_FAILURE;
        }

        if is_awq_repo(&args.repo_id) {
            if let Some(alternative) = suggest_gguf_alternative(&args.repo_id) {
                info!("A prebuilt GGUF may already exist: {}", alternative);
            }
        } else {
            warn!("{} does not look like an AWQ repository", args.repo_id);
        }
        if !is_known_quant(&args.quant) {
            warn!("Unknown quantization type {}", args.quant);
        }

        let request = ConversionRequest {
            source_repo_id: args.repo_id,
            output_path: output,
            quantization_type: args.quant,
            use_accelerator: args.use_accelerator,
        };
        match self.pipeline.run(&request, &report).await {
            Ok(path) => {
                self.reporter.write_json(&SuccessPayload::new(&path));
                EXIT_SUCCESS
            }
            Err(e) => self.fail("Conversion failed", &e),
        }
    }

    fn fail(&self, message: &str, err: &ConvertError) -> i32 {
        if err.is_environment() {
            warn!("{}: {}", message, err);
        } else {
            error!("{}: {}", message, err);
        }
        self.reporter.emit_error(message, err.detail());
        err.exit_code()
    }
}

fn report_startup_failure(reporter: &ProgressReporter, err: &ConvertError) -> i32 {
    error!("Failed to initialize: {}", err);
    reporter.emit_error("Failed to initialize", err.detail());
    err.exit_code()
}
