//! awq-gguf - convert AWQ checkpoints from the model hub to GGUF.
//!
//! Progress and results are line-delimited JSON on stdout; diagnostics go to
//! stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use awq_gguf_core::config::PipelineConfig;
use awq_gguf_core::interpreter::find_interpreter;
use awq_gguf_core::{ConvertArgs, Dispatcher, Mode, ProgressReporter, Settings};
use clap::{ArgGroup, CommandFactory, Parser};
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "awq-gguf")]
#[command(about = "Convert AWQ-quantized models to GGUF")]
#[command(group(ArgGroup::new("mode").args(["check", "install", "convert"])))]
struct Args {
    /// Report installed dependencies as JSON
    #[arg(long)]
    check: bool,

    /// Install missing dependencies
    #[arg(long)]
    install: bool,

    /// Hub repository id of the AWQ model to convert (org/name)
    #[arg(long, value_name = "REPO_ID")]
    convert: Option<String>,

    /// Output GGUF path
    #[arg(long, value_name = "PATH", requires = "convert")]
    output: Option<PathBuf>,

    /// Quantization type to record for the conversion
    #[arg(long, default_value = PipelineConfig::DEFAULT_QUANT)]
    quant: String,

    /// Never use the GPU, even if one is available
    #[arg(long)]
    no_gpu: bool,

    /// Python interpreter to use (defaults to the first one found on PATH)
    #[arg(long, value_name = "PATH")]
    python: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn mode(&self) -> Option<Mode> {
        if self.check {
            Some(Mode::Inspect)
        } else if self.install {
            Some(Mode::Provision)
        } else {
            self.convert.as_ref().map(|repo_id| {
                Mode::Convert(ConvertArgs {
                    repo_id: repo_id.clone(),
                    output: self.output.clone(),
                    quant: self.quant.clone(),
                    use_accelerator: !self.no_gpu,
                })
            })
        }
    }
}

fn init_logging(args: &Args) {
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Stdout carries the progress protocol; logs must stay on stderr.
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if args.log_json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args);

    let Some(mode) = args.mode() else {
        Args::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let interpreter = match args.python.clone() {
        Some(path) => path,
        None => find_interpreter().await.unwrap_or_else(|e| {
            warn!("{}", e);
            PathBuf::from("python3")
        }),
    };
    debug!("Using interpreter {}", interpreter.display());

    let settings = Settings::default().with_interpreter(interpreter);
    let reporter = Arc::new(ProgressReporter::stdout());

    let code = Dispatcher::run_with_defaults(&settings, reporter, mode).await;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
