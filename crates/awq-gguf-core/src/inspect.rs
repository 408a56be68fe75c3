//! Dependency inspection: which capabilities are installed, and is there an
//! accelerator.
//!
//! Every probe is best-effort. A capability that cannot be imported is
//! recorded as absent; an accelerator probe that fails is "unavailable".
//! Only the interpreter version gate returns an error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::interpreter;
use crate::Result;

/// A capability the conversion pipeline needs from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    TensorRuntime,
    ModelFramework,
    QuantizationLibrary,
    HubClient,
    SerializationLibrary,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::TensorRuntime,
        Capability::ModelFramework,
        Capability::QuantizationLibrary,
        Capability::HubClient,
        Capability::SerializationLibrary,
    ];

    /// Package name reported to the host.
    pub fn package_name(&self) -> &'static str {
        match self {
            Capability::TensorRuntime => "torch",
            Capability::ModelFramework => "transformers",
            Capability::QuantizationLibrary => "autoawq",
            Capability::HubClient => "huggingface_hub",
            Capability::SerializationLibrary => "safetensors",
        }
    }

    /// Interpreter snippet printing the installed version.
    fn probe_snippet(&self) -> &'static str {
        match self {
            Capability::TensorRuntime => "import torch; print(torch.__version__)",
            Capability::ModelFramework => "import transformers; print(transformers.__version__)",
            Capability::QuantizationLibrary => {
                "import awq; print(getattr(awq, '__version__', 'installed'))"
            }
            Capability::HubClient => {
                "import huggingface_hub; print(huggingface_hub.__version__)"
            }
            Capability::SerializationLibrary => {
                "import safetensors; print(getattr(safetensors, '__version__', 'installed'))"
            }
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.package_name())
    }
}

/// Presence and version of one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityStatus {
    pub present: bool,
    pub version: Option<String>,
}

impl CapabilityStatus {
    fn from_version(version: Option<String>) -> Self {
        Self {
            present: version.is_some(),
            version,
        }
    }
}

/// Accelerator availability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorStatus {
    pub available: bool,
    pub device: Option<String>,
}

/// Result of one inspection pass. Computed fresh on every call.
#[derive(Debug, Clone)]
pub struct DependencyReport {
    pub interpreter_version: Option<Version>,
    pub interpreter_ok: bool,
    pub capabilities: BTreeMap<Capability, CapabilityStatus>,
    pub accelerator: AcceleratorStatus,
}

impl DependencyReport {
    pub fn all_installed(&self) -> bool {
        Capability::ALL.iter().all(|c| {
            self.capabilities
                .get(c)
                .map(|status| status.present)
                .unwrap_or(false)
        })
    }

    /// Package names of absent capabilities, in canonical order.
    pub fn missing(&self) -> Vec<&'static str> {
        Capability::ALL
            .iter()
            .filter(|c| !self.capabilities.get(*c).is_some_and(|s| s.present))
            .map(|c| c.package_name())
            .collect()
    }

    /// Wire form printed by `--check`.
    pub fn to_wire(&self) -> InspectReport {
        InspectReport {
            python_version: self.interpreter_version.as_ref().map(|v| v.to_string()),
            python_ok: self.interpreter_ok,
            dependencies: Capability::ALL
                .iter()
                .map(|c| {
                    let version = self.capabilities.get(c).and_then(|s| s.version.clone());
                    (c.package_name().to_string(), version)
                })
                .collect(),
            all_installed: self.all_installed(),
            cuda_available: self.accelerator.available,
            cuda_device: self.accelerator.device.clone(),
        }
    }
}

/// JSON report printed by the inspect mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectReport {
    pub python_version: Option<String>,
    pub python_ok: bool,
    pub dependencies: BTreeMap<String, Option<String>>,
    pub all_installed: bool,
    pub cuda_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuda_device: Option<String>,
}

/// Source of environment facts.
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Human-readable name of the probed interpreter, used in error messages.
    fn label(&self) -> String {
        "python3".to_string()
    }

    async fn interpreter_version(&self) -> Option<Version>;

    /// Installed version of `capability`, or `None` when absent.
    async fn capability_version(&self, capability: Capability) -> Option<String>;

    async fn accelerator(&self) -> AcceleratorStatus;
}

/// Probes a Python interpreter by running short import snippets.
pub struct PythonProbe {
    interpreter: PathBuf,
}

impl PythonProbe {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    async fn run_snippet(&self, snippet: &str) -> Option<String> {
        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(snippet)
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            debug!(
                "Probe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        last_output_line(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Last non-empty line of a snippet's stdout. Imports may print banners
/// before the answer.
fn last_output_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
}

const ACCELERATOR_SNIPPET: &str = "\
import torch
if torch.cuda.is_available():
    print('1\\t' + torch.cuda.get_device_name(0))
else:
    print('0')
";

/// Parse the accelerator snippet's output.
fn parse_accelerator_output(output: &str) -> AcceleratorStatus {
    let mut parts = output.trim().splitn(2, '\t');
    match parts.next() {
        Some("1") => AcceleratorStatus {
            available: true,
            device: parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        },
        _ => AcceleratorStatus::default(),
    }
}

#[async_trait]
impl EnvironmentProbe for PythonProbe {
    fn label(&self) -> String {
        self.interpreter.display().to_string()
    }

    async fn interpreter_version(&self) -> Option<Version> {
        interpreter::interpreter_version(&self.interpreter).await
    }

    async fn capability_version(&self, capability: Capability) -> Option<String> {
        self.run_snippet(capability.probe_snippet()).await
    }

    async fn accelerator(&self) -> AcceleratorStatus {
        self.run_snippet(ACCELERATOR_SNIPPET)
            .await
            .map(|out| parse_accelerator_output(&out))
            .unwrap_or_default()
    }
}

/// Runs one inspection pass over an `EnvironmentProbe`.
pub struct DependencyInspector {
    probe: Arc<dyn EnvironmentProbe>,
    min_interpreter: Version,
}

impl DependencyInspector {
    pub fn new(probe: Arc<dyn EnvironmentProbe>, min_interpreter: Version) -> Self {
        Self {
            probe,
            min_interpreter,
        }
    }

    /// Version gate for the modes that run the interpreter.
    pub async fn check_interpreter(&self) -> Result<Version> {
        let found = self.probe.interpreter_version().await;
        interpreter::check_minimum(found, &self.probe.label(), &self.min_interpreter)
    }

    pub async fn inspect(&self) -> DependencyReport {
        let interpreter_version = self.probe.interpreter_version().await;
        let interpreter_ok = interpreter_version
            .as_ref()
            .is_some_and(|v| interpreter::meets_minimum(v, &self.min_interpreter));

        let mut capabilities = BTreeMap::new();
        for capability in Capability::ALL {
            let version = self.probe.capability_version(capability).await;
            debug!("{}: {:?}", capability, version);
            capabilities.insert(capability, CapabilityStatus::from_version(version));
        }

        let accelerator = self.probe.accelerator().await;

        DependencyReport {
            interpreter_version,
            interpreter_ok,
            capabilities,
            accelerator,
        }
    }
}
