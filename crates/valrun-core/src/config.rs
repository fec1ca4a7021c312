//! Runtime settings.
//!
//! Settings come from an optional TOML file; every field has a default so an
//! empty file (or no file) is valid. The CLI applies its flags on top.
//!
//! ```toml
//! [solver]
//! binary = "SU2_CFD"
//! timeout_secs = 3600
//!
//! [batch]
//! failure_policy = "abort_on_first_failure"
//! max_workers = 2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collect::CollectRules;
use crate::error::ConfigError;
use crate::policy::{FailurePolicy, PlotTriggerPolicy};
use crate::validate::{InputRules, ValidationMode};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Solver executable, resolved on `PATH` when not absolute.
    pub binary: String,
    /// Configuration file expected in each mesh directory.
    pub config_file: String,
    pub timeout_secs: u64,
    /// Extensions that count as solver output.
    pub output_extensions: Vec<String>,
    /// Per-mesh log written after every run.
    pub log_file_name: String,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            binary: "SU2_CFD".to_string(),
            config_file: "Config.cfg".to_string(),
            timeout_secs: 3600,
            output_extensions: strings(&["vtu", "vtk", "csv"]),
            log_file_name: "valrun_solver.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub mode: ValidationMode,
    pub mesh_extensions: Vec<String>,
    pub restart_extensions: Vec<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            mode: ValidationMode::default(),
            mesh_extensions: strings(&["su2", "cgns"]),
            restart_extensions: strings(&["dat"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub failure_policy: FailurePolicy,
    /// Mesh runs per wave; 1 runs meshes one after another.
    pub max_workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_workers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    pub interpreter: String,
    /// Plot program, relative to the configuration directory.
    pub entry_point: String,
    pub trigger: PlotTriggerPolicy,
    pub timeout_secs: u64,
    pub image_extensions: Vec<String>,
    /// Directory the plot program writes into, relative to the configuration
    /// directory.
    pub output_dir: String,
    pub log_file_name: String,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            entry_point: "Plot.py".to_string(),
            trigger: PlotTriggerPolicy::default(),
            timeout_secs: 1800,
            image_extensions: strings(&["png", "pdf"]),
            output_dir: "plots".to_string(),
            log_file_name: "plot.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectSettings {
    pub extensions: Vec<String>,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            extensions: CollectRules::default().extensions,
        }
    }
}

/// All valrun settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValrunSettings {
    pub solver: SolverSettings,
    pub validation: ValidationSettings,
    pub batch: BatchSettings,
    pub plot: PlotSettings,
    pub collect: CollectSettings,
}

impl ValrunSettings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load and check settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text, path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solver.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("solver.binary must not be empty".into()));
        }
        if self.solver.config_file.trim().is_empty() {
            return Err(ConfigError::Invalid("solver.config_file must not be empty".into()));
        }
        if self.solver.timeout_secs == 0 {
            return Err(ConfigError::Invalid("solver.timeout_secs must be positive".into()));
        }
        if self.plot.timeout_secs == 0 {
            return Err(ConfigError::Invalid("plot.timeout_secs must be positive".into()));
        }
        if self.batch.max_workers == 0 {
            return Err(ConfigError::Invalid("batch.max_workers must be at least 1".into()));
        }
        for (field, list) in [
            ("solver.output_extensions", &self.solver.output_extensions),
            ("plot.image_extensions", &self.plot.image_extensions),
            ("collect.extensions", &self.collect.extensions),
        ] {
            if list.is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if self.validation.mode == ValidationMode::Strict
            && (self.validation.mesh_extensions.is_empty()
                || self.validation.restart_extensions.is_empty())
        {
            return Err(ConfigError::Invalid(
                "strict validation needs mesh and restart extensions".into(),
            ));
        }
        Ok(())
    }

    pub fn input_rules(&self) -> InputRules {
        InputRules {
            config_file: self.solver.config_file.clone(),
            mesh_extensions: self.validation.mesh_extensions.clone(),
            restart_extensions: self.validation.restart_extensions.clone(),
            excluded_dirs: vec![self.plot.output_dir.clone()],
        }
    }

    pub fn collect_rules(&self) -> CollectRules {
        CollectRules {
            extensions: self.collect.extensions.clone(),
            plot_dir: self.plot.output_dir.clone(),
        }
    }
}
