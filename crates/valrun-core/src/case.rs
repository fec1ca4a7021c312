//! Validation case identity and on-disk layout.
//!
//! A validation case lives at
//! `<root>/<category>/<case_code>/<turbulence_model>/<configuration>/`, with
//! one sub-directory per mesh refinement level below it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SetupError;

/// Identifies one configuration run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationCaseId {
    pub category: String,
    pub case_code: String,
    pub turbulence_model: String,
    pub configuration: String,
}

impl ValidationCaseId {
    pub fn new(
        category: impl Into<String>,
        case_code: impl Into<String>,
        turbulence_model: impl Into<String>,
        configuration: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            case_code: case_code.into(),
            turbulence_model: turbulence_model.into(),
            configuration: configuration.into(),
        }
    }
}

impl fmt::Display for ValidationCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.category, self.case_code, self.turbulence_model, self.configuration
        )
    }
}

/// Which configurations of a model directory to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationSelector {
    Named(String),
    All,
}

impl ConfigurationSelector {
    /// Parse a CLI value; `all` in any case selects every configuration.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            ConfigurationSelector::All
        } else {
            ConfigurationSelector::Named(value.to_string())
        }
    }

    /// Where results for `case` go under `base`. Running every configuration
    /// gives each one its own sub-directory; a named run writes to `base`.
    pub fn output_dir(&self, base: &Path, case: &ValidationCaseId) -> PathBuf {
        match self {
            ConfigurationSelector::All => base.join(&case.configuration),
            ConfigurationSelector::Named(_) => base.to_path_buf(),
        }
    }
}

/// Computes canonical locations of validation case directories.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_dir(&self, category: &str, case_code: &str, model: &str) -> PathBuf {
        self.root.join(category).join(case_code).join(model)
    }

    pub fn config_dir(&self, case: &ValidationCaseId) -> PathBuf {
        self.model_dir(&case.category, &case.case_code, &case.turbulence_model)
            .join(&case.configuration)
    }

    /// Expand a selector into the case ids to run, checking that the
    /// directories exist.
    pub fn resolve_configurations(
        &self,
        category: &str,
        case_code: &str,
        model: &str,
        selector: &ConfigurationSelector,
    ) -> Result<Vec<ValidationCaseId>, SetupError> {
        let model_dir = self.model_dir(category, case_code, model);
        if !model_dir.is_dir() {
            return Err(SetupError::ModelDirectoryMissing(model_dir));
        }

        match selector {
            ConfigurationSelector::Named(name) => {
                let case = ValidationCaseId::new(category, case_code, model, name.as_str());
                let dir = self.config_dir(&case);
                if !dir.is_dir() {
                    return Err(SetupError::ConfigurationMissing(dir));
                }
                Ok(vec![case])
            }
            ConfigurationSelector::All => {
                let mut names = Vec::new();
                for entry in std::fs::read_dir(&model_dir)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_dir() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.to_ascii_lowercase().starts_with("configuration") {
                        names.push(name);
                    }
                }
                if names.is_empty() {
                    return Err(SetupError::NoConfigurations(model_dir));
                }
                names.sort();
                Ok(names
                    .into_iter()
                    .map(|name| ValidationCaseId::new(category, case_code, model, name))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_config_dir_layout() {
        let resolver = PathResolver::new("ValidationCases");
        let case = ValidationCaseId::new("Basic", "2DML", "SA", "Configuration1");
        assert_eq!(
            resolver.config_dir(&case),
            PathBuf::from("ValidationCases/Basic/2DML/SA/Configuration1")
        );
        assert_eq!(case.to_string(), "Basic/2DML/SA/Configuration1");
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(ConfigurationSelector::parse("ALL"), ConfigurationSelector::All);
        assert_eq!(
            ConfigurationSelector::parse("Configuration2"),
            ConfigurationSelector::Named("Configuration2".to_string())
        );
    }

    #[test]
    fn test_output_dir_per_selector() {
        let case = ValidationCaseId::new("Basic", "2DML", "SA", "Configuration2");
        let base = Path::new("results");
        assert_eq!(
            ConfigurationSelector::All.output_dir(base, &case),
            PathBuf::from("results/Configuration2")
        );
        assert_eq!(
            ConfigurationSelector::Named("Configuration2".to_string()).output_dir(base, &case),
            PathBuf::from("results")
        );
    }

    #[test]
    fn test_resolve_all_configurations() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("Basic/2DML/SST");
        fs::create_dir_all(model.join("Configuration2")).unwrap();
        fs::create_dir_all(model.join("configuration1")).unwrap();
        fs::create_dir_all(model.join("notes")).unwrap();
        fs::write(model.join("Configuration3"), "not a dir").unwrap();

        let resolver = PathResolver::new(dir.path());
        let cases = resolver
            .resolve_configurations("Basic", "2DML", "SST", &ConfigurationSelector::All)
            .unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.configuration.as_str()).collect();
        assert_eq!(names, vec!["Configuration2", "configuration1"]);
    }

    #[test]
    fn test_resolve_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(dir.path());
        let err = resolver
            .resolve_configurations("Basic", "2DML", "SA", &ConfigurationSelector::All)
            .unwrap_err();
        assert!(matches!(err, SetupError::ModelDirectoryMissing(_)));
    }

    #[test]
    fn test_resolve_named_missing_configuration() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Basic/2DML/SA")).unwrap();
        let resolver = PathResolver::new(dir.path());
        let err = resolver
            .resolve_configurations(
                "Basic",
                "2DML",
                "SA",
                &ConfigurationSelector::Named("Configuration9".to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, SetupError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_resolve_all_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Basic/2DML/SA/other")).unwrap();
        let resolver = PathResolver::new(dir.path());
        let err = resolver
            .resolve_configurations("Basic", "2DML", "SA", &ConfigurationSelector::All)
            .unwrap_err();
        assert!(matches!(err, SetupError::NoConfigurations(_)));
    }
}
