//! Mesh directory validation.
//!
//! [`DirectoryValidator::validate`] enumerates the mesh levels of a
//! configuration directory and checks each carries its input files. Any
//! mismatch fails the whole configuration; there is no partial result.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::mesh::{sort_by_mesh_name, MeshDirectory};
use crate::scan;

/// How much of a mesh directory must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Exactly one config, one mesh geometry and one restart file.
    Strict,
    /// Exactly one config file; other inputs are optional.
    #[default]
    Lenient,
}

/// File naming rules the validator checks against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRules {
    pub config_file: String,
    pub mesh_extensions: Vec<String>,
    pub restart_extensions: Vec<String>,
    /// Sub-directory names that are never mesh levels (e.g. the plot output).
    pub excluded_dirs: Vec<String>,
}

impl Default for InputRules {
    fn default() -> Self {
        Self {
            config_file: "Config.cfg".to_string(),
            mesh_extensions: vec!["su2".to_string(), "cgns".to_string()],
            restart_extensions: vec!["dat".to_string()],
            excluded_dirs: vec!["plots".to_string()],
        }
    }
}

/// Validates configuration directories against [`InputRules`].
#[derive(Debug, Clone)]
pub struct DirectoryValidator {
    mode: ValidationMode,
    rules: InputRules,
}

impl DirectoryValidator {
    pub fn new(mode: ValidationMode, rules: InputRules) -> Self {
        Self { mode, rules }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Return the mesh directories of `config_dir` in mesh order.
    pub fn validate(&self, config_dir: &Path) -> Result<Vec<MeshDirectory>, ValidationError> {
        let excluded: Vec<&str> = self.rules.excluded_dirs.iter().map(String::as_str).collect();
        let mut candidates =
            scan::mesh_candidates(config_dir, &excluded).map_err(|source| ValidationError::Io {
                path: config_dir.to_path_buf(),
                source,
            })?;

        if candidates.is_empty() {
            return Err(ValidationError::NoMeshDirectories {
                directory: config_dir.to_path_buf(),
            });
        }

        sort_by_mesh_name(&mut candidates);

        candidates
            .into_iter()
            .map(|(name, path)| self.check_mesh_dir(name, path))
            .collect()
    }

    fn check_mesh_dir(&self, name: String, path: PathBuf) -> Result<MeshDirectory, ValidationError> {
        let io_err = |source| ValidationError::Io {
            path: path.clone(),
            source,
        };

        let configs = scan::files_named(&path, &self.rules.config_file).map_err(io_err)?;
        let config_file = exactly_one(&path, "config", configs)?;
        let mut mesh = MeshDirectory::new(name, path.clone(), config_file);

        let meshes = scan::files_with_extensions(&path, &self.rules.mesh_extensions)
            .map_err(io_err)?;
        let restarts = scan::files_with_extensions(&path, &self.rules.restart_extensions)
            .map_err(io_err)?;

        match self.mode {
            ValidationMode::Strict => {
                mesh.mesh_file = Some(exactly_one(&path, "mesh", meshes)?);
                mesh.restart_file = Some(exactly_one(&path, "restart", restarts)?);
            }
            ValidationMode::Lenient => {
                mesh.mesh_file = single(meshes);
                mesh.restart_file = single(restarts);
            }
        }

        Ok(mesh)
    }
}

fn exactly_one(
    directory: &Path,
    kind: &str,
    mut found: Vec<PathBuf>,
) -> Result<PathBuf, ValidationError> {
    if found.len() == 1 {
        if let Some(path) = found.pop() {
            return Ok(path);
        }
    }
    Err(ValidationError::StructuralMismatch {
        directory: directory.to_path_buf(),
        expected_kind: kind.to_string(),
        found_count: found.len(),
    })
}

fn single(mut found: Vec<PathBuf>) -> Option<PathBuf> {
    if found.len() == 1 {
        found.pop()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_mesh(root: &Path, name: &str, files: &[&str]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), "x").unwrap();
        }
    }

    fn strict() -> DirectoryValidator {
        DirectoryValidator::new(ValidationMode::Strict, InputRules::default())
    }

    fn lenient() -> DirectoryValidator {
        DirectoryValidator::new(ValidationMode::Lenient, InputRules::default())
    }

    const COMPLETE: &[&str] = &["Config.cfg", "grid.su2", "restart.dat"];

    #[test]
    fn test_empty_config_dir_has_no_meshes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::create_dir(dir.path().join("plots")).unwrap();
        let err = strict().validate(dir.path()).unwrap_err();
        assert!(matches!(err, ValidationError::NoMeshDirectories { .. }));
    }

    #[test]
    fn test_strict_accepts_complete_meshes_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["093", "047", "185"] {
            make_mesh(dir.path(), name, COMPLETE);
        }

        let meshes = strict().validate(dir.path()).unwrap();
        let names: Vec<_> = meshes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["047", "093", "185"]);

        let first = &meshes[0];
        assert_eq!(first.config_file, dir.path().join("047/Config.cfg"));
        assert_eq!(first.mesh_file, Some(dir.path().join("047/grid.su2")));
        assert_eq!(first.restart_file, Some(dir.path().join("047/restart.dat")));
    }

    #[test]
    fn test_strict_rejects_missing_mesh_file() {
        let dir = tempfile::tempdir().unwrap();
        make_mesh(dir.path(), "047", COMPLETE);
        make_mesh(dir.path(), "093", &["Config.cfg", "restart.dat"]);

        match strict().validate(dir.path()).unwrap_err() {
            ValidationError::StructuralMismatch {
                directory,
                expected_kind,
                found_count,
            } => {
                assert_eq!(directory, dir.path().join("093"));
                assert_eq!(expected_kind, "mesh");
                assert_eq!(found_count, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_strict_rejects_duplicate_restart_files() {
        let dir = tempfile::tempdir().unwrap();
        make_mesh(
            dir.path(),
            "047",
            &["Config.cfg", "grid.su2", "restart.dat", "other.DAT"],
        );

        match strict().validate(dir.path()).unwrap_err() {
            ValidationError::StructuralMismatch {
                expected_kind,
                found_count,
                ..
            } => {
                assert_eq!(expected_kind, "restart");
                assert_eq!(found_count, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_config_fails_in_both_modes() {
        let dir = tempfile::tempdir().unwrap();
        make_mesh(dir.path(), "047", &["grid.su2", "restart.dat"]);

        for validator in [strict(), lenient()] {
            match validator.validate(dir.path()).unwrap_err() {
                ValidationError::StructuralMismatch { expected_kind, .. } => {
                    assert_eq!(expected_kind, "config")
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_lenient_only_requires_config() {
        let dir = tempfile::tempdir().unwrap();
        make_mesh(dir.path(), "MeshFine", &["Config.cfg", "a.su2", "b.su2"]);
        make_mesh(dir.path(), "2", &["Config.cfg", "grid.cgns"]);

        let meshes = lenient().validate(dir.path()).unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[0].name, "2");
        assert_eq!(meshes[0].mesh_file, Some(dir.path().join("2/grid.cgns")));
        assert_eq!(meshes[1].name, "MeshFine");
        assert!(meshes[1].mesh_file.is_none());
        assert!(meshes[1].restart_file.is_none());
    }

    #[test]
    fn test_unreadable_config_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = strict().validate(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ValidationError::Io { .. }));
    }
}
