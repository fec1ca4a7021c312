//! Result collection into an output tree.
//!
//! The collector works from what is on disk, not from in-memory run state,
//! so it can be pointed at a tree left behind by a crashed or aborted run.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::CollectionError;
use crate::mesh::sort_by_mesh_name;
use crate::scan;

/// Name of the manifest written at the root of the output tree.
pub const MANIFEST_FILE: &str = "manifest.json";

/// What the collector copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRules {
    /// Extensions of per-mesh result files.
    pub extensions: Vec<String>,
    /// Plot output directory, relative to the configuration directory.
    pub plot_dir: String,
}

impl Default for CollectRules {
    fn default() -> Self {
        Self {
            extensions: ["vtu", "vtk", "csv", "dat", "log"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            plot_dir: "plots".to_string(),
        }
    }
}

/// Files copied by one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionManifest {
    /// Mesh name to the file names copied into `<output>/<mesh>/`. Every mesh
    /// directory found on disk has an entry, possibly empty.
    pub meshes: BTreeMap<String, BTreeSet<String>>,

    pub plots_copied: bool,

    /// Paths copied into `<output>/<plot_dir>/`, relative to it.
    pub plot_files: BTreeSet<String>,

    /// SHA-256 over every copied file name and its bytes.
    pub digest: String,
}

impl CollectionManifest {
    /// Total number of files copied.
    pub fn file_count(&self) -> usize {
        self.meshes.values().map(BTreeSet::len).sum::<usize>() + self.plot_files.len()
    }
}

/// Copies solver and plot artifacts into an output tree.
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    rules: CollectRules,
}

impl ResultCollector {
    pub fn new(rules: CollectRules) -> Self {
        Self { rules }
    }

    /// Collect artifacts from `config_dir` into `output_dir` and write
    /// [`MANIFEST_FILE`] there.
    pub fn collect(
        &self,
        config_dir: &Path,
        output_dir: &Path,
    ) -> Result<CollectionManifest, CollectionError> {
        fs::create_dir_all(output_dir).map_err(|e| CollectionError::fs(output_dir, e))?;

        let mut hasher = Sha256::new();
        let mut manifest = CollectionManifest::default();

        let excluded = [self.rules.plot_dir.as_str()];
        let mut meshes = scan::mesh_candidates(config_dir, &excluded)
            .map_err(|e| CollectionError::fs(config_dir, e))?;
        let output_canonical = fs::canonicalize(output_dir).ok();
        meshes.retain(|(_, path)| fs::canonicalize(path).ok() != output_canonical);
        sort_by_mesh_name(&mut meshes);

        for (name, mesh_path) in meshes {
            let files = scan::files_with_extensions(&mesh_path, &self.rules.extensions)
                .map_err(|e| CollectionError::fs(&mesh_path, e))?;

            let mut copied = BTreeSet::new();
            if !files.is_empty() {
                let dest_dir = output_dir.join(&name);
                fs::create_dir_all(&dest_dir).map_err(|e| CollectionError::fs(&dest_dir, e))?;

                for src in files {
                    let Some(file_name) = src.file_name() else {
                        continue;
                    };
                    let file_name = file_name.to_string_lossy().into_owned();
                    copy_hashed(&src, &dest_dir.join(&file_name), &mut hasher, &name, &file_name)?;
                    copied.insert(file_name);
                }
            }
            manifest.meshes.insert(name, copied);
        }

        let plot_src = config_dir.join(&self.rules.plot_dir);
        if plot_src.is_dir() {
            let plot_dest = output_dir.join(&self.rules.plot_dir);
            manifest.plot_files = copy_plot_tree(&plot_src, &plot_dest, &mut hasher)?;
            manifest.plots_copied = true;
        }

        manifest.digest = hex::encode(hasher.finalize());
        write_manifest(output_dir, &manifest)?;
        Ok(manifest)
    }
}

/// Replace `dest` with a full copy of `src`.
fn copy_plot_tree(
    src: &Path,
    dest: &Path,
    hasher: &mut Sha256,
) -> Result<BTreeSet<String>, CollectionError> {
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| CollectionError::fs(dest, e))?;
    }
    fs::create_dir_all(dest).map_err(|e| CollectionError::fs(dest, e))?;

    let mut copied = BTreeSet::new();
    // WalkDir sorted by file name keeps the digest stable across runs.
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            CollectionError::fs(path, io::Error::from(e))
        })?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let target = dest.join(&rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| CollectionError::fs(&target, e))?;
        } else if entry.file_type().is_file() {
            let rel_name = rel_to_string(&rel);
            copy_hashed(entry.path(), &target, hasher, "plots", &rel_name)?;
            copied.insert(rel_name);
        }
    }
    Ok(copied)
}

fn rel_to_string(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy `src` to `dest`, feeding the entry label and bytes into `hasher`.
fn copy_hashed(
    src: &Path,
    dest: &Path,
    hasher: &mut Sha256,
    group: &str,
    name: &str,
) -> Result<(), CollectionError> {
    fs::copy(src, dest).map_err(|e| CollectionError::fs(src, e))?;

    hasher.update(group.as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    let mut file = File::open(dest).map_err(|e| CollectionError::fs(dest, e))?;
    io::copy(&mut file, hasher).map_err(|e| CollectionError::fs(dest, e))?;
    Ok(())
}

/// Atomic write: temp file in the output directory, then rename.
fn write_manifest(output_dir: &Path, manifest: &CollectionManifest) -> Result<(), CollectionError> {
    let path = output_dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| CollectionError::fs(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut tmp = NamedTempFile::new_in(output_dir).map_err(|e| CollectionError::fs(output_dir, e))?;
    tmp.write_all(&json).map_err(|e| CollectionError::fs(tmp.path(), e))?;
    tmp.persist(&path)
        .map_err(|e| CollectionError::fs(&path, e.error))?;
    Ok(())
}

/// Read a manifest previously written by [`ResultCollector::collect`].
pub fn read_manifest(output_dir: &Path) -> Result<CollectionManifest, CollectionError> {
    let path = output_dir.join(MANIFEST_FILE);
    let bytes = fs::read(&path).map_err(|e| CollectionError::fs(&path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CollectionError::fs(&path, io::Error::new(io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn sample_tree(root: &Path) {
        write(&root.join("047/Config.cfg"), "cfg");
        write(&root.join("047/vol_solution.vtu"), "vtu-047");
        write(&root.join("047/history.csv"), "csv-047");
        write(&root.join("093/Config.cfg"), "cfg");
        write(&root.join("093/valrun_solver.log"), "timed out");
        fs::create_dir_all(root.join("185")).unwrap();
        write(&root.join("plots/profile_x1mm.png"), "png");
        write(&root.join("plots/extra/detail.pdf"), "pdf");
        fs::create_dir_all(root.join(".cache")).unwrap();
    }

    #[test]
    fn test_collect_copies_result_files_per_mesh() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        sample_tree(src.path());

        let manifest = ResultCollector::default()
            .collect(src.path(), &out.path().join("results"))
            .unwrap();

        let names: Vec<_> = manifest.meshes.keys().cloned().collect();
        assert_eq!(names, vec!["047", "093", "185"]);
        assert_eq!(
            manifest.meshes["047"],
            BTreeSet::from(["history.csv".to_string(), "vol_solution.vtu".to_string()])
        );
        assert_eq!(
            manifest.meshes["093"],
            BTreeSet::from(["valrun_solver.log".to_string()])
        );
        assert!(manifest.meshes["185"].is_empty());
        assert!(!out.path().join("results/047/Config.cfg").exists());
        assert_eq!(
            fs::read_to_string(out.path().join("results/047/vol_solution.vtu")).unwrap(),
            "vtu-047"
        );

        assert!(manifest.plots_copied);
        assert_eq!(
            manifest.plot_files,
            BTreeSet::from([
                "extra/detail.pdf".to_string(),
                "profile_x1mm.png".to_string()
            ])
        );
        assert_eq!(manifest.file_count(), 5);
        assert!(out.path().join("results").join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_collect_twice_is_idempotent() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        sample_tree(src.path());

        let collector = ResultCollector::default();
        let first = collector.collect(src.path(), out.path()).unwrap();
        let second = collector.collect(src.path(), out.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(read_manifest(out.path()).unwrap(), second);
    }

    #[test]
    fn test_plot_directory_is_replaced_not_merged() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        sample_tree(src.path());
        write(&out.path().join("plots/stale.png"), "old");

        let manifest = ResultCollector::default()
            .collect(src.path(), out.path())
            .unwrap();
        assert!(!out.path().join("plots/stale.png").exists());
        assert!(out.path().join("plots/profile_x1mm.png").exists());
        assert!(!manifest.plot_files.contains("stale.png"));
    }

    #[test]
    fn test_digest_tracks_content() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        sample_tree(src.path());

        let collector = ResultCollector::default();
        let before = collector.collect(src.path(), out.path()).unwrap();
        write(&src.path().join("047/history.csv"), "changed");
        let after = collector.collect(src.path(), out.path()).unwrap();
        assert_eq!(before.meshes, after.meshes);
        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn test_output_inside_config_dir_is_not_a_mesh() {
        let src = tempfile::tempdir().unwrap();
        sample_tree(src.path());
        let out = src.path().join("collected");

        ResultCollector::default().collect(src.path(), &out).unwrap();
        let manifest = ResultCollector::default().collect(src.path(), &out).unwrap();
        assert!(!manifest.meshes.contains_key("collected"));
    }

    #[test]
    fn test_missing_config_dir_is_filesystem_error() {
        let out = tempfile::tempdir().unwrap();
        let err = ResultCollector::default()
            .collect(&out.path().join("missing"), &out.path().join("results"))
            .unwrap_err();
        assert!(matches!(err, CollectionError::Filesystem { .. }));
    }
}
