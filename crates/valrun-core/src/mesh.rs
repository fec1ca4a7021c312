//! Mesh directory identity and ordering.

use std::cmp::Ordering;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sort key derived from a mesh directory name.
///
/// Purely numeric or digit-prefixed names sort by their leading number and
/// come first; every other name sorts lexically after them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshSortKey {
    Numeric(u64, String),
    Lexical(String),
}

impl MeshSortKey {
    pub fn from_name(name: &str) -> Self {
        let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
        match digits.parse::<u64>() {
            Ok(value) => MeshSortKey::Numeric(value, name.to_string()),
            Err(_) => MeshSortKey::Lexical(name.to_string()),
        }
    }
}

impl Ord for MeshSortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MeshSortKey::Numeric(a, an), MeshSortKey::Numeric(b, bn)) => {
                a.cmp(b).then_with(|| an.cmp(bn))
            }
            (MeshSortKey::Numeric(..), MeshSortKey::Lexical(_)) => Ordering::Less,
            (MeshSortKey::Lexical(_), MeshSortKey::Numeric(..)) => Ordering::Greater,
            (MeshSortKey::Lexical(a), MeshSortKey::Lexical(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for MeshSortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A validated mesh refinement level. Read-only after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshDirectory {
    /// Directory name, used as the mesh identity in outcomes and output trees.
    pub name: String,

    pub path: PathBuf,

    pub sort_key: MeshSortKey,

    /// Solver configuration file; always present.
    pub config_file: PathBuf,

    /// Mesh geometry file; required under strict validation.
    pub mesh_file: Option<PathBuf>,

    /// Restart/reference data file; required under strict validation.
    pub restart_file: Option<PathBuf>,
}

impl MeshDirectory {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, config_file: PathBuf) -> Self {
        let name = name.into();
        Self {
            sort_key: MeshSortKey::from_name(&name),
            name,
            path: path.into(),
            config_file,
            mesh_file: None,
            restart_file: None,
        }
    }
}

/// Sort `(name, _)` pairs into mesh order in place.
pub fn sort_by_mesh_name<T>(items: &mut [(String, T)]) {
    items.sort_by_cached_key(|(name, _)| MeshSortKey::from_name(name));
}
