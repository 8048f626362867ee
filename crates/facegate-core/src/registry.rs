//! Member registry: display name → face embedding, persisted as one JSON file.
//!
//! The file is read once at startup and rewritten wholesale after every
//! registration. Members keep their insertion order; re-registering a name
//! replaces its embedding in place.

use crate::types::Embedding;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const REGISTRY_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write registry {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("registry {path} is corrupt: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("registry {path} has unsupported format version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("cannot derive a member name from {0}")]
    InvalidName(String),
    #[error(
        "embedding for {name} is not comparable with registered members \
         (got {got_dim}-dim {got_model:?}, registry holds {want_dim}-dim {want_model:?})"
    )]
    IncompatibleEmbedding {
        name: String,
        got_dim: usize,
        got_model: Option<String>,
        want_dim: usize,
        want_model: Option<String>,
    },
}

/// A registered person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub embedding: Embedding,
    pub registered_at: DateTime<Utc>,
    /// Image the embedding was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    members: IndexMap<String, Member>,
}

/// In-memory member registry bound to its backing file.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    members: IndexMap<String, Member>,
}

impl Registry {
    /// Load the registry at `path`. A missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no registry file, starting empty");
                return Ok(Self { path, members: IndexMap::new() });
            }
            Err(source) => return Err(RegistryError::Read { path, source }),
        };

        let file: RegistryFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(source) => return Err(RegistryError::Corrupt { path, source }),
        };
        if file.version != REGISTRY_FORMAT_VERSION {
            return Err(RegistryError::UnsupportedVersion { path, version: file.version });
        }

        tracing::info!(path = %path.display(), members = file.members.len(), "loaded registry");
        Ok(Self { path, members: file.members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Members in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(name, member)| (name.as_str(), member))
    }

    /// Name/embedding pairs in registration order, ready for a `Matcher`.
    pub fn gallery(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.iter().map(|(name, member)| (name, &member.embedding))
    }

    /// Insert or overwrite `name`. Returns the previous member, if any.
    ///
    /// Rejects embeddings that could not be compared against the members
    /// already registered.
    pub fn insert(
        &mut self,
        name: &str,
        embedding: Embedding,
        source: Option<PathBuf>,
    ) -> Result<Option<Member>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        let reference = self
            .members
            .iter()
            .find(|(existing, _)| existing.as_str() != name)
            .map(|(_, member)| &member.embedding);
        if let Some(reference) = reference {
            if !reference.is_comparable(&embedding) {
                return Err(RegistryError::IncompatibleEmbedding {
                    name: name.to_string(),
                    got_dim: embedding.dim(),
                    got_model: embedding.model_version,
                    want_dim: reference.dim(),
                    want_model: reference.model_version.clone(),
                });
            }
        }

        let member = Member { embedding, registered_at: Utc::now(), source };
        Ok(self.members.insert(name.to_string(), member))
    }

    /// Write the whole registry to its file, replacing the previous contents.
    pub fn save(&self) -> Result<(), RegistryError> {
        let write_err = |source| RegistryError::Write { path: self.path.clone(), source };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let file = RegistryFile {
            version: REGISTRY_FORMAT_VERSION,
            members: self.members.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| write_err(e.into()))?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut out = fs::File::create(&tmp).map_err(write_err)?;
            out.write_all(&json).map_err(write_err)?;
            out.sync_all().map_err(write_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        tracing::debug!(path = %self.path.display(), members = self.members.len(), "saved registry");
        Ok(())
    }
}

/// Derive a member name from an image path: the file name up to its first
/// dot (`photos/alice.2024.jpg` → `alice`).
pub fn member_name_from_path(path: &Path) -> Result<String, RegistryError> {
    let invalid = || RegistryError::InvalidName(path.display().to_string());
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let stem = file_name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        return Err(invalid());
    }
    Ok(stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec(), Some("w600k_r50".into()))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(dir.path().join("members.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_roundtrip_preserves_members_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("members.json");

        let mut registry = Registry::load(&path).unwrap();
        registry.insert("zoe", emb(&[0.1, 0.2, 0.3]), Some("zoe.jpg".into())).unwrap();
        registry.insert("adam", emb(&[-0.5, 0.25, 1e-7]), None).unwrap();
        registry.save().unwrap();

        let reloaded = Registry::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let names: Vec<&str> = reloaded.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zoe", "adam"]);
        for (name, member) in registry.iter() {
            assert_eq!(reloaded.get(name), Some(member));
        }
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("m.json")).unwrap();
        registry.insert("a", emb(&[1.0, 0.0]), None).unwrap();
        registry.insert("b", emb(&[0.0, 1.0]), None).unwrap();

        let previous = registry.insert("a", emb(&[0.5, 0.5]), None).unwrap();
        assert_eq!(previous.map(|m| m.embedding), Some(emb(&[1.0, 0.0])));
        assert_eq!(registry.len(), 2);
        let gallery: Vec<(&str, &Embedding)> = registry.gallery().collect();
        assert_eq!(gallery[0], ("a", &emb(&[0.5, 0.5])));
        assert_eq!(gallery[1].0, "b");
    }

    #[test]
    fn test_rejects_incomparable_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("m.json")).unwrap();
        registry.insert("a", emb(&[1.0, 0.0]), None).unwrap();

        let err = registry.insert("b", emb(&[1.0, 0.0, 0.0]), None).unwrap_err();
        assert!(matches!(err, RegistryError::IncompatibleEmbedding { got_dim: 3, want_dim: 2, .. }));

        let other_model = Embedding::new(vec![1.0, 0.0], Some("facenet".into()));
        assert!(registry.insert("b", other_model, None).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sole_member_may_change_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("m.json")).unwrap();
        registry.insert("a", emb(&[1.0, 0.0]), None).unwrap();
        registry.insert("a", emb(&[1.0, 0.0, 0.0]), None).unwrap();
        assert_eq!(registry.get("a").map(|m| m.embedding.dim()), Some(3));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(Registry::load(&path), Err(RegistryError::Corrupt { .. })));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        fs::write(&path, br#"{"version": 7, "members": {}}"#).unwrap();
        assert!(matches!(
            Registry::load(&path),
            Err(RegistryError::UnsupportedVersion { version: 7, .. })
        ));
    }

    #[test]
    fn test_member_name_from_path() {
        let name = |p: &str| member_name_from_path(Path::new(p)).ok();
        assert_eq!(name("photos/alice.jpg").as_deref(), Some("alice"));
        assert_eq!(name("bob.smith.2024.png").as_deref(), Some("bob"));
        assert_eq!(name("carol").as_deref(), Some("carol"));
        assert_eq!(name(".hidden.jpg"), None);
        assert_eq!(name("/"), None);
    }
}
