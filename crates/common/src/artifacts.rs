//! Artifact persistence for one document set
//!
//! A build writes four files under a base name derived from the document set:
//! - `{base}.hnsw` - the vector index (bincode)
//! - `{base}_metadata.json` - chunk records, position-aligned with the index
//! - `{base}_by_doi.json` - chunks grouped by document identifier (derived view)
//! - `{base}_manifest.json` - embedding model, dimension, and build time
//!
//! Saving stages every file as a `.tmp` sibling first. The old index is
//! removed before any staged file is renamed into place and the new index is
//! renamed last, so an interrupted rebuild leaves either the previous set or
//! no index at all, never new metadata beside an old index.
//!
//! Loading checks that index length equals metadata length; any mismatch is
//! reported as a corrupt index rather than silently misaligning results.

use crate::errors::{AppError, Result};
use crate::index::{HnswIndex, HnswParams, VectorIndex};
use crate::models::{ChunkRecord, UNKNOWN_DOI};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// File locations for one artifact set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
    pub by_doi: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    pub fn new(directory: &Path, base: &str) -> Self {
        Self {
            index: directory.join(format!("{}.hnsw", base)),
            metadata: directory.join(format!("{}_metadata.json", base)),
            by_doi: directory.join(format!("{}_by_doi.json", base)),
            manifest: directory.join(format!("{}_manifest.json", base)),
        }
    }
}

/// Build facts recorded next to the index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactManifest {
    pub base_name: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub document_count: usize,
    pub index_params: HnswParams,
    pub built_at: DateTime<Utc>,
}

/// Metadata view used inside the by-DOI grouping (no chunk text)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupedChunkMetadata {
    #[serde(rename = "paperTitle")]
    pub paper_title: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "yearPublished", default)]
    pub year_published: i32,
    pub chunk_index_in_doc: usize,
    #[serde(rename = "chunkId", default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupedChunk {
    pub chunk: String,
    pub metadata: GroupedChunkMetadata,
}

/// Group chunk records by document identifier, preserving chunk order
pub fn group_by_doi(metadata: &[ChunkRecord]) -> BTreeMap<String, Vec<GroupedChunk>> {
    let mut grouped: BTreeMap<String, Vec<GroupedChunk>> = BTreeMap::new();
    for record in metadata {
        let key = record.doi().unwrap_or(UNKNOWN_DOI).to_string();
        grouped.entry(key).or_default().push(GroupedChunk {
            chunk: record.text.clone(),
            metadata: GroupedChunkMetadata {
                paper_title: record.paper_title.clone(),
                doi: record.doi.clone(),
                source: record.source.clone(),
                year_published: record.year_published,
                chunk_index_in_doc: record.chunk_index_in_doc,
                chunk_id: record.chunk_id,
            },
        });
    }
    grouped
}

/// Index plus its position-aligned metadata
#[derive(Debug)]
pub struct ArtifactSet {
    pub index: HnswIndex,
    pub metadata: Vec<ChunkRecord>,
    pub manifest: Option<ArtifactManifest>,
}

impl ArtifactSet {
    pub fn new(index: HnswIndex, metadata: Vec<ChunkRecord>, manifest: Option<ArtifactManifest>) -> Result<Self> {
        check_alignment(index.len(), metadata.len())?;
        Ok(Self {
            index,
            metadata,
            manifest,
        })
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Write all artifact files
    pub fn save(&self, paths: &ArtifactPaths) -> Result<()> {
        if let Some(parent) = paths.index.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::artifact(parent, e))?;
        }

        let mut staged = vec![
            (staging_path(&paths.metadata), paths.metadata.clone()),
            (staging_path(&paths.by_doi), paths.by_doi.clone()),
        ];
        if self.manifest.is_some() {
            staged.push((staging_path(&paths.manifest), paths.manifest.clone()));
        }
        // Index last: its presence marks a complete set
        staged.push((staging_path(&paths.index), paths.index.clone()));

        if let Err(e) = self.stage(&staged) {
            discard(&staged);
            return Err(e);
        }

        let cleared = remove_if_exists(&paths.index).and_then(|()| match self.manifest {
            Some(_) => Ok(()),
            None => remove_if_exists(&paths.manifest),
        });
        if let Err(e) = cleared {
            discard(&staged);
            return Err(e);
        }
        for (tmp, target) in &staged {
            if let Err(e) = std::fs::rename(tmp, target) {
                discard(&staged);
                return Err(AppError::artifact(target, e));
            }
        }

        info!(
            index = %paths.index.display(),
            chunks = self.metadata.len(),
            "Artifacts saved"
        );
        Ok(())
    }

    /// Write every file to its staging path, in `staged` order
    fn stage(&self, staged: &[(PathBuf, PathBuf)]) -> Result<()> {
        write_json(&staged[0].0, &self.metadata)?;
        write_json(&staged[1].0, &group_by_doi(&self.metadata))?;
        if let Some(manifest) = &self.manifest {
            write_json(&staged[2].0, manifest)?;
        }
        let (index_tmp, _) = &staged[staged.len() - 1];
        self.index.write_to(index_tmp)
    }

    /// Load index, metadata, and (if present) the manifest
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        let index = HnswIndex::load(&paths.index)?;

        if !paths.metadata.exists() {
            return Err(AppError::IndexNotFound {
                path: paths.metadata.display().to_string(),
            });
        }
        let metadata: Vec<ChunkRecord> = read_json(&paths.metadata)?;

        let manifest = if paths.manifest.exists() {
            Some(read_json::<ArtifactManifest>(&paths.manifest)?)
        } else {
            warn!(path = %paths.manifest.display(), "Artifact manifest missing, embedding model cannot be verified");
            None
        };

        Self::new(index, metadata, manifest)
    }
}

fn check_alignment(index_len: usize, metadata_len: usize) -> Result<()> {
    if index_len != metadata_len {
        return Err(AppError::IndexCorrupt {
            message: format!(
                "index holds {} vectors but metadata lists {} chunks",
                index_len, metadata_len
            ),
        });
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(AppError::artifact(path, e)),
        _ => Ok(()),
    }
}

/// Best-effort removal of leftover staging files
fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if std::fs::remove_file(tmp).is_ok() {
            warn!(path = %tmp.display(), "Removed staged artifact after failed save");
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| AppError::artifact(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| AppError::artifact(path, e))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| AppError::artifact(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| AppError::artifact(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn record(doi: Option<&str>, ordinal: usize, text: &str) -> ChunkRecord {
        let doc = Document {
            doi: doi.map(str::to_string),
            title: Some(format!("Paper {}", doi.unwrap_or("none"))),
            full_text: Some(text.to_string()),
            ..Default::default()
        };
        ChunkRecord::from_document(&doc, 0, ordinal, text.to_string())
    }

    fn sample_set() -> ArtifactSet {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]];
        let index = HnswIndex::build(&vectors, &HnswParams::default()).unwrap();
        let metadata = vec![
            record(Some("10.1/a"), 0, "alpha one"),
            record(Some("10.1/a"), 1, "alpha two"),
            record(None, 0, "orphan"),
        ];
        let manifest = ArtifactManifest {
            base_name: "set".into(),
            embedding_model: "feature-hash".into(),
            dimension: 2,
            chunk_count: 3,
            document_count: 2,
            index_params: HnswParams::default(),
            built_at: Utc::now(),
        };
        ArtifactSet::new(index, metadata, Some(manifest)).unwrap()
    }

    #[test]
    fn test_paths_from_base_name() {
        let paths = ArtifactPaths::new(Path::new("/data"), "graph nets");
        assert_eq!(paths.index, PathBuf::from("/data/graph nets.hnsw"));
        assert_eq!(paths.metadata, PathBuf::from("/data/graph nets_metadata.json"));
        assert_eq!(paths.by_doi, PathBuf::from("/data/graph nets_by_doi.json"));
    }

    #[test]
    fn test_round_trip_keeps_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "set");
        let set = sample_set();
        set.save(&paths).unwrap();

        let loaded = ArtifactSet::load(&paths).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.metadata, set.metadata);
        assert_eq!(loaded.manifest.as_ref().map(|m| m.chunk_count), Some(3));

        // Position i in the index still describes metadata entry i
        for (i, _) in loaded.metadata.iter().enumerate() {
            let vector = loaded.index.vector(i).unwrap().to_vec();
            let hit = loaded.index.search(&vector, 1).unwrap();
            assert_eq!(hit[0].position, i);
        }
    }

    #[test]
    fn test_by_doi_grouping_excludes_text() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "set");
        sample_set().save(&paths).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.by_doi).unwrap()).unwrap();
        let alpha = raw["10.1/a"].as_array().unwrap();
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[0]["chunk"], "alpha one");
        assert_eq!(alpha[1]["metadata"]["chunk_index_in_doc"], 1);
        assert!(alpha[0]["metadata"].get("text").is_none());
        assert_eq!(raw[UNKNOWN_DOI].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_length_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "set");
        let set = sample_set();
        set.save(&paths).unwrap();

        write_json(&paths.metadata, &set.metadata[..2]).unwrap();
        assert!(matches!(
            ArtifactSet::load(&paths),
            Err(AppError::IndexCorrupt { .. })
        ));
    }

    fn relabeled(set: &ArtifactSet, prefix: &str) -> ArtifactSet {
        let metadata = set
            .metadata
            .iter()
            .map(|r| ChunkRecord {
                text: format!("{} {}", prefix, r.text),
                ..r.clone()
            })
            .collect();
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.5, 0.5]];
        let index = HnswIndex::build(&vectors, &HnswParams::default()).unwrap();
        ArtifactSet::new(index, metadata, None).unwrap()
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "set");
        let original = sample_set();
        tokio_test::assert_ok!(original.save(&paths));

        // A directory where the staged index should go makes its write fail
        std::fs::create_dir(dir.path().join("set.hnsw.tmp")).unwrap();
        let rebuilt = relabeled(&original, "new");
        tokio_test::assert_err!(rebuilt.save(&paths));

        let loaded = ArtifactSet::load(&paths).unwrap();
        assert_eq!(loaded.metadata, original.metadata);
        assert_eq!(loaded.index.vector(0), original.index.vector(0));
        assert!(loaded.manifest.is_some());
        assert!(!dir.path().join("set_metadata.json.tmp").exists());
        assert!(!dir.path().join("set_by_doi.json.tmp").exists());
    }

    #[test]
    fn test_rebuild_replaces_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "set");
        sample_set().save(&paths).unwrap();

        let rebuilt = relabeled(&sample_set(), "new");
        tokio_test::assert_ok!(rebuilt.save(&paths));

        let loaded = ArtifactSet::load(&paths).unwrap();
        assert_eq!(loaded.metadata, rebuilt.metadata);
        assert_eq!(loaded.index.vector(0), Some(&[0.0, 1.0][..]));
        // The stale manifest of the previous build does not survive
        assert!(loaded.manifest.is_none());
        assert!(!dir.path().join("set.hnsw.tmp").exists());
    }

    #[test]
    fn test_missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "absent");
        assert!(matches!(
            ArtifactSet::load(&paths),
            Err(AppError::IndexNotFound { .. })
        ));
    }
}
