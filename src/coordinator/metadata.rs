//! Metadata store using RocksDB
//!
//! Durable owner of file, chunk and placement records. Column families:
//! - `files`:      file_id -> FileRecord
//! - `chunks`:     "{file_id}/{index:08}" -> ChunkRecord
//! - `placements`: "{chunk_id}/{node_id}" -> Placement
//!
//! Every multi-record mutation goes through a single WriteBatch, so a
//! restart sees a placement batch fully or not at all. Per-file writes
//! use optimistic versioning: callers pass the version they read, and a
//! stale write fails with `MetadataConflict` for them to re-read and
//! retry.

use crate::common::Result;
use crate::coordinator::placement::PlacementStrategy;
use rocksdb::{Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

const CF_FILES: &str = "files";
const CF_CHUNKS: &str = "chunks";
const CF_PLACEMENTS: &str = "placements";

/// File availability state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Degraded,
    Lost,
}

/// Replica placement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementState {
    Pending,
    Synced,
    Stale,
}

/// File record, immutable after commit except status and version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Whole-file SHA-256, hex
    pub checksum: String,
    pub replication_factor: u32,
    pub strategy: PlacementStrategy,
    pub status: FileStatus,
    /// Optimistic concurrency counter for per-file mutations
    pub version: u64,
    pub created_at: u64,
}

/// Chunk record, created with the file and never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub file_id: String,
    pub index: u32,
    pub size: u64,
    /// Chunk SHA-256, hex
    pub checksum: String,
}

impl ChunkRecord {
    /// Canonical chunk id: "{file_id}-{index:06}"
    pub fn id_for(file_id: &str, index: u32) -> String {
        format!("{}-{:06}", file_id, index)
    }

    /// Owning file id, recovered from a canonical chunk id
    pub fn file_id_of(chunk_id: &str) -> Result<&str> {
        chunk_id
            .rsplit_once('-')
            .map(|(file_id, _)| file_id)
            .ok_or_else(|| {
                crate::Error::MetadataCorrupted(format!("malformed chunk id: {}", chunk_id))
            })
    }
}

/// One replica of a chunk on a specific node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub chunk_id: String,
    pub node_id: String,
    pub state: PlacementState,
}

/// Complete view of a file: record, ordered chunks, replica sets
#[derive(Debug, Clone)]
pub struct FileManifest {
    pub file: FileRecord,
    pub chunks: Vec<ChunkRecord>,
    /// chunk_id -> placements
    pub placements: HashMap<String, Vec<Placement>>,
}

/// A chunk whose synced-replica count is below its file's target
#[derive(Debug, Clone)]
pub struct AtRiskChunk {
    pub chunk: ChunkRecord,
    pub replication_factor: u32,
    /// Node ids of surviving synced replicas
    pub synced: Vec<String>,
    /// Node ids of stale replicas awaiting cleanup
    pub stale: Vec<String>,
}

/// Metadata store
pub struct MetadataStore {
    db: DB,
    /// Serializes the physical check-and-commit of every write
    write_lock: Mutex<()>,
}

impl MetadataStore {
    /// Open or create the metadata store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_FILES, CF_CHUNKS, CF_PLACEMENTS])?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    // === Upload commit ===

    /// Commit a fully replicated upload: file, chunks and placements in
    /// one atomic batch. Fails `DuplicateFile` if the id exists.
    pub fn register_file(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
        placements: &[Placement],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();

        if self.read_file(&file.file_id)?.is_some() {
            return Err(crate::Error::DuplicateFile(file.file_id.clone()));
        }

        let mut batch = WriteBatch::default();
        self.batch_put_file(&mut batch, file)?;
        for chunk in chunks {
            let cf = self.db.cf_handle(CF_CHUNKS).unwrap();
            batch.put_cf(cf, chunk_key(&chunk.file_id, chunk.index), encode(chunk)?);
        }
        for placement in placements {
            let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
            batch.put_cf(
                cf,
                placement_key(&placement.chunk_id, &placement.node_id),
                encode(placement)?,
            );
        }
        self.db.write(batch)?;
        Ok(())
    }

    // === Lookups ===

    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>> {
        self.read_file(file_id)
    }

    /// Full view of a file; `NotFound` if the id is unknown
    pub fn lookup(&self, file_id: &str) -> Result<FileManifest> {
        let file = self
            .read_file(file_id)?
            .ok_or_else(|| crate::Error::NotFound(format!("file {}", file_id)))?;

        let chunks = self.chunks_for_file(file_id)?;
        let mut placements = HashMap::with_capacity(chunks.len());
        for chunk in &chunks {
            placements.insert(
                chunk.chunk_id.clone(),
                self.placements_for_chunk(&chunk.chunk_id)?,
            );
        }

        Ok(FileManifest {
            file,
            chunks,
            placements,
        })
    }

    /// All file records
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let cf = self.db.cf_handle(CF_FILES).unwrap();
        let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);

        let mut files = Vec::new();
        for item in iter {
            let (_, value) = item?;
            files.push(decode::<FileRecord>(&value)?);
        }
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(files)
    }

    /// Ordered chunk records for a file
    pub fn chunks_for_file(&self, file_id: &str) -> Result<Vec<ChunkRecord>> {
        let cf = self.db.cf_handle(CF_CHUNKS).unwrap();
        let prefix = format!("{}/", file_id);
        let mut chunks = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, iter_from(prefix.as_bytes()))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            chunks.push(decode::<ChunkRecord>(&value)?);
        }
        Ok(chunks)
    }

    /// Placements of one chunk
    pub fn placements_for_chunk(&self, chunk_id: &str) -> Result<Vec<Placement>> {
        let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
        let prefix = format!("{}/", chunk_id);
        let mut placements = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, iter_from(prefix.as_bytes()))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            placements.push(decode::<Placement>(&value)?);
        }
        Ok(placements)
    }

    // === Versioned per-file mutations ===

    /// Add or refresh a batch of placements for one file, atomically
    pub fn commit_placements(
        &self,
        file_id: &str,
        expected_version: u64,
        placements: &[Placement],
    ) -> Result<u64> {
        let _guard = self.write_lock.lock().unwrap();
        let file = self.checked_file(file_id, expected_version)?;

        let mut batch = WriteBatch::default();
        for placement in placements {
            let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
            batch.put_cf(
                cf,
                placement_key(&placement.chunk_id, &placement.node_id),
                encode(placement)?,
            );
        }
        self.bump_and_write(batch, file)
    }

    /// Insert or update a single placement's state
    pub fn update_placement(
        &self,
        chunk_id: &str,
        node_id: &str,
        state: PlacementState,
        expected_version: u64,
    ) -> Result<u64> {
        let file_id = ChunkRecord::file_id_of(chunk_id)?.to_string();
        let placement = Placement {
            chunk_id: chunk_id.to_string(),
            node_id: node_id.to_string(),
            state,
        };

        let _guard = self.write_lock.lock().unwrap();
        let file = self.checked_file(&file_id, expected_version)?;

        let mut batch = WriteBatch::default();
        let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
        batch.put_cf(cf, placement_key(chunk_id, node_id), encode(&placement)?);
        self.bump_and_write(batch, file)
    }

    /// Remove a placement record
    pub fn remove_placement(
        &self,
        chunk_id: &str,
        node_id: &str,
        expected_version: u64,
    ) -> Result<u64> {
        let file_id = ChunkRecord::file_id_of(chunk_id)?.to_string();

        let _guard = self.write_lock.lock().unwrap();
        let file = self.checked_file(&file_id, expected_version)?;

        let mut batch = WriteBatch::default();
        let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
        batch.delete_cf(cf, placement_key(chunk_id, node_id));
        self.bump_and_write(batch, file)
    }

    /// Change a file's availability status
    pub fn set_file_status(
        &self,
        file_id: &str,
        status: FileStatus,
        expected_version: u64,
    ) -> Result<u64> {
        let _guard = self.write_lock.lock().unwrap();
        let mut file = self.checked_file(file_id, expected_version)?;
        file.status = status;
        self.bump_and_write(WriteBatch::default(), file)
    }

    // === Failure handling ===

    /// Demote every synced placement on a node to stale. One atomic
    /// batch per owning file, version-bumped. Returns the number of
    /// demoted placements.
    pub fn mark_node_stale(&self, node_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap();

        let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
        let mut by_file: HashMap<String, Vec<Placement>> = HashMap::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item?;
            let placement = decode::<Placement>(&value)?;
            if placement.node_id == node_id && placement.state == PlacementState::Synced {
                let file_id = ChunkRecord::file_id_of(&placement.chunk_id)?.to_string();
                by_file.entry(file_id).or_default().push(placement);
            }
        }

        let mut demoted = 0;
        for (file_id, placements) in by_file {
            let Some(file) = self.read_file(&file_id)? else {
                continue;
            };
            let mut batch = WriteBatch::default();
            let cf = self.db.cf_handle(CF_PLACEMENTS).unwrap();
            for mut placement in placements {
                placement.state = PlacementState::Stale;
                batch.put_cf(
                    cf,
                    placement_key(&placement.chunk_id, &placement.node_id),
                    encode(&placement)?,
                );
                demoted += 1;
            }
            self.bump_and_write(batch, file)?;
        }

        Ok(demoted)
    }

    /// Chunks whose synced-replica count is below the owning file's
    /// replication factor, with their surviving and stale replica sets
    pub fn list_at_risk(&self) -> Result<Vec<AtRiskChunk>> {
        let mut at_risk = Vec::new();

        for file in self.list_files()? {
            for chunk in self.chunks_for_file(&file.file_id)? {
                let placements = self.placements_for_chunk(&chunk.chunk_id)?;
                let synced: Vec<String> = placements
                    .iter()
                    .filter(|p| p.state == PlacementState::Synced)
                    .map(|p| p.node_id.clone())
                    .collect();
                if (synced.len() as u32) < file.replication_factor {
                    let stale = placements
                        .iter()
                        .filter(|p| p.state == PlacementState::Stale)
                        .map(|p| p.node_id.clone())
                        .collect();
                    at_risk.push(AtRiskChunk {
                        chunk,
                        replication_factor: file.replication_factor,
                        synced,
                        stale,
                    });
                }
            }
        }

        Ok(at_risk)
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // === Internals ===

    fn read_file(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let cf = self.db.cf_handle(CF_FILES).unwrap();
        match self.db.get_cf(cf, file_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn checked_file(&self, file_id: &str, expected_version: u64) -> Result<FileRecord> {
        let file = self
            .read_file(file_id)?
            .ok_or_else(|| crate::Error::NotFound(format!("file {}", file_id)))?;
        if file.version != expected_version {
            return Err(crate::Error::MetadataConflict {
                file_id: file_id.to_string(),
            });
        }
        Ok(file)
    }

    fn batch_put_file(&self, batch: &mut WriteBatch, file: &FileRecord) -> Result<()> {
        let cf = self.db.cf_handle(CF_FILES).unwrap();
        batch.put_cf(cf, file.file_id.as_bytes(), encode(file)?);
        Ok(())
    }

    fn bump_and_write(&self, mut batch: WriteBatch, mut file: FileRecord) -> Result<u64> {
        file.version += 1;
        self.batch_put_file(&mut batch, &file)?;
        self.db.write(batch)?;
        Ok(file.version)
    }
}

fn chunk_key(file_id: &str, index: u32) -> String {
    format!("{}/{:08}", file_id, index)
}

fn placement_key(chunk_id: &str, node_id: &str) -> String {
    format!("{}/{}", chunk_id, node_id)
}

fn iter_from(prefix: &[u8]) -> rocksdb::IteratorMode<'_> {
    rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| crate::Error::Internal(format!("serialize error: {}", e)))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| crate::Error::MetadataCorrupted(e.to_string()))
}
