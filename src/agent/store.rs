//! On-disk chunk blob storage for a node agent
//!
//! Layout: data_dir/aa/bb/<encoded chunk id>, where aa/bb come from the
//! first two bytes of SHA-256(chunk_id) so no single directory grows
//! unbounded. Writes go through a temp file and an atomic rename; the
//! declared checksum is verified before anything is accepted.

use crate::common::{encode_chunk_id, fanout_prefix, sha256_hex, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Chunk store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub chunks: usize,
    pub bytes: u64,
}

/// Chunk blob store rooted at a data directory
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Open or create the store
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Store a chunk after verifying its checksum
    pub fn put(&self, chunk_id: &str, data: &[u8], expected_checksum: &str) -> Result<()> {
        let actual = sha256_hex(data);
        if actual != expected_checksum {
            return Err(crate::Error::ChecksumMismatch {
                expected: expected_checksum.to_string(),
                actual,
            });
        }

        let path = self.chunk_path(chunk_id);
        fs::create_dir_all(path.parent().unwrap())?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::debug!("stored chunk {} ({} bytes)", chunk_id, data.len());
        Ok(())
    }

    /// Read a chunk's bytes
    pub fn get(&self, chunk_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.chunk_path(chunk_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    /// Delete a chunk blob; returns whether it existed
    pub fn delete(&self, chunk_id: &str) -> Result<bool> {
        let path = self.chunk_path(chunk_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        tracing::debug!("deleted chunk {}", chunk_id);
        Ok(true)
    }

    /// Count stored chunks and their total size
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        collect_stats(&self.root, &mut stats)?;
        Ok(stats)
    }

    fn chunk_path(&self, chunk_id: &str) -> PathBuf {
        let (dir1, dir2) = fanout_prefix(chunk_id);
        self.root
            .join(dir1)
            .join(dir2)
            .join(encode_chunk_id(chunk_id))
    }
}

fn collect_stats(dir: &Path, stats: &mut StoreStats) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_stats(&path, stats)?;
        } else if path.extension().and_then(|s| s.to_str()) != Some("tmp") {
            stats.chunks += 1;
            stats.bytes += entry.metadata()?.len();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let data = b"chunk contents";
        let checksum = sha256_hex(data);
        store.put("file-1-000000", data, &checksum).unwrap();

        assert_eq!(store.get("file-1-000000").unwrap().unwrap(), data);
        assert!(store.get("file-1-000001").unwrap().is_none());

        assert!(store.delete("file-1-000000").unwrap());
        assert!(!store.delete("file-1-000000").unwrap());
        assert!(store.get("file-1-000000").unwrap().is_none());
    }

    #[test]
    fn test_put_rejects_bad_checksum() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        let result = store.put("file-1-000000", b"data", "0000");
        assert!(matches!(
            result,
            Err(crate::Error::ChecksumMismatch { .. })
        ));
        assert!(store.get("file-1-000000").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        for i in 0..3 {
            let data = vec![i as u8; 100];
            let checksum = sha256_hex(&data);
            store
                .put(&format!("file-1-{:06}", i), &data, &checksum)
                .unwrap();
        }

        let stats = store.stats().unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.bytes, 300);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let data = b"persistent chunk";
        let checksum = sha256_hex(data);

        {
            let store = ChunkStore::open(dir.path()).unwrap();
            store.put("file-1-000000", data, &checksum).unwrap();
        }
        {
            let store = ChunkStore::open(dir.path()).unwrap();
            assert_eq!(store.get("file-1-000000").unwrap().unwrap(), data);
        }
    }
}
