//! Chunking engine: deterministic fixed-size split and verified reassembly

use crate::common::{sha256_hex, ChecksumHasher, Result};
use bytes::Bytes;

/// One piece of a split file, ready to push to a node agent
#[derive(Debug, Clone)]
pub struct ChunkPiece {
    pub index: u32,
    pub data: Bytes,
    pub checksum: String,
}

/// Result of splitting a file
#[derive(Debug, Clone)]
pub struct SplitFile {
    pub pieces: Vec<ChunkPiece>,
    pub file_checksum: String,
}

/// Split a byte buffer into fixed-size checksummed pieces.
///
/// The final piece may be shorter. Pieces are zero-copy slices of the
/// input. Also computes the whole-file digest used to verify downloads.
pub fn split(data: Bytes, chunk_size: u64) -> Result<SplitFile> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidConfig(
            "chunk_size must be positive".into(),
        ));
    }

    let chunk_size = chunk_size as usize;
    let mut pieces = Vec::with_capacity(data.len().div_ceil(chunk_size));
    let mut file_hasher = ChecksumHasher::new();

    let mut offset = 0;
    let mut index = 0u32;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        let slice = data.slice(offset..end);
        file_hasher.update(&slice);
        pieces.push(ChunkPiece {
            index,
            checksum: sha256_hex(&slice),
            data: slice,
        });
        offset = end;
        index += 1;
    }

    Ok(SplitFile {
        pieces,
        file_checksum: file_hasher.finalize(),
    })
}

/// Reassemble pieces in index order, verifying each checksum.
///
/// Stops at the first verification failure and reports the offending
/// index; the caller decides whether to retry with another replica.
pub fn reconstruct(pieces: &[ChunkPiece]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(pieces.iter().map(|p| p.data.len()).sum());

    for (position, piece) in pieces.iter().enumerate() {
        if piece.index as usize != position {
            return Err(crate::Error::Internal(format!(
                "chunk sequence broken: expected index {}, got {}",
                position, piece.index
            )));
        }

        let actual = sha256_hex(&piece.data);
        if actual != piece.checksum {
            return Err(crate::Error::Integrity {
                index: piece.index,
                expected: piece.checksum.clone(),
                actual,
            });
        }

        output.extend_from_slice(&piece.data);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Bytes {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        Bytes::from(data)
    }

    #[test]
    fn test_split_counts_and_sizes() {
        let data = sample(3 * 1024 * 1024);
        let split = split(data, 1024 * 1024).unwrap();
        assert_eq!(split.pieces.len(), 3);
        assert!(split.pieces.iter().all(|p| p.data.len() == 1024 * 1024));

        let uneven = sample(2 * 1024 * 1024 + 17);
        let split = super::split(uneven, 1024 * 1024).unwrap();
        assert_eq!(split.pieces.len(), 3);
        assert_eq!(split.pieces[2].data.len(), 17);
    }

    #[test]
    fn test_roundtrip() {
        let data = sample(500_000);
        let split = split(data.clone(), 64 * 1024).unwrap();
        let rebuilt = reconstruct(&split.pieces).unwrap();
        assert_eq!(rebuilt, data.as_ref());
        assert_eq!(sha256_hex(&rebuilt), split.file_checksum);
    }

    #[test]
    fn test_empty_input() {
        let split = split(Bytes::new(), 1024).unwrap();
        assert!(split.pieces.is_empty());
        assert_eq!(reconstruct(&split.pieces).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            split(sample(10), 0),
            Err(crate::Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reconstruct_names_corrupt_index() {
        let data = sample(100_000);
        let mut split = split(data, 32 * 1024).unwrap();

        let mut corrupted = split.pieces[2].data.to_vec();
        corrupted[0] ^= 0xff;
        split.pieces[2].data = Bytes::from(corrupted);

        match reconstruct(&split.pieces) {
            Err(crate::Error::Integrity { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_reconstruct_rejects_gap() {
        let data = sample(100_000);
        let mut split = split(data, 32 * 1024).unwrap();
        split.pieces.remove(1);
        assert!(reconstruct(&split.pieces).is_err());
    }
}
