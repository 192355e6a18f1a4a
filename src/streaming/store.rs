//! Read-only chunk store: a single-file key→blob table keyed by packed
//! chunk index
//!
//! The on-disk layout is a fixed header, a flat index of
//! `(key, offset, len)` entries and the LZ4-compressed rkyv blobs they
//! point at. The store is opened once per worker lifetime and released
//! when the worker shuts down.

use crate::core::error::Error;
use crate::core::types::Result;
use crate::voxel::chunk::VoxelChunk;
use crate::voxel::index::ChunkIndex;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const MAGIC: [u8; 8] = *b"VOXMAPS1";
const HEADER_LEN: u64 = 12;
const ENTRY_LEN: u64 = 20;

/// Serializable chunk payload
#[derive(Archive, Deserialize, Serialize)]
struct ChunkPayload {
    blocks: Vec<u32>,
}

/// Serialize and compress a chunk into a store blob.
pub fn encode_chunk(chunk: &VoxelChunk) -> Result<Vec<u8>> {
    let payload = ChunkPayload {
        blocks: chunk.blocks().to_vec(),
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&payload)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

/// Decompress and deserialize a store blob.
pub fn decode_chunk(data: &[u8]) -> Result<VoxelChunk> {
    let bytes = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Decode(format!("LZ4 decompression failed: {e}")))?;
    let archived = rkyv::access::<ArchivedChunkPayload, rkyv::rancor::Error>(&bytes)
        .map_err(|e| Error::Decode(e.to_string()))?;
    let payload: ChunkPayload = rkyv::deserialize::<ChunkPayload, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Decode(e.to_string()))?;
    VoxelChunk::from_blocks(payload.blocks)
        .ok_or_else(|| Error::Decode("blob does not hold a 32^3 voxel grid".into()))
}

struct BlobRef {
    offset: u64,
    len: u32,
}

/// Read-only connection to a persisted chunk store file.
pub struct ChunkStore {
    file: tokio::fs::File,
    index: HashMap<u64, BlobRef>,
    path: PathBuf,
}

impl ChunkStore {
    /// Open a store file and read its full index.
    ///
    /// Fails with [`Error::StoreNotFound`] when the file is absent and
    /// [`Error::StoreCorrupt`] when the header or index is malformed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::StoreNotFound(path.to_path_buf()));
        }

        let mut file = tokio::fs::File::open(path).await?;
        let file_len = file.metadata().await?.len();

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)
            .await
            .map_err(|_| Error::StoreCorrupt("truncated header".into()))?;
        if header[..8] != MAGIC {
            return Err(Error::StoreCorrupt("bad magic".into()));
        }
        let count = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        let mut raw_index = vec![0u8; count as usize * ENTRY_LEN as usize];
        file.read_exact(&mut raw_index)
            .await
            .map_err(|_| Error::StoreCorrupt("truncated index".into()))?;

        let mut index = HashMap::with_capacity(count as usize);
        for entry in raw_index.chunks_exact(ENTRY_LEN as usize) {
            let key = u64::from_le_bytes([
                entry[0], entry[1], entry[2], entry[3], entry[4], entry[5], entry[6], entry[7],
            ]);
            let offset = u64::from_le_bytes([
                entry[8], entry[9], entry[10], entry[11], entry[12], entry[13], entry[14],
                entry[15],
            ]);
            let len = u32::from_le_bytes([entry[16], entry[17], entry[18], entry[19]]);
            if offset + len as u64 > file_len {
                return Err(Error::StoreCorrupt(format!(
                    "entry for key {key} points past end of file"
                )));
            }
            index.insert(key, BlobRef { offset, len });
        }

        log::debug!("opened chunk store {} ({count} chunks)", path.display());
        Ok(Self {
            file,
            index,
            path: path.to_path_buf(),
        })
    }

    /// Point lookup of a raw blob. Absence is `Ok(None)`; unexplored
    /// terrain is a normal outcome, not an error.
    pub async fn fetch(&mut self, index: ChunkIndex) -> Result<Option<Vec<u8>>> {
        let Some(blob) = self.index.get(&index.raw()) else {
            return Ok(None);
        };
        self.file.seek(SeekFrom::Start(blob.offset)).await?;
        let mut buf = vec![0u8; blob.len as usize];
        self.file.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }

    /// Fetch and decode the chunk at an index, marking it freshly loaded.
    ///
    /// Decode failures are logged and reported as absence so one corrupt
    /// blob cannot abort a bulk region operation.
    pub async fn load_chunk(&mut self, index: ChunkIndex) -> Result<Option<VoxelChunk>> {
        let Some(blob) = self.fetch(index).await? else {
            return Ok(None);
        };
        match decode_chunk(&blob) {
            Ok(mut chunk) => {
                chunk.mark_fresh();
                Ok(Some(chunk))
            }
            Err(err) => {
                log::warn!("failed to decode chunk {index:?}: {err}");
                Ok(None)
            }
        }
    }

    pub fn contains(&self, index: ChunkIndex) -> bool {
        self.index.contains_key(&index.raw())
    }

    /// Number of chunks in the store.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes store files in the layout [`ChunkStore`] reads.
///
/// Used by host tooling to produce stores and by tests to build fixtures;
/// the pipeline itself never writes.
pub struct StoreWriter {
    path: PathBuf,
    entries: Vec<(u64, Vec<u8>)>,
}

impl StoreWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Vec::new(),
        }
    }

    /// Queue a chunk for writing. Re-inserting a key replaces the old blob
    /// at read time (last entry wins in the index).
    pub fn insert(&mut self, index: ChunkIndex, chunk: &VoxelChunk) -> Result<()> {
        let blob = encode_chunk(chunk)?;
        self.entries.push((index.raw(), blob));
        Ok(())
    }

    /// Write header, index and blobs to disk.
    pub fn finish(self) -> Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(&self.path)?);

        out.write_all(&MAGIC)?;
        out.write_all(&(self.entries.len() as u32).to_le_bytes())?;

        let mut offset = HEADER_LEN + self.entries.len() as u64 * ENTRY_LEN;
        for (key, blob) in &self.entries {
            out.write_all(&key.to_le_bytes())?;
            out.write_all(&offset.to_le_bytes())?;
            out.write_all(&(blob.len() as u32).to_le_bytes())?;
            offset += blob.len() as u64;
        }
        for (_, blob) in &self.entries {
            out.write_all(blob)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::chunk::{CHUNK_VOLUME, VoxelChunk};

    fn checker_chunk() -> VoxelChunk {
        let mut chunk = VoxelChunk::new();
        for i in (0..CHUNK_VOLUME).step_by(2) {
            chunk.set(i, (i % 7 + 1) as u32);
        }
        chunk
    }

    #[test]
    fn encode_decode_roundtrip() {
        let chunk = checker_chunk();
        let blob = encode_chunk(&chunk).expect("encode failed");
        let decoded = decode_chunk(&blob).expect("decode failed");
        assert_eq!(decoded.blocks(), chunk.blocks());
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = decode_chunk(&[1, 2, 3, 4, 5]);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn compressed_blob_is_smaller_for_uniform_data() {
        let chunk = VoxelChunk::new();
        let blob = encode_chunk(&chunk).expect("encode failed");
        assert!(blob.len() < CHUNK_VOLUME * 4);
    }

    #[tokio::test]
    async fn open_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChunkStore::open(dir.path().join("missing.vxs")).await;
        assert!(matches!(result, Err(Error::StoreNotFound(_))));
    }

    #[tokio::test]
    async fn open_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vxs");
        std::fs::write(&path, b"NOTASTORExxxx").unwrap();
        let result = ChunkStore::open(&path).await;
        assert!(matches!(result, Err(Error::StoreCorrupt(_))));
    }

    #[tokio::test]
    async fn write_then_read_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.vxs");

        let a = ChunkIndex::pack(1, 2, 3, 0);
        let b = ChunkIndex::pack(4, 5, 6, 1);
        let absent = ChunkIndex::pack(9, 9, 9, 0);

        let mut writer = StoreWriter::new(&path);
        writer.insert(a, &checker_chunk()).unwrap();
        writer.insert(b, &VoxelChunk::new()).unwrap();
        writer.finish().unwrap();

        let mut store = ChunkStore::open(&path).await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains(a));
        assert!(!store.contains(absent));

        let chunk = store.load_chunk(a).await.unwrap().expect("chunk missing");
        assert!(chunk.is_fresh());
        assert_eq!(chunk.blocks(), checker_chunk().blocks());

        let empty = store.load_chunk(b).await.unwrap().expect("chunk missing");
        assert!(empty.is_empty());

        assert!(store.load_chunk(absent).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.vxs");

        let key = ChunkIndex::pack(7, 7, 7, 0);
        let mut writer = StoreWriter::new(&path);
        writer.insert(key, &checker_chunk()).unwrap();
        writer.finish().unwrap();

        // Flip bytes in the blob region, leaving header and index intact.
        let mut bytes = std::fs::read(&path).unwrap();
        let blob_start = (HEADER_LEN + ENTRY_LEN) as usize;
        for b in &mut bytes[blob_start..blob_start + 16] {
            *b ^= 0xff;
        }
        std::fs::write(&path, bytes).unwrap();

        let mut store = ChunkStore::open(&path).await.unwrap();
        assert!(store.load_chunk(key).await.unwrap().is_none());
    }
}
