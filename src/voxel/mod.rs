//! Voxel data model: chunks and packed index algebra

pub mod chunk;
pub mod index;

pub use chunk::{AIR, BlockId, BlockRegistry, CHUNK_AREA, CHUNK_SIZE, CHUNK_VOLUME, VoxelChunk};
pub use index::{ChunkIndex, LodLevel};
