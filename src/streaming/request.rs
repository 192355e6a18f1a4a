//! Region requests: bulk load/copy operations over a cuboid of chunks

use crate::voxel::index::{ChunkIndex, LodLevel};
use glam::{IVec3, UVec3};

/// What a region request does with the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// Load chunks that already exist at the destination indices.
    Load,
    /// Copy (and optionally LOD-reduce) chunks from a source region into
    /// the destination region.
    Copy,
}

/// A chunk-space position inside a dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPos {
    pub pos: IVec3,
    pub dim: u32,
}

impl ChunkPos {
    pub fn new(x: i32, y: i32, z: i32, dim: u32) -> Self {
        Self {
            pos: IVec3::new(x, y, z),
            dim,
        }
    }

    /// The chunk containing a world block position.
    pub fn from_block_pos(block: IVec3, dim: u32) -> Self {
        Self {
            pos: block >> 5,
            dim,
        }
    }

    pub fn index(self) -> ChunkIndex {
        ChunkIndex::pack(self.pos.x, self.pos.y, self.pos.z, self.dim)
    }
}

/// One bulk region operation, consumed exactly once by the worker.
///
/// Callers must serialize requests targeting the same destination region
/// themselves, and should split very large regions into bounded
/// sub-requests so a single request cannot monopolize the worker.
#[derive(Clone, Debug)]
pub struct RegionRequest {
    pub kind: RequestKind,
    /// Reduction level. Ignored for [`RequestKind::Load`].
    pub lod: LodLevel,
    /// Source origin in chunk coordinates. Meaningful for Copy only.
    pub src: ChunkPos,
    /// Destination origin in chunk coordinates.
    pub dst: ChunkPos,
    /// Extent in chunks along each axis.
    pub extent: UVec3,
}

impl RegionRequest {
    /// Load existing chunks of the destination cuboid from the store.
    pub fn load(dst: ChunkPos, extent: UVec3) -> Self {
        Self {
            kind: RequestKind::Load,
            lod: LodLevel::None,
            src: dst,
            dst,
            extent,
        }
    }

    /// Copy a source cuboid onto a destination origin, reducing by `lod`.
    pub fn copy(src: ChunkPos, dst: ChunkPos, extent: UVec3, lod: LodLevel) -> Self {
        Self {
            kind: RequestKind::Copy,
            lod,
            src,
            dst,
            extent,
        }
    }

    /// Copy the chunks covered by two world block-position corners.
    ///
    /// Corners may come in any order; the request spans every chunk the
    /// normalized block cuboid touches.
    pub fn copy_between_corners(
        corner1: IVec3,
        corner2: IVec3,
        src_dim: u32,
        dst: ChunkPos,
        lod: LodLevel,
    ) -> Self {
        let min = corner1.min(corner2) >> 5i32;
        let max = corner1.max(corner2) >> 5i32;
        let extent = (max - min + IVec3::ONE).as_uvec3();
        Self::copy(
            ChunkPos {
                pos: min,
                dim: src_dim,
            },
            dst,
            extent,
            lod,
        )
    }
}

/// Visit every coordinate of a cuboid exactly once: X outer, Z middle,
/// Y innermost.
pub(crate) fn iter_cuboid(extent: UVec3) -> impl Iterator<Item = IVec3> {
    (0..extent.x as i32).flat_map(move |x| {
        (0..extent.z as i32)
            .flat_map(move |z| (0..extent.y as i32).map(move |y| IVec3::new(x, y, z)))
    })
}
