//! LOD reduction: collapse a size³ cube of source chunks into one
//! destination chunk of the same dimensions
//!
//! Every destination voxel is decided by a weighted plurality vote over
//! the `size³` source voxels that map to it. Voxels whose upward neighbor
//! is not fully opaque count as visually exposed and get their weight
//! boosted, so one layer of surface material (grass) can outvote the
//! filler below it (stone, dirt).

use crate::core::types::Result;
use crate::streaming::store::ChunkStore;
use crate::voxel::chunk::{AIR, BlockId, BlockRegistry, CHUNK_AREA, CHUNK_SIZE, VoxelChunk};
use crate::voxel::index::{ChunkIndex, LodLevel};
use std::collections::HashMap;

/// Weighted tally of the block types inside one destination voxel group.
#[derive(Debug, Default)]
pub struct VoteTally {
    weights: HashMap<BlockId, u32>,
    /// Air voxels seen in the group. Kept out of the weighted vote.
    pub air: u32,
}

impl VoteTally {
    pub fn add(&mut self, id: BlockId, weight: u32) {
        *self.weights.entry(id).or_insert(0) += weight;
    }

    pub fn clear(&mut self) {
        self.weights.clear();
        self.air = 0;
    }

    /// Pick the representative block type for the group.
    ///
    /// Candidates are visited in descending weight order (ties broken by
    /// ascending block id so the result never depends on map iteration
    /// order). The first opaque candidate wins unless an earlier
    /// non-opaque candidate outweighs it more than 2:1; with no opaque
    /// candidate at all the first-recorded non-opaque block wins, else air.
    pub fn choose(&self, registry: &impl BlockRegistry) -> BlockId {
        let mut ranked: Vec<(BlockId, u32)> =
            self.weights.iter().map(|(&id, &w)| (id, w)).collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut non_opaque = AIR;
        let mut non_opaque_weight = 0u32;
        for (id, weight) in ranked {
            if id == AIR {
                continue;
            }
            if registry.is_fully_opaque(id) {
                // The exposure boost tends to favor non-opaque surface
                // blocks; keep the non-opaque pick when the gap is too wide.
                if non_opaque != AIR && non_opaque_weight > weight * 2 {
                    return non_opaque;
                }
                return id;
            } else if non_opaque == AIR {
                non_opaque = id;
                non_opaque_weight = weight;
            }
        }
        non_opaque
    }
}

/// Reduce one source chunk into its slot of the destination chunk.
///
/// `sub_x/sub_y/sub_z` say which chunk of the size³ group `src` is, in
/// group-local coordinates (`0..level.size()`). Both voxel walks derive
/// their indices from flat counters with X varying fastest, then Z, then
/// Y, whatever the shift:
///
/// ```text
/// size,shift   counter             src index           dst index
///    2,1       0YYYYZZZZXXXXyzx    0YYYYyZZZZzXXXXx    0_YYYY_ZZZZ_XXXX
///    4,2       0YYYZZZXXXyyzzxx    0YYYyyZZZzzXXXxx    0__YYY__ZZZ__XXX
///    8,3       0YYZZXXyyyzzzxxx    0YYyyyZZzzzXXxxx    0___YY___ZZ___XX
///   16,4       0YZXyyyyzzzzxxxx    0YyyyyZzzzzXxxxx    0____Y____Z____X
///   32,5       0yyyyyzzzzzxxxxx    0yyyyyzzzzzxxxxx    0YYYYYZZZZZXXXXX
/// ```
pub fn reduce_into(
    sub_x: u32,
    sub_y: u32,
    sub_z: u32,
    dst: &mut VoxelChunk,
    src: &VoxelChunk,
    level: LodLevel,
    registry: &impl BlockRegistry,
) {
    let shift = level.shift() as usize;
    let size = level.size();
    debug_assert!(sub_x < size && sub_y < size && sub_z < size);

    // Destination index bits shared by every voxel of this source chunk.
    let dst_fix = ((sub_x | sub_z << 5 | sub_y << 10) as usize) << (5 - shift);

    let icount = 1usize << (3 * shift);
    let ocount = 1usize << (3 * (5 - shift));
    let imask = (1usize << shift) - 1;
    let omask = (1usize << (5 - shift)) - 1;

    let mut tally = VoteTally::default();
    for o in 0..ocount {
        let dst_var =
            (o & omask) | (o << shift & omask << 5) | (o << (2 * shift) & omask << 10);

        for i in 0..icount {
            let src_idx = (i & imask)
                | (i << (5 - shift) & imask << 5)
                | (i << (10 - 2 * shift) & imask << 10)
                | dst_var << shift;

            let id = src.get(src_idx);
            if id == AIR {
                tally.air += 1;
                continue;
            }

            // A voxel is exposed when the block directly above it is not
            // fully opaque. The topmost layer has no loaded neighbor and
            // always counts as covered; the resulting bias at chunk seams
            // is an accepted inaccuracy.
            let exposed = src_idx < CHUNK_AREA * (CHUNK_SIZE - 1)
                && !registry.is_fully_opaque(src.get(src_idx + CHUNK_AREA));
            tally.add(id, if exposed { size + 1 } else { 1 });
        }

        dst.set(dst_fix | dst_var, tally.choose(registry));
        tally.clear();
    }
}

/// Resolves whole chunks in LOD-chunk space against a store, reducing
/// the size³ source group behind each one.
///
/// All coordinates accepted here are already divided by the LOD size, so
/// neighboring LOD chunks have neighboring integer coordinates even
/// though their packed indices are `size` apart.
pub struct LodAccessor<'a, R> {
    store: &'a mut ChunkStore,
    registry: &'a R,
    level: LodLevel,
}

impl<'a, R: BlockRegistry> LodAccessor<'a, R> {
    pub fn new(store: &'a mut ChunkStore, registry: &'a R, level: LodLevel) -> Self {
        Self {
            store,
            registry,
            level,
        }
    }

    /// Load and reduce the chunk at a LOD-space position.
    ///
    /// Each source chunk is dropped right after it contributed, keeping
    /// peak memory at one source chunk regardless of level. Returns
    /// `None` when every source chunk in the group is absent.
    pub async fn get_chunk_once(
        &mut self,
        cx: i32,
        cy: i32,
        cz: i32,
        dim: u32,
    ) -> Result<Option<VoxelChunk>> {
        if self.level == LodLevel::None {
            // Fast path: a plain load, no reduction.
            return self.store.load_chunk(ChunkIndex::pack(cx, cy, cz, dim)).await;
        }

        let shift = self.level.shift();
        let size = self.level.size() as i32;
        let (bx, by, bz) = (cx << shift, cy << shift, cz << shift);

        let mut dst = VoxelChunk::new();
        let mut contributed = false;
        for y in 0..size {
            for z in 0..size {
                for x in 0..size {
                    let index = ChunkIndex::pack(bx + x, by + y, bz + z, dim);
                    let Some(src) = self.store.load_chunk(index).await? else {
                        continue;
                    };
                    contributed = true;
                    reduce_into(
                        x as u32,
                        y as u32,
                        z as u32,
                        &mut dst,
                        &src,
                        self.level,
                        self.registry,
                    );
                }
            }
        }

        Ok(contributed.then_some(dst))
    }

    /// Resolve by packed LOD-space index.
    pub async fn get_by_index(&mut self, index: ChunkIndex) -> Result<Option<VoxelChunk>> {
        let (cx, cy, cz, dim) = index.unpack();
        self.get_chunk_once(cx, cy, cz, dim).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::store::StoreWriter;
    use crate::voxel::chunk::CHUNK_VOLUME;

    const STONE: BlockId = 1;
    const DIRT: BlockId = 2;
    const GRASS: BlockId = 3;

    struct TestRegistry;

    impl BlockRegistry for TestRegistry {
        fn is_fully_opaque(&self, id: BlockId) -> bool {
            matches!(id, STONE | DIRT)
        }
    }

    #[test]
    fn choose_picks_lone_opaque_block() {
        // {stone: 6, air: 2} -> stone; air never competes.
        let mut tally = VoteTally::default();
        tally.add(STONE, 6);
        tally.air = 2;
        assert_eq!(tally.choose(&TestRegistry), STONE);
    }

    #[test]
    fn choose_prefers_dominant_non_opaque() {
        // Exposed grass at weight 36 beats dirt at weight 4 (36 > 2*4).
        let mut tally = VoteTally::default();
        tally.add(DIRT, 4);
        tally.add(GRASS, 36);
        assert_eq!(tally.choose(&TestRegistry), GRASS);
    }

    #[test]
    fn choose_keeps_opaque_when_gap_is_small() {
        let mut tally = VoteTally::default();
        tally.add(DIRT, 20);
        tally.add(GRASS, 36);
        assert_eq!(tally.choose(&TestRegistry), DIRT);
    }

    #[test]
    fn choose_falls_back_to_non_opaque_then_air() {
        let mut tally = VoteTally::default();
        tally.add(GRASS, 1);
        assert_eq!(tally.choose(&TestRegistry), GRASS);

        tally.clear();
        assert_eq!(tally.choose(&TestRegistry), AIR);
    }

    #[test]
    fn choose_breaks_weight_ties_by_block_id() {
        let mut tally = VoteTally::default();
        tally.add(DIRT, 10);
        tally.add(STONE, 10);
        assert_eq!(tally.choose(&TestRegistry), STONE);
    }

    fn layered_chunk(layers: &[(usize, BlockId)]) -> VoxelChunk {
        let mut chunk = VoxelChunk::new();
        for &(y, id) in layers {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    chunk.set(VoxelChunk::flat_index(x, y, z), id);
                }
            }
        }
        chunk
    }

    #[test]
    fn reduce_keeps_buried_filler() {
        // Three layers of dirt under one layer of grass: dirt keeps the
        // vote (112 vs 80 per group at x4).
        let src = layered_chunk(&[(0, DIRT), (1, DIRT), (2, DIRT), (3, GRASS)]);
        let mut dst = VoxelChunk::new();
        reduce_into(0, 0, 0, &mut dst, &src, LodLevel::X4, &TestRegistry);
        assert_eq!(dst.get(VoxelChunk::flat_index(0, 0, 0)), DIRT);
        assert_eq!(dst.get(VoxelChunk::flat_index(7, 0, 7)), DIRT);
        // Groups above the terrain stay air.
        assert_eq!(dst.get(VoxelChunk::flat_index(0, 1, 0)), AIR);
    }

    #[test]
    fn reduce_favors_exposed_surface() {
        // One layer of dirt under three of grass: the boosted grass vote
        // clears the 2x bar (240 > 2*80 per group at x4).
        let src = layered_chunk(&[(0, DIRT), (1, GRASS), (2, GRASS), (3, GRASS)]);
        let mut dst = VoxelChunk::new();
        reduce_into(0, 0, 0, &mut dst, &src, LodLevel::X4, &TestRegistry);
        assert_eq!(dst.get(VoxelChunk::flat_index(0, 0, 0)), GRASS);
        assert_eq!(dst.get(VoxelChunk::flat_index(7, 0, 7)), GRASS);
    }

    #[test]
    fn reduce_collapses_chunk_to_single_voxel_at_x32() {
        let mut src = VoxelChunk::new();
        src.set(VoxelChunk::flat_index(10, 3, 20), STONE);
        let mut dst = VoxelChunk::new();
        reduce_into(5, 2, 7, &mut dst, &src, LodLevel::X32, &TestRegistry);

        // The whole source chunk lands on the destination voxel named by
        // the sub-chunk position.
        let expected = VoxelChunk::flat_index(5, 2, 7);
        assert_eq!(dst.get(expected), STONE);
        let set: usize = (0..CHUNK_VOLUME).filter(|&i| dst.get(i) != AIR).count();
        assert_eq!(set, 1);
    }

    #[test]
    fn reduce_treats_top_layer_as_covered() {
        // Grass confined to the top layer never gets the exposure boost,
        // so a small exposed dirt stack outvotes it.
        let mut src = VoxelChunk::new();
        for x in 0..3 {
            src.set(VoxelChunk::flat_index(x, 31, 0), GRASS);
        }
        src.set(VoxelChunk::flat_index(10, 0, 0), DIRT);
        src.set(VoxelChunk::flat_index(10, 1, 0), DIRT);

        let mut dst = VoxelChunk::new();
        reduce_into(0, 0, 0, &mut dst, &src, LodLevel::X32, &TestRegistry);
        assert_eq!(dst.get(0), DIRT);
    }

    #[test]
    fn reduce_is_deterministic() {
        // Pseudo-random voxel soup; repeated runs must agree byte for byte.
        let mut state = 0x2545f491u32;
        let mut src = VoxelChunk::new();
        for i in 0..CHUNK_VOLUME {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            src.set(i, (state >> 28) % 4);
        }

        let mut a = VoxelChunk::new();
        let mut b = VoxelChunk::new();
        reduce_into(1, 1, 1, &mut a, &src, LodLevel::X2, &TestRegistry);
        reduce_into(1, 1, 1, &mut b, &src, LodLevel::X2, &TestRegistry);
        assert_eq!(a.blocks(), b.blocks());
    }

    async fn accessor_store(dir: &std::path::Path) -> ChunkStore {
        // Eight chunks forming a 2^3 group at (2,2,2)..(3,3,3), each
        // uniformly one block type.
        let path = dir.join("group.vxs");
        let mut writer = StoreWriter::new(&path);
        for (n, (x, y, z)) in [
            (2, 2, 2),
            (3, 2, 2),
            (2, 3, 2),
            (3, 3, 2),
            (2, 2, 3),
            (3, 2, 3),
            (2, 3, 3),
            (3, 3, 3),
        ]
        .into_iter()
        .enumerate()
        {
            let mut chunk = VoxelChunk::new();
            for i in 0..CHUNK_VOLUME {
                chunk.set(i, if n % 2 == 0 { STONE } else { DIRT });
            }
            writer.insert(ChunkIndex::pack(x, y, z, 0), &chunk).unwrap();
        }
        writer.finish().unwrap();
        ChunkStore::open(&path).await.unwrap()
    }

    #[tokio::test]
    async fn accessor_reduces_a_full_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = accessor_store(dir.path()).await;
        let registry = TestRegistry;
        let mut accessor = LodAccessor::new(&mut store, &registry, LodLevel::X2);

        let chunk = accessor
            .get_chunk_once(1, 1, 1, 0)
            .await
            .unwrap()
            .expect("group should resolve");

        // Each source chunk fills its own 16-wide octant of the result.
        assert_eq!(chunk.get(VoxelChunk::flat_index(0, 0, 0)), STONE);
        assert_eq!(chunk.get(VoxelChunk::flat_index(31, 0, 0)), DIRT);
        assert_eq!(chunk.get(VoxelChunk::flat_index(0, 31, 31)), STONE);
        assert_eq!(chunk.get(VoxelChunk::flat_index(31, 31, 31)), DIRT);
        assert!(!chunk.is_empty());
    }

    #[tokio::test]
    async fn accessor_returns_none_for_absent_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = accessor_store(dir.path()).await;
        let registry = TestRegistry;
        let mut accessor = LodAccessor::new(&mut store, &registry, LodLevel::X2);

        assert!(accessor.get_chunk_once(40, 1, 40, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accessor_fast_path_passes_chunks_through() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = accessor_store(dir.path()).await;
        let registry = TestRegistry;
        let mut accessor = LodAccessor::new(&mut store, &registry, LodLevel::None);

        let chunk = accessor
            .get_chunk_once(2, 2, 2, 0)
            .await
            .unwrap()
            .expect("chunk exists");
        assert_eq!(chunk.get(0), STONE);
        assert!(chunk.is_fresh());
    }
}
