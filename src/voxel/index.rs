//! Packed chunk-index algebra and LOD levels
//!
//! Chunk positions are packed into a single `u64` so that bulk region
//! operations can translate between world, LOD and mini-region coordinate
//! spaces with plain mask/shift/add arithmetic instead of materializing
//! coordinate triples on the hot path.

/// Bit layout of a packed chunk index, low to high:
///
/// ```text
/// chunkX: 21 bit   start  0
/// chunkZ: 21 bit   start 21
/// chunkY:  9 bit   start 42
/// guard:   1 bit   start 51
/// dim:    10 bit   start 52
/// reserved: 2 bit  start 62
/// ```
///
/// The guard bit absorbs carries out of the Y field so that offset
/// arithmetic on packed indices stays confined to its own field for
/// bounded coordinate ranges.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkIndex(u64);

const X_BITS: u32 = 21;
const Z_BITS: u32 = 21;
const Y_BITS: u32 = 9;
const DIM_BITS: u32 = 10;

const Z_SHIFT: u32 = X_BITS;
const Y_SHIFT: u32 = X_BITS + Z_BITS;
const DIM_SHIFT: u32 = X_BITS + Z_BITS + Y_BITS + 1;

const X_MASK: u64 = (1 << X_BITS) - 1;
const Z_MASK: u64 = (1 << Z_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;
const DIM_MASK: u64 = (1 << DIM_BITS) - 1;

impl ChunkIndex {
    /// Pack chunk coordinates and a dimension id into an index.
    ///
    /// Preconditions (not checked in release builds, the fields would
    /// silently corrupt their neighbors): `0 <= cx,cz < 2^21`,
    /// `0 <= cy < 2^9`, `dim < 2^10`.
    pub const fn pack(cx: i32, cy: i32, cz: i32, dim: u32) -> Self {
        debug_assert!(cx >= 0 && (cx as u64) <= X_MASK);
        debug_assert!(cz >= 0 && (cz as u64) <= Z_MASK);
        debug_assert!(cy >= 0 && (cy as u64) <= Y_MASK);
        debug_assert!((dim as u64) <= DIM_MASK);
        Self(
            cx as u64
                | (cz as u64) << Z_SHIFT
                | (cy as u64) << Y_SHIFT
                | (dim as u64) << DIM_SHIFT,
        )
    }

    /// Inverse of [`ChunkIndex::pack`]: `(cx, cy, cz, dim)`.
    pub const fn unpack(self) -> (i32, i32, i32, u32) {
        (
            (self.0 & X_MASK) as i32,
            (self.0 >> Y_SHIFT & Y_MASK) as i32,
            (self.0 >> Z_SHIFT & Z_MASK) as i32,
            (self.0 >> DIM_SHIFT & DIM_MASK) as u32,
        )
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Snap to the containing LOD-chunk boundary by zeroing the low
    /// `shift` bits of each coordinate field. Idempotent.
    pub const fn to_lod(self, level: LodLevel) -> Self {
        Self(self.0 & level.index_mask())
    }

    /// Packed-space delta such that `other.offset_by(delta) == self`.
    pub const fn offset_from(self, other: Self) -> u64 {
        self.0.wrapping_sub(other.0)
    }

    /// Apply a packed-space delta produced by [`ChunkIndex::offset_from`].
    pub const fn offset_by(self, delta: u64) -> Self {
        Self(self.0.wrapping_add(delta))
    }
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (cx, cy, cz, dim) = self.unpack();
        write!(f, "ChunkIndex({cx}, {cy}, {cz}; dim {dim})")
    }
}

/// Level of detail: how many source chunks per axis collapse into one
/// destination chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LodLevel {
    #[default]
    None,
    X2,
    X4,
    X8,
    X16,
    /// An entire 32³ chunk becomes a single voxel.
    X32,
}

impl LodLevel {
    pub const ALL: [LodLevel; 6] = [
        LodLevel::None,
        LodLevel::X2,
        LodLevel::X4,
        LodLevel::X8,
        LodLevel::X16,
        LodLevel::X32,
    ];

    /// Source chunks (and voxels) combined per axis.
    pub const fn size(self) -> u32 {
        1 << self.shift()
    }

    /// `log2(size)`.
    pub const fn shift(self) -> u32 {
        match self {
            LodLevel::None => 0,
            LodLevel::X2 => 1,
            LodLevel::X4 => 2,
            LodLevel::X8 => 3,
            LodLevel::X16 => 4,
            LodLevel::X32 => 5,
        }
    }

    /// Mask clearing the low `shift` bits of each coordinate field of a
    /// packed index, leaving dimension and guard bits intact.
    pub const fn index_mask(self) -> u64 {
        //      0bRRDDDDDDDDDDGYYYYYYYYYZZZZZZZZZZZZZZZZZZZZZXXXXXXXXXXXXXXXXXXXXX
        match self {
            LodLevel::None => {
                0b0111111111111111111111111111111111111111111111111111111111111111
            }
            LodLevel::X2 => {
                0b0111111111111111111110111111111111111111110111111111111111111110
            }
            LodLevel::X4 => {
                0b0111111111111111111100111111111111111111100111111111111111111100
            }
            LodLevel::X8 => {
                0b0111111111111111111000111111111111111111000111111111111111111000
            }
            LodLevel::X16 => {
                0b0111111111111111110000111111111111111110000111111111111111110000
            }
            LodLevel::X32 => {
                0b0111111111111111100000111111111111111100000111111111111111100000
            }
        }
    }

    /// Convert a plain chunk coordinate into LOD-chunk space.
    ///
    /// Arithmetic shift, so negative coordinates round toward negative
    /// infinity.
    pub const fn chunk_coord(self, c: i32) -> i32 {
        c >> self.shift()
    }

    /// Round a chunk count up so partial trailing chunks stay covered.
    pub const fn ceil_chunks(self, count: u32) -> u32 {
        (count + self.size() - 1) >> self.shift()
    }
}
