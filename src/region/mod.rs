//! Mini-region placement inside the shared destination dimension
//!
//! Every allocated slot id owns a fixed grid cell of the shared
//! coordinate space, so any number of independent mini-regions can
//! coexist without their chunks colliding.

pub mod slots;

pub use slots::{MintRegionId, SlotRegistry};

/// Edge length of one placement cell, in blocks.
pub const CELL_SIZE: i32 = 16384;
/// Cells per row of the placement grid.
pub const GRID_W: i32 = 4096;

/// Anchor position (x, z) of a slot's cell in the shared dimension.
///
/// Slots are laid out row-major on a [`GRID_W`]-wide grid of
/// [`CELL_SIZE`]-sized cells, anchored at the cell center so content can
/// grow in both directions without leaving the cell.
pub fn placement(id: u32) -> (i32, i32) {
    let id = id as i32;
    (
        id % GRID_W * CELL_SIZE + CELL_SIZE / 2,
        id / GRID_W * CELL_SIZE + CELL_SIZE / 2,
    )
}
