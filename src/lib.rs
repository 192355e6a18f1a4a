//! Voxmap - miniature-region extraction for chunked voxel worlds
//!
//! Pulls rectangular regions of chunks out of a persisted world store,
//! optionally collapses them through discrete LOD reduction, and
//! re-indexes them into an independent mini-region coordinate space so a
//! host engine can display them as a miniature copy.

pub mod core;
pub mod voxel;
pub mod streaming;
pub mod region;

pub use crate::core::Error;
