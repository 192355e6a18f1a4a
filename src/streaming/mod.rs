//! Chunk store access, LOD reduction and the region-request pipeline

pub mod store;
pub mod lod;
pub mod request;
pub mod pipeline;

pub use store::{ChunkStore, StoreWriter, decode_chunk, encode_chunk};
pub use lod::{LodAccessor, VoteTally, reduce_into};
pub use request::{ChunkPos, RegionRequest, RequestKind};
pub use pipeline::{
    ChunkReceiver, Pipeline, PipelineConfig, PipelineEvent, RequestSummary,
};
