//! Asynchronous region-request pipeline
//!
//! A single dedicated worker owns the chunk store connection, drains one
//! request at a time from a shared FIFO queue and hands finished chunks
//! back to the owning context through an event channel. The main context
//! never blocks on the worker; it polls delivered events whenever it is
//! convenient.

use crate::core::types::Result;
use crate::streaming::lod::LodAccessor;
use crate::streaming::request::{RegionRequest, RequestKind, iter_cuboid};
use crate::streaming::store::ChunkStore;
use crate::voxel::chunk::{BlockRegistry, VoxelChunk};
use crate::voxel::index::ChunkIndex;
use glam::IVec3;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Configuration for the request pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Path of the backing chunk store file.
    pub store_path: PathBuf,
    /// How long the worker sleeps between polls while the queue is empty.
    /// While requests are queued it runs without delay.
    pub idle_poll: Duration,
}

impl PipelineConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            idle_poll: Duration::from_millis(5),
        }
    }
}

/// Receives finished chunks on the owning context.
pub trait ChunkReceiver {
    /// Called once per delivered chunk, in destination chunk coordinates.
    fn on_chunk_ready(&mut self, cx: i32, cy: i32, cz: i32, chunk: VoxelChunk);
}

/// Completion notice for one drained request.
#[derive(Clone, Copy, Debug)]
pub struct RequestSummary {
    pub kind: RequestKind,
    /// Chunks actually delivered. Zero is a normal outcome for fully
    /// unexplored regions.
    pub delivered: u32,
    /// Destination coordinates visited (LOD-adjusted for copies).
    pub total: u32,
}

/// One message from the worker back to the owning context.
#[derive(Debug)]
pub enum PipelineEvent {
    Chunk {
        x: i32,
        y: i32,
        z: i32,
        chunk: VoxelChunk,
    },
    RequestFinished(RequestSummary),
}

/// Handle to the pipeline worker.
///
/// [`Pipeline::shutdown`] discards queued-but-unstarted requests, lets
/// the in-flight request finish and blocks until the worker has released
/// the store. Plainly dropping the handle tears the worker down at its
/// next await point instead.
pub struct Pipeline {
    request_tx: mpsc::UnboundedSender<RegionRequest>,
    event_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    stop: Arc<AtomicBool>,
    worker: tokio::task::JoinHandle<()>,
    runtime: tokio::runtime::Runtime,
}

impl Pipeline {
    /// Open the store and start the worker.
    ///
    /// A missing store file fails here with [`Error::StoreNotFound`]; the
    /// worker is never started.
    pub fn new<R>(config: PipelineConfig, registry: R) -> Result<Self>
    where
        R: BlockRegistry + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Runtime::new()?;
        let store = runtime.block_on(ChunkStore::open(&config.store_path))?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let stop = Arc::new(AtomicBool::new(false));
        let idle_poll = config.idle_poll;
        let worker_stop = Arc::clone(&stop);
        let worker = runtime.spawn(async move {
            worker_loop(store, registry, request_rx, event_tx, worker_stop, idle_poll).await
        });
        log::info!("chunk pipeline worker started on {}", config.store_path.display());

        Ok(Self {
            request_tx,
            event_rx,
            stop,
            worker,
            runtime,
        })
    }

    /// Queue a request. Returns `false` if the worker is gone.
    pub fn submit(&self, request: RegionRequest) -> bool {
        self.request_tx.send(request).is_ok()
    }

    /// Drain all events the worker has produced so far (non-blocking).
    pub fn poll_events(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drain events, forwarding chunks to `receiver`. Returns the
    /// completion notices that arrived.
    pub fn pump(&mut self, receiver: &mut impl ChunkReceiver) -> Vec<RequestSummary> {
        let mut finished = Vec::new();
        for event in self.poll_events() {
            match event {
                PipelineEvent::Chunk { x, y, z, chunk } => receiver.on_chunk_ready(x, y, z, chunk),
                PipelineEvent::RequestFinished(summary) => finished.push(summary),
            }
        }
        finished
    }

    /// Drop all queued requests, finish the in-flight one and block until
    /// the worker has released the store.
    pub fn shutdown(self) {
        let Self {
            request_tx,
            event_rx,
            stop,
            worker,
            runtime,
        } = self;
        stop.store(true, Ordering::Relaxed);
        drop(request_tx);
        drop(event_rx);
        let _ = runtime.block_on(worker);
    }
}

/// Worker tick: pop one request and drain it fully, sleep while idle,
/// exit when the queue closes. The store lives and dies with this loop.
async fn worker_loop<R: BlockRegistry>(
    mut store: ChunkStore,
    registry: R,
    mut request_rx: mpsc::UnboundedReceiver<RegionRequest>,
    event_tx: mpsc::UnboundedSender<PipelineEvent>,
    stop: Arc<AtomicBool>,
    idle_poll: Duration,
) {
    loop {
        match request_rx.try_recv() {
            Ok(request) => {
                // Queue-level cancellation only: requests that never
                // started are dropped, a dequeued request always runs to
                // completion.
                if stop.load(Ordering::Relaxed) {
                    log::debug!("discarding queued {:?} request on shutdown", request.kind);
                    continue;
                }
                process_request(&mut store, &registry, request, &event_tx).await;
            }
            Err(TryRecvError::Empty) => tokio::time::sleep(idle_poll).await,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    log::debug!("chunk pipeline worker shutting down");
}

async fn process_request<R: BlockRegistry>(
    store: &mut ChunkStore,
    registry: &R,
    request: RegionRequest,
    event_tx: &mpsc::UnboundedSender<PipelineEvent>,
) {
    let summary = match request.kind {
        RequestKind::Load => process_load(store, &request, event_tx).await,
        RequestKind::Copy => process_copy(store, registry, &request, event_tx).await,
    };
    log::info!(
        "{:?} request finished, chunks={}/{}",
        summary.kind,
        summary.delivered,
        summary.total
    );
    let _ = event_tx.send(PipelineEvent::RequestFinished(summary));
}

async fn process_load(
    store: &mut ChunkStore,
    request: &RegionRequest,
    event_tx: &mpsc::UnboundedSender<PipelineEvent>,
) -> RequestSummary {
    let extent = request.extent;
    let mut delivered = 0;
    for d in iter_cuboid(extent) {
        let pos = request.dst.pos + d;
        let index = ChunkIndex::pack(pos.x, pos.y, pos.z, request.dst.dim);
        match store.load_chunk(index).await {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                delivered += 1;
                deliver(event_tx, pos, chunk);
            }
            Ok(_) => {}
            Err(err) => log::error!("load failed at {index:?}: {err}"),
        }
    }
    RequestSummary {
        kind: RequestKind::Load,
        delivered,
        total: extent.x * extent.y * extent.z,
    }
}

async fn process_copy<R: BlockRegistry>(
    store: &mut ChunkStore,
    registry: &R,
    request: &RegionRequest,
    event_tx: &mpsc::UnboundedSender<PipelineEvent>,
) -> RequestSummary {
    let lod = request.lod;

    // Source origin moves into LOD-chunk space and the extent rounds up
    // so partial trailing groups stay covered; the destination origin is
    // used as-is.
    let src = IVec3::new(
        lod.chunk_coord(request.src.pos.x),
        lod.chunk_coord(request.src.pos.y),
        lod.chunk_coord(request.src.pos.z),
    );
    let extent = glam::UVec3::new(
        lod.ceil_chunks(request.extent.x),
        lod.ceil_chunks(request.extent.y),
        lod.ceil_chunks(request.extent.z),
    );

    // Packed delta from destination space into LOD source space; applied
    // per chunk without unpacking the destination index again.
    let offset = ChunkIndex::pack(src.x, src.y, src.z, request.src.dim)
        .offset_from(request.dst.index());

    let mut accessor = LodAccessor::new(store, registry, lod);
    let mut delivered = 0;
    for d in iter_cuboid(extent) {
        let pos = request.dst.pos + d;
        let dst_index = ChunkIndex::pack(pos.x, pos.y, pos.z, request.dst.dim);
        match accessor.get_by_index(dst_index.offset_by(offset)).await {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                delivered += 1;
                deliver(event_tx, pos, chunk);
            }
            Ok(_) => {}
            Err(err) => log::error!("copy failed at {dst_index:?}: {err}"),
        }
    }
    RequestSummary {
        kind: RequestKind::Copy,
        delivered,
        total: extent.x * extent.y * extent.z,
    }
}

fn deliver(event_tx: &mpsc::UnboundedSender<PipelineEvent>, pos: IVec3, mut chunk: VoxelChunk) {
    // Delivered chunks were loaded or synthesized outside the normal
    // generation path; the host still has to save them.
    chunk.mark_needs_persist();
    let _ = event_tx.send(PipelineEvent::Chunk {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        chunk,
    });
}
