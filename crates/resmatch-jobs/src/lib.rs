//! # resmatch-jobs
//!
//! Asynchronous job orchestration for resmatch.
//!
//! This crate provides:
//! - An in-memory job store with forward-only status transitions
//! - A FIFO queue drained by a fixed worker pool running the staged pipeline
//! - Per-job progress fan-out with coalescing, heartbeats, and idle timeout
//! - Cooperative cancellation and periodic expiry of finished jobs
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use resmatch_jobs::*;
//!
//! let broadcaster = Arc::new(ProgressBroadcaster::new(StreamConfig::from_env()));
//! let store = Arc::new(JobStore::new(broadcaster));
//! let (queue, receiver) = job_queue();
//! let artifacts: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
//!
//! let handle = WorkerBuilder::new(store.clone(), receiver, engine, artifacts.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .build()
//!     .start();
//!
//! let service = JobService::new(store, queue, artifacts);
//! let resume = service.artifacts().put("cv.txt", b"...").await?;
//! let job_id = service.submit_single(resume, "Rust engineer").await?;
//!
//! let mut events = service.subscribe(job_id)?;
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//!
//! handle.shutdown();
//! handle.join().await?;
//! ```

pub mod artifacts;
pub mod broadcast;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod worker;

// Re-export core types
pub use resmatch_core::*;

pub use artifacts::{FilesystemArtifactStore, MemoryArtifactStore};
pub use broadcast::{ProgressBroadcaster, StreamConfig, StreamEvent, Subscription};
pub use pipeline::{JobContext, PipelineError};
pub use queue::{job_queue, JobQueue, QueueReceiver, QueuedJob};
pub use service::JobService;
pub use store::JobStore;
pub use sweeper::SweeperConfig;
pub use worker::{WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle, WorkerPool};
