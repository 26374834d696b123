// src/lib.rs
// Public library surface for the worker binary, the stub API and integration tests.

pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;

// Remote clients (HTTP JSON, S3-style, scripted mock)
pub mod remote;

// Sync pipeline: retry -> enumerate -> batch -> poll
pub mod batch;
pub mod enumerate;
pub mod filter;
pub mod poll;
pub mod retry;
pub mod worker;

// Local stand-in server for the remote APIs
pub mod stub_api;

// ---- Re-exports for stable public API ----
pub use crate::batch::{BatchOutcome, BatchProcessor, FailurePolicy, FanOut, ProcessedItem};
pub use crate::config::WorkerConfig;
pub use crate::enumerate::Enumerator;
pub use crate::error::{Result, SyncError};
pub use crate::filter::{FilterStage, RecordFilter};
pub use crate::poll::PollLoop;
pub use crate::remote::{ListEntry, RemoteClient, ResourceKey, ResourceRecord, Scope};
pub use crate::retry::{retry_call, RetryPolicy, RetryingFetcher};
pub use crate::worker::{CycleReport, SyncWorker};
