#![forbid(unsafe_code)]
//! newsline-core library.
//!
//! Turns a noisy multi-source news feed into a deduplicated list whose order
//! stays put across refreshes.
//!
//! # Conventions
//!
//! - **Errors**: `StoreError` for storage backends, `anyhow::Result` for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod conflict;
pub mod error;
pub mod identity;
pub mod lock;
pub mod model;
pub mod ordering;
pub mod sequence;

pub use conflict::ConflictResolver;
pub use error::{ErrorCode, StoreError};
pub use identity::{IdentityKey, IdentityResolver, KeySource};
pub use model::{FeedSnapshot, OrderedFeed, OrderedItem, Published, RawItem};
pub use ordering::{OrderingEngine, RefreshContext, RefreshOutcome};
pub use sequence::{
    Assignment, FileKv, KvStore, LoadStatus, MemoryKv, SequenceRecord, SequenceStore, SqliteKv,
};
