//! driftwire-store: durable state behind the driftwire event plane.
//!
//! Three small contracts back the whole service:
//!
//! - [`OutboxStore`] - append-only, globally-ordered event log with TTL reaping
//! - [`SequenceAllocator`] - atomic issuance of the next global sequence number
//! - [`CheckpointStore`] - per-client record of the last delivered sequence
//!
//! Two backends are provided: [`MemoryStore`] for tests and single-process
//! development, and [`SqliteStore`] for durable single-node deployments. Any
//! backend offering ordered reads, an atomic counter, and single-row upsert
//! can implement the same traits.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Checkpoint, CheckpointStore, OutboxEntry, OutboxStore, SequenceAllocator};
