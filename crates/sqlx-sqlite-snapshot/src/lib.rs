//! # sqlx-sqlite-snapshot
//!
//! Read-only access to a SQLite database file that is owned and written by
//! another process. Queries never open the foreign file directly, so they can
//! neither block its writer nor observe a half-written page.
//!
//! ## Core Types
//!
//! - **[`SnapshotSync`]**: Copies the source database into a private cache
//!   location whenever its modification time moves past the snapshot's
//! - **[`ConnectionPool`]**: Free-list pool of read-only, shared-cache,
//!   query-only connections against the snapshot
//! - **[`CacheLayout`]**: Per-library cache directory layout
//! - **[`SnapshotConfig`]**: Cache root, refresh interval and pool sizing
//! - **[`Error`]**: Error type for snapshot and pool operations
//!
//! ## Architecture
//!
//! - **Atomic replacement**: Each copy streams into its own `<snapshot>~<tag>`
//!   and is renamed over the snapshot only after the copy fully succeeded
//! - **Serialized copies**: One mutex covers the stat/copy/rename sequence, so
//!   on-demand and periodic checks never race
//! - **Change pulses**: Each completed copy bumps a generation on a `watch`
//!   channel; readers compare generations to know when to reopen
//! - **Generation-aware pool**: Draining the pool retires every connection
//!   opened against an older snapshot, including ones still checked out
//! - **Reader paths**: Every generation is opened under its own hard link, so
//!   SQLite's shared cache never carries an old snapshot into a new generation

mod config;
mod error;
mod layout;
mod pool;
mod snapshot;

// Re-export public types
pub use config::SnapshotConfig;
pub use error::{Error, Result};
pub use layout::CacheLayout;
pub use pool::{ConnectionPool, PooledConnection};
pub use snapshot::{RefreshTask, SnapshotSync};
