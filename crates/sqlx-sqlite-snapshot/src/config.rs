//! Configuration for snapshot synchronization and the snapshot connection pool

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`SnapshotSync`](crate::SnapshotSync) and the
/// [`ConnectionPool`](crate::ConnectionPool) opened against its snapshot
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_snapshot::SnapshotConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SnapshotConfig::default();
///
/// // Override just one field
/// let config = SnapshotConfig {
///     refresh_interval: Duration::from_secs(15),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
   /// Directory under which per-library snapshot directories are created
   ///
   /// Each source database gets its own subdirectory named after a hash of
   /// its path, so several libraries can share one cache root.
   ///
   /// Default: `<system temp dir>/sqlx-sqlite-snapshot`
   pub cache_root: PathBuf,

   /// How often the background task compares the source against the snapshot
   ///
   /// Default: 60 seconds
   pub refresh_interval: Duration,

   /// Maximum number of idle connections kept in the pool's free list
   ///
   /// Connections released while the free list is full are closed instead.
   ///
   /// Default: 6
   pub max_idle_connections: usize,
}

impl Default for SnapshotConfig {
   fn default() -> Self {
      Self {
         cache_root: std::env::temp_dir().join("sqlx-sqlite-snapshot"),
         refresh_interval: Duration::from_secs(60),
         max_idle_connections: 6,
      }
   }
}
