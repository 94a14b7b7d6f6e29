//! Configuration for opening a catalog

use std::path::PathBuf;
use std::time::Duration;

use sqlx_sqlite_snapshot::SnapshotConfig;

use crate::error::{Error, Result};

/// File name of the catalog database inside a library directory.
pub const METADATA_DB: &str = "metadata.db";

/// What the trace writer does when its queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
   /// Discard the message and count it
   #[default]
   Drop,
   /// Wait until the writer catches up
   Block,
}

/// SQL trace log settings.
///
/// # Examples
///
/// ```
/// use calibre_catalog::{OverflowPolicy, TraceConfig};
///
/// let config = TraceConfig {
///     file: Some("/var/log/catalog-sql.log".into()),
///     overflow: OverflowPolicy::Block,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TraceConfig {
   /// Log file for executed statements. `None` disables tracing until
   /// [`Tracer::set_trace_file`](crate::Tracer::set_trace_file) is called.
   ///
   /// Default: `None`
   pub file: Option<PathBuf>,

   /// Messages queued for the writer before the overflow policy applies
   ///
   /// Default: 1024
   pub capacity: usize,

   /// Default: [`OverflowPolicy::Drop`]
   pub overflow: OverflowPolicy,

   /// How long the writer keeps the log file open without new messages
   ///
   /// Default: 5 seconds
   pub idle_timeout: Duration,
}

impl Default for TraceConfig {
   fn default() -> Self {
      Self {
         file: None,
         capacity: 1024,
         overflow: OverflowPolicy::Drop,
         idle_timeout: Duration::from_secs(5),
      }
   }
}

/// Everything needed to open a [`Handle`](crate::Handle).
///
/// # Examples
///
/// ```
/// use calibre_catalog::CatalogConfig;
/// use sqlx_sqlite_snapshot::SnapshotConfig;
/// use std::time::Duration;
///
/// let config = CatalogConfig {
///     snapshot: SnapshotConfig {
///         refresh_interval: Duration::from_secs(30),
///         ..Default::default()
///     },
///     ..CatalogConfig::new("/srv/books")
/// };
/// assert!(config.source_path().ends_with("metadata.db"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
   /// Library directory containing `metadata.db`
   pub library_path: PathBuf,

   /// Snapshot cache and pool settings
   pub snapshot: SnapshotConfig,

   /// SQL trace log settings
   pub trace: TraceConfig,
}

impl CatalogConfig {
   pub fn new(library_path: impl Into<PathBuf>) -> Self {
      Self {
         library_path: library_path.into(),
         ..Default::default()
      }
   }

   /// The catalog database owned by the foreign application.
   pub fn source_path(&self) -> PathBuf {
      self.library_path.join(METADATA_DB)
   }

   /// Check the library path before anything is copied.
   pub fn validate(&self) -> Result<()> {
      if self.library_path.as_os_str().is_empty() {
         return Err(Error::configuration("library path is empty", None));
      }
      if !self.library_path.is_dir() {
         return Err(Error::configuration(
            format!("library path {} is not a directory", self.library_path.display()),
            Some(self.library_path.clone()),
         ));
      }

      let source = self.source_path();
      if !source.is_file() {
         return Err(Error::configuration(
            format!("library directory has no {METADATA_DB}"),
            Some(source),
         ));
      }
      if self.snapshot.refresh_interval.is_zero() {
         return Err(Error::configuration("refresh interval must be non-zero", None));
      }
      if self.trace.capacity == 0 {
         return Err(Error::configuration("trace capacity must be non-zero", None));
      }

      Ok(())
   }
}
