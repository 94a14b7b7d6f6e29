//! Error types for sqlx-sqlite-snapshot

use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while snapshotting a database file or handing out
/// connections against the snapshot
#[derive(Error, Debug)]
pub enum Error {
   /// The source database could not be inspected. Usually the foreign
   /// application has not created it yet, or the library path is wrong.
   #[error("source database unavailable at {path}: {source}")]
   SourceUnavailable {
      path: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// The cache directory for the snapshot could not be created.
   #[error("cannot prepare cache directory {path}: {source}")]
   CacheDirectory {
      path: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// Streaming the source into the temporary file failed. The previous
   /// snapshot (if any) is left untouched.
   #[error("copying {from} to {to} failed: {source}")]
   Copy {
      from: PathBuf,
      to: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// Moving the completed temporary file over the snapshot failed.
   #[error("renaming {from} to {to} failed: {source}")]
   Rename {
      from: PathBuf,
      to: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// The per-generation reader file could not be created.
   #[error("linking {from} to {to} failed: {source}")]
   Link {
      from: PathBuf,
      to: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// Error from the sqlx library, returned as-is so open failures keep
   /// their original diagnostics
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// The caller cancelled before a connection was handed out
   #[error("operation cancelled")]
   Cancelled,

   /// Pool has been closed and cannot be used
   #[error("connection pool has been closed")]
   PoolClosed,
}

impl Error {
   /// True for errors caused by the file system rather than the database engine.
   pub fn is_io(&self) -> bool {
      matches!(
         self,
         Error::SourceUnavailable { .. }
            | Error::CacheDirectory { .. }
            | Error::Copy { .. }
            | Error::Rename { .. }
            | Error::Link { .. }
      )
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
