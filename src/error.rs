//! Error types for calibre-catalog

use std::path::PathBuf;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Handle`](crate::Handle) and its collaborators.
///
/// Nothing is retried internally; every error reaches the caller with the
/// operation (and path or id) that failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Missing or invalid library configuration.
   #[error("invalid configuration: {message}")]
   Configuration {
      message: String,
      path: Option<PathBuf>,
   },

   /// Stat, copy or rename of the catalog snapshot failed. The previous
   /// snapshot stays valid.
   #[error(transparent)]
   Snapshot(sqlx_sqlite_snapshot::Error),

   /// Opening or pinging a connection against the snapshot failed.
   #[error(transparent)]
   Connection(sqlx::Error),

   /// A generated statement failed to prepare or execute.
   #[error("{operation} failed: {source}")]
   Statement {
      operation: &'static str,
      #[source]
      source: sqlx::Error,
   },

   /// A result row could not be mapped.
   #[error("{operation}: cannot read column '{column}': {source}")]
   Scan {
      operation: &'static str,
      column: &'static str,
      #[source]
      source: sqlx::Error,
   },

   /// Invalid query options.
   #[error(transparent)]
   Options(#[from] calibre_query::Error),

   /// The caller cancelled the request before a connection was acquired.
   #[error("operation cancelled")]
   Cancelled,

   /// The handle has been closed.
   #[error("catalog handle has been closed")]
   Closed,
}

impl From<sqlx_sqlite_snapshot::Error> for Error {
   fn from(err: sqlx_sqlite_snapshot::Error) -> Self {
      match err {
         sqlx_sqlite_snapshot::Error::Cancelled => Error::Cancelled,
         sqlx_sqlite_snapshot::Error::PoolClosed => Error::Closed,
         sqlx_sqlite_snapshot::Error::Sqlx(e) => Error::Connection(e),
         other => Error::Snapshot(other),
      }
   }
}

impl Error {
   pub(crate) fn configuration(message: impl Into<String>, path: Option<PathBuf>) -> Self {
      Error::Configuration {
         message: message.into(),
         path,
      }
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Configuration { .. } => "CONFIGURATION_ERROR".to_string(),
         Error::Snapshot(_) => "SNAPSHOT_ERROR".to_string(),
         Error::Connection(_) => "CONNECTION_ERROR".to_string(),
         Error::Statement { source, .. } => {
            if let Some(code) = source.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "STATEMENT_ERROR".to_string()
         }
         Error::Scan { .. } => "SCAN_ERROR".to_string(),
         Error::Options(e) => e.error_code(),
         Error::Cancelled => "CANCELLED".to_string(),
         Error::Closed => "CLOSED".to_string(),
      }
   }
}
