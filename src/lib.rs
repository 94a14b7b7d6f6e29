//! # calibre-catalog
//!
//! Read-only access to a calibre library's `metadata.db` while calibre itself
//! keeps writing to it. Queries never touch the live file: they run against
//! a private snapshot that is refreshed whenever the catalog changes.
//!
//! ## Core Types
//!
//! - **[`Handle`]**: Opens a library and answers browse, search and document
//!   queries
//! - **[`CatalogConfig`]**: Library path, snapshot cache and trace settings
//! - **[`Document`]**: One catalog entry with its authors, tags, series,
//!   formats and identifiers
//! - **[`QueryOptions`]**: Pagination, sort, entity filter and search string
//!   of one request
//! - **[`Tracer`]**: Optional log of every statement executed
//!
//! ## Example
//!
//! ```no_run
//! use calibre_catalog::{CatalogConfig, Handle, QueryOptions, SortBy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> calibre_catalog::Result<()> {
//! let cancel = CancellationToken::new();
//! let handle = Handle::open(CatalogConfig::new("/srv/books"), &cancel).await?;
//!
//! let mut options = QueryOptions::default();
//! options.set_matching("tags:\"=Science Fiction\" and herbert");
//! options.set_sort_by(SortBy::Title);
//!
//! let page = handle.query_search(&options, &cancel).await?;
//! println!("{} matches", page.count);
//! for document in page.documents {
//!    println!("{}", document.title);
//! }
//!
//! handle.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod decode;
mod document;
mod error;
mod handle;
mod sql;
mod trace;

// Re-export public types
pub use config::{CatalogConfig, METADATA_DB, OverflowPolicy, TraceConfig};
pub use document::{
   AllFieldsVisible, BookLocation, CustomColumn, Document, DocumentField, DocumentPage, Entity,
   FieldVisibility, Identifier,
};
pub use error::{Error, Result};
pub use handle::Handle;
pub use trace::Tracer;

// Query model, so callers need only one dependency
pub use calibre_query::{
   EntityKind, FieldRegistry, GuiLanguage, Layout, QueryOptions, SortBy, SqlFragment, Theme,
};
pub use sqlx_sqlite_snapshot::SnapshotConfig;
