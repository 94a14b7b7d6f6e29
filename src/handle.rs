//! The catalog handle: snapshot freshness, pooled connections and queries.

use std::sync::Arc;

use calibre_query::{FieldRegistry, QueryOptions, SqlFragment};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;
use sqlx_sqlite_snapshot::{
   CacheLayout, ConnectionPool, PooledConnection, RefreshTask, SnapshotSync,
};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::decode;
use crate::document::{
   AllFieldsVisible, BookLocation, CustomColumn, Document, DocumentPage, FieldVisibility,
};
use crate::error::{Error, Result};
use crate::sql;
use crate::trace::Tracer;

/// Read-only access to one calibre library.
///
/// Queries run against a private snapshot of `metadata.db`. Before every
/// query the snapshot is brought up to date, and when it moved on since the
/// last query all pooled connections are reopened against it, so a single
/// query always observes one self-consistent snapshot.
///
/// `Handle` is `Send + Sync`; share it behind an [`Arc`] between requests.
pub struct Handle {
   sync: Arc<SnapshotSync>,
   pool: ConnectionPool,
   refresh: parking_lot::Mutex<Option<RefreshTask>>,

   /// Snapshot generations seen by this handle. Held across the check and
   /// the drain so reopening is serialized per handle.
   dirty: tokio::sync::Mutex<watch::Receiver<u64>>,

   registry: FieldRegistry,
   tracer: Tracer,
   visibility: Arc<dyn FieldVisibility>,
}

impl std::fmt::Debug for Handle {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Handle")
         .field("source", &self.sync.layout().source())
         .field("snapshot", &self.sync.layout().snapshot())
         .field("pool", &self.pool)
         .finish_non_exhaustive()
   }
}

impl Handle {
   /// Open a library.
   ///
   /// Copies the catalog into the snapshot cache (failing if the copy
   /// fails), opens a first connection against the snapshot, registers the
   /// library's custom columns as search fields and starts the periodic
   /// refresh. Must be called from within a Tokio runtime.
   pub async fn open(config: CatalogConfig, cancel: &CancellationToken) -> Result<Self> {
      config.validate()?;

      let layout = CacheLayout::new(&config.snapshot.cache_root, config.source_path());
      let sync = Arc::new(SnapshotSync::new(layout));
      sync.ensure_fresh().await?;
      let dirty = sync.subscribe();

      let pool = ConnectionPool::new(sync.reader_path(), config.snapshot.max_idle_connections);
      let tracer = Tracer::new(&config.trace);

      let statement = sql::custom_columns();
      let columns = {
         let mut conn = pool.acquire(cancel).await?;
         trace_statement(&tracer, &statement).await;
         fetch_all(&mut conn, "open", &statement)
            .await?
            .iter()
            .map(|row| decode::custom_column(row, "open"))
            .collect::<Result<Vec<_>>>()?
      };
      let fields: Vec<_> = columns.iter().map(CustomColumn::search_field).collect();
      let registry = FieldRegistry::with_custom_fields(&fields);

      let refresh = sync.spawn_refresh(config.snapshot.refresh_interval);

      info!(
         library = %config.library_path.display(),
         snapshot = %sync.layout().snapshot().display(),
         custom_columns = columns.len(),
         "Opened catalog"
      );

      Ok(Self {
         sync,
         pool,
         refresh: parking_lot::Mutex::new(Some(refresh)),
         dirty: tokio::sync::Mutex::new(dirty),
         registry,
         tracer,
         visibility: Arc::new(AllFieldsVisible),
      })
   }

   /// Replace the field visibility policy applied to full documents.
   pub fn with_visibility(mut self, visibility: Arc<dyn FieldVisibility>) -> Self {
      self.visibility = visibility;
      self
   }

   /// Search fields known to this handle, custom columns included.
   pub fn registry(&self) -> &FieldRegistry {
      &self.registry
   }

   pub fn tracer(&self) -> &Tracer {
      &self.tracer
   }

   /// Generation of the snapshot on disk.
   pub fn snapshot_generation(&self) -> u64 {
      self.sync.generation()
   }

   pub fn pool(&self) -> &ConnectionPool {
      &self.pool
   }

   /// Check cancellation, refresh the snapshot and reopen on change, then
   /// hand out a connection.
   async fn connection(&self, cancel: &CancellationToken) -> Result<PooledConnection> {
      if cancel.is_cancelled() {
         return Err(Error::Cancelled);
      }
      if self.pool.is_closed() {
         return Err(Error::Closed);
      }

      self.sync.ensure_fresh().await?;

      {
         let mut dirty = self.dirty.lock().await;
         if dirty.has_changed().unwrap_or(false) {
            let generation = *dirty.borrow_and_update();
            self.pool.reopen_at(self.sync.reader_path()).await;
            debug!(generation, "Snapshot changed, reopening connections");
         }
      }

      Ok(self.pool.acquire(cancel).await?)
   }

   async fn trace(&self, statement: &SqlFragment) {
      trace_statement(&self.tracer, statement).await;
   }

   /// Count and fetch one page of documents matching `filter`.
   async fn query_page(
      &self,
      operation: &'static str,
      filter: SqlFragment,
      options: &QueryOptions,
      cancel: &CancellationToken,
   ) -> Result<DocumentPage> {
      let mut conn = self.connection(cancel).await?;

      let statement = sql::count(&filter);
      self.trace(&statement).await;
      let row = fetch_one(&mut conn, operation, &statement).await?;
      let count = decode::count(&row, operation)?;
      if count == 0 {
         return Ok(DocumentPage::default());
      }

      let statement = sql::documents(
         &filter,
         &options.build_order_clause(),
         &options.build_limit_clause(),
      );
      self.trace(&statement).await;
      let documents = fetch_all(&mut conn, operation, &statement)
         .await?
         .iter()
         .map(|row| decode::document(row, operation, self.visibility.as_ref()))
         .collect::<Result<Vec<_>>>()?;

      Ok(DocumentPage { count, documents })
   }

   /// Browse: the entity filter of `options` within its virtual library.
   pub async fn query_by(
      &self,
      options: &QueryOptions,
      cancel: &CancellationToken,
   ) -> Result<DocumentPage> {
      let filter = options.browse_filter(&self.registry);
      self.query_page("query_by", filter, options, cancel).await
   }

   /// Search: the search string of `options` within its virtual library.
   pub async fn query_search(
      &self,
      options: &QueryOptions,
      cancel: &CancellationToken,
   ) -> Result<DocumentPage> {
      let filter = options.search_filter(&self.registry);
      self.query_page("query_search", filter, options, cancel).await
   }

   /// A full document, or `None` when no document has this id.
   pub async fn query_document(
      &self,
      id: i64,
      cancel: &CancellationToken,
   ) -> Result<Option<Document>> {
      let mut conn = self.connection(cancel).await?;

      let statement = sql::document(id);
      self.trace(&statement).await;
      fetch_optional(&mut conn, "query_document", &statement)
         .await?
         .map(|row| decode::document(&row, "query_document", self.visibility.as_ref()))
         .transpose()
   }

   /// Id, title, path and formats of a document.
   pub async fn query_document_minimal(
      &self,
      id: i64,
      cancel: &CancellationToken,
   ) -> Result<Option<Document>> {
      let mut conn = self.connection(cancel).await?;

      let statement = sql::document_minimal(id);
      self.trace(&statement).await;
      fetch_optional(&mut conn, "query_document_minimal", &statement)
         .await?
         .map(|row| decode::document_minimal(&row, "query_document_minimal"))
         .transpose()
   }

   /// Id and directory of every document, ordered by id.
   pub async fn query_all_ids(&self, cancel: &CancellationToken) -> Result<Vec<BookLocation>> {
      let mut conn = self.connection(cancel).await?;

      let statement = sql::all_ids();
      self.trace(&statement).await;
      fetch_all(&mut conn, "query_all_ids", &statement)
         .await?
         .iter()
         .map(|row| decode::book_location(row, "query_all_ids"))
         .collect()
   }

   /// User-defined columns that are not marked for deletion.
   pub async fn query_custom_columns(
      &self,
      cancel: &CancellationToken,
   ) -> Result<Vec<CustomColumn>> {
      let mut conn = self.connection(cancel).await?;

      let statement = sql::custom_columns();
      self.trace(&statement).await;
      fetch_all(&mut conn, "query_custom_columns", &statement)
         .await?
         .iter()
         .map(|row| decode::custom_column(row, "query_custom_columns"))
         .collect()
   }

   /// Stop the refresh task, close every connection and flush the trace log.
   ///
   /// Later queries fail with [`Error::Closed`]. Closing twice is harmless.
   pub async fn close(&self) {
      let refresh = self.refresh.lock().take();
      if let Some(refresh) = refresh {
         refresh.shutdown().await;
      }

      self.pool.close().await;
      self.tracer.flush().await;
      debug!(source = %self.sync.layout().source().display(), "Closed catalog");
   }
}

async fn trace_statement(tracer: &Tracer, statement: &SqlFragment) {
   if tracer.is_enabled() {
      tracer
         .trace(&statement.to_string(), OffsetDateTime::now_utc())
         .await;
   }
}

async fn fetch_one(
   conn: &mut SqliteConnection,
   operation: &'static str,
   statement: &SqlFragment,
) -> Result<SqliteRow> {
   sql::query_with(statement)
      .fetch_one(conn)
      .await
      .map_err(|source| Error::Statement { operation, source })
}

async fn fetch_optional(
   conn: &mut SqliteConnection,
   operation: &'static str,
   statement: &SqlFragment,
) -> Result<Option<SqliteRow>> {
   sql::query_with(statement)
      .fetch_optional(conn)
      .await
      .map_err(|source| Error::Statement { operation, source })
}

async fn fetch_all(
   conn: &mut SqliteConnection,
   operation: &'static str,
   statement: &SqlFragment,
) -> Result<Vec<SqliteRow>> {
   sql::query_with(statement)
      .fetch_all(conn)
      .await
      .map_err(|source| Error::Statement { operation, source })
}
