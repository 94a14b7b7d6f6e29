use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use calibre_catalog::{
   CatalogConfig, DocumentField, EntityKind, Error, FieldVisibility, Handle, QueryOptions,
   SnapshotConfig, SortBy, TraceConfig,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use sqlx_sqlite_snapshot::CacheLayout;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = r#"
CREATE TABLE books (
   id INTEGER PRIMARY KEY,
   title TEXT NOT NULL DEFAULT 'Unknown',
   sort TEXT,
   timestamp TIMESTAMP,
   pubdate TIMESTAMP,
   series_index REAL NOT NULL DEFAULT 1.0,
   author_sort TEXT,
   isbn TEXT DEFAULT '',
   lccn TEXT DEFAULT '',
   path TEXT NOT NULL DEFAULT '',
   flags INTEGER NOT NULL DEFAULT 1,
   uuid TEXT,
   has_cover BOOL DEFAULT 0
);
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL, sort TEXT, link TEXT DEFAULT '');
CREATE TABLE books_authors_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, author INTEGER NOT NULL);
CREATE TABLE publishers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE books_publishers_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, publisher INTEGER NOT NULL);
CREATE TABLE ratings (id INTEGER PRIMARY KEY, rating INTEGER);
CREATE TABLE books_ratings_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, rating INTEGER NOT NULL);
CREATE TABLE series (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE books_series_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, series INTEGER NOT NULL);
CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE books_tags_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, tag INTEGER NOT NULL);
CREATE TABLE languages (id INTEGER PRIMARY KEY, lang_code TEXT NOT NULL);
CREATE TABLE books_languages_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, lang_code INTEGER NOT NULL, item_order INTEGER NOT NULL DEFAULT 0);
CREATE TABLE data (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, format TEXT NOT NULL, uncompressed_size INTEGER NOT NULL, name TEXT NOT NULL);
CREATE TABLE identifiers (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, type TEXT NOT NULL DEFAULT 'isbn', val TEXT NOT NULL);
CREATE TABLE comments (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, text TEXT NOT NULL);
CREATE TABLE custom_columns (
   id INTEGER PRIMARY KEY,
   label TEXT NOT NULL,
   name TEXT NOT NULL,
   datatype TEXT NOT NULL,
   mark_for_delete BOOL DEFAULT 0 NOT NULL,
   editable BOOL DEFAULT 1 NOT NULL,
   display TEXT DEFAULT '{}' NOT NULL,
   is_multiple BOOL DEFAULT 0 NOT NULL,
   normalized BOOL NOT NULL
);
CREATE TABLE custom_column_1 (id INTEGER PRIMARY KEY, value TEXT NOT NULL);
CREATE TABLE books_custom_column_1_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, value INTEGER NOT NULL);
"#;

const DATA: &str = r#"
INSERT INTO books (id, title, sort, timestamp, pubdate, series_index, author_sort, isbn, path, uuid, has_cover) VALUES
   (1, 'Dune', 'Dune', '2024-01-10 10:00:00+00:00', '1965-08-01 00:00:00+00:00', 1.0, 'Herbert, Frank', '9780441013593', 'Frank Herbert/Dune (1)', '1c0d1e2f-0000-4000-8000-000000000001', 1),
   (2, 'Dune Messiah', 'Dune Messiah', '2024-02-10 10:00:00+00:00', '1969-10-15 00:00:00+00:00', 2.0, 'Herbert, Frank', '', 'Frank Herbert/Dune Messiah (2)', 'garbage', 0),
   (3, 'The Left Hand of Darkness', 'Left Hand of Darkness, The', '2024-03-10 10:00:00+00:00', '0101-01-01 00:00:00+00:00', 1.0, 'Le Guin, Ursula K.', '', 'Ursula K. Le Guin/The Left Hand of Darkness (3)', NULL, 1),
   (4, 'The Go Programming Language', 'Go Programming Language, The', '2024-04-10 10:00:00+00:00', '2015-10-26 00:00:00+00:00', 1.0, 'Donovan, Alan', '', 'Alan Donovan/The Go Programming Language (4)', NULL, 0);

INSERT INTO authors (id, name, sort) VALUES
   (1, 'Frank Herbert', 'Herbert, Frank'),
   (2, 'Ursula K. Le Guin', 'Le Guin, Ursula K.'),
   (3, 'Alan Donovan', 'Donovan, Alan'),
   (4, 'Brian Kernighan', 'Kernighan, Brian');
INSERT INTO books_authors_link (book, author) VALUES (1, 1), (2, 1), (3, 2), (4, 3), (4, 4);

INSERT INTO tags (id, name) VALUES (1, 'Science Fiction'), (2, 'Golang'), (3, 'Classics');
INSERT INTO books_tags_link (book, tag) VALUES (1, 1), (1, 3), (2, 1), (3, 1), (3, 3), (4, 2);

INSERT INTO series (id, name) VALUES (1, 'Dune');
INSERT INTO books_series_link (book, series) VALUES (1, 1), (2, 1);

INSERT INTO publishers (id, name) VALUES (1, 'Ace'), (2, 'Addison-Wesley');
INSERT INTO books_publishers_link (book, publisher) VALUES (1, 1), (2, 1), (4, 2);

INSERT INTO ratings (id, rating) VALUES (1, 10), (2, 8);
INSERT INTO books_ratings_link (book, rating) VALUES (1, 1), (3, 2);

INSERT INTO languages (id, lang_code) VALUES (1, 'eng');
INSERT INTO books_languages_link (book, lang_code) VALUES (1, 1), (2, 1), (3, 1), (4, 1);

INSERT INTO data (id, book, format, uncompressed_size, name) VALUES
   (1, 1, 'EPUB', 1000, 'Dune'),
   (2, 1, 'PDF', 5000, 'Dune'),
   (3, 2, 'EPUB', 2000, 'Dune Messiah'),
   (4, 3, 'EPUB', 3000, 'The Left Hand of Darkness'),
   (5, 4, 'PDF', 9000, 'The Go Programming Language');

INSERT INTO identifiers (id, book, type, val) VALUES
   (1, 1, 'isbn', '9780441013593'),
   (2, 1, 'goodreads', '234225'),
   (3, 4, 'mobi-asin', 'B0');

INSERT INTO comments (book, text) VALUES (1, 'The spice must flow'), (3, 'A winter planet');

INSERT INTO custom_columns (id, label, name, datatype, mark_for_delete, is_multiple, normalized) VALUES
   (1, 'genre', 'Genre', 'text', 0, 1, 1),
   (2, 'retired', 'Retired', 'text', 1, 0, 0);
INSERT INTO custom_column_1 (id, value) VALUES (1, 'Space Opera'), (2, 'Anthropology');
INSERT INTO books_custom_column_1_link (book, value) VALUES (1, 1), (2, 1), (3, 2);
"#;

struct Fixture {
   handle: Handle,
   library: PathBuf,
   cancel: CancellationToken,
   temp: TempDir,
}

async fn execute(path: &Path, script: &str) {
   let mut conn = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .connect()
      .await
      .unwrap();

   sqlx::raw_sql(script).execute(&mut conn).await.unwrap();
   conn.close().await.unwrap();
}

fn config(temp: &TempDir, library: &Path) -> CatalogConfig {
   CatalogConfig {
      snapshot: SnapshotConfig {
         cache_root: temp.path().join("cache"),
         ..Default::default()
      },
      ..CatalogConfig::new(library)
   }
}

async fn setup_with(configure: impl FnOnce(&mut CatalogConfig)) -> Fixture {
   let temp = TempDir::new().expect("Failed to create temp directory");
   let library = temp.path().join("library");
   std::fs::create_dir_all(&library).unwrap();
   execute(&library.join("metadata.db"), &format!("{SCHEMA}{DATA}")).await;

   let mut config = config(&temp, &library);
   configure(&mut config);

   let cancel = CancellationToken::new();
   let handle = Handle::open(config, &cancel).await.unwrap();

   Fixture {
      handle,
      library,
      cancel,
      temp,
   }
}

async fn setup() -> Fixture {
   setup_with(|_| {}).await
}

fn ids(page: &calibre_catalog::DocumentPage) -> Vec<i64> {
   page.documents.iter().map(|doc| doc.id).collect()
}

// ============================================================================
// Open
// ============================================================================

#[tokio::test]
async fn open_requires_a_catalog() {
   let temp = TempDir::new().unwrap();
   let err = Handle::open(config(&temp, temp.path()), &CancellationToken::new())
      .await
      .unwrap_err();

   assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn open_registers_custom_columns() {
   let fx = setup().await;

   let columns = fx.handle.query_custom_columns(&fx.cancel).await.unwrap();
   assert_eq!(columns.len(), 1, "columns marked for deletion are skipped");
   assert_eq!(columns[0].label, "genre");
   assert_eq!(columns[0].name, "Genre");
   assert!(columns[0].is_multiple);
   assert!(columns[0].normalized);

   assert!(fx.handle.registry().lookup("#genre").is_some());
   assert!(fx.handle.registry().lookup("#retired").is_none());
}

// ============================================================================
// Browse
// ============================================================================

#[tokio::test]
async fn browse_everything_in_id_order() {
   let fx = setup().await;

   let page = fx
      .handle
      .query_by(&QueryOptions::default(), &fx.cancel)
      .await
      .unwrap();

   assert_eq!(page.count, 4);
   assert_eq!(ids(&page), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn browse_by_entity() {
   let fx = setup().await;
   let mut options = QueryOptions::default();

   options.set_entity(EntityKind::Tags, 1);
   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(page.count, 3);
   assert_eq!(ids(&page), vec![1, 2, 3]);

   options.set_entity(EntityKind::Authors, 4);
   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![4]);

   // Row 2 of `data` is a PDF; every book with a PDF matches
   options.set_entity(EntityKind::Formats, 2);
   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![1, 4]);

   options.set_entity(EntityKind::Series, 1);
   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![1, 2]);
}

#[tokio::test]
async fn browse_within_virtual_library() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_entity(EntityKind::Tags, 1);
   options.set_virt_lib(r#"#genre:"=Space Opera""#);

   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(page.count, 2);
   assert_eq!(ids(&page), vec![1, 2]);
}

#[tokio::test]
async fn pages_through_results() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_limit_length(3).unwrap();

   let first = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(first.count, 4);
   assert_eq!(ids(&first), vec![1, 2, 3]);

   options.set_query_count(Some(first.count));
   options.inc_limit();
   let second = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(second.count, 4);
   assert_eq!(ids(&second), vec![4]);

   options.inc_limit();
   assert_eq!(options.limit_start(), 3, "no page after the last one");
}

#[tokio::test]
async fn sort_by_title_descending() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_sort_by(SortBy::Title);
   options.set_descending(true);

   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   // Sort titles: Left Hand…, Go Programming…, Dune Messiah, Dune
   assert_eq!(ids(&page), vec![3, 4, 2, 1]);
}

#[tokio::test]
async fn sort_by_size() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_sort_by(SortBy::Size);

   let page = fx.handle.query_by(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![2, 3, 1, 4]);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn search_exact_tag() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_matching(r#"tags:"=Golang""#);

   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(page.count, 1);
   assert_eq!(page.documents[0].title, "The Go Programming Language");
}

#[tokio::test]
async fn search_free_text_across_fields() {
   let fx = setup().await;
   let mut options = QueryOptions::default();

   options.set_matching("herbert");
   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![1, 2]);

   // Comment text is searched as well
   options.set_matching("winter");
   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![3]);
}

#[tokio::test]
async fn search_connectives_and_negation() {
   let fx = setup().await;
   let mut options = QueryOptions::default();

   // Negation applies to the comparison: books with some tag other than
   // Science Fiction
   options.set_matching(r#"!tags:"=Science Fiction""#);
   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![1, 3, 4]);

   options.set_matching(r#"series:"=Dune" and !tags:"=Science Fiction""#);
   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![1]);

   options.set_matching(r#"tags:"=Golang" or tags:"=Classics""#);
   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![1, 3, 4]);
}

#[tokio::test]
async fn search_custom_column() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_matching(r#"#genre:"~anthro""#);

   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(ids(&page), vec![3]);
}

#[tokio::test]
async fn search_without_matches_returns_no_documents() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_matching("zzz-no-such-book");

   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(page.count, 0);
   assert!(page.documents.is_empty());
}

#[tokio::test]
async fn count_bounds_the_page() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_limit_length(2).unwrap();

   for matching in ["", "dune", "herbert", r#"tags:"=Golang""#, "e"] {
      options.set_matching(matching);
      let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
      let expected = usize::try_from(page.count).unwrap().min(2);
      assert_eq!(page.documents.len(), expected, "matching {matching:?}");
   }
}

#[tokio::test]
async fn quotes_in_terms_are_data() {
   let fx = setup().await;
   let mut options = QueryOptions::default();
   options.set_matching(r#"title:"=x\") OR 1=1 --""#);

   let page = fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   assert_eq!(page.count, 0);
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn full_document() {
   let fx = setup().await;
   let doc = fx
      .handle
      .query_document(1, &fx.cancel)
      .await
      .unwrap()
      .expect("document 1 exists");

   assert_eq!(doc.title, "Dune");
   assert_eq!(doc.authors.len(), 1);
   assert_eq!(doc.authors[0].name, "Frank Herbert");
   assert_eq!(doc.authors[0].url, "/authors/1");

   let tags: Vec<_> = doc.tags.iter().map(|t| t.name.as_str()).collect();
   assert_eq!(tags, vec!["Classics", "Science Fiction"]);

   assert_eq!(doc.series.as_ref().map(|s| s.name.as_str()), Some("Dune"));
   assert_eq!(doc.series_index, 1.0);
   assert_eq!(doc.publisher.as_ref().map(|p| p.name.as_str()), Some("Ace"));
   assert_eq!(doc.rating.as_ref().map(|r| r.name.as_str()), Some("10"));
   assert_eq!(doc.size, 5000);
   assert_eq!(doc.comment, "The spice must flow");
   assert_eq!(doc.isbn, "9780441013593");
   assert_eq!(doc.path, "Frank Herbert/Dune (1)");
   assert!(doc.has_cover);
   assert!(doc.uuid.is_some());
   assert_eq!(doc.timestamp.map(|t| t.year()), Some(2024));
   assert_eq!(doc.pubdate.map(|t| t.year()), Some(1965));

   let formats: Vec<_> = doc.formats.iter().map(|f| f.name.as_str()).collect();
   assert_eq!(formats, vec!["EPUB", "PDF"]);
   assert_eq!(doc.languages[0].name, "eng");

   let isbn = doc.identifiers.iter().find(|i| i.kind == "isbn").unwrap();
   assert_eq!(
      isbn.url.as_deref(),
      Some("https://www.worldcat.org/isbn/9780441013593")
   );
}

#[tokio::test]
async fn document_edge_values() {
   let fx = setup().await;

   // Undefined publication date and missing uuid
   let doc = fx.handle.query_document(3, &fx.cancel).await.unwrap().unwrap();
   assert_eq!(doc.pubdate, None);
   assert_eq!(doc.uuid, None);
   assert_eq!(doc.publisher, None);

   // Invalid uuid text
   let doc = fx.handle.query_document(2, &fx.cancel).await.unwrap().unwrap();
   assert_eq!(doc.uuid, None);

   // Authors keep their link order
   let doc = fx.handle.query_document(4, &fx.cancel).await.unwrap().unwrap();
   let authors: Vec<_> = doc.authors.iter().map(|a| a.name.as_str()).collect();
   assert_eq!(authors, vec!["Alan Donovan", "Brian Kernighan"]);
   assert_eq!(doc.identifiers[0].url, None);

   assert!(fx.handle.query_document(99, &fx.cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn minimal_document() {
   let fx = setup().await;
   let doc = fx
      .handle
      .query_document_minimal(1, &fx.cancel)
      .await
      .unwrap()
      .unwrap();

   assert_eq!(doc.id, 1);
   assert_eq!(doc.title, "Dune");
   assert_eq!(doc.path, "Frank Herbert/Dune (1)");
   assert_eq!(doc.formats.len(), 2);
   assert!(doc.authors.is_empty());
   assert!(doc.tags.is_empty());

   assert!(
      fx.handle
         .query_document_minimal(99, &fx.cancel)
         .await
         .unwrap()
         .is_none()
   );
}

#[tokio::test]
async fn all_ids_with_paths() {
   let fx = setup().await;
   let locations = fx.handle.query_all_ids(&fx.cancel).await.unwrap();

   assert_eq!(locations.len(), 4);
   assert_eq!(locations[0].id, 1);
   assert_eq!(locations[0].path, "Frank Herbert/Dune (1)");
   assert_eq!(locations[3].id, 4);
}

struct HideTagsAndComments;

impl FieldVisibility for HideTagsAndComments {
   fn is_visible(&self, field: DocumentField) -> bool {
      !matches!(field, DocumentField::Tags | DocumentField::Comment)
   }
}

#[tokio::test]
async fn hidden_fields_are_cleared() {
   let fx = setup().await;
   let Fixture {
      handle,
      cancel,
      temp: _temp,
      ..
   } = fx;
   let handle = handle.with_visibility(Arc::new(HideTagsAndComments));

   let doc = handle.query_document(1, &cancel).await.unwrap().unwrap();
   assert!(doc.tags.is_empty());
   assert!(doc.comment.is_empty());
   assert_eq!(doc.authors.len(), 1);
   assert_eq!(doc.series_index, 1.0);
}

// ============================================================================
// Snapshot freshness
// ============================================================================

#[tokio::test]
async fn reopens_after_catalog_changes() {
   let fx = setup().await;
   assert_eq!(fx.handle.query_all_ids(&fx.cancel).await.unwrap().len(), 4);
   let generation = fx.handle.snapshot_generation();

   let source = fx.library.join("metadata.db");
   execute(
      &source,
      "INSERT INTO books (id, title, sort, path) VALUES (5, 'Neuromancer', 'Neuromancer', 'William Gibson/Neuromancer (5)')",
   )
   .await;
   // Make the change visible regardless of timestamp granularity
   let layout = CacheLayout::new(fx.temp.path().join("cache"), &source);
   std::fs::OpenOptions::new()
      .write(true)
      .open(layout.snapshot())
      .unwrap()
      .set_modified(SystemTime::now() - Duration::from_secs(3600))
      .unwrap();

   let locations = fx.handle.query_all_ids(&fx.cancel).await.unwrap();
   assert_eq!(locations.len(), 5);
   assert_eq!(locations[4].path, "William Gibson/Neuromancer (5)");
   assert_eq!(fx.handle.snapshot_generation(), generation + 1);

   // One change, one drain
   assert_eq!(fx.handle.pool().generation(), 1);

   fx.handle.query_all_ids(&fx.cancel).await.unwrap();
   assert_eq!(fx.handle.snapshot_generation(), generation + 1);
   assert_eq!(fx.handle.pool().generation(), 1);
}

#[tokio::test]
async fn connection_held_across_a_change_does_not_pin_the_old_snapshot() {
   let fx = setup().await;
   let held = fx.handle.pool().acquire(&fx.cancel).await.unwrap();

   let source = fx.library.join("metadata.db");
   execute(
      &source,
      "INSERT INTO books (id, title, sort, path) VALUES (5, 'Neuromancer', 'Neuromancer', 'William Gibson/Neuromancer (5)')",
   )
   .await;
   let layout = CacheLayout::new(fx.temp.path().join("cache"), &source);
   std::fs::OpenOptions::new()
      .write(true)
      .open(layout.snapshot())
      .unwrap()
      .set_modified(SystemTime::now() - Duration::from_secs(3600))
      .unwrap();

   // Opened while the old generation is still checked out
   assert_eq!(fx.handle.query_all_ids(&fx.cancel).await.unwrap().len(), 5);
   assert_eq!(held.generation(), 0);

   drop(held);
   assert_eq!(fx.handle.query_all_ids(&fx.cancel).await.unwrap().len(), 5);
   assert_eq!(fx.handle.pool().generation(), 1);
   assert_eq!(fx.handle.pool().live_connections(), 1);
}

#[tokio::test]
async fn unchanged_catalog_keeps_connections() {
   let fx = setup().await;

   fx.handle.query_all_ids(&fx.cancel).await.unwrap();
   fx.handle.query_all_ids(&fx.cancel).await.unwrap();

   assert_eq!(fx.handle.pool().generation(), 0);
   assert_eq!(fx.handle.pool().live_connections(), 1);
   assert_eq!(fx.handle.pool().idle_connections(), 1);
}

// ============================================================================
// Cancellation and close
// ============================================================================

#[tokio::test]
async fn cancelled_query_acquires_nothing() {
   let fx = setup().await;
   let live = fx.handle.pool().live_connections();

   let cancel = CancellationToken::new();
   cancel.cancel();
   let err = fx
      .handle
      .query_by(&QueryOptions::default(), &cancel)
      .await
      .unwrap_err();

   assert!(matches!(err, Error::Cancelled));
   assert_eq!(err.error_code(), "CANCELLED");
   assert_eq!(fx.handle.pool().live_connections(), live);
}

#[tokio::test]
async fn closed_handle_refuses_queries() {
   let fx = setup().await;

   fx.handle.close().await;
   fx.handle.close().await;

   let err = fx.handle.query_all_ids(&fx.cancel).await.unwrap_err();
   assert!(matches!(err, Error::Closed));
   assert_eq!(fx.handle.pool().live_connections(), 0);
}

// ============================================================================
// Trace log
// ============================================================================

#[tokio::test]
async fn statements_are_traced() {
   let temp = TempDir::new().unwrap();
   let trace_file = temp.path().join("sql.log");
   let file = trace_file.clone();

   let fx = setup_with(move |config| {
      config.trace = TraceConfig {
         file: Some(file),
         ..Default::default()
      };
   })
   .await;

   let mut options = QueryOptions::default();
   options.set_matching(r#"tags:"=Golang""#);
   fx.handle.query_search(&options, &fx.cancel).await.unwrap();
   fx.handle.close().await;

   let log = std::fs::read_to_string(&trace_file).unwrap();
   let lines: Vec<_> = log.lines().collect();

   // Custom columns on open, then count and page
   assert_eq!(lines.len(), 3, "{log}");
   assert!(lines[0].contains("FROM custom_columns"));
   assert!(lines[1].contains("SELECT COUNT(*) AS count FROM books b WHERE"));
   assert!(lines[1].contains(r#"= "Golang""#));
   assert!(lines[2].contains("LIMIT 20 OFFSET 0"));
   assert!(lines.iter().all(|line| !line.contains('\n')));
}
