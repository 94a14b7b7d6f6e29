//! Statements run against the catalog snapshot.
//!
//! Related entities are folded into one text column per relation so a page
//! of documents is a single statement. Each list is encoded as
//! `id<US>name<RS>id<US>name…`, using the ASCII unit separator (31) between
//! fields and the record separator (30) between entries.

use calibre_query::SqlFragment;
use serde_json::Value as JsonValue;
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;

pub(crate) const UNIT_SEPARATOR: char = '\u{1f}';
pub(crate) const RECORD_SEPARATOR: char = '\u{1e}';

/// Every column decoded into a full [`Document`](crate::Document).
const DOCUMENT_COLUMNS: &str = "\
b.id AS id, \
b.title AS title, \
b.sort AS sort, \
CAST(b.timestamp AS TEXT) AS timestamp, \
CAST(b.pubdate AS TEXT) AS pubdate, \
b.series_index AS series_index, \
b.isbn AS isbn, \
b.lccn AS lccn, \
b.path AS path, \
b.flags AS flags, \
b.uuid AS uuid, \
CAST(b.has_cover AS INTEGER) AS has_cover, \
(SELECT group_concat(x, char(30)) FROM (\
SELECT a.id || char(31) || a.name AS x FROM books_authors_link ba \
JOIN authors a ON(ba.author = a.id) WHERE ba.book = b.id ORDER BY ba.id)) AS authors, \
(SELECT p.id || char(31) || p.name FROM books_publishers_link bp \
JOIN publishers p ON(bp.publisher = p.id) WHERE bp.book = b.id LIMIT 1) AS publisher, \
(SELECT r.id || char(31) || r.rating FROM books_ratings_link br \
JOIN ratings r ON(br.rating = r.id) WHERE br.book = b.id LIMIT 1) AS rating, \
(SELECT s.id || char(31) || s.name FROM books_series_link bs \
JOIN series s ON(bs.series = s.id) WHERE bs.book = b.id LIMIT 1) AS series, \
(SELECT group_concat(x, char(30)) FROM (\
SELECT t.id || char(31) || t.name AS x FROM books_tags_link bt \
JOIN tags t ON(bt.tag = t.id) WHERE bt.book = b.id ORDER BY t.name)) AS tags, \
(SELECT group_concat(x, char(30)) FROM (\
SELECT d.id || char(31) || d.format AS x FROM data d \
WHERE d.book = b.id ORDER BY d.format)) AS formats, \
(SELECT group_concat(x, char(30)) FROM (\
SELECT l.id || char(31) || l.lang_code AS x FROM books_languages_link bl \
JOIN languages l ON(bl.lang_code = l.id) WHERE bl.book = b.id ORDER BY bl.item_order)) AS languages, \
(SELECT group_concat(x, char(30)) FROM (\
SELECT i.id || char(31) || i.type || char(31) || i.val AS x FROM identifiers i \
WHERE i.book = b.id ORDER BY i.type)) AS identifiers, \
(SELECT c.text FROM comments c WHERE c.book = b.id) AS comment, \
(SELECT MAX(d.uncompressed_size) FROM data d WHERE d.book = b.id) AS size";

/// Columns of the cheap projection used for building links.
const MINIMAL_COLUMNS: &str = "\
b.id AS id, \
b.title AS title, \
b.path AS path, \
(SELECT group_concat(x, char(30)) FROM (\
SELECT d.id || char(31) || d.format AS x FROM data d \
WHERE d.book = b.id ORDER BY d.format)) AS formats";

/// `SELECT COUNT(*)` over the books matching `filter`.
pub(crate) fn count(filter: &SqlFragment) -> SqlFragment {
   SqlFragment::new(
      format!("SELECT COUNT(*) AS count FROM books b {}", filter.where_clause())
         .trim_end()
         .to_string(),
      filter.params().to_vec(),
   )
}

/// One page of full documents matching `filter`.
pub(crate) fn documents(filter: &SqlFragment, order_by: &str, limit: &str) -> SqlFragment {
   let where_clause = filter.where_clause();
   let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM books b");
   for clause in [where_clause.as_str(), order_by, limit] {
      if !clause.is_empty() {
         sql.push(' ');
         sql.push_str(clause);
      }
   }

   SqlFragment::new(sql, filter.params().to_vec())
}

pub(crate) fn document(id: i64) -> SqlFragment {
   SqlFragment::new(
      format!("SELECT {DOCUMENT_COLUMNS} FROM books b WHERE b.id = ?"),
      vec![JsonValue::from(id)],
   )
}

pub(crate) fn document_minimal(id: i64) -> SqlFragment {
   SqlFragment::new(
      format!("SELECT {MINIMAL_COLUMNS} FROM books b WHERE b.id = ?"),
      vec![JsonValue::from(id)],
   )
}

pub(crate) fn all_ids() -> SqlFragment {
   SqlFragment::new("SELECT b.id AS id, b.path AS path FROM books b ORDER BY b.id", Vec::new())
}

pub(crate) fn custom_columns() -> SqlFragment {
   SqlFragment::new(
      "SELECT id, label, name, datatype, \
       CAST(is_multiple AS INTEGER) AS is_multiple, \
       CAST(normalized AS INTEGER) AS normalized, \
       display \
       FROM custom_columns WHERE mark_for_delete = 0 ORDER BY id",
      Vec::new(),
   )
}

/// Prepare `statement` with its parameters bound in order.
pub(crate) fn query_with(statement: &SqlFragment) -> Query<'_, Sqlite, SqliteArguments<'_>> {
   statement
      .params()
      .iter()
      .fold(sqlx::query(statement.sql()), |query, value| {
         bind_value(query, value)
      })
}

/// Bind a JSON value to a query
fn bind_value<'a>(
   query: Query<'a, Sqlite, SqliteArguments<'a>>,
   value: &JsonValue,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<String>),
      JsonValue::String(s) => query.bind(s.clone()),
      JsonValue::Bool(b) => query.bind(*b),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64()
            && let Ok(int_val) = i64::try_from(uint_val)
         {
            query.bind(int_val)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other.to_string()),
   }
}
