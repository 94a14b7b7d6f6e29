//! Row to model mapping

use calibre_query::EntityKind;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Decode, Row, Type};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use uuid::Uuid;

use crate::document::{BookLocation, CustomColumn, Document, Entity, FieldVisibility, Identifier};
use crate::error::{Error, Result};
use crate::sql::{RECORD_SEPARATOR, UNIT_SEPARATOR};

/// Dates up to this year stand for "no date" in the catalog.
const UNDEFINED_YEAR: i32 = 101;

/// Read one column, reporting the operation and column on failure.
fn column<'r, T>(row: &'r SqliteRow, operation: &'static str, column: &'static str) -> Result<T>
where
   T: Decode<'r, Sqlite> + Type<Sqlite>,
{
   row.try_get(column).map_err(|source| Error::Scan {
      operation,
      column,
      source,
   })
}

fn text(row: &SqliteRow, operation: &'static str, name: &'static str) -> Result<String> {
   Ok(column::<Option<String>>(row, operation, name)?.unwrap_or_default())
}

pub(crate) fn count(row: &SqliteRow, operation: &'static str) -> Result<u64> {
   let count: i64 = column(row, operation, "count")?;
   Ok(u64::try_from(count).unwrap_or_default())
}

/// Map a row of the full document projection.
pub(crate) fn document(
   row: &SqliteRow,
   operation: &'static str,
   visibility: &dyn FieldVisibility,
) -> Result<Document> {
   let mut document = Document {
      id: column(row, operation, "id")?,
      title: text(row, operation, "title")?,
      sort: text(row, operation, "sort")?,
      authors: entities(EntityKind::Authors, &text(row, operation, "authors")?),
      publisher: entities(EntityKind::Publishers, &text(row, operation, "publisher")?)
         .into_iter()
         .next(),
      rating: entities(EntityKind::Ratings, &text(row, operation, "rating")?)
         .into_iter()
         .next(),
      timestamp: parse_date(column(row, operation, "timestamp")?),
      size: column::<Option<i64>>(row, operation, "size")?.unwrap_or_default(),
      tags: entities(EntityKind::Tags, &text(row, operation, "tags")?),
      comment: text(row, operation, "comment")?,
      series: entities(EntityKind::Series, &text(row, operation, "series")?)
         .into_iter()
         .next(),
      series_index: column::<Option<f64>>(row, operation, "series_index")?.unwrap_or(1.0),
      formats: entities(EntityKind::Formats, &text(row, operation, "formats")?),
      languages: entities(EntityKind::Languages, &text(row, operation, "languages")?),
      isbn: text(row, operation, "isbn")?,
      identifiers: identifiers(&text(row, operation, "identifiers")?),
      path: text(row, operation, "path")?,
      lccn: text(row, operation, "lccn")?,
      pubdate: parse_date(column(row, operation, "pubdate")?),
      flags: column::<Option<i64>>(row, operation, "flags")?.unwrap_or_default(),
      uuid: parse_uuid(column(row, operation, "uuid")?),
      has_cover: column::<Option<i64>>(row, operation, "has_cover")?.unwrap_or_default() != 0,
   };

   document.apply_visibility(visibility);
   Ok(document)
}

/// Map a row of the minimal projection. Visibility does not apply: the
/// fields it carries are needed to build links.
pub(crate) fn document_minimal(row: &SqliteRow, operation: &'static str) -> Result<Document> {
   Ok(Document {
      id: column(row, operation, "id")?,
      title: text(row, operation, "title")?,
      path: text(row, operation, "path")?,
      formats: entities(EntityKind::Formats, &text(row, operation, "formats")?),
      ..Default::default()
   })
}

pub(crate) fn book_location(row: &SqliteRow, operation: &'static str) -> Result<BookLocation> {
   Ok(BookLocation {
      id: column(row, operation, "id")?,
      path: text(row, operation, "path")?,
   })
}

pub(crate) fn custom_column(row: &SqliteRow, operation: &'static str) -> Result<CustomColumn> {
   Ok(CustomColumn {
      id: column(row, operation, "id")?,
      label: text(row, operation, "label")?,
      name: text(row, operation, "name")?,
      datatype: text(row, operation, "datatype")?,
      is_multiple: column::<Option<i64>>(row, operation, "is_multiple")?.unwrap_or_default() != 0,
      normalized: column::<Option<i64>>(row, operation, "normalized")?.unwrap_or_default() != 0,
      display: text(row, operation, "display")?,
   })
}

/// Split an encoded entity list. Malformed entries are skipped.
fn entities(kind: EntityKind, encoded: &str) -> Vec<Entity> {
   records(encoded)
      .filter_map(|record| {
         let (id, name) = record.split_once(UNIT_SEPARATOR)?;
         match id.parse() {
            Ok(id) => Some(Entity::new(kind, id, name)),
            Err(_) => {
               debug!(kind = %kind, record, "Skipping malformed entity");
               None
            }
         }
      })
      .collect()
}

fn identifiers(encoded: &str) -> Vec<Identifier> {
   records(encoded)
      .filter_map(|record| {
         let mut fields = record.splitn(3, UNIT_SEPARATOR);
         let id = fields.next()?.parse().ok()?;
         let kind = fields.next()?;
         let value = fields.next()?;
         Some(Identifier::new(id, kind, value))
      })
      .collect()
}

fn records(encoded: &str) -> impl Iterator<Item = &str> {
   encoded.split(RECORD_SEPARATOR).filter(|record| !record.is_empty())
}

/// Parse a catalog date such as `2024-05-01 09:30:00.123456+00:00`.
fn parse_date(value: Option<String>) -> Option<OffsetDateTime> {
   let value = value?;
   match OffsetDateTime::parse(&value.replacen(' ', "T", 1), &Rfc3339) {
      Ok(date) if date.year() > UNDEFINED_YEAR => Some(date),
      Ok(_) => None,
      Err(e) => {
         debug!(value = %value, error = %e, "Unparseable catalog date");
         None
      }
   }
}

fn parse_uuid(value: Option<String>) -> Option<Uuid> {
   let value = value?;
   match Uuid::parse_str(&value) {
      Ok(uuid) => Some(uuid),
      Err(e) => {
         debug!(value = %value, error = %e, "Invalid document uuid");
         None
      }
   }
}
