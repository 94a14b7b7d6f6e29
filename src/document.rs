//! Read-only projections of catalog rows.

use calibre_query::{CustomField, EntityKind};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A normalized (id, name, link) record: an author, tag, series, publisher,
/// format, language or rating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
   pub id: i64,
   pub name: String,
   /// Browse link, derived from the kind and id
   pub url: String,
}

impl Entity {
   pub fn new(kind: EntityKind, id: i64, name: impl Into<String>) -> Self {
      Self {
         id,
         name: name.into(),
         url: format!("/{}/{}", kind.as_str(), id),
      }
   }
}

/// External lookup links for well-known identifier types.
const IDENTIFIER_URLS: [(&str, &str); 6] = [
   ("isbn", "https://www.worldcat.org/isbn/{}"),
   ("amazon", "https://www.amazon.com/dp/{}"),
   ("google", "https://books.google.com/books?id={}"),
   ("doi", "https://doi.org/{}"),
   ("goodreads", "https://www.goodreads.com/book/show/{}"),
   ("issn", "https://portal.issn.org/resource/ISSN/{}"),
];

/// A typed identifier such as `isbn:9780441013593`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
   pub id: i64,
   /// Identifier type, e.g. `isbn`
   pub kind: String,
   pub value: String,
   /// External link for known types
   pub url: Option<String>,
}

impl Identifier {
   pub fn new(id: i64, kind: impl Into<String>, value: impl Into<String>) -> Self {
      let kind = kind.into();
      let value = value.into();
      let url = IDENTIFIER_URLS
         .iter()
         .find(|(known, _)| kind.eq_ignore_ascii_case(known))
         .map(|(_, template)| template.replace("{}", &value));

      Self {
         id,
         kind,
         value,
         url,
      }
   }
}

/// One catalog entry with its related entities.
///
/// Fields hidden by the [`FieldVisibility`] policy in effect are left at
/// their empty value, so every document has the same shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
   pub id: i64,
   pub title: String,
   /// Title as sorted, e.g. "Dune Messiah" → "Dune Messiah", "The Stand" → "Stand, The"
   pub sort: String,
   pub authors: Vec<Entity>,
   pub publisher: Option<Entity>,
   /// Rating entity; the name is the rating on a 0–10 scale
   pub rating: Option<Entity>,
   /// When the document was added to the library
   #[serde(with = "time::serde::rfc3339::option")]
   pub timestamp: Option<OffsetDateTime>,
   /// Largest uncompressed size among the formats, in bytes
   pub size: i64,
   pub tags: Vec<Entity>,
   pub comment: String,
   pub series: Option<Entity>,
   pub series_index: f64,
   pub formats: Vec<Entity>,
   pub languages: Vec<Entity>,
   pub isbn: String,
   pub identifiers: Vec<Identifier>,
   /// Directory of the document relative to the library root
   pub path: String,
   /// Library of Congress control number
   pub lccn: String,
   #[serde(with = "time::serde::rfc3339::option")]
   pub pubdate: Option<OffsetDateTime>,
   pub flags: i64,
   pub uuid: Option<Uuid>,
   pub has_cover: bool,
}

/// Optional document fields a [`FieldVisibility`] policy can hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentField {
   Authors,
   Publisher,
   Rating,
   Timestamp,
   Size,
   Tags,
   Comment,
   Series,
   Formats,
   Languages,
   Isbn,
   Identifiers,
   Path,
   Lccn,
   Pubdate,
   Flags,
   Uuid,
   Cover,
}

/// Decides which optional fields are populated for display.
pub trait FieldVisibility: Send + Sync {
   fn is_visible(&self, field: DocumentField) -> bool;
}

/// Shows every field.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFieldsVisible;

impl FieldVisibility for AllFieldsVisible {
   fn is_visible(&self, _field: DocumentField) -> bool {
      true
   }
}

impl Document {
   /// Clear every field `visibility` hides.
   pub(crate) fn apply_visibility(&mut self, visibility: &dyn FieldVisibility) {
      let hidden = |field| !visibility.is_visible(field);

      if hidden(DocumentField::Authors) {
         self.authors.clear();
      }
      if hidden(DocumentField::Publisher) {
         self.publisher = None;
      }
      if hidden(DocumentField::Rating) {
         self.rating = None;
      }
      if hidden(DocumentField::Timestamp) {
         self.timestamp = None;
      }
      if hidden(DocumentField::Size) {
         self.size = 0;
      }
      if hidden(DocumentField::Tags) {
         self.tags.clear();
      }
      if hidden(DocumentField::Comment) {
         self.comment.clear();
      }
      if hidden(DocumentField::Series) {
         self.series = None;
         self.series_index = 0.0;
      }
      if hidden(DocumentField::Formats) {
         self.formats.clear();
      }
      if hidden(DocumentField::Languages) {
         self.languages.clear();
      }
      if hidden(DocumentField::Isbn) {
         self.isbn.clear();
      }
      if hidden(DocumentField::Identifiers) {
         self.identifiers.clear();
      }
      if hidden(DocumentField::Path) {
         self.path.clear();
      }
      if hidden(DocumentField::Lccn) {
         self.lccn.clear();
      }
      if hidden(DocumentField::Pubdate) {
         self.pubdate = None;
      }
      if hidden(DocumentField::Flags) {
         self.flags = 0;
      }
      if hidden(DocumentField::Uuid) {
         self.uuid = None;
      }
      if hidden(DocumentField::Cover) {
         self.has_cover = false;
      }
   }
}

/// Total row count plus one page of documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
   pub count: u64,
   pub documents: Vec<Document>,
}

/// Id and library-relative directory of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLocation {
   pub id: i64,
   pub path: String,
}

/// A user-defined column of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColumn {
   pub id: i64,
   /// Lookup name, searchable as `#label`
   pub label: String,
   /// Display name
   pub name: String,
   /// `text`, `int`, `bool`, `series`, `enumeration`, …
   pub datatype: String,
   pub is_multiple: bool,
   pub normalized: bool,
   /// Display settings as stored by the catalog (JSON text)
   pub display: String,
}

impl CustomColumn {
   pub fn search_field(&self) -> CustomField {
      CustomField {
         id: self.id,
         label: self.label.clone(),
         normalized: self.normalized,
      }
   }
}
