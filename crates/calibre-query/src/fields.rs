//! Registry of searchable fields and the SQL shape each one compiles to.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a field is reached from a `books b` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
   /// A column of the book row itself
   Column { column: Cow<'static, str> },

   /// A value table with one row per (book, value)
   Direct {
      table: Cow<'static, str>,
      alias: &'static str,
      column: Cow<'static, str>,
   },

   /// A link table joined to a normalized entity table
   Linked {
      link_table: Cow<'static, str>,
      link_alias: &'static str,
      link_column: &'static str,
      table: Cow<'static, str>,
      alias: &'static str,
      column: &'static str,
   },
}

impl FieldShape {
   const fn linked(
      link_table: &'static str,
      link_alias: &'static str,
      link_column: &'static str,
      table: &'static str,
      alias: &'static str,
      column: &'static str,
   ) -> Self {
      FieldShape::Linked {
         link_table: Cow::Borrowed(link_table),
         link_alias,
         link_column,
         table: Cow::Borrowed(table),
         alias,
         column,
      }
   }

   const fn direct(table: &'static str, alias: &'static str, column: &'static str) -> Self {
      FieldShape::Direct {
         table: Cow::Borrowed(table),
         alias,
         column: Cow::Borrowed(column),
      }
   }

   /// Predicate over `b.id` comparing this field with a single `?` placeholder.
   pub(crate) fn predicate(&self, op: &str) -> String {
      match self {
         FieldShape::Column { column } => format!("(b.{column} {op} ?)"),
         FieldShape::Direct {
            table,
            alias,
            column,
         } => format!(
            "b.id IN (SELECT {alias}.book FROM {table} {alias} WHERE ({alias}.{column} {op} ?))"
         ),
         FieldShape::Linked {
            link_table,
            link_alias,
            link_column,
            table,
            alias,
            column,
         } => format!(
            "b.id IN (SELECT {link_alias}.book FROM {link_table} {link_alias} JOIN {table} {alias} ON({link_alias}.{link_column} = {alias}.id) WHERE ({alias}.{column} {op} ?))"
         ),
      }
   }
}

/// A user-defined column as far as searching is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
   pub id: i64,
   pub label: String,
   /// Values live in their own table and are linked to books through
   /// `books_custom_column_<id>_link`
   pub normalized: bool,
}

impl CustomField {
   fn shape(&self) -> FieldShape {
      if self.normalized {
         FieldShape::Linked {
            link_table: Cow::Owned(format!("books_custom_column_{}_link", self.id)),
            link_alias: "cl",
            link_column: "value",
            table: Cow::Owned(format!("custom_column_{}", self.id)),
            alias: "cc",
            column: "value",
         }
      } else {
         FieldShape::Direct {
            table: Cow::Owned(format!("custom_column_{}", self.id)),
            alias: "cc",
            column: Cow::Borrowed("value"),
         }
      }
   }
}

/// Fields searched, in this order, when an expression names no field.
const ALL_FIELDS: [&str; 8] = [
   "authors",
   "comments",
   "formats",
   "languages",
   "publisher",
   "series",
   "tags",
   "title",
];

/// Singular and plural spellings users may type.
const ALIASES: [(&str, &str); 7] = [
   ("author", "authors"),
   ("comment", "comments"),
   ("format", "formats"),
   ("language", "languages"),
   ("publishers", "publisher"),
   ("tag", "tags"),
   ("identifier", "identifiers"),
];

/// Maps lower-cased field names to their SQL shape.
///
/// Custom columns are registered as `#label`.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
   fields: IndexMap<String, FieldShape>,
}

impl Default for FieldRegistry {
   fn default() -> Self {
      let builtins = [
         (
            "authors",
            FieldShape::linked("books_authors_link", "ba", "author", "authors", "a", "name"),
         ),
         ("comments", FieldShape::direct("comments", "c", "text")),
         ("formats", FieldShape::direct("data", "d", "format")),
         (
            "languages",
            FieldShape::linked(
               "books_languages_link",
               "bl",
               "lang_code",
               "languages",
               "l",
               "lang_code",
            ),
         ),
         (
            "publisher",
            FieldShape::linked(
               "books_publishers_link",
               "bp",
               "publisher",
               "publishers",
               "p",
               "name",
            ),
         ),
         (
            "series",
            FieldShape::linked("books_series_link", "bs", "series", "series", "s", "name"),
         ),
         (
            "tags",
            FieldShape::linked("books_tags_link", "bt", "tag", "tags", "t", "name"),
         ),
         (
            "title",
            FieldShape::Column {
               column: Cow::Borrowed("title"),
            },
         ),
         ("identifiers", FieldShape::direct("identifiers", "i", "val")),
      ];

      Self {
         fields: builtins
            .into_iter()
            .map(|(name, shape)| (name.to_string(), shape))
            .collect(),
      }
   }
}

impl FieldRegistry {
   /// Built-in fields plus the given custom columns.
   pub fn with_custom_fields<'a>(columns: impl IntoIterator<Item = &'a CustomField>) -> Self {
      let mut registry = Self::default();
      for column in columns {
         registry.register(column);
      }
      registry
   }

   /// Register a custom column as `#label`, replacing an earlier one with the
   /// same label.
   pub fn register(&mut self, column: &CustomField) {
      let name = format!("#{}", column.label.to_lowercase());
      self.fields.insert(name, column.shape());
   }

   /// Look up a field by name, case-insensitively, resolving aliases.
   pub fn lookup(&self, name: &str) -> Option<&FieldShape> {
      let name = name.to_lowercase();
      let canonical = ALIASES
         .iter()
         .find(|(alias, _)| *alias == name)
         .map_or(name.as_str(), |(_, canonical)| *canonical);

      self.fields.get(canonical)
   }

   /// Shapes searched by an expression that names no field.
   pub(crate) fn all_fields(&self) -> impl Iterator<Item = &FieldShape> {
      ALL_FIELDS.iter().filter_map(|name| self.fields.get(*name))
   }

   /// Registered field names in registration order.
   pub fn names(&self) -> impl Iterator<Item = &str> {
      self.fields.keys().map(String::as_str)
   }
}
