//! Sort keys and ORDER BY / LIMIT synthesis.
//!
//! Every sort key maps to a fixed list of order terms over `books b`. A final
//! ascending tie-breaker keeps page boundaries stable when the primary key has
//! duplicates: `b.sort` for every key except title, which breaks ties on
//! `b.id`. Unsorted results are ordered by `b.id` alone.

use serde::{Deserialize, Serialize};

/// Sort direction for an order term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
   /// Ascending order (smallest first)
   Asc,
   /// Descending order (largest first)
   Desc,
}

impl SortDirection {
   /// Return the opposite sort direction.
   pub fn reversed(self) -> Self {
      match self {
         SortDirection::Asc => SortDirection::Desc,
         SortDirection::Desc => SortDirection::Asc,
      }
   }

   pub fn from_descending(descending: bool) -> Self {
      if descending {
         SortDirection::Desc
      } else {
         SortDirection::Asc
      }
   }

   fn keyword(self) -> &'static str {
      match self {
         SortDirection::Asc => "ASC",
         SortDirection::Desc => "DESC",
      }
   }
}

/// Sort key of a browse or search request.
///
/// The discriminants are the serialized codes and must not change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum SortBy {
   #[default]
   Unsorted = 0,
   AcquisitionDate = 1,
   Author = 2,
   Language = 3,
   Publisher = 4,
   Rating = 5,
   Series = 6,
   Size = 7,
   Tags = 8,
   Time = 9,
   Title = 10,
}

impl SortBy {
   pub const ALL: [SortBy; 11] = [
      SortBy::Unsorted,
      SortBy::AcquisitionDate,
      SortBy::Author,
      SortBy::Language,
      SortBy::Publisher,
      SortBy::Rating,
      SortBy::Series,
      SortBy::Size,
      SortBy::Tags,
      SortBy::Time,
      SortBy::Title,
   ];

   pub fn code(self) -> u8 {
      self as u8
   }

   pub fn from_code(code: u8) -> Option<Self> {
      Self::ALL.get(usize::from(code)).copied()
   }

   /// Primary order expressions, before the tie-breaker.
   fn primary(self) -> &'static [&'static str] {
      match self {
         SortBy::Unsorted => &["b.id"],
         SortBy::AcquisitionDate => &["b.timestamp"],
         SortBy::Author => &["b.author_sort"],
         SortBy::Language => &[
            "(SELECT MIN(l.lang_code) FROM books_languages_link bl JOIN languages l ON(bl.lang_code = l.id) WHERE bl.book = b.id)",
         ],
         SortBy::Publisher => &[
            "(SELECT MIN(p.name) FROM books_publishers_link bp JOIN publishers p ON(bp.publisher = p.id) WHERE bp.book = b.id)",
         ],
         SortBy::Rating => &[
            "(SELECT MAX(r.rating) FROM books_ratings_link br JOIN ratings r ON(br.rating = r.id) WHERE br.book = b.id)",
         ],
         SortBy::Series => &[
            "(SELECT MIN(s.name) FROM books_series_link bs JOIN series s ON(bs.series = s.id) WHERE bs.book = b.id)",
            "b.series_index",
         ],
         SortBy::Size => &["(SELECT MAX(d.uncompressed_size) FROM data d WHERE d.book = b.id)"],
         SortBy::Tags => &[
            "(SELECT MIN(t.name) FROM books_tags_link bt JOIN tags t ON(bt.tag = t.id) WHERE bt.book = b.id)",
         ],
         SortBy::Time => &["b.pubdate"],
         SortBy::Title => &["b.sort"],
      }
   }

   fn tie_breaker(self) -> Option<&'static str> {
      match self {
         SortBy::Unsorted => None,
         SortBy::Title => Some("b.id"),
         _ => Some("b.sort"),
      }
   }
}

/// One `expression direction` entry of an ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
   pub expression: &'static str,
   pub direction: SortDirection,
}

/// Order terms for a sort key: the primary expressions in `direction`, then
/// the ascending tie-breaker.
pub fn order_terms(sort_by: SortBy, direction: SortDirection) -> Vec<OrderTerm> {
   let mut terms: Vec<OrderTerm> = sort_by
      .primary()
      .iter()
      .map(|&expression| OrderTerm {
         expression,
         direction,
      })
      .collect();

   if let Some(expression) = sort_by.tie_breaker() {
      terms.push(OrderTerm {
         expression,
         direction: SortDirection::Asc,
      });
   }

   terms
}

/// Build the ORDER BY clause from order terms.
pub fn build_order_by(terms: &[OrderTerm]) -> String {
   let parts: Vec<String> = terms
      .iter()
      .map(|t| format!("{} {}", t.expression, t.direction.keyword()))
      .collect();

   format!("ORDER BY {}", parts.join(", "))
}

/// Build the LIMIT clause for one page.
pub fn build_limit(length: u32, start: u64) -> String {
   format!("LIMIT {length} OFFSET {start}")
}
