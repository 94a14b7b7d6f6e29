//! Per-request query options and their session serialization.
//!
//! # Serialized form
//!
//! Twelve positional fields, each terminated by `|`, behind a leading `|`:
//!
//! ```text
//! |ID|Descending|Entity|GuiLang|Layout|LimitLength|LimitStart|Matching|QueryCount|SortBy|Theme|VirtLib|
//! ```
//!
//! `Entity`, `Matching` and `VirtLib` are double-quoted with backslash
//! escapes; every other field is a bare number or `true`/`false`. An unknown
//! `QueryCount` is written as `-1`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::fields::FieldRegistry;
use crate::fragment::SqlFragment;
use crate::order::{SortBy, SortDirection, build_limit, build_order_by, order_terms};
use crate::search::compile_search;

/// Page length of freshly constructed options.
pub const DEFAULT_PAGE_LENGTH: u32 = 20;

/// Largest page start, the largest OFFSET SQLite accepts.
pub const MAX_LIMIT_START: u64 = i64::MAX as u64;

const FIELD_COUNT: usize = 12;

/// Kind of entity a browse request is filtered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
   /// No filter
   #[default]
   None,
   Authors,
   Formats,
   Identifiers,
   Languages,
   Publishers,
   Ratings,
   Series,
   Tags,
}

impl EntityKind {
   pub const ALL: [EntityKind; 9] = [
      EntityKind::None,
      EntityKind::Authors,
      EntityKind::Formats,
      EntityKind::Identifiers,
      EntityKind::Languages,
      EntityKind::Publishers,
      EntityKind::Ratings,
      EntityKind::Series,
      EntityKind::Tags,
   ];

   /// Name used in URLs and in the serialized options; empty for `None`.
   pub fn as_str(self) -> &'static str {
      match self {
         EntityKind::None => "",
         EntityKind::Authors => "authors",
         EntityKind::Formats => "formats",
         EntityKind::Identifiers => "identifiers",
         EntityKind::Languages => "languages",
         EntityKind::Publishers => "publishers",
         EntityKind::Ratings => "ratings",
         EntityKind::Series => "series",
         EntityKind::Tags => "tags",
      }
   }

   /// Condition selecting the books linked to entity `id`.
   ///
   /// Formats and identifiers are not normalized: their `id` names a row of
   /// `data` / `identifiers`, and every book sharing that row's format or
   /// identifier type matches.
   pub fn filter(self, id: i64) -> SqlFragment {
      let sql = match self {
         EntityKind::None => return SqlFragment::default(),
         EntityKind::Authors => {
            "b.id IN (SELECT ba.book FROM books_authors_link ba WHERE ba.author = ?)"
         }
         EntityKind::Formats => {
            "b.id IN (SELECT d.book FROM data d WHERE d.format = (SELECT f.format FROM data f WHERE f.id = ?))"
         }
         EntityKind::Identifiers => {
            "b.id IN (SELECT i.book FROM identifiers i WHERE i.type = (SELECT it.type FROM identifiers it WHERE it.id = ?))"
         }
         EntityKind::Languages => {
            "b.id IN (SELECT bl.book FROM books_languages_link bl WHERE bl.lang_code = ?)"
         }
         EntityKind::Publishers => {
            "b.id IN (SELECT bp.book FROM books_publishers_link bp WHERE bp.publisher = ?)"
         }
         EntityKind::Ratings => {
            "b.id IN (SELECT br.book FROM books_ratings_link br WHERE br.rating = ?)"
         }
         EntityKind::Series => "b.id IN (SELECT bs.book FROM books_series_link bs WHERE bs.series = ?)",
         EntityKind::Tags => "b.id IN (SELECT bt.book FROM books_tags_link bt WHERE bt.tag = ?)",
      };

      SqlFragment::new(sql, vec![json!(id)])
   }
}

impl fmt::Display for EntityKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

impl FromStr for EntityKind {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      Self::ALL
         .into_iter()
         .find(|kind| kind.as_str() == s)
         .ok_or_else(|| Error::InvalidField {
            field: "Entity",
            value: s.to_string(),
         })
   }
}

/// Interface language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum GuiLanguage {
   #[default]
   English = 0,
   German = 1,
   French = 2,
   Spanish = 3,
   Italian = 4,
}

impl GuiLanguage {
   const ALL: [GuiLanguage; 5] = [
      GuiLanguage::English,
      GuiLanguage::German,
      GuiLanguage::French,
      GuiLanguage::Spanish,
      GuiLanguage::Italian,
   ];

   pub fn code(self) -> u8 {
      self as u8
   }

   pub fn from_code(code: u8) -> Option<Self> {
      Self::ALL.get(usize::from(code)).copied()
   }
}

/// How result pages are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum Layout {
   #[default]
   Grid = 0,
   List = 1,
   Table = 2,
}

impl Layout {
   const ALL: [Layout; 3] = [Layout::Grid, Layout::List, Layout::Table];

   pub fn code(self) -> u8 {
      self as u8
   }

   pub fn from_code(code: u8) -> Option<Self> {
      Self::ALL.get(usize::from(code)).copied()
   }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum Theme {
   #[default]
   Light = 0,
   Dark = 1,
}

impl Theme {
   const ALL: [Theme; 2] = [Theme::Light, Theme::Dark];

   pub fn code(self) -> u8 {
      self as u8
   }

   pub fn from_code(code: u8) -> Option<Self> {
      Self::ALL.get(usize::from(code)).copied()
   }
}

/// Pagination, sort, filter and display state of one browse or search
/// request.
///
/// `limit_start` is always a multiple of `limit_length` no larger than
/// [`MAX_LIMIT_START`], and `limit_length` is never zero. Changing what is
/// asked for (search term, virtual library, sort key, direction or entity
/// filter) moves back to the first page.
///
/// # Example
///
/// ```
/// use calibre_query::{QueryOptions, SortBy};
///
/// let mut options = QueryOptions::default();
/// options.set_query_count(Some(95));
/// options.inc_limit();
/// assert_eq!(options.limit_start(), 20);
///
/// options.set_sort_by(SortBy::Title);
/// assert_eq!(options.limit_start(), 0);
///
/// let restored: QueryOptions = options.serialize().parse().unwrap();
/// assert_eq!(restored, options);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
   id: i64,
   descending: bool,
   entity: EntityKind,
   gui_language: GuiLanguage,
   layout: Layout,
   limit_length: u32,
   limit_start: u64,
   matching: String,
   query_count: Option<u64>,
   sort_by: SortBy,
   theme: Theme,
   virt_lib: String,
}

impl Default for QueryOptions {
   fn default() -> Self {
      Self {
         id: 0,
         descending: false,
         entity: EntityKind::None,
         gui_language: GuiLanguage::default(),
         layout: Layout::default(),
         limit_length: DEFAULT_PAGE_LENGTH,
         limit_start: 0,
         matching: String::new(),
         query_count: None,
         sort_by: SortBy::default(),
         theme: Theme::default(),
         virt_lib: String::new(),
      }
   }
}

impl QueryOptions {
   /// Entity id the browse is filtered by; meaningless when
   /// [`entity`](Self::entity) is `None`.
   pub fn id(&self) -> i64 {
      self.id
   }

   pub fn descending(&self) -> bool {
      self.descending
   }

   pub fn entity(&self) -> EntityKind {
      self.entity
   }

   pub fn gui_language(&self) -> GuiLanguage {
      self.gui_language
   }

   pub fn layout(&self) -> Layout {
      self.layout
   }

   pub fn limit_length(&self) -> u32 {
      self.limit_length
   }

   pub fn limit_start(&self) -> u64 {
      self.limit_start
   }

   /// Free-text search string.
   pub fn matching(&self) -> &str {
      &self.matching
   }

   /// Total rows of the last query made with these options, if known.
   pub fn query_count(&self) -> Option<u64> {
      self.query_count
   }

   pub fn sort_by(&self) -> SortBy {
      self.sort_by
   }

   pub fn theme(&self) -> Theme {
      self.theme
   }

   /// Search expression every result must also match.
   pub fn virt_lib(&self) -> &str {
      &self.virt_lib
   }

   fn first_page(&mut self) {
      self.limit_start = 0;
   }

   pub fn set_matching(&mut self, matching: impl Into<String>) {
      let matching = matching.into();
      if matching != self.matching {
         self.matching = matching;
         self.first_page();
      }
   }

   pub fn set_virt_lib(&mut self, virt_lib: impl Into<String>) {
      let virt_lib = virt_lib.into();
      if virt_lib != self.virt_lib {
         self.virt_lib = virt_lib;
         self.first_page();
      }
   }

   pub fn set_sort_by(&mut self, sort_by: SortBy) {
      if sort_by != self.sort_by {
         self.sort_by = sort_by;
         self.first_page();
      }
   }

   pub fn set_descending(&mut self, descending: bool) {
      if descending != self.descending {
         self.descending = descending;
         self.first_page();
      }
   }

   /// Filter by entity `id` of `kind`, or pass [`EntityKind::None`] to clear
   /// the filter.
   pub fn set_entity(&mut self, kind: EntityKind, id: i64) {
      if kind != self.entity || id != self.id {
         self.entity = kind;
         self.id = id;
         self.first_page();
      }
   }

   pub fn set_gui_language(&mut self, gui_language: GuiLanguage) {
      self.gui_language = gui_language;
   }

   pub fn set_layout(&mut self, layout: Layout) {
      self.layout = layout;
   }

   pub fn set_theme(&mut self, theme: Theme) {
      self.theme = theme;
   }

   pub fn set_query_count(&mut self, query_count: Option<u64>) {
      self.query_count = query_count;
   }

   /// Change the page length, moving the start back to the page that
   /// contains it.
   pub fn set_limit_length(&mut self, limit_length: u32) -> Result<()> {
      if limit_length == 0 {
         return Err(Error::InvalidPageSize);
      }
      self.limit_length = limit_length;
      self.limit_start -= self.limit_start % u64::from(limit_length);
      Ok(())
   }

   /// Move one page forward. Never moves past the last page once the total
   /// row count is known.
   pub fn inc_limit(&mut self) {
      if self.has_next_page()
         && let Some(next) = self.limit_start.checked_add(u64::from(self.limit_length))
         && next <= MAX_LIMIT_START
      {
         self.limit_start = next;
      }
   }

   /// Move one page back, stopping at the first page.
   pub fn dec_limit(&mut self) {
      self.limit_start = self
         .limit_start
         .saturating_sub(u64::from(self.limit_length));
   }

   pub fn has_prev_page(&self) -> bool {
      self.limit_start > 0
   }

   /// Whether another page follows. Always true while the count is unknown.
   pub fn has_next_page(&self) -> bool {
      match self.query_count {
         Some(count) => self.limit_start.saturating_add(u64::from(self.limit_length)) < count,
         None => true,
      }
   }

   /// One-based number of the current page.
   pub fn page_number(&self) -> u64 {
      (self.limit_start / u64::from(self.limit_length)).saturating_add(1)
   }

   /// Number of pages, at least one, once the count is known.
   pub fn page_count(&self) -> Option<u64> {
      self
         .query_count
         .map(|count| count.div_ceil(u64::from(self.limit_length)).max(1))
   }

   pub fn build_order_clause(&self) -> String {
      build_order_by(&order_terms(
         self.sort_by,
         SortDirection::from_descending(self.descending),
      ))
   }

   pub fn build_limit_clause(&self) -> String {
      build_limit(self.limit_length, self.limit_start)
   }

   fn virt_lib_filter(&self, registry: &FieldRegistry) -> SqlFragment {
      compile_search(&self.virt_lib, registry)
   }

   /// Condition of a browse: the entity filter within the virtual library.
   pub fn browse_filter(&self, registry: &FieldRegistry) -> SqlFragment {
      SqlFragment::all_of([self.entity.filter(self.id), self.virt_lib_filter(registry)])
   }

   /// Condition of a search: the search string within the virtual library.
   pub fn search_filter(&self, registry: &FieldRegistry) -> SqlFragment {
      SqlFragment::all_of([
         compile_search(&self.matching, registry),
         self.virt_lib_filter(registry),
      ])
   }

   pub fn serialize(&self) -> String {
      self.to_string()
   }

   pub fn deserialize(serialized: &str) -> Result<Self> {
      serialized.parse()
   }
}

/// Write `value` as a double-quoted, backslash-escaped token.
fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
   f.write_str("\"")?;
   for c in value.chars() {
      match c {
         '\\' => f.write_str("\\\\")?,
         '"' => f.write_str("\\\"")?,
         '\n' => f.write_str("\\n")?,
         '\r' => f.write_str("\\r")?,
         '\t' => f.write_str("\\t")?,
         c if c.is_control() => write!(f, "\\u{{{:x}}}", u32::from(c))?,
         c => write!(f, "{c}")?,
      }
   }
   f.write_str("\"")
}

impl fmt::Display for QueryOptions {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "|{}|{}|", self.id, self.descending)?;
      write_quoted(f, self.entity.as_str())?;
      write!(
         f,
         "|{}|{}|{}|{}|",
         self.gui_language.code(),
         self.layout.code(),
         self.limit_length,
         self.limit_start
      )?;
      write_quoted(f, &self.matching)?;
      match self.query_count {
         Some(count) => write!(f, "|{count}|")?,
         None => f.write_str("|-1|")?,
      }
      write!(f, "{}|{}|", self.sort_by.code(), self.theme.code())?;
      write_quoted(f, &self.virt_lib)?;
      f.write_str("|")
   }
}

/// One positional field of the serialized form.
#[derive(Debug, PartialEq)]
enum RawField<'a> {
   Bare(&'a str),
   Quoted(String),
}

impl<'a> RawField<'a> {
   fn bare(&self, field: &'static str) -> Result<&'a str> {
      match self {
         RawField::Bare(value) => Ok(*value),
         RawField::Quoted(value) => Err(Error::InvalidField {
            field,
            value: value.clone(),
         }),
      }
   }

   fn quoted(self, field: &'static str) -> Result<String> {
      match self {
         RawField::Quoted(value) => Ok(value),
         RawField::Bare(value) => Err(Error::InvalidField {
            field,
            value: value.to_string(),
         }),
      }
   }

   fn parse<T: FromStr>(&self, field: &'static str) -> Result<T> {
      let value = self.bare(field)?;
      value.parse().map_err(|_| Error::InvalidField {
         field,
         value: value.to_string(),
      })
   }

   fn code<T>(&self, field: &'static str, from_code: impl Fn(u8) -> Option<T>) -> Result<T> {
      let code: u8 = self.parse(field)?;
      from_code(code).ok_or_else(|| Error::InvalidField {
         field,
         value: code.to_string(),
      })
   }
}

/// Read a quoted token starting after its opening quote.
///
/// Returns the unescaped value and the byte index just past the closing
/// quote.
fn read_quoted(input: &str, start: usize) -> Result<(String, usize)> {
   let mut value = String::new();
   let mut chars = input[start..].char_indices();

   while let Some((offset, c)) = chars.next() {
      match c {
         '"' => return Ok((value, start + offset + 1)),
         '\\' => match chars.next().map(|(_, escaped)| escaped) {
            Some('\\') => value.push('\\'),
            Some('"') => value.push('"'),
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('t') => value.push('\t'),
            Some('u') => {
               let rest = &input[start + offset + 2..];
               let close = rest
                  .strip_prefix('{')
                  .and_then(|r| r.find('}'))
                  .ok_or_else(|| Error::MalformedOptions("bad \\u escape".into()))?;
               let escaped = u32::from_str_radix(&rest[1..=close], 16)
                  .ok()
                  .and_then(char::from_u32)
                  .ok_or_else(|| Error::MalformedOptions("bad \\u escape".into()))?;
               value.push(escaped);
               // Skip `{hex}`
               for _ in 0..close + 2 {
                  chars.next();
               }
            }
            other => {
               return Err(Error::MalformedOptions(format!(
                  "unknown escape '\\{}'",
                  other.map(String::from).unwrap_or_default()
               )));
            }
         },
         c => value.push(c),
      }
   }

   Err(Error::MalformedOptions("unterminated quoted field".into()))
}

/// Split the serialized form into its positional fields.
fn split_fields(input: &str) -> Result<Vec<RawField<'_>>> {
   let Some(body) = input.strip_prefix('|') else {
      return Err(Error::MalformedOptions("missing leading '|'".into()));
   };
   let offset = input.len() - body.len();
   let mut fields = Vec::with_capacity(FIELD_COUNT);
   let mut pos = offset;

   while pos < input.len() {
      if input[pos..].starts_with('"') {
         let (value, end) = read_quoted(input, pos + 1)?;
         if !input[end..].starts_with('|') {
            return Err(Error::MalformedOptions(
               "quoted field not followed by '|'".into(),
            ));
         }
         fields.push(RawField::Quoted(value));
         pos = end + 1;
      } else {
         let Some(len) = input[pos..].find('|') else {
            return Err(Error::MalformedOptions("missing trailing '|'".into()));
         };
         fields.push(RawField::Bare(&input[pos..pos + len]));
         pos += len + 1;
      }
   }

   Ok(fields)
}

impl FromStr for QueryOptions {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      let fields = split_fields(s)?;
      if fields.len() != FIELD_COUNT {
         return Err(Error::FieldCountMismatch {
            found: fields.len(),
            expected: FIELD_COUNT,
         });
      }

      let mut fields = fields.into_iter();
      let mut next = || {
         fields
            .next()
            .ok_or_else(|| Error::MalformedOptions("missing field".into()))
      };

      let id = next()?.parse("ID")?;
      let descending = next()?.parse("Descending")?;
      let entity = next()?.quoted("Entity")?.parse()?;
      let gui_language = next()?.code("GuiLang", GuiLanguage::from_code)?;
      let layout = next()?.code("Layout", Layout::from_code)?;
      let limit_length: u32 = next()?.parse("LimitLength")?;
      let limit_start: u64 = next()?.parse("LimitStart")?;
      let matching = next()?.quoted("Matching")?;
      let query_count = match next()?.parse::<i64>("QueryCount")? {
         -1 => None,
         count => Some(u64::try_from(count).map_err(|_| Error::InvalidField {
            field: "QueryCount",
            value: count.to_string(),
         })?),
      };
      let sort_by = next()?.code("SortBy", SortBy::from_code)?;
      let theme = next()?.code("Theme", Theme::from_code)?;
      let virt_lib = next()?.quoted("VirtLib")?;

      if limit_length == 0 {
         return Err(Error::InvalidPageSize);
      }
      if limit_start > MAX_LIMIT_START {
         return Err(Error::InvalidField {
            field: "LimitStart",
            value: limit_start.to_string(),
         });
      }
      if limit_start % u64::from(limit_length) != 0 {
         return Err(Error::UnalignedPageStart {
            start: limit_start,
            length: limit_length,
         });
      }

      Ok(Self {
         id,
         descending,
         entity,
         gui_language,
         layout,
         limit_length,
         limit_start,
         matching,
         query_count,
         sort_by,
         theme,
         virt_lib,
      })
   }
}
