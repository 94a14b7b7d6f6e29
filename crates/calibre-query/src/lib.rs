//! # calibre-query
//!
//! Turns browse/search requests against a calibre catalog into SQL fragments.
//! Nothing here touches a database: every function is a pure mapping from
//! options or user input to parameterized SQL over `books b`.
//!
//! ## Core Types
//!
//! - **[`QueryOptions`]**: Pagination window, sort key, entity filter, search
//!   string and display state, with a compact `|…|` session serialization
//! - **[`SearchExpression`]**: One clause of the search language, produced by
//!   [`parse`] and turned into SQL by [`compile`]
//! - **[`FieldRegistry`]**: Searchable field names (built-in and `#custom`)
//!   and the link-table shape each one compiles to
//! - **[`SqlFragment`]**: SQL with `?` placeholders plus its bind values
//! - **[`SortBy`]**: Sort keys and their ORDER BY mapping
//!
//! ## Search language
//!
//! ```text
//! tags:"=Golang"              exact match on a field
//! title:"~dune"               contains match (also the default: title:dune)
//! !tags:"=Golang"             negated comparison
//! a and b / a or b            connectives, case-insensitive
//! frank herbert               bare terms search every field
//! ```
//!
//! Expressions combine strictly left to right. Input that stops looking like
//! an expression ends the search; the rest is ignored.

mod error;
mod fields;
mod fragment;
mod options;
mod order;
mod scanner;
mod search;

// Re-export public types
pub use error::{Error, Result};
pub use fields::{CustomField, FieldRegistry, FieldShape};
pub use fragment::SqlFragment;
pub use options::{
   DEFAULT_PAGE_LENGTH, EntityKind, GuiLanguage, Layout, MAX_LIMIT_START, QueryOptions, Theme,
};
pub use order::{OrderTerm, SortBy, SortDirection, build_limit, build_order_by, order_terms};
pub use search::{Connective, MatchMode, SearchExpression, compile, compile_search, parse};
