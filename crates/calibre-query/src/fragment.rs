//! Parameterized SQL fragments.

use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

/// A piece of SQL with `?` placeholders and the values bound to them, in
/// placeholder order.
///
/// User-supplied terms only ever travel in `params`. The [`Display`]
/// implementation inlines them as literals (`t.name = "Golang"`), which is
/// what the trace log and tests compare against; it is never executed.
///
/// [`Display`]: fmt::Display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlFragment {
   sql: String,
   params: Vec<JsonValue>,
}

impl SqlFragment {
   pub fn new(sql: impl Into<String>, params: Vec<JsonValue>) -> Self {
      Self {
         sql: sql.into(),
         params,
      }
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   pub fn params(&self) -> &[JsonValue] {
      &self.params
   }

   pub fn is_empty(&self) -> bool {
      self.sql.is_empty()
   }

   pub fn into_parts(self) -> (String, Vec<JsonValue>) {
      (self.sql, self.params)
   }

   pub(crate) fn push_sql(&mut self, sql: &str) {
      self.sql.push_str(sql);
   }

   pub(crate) fn append(&mut self, other: SqlFragment) {
      self.sql.push_str(&other.sql);
      self.params.extend(other.params);
   }

   /// Wrap the fragment in parentheses.
   pub(crate) fn parenthesized(self) -> Self {
      Self {
         sql: format!("({})", self.sql),
         params: self.params,
      }
   }

   /// AND-join every non-empty fragment, each one parenthesized.
   ///
   /// Returns an empty fragment when nothing is left to join.
   pub fn all_of(fragments: impl IntoIterator<Item = SqlFragment>) -> SqlFragment {
      let mut joined = SqlFragment::default();
      for fragment in fragments.into_iter().filter(|f| !f.is_empty()) {
         if !joined.is_empty() {
            joined.push_sql(" AND ");
         }
         joined.append(fragment.parenthesized());
      }
      joined
   }

   /// Render as a `WHERE …` clause, or an empty string when there is no
   /// condition.
   pub fn where_clause(&self) -> String {
      if self.is_empty() {
         String::new()
      } else {
         format!("WHERE {}", self.sql)
      }
   }
}

/// Render one bound value as a SQL literal.
fn write_literal(f: &mut fmt::Formatter<'_>, value: &JsonValue) -> fmt::Result {
   match value {
      JsonValue::Null => f.write_str("NULL"),
      JsonValue::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
      JsonValue::Number(n) => write!(f, "{n}"),
      JsonValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
      other => write!(f, "\"{}\"", other.to_string().replace('"', "\"\"")),
   }
}

impl fmt::Display for SqlFragment {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut params = self.params.iter();
      let mut rest = self.sql.as_str();

      while let Some(pos) = rest.find('?') {
         f.write_str(&rest[..pos])?;
         match params.next() {
            Some(value) => write_literal(f, value)?,
            None => f.write_str("?")?,
         }
         rest = &rest[pos + 1..];
      }

      f.write_str(rest)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   #[test]
   fn display_inlines_params_in_order() {
      let fragment = SqlFragment::new("a = ? AND b LIKE ?", vec![json!(3), json!("%x%")]);
      assert_eq!(fragment.to_string(), r#"a = 3 AND b LIKE "%x%""#);
   }

   #[test]
   fn display_doubles_embedded_quotes() {
      let fragment = SqlFragment::new("t.name = ?", vec![json!(r#"say "hi""#)]);
      assert_eq!(fragment.to_string(), r#"t.name = "say ""hi""""#);
   }

   #[test]
   fn all_of_skips_empty_fragments() {
      let joined = SqlFragment::all_of([
         SqlFragment::new("a = ?", vec![json!(1)]),
         SqlFragment::default(),
         SqlFragment::new("b = ?", vec![json!(2)]),
      ]);

      assert_eq!(joined.sql(), "(a = ?) AND (b = ?)");
      assert_eq!(joined.params(), &[json!(1), json!(2)]);
   }

   #[test]
   fn where_clause_is_empty_without_condition() {
      assert_eq!(SqlFragment::default().where_clause(), "");
      assert_eq!(
         SqlFragment::new("x = ?", vec![json!(1)]).where_clause(),
         "WHERE x = ?"
      );
   }
}
