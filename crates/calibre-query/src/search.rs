//! Search expressions and their compilation to SQL.
//!
//! A search is a flat list of [`SearchExpression`]s. There is no tree and no
//! precedence: compiled fragments are concatenated left to right, each one
//! introduced by the connective captured on the expression *before* it.
//!
//! # Joining
//!
//! | previous connective | current expression | joined with |
//! |---------------------|--------------------|-------------|
//! | `and` / `or`        | any                | ` AND ` / ` OR ` |
//! | none                | all-fields search  | ` OR `      |
//! | none                | named field        | a single space |
//!
//! The last row produces SQL that does not prepare. It is kept because saved
//! searches depend on the exact output; the compiler logs a warning whenever
//! it happens.
//!
//! # Example
//!
//! ```
//! use calibre_query::{FieldRegistry, compile_search};
//!
//! let registry = FieldRegistry::default();
//! let clause = compile_search(r#"tags:"=Golang""#, &registry);
//!
//! assert_eq!(
//!    clause.to_string(),
//!    r#"b.id IN (SELECT bt.book FROM books_tags_link bt JOIN tags t ON(bt.tag = t.id) WHERE (t.name = "Golang"))"#
//! );
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::fields::FieldRegistry;
use crate::fragment::SqlFragment;
use crate::scanner::{Token, tokenize};

/// How a term is compared against a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
   /// `=`: equality
   Exact,
   /// `~`: `LIKE "%term%"`
   Contains,
}

/// Boolean connective written after an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Connective {
   And,
   Or,
}

impl Connective {
   fn joiner(self) -> &'static str {
      match self {
         Connective::And => " AND ",
         Connective::Or => " OR ",
      }
   }
}

/// One parsed clause of a search string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchExpression {
   /// Lower-cased field name, `None` for an all-fields search
   pub field: Option<String>,
   pub mode: MatchMode,
   pub negated: bool,
   /// Connective to the next expression
   pub connective: Option<Connective>,
   pub term: String,
}

/// Split `=term` / `~term` into mode and term. No prefix means contains.
fn split_mode(raw: String) -> (MatchMode, String) {
   if let Some(term) = raw.strip_prefix('=') {
      (MatchMode::Exact, term.to_string())
   } else if let Some(term) = raw.strip_prefix('~') {
      (MatchMode::Contains, term.to_string())
   } else {
      (MatchMode::Contains, raw)
   }
}

/// Parse a search string into expressions.
///
/// Parsing stops at the first token sequence that is not an expression; the
/// rest of the input is dropped.
pub fn parse(input: &str) -> Vec<SearchExpression> {
   let mut tokens = tokenize(input).into_iter().peekable();
   let mut expressions = Vec::new();

   loop {
      let negated = tokens.next_if_eq(&Token::Not).is_some();
      let field = match tokens.peek() {
         Some(Token::Field(_)) => match tokens.next() {
            Some(Token::Field(name)) => Some(name),
            _ => None,
         },
         _ => None,
      };

      let Some(Token::Term(raw)) = tokens.next() else {
         break;
      };
      let (mode, term) = match field {
         Some(_) => split_mode(raw),
         None => (MatchMode::Contains, raw),
      };
      if term.is_empty() {
         break;
      }

      let connective = match tokens.peek() {
         Some(Token::And) => Some(Connective::And),
         Some(Token::Or) => Some(Connective::Or),
         _ => None,
      };
      if connective.is_some() {
         tokens.next();
      }

      expressions.push(SearchExpression {
         field,
         mode,
         negated,
         connective,
         term,
      });
   }

   if tokens.peek().is_some() {
      trace!(input, "Discarding unparsed search remainder");
   }

   expressions
}

fn operator(mode: MatchMode, negated: bool) -> &'static str {
   match (mode, negated) {
      (MatchMode::Exact, false) => "=",
      (MatchMode::Exact, true) => "!=",
      (MatchMode::Contains, false) => "LIKE",
      (MatchMode::Contains, true) => "NOT LIKE",
   }
}

fn bound_term(mode: MatchMode, term: &str) -> JsonValue {
   match mode {
      MatchMode::Exact => JsonValue::String(term.to_string()),
      MatchMode::Contains => JsonValue::String(format!("%{term}%")),
   }
}

/// Contains-match `term` against every all-fields shape, OR-joined.
fn fan_out(term: &str, negated: bool, registry: &FieldRegistry) -> SqlFragment {
   let mut fragment = SqlFragment::default();
   for shape in registry.all_fields() {
      if !fragment.is_empty() {
         fragment.push_sql(" OR ");
      }
      fragment.append(SqlFragment::new(
         shape.predicate(operator(MatchMode::Contains, false)),
         vec![bound_term(MatchMode::Contains, term)],
      ));
   }

   let fragment = fragment.parenthesized();
   if negated {
      let (sql, params) = fragment.into_parts();
      SqlFragment::new(format!("NOT {sql}"), params)
   } else {
      fragment
   }
}

/// Compile one expression. The flag is true for an all-fields fan-out.
fn compile_expression(
   expression: &SearchExpression,
   registry: &FieldRegistry,
) -> (SqlFragment, bool) {
   let shape = expression
      .field
      .as_deref()
      .and_then(|name| registry.lookup(name));

   match shape {
      Some(shape) => (
         SqlFragment::new(
            shape.predicate(operator(expression.mode, expression.negated)),
            vec![bound_term(expression.mode, &expression.term)],
         ),
         false,
      ),
      None => {
         if let Some(name) = &expression.field {
            trace!(field = %name, "Unknown search field, searching all fields");
         }
         (fan_out(&expression.term, expression.negated, registry), true)
      }
   }
}

/// Compile parsed expressions into a single condition over `books b`.
///
/// An empty list compiles to an empty fragment.
pub fn compile(expressions: &[SearchExpression], registry: &FieldRegistry) -> SqlFragment {
   let mut clause = SqlFragment::default();
   let mut previous: Option<Option<Connective>> = None;

   for expression in expressions {
      let (fragment, is_fan_out) = compile_expression(expression, registry);

      match previous {
         None => {}
         Some(Some(connective)) => clause.push_sql(connective.joiner()),
         Some(None) if is_fan_out => clause.push_sql(" OR "),
         Some(None) => {
            warn!(
               term = %expression.term,
               "Search expressions joined without a connective"
            );
            clause.push_sql(" ");
         }
      }

      clause.append(fragment);
      previous = Some(expression.connective);
   }

   clause
}

/// Parse and compile a search string.
pub fn compile_search(input: &str, registry: &FieldRegistry) -> SqlFragment {
   compile(&parse(input), registry)
}
