use calibre_query::{CustomField, FieldRegistry, compile_search};
use serde_json::json;

const TAGS_GOLANG: &str = r#"b.id IN (SELECT bt.book FROM books_tags_link bt JOIN tags t ON(bt.tag = t.id) WHERE (t.name = "Golang"))"#;

/// The all-fields fan-out for `term`, rendered with literals.
fn fan_out(term: &str) -> String {
   let like = format!(r#"LIKE "%{term}%""#);
   [
      format!(
         "b.id IN (SELECT ba.book FROM books_authors_link ba JOIN authors a ON(ba.author = a.id) WHERE (a.name {like}))"
      ),
      format!("b.id IN (SELECT c.book FROM comments c WHERE (c.text {like}))"),
      format!("b.id IN (SELECT d.book FROM data d WHERE (d.format {like}))"),
      format!(
         "b.id IN (SELECT bl.book FROM books_languages_link bl JOIN languages l ON(bl.lang_code = l.id) WHERE (l.lang_code {like}))"
      ),
      format!(
         "b.id IN (SELECT bp.book FROM books_publishers_link bp JOIN publishers p ON(bp.publisher = p.id) WHERE (p.name {like}))"
      ),
      format!(
         "b.id IN (SELECT bs.book FROM books_series_link bs JOIN series s ON(bs.series = s.id) WHERE (s.name {like}))"
      ),
      format!(
         "b.id IN (SELECT bt.book FROM books_tags_link bt JOIN tags t ON(bt.tag = t.id) WHERE (t.name {like}))"
      ),
      format!("(b.title {like})"),
   ]
   .join(" OR ")
}

// ============================================================================
// Literal shapes
// ============================================================================

#[test]
fn exact_tag_match() {
   let registry = FieldRegistry::default();
   let clause = compile_search(r#"tags:"=Golang""#, &registry);

   assert_eq!(clause.to_string(), TAGS_GOLANG);
   assert_eq!(clause.params(), &[json!("Golang")]);
   assert!(!clause.sql().contains("Golang"), "Terms are bound, not inlined");
}

#[test]
fn negated_field_and_free_text() {
   let registry = FieldRegistry::default();
   let clause = compile_search(r#"!tags:"=Golang" and Programming"#, &registry);

   let expected = format!(
      "{} AND ({})",
      TAGS_GOLANG.replace("t.name =", "t.name !="),
      fan_out("Programming")
   );
   assert_eq!(clause.to_string(), expected);
}

#[test]
fn bare_term_fans_out_over_every_field() {
   let registry = FieldRegistry::default();
   let clause = compile_search("herbert", &registry);

   assert_eq!(clause.to_string(), format!("({})", fan_out("herbert")));
   assert_eq!(clause.params().len(), 8);
   assert!(clause.params().iter().all(|p| p == &json!("%herbert%")));
}

#[test]
fn quoted_phrase_is_one_term() {
   let registry = FieldRegistry::default();
   let clause = compile_search(r#""frank herbert""#, &registry);

   assert_eq!(clause.to_string(), format!("({})", fan_out("frank herbert")));
}

#[test]
fn connectives_are_case_insensitive() {
   let registry = FieldRegistry::default();
   assert_eq!(
      compile_search(r#"title:"=a" AND title:"=b""#, &registry),
      compile_search(r#"title:"=a" and title:"=b""#, &registry)
   );
}

#[test]
fn connective_introduces_the_next_fragment() {
   let registry = FieldRegistry::default();
   let clause = compile_search(r#"title:"=a" or title:"=b" and title:"=c""#, &registry);

   assert_eq!(
      clause.to_string(),
      r#"(b.title = "a") OR (b.title = "b") AND (b.title = "c")"#
   );
}

#[test]
fn trailing_connective_is_ignored() {
   let registry = FieldRegistry::default();
   assert_eq!(
      compile_search(r#"title:"=a" and"#, &registry),
      compile_search(r#"title:"=a""#, &registry)
   );
}

#[test]
fn unparsed_remainder_is_discarded() {
   let registry = FieldRegistry::default();
   assert_eq!(
      compile_search(r#"title:"=a" or or title:"=b""#, &registry).to_string(),
      r#"(b.title = "a")"#
   );
}

#[test]
fn custom_column_search() {
   let registry = FieldRegistry::with_custom_fields(&[CustomField {
      id: 2,
      label: "genre".into(),
      normalized: true,
   }]);
   let clause = compile_search(r#"#genre:"~fant""#, &registry);

   assert_eq!(
      clause.to_string(),
      r#"b.id IN (SELECT cl.book FROM books_custom_column_2_link cl JOIN custom_column_2 cc ON(cl.value = cc.id) WHERE (cc.value LIKE "%fant%"))"#
   );
}

#[test]
fn quotes_in_terms_stay_out_of_the_sql() {
   let registry = FieldRegistry::default();
   let clause = compile_search(r#"title:"=a\" OR 1=1 --""#, &registry);

   assert_eq!(clause.sql(), "(b.title = ?)");
   assert_eq!(clause.params(), &[json!(r#"a" OR 1=1 --"#)]);
}
