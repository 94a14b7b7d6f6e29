use calibre_query::{
   EntityKind, Error, GuiLanguage, Layout, MAX_LIMIT_START, QueryOptions, SortBy, Theme,
};

/// A spread of option values exercising every field.
fn samples() -> Vec<QueryOptions> {
   let mut samples = vec![QueryOptions::default()];

   let mut browse = QueryOptions::default();
   browse.set_entity(EntityKind::Series, 42);
   browse.set_sort_by(SortBy::Series);
   browse.set_descending(true);
   browse.set_limit_length(10).unwrap();
   browse.set_query_count(Some(35));
   browse.inc_limit();
   browse.inc_limit();
   samples.push(browse);

   let mut search = QueryOptions::default();
   search.set_matching(r#"!tags:"=Golang" and "Frank \"Dune\" Herbert" | x"#);
   search.set_virt_lib("#genre:~fant\\asy\n");
   search.set_gui_language(GuiLanguage::French);
   search.set_layout(Layout::Table);
   search.set_theme(Theme::Dark);
   search.set_query_count(Some(0));
   samples.push(search);

   let mut unicode = QueryOptions::default();
   unicode.set_entity(EntityKind::Authors, -7);
   unicode.set_matching("Émile Zola 日本 \u{7f}");
   unicode.set_sort_by(SortBy::Title);
   unicode.set_limit_length(u32::MAX).unwrap();
   samples.push(unicode);

   for sort_by in SortBy::ALL {
      let mut sorted = QueryOptions::default();
      sorted.set_sort_by(sort_by);
      samples.push(sorted);
   }

   samples
}

// ============================================================================
// Round-trip
// ============================================================================

#[test]
fn serialize_round_trips_every_sample() {
   for options in samples() {
      let serialized = options.serialize();
      let restored = QueryOptions::deserialize(&serialized).unwrap();
      assert_eq!(restored, options, "{serialized}");
   }
}

#[test]
fn serialized_field_order() {
   let mut options = QueryOptions::default();
   options.set_entity(EntityKind::Tags, 5);
   options.set_descending(true);
   options.set_matching("dune");
   options.set_sort_by(SortBy::Rating);
   options.set_query_count(Some(120));
   options.inc_limit();

   assert_eq!(
      options.serialize(),
      r#"|5|true|"tags"|0|0|20|20|"dune"|120|5|0|""|"#
   );
}

#[test]
fn deserialize_rejects_invalid_input() {
   let wrong_count = QueryOptions::deserialize("|1|2|").unwrap_err();
   assert!(matches!(
      wrong_count,
      Error::FieldCountMismatch {
         found: 2,
         expected: 12
      }
   ));

   let zero_length =
      QueryOptions::deserialize(r#"|0|false|""|0|0|0|0|""|-1|0|0|""|"#).unwrap_err();
   assert_eq!(zero_length, Error::InvalidPageSize);

   let unaligned =
      QueryOptions::deserialize(r#"|0|false|""|0|0|20|7|""|-1|0|0|""|"#).unwrap_err();
   assert_eq!(
      unaligned,
      Error::UnalignedPageStart {
         start: 7,
         length: 20
      }
   );

   let bad_sort = QueryOptions::deserialize(r#"|0|false|""|0|0|20|0|""|-1|99|0|""|"#).unwrap_err();
   assert!(matches!(bad_sort, Error::InvalidField { field: "SortBy", .. }));

   let bad_entity =
      QueryOptions::deserialize(r#"|0|false|"shelves"|0|0|20|0|""|-1|0|0|""|"#).unwrap_err();
   assert!(matches!(bad_entity, Error::InvalidField { field: "Entity", .. }));
   assert_eq!(bad_entity.error_code(), "INVALID_OPTION_FIELD");
}

// ============================================================================
// Pagination
// ============================================================================

#[test]
fn changing_the_request_resets_to_first_page() {
   type Change = fn(&mut QueryOptions);
   let changes: [(&str, Change); 5] = [
      ("matching", |o| o.set_matching("new")),
      ("sort_by", |o| o.set_sort_by(SortBy::Size)),
      ("entity", |o| o.set_entity(EntityKind::Tags, 1)),
      ("descending", |o| o.set_descending(true)),
      ("virt_lib", |o| o.set_virt_lib("tags:x")),
   ];

   for (name, change) in changes {
      let mut options = QueryOptions::default();
      options.inc_limit();
      options.inc_limit();
      assert_eq!(options.limit_start(), 40);

      change(&mut options);
      assert_eq!(options.limit_start(), 0, "{name}");
   }
}

#[test]
fn unchanged_values_keep_the_page() {
   let mut options = QueryOptions::default();
   options.set_matching("dune");
   options.inc_limit();

   options.set_matching("dune");
   options.set_sort_by(SortBy::Unsorted);
   options.set_descending(false);
   options.set_entity(EntityKind::None, 0);
   options.set_theme(Theme::Dark);
   options.set_layout(Layout::List);

   assert_eq!(options.limit_start(), 20);
}

#[test]
fn dec_limit_clamps_at_zero() {
   let mut options = QueryOptions::default();
   options.dec_limit();
   assert_eq!(options.limit_start(), 0);

   options.inc_limit();
   options.dec_limit();
   options.dec_limit();
   assert_eq!(options.limit_start(), 0);
}

#[test]
fn inc_limit_stops_at_last_page() {
   let mut options = QueryOptions::default();
   options.set_query_count(Some(45));

   for _ in 0..10 {
      options.inc_limit();
   }

   assert_eq!(options.limit_start(), 40);
   assert_eq!(options.limit_start() % u64::from(options.limit_length()), 0);
}

#[test]
fn page_start_beyond_sqlite_offsets_is_rejected() {
   let serialized = r#"|0|false|""|0|0|20|18446744073709551600|""|-1|0|0|""|"#;
   assert_eq!(
      QueryOptions::deserialize(serialized),
      Err(Error::InvalidField {
         field: "LimitStart",
         value: "18446744073709551600".into(),
      })
   );
}

#[test]
fn paging_stops_at_the_largest_offset() {
   // The largest aligned start for a page length of one
   let serialized = format!(r#"|0|false|""|0|0|1|{MAX_LIMIT_START}|""|-1|0|0|""|"#);
   let mut options = QueryOptions::deserialize(&serialized).unwrap();

   assert!(options.has_next_page());
   options.inc_limit();
   assert_eq!(options.limit_start(), MAX_LIMIT_START);
   assert_eq!(options.page_number(), MAX_LIMIT_START + 1);
   assert_eq!(
      options.build_limit_clause(),
      format!("LIMIT 1 OFFSET {}", i64::MAX)
   );

   options.set_query_count(Some(u64::MAX));
   assert!(options.has_next_page());
   options.inc_limit();
   assert_eq!(options.limit_start(), MAX_LIMIT_START);
}

#[test]
fn order_and_limit_clauses() {
   let mut options = QueryOptions::default();
   options.set_sort_by(SortBy::AcquisitionDate);
   options.set_descending(true);
   options.inc_limit();

   assert_eq!(
      options.build_order_clause(),
      "ORDER BY b.timestamp DESC, b.sort ASC"
   );
   assert_eq!(options.build_limit_clause(), "LIMIT 20 OFFSET 20");
}
