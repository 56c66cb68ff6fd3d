mod common;

use std::collections::BTreeMap;

use common::FixedChoices;
use csv_remap::{
    choice::{AmbiguityResolver, present, parse_presets},
    correspond::{Candidates, ColumnCorrespondence},
};
use proptest::prelude::*;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn correspondence(entries: Vec<(&str, Candidates)>) -> ColumnCorrespondence {
    ColumnCorrespondence::new(
        entries
            .into_iter()
            .map(|(column, candidates)| (column.to_string(), candidates))
            .collect(),
    )
}

fn unique_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 1..6)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

proptest! {
    #[test]
    fn automatic_mode_takes_the_first_candidate_every_time(candidates in unique_names()) {
        let map = correspondence(vec![("target", Candidates::List(candidates.clone()))]);
        let first = AmbiguityResolver::automatic()
            .resolve_all(&map, &candidates)
            .expect("first resolution");
        let second = AmbiguityResolver::automatic()
            .resolve_all(&map, &candidates)
            .expect("second resolution");
        prop_assert_eq!(first.get("target"), Some(candidates[0].as_str()));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn singleton_list_passes_through_unchanged(name in "[a-z]{1,8}") {
        let map = correspondence(vec![("target", Candidates::List(vec![name.clone()]))]);
        let mut nobody = FixedChoices::new(&[]);
        let resolved = AmbiguityResolver::interactive(&mut nobody)
            .resolve_all(&map, std::slice::from_ref(&name))
            .expect("singleton");
        prop_assert_eq!(resolved.get("target"), Some(name.as_str()));
        prop_assert!(nobody.asked.is_empty());
    }
}

#[test]
fn interactive_mode_only_asks_for_real_choices() {
    let input_columns = strings(&["uid", "amt", "ts"]);
    let map = correspondence(vec![
        ("id", Candidates::Single("uid".to_string())),
        ("amount", Candidates::List(strings(&["amt", "uid"]))),
        ("when", Candidates::Unresolved),
    ]);
    let mut answers = FixedChoices::new(&["uid", "ts"]);
    let resolved = AmbiguityResolver::interactive(&mut answers)
        .resolve_all(&map, &input_columns)
        .expect("resolve");

    assert_eq!(
        resolved.entries(),
        &[
            ("id".to_string(), "uid".to_string()),
            ("amount".to_string(), "uid".to_string()),
            ("when".to_string(), "ts".to_string()),
        ]
    );
    let asked = answers
        .asked
        .iter()
        .map(|field| field.template_column.as_str())
        .collect::<Vec<_>>();
    assert_eq!(asked, vec!["amount", "when"]);
    assert_eq!(answers.asked[1].options, input_columns);
}

#[test]
fn presets_win_but_must_be_offered() {
    let input_columns = strings(&["uid", "amt", "ts"]);
    let map = correspondence(vec![
        ("id", Candidates::List(strings(&["uid", "ts"]))),
        ("amount", Candidates::List(strings(&["amt", "uid"]))),
    ]);

    let preset = parse_presets(&strings(&["id=ts"])).expect("preset");
    let resolved = AmbiguityResolver::automatic()
        .with_preset(preset)
        .resolve_all(&map, &input_columns)
        .expect("resolve");
    assert_eq!(resolved.get("id"), Some("ts"));
    assert_eq!(resolved.get("amount"), Some("amt"));

    let mut outside = BTreeMap::new();
    outside.insert("amount".to_string(), "ts".to_string());
    let err = AmbiguityResolver::automatic()
        .with_preset(outside)
        .resolve_all(&map, &input_columns)
        .expect_err("ts was not offered for amount");
    assert!(err.is_invalid_choice());
}

#[test]
fn presented_fields_mark_locked_and_unresolved_entries() {
    let input_columns = strings(&["uid", "amt"]);
    let map = correspondence(vec![
        ("id", Candidates::Single("uid".to_string())),
        ("note", Candidates::Unresolved),
    ]);
    let fields = present(&map, &input_columns);
    assert!(fields[0].locked);
    assert_eq!(fields[0].options, strings(&["uid"]));
    assert!(fields[1].unresolved);
    assert_eq!(fields[1].options, input_columns);
}
