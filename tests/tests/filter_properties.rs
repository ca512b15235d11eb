//! Property-based tests for the filter compiler

use proptest::prelude::*;
use serde_json::{json, Value};
use strata_filter::{compile, Filter, FilterOptions};

// Property: for identifier-shaped field names, the clause has exactly the
// parameterized shape; the value only ever lands in the parameter array.
proptest! {
    #[test]
    fn compiled_sql_is_injection_safe(
        field in "[a-zA-Z_][a-zA-Z0-9_]{0,15}",
        value in "[ -~]{1,40}"
    ) {
        let filter = Filter::where_clause(json!({ field.as_str(): &value }));
        let compiled = compile(&filter, &FilterOptions::default()).unwrap();

        let expected = format!(
            r#""trashed_at" IS NULL AND "deleted_at" IS NULL AND ("{field}" = $1)"#
        );
        prop_assert_eq!(compiled.where_clause, expected);
        prop_assert_eq!(compiled.params, vec![json!(value)]);
    }
}

// Property: placeholders are dense and ordered regardless of operator mix
proptest! {
    #[test]
    fn parameter_indices_are_dense(
        a in -1000i64..1000,
        b in -1000i64..1000,
        start in 0usize..50
    ) {
        let filter = Filter::where_clause(json!({
            "x": {"$gte": a, "$lt": b},
            "y": {"$ne": a}
        }));
        let compiled = compile(&filter, &FilterOptions::starting_at(start)).unwrap();

        prop_assert_eq!(compiled.params.len(), 3);
        for index in 1..=3 {
            let placeholder = format!("${}", start + index);
            prop_assert!(
                compiled.where_clause.contains(&placeholder),
                "missing {} in {}", placeholder, compiled.where_clause
            );
        }
    }
}

// Property: non-identifier field names never reach SQL assembly
proptest! {
    #[test]
    fn invalid_field_names_are_rejected(
        field in "[ -~]{1,20}"
    ) {
        let is_identifier = {
            let mut chars = field.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                }
                _ => false,
            }
        };

        let filter = Filter::where_clause(json!({ field.as_str(): 1 }));
        let result = compile(&filter, &FilterOptions::default());
        if is_identifier {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}

// Property: the soft-delete overlay is always present unless opted out
proptest! {
    #[test]
    fn soft_delete_overlay_is_default(value in "[a-z]{1,10}") {
        let filter = Filter::where_clause(json!({"status": value}));

        let default = compile(&filter, &FilterOptions::default()).unwrap();
        prop_assert!(default.where_clause.contains(r#""trashed_at" IS NULL"#));
        prop_assert!(default.where_clause.contains(r#""deleted_at" IS NULL"#));

        let opted_out = compile(
            &filter,
            &FilterOptions::default().include_trashed().include_deleted(),
        )
        .unwrap();
        prop_assert!(!opted_out.where_clause.contains("trashed_at"));
        prop_assert!(!opted_out.where_clause.contains("deleted_at"));
    }
}

#[test]
fn membership_bounds_are_constants_not_params() {
    let empty_in = compile(
        &Filter::where_clause(json!({"a": {"$in": []}})),
        &FilterOptions::default(),
    )
    .unwrap();
    assert!(empty_in.where_clause.contains("1 = 0"));
    assert!(empty_in.params.is_empty());

    let empty_nin = compile(
        &Filter::where_clause(json!({"a": {"$nin": []}})),
        &FilterOptions::default(),
    )
    .unwrap();
    assert!(empty_nin.where_clause.contains("1 = 1"));
    assert!(empty_nin.params.is_empty());
}

#[test]
fn null_comparisons_consume_no_params() {
    let compiled = compile(
        &Filter::where_clause(json!({
            "a": {"$eq": null},
            "b": {"$ne": null},
            "c": null
        })),
        &FilterOptions::default(),
    )
    .unwrap();
    assert!(compiled.params.is_empty());
    assert_eq!(compiled.where_clause.matches("IS NULL").count(), 4);
    assert_eq!(compiled.where_clause.matches("IS NOT NULL").count(), 1);
}

#[test]
fn select_list_is_validated() {
    let filter = Filter::from_value(json!({"select": ["name", "email"]})).unwrap();
    assert_eq!(
        filter.select_list().unwrap(),
        Some(vec!["name".to_string(), "email".to_string()])
    );

    let star = Filter::from_value(json!({"select": "*"})).unwrap();
    assert_eq!(star.select_list().unwrap(), None);

    let bad = Filter::from_value(json!({"select": ["drop table x"]})).unwrap();
    assert!(bad.select_list().is_err());
}

#[test]
fn values_matching_placeholder_syntax_stay_parameterized() {
    let compiled = compile(
        &Filter::where_clause(json!({"note": "$1; DROP TABLE account"})),
        &FilterOptions::default(),
    )
    .unwrap();
    assert_eq!(compiled.params, vec![Value::String("$1; DROP TABLE account".into())]);
    assert!(!compiled.where_clause.contains("DROP"));
}
