//! Property-based tests using proptest
//!
//! These tests verify path lookups, pagination accounting, error
//! classification and delete filters using randomized inputs.

use cloudinv::engine::{item_channel, paginate, paginate_batched, DeleteFilter, Page};
use cloudinv::provider::{
    ignore_access_denied_service_disabled, ApiError, ErrorClass, FetchCancelled,
};
use cloudinv::schema::{field_name, resolve_path};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// Generate arbitrary JSON documents a few levels deep
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[A-Z][a-zA-Z]{0,6}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate dotted paths, including empty and numeric segments
fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof!["[A-Z][a-zA-Z]{0,6}", "[0-9]{1,2}", Just(String::new())], 0..5)
        .prop_map(|parts| parts.join("."))
}

/// Split `total` items into pages of the given sizes; the last page carries
/// no token
fn script(sizes: &[usize]) -> VecDeque<Page<usize>> {
    let mut next = 0;
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let items = (next..next + size).collect();
            next += size;
            let token = (i + 1 < sizes.len()).then(|| format!("t{}", i + 1));
            Page::new(items, token)
        })
        .collect()
}

proptest! {
    /// Path lookups never panic and always produce a value
    #[test]
    fn resolve_path_is_total(item in arb_json(), path in arb_path()) {
        let _ = resolve_path(&item, &path);
    }

    /// A path whose first segment is absent resolves to null
    #[test]
    fn missing_field_resolves_null(item in arb_json(), rest in arb_path()) {
        let path = format!("zz_missing.{}", rest);
        prop_assert_eq!(resolve_path(&item, &path), Value::Null);
    }

    /// Resolving a path to an existing key returns that key's value
    #[test]
    fn present_field_is_found(key in "[A-Z][a-z]{0,8}", value in arb_json()) {
        let item = json!({ key.clone(): value.clone() });
        prop_assert_eq!(resolve_path(&item, &key), value);
    }

    /// Field names carry no separators and keep every letter
    #[test]
    fn field_name_drops_underscores(column in "[a-z][a-z0-9]{0,6}(_[a-z0-9]{1,6}){0,4}") {
        let field = field_name(&column);
        prop_assert!(!field.contains('_'));
        prop_assert_eq!(field.to_lowercase(), column.replace('_', ""));
        prop_assert!(field.chars().next().is_some_and(|c| !c.is_ascii_lowercase()));
    }

    /// Every page's items are emitted once, in order
    #[test]
    fn paginate_emits_every_item(sizes in prop::collection::vec(0usize..30, 1..8)) {
        let total: usize = sizes.iter().sum();
        let (stats, items) = tokio_test::block_on(async {
            let (tx, mut rx, _) = item_channel(8, CancellationToken::new());
            let mut pages = script(&sizes);
            let producer = async {
                let stats = paginate(&tx, |_| {
                    let page = pages.pop_front().unwrap_or_else(|| Page::new(Vec::new(), None));
                    async move { Ok(page) }
                })
                .await;
                drop(tx);
                stats
            };
            let consumer = async {
                let mut items = Vec::new();
                while let Some(item) = rx.recv().await {
                    items.push(item);
                }
                items
            };
            tokio::join!(producer, consumer)
        });

        let stats = stats.unwrap();
        prop_assert_eq!(stats.pages, sizes.len());
        prop_assert_eq!(stats.items, total);
        prop_assert_eq!(items, (0..total).collect::<Vec<_>>());
    }

    /// Batched enrichment costs ceil(M / batch) calls regardless of page
    /// boundaries, and no window exceeds the batch size
    #[test]
    fn batched_enrichment_call_count(
        sizes in prop::collection::vec(0usize..45, 1..6),
        batch in 1usize..25,
    ) {
        let total: usize = sizes.iter().sum();
        let (stats, windows, emitted) = tokio_test::block_on(async {
            let (tx, mut rx, _) = item_channel(4, CancellationToken::new());
            let mut pages = script(&sizes);
            let mut windows = Vec::new();
            let producer = async {
                let stats = paginate_batched(
                    &tx,
                    batch,
                    |_| {
                        let page = pages.pop_front().unwrap_or_else(|| Page::new(Vec::new(), None));
                        async move { Ok(page) }
                    },
                    |items: Vec<usize>| {
                        windows.push(items.len());
                        async move { Ok(items) }
                    },
                )
                .await;
                drop(tx);
                stats
            };
            let consumer = async {
                let mut count = 0;
                while rx.recv().await.is_some() {
                    count += 1;
                }
                count
            };
            let (stats, emitted) = tokio::join!(producer, consumer);
            (stats, windows, emitted)
        });

        let stats = stats.unwrap();
        prop_assert_eq!(stats.batches, total.div_ceil(batch));
        prop_assert_eq!(windows.len(), total.div_ceil(batch));
        prop_assert!(windows.iter().all(|w| *w > 0 && *w <= batch));
        prop_assert_eq!(emitted, total);
    }

    /// Classification is total and agrees with the ignore predicate
    #[test]
    fn classification_follows_predicate(status in 400u16..600, code in "[A-Za-z]{1,30}") {
        let err = anyhow::Error::new(ApiError::new(status, code.clone(), ""));
        let class = ErrorClass::of(&err, Some(ignore_access_denied_service_disabled));
        let expected = if ignore_access_denied_service_disabled(&err) {
            ErrorClass::Ignorable
        } else {
            ErrorClass::Fatal
        };
        prop_assert_eq!(class, expected);
        prop_assert_eq!(class, ErrorClass::of(&err, Some(ignore_access_denied_service_disabled)));
        prop_assert_eq!(ErrorClass::of(&err, None), ErrorClass::Fatal);
    }

    /// Cancellation wins over any predicate, however deeply wrapped
    #[test]
    fn cancellation_always_wins(depth in 0usize..5) {
        let mut err = anyhow::Error::new(FetchCancelled);
        for i in 0..depth {
            err = err.context(format!("layer {}", i));
        }
        prop_assert_eq!(ErrorClass::of(&err, Some(|_: &anyhow::Error| true)), ErrorClass::Cancelled);
        prop_assert_eq!(ErrorClass::of(&err, None), ErrorClass::Cancelled);
    }

    /// An empty filter matches every row; a filter built from a row's own
    /// values matches that row
    #[test]
    fn delete_filter_matches_own_values(
        values in prop::collection::btree_map("[a-z_]{1,10}", "[a-z0-9-]{0,10}", 0..6)
    ) {
        let row: Map<String, Value> = values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        prop_assert!(DeleteFilter::new().matches(&row));

        let filter = values
            .iter()
            .fold(DeleteFilter::new(), |f, (k, v)| f.with(k.as_str(), v.as_str()));
        prop_assert!(filter.matches(&row));

        let stricter = filter.with("zz_not_a_column", "x");
        prop_assert!(!stricter.matches(&row));
    }
}
