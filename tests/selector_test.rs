//! Tests for candidate selection

mod common;

use common::{FakeLocator, FakeRetriever, CHANNEL_ID};
use proptest::prelude::*;
use rebroadcast::models::parse_iso8601_duration;
use rebroadcast::selector::CandidateSelector;
use rebroadcast::source::SearchItem;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_single_morning_item_is_selected_and_fetched_once() {
    let locator = Arc::new(FakeLocator::new().with_item("dawn", "2024-05-01T03:00:00Z", "PT7H"));
    let selector = CandidateSelector::with_seed(locator.clone(), common::test_policy(), 1);

    let candidate = selector.select().await.expect("eligible item not selected");
    assert_eq!(candidate.id, "dawn");
    assert_eq!(candidate.declared_duration, Some(Duration::from_secs(7 * 3600)));
    assert_eq!(locator.duration_queries(), 1);

    let dir = tempfile::tempdir().unwrap();
    let retriever = Arc::new(FakeRetriever::new());
    let fetcher = common::test_fetcher(dir.path(), retriever.clone());

    let artifact = fetcher.fetch(&candidate).await.unwrap();
    assert_eq!(retriever.calls(), 1);
    assert_eq!(artifact.path, dir.path().join("dawn.mp4"));
}

#[tokio::test]
async fn test_short_item_rejected() {
    let locator = Arc::new(FakeLocator::new().with_item("brief", "2024-05-01T04:00:00Z", "PT5H59M"));
    let selector = CandidateSelector::with_seed(locator, common::test_policy(), 1);

    assert!(selector.select().await.is_none());
}

#[tokio::test]
async fn test_missing_duration_rejected() {
    let locator = Arc::new(FakeLocator::new().with_item("odd", "2024-05-01T04:00:00Z", "P1D"));
    let selector = CandidateSelector::with_seed(locator, common::test_policy(), 1);

    assert!(selector.select().await.is_none());
}

#[tokio::test]
async fn test_evening_items_never_selected() {
    let locator = Arc::new(
        FakeLocator::new()
            .with_item("late", "2024-05-01T11:00:00Z", "PT8H")
            .with_item("night", "2024-05-01T23:59:59Z", "PT8H")
            .with_item("early", "2024-05-01T01:59:59Z", "PT8H"),
    );
    let selector = CandidateSelector::with_seed(locator.clone(), common::test_policy(), 1);

    assert!(selector.select().await.is_none());
    // Nothing eligible means no duration lookup either
    assert_eq!(locator.duration_queries(), 0);
}

#[tokio::test]
async fn test_search_failure_yields_none() {
    let locator = Arc::new(FakeLocator::failing());
    let selector = CandidateSelector::with_seed(locator.clone(), common::test_policy(), 1);

    assert!(selector.select().await.is_none());
    assert_eq!(locator.searches(), 1);
}

#[tokio::test]
async fn test_selection_is_uniform() {
    let ids = ["a", "b", "c", "d"];
    let locator = ids.iter().fold(FakeLocator::new(), |locator, id| {
        locator.with_item(id, "2024-05-01T05:00:00Z", "PT6H")
    });
    let selector = CandidateSelector::with_seed(Arc::new(locator), common::test_policy(), 42);

    let rounds = 4000;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..rounds {
        let candidate = selector.select().await.unwrap();
        *counts.entry(candidate.id).or_default() += 1;
    }

    assert_eq!(counts.len(), ids.len());
    let expected = rounds / ids.len();
    for (id, count) in &counts {
        assert!(
            count.abs_diff(expected) < expected / 5,
            "{id} chosen {count} times, expected about {expected}"
        );
    }
}

proptest! {
    #[test]
    fn prop_duration_parses_components(h in 0u64..100, m in 0u64..60, s in 0u64..60) {
        let raw = format!("PT{h}H{m}M{s}S");
        prop_assert_eq!(parse_iso8601_duration(&raw), h * 3600 + m * 60 + s);
    }

    #[test]
    fn prop_eligible_items_are_inside_window(
        hours in proptest::collection::vec(0u32..24, 1..20),
        minute in 0u32..60,
    ) {
        let policy = common::test_policy();
        let items: Vec<SearchItem> = hours
            .iter()
            .enumerate()
            .map(|(i, h)| {
                SearchItem::new(
                    format!("v{i}"),
                    "Live",
                    format!("2024-05-01T{h:02}:{minute:02}:00Z"),
                )
            })
            .collect();

        let expected = hours.iter().filter(|h| (2..11).contains(*h)).count();
        let eligible = policy.eligible(items);

        prop_assert_eq!(eligible.len(), expected);
        for candidate in &eligible {
            let hour = policy.publication_hour(&candidate.published_at);
            prop_assert!(policy.start_hour <= hour && hour < policy.end_hour);
        }
    }

    #[test]
    fn prop_selected_candidate_meets_criteria(
        hour in 0u32..24,
        declared_hours in 0u64..12,
    ) {
        let published = format!("2024-05-01T{hour:02}:15:00Z");
        let duration = format!("PT{declared_hours}H");
        let locator = Arc::new(FakeLocator::new().with_item("x", &published, &duration));
        let selector = CandidateSelector::with_seed(locator, common::test_policy(), 3);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let selected = runtime.block_on(selector.select());

        let should_select = (2..11).contains(&hour) && declared_hours >= 6;
        prop_assert_eq!(selected.is_some(), should_select);
        if let Some(candidate) = selected {
            prop_assert!(candidate.declared_duration.unwrap() >= Duration::from_secs(6 * 3600));
        }
    }
}

#[test]
fn test_policy_uses_channel() {
    assert_eq!(common::test_policy().channel_id, CHANNEL_ID);
}
