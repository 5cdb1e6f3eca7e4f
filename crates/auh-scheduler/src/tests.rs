use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use auh_core::{AttemptStatus, HistoryRecord, UpstreamCandidate};

use crate::{order_recipes, select_candidates, SelectionPolicy};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 28).expect("valid date")
}

fn candidate(recipe: &str, next_version: &str, maintainer: &str) -> UpstreamCandidate {
    UpstreamCandidate {
        recipe: recipe.to_string(),
        current_version: "1.0".to_string(),
        next_version: next_version.to_string(),
        status: "UPDATE".to_string(),
        maintainer: maintainer.to_string(),
        skip_reason: String::new(),
    }
}

fn history_entry(
    recipe: &str,
    version: &str,
    status: AttemptStatus,
    days_ago: i64,
) -> (String, HistoryRecord) {
    let record = HistoryRecord::new(
        recipe,
        version,
        "dev@example.com",
        today() - Duration::days(days_ago),
        status,
    );
    (recipe.to_string(), record)
}

fn policy() -> SelectionPolicy {
    SelectionPolicy {
        blacklist: Vec::new(),
        maintainers_whitelist: Vec::new(),
        cooldown_days: 7,
    }
}

fn selected_names(
    candidates: &[UpstreamCandidate],
    history: &BTreeMap<String, HistoryRecord>,
    policy: &SelectionPolicy,
) -> Vec<String> {
    select_candidates(candidates, history, policy, today())
        .into_iter()
        .map(|candidate| candidate.recipe)
        .collect()
}

#[test]
fn non_update_status_and_skip_reason_exclude() {
    let mut stalled = candidate("zlib", "2.0", "dev@example.com");
    stalled.status = "MATCH".to_string();
    let mut flagged = candidate("openssl", "3.3", "dev@example.com");
    flagged.skip_reason = "version pinned".to_string();
    let good = candidate("curl", "8.9", "dev@example.com");

    let names = selected_names(
        &[stalled, flagged, good],
        &BTreeMap::new(),
        &policy(),
    );
    assert_eq!(names, vec!["curl"]);
}

#[test]
fn missing_maintainer_excludes() {
    let names = selected_names(&[candidate("zlib", "2.0", "")], &BTreeMap::new(), &policy());
    assert!(names.is_empty());
}

#[test]
fn blacklisted_recipe_excludes() {
    let mut policy = policy();
    policy.blacklist = vec!["gcc".to_string()];

    let names = selected_names(
        &[
            candidate("gcc", "14.2", "dev@example.com"),
            candidate("zlib", "2.0", "dev@example.com"),
        ],
        &BTreeMap::new(),
        &policy,
    );
    assert_eq!(names, vec!["zlib"]);
}

#[test]
fn whitelist_matches_maintainer_substring() {
    let mut policy = policy();
    policy.maintainers_whitelist = vec!["@trusted.org".to_string()];

    let names = selected_names(
        &[
            candidate("zlib", "2.0", "Dev One <one@trusted.org>"),
            candidate("curl", "8.9", "Dev Two <two@elsewhere.net>"),
        ],
        &BTreeMap::new(),
        &policy,
    );
    assert_eq!(names, vec!["zlib"]);
}

#[test]
fn prior_success_for_same_version_always_excludes() {
    let history: BTreeMap<_, _> =
        [history_entry("zlib", "2.0", AttemptStatus::Succeeded, 400)].into();

    let names = selected_names(
        &[candidate("zlib", "2.0", "dev@example.com")],
        &history,
        &policy(),
    );
    assert!(names.is_empty());
}

#[test]
fn prior_non_transient_failure_for_same_version_excludes_regardless_of_age() {
    let history: BTreeMap<_, _> =
        [history_entry("zlib", "2.0", AttemptStatus::CompileError, 400)].into();

    let names = selected_names(
        &[candidate("zlib", "2.0", "dev@example.com")],
        &history,
        &policy(),
    );
    assert!(names.is_empty());
}

#[test]
fn transient_failure_retried_only_after_cooldown() {
    let recent: BTreeMap<_, _> =
        [history_entry("zlib", "2.0", AttemptStatus::FetchError, 7)].into();
    let stale: BTreeMap<_, _> =
        [history_entry("zlib", "2.0", AttemptStatus::FetchError, 8)].into();
    let candidates = [candidate("zlib", "2.0", "dev@example.com")];

    assert!(selected_names(&candidates, &recent, &policy()).is_empty());
    assert_eq!(selected_names(&candidates, &stale, &policy()), vec!["zlib"]);
}

#[test]
fn unknown_error_is_retried_after_cooldown() {
    let history: BTreeMap<_, _> =
        [history_entry("zlib", "2.0", AttemptStatus::UnknownError, 10)].into();

    let names = selected_names(
        &[candidate("zlib", "2.0", "dev@example.com")],
        &history,
        &policy(),
    );
    assert_eq!(names, vec!["zlib"]);
}

#[test]
fn history_for_a_different_version_does_not_block() {
    let history: BTreeMap<_, _> =
        [history_entry("zlib", "1.9", AttemptStatus::Succeeded, 1)].into();

    let names = selected_names(
        &[candidate("zlib", "2.0", "dev@example.com")],
        &history,
        &policy(),
    );
    assert_eq!(names, vec!["zlib"]);
}

#[test]
fn cross_and_native_recipes_are_excluded() {
    let names = selected_names(
        &[
            candidate("gcc-cross-x86_64", "14.2", "dev@example.com"),
            candidate("zlib-native", "2.0", "dev@example.com"),
            candidate("zlib", "2.0", "dev@example.com"),
        ],
        &BTreeMap::new(),
        &policy(),
    );
    assert_eq!(names, vec!["zlib"]);
}

#[test]
fn survivors_keep_input_order() {
    let names = selected_names(
        &[
            candidate("zlib", "2.0", "dev@example.com"),
            candidate("curl", "8.9", "dev@example.com"),
            candidate("busybox", "1.37", "dev@example.com"),
        ],
        &BTreeMap::new(),
        &policy(),
    );
    assert_eq!(names, vec!["zlib", "curl", "busybox"]);
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn edges(values: &[(&str, &str)]) -> Vec<(String, String)> {
    values
        .iter()
        .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
        .collect()
}

#[test]
fn chain_orders_dependencies_first() {
    // B depends on A, C depends on B: output must be A, B, C regardless of
    // input order.
    for input in [
        names(&["a", "b", "c"]),
        names(&["c", "b", "a"]),
        names(&["b", "c", "a"]),
    ] {
        let ordered = order_recipes(&input, &edges(&[("b", "a"), ("c", "b")]))
            .expect("must order acyclic graph");
        assert_eq!(ordered, names(&["a", "b", "c"]));
    }
}

#[test]
fn dependency_never_placed_after_dependent() {
    let ordered = order_recipes(
        &names(&["app", "lib", "tool", "base"]),
        &edges(&[("app", "lib"), ("lib", "base"), ("tool", "base")]),
    )
    .expect("must order acyclic graph");

    let position = |name: &str| {
        ordered
            .iter()
            .position(|entry| entry == name)
            .expect("name present")
    };
    assert!(position("base") < position("lib"));
    assert!(position("lib") < position("app"));
    assert!(position("base") < position("tool"));
}

#[test]
fn cycle_is_reported_with_both_names() {
    let err = order_recipes(&names(&["a", "b"]), &edges(&[("a", "b"), ("b", "a")]))
        .expect_err("cycle must be detected");
    let pair = [err.first.as_str(), err.second.as_str()];
    assert!(pair.contains(&"a"));
    assert!(pair.contains(&"b"));
}

#[test]
fn unconstrained_names_follow_in_input_order() {
    let ordered = order_recipes(
        &names(&["standalone-z", "b", "standalone-a", "a"]),
        &edges(&[("b", "a")]),
    )
    .expect("must order");
    assert_eq!(ordered, names(&["a", "b", "standalone-z", "standalone-a"]));
}

#[test]
fn edges_touching_outside_names_are_ignored() {
    let ordered = order_recipes(
        &names(&["a", "b"]),
        &edges(&[("b", "a"), ("b", "outsider"), ("outsider", "a")]),
    )
    .expect("must order");
    assert_eq!(ordered, names(&["a", "b"]));
}

#[test]
fn empty_set_orders_to_empty() {
    let ordered = order_recipes(&[], &[]).expect("must order");
    assert!(ordered.is_empty());
}
