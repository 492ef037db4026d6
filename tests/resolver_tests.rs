mod common;

use common::{Harness, MAP_ID};
use conflate_review::host::{HostEditor, Severity};
use conflate_review::navigator::AdvanceStatus;
use conflate_review::resolver::{ConflictResolver, REVIEW_NEEDS_TAG};
use conflate_review::{Direction, EntityId, ReviewError};

fn harness_on_first_reviewable() -> Harness {
    let mut h = Harness::initialized();
    h.api.script_step(42, 3, &[1, 2]);
    h.advance(Direction::Forward).unwrap();
    h
}

#[test]
fn retain_without_reviewable_makes_no_requests() {
    let mut h = Harness::initialized();

    let err = ConflictResolver::new()
        .retain(&h.navigator, &mut h.session, &mut h.host, &mut h.ui)
        .unwrap_err();

    assert!(matches!(err, ReviewError::NothingToReview));
    assert!(h.api.calls().is_empty());
}

#[test]
fn retain_marks_reviewed_saves_and_moves_on() {
    let mut h = harness_on_first_reviewable();
    h.api.script_step(43, 4, &[3, 4]);

    let ticket = ConflictResolver::new()
        .retain(&h.navigator, &mut h.session, &mut h.host, &mut h.ui)
        .unwrap();

    {
        let state = h.api.state();
        assert_eq!(state.uploads.len(), 1);
        let uploaded = &state.uploads[0];
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].id(), EntityId::relation(42));
        assert_eq!(
            uploaded[0].tags().get(REVIEW_NEEDS_TAG).map(String::as_str),
            Some("no")
        );
    }
    assert!(!h.host.has_unsaved_changes());
    assert_eq!(
        h.host
            .entity(&EntityId::relation(42))
            .map(|element| element.version()),
        Some(2)
    );

    let outcome = ticket.fetch(h.api.as_ref());
    let status = h
        .navigator
        .finish_advance(&mut h.session, &mut h.host, &mut h.ui, outcome)
        .unwrap();
    match status {
        AdvanceStatus::Highlighted(cursor) => assert_eq!(cursor.relation_id, 43),
        other => panic!("unexpected status: {other:?}"),
    }
    let request = h.api.state().next_requests[1].clone();
    assert_eq!(request.sort_order, 3);
    assert_eq!(request.direction, Direction::Forward);
}

#[test]
fn retain_stops_when_save_fails() {
    let mut h = harness_on_first_reviewable();
    h.api.state().upload_failure = Some(500);
    let calls_before = h.api.calls().len();

    let err = ConflictResolver::new()
        .retain(&h.navigator, &mut h.session, &mut h.host, &mut h.ui)
        .unwrap_err();

    assert!(matches!(err, ReviewError::SaveFailed(_)));
    assert!(h.ui.has_alert(Severity::Error, "Failed to save changes"));
    // Only the failed upload was attempted; no navigation request followed.
    assert_eq!(h.api.calls().len(), calls_before + 1);
    assert!(h.session.in_flight().is_none());
    assert!(!h.session.is_processing());

    // The pair stays on screen so the operator can retry the save.
    assert_eq!(h.session.current_pair().map(|pair| pair.relation_id), Some(42));
    let highlighted: Vec<EntityId> = h.host.highlighted().iter().copied().collect();
    assert_eq!(highlighted, vec![EntityId::node(1), EntityId::node(2)]);
    assert!(h.host.has_unsaved_changes());

    h.api.state().upload_failure = None;
    h.api.script_step(43, 4, &[3, 4]);
    let ticket = ConflictResolver::new()
        .retain(&h.navigator, &mut h.session, &mut h.host, &mut h.ui)
        .unwrap();
    assert!(!h.host.has_unsaved_changes());
    assert_eq!(h.api.state().uploads.len(), 1);

    let outcome = ticket.fetch(h.api.as_ref());
    let status = h
        .navigator
        .finish_advance(&mut h.session, &mut h.host, &mut h.ui, outcome)
        .unwrap();
    match status {
        AdvanceStatus::Highlighted(cursor) => assert_eq!(cursor.relation_id, 43),
        other => panic!("unexpected status: {other:?}"),
    }
}

#[test]
fn retain_refuses_pair_left_behind_by_failed_load() {
    let mut h = harness_on_first_reviewable();
    h.api.push_statistics(10, 9);
    h.api.push_next(1, 43, 4);
    let err = h.advance(Direction::Forward).unwrap_err();
    assert!(matches!(err, ReviewError::FeatureNotFound(_)));
    let calls_before = h.api.calls().len();

    let err = ConflictResolver::new()
        .retain(&h.navigator, &mut h.session, &mut h.host, &mut h.ui)
        .unwrap_err();

    assert!(matches!(err, ReviewError::FeatureNotFound(id) if id == EntityId::relation(43)));
    assert!(h.ui.has_alert(Severity::Error, "cannot be retained"));
    assert_eq!(h.api.calls().len(), calls_before);
    assert!(!h.host.has_unsaved_changes());
    assert_eq!(
        h.host
            .entity(&EntityId::relation(42))
            .and_then(|element| element.tags().get(REVIEW_NEEDS_TAG).cloned())
            .as_deref(),
        Some("yes")
    );
}

#[test]
fn accept_all_resolves_reloads_and_exits() {
    let mut h = harness_on_first_reviewable();

    ConflictResolver::new()
        .accept_all(
            &h.navigator,
            &mut h.session,
            h.api.as_ref(),
            &mut h.host,
            &mut h.ui,
            "map-5",
        )
        .unwrap();

    assert!(h.api.calls().contains(&format!("resolve_all {MAP_ID}")));
    assert_eq!(h.ui.completed, vec![MAP_ID]);
    assert_eq!(h.ui.exits.len(), 1);
    assert!(h.ui.has_alert(Severity::Success, "All reviews accepted"));
    assert!(!h.session.is_active());
    assert!(!h.session.is_processing());
    assert!(h.host.graph().is_empty());
    assert!(h.host.highlighted().is_empty());
}

#[test]
fn accept_all_saves_pending_edits_first() {
    let mut h = harness_on_first_reviewable();
    let mut tags = h
        .host
        .entity(&EntityId::node(1))
        .map(|element| element.tags().clone())
        .unwrap();
    tags.insert("name".to_string(), "Edited".to_string());
    h.host.set_tags(&EntityId::node(1), tags).unwrap();

    ConflictResolver::new()
        .accept_all(
            &h.navigator,
            &mut h.session,
            h.api.as_ref(),
            &mut h.host,
            &mut h.ui,
            "map-5",
        )
        .unwrap();

    let calls = h.api.calls();
    let upload = calls.iter().position(|c| c == "upload 5").unwrap();
    let resolve = calls.iter().position(|c| c == "resolve_all 5").unwrap();
    assert!(upload < resolve);
}

#[test]
fn accept_all_failure_keeps_session_and_releases_processing() {
    let mut h = harness_on_first_reviewable();
    h.api.state().resolve_all_failure = Some(500);

    let err = ConflictResolver::new()
        .accept_all(
            &h.navigator,
            &mut h.session,
            h.api.as_ref(),
            &mut h.host,
            &mut h.ui,
            "map-5",
        )
        .unwrap_err();

    assert!(matches!(err, ReviewError::ResolveAllFailed(_)));
    assert!(h.session.is_active());
    assert!(!h.session.is_processing());
    assert!(h.ui.exits.is_empty());
    assert!(h.ui.completed.is_empty());
}

#[test]
fn accept_all_requires_initialized_session() {
    let mut h = Harness::new();

    let err = ConflictResolver::new()
        .accept_all(
            &h.navigator,
            &mut h.session,
            h.api.as_ref(),
            &mut h.host,
            &mut h.ui,
            "map-5",
        )
        .unwrap_err();

    assert!(matches!(err, ReviewError::NotInitialized));
    assert!(h.api.calls().is_empty());
}
