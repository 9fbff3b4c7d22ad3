//! View session behavior: navigation, set cards and answers

mod helpers;

use helpers::{bundle_json, objective_question, objective_set, topic_route, ScriptedSource};
use mav_common::events::{EventBus, ViewerEvent};
use mav_viewer::{
    ApplyOutcome, EntityLocator, RequestContext, RetryPolicy, RouteParams, SetCardState,
    ToastKind, ViewSession, ViewState, ViewerError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const T1: &str = "/book-data/b1/chapters/c1/topics/t1";
const T2: &str = "/book-data/b1/chapters/c1/topics/t2";
const BY_SET: &str = "/question-sets/s1/questions";
const BY_QUERY: &str = "/questions?questionSet=s1";
const ALL: &str = "/questions";

fn session(source: &Arc<ScriptedSource>) -> ViewSession<ScriptedSource> {
    ViewSession::new(
        Arc::clone(source),
        RetryPolicy::no_retry(),
        EventBus::new(64),
    )
}

/// Topic t1 with one unpopulated L2 set s1 = ["q1", "q2"] of 5
fn script_topic(source: &ScriptedSource) {
    let mut s1 = objective_set("s1", "L2", json!(["q1", "q2"]));
    s1["totalQuestions"] = json!(5);
    source.ok(
        T1,
        bundle_json("Current electricity", json!([]), json!([s1]), json!([])),
    );
}

#[tokio::test]
async fn test_topic_route_resolves_and_fills_set() {
    let source = Arc::new(ScriptedSource::new());
    script_topic(&source);
    source.ok(
        BY_SET,
        json!([objective_question("q1", Some("s1")), objective_question("q2", Some("s1"))]),
    );
    let session = session(&source);
    let ctx = RequestContext::anonymous();

    let outcome = session
        .navigate(&topic_route("b1", "c1", "t1"), &ctx)
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);

    let bundle = session.bundle().await.unwrap();
    assert_eq!(bundle.objective_sets.l2.len(), 1);
    assert!(!bundle.objective_sets.l2[0].is_populated());

    let card = session.open_set("s1", &ctx).await.unwrap();
    assert_eq!(card.state, SetCardState::Populated);
    let ids: Vec<&str> = card.set.full_questions().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2"]);

    assert_eq!(source.calls(), vec![T1.to_string(), BY_SET.to_string()]);
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let source = Arc::new(ScriptedSource::new());
    source.ok(T1, bundle_json("Topic one", json!([]), json!([]), json!([])));
    source.delay(T1, Duration::from_millis(200));
    source.ok(T2, bundle_json("Topic two", json!([]), json!([]), json!([])));

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let session = Arc::new(ViewSession::new(
        Arc::clone(&source),
        RetryPolicy::no_retry(),
        bus,
    ));

    let slow = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session
                .navigate(&topic_route("b1", "c1", "t1"), &RequestContext::anonymous())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = session
        .navigate(&topic_route("b1", "c1", "t2"), &RequestContext::anonymous())
        .await
        .unwrap();
    assert_eq!(fast, ApplyOutcome::Applied);

    let stale = slow.await.unwrap().unwrap();
    assert_eq!(stale, ApplyOutcome::Discarded);

    let bundle = session.bundle().await.unwrap();
    assert_eq!(bundle.item.title, "Topic two");

    let mut saw_stale = false;
    while let Ok(event) = rx.try_recv() {
        if let ViewerEvent::StaleBundleDiscarded { entity_path, .. } = event {
            assert_eq!(entity_path, T1);
            saw_stale = true;
        }
    }
    assert!(saw_stale);
}

#[tokio::test]
async fn test_ticket_from_superseded_navigation_is_ignored() {
    let source = Arc::new(ScriptedSource::new());
    let session = session(&source);

    let first = session
        .begin_navigation(EntityLocator::locate(&topic_route("b1", "c1", "t1")).unwrap())
        .await;
    let second = session
        .begin_navigation(EntityLocator::locate(&topic_route("b1", "c1", "t2")).unwrap())
        .await;
    assert!(second.generation() > first.generation());

    let two = serde_json::from_value(bundle_json("Two", json!([]), json!([]), json!([]))).unwrap();
    assert_eq!(
        session.complete_navigation(&second, Ok(two)).await,
        ApplyOutcome::Applied
    );

    let one = serde_json::from_value(bundle_json("One", json!([]), json!([]), json!([]))).unwrap();
    assert_eq!(
        session.complete_navigation(&first, Ok(one)).await,
        ApplyOutcome::Discarded
    );

    assert_eq!(session.bundle().await.unwrap().item.title, "Two");
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn test_invalid_route_makes_no_request() {
    let source = Arc::new(ScriptedSource::new());
    let session = session(&source);
    let params = RouteParams {
        chapter_id: Some("c1".to_string()),
        ..RouteParams::default()
    };

    let err = session
        .navigate(&params, &RequestContext::anonymous())
        .await
        .unwrap_err();

    assert!(matches!(err, ViewerError::InvalidReference(_)));
    assert!(!err.is_retryable());
    assert!(matches!(session.state().await, ViewState::Invalid { .. }));
    assert_eq!(source.total_calls(), 0);

    let retried = session.retry(&RequestContext::anonymous()).await.unwrap_err();
    assert_eq!(retried.to_string(), err.to_string());
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn test_failed_load_can_be_retried() {
    let source = Arc::new(ScriptedSource::new());
    source.fail("/book-data/b1", 503);
    source.ok(
        "/book-data/b1",
        bundle_json("Physics", json!([]), json!([]), json!([])),
    );
    let session = session(&source);
    let ctx = RequestContext::anonymous();
    let params = RouteParams::from_segments(&["b1"], true).unwrap();

    let err = session.navigate(&params, &ctx).await.unwrap_err();
    assert!(matches!(err, ViewerError::AggregationFailed(_)));
    match session.state().await {
        ViewState::Failed { entity, message } => {
            assert!(entity.is_workbook);
            assert!(message.contains("503"));
        }
        other => panic!("expected failed state, got {}", other.name()),
    }

    assert_eq!(session.retry(&ctx).await.unwrap(), ApplyOutcome::Applied);
    assert_eq!(session.bundle().await.unwrap().item.title, "Physics");
    assert_eq!(source.call_count("/book-data/b1"), 2);

    assert!(session.retry(&ctx).await.is_err());
}

#[tokio::test]
async fn test_exhausted_card_retries_only_on_request() {
    let source = Arc::new(ScriptedSource::new());
    script_topic(&source);
    source.fail(BY_SET, 500);
    source.ok(BY_SET, json!([objective_question("q1", None)]));
    source.ok(BY_QUERY, json!([]));
    source.ok(ALL, json!([]));
    let session = session(&source);
    let ctx = RequestContext::anonymous();

    session
        .navigate(&topic_route("b1", "c1", "t1"), &ctx)
        .await
        .unwrap();

    let card = session.open_set("s1", &ctx).await.unwrap();
    assert_eq!(card.state, SetCardState::EmptyConfirmed);
    assert!(card.set.resolution_failed);
    let after_first_open = source.total_calls();
    assert_eq!(after_first_open, 4);

    let reopened = session.open_set("s1", &ctx).await.unwrap();
    assert_eq!(reopened.state, SetCardState::EmptyConfirmed);
    assert_eq!(source.total_calls(), after_first_open);

    let retried = session.retry_set(&ctx).await.unwrap();
    assert_eq!(retried.state, SetCardState::Populated);
    assert!(!retried.set.resolution_failed);
    assert_eq!(source.total_calls(), after_first_open + 1);

    assert!(session.retry_set(&ctx).await.is_err());
}

#[tokio::test]
async fn test_unknown_set_is_rejected() {
    let source = Arc::new(ScriptedSource::new());
    script_topic(&source);
    let session = session(&source);
    let ctx = RequestContext::anonymous();
    session
        .navigate(&topic_route("b1", "c1", "t1"), &ctx)
        .await
        .unwrap();

    assert!(session.open_set("nope", &ctx).await.is_err());
    assert!(session.open_card().await.is_none());
}

#[tokio::test]
async fn test_incorrect_answer_keeps_card_and_selection() {
    let source = Arc::new(ScriptedSource::new());
    script_topic(&source);
    source.ok(
        BY_SET,
        json!([objective_question("q1", Some("s1")), objective_question("q2", Some("s1"))]),
    );
    source.ok("POST /questions/q1/answer", json!({ "isCorrect": false }));
    let session = session(&source);
    let ctx = RequestContext::anonymous();

    session
        .navigate(&topic_route("b1", "c1", "t1"), &ctx)
        .await
        .unwrap();
    let before = session.open_set("s1", &ctx).await.unwrap();
    let calls_before = source.total_calls();

    let toast = session.answer("q1", 2, &ctx).await;

    assert_eq!(toast.kind, ToastKind::Error);
    assert_eq!(toast.message, "Incorrect");
    assert_eq!(session.selection("q1").await, Some(2));

    let after = session.open_card().await.unwrap();
    assert_eq!(after.state, before.state);
    assert_eq!(after.set, before.set);

    assert_eq!(source.total_calls(), calls_before + 1);
    assert_eq!(
        source.posted(),
        vec![(
            "/questions/q1/answer".to_string(),
            json!({ "selectedAnswer": 2 })
        )]
    );
}

#[tokio::test]
async fn test_close_and_navigate_reset_card_state() {
    let source = Arc::new(ScriptedSource::new());
    script_topic(&source);
    source.ok(T2, bundle_json("Topic two", json!([]), json!([]), json!([])));
    source.ok(BY_SET, json!([objective_question("q1", None)]));
    source.ok("POST /questions/q1/answer", json!({ "isCorrect": true }));
    let session = session(&source);
    let ctx = RequestContext::anonymous();

    session
        .navigate(&topic_route("b1", "c1", "t1"), &ctx)
        .await
        .unwrap();
    session.open_set("s1", &ctx).await.unwrap();
    let toast = session.answer("q1", 1, &ctx).await;
    assert_eq!(toast.message, "Correct!");

    session.close_set().await;
    assert!(session.open_card().await.is_none());
    assert_eq!(session.selection("q1").await, None);

    session.open_set("s1", &ctx).await.unwrap();
    assert_eq!(source.call_count(BY_SET), 2);

    session
        .navigate(&topic_route("b1", "c1", "t2"), &ctx)
        .await
        .unwrap();
    assert!(session.open_card().await.is_none());
}
