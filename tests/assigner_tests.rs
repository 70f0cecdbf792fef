// tests/assigner_tests.rs

mod common;

use common::{assigner_for, checker_passing_only, shared_tokens, BlockingProbe};
use rstest::rstest;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use token_broker::assigner::{AssignmentPhase, StartOutcome};
use token_broker::error::{AppError, PoolExhaustedReason};
use token_broker::health::TokenHealthChecker;
use token_broker::storage::InMemoryStore;

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[tokio::test]
async fn single_healthy_token_is_assigned_wherever_it_starts(#[case] healthy_at: usize) {
    let values = ["token-a", "token-b", "token-c"];
    let healthy = values[healthy_at];

    let store = Arc::new(InMemoryStore::new(shared_tokens(&values), None));
    let (checker, _) = checker_passing_only(&[healthy]);
    let (session, assigner) = assigner_for(store.clone(), checker, 42);

    let outcome = assigner.start().await.unwrap();
    match outcome {
        StartOutcome::Assigned(token) => assert_eq!(token.expose(), healthy),
        other => panic!("expected assignment, got {other:?}"),
    }

    let committed = store.personal_token("u1").await.expect("token committed");
    assert_eq!(committed.expose(), healthy);
    assert_eq!(
        session.personal_token().await.unwrap().expose(),
        healthy
    );
    assert_eq!(assigner.state().await.phase, AssignmentPhase::Success);
}

#[tokio::test]
async fn concurrent_start_reports_busy_without_touching_progress() {
    let store = Arc::new(InMemoryStore::new(shared_tokens(&["token-a"]), None));
    let (probe, release) = BlockingProbe::new();
    let checker = TokenHealthChecker::new(vec![probe]);
    let (_session, assigner) = assigner_for(store, checker, 1);

    let running = {
        let assigner = assigner.clone();
        tokio::spawn(async move { assigner.start().await })
    };

    // Wait until the first flow is mid-scan, held by the blocking probe.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = assigner.state().await;
        if state.phase == AssignmentPhase::Scanning && state.scan_progress.current == 1 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "scan never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let second = assigner.start().await.unwrap();
    assert_eq!(second, StartOutcome::Busy);
    let state = assigner.state().await;
    assert_eq!(state.scan_progress.current, 1);
    assert_eq!(state.scan_progress.total, 1);

    release.release();
    let outcome = running.await.unwrap().unwrap();
    assert!(matches!(outcome, StartOutcome::Assigned(_)));
}

#[tokio::test]
async fn exhausted_pool_reports_every_candidate_tested() {
    let store = Arc::new(InMemoryStore::new(
        shared_tokens(&["token-a", "token-b", "token-c"]),
        None,
    ));
    let (checker, _) = checker_passing_only(&[]);
    let (_session, assigner) = assigner_for(store, checker, 7);

    let err = assigner.start().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoneHealthy
        }
    ));

    let state = assigner.state().await;
    assert_eq!(state.phase, AssignmentPhase::Error);
    assert_eq!(state.scan_progress.current, 3);
    assert_eq!(state.scan_progress.total, 3);
    assert!(state
        .last_error
        .as_deref()
        .unwrap()
        .contains("try again in a moment"));
}

#[tokio::test]
async fn empty_pool_fails_immediately_with_distinct_message() {
    let store = Arc::new(InMemoryStore::new(Vec::new(), None));
    let (checker, calls) = checker_passing_only(&["anything"]);
    let (_session, assigner) = assigner_for(store, checker, 7);

    let err = assigner.start().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoTokensConfigured
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(assigner
        .state()
        .await
        .last_error
        .as_deref()
        .unwrap()
        .contains("could not find any available connection tokens"));
}

#[tokio::test]
async fn schema_failure_halts_the_scan_immediately() {
    let store = Arc::new(InMemoryStore::new(
        shared_tokens(&["token-a", "token-b", "token-c"]),
        None,
    ));
    store.break_schema().await;
    // Every token is healthy, so the very first candidate reaches commit.
    let (checker, calls) = checker_passing_only(&["token-a", "token-b", "token-c"]);
    let (_session, assigner) = assigner_for(store.clone(), checker, 11);

    let err = assigner.start().await.unwrap_err();
    assert!(matches!(err, AppError::SchemaFailure(_)));

    // Only the first candidate was health-checked: two probes, one token.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(assigner.state().await.phase, AssignmentPhase::Error);
    assert!(store.personal_token("u1").await.is_none());
}

#[tokio::test]
async fn commit_conflict_moves_on_to_the_next_candidate() {
    let store = Arc::new(InMemoryStore::new(
        shared_tokens(&["token-a", "token-b"]),
        None,
    ));
    let (checker, _) = checker_passing_only(&["token-a", "token-b"]);
    // Both tokens are healthy; whichever is scanned first is already taken.
    store.claim_elsewhere("token-a").await;
    store.claim_elsewhere("token-b").await;

    let (_session, assigner) = assigner_for(store.clone(), checker, 3);
    let err = assigner.start().await.unwrap_err();
    // Both conflicted: the scan ran through the full list and exhausted it.
    assert!(matches!(
        err,
        AppError::PoolExhausted {
            reason: PoolExhaustedReason::NoneHealthy
        }
    ));
    let state = assigner.state().await;
    assert_eq!(state.scan_progress.current, 2);
}

#[tokio::test]
async fn conflict_on_first_candidate_still_assigns_the_second() {
    let store = Arc::new(InMemoryStore::new(
        shared_tokens(&["token-a", "token-b"]),
        None,
    ));
    let (checker, _) = checker_passing_only(&["token-a", "token-b"]);
    // token-b is already held elsewhere, so whatever the scan order, the
    // flow must end up committing token-a.
    store.claim_elsewhere("token-b").await;

    let (_session, assigner) = assigner_for(store.clone(), checker, 3);
    let outcome = assigner.start().await.unwrap();
    match outcome {
        StartOutcome::Assigned(token) => assert_eq!(token.expose(), "token-a"),
        other => panic!("expected assignment, got {other:?}"),
    }
    assert_eq!(
        store.personal_token("u1").await.unwrap().expose(),
        "token-a"
    );
    assert_eq!(assigner.state().await.phase, AssignmentPhase::Success);
}

#[tokio::test]
async fn retry_resets_progress_and_runs_again() {
    let store = Arc::new(InMemoryStore::new(shared_tokens(&["token-a"]), None));
    let (checker, _) = checker_passing_only(&[]);
    let (_session, assigner) = assigner_for(store.clone(), checker, 5);

    assert!(assigner.start().await.is_err());
    assert_eq!(assigner.state().await.scan_progress.current, 1);

    // Still failing: retry is safe to call repeatedly from the error state.
    assert!(assigner.retry().await.is_err());
    assert!(assigner.retry().await.is_err());
    let state = assigner.state().await;
    assert_eq!(state.phase, AssignmentPhase::Error);
    assert_eq!(state.scan_progress.total, 1);
}
