//! Integration tests for the search-and-extract loop.
//!
//! These drive the orchestrator step by step over a scripted model and an
//! in-memory mailbox:
//! 1. Happy path (one broad query finds the record)
//! 2. Narrowing after a large empty result
//! 3. Exhaustion after the attempt limit
//! 4. Repetition guards
//! 5. Failure handling (auth, fetch, planner)

use std::sync::Arc;

use chrono::{Duration, Utc};
use mail_extraction::{
    testing::{MockMailbox, MockModel, MockModelCall},
    AgentConfig, AgentError, CategoryStatus, DoneReason, ExhaustionReason, MemoryMailbox,
    MessageContent, Orchestrator, RecordCandidate, Refinement, RunState, StepReport,
};

type TestOrchestrator = Orchestrator<Arc<MockMailbox>, Arc<MockModel>>;

/// Helper to create a message `age_minutes` old.
fn message(id: &str, sender: &str, subject: &str, body: &str, age_minutes: i64) -> MessageContent {
    MessageContent::new(id, subject, sender, Utc::now() - Duration::minutes(age_minutes), body)
}

/// 39 newsletters plus one welcome message holding a member number.
fn acme_messages() -> Vec<MessageContent> {
    let mut messages: Vec<MessageContent> = (0..39)
        .map(|i| {
            message(
                &format!("news-{i:02}"),
                "news@acme.com",
                &format!("Acme weekly deals #{i}"),
                "Save big this weekend",
                i,
            )
        })
        .collect();
    messages.push(message(
        "welcome",
        "rewards@acme.com",
        "Welcome to Acme Rewards",
        "Thanks for joining. Your member number is 1234-5678.",
        1000,
    ));
    messages
}

fn setup(
    mailbox: MemoryMailbox,
    model: MockModel,
    config: AgentConfig,
) -> (TestOrchestrator, Arc<MockMailbox>, Arc<MockModel>) {
    let mailbox = Arc::new(MockMailbox::new(mailbox));
    let model = Arc::new(model);
    let orchestrator = Orchestrator::new(mailbox.clone(), model.clone(), config).unwrap();
    (orchestrator, mailbox, model)
}

async fn step(orchestrator: &TestOrchestrator, state: &RunState) -> (RunState, StepReport) {
    let outcome = orchestrator.run_step(state).await.unwrap();
    (outcome.state, outcome.report)
}

#[tokio::test]
async fn test_happy_path_finds_record_in_one_attempt() {
    let (orchestrator, mailbox, model) = setup(
        MemoryMailbox::with_messages(acme_messages()).with_max_results(50),
        MockModel::new()
            .with_queries("Acme", &["from:acme.com"])
            .with_record(
                "welcome",
                RecordCandidate::new("Acme", "1234-5678")
                    .with_tier("Gold")
                    .with_confidence(95),
            ),
        AgentConfig::new(["Acme"]).with_fetch_batch_size(3),
    );

    let (state, report) = step(&orchestrator, &orchestrator.new_state()).await;

    match report {
        StepReport::Attempted(report) => {
            assert_eq!(report.query, "from:acme.com");
            assert_eq!(report.messages_found, 40);
            assert_eq!(report.messages_read, 3);
            assert_eq!(report.records_added, 1);
            assert_eq!(report.status, CategoryStatus::Found);
        }
        other => panic!("expected an attempt, got {other:?}"),
    }
    assert_eq!(mailbox.fetched_ids().len(), 3);
    assert!(mailbox.fetched_ids().contains(&"welcome".to_string()));

    let record = &state.records()[0];
    assert_eq!(record.key_value, "1234-5678");
    assert_eq!(record.source_message_id, "welcome");
    assert_eq!(record.tier(), Some("Gold"));

    // Found is terminal: the next step does no Acme work.
    let (state, report) = step(&orchestrator, &state).await;
    assert_eq!(report, StepReport::Done(DoneReason::AllResolved));
    assert_eq!(model.planning_calls("Acme"), 1);
    assert_eq!(mailbox.search_queries().len(), 1);
    assert_eq!(state.record_count(), 1);
}

#[tokio::test]
async fn test_large_empty_result_leads_to_narrower_query() {
    let (orchestrator, _mailbox, model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new()
            .with_queries("Acme", &["from:acme.com", "from:acme.com subject:welcome"])
            .with_record("welcome", RecordCandidate::new("Acme", "12345678")),
        AgentConfig::new(["Acme"]),
    );

    let (state, _) = step(&orchestrator, &orchestrator.new_state()).await;
    let first = state.latest_attempt("Acme").unwrap().clone();
    assert_eq!(first.messages_found, 20);
    assert_eq!(first.records_found, 0);
    assert_eq!(state.status("Acme"), Some(CategoryStatus::Searching));

    let (state, _) = step(&orchestrator, &state).await;
    let history = state.history("Acme").unwrap();
    let second = &history.attempts()[1];

    assert_ne!(second.query, first.query);
    assert!(second.query.starts_with(&first.query));
    assert!(second.messages_found < first.messages_found);
    assert_eq!(history.status(), CategoryStatus::Found);
    assert_eq!(history.attempt_count(), 2);

    let refinements: Vec<Refinement> = model
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockModelCall::ProposeQuery { refinement, .. } => Some(refinement),
            _ => None,
        })
        .collect();
    assert_eq!(refinements, vec![Refinement::Broad, Refinement::Narrow]);
}

#[tokio::test]
async fn test_category_exhausts_after_attempt_limit() {
    let (orchestrator, _mailbox, model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new()
            .with_queries(
                "Beta",
                &["from:beta.com", "beta", "\"beta rewards\"", "subject:beta", "betacard"],
            )
            .with_queries("Acme", &["from:acme.com"]),
        AgentConfig::new(["Beta", "Acme"]),
    );

    let mut state = orchestrator.new_state();
    for i in 0..5 {
        let (next, report) = step(&orchestrator, &state).await;
        match report {
            StepReport::Attempted(report) => {
                assert_eq!(report.category, "Beta");
                let expected = if i < 4 {
                    CategoryStatus::Searching
                } else {
                    CategoryStatus::Exhausted
                };
                assert_eq!(report.status, expected);
            }
            other => panic!("expected an attempt, got {other:?}"),
        }
        state = next;
    }

    let beta = state.history("Beta").unwrap();
    assert_eq!(beta.attempt_count(), 5);
    assert_eq!(beta.exhaustion(), Some(ExhaustionReason::AttemptLimit));

    // Sixth step skips Beta entirely.
    let (state, report) = step(&orchestrator, &state).await;
    match report {
        StepReport::Attempted(report) => assert_eq!(report.category, "Acme"),
        other => panic!("expected an Acme attempt, got {other:?}"),
    }
    assert_eq!(model.planning_calls("Beta"), 5);
    assert_eq!(state.history("Beta").unwrap().attempt_count(), 5);
}

#[tokio::test]
async fn test_repeated_query_exhausts_without_new_attempt() {
    let (orchestrator, mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new().with_queries("Acme", &["from:acme.com", "  FROM:acme.com "]),
        AgentConfig::new(["Acme"]),
    );

    let (state, _) = step(&orchestrator, &orchestrator.new_state()).await;
    let outcome = orchestrator.run_step(&state).await.unwrap();

    assert_eq!(outcome.report, StepReport::Done(DoneReason::AllResolved));
    assert_eq!(outcome.closed[0].reason, ExhaustionReason::RepeatedQuery);

    let history = outcome.state.history("Acme").unwrap();
    assert_eq!(history.status(), CategoryStatus::Exhausted);
    assert_eq!(history.attempt_count(), 1);
    assert_eq!(mailbox.search_queries().len(), 1);
}

#[tokio::test]
async fn test_repeated_result_set_exhausts_without_fetching() {
    let messages = vec![
        message("a1", "news@acme.com", "Acme news", "nothing", 1),
        message("a2", "news@acme.com", "Acme news", "nothing", 2),
    ];
    let (orchestrator, mailbox, _model) = setup(
        MemoryMailbox::with_messages(messages),
        MockModel::new().with_queries("Acme", &["from:acme.com", "acme"]),
        AgentConfig::new(["Acme"]),
    );

    let (state, _) = step(&orchestrator, &orchestrator.new_state()).await;
    let fetched_before = mailbox.fetched_ids().len();

    let outcome = orchestrator.run_step(&state).await.unwrap();
    let history = outcome.state.history("Acme").unwrap();

    assert_eq!(history.exhaustion(), Some(ExhaustionReason::RepeatedResults));
    assert_eq!(history.attempt_count(), 1);
    assert_eq!(mailbox.fetched_ids().len(), fetched_before);
}

#[tokio::test]
async fn test_already_read_messages_are_not_read_again() {
    let mut messages: Vec<MessageContent> = (1..=4)
        .map(|i| message(&format!("a{i}"), "news@acme.com", &format!("Acme news {i}"), "nothing", i))
        .collect();
    messages.push(message("b1", "partner@other.com", "Acme partner offer", "nothing", 10));

    let (orchestrator, _mailbox, _model) = setup(
        MemoryMailbox::with_messages(messages),
        MockModel::new().with_queries("Acme", &["from:acme.com", "subject:acme"]),
        AgentConfig::new(["Acme"]).with_fetch_batch_size(2),
    );

    let (state, _) = step(&orchestrator, &orchestrator.new_state()).await;
    let (state, _) = step(&orchestrator, &state).await;

    let attempts = state.history("Acme").unwrap().attempts();
    assert_eq!(attempts[0].read_message_ids, vec!["a1", "a2"]);
    assert_eq!(attempts[1].read_message_ids, vec!["a3", "a4"]);
}

#[tokio::test]
async fn test_dedup_is_idempotent() {
    let spellings = [("Acme", "1234 5678"), ("acme", "1234-5678")];

    // Both extraction orders must settle on one record.
    for (first_key, second_key) in [(spellings[0], spellings[1]), (spellings[1], spellings[0])] {
        let messages = vec![
            message("m1", "rewards@acme.com", "Welcome to Acme", "Member 1234 5678", 1),
            message("m2", "rewards@acme.com", "Your Acme statement", "Member 1234-5678", 2),
        ];
        let (orchestrator, _mailbox, _model) = setup(
            MemoryMailbox::with_messages(messages),
            MockModel::new()
                .with_queries("Acme", &["from:acme.com"])
                .with_record("m1", RecordCandidate::new(first_key.0, first_key.1))
                .with_record("m2", RecordCandidate::new(second_key.0, second_key.1)),
            AgentConfig::new(["Acme"]),
        );

        let initial = orchestrator.new_state();
        let (first, _) = step(&orchestrator, &initial).await;
        assert_eq!(first.record_count(), 1);
        assert_eq!(first.records()[0].key_value, first_key.1);
        assert_eq!(first.records()[0].category, "Acme");

        // Stepping a finished state changes nothing.
        let (second, report) = step(&orchestrator, &first).await;
        assert_eq!(report, StepReport::Done(DoneReason::AllResolved));
        assert_eq!(second.records(), first.records());
    }
}

#[tokio::test]
async fn test_auth_failure_halts_without_advancing() {
    let (orchestrator, mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new().with_queries("Acme", &["from:acme.com"]),
        AgentConfig::new(["Acme"]),
    );
    mailbox.fail_auth();

    let state = orchestrator.new_state();
    let err = orchestrator.run_step(&state).await.unwrap_err();

    assert!(matches!(err, AgentError::StoreAuth(_)));
    assert_eq!(state.total_attempts(), 0);
    assert!(state.history("Acme").is_none());
}

#[tokio::test]
async fn test_auth_failure_during_fetch_halts_without_advancing() {
    let (orchestrator, mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new()
            .with_queries("Acme", &["from:acme.com"])
            .with_record("welcome", RecordCandidate::new("Acme", "12345678")),
        AgentConfig::new(["Acme"]),
    );
    mailbox.fail_fetch_auth();

    let state = orchestrator.new_state();
    let err = orchestrator.run_step(&state).await.unwrap_err();

    assert!(matches!(err, AgentError::StoreAuth(_)));
    assert_eq!(mailbox.search_queries(), vec!["from:acme.com"]);
    assert!(!mailbox.fetched_ids().is_empty());
    assert_eq!(state.total_attempts(), 0);
    assert!(state.records().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_only_loses_the_failing_message() {
    let (orchestrator, mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()).with_max_results(50),
        MockModel::new()
            .with_queries("Acme", &["from:acme.com"])
            .with_record("welcome", RecordCandidate::new("Acme", "12345678")),
        AgentConfig::new(["Acme"]).with_fetch_batch_size(3),
    );
    mailbox.fail_fetch("welcome");

    let (state, _) = step(&orchestrator, &orchestrator.new_state()).await;
    let attempt = state.latest_attempt("Acme").unwrap();

    assert_eq!(attempt.messages_read, 2);
    assert_eq!(attempt.failed_message_ids, vec!["welcome"]);
    assert_eq!(attempt.records_found, 0);
    assert_eq!(state.status("Acme"), Some(CategoryStatus::Searching));
    assert!(!state.cache.contains("welcome"));
}

#[tokio::test]
async fn test_planner_failure_exhausts_category() {
    let (orchestrator, _mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new().with_planner_failure("Acme"),
        AgentConfig::new(["Acme"]),
    );

    let outcome = orchestrator.run_step(&orchestrator.new_state()).await.unwrap();

    assert!(outcome.is_done());
    assert_eq!(
        outcome.state.history("Acme").unwrap().exhaustion(),
        Some(ExhaustionReason::PlannerUnavailable)
    );
}

#[tokio::test]
async fn test_extraction_failure_counts_as_empty_attempt() {
    let (orchestrator, _mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new()
            .with_queries("Acme", &["from:acme.com subject:welcome"])
            .with_record("welcome", RecordCandidate::new("Acme", "12345678"))
            .with_extraction_failure("Acme"),
        AgentConfig::new(["Acme"]),
    );

    let (state, _) = step(&orchestrator, &orchestrator.new_state()).await;
    let attempt = state.latest_attempt("Acme").unwrap();

    assert_eq!(attempt.messages_read, 1);
    assert_eq!(attempt.records_found, 0);
    assert_eq!(state.record_count(), 0);
}

#[tokio::test]
async fn test_run_until_done_resolves_every_category() {
    let (orchestrator, _mailbox, _model) = setup(
        MemoryMailbox::with_messages(acme_messages()),
        MockModel::new()
            .with_queries("Acme", &["from:acme.com subject:welcome"])
            .with_record("welcome", RecordCandidate::new("Acme", "12345678"))
            .with_queries("Beta", &["from:beta.com"]),
        AgentConfig::new(["Acme", "Beta"]),
    );

    let outcome = orchestrator
        .run_until_done(orchestrator.new_state(), 20)
        .await
        .unwrap();

    assert_eq!(outcome.done, Some(DoneReason::AllResolved));
    let progress = outcome.state.progress();
    assert!(progress.is_complete());
    assert_eq!(progress.total_records, 1);
    assert_eq!(progress.categories[0].status, Some(CategoryStatus::Found));
    assert_eq!(progress.categories[1].status, Some(CategoryStatus::Exhausted));
    assert_eq!(
        progress.categories[1].exhaustion,
        Some(ExhaustionReason::PlannerDone)
    );
}
