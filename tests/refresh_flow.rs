mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{add_reviews, refresher, seeded_store, settings, ScriptedClient, CLUB, COURSE};
use reviewbot::eligibility::GenerationMode;
use reviewbot::llm::prompt_builder::{SourceMetadata, TRUNCATION_MARKER};
use reviewbot::{NewReview, RefreshOptions, RefreshOutcome, SummaryError, SummaryStore};

#[test]
fn cold_start_uses_most_recent_window() {
    let store = seeded_store();
    store.start_review_ids_at(101).unwrap();
    assert_eq!(add_reviews(&store, COURSE, 5), vec![101, 102, 103, 104, 105]);

    let llm = ScriptedClient::replying("  Students find the course rigorous but rewarding.  ");
    let refresher = refresher(&store, llm.clone(), settings(3, 3, 4));

    let outcome = refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Updated {
            mode: GenerationMode::ColdStart,
            last_review_id: 105,
            source_review_count: 5,
            window: 4,
        }
    );

    let record = store.get(&COURSE).unwrap().unwrap();
    assert_eq!(record.summary_text, "Students find the course rigorous but rewarding.");
    assert_eq!(record.last_review_id, Some(105));
    assert_eq!(record.source_review_count, 5);
    assert_eq!(record.model.as_deref(), Some("scripted-model"));

    let metadata: SourceMetadata = serde_json::from_value(record.source_metadata).unwrap();
    assert_eq!(metadata.review_ids, vec![102, 103, 104, 105]);
    assert_eq!(metadata.stats.review_count, 5);

    let payload = llm.last_payload();
    let sent: Vec<i64> = payload["reviews"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(sent, vec![102, 103, 104, 105]);
    assert_eq!(payload["stats"]["review_count"], 5);
    assert_eq!(payload["entity"]["instructor_name"], "Barbara Liskov");
}

#[test]
fn warm_refresh_waits_for_the_delta() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 3);
    let llm = ScriptedClient::replying("A balanced course.");
    let refresher = refresher(&store, llm.clone(), settings(3, 3, 40));
    let opts = RefreshOptions::default();

    refresher.refresh(&COURSE, &opts).unwrap();
    let mark = store.get(&COURSE).unwrap().unwrap().last_review_id.unwrap();
    assert_eq!(llm.calls(), 1);

    add_reviews(&store, COURSE, 2);
    assert_eq!(
        refresher.refresh(&COURSE, &opts).unwrap(),
        RefreshOutcome::BelowThreshold {
            mode: GenerationMode::WarmRefresh,
            have: 2,
            need: 3
        }
    );
    assert_eq!(llm.calls(), 1);

    add_reviews(&store, COURSE, 1);
    let outcome = refresher.refresh(&COURSE, &opts).unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Updated {
            mode: GenerationMode::WarmRefresh,
            last_review_id: mark + 3,
            source_review_count: 6,
            window: 3,
        }
    );
    assert_eq!(llm.calls(), 2);

    let payload = llm.last_payload();
    let sent: Vec<i64> = payload["reviews"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(sent, vec![mark + 1, mark + 2, mark + 3]);
    assert_eq!(payload["previous_summary"], "A balanced course.");
}

#[test]
fn repeated_calls_without_new_reviews_change_nothing() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 4);
    let llm = ScriptedClient::replying("Well organised.");
    let refresher = refresher(&store, llm.clone(), settings(3, 3, 40));

    refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap();
    let before = store.get(&COURSE).unwrap().unwrap();

    for _ in 0..2 {
        let outcome = refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap();
        assert!(matches!(outcome, RefreshOutcome::BelowThreshold { have: 0, .. }));
    }

    assert_eq!(store.get(&COURSE).unwrap().unwrap(), before);
    assert_eq!(llm.calls(), 1);
    assert_eq!(store.persist_calls().unwrap(), 1);
}

#[test]
fn provider_failure_leaves_summary_untouched() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 3);
    let good = refresher(&store, ScriptedClient::replying("First take."), settings(3, 3, 40));
    good.refresh(&COURSE, &RefreshOptions::default()).unwrap();
    let before = store.get(&COURSE).unwrap().unwrap();

    add_reviews(&store, COURSE, 5);
    let failing = ScriptedClient::failing();
    let bad = refresher(&store, failing.clone(), settings(3, 3, 40));
    assert_eq!(
        bad.refresh(&COURSE, &RefreshOptions::default()).unwrap(),
        RefreshOutcome::ProviderUnavailable
    );
    assert_eq!(failing.calls(), 1);

    let after = store.get(&COURSE).unwrap().unwrap();
    assert_eq!(after.summary_text, before.summary_text);
    assert_eq!(after.last_review_id, before.last_review_id);
    assert_eq!(after.source_review_count, before.source_review_count);

    // The next trigger retries from the same high-water mark.
    let outcome = good.refresh(&COURSE, &RefreshOptions::default()).unwrap();
    assert!(matches!(outcome, RefreshOutcome::Updated { window: 5, .. }));
}

#[test]
fn blank_reply_counts_as_failure() {
    let store = seeded_store();
    add_reviews(&store, CLUB, 3);
    let refresher = refresher(&store, ScriptedClient::replying("   \n"), settings(3, 3, 40));

    assert_eq!(
        refresher.refresh(&CLUB, &RefreshOptions::default()).unwrap(),
        RefreshOutcome::ProviderUnavailable
    );
    let record = store.get(&CLUB).unwrap().unwrap();
    assert!(!record.has_text());
    assert_eq!(record.last_review_id, None);
}

#[test]
fn no_eligible_reviews_creates_no_record() {
    let store = seeded_store();
    store
        .insert_review(&NewReview::new(COURSE, "hidden").hidden(true))
        .unwrap();
    store
        .insert_review(&NewReview::new(COURSE, "toxic").toxicity(0.99))
        .unwrap();
    store.insert_review(&NewReview::new(COURSE, "")).unwrap();

    let llm = ScriptedClient::replying("unused");
    let refresher = refresher(&store, llm.clone(), settings(1, 1, 40));

    assert_eq!(
        refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap(),
        RefreshOutcome::NoEligibleReviews
    );
    assert!(store.get(&COURSE).unwrap().is_none());
    assert_eq!(llm.calls(), 0);
}

#[test]
fn long_reviews_are_truncated_but_stats_cover_everything() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 6);
    store
        .insert_review(&NewReview::new(COURSE, "w".repeat(1_000)))
        .unwrap();

    let llm = ScriptedClient::replying("Long-winded reviewers agree.");
    let mut s = settings(3, 3, 2);
    s.snippet_chars = 350;
    let refresher = refresher(&store, llm.clone(), s);
    refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap();

    let payload = llm.last_payload();
    let reviews = payload["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    let long = reviews[1]["text"].as_str().unwrap();
    assert_eq!(long, format!("{}{TRUNCATION_MARKER}", "w".repeat(350)));
    assert_eq!(payload["stats"]["review_count"], 7);
}

#[test]
fn vanished_target_is_reported_and_nothing_is_written() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 3);
    store.remove_course(10).unwrap();

    let llm = ScriptedClient::replying("unused");
    let refresher = refresher(&store, llm.clone(), settings(3, 3, 40));

    let err = refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap_err();
    assert!(matches!(err, SummaryError::TargetNotFound(ref key) if key == "course:10:instructor:20"));
    assert_eq!(llm.calls(), 0);
    assert!(store.get(&COURSE).unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn dry_run_neither_calls_the_model_nor_writes() {
    let store = seeded_store();
    let ids = add_reviews(&store, CLUB, 5);
    let llm = ScriptedClient::replying("unused");
    let refresher = refresher(&store, llm.clone(), settings(3, 3, 40));

    let outcome = refresher
        .refresh(
            &CLUB,
            &RefreshOptions {
                dry_run: true,
                max_reviews: Some(2),
                initial_threshold: None,
            },
        )
        .unwrap();

    match outcome {
        RefreshOutcome::DryRun {
            mode,
            review_ids,
            eligible,
            ..
        } => {
            assert_eq!(mode, GenerationMode::ColdStart);
            assert_eq!(review_ids, ids[3..].to_vec());
            assert_eq!(eligible, 5);
        }
        other => panic!("expected a dry run, got {other:?}"),
    }
    assert_eq!(llm.calls(), 0);
    assert!(store.get(&CLUB).unwrap().is_none());
}

#[test]
fn min_reviews_override_lowers_the_cold_start_bar() {
    let store = seeded_store();
    add_reviews(&store, CLUB, 1);
    let refresher = refresher(&store, ScriptedClient::replying("A small but keen club."), settings(3, 3, 40));

    assert!(matches!(
        refresher.refresh(&CLUB, &RefreshOptions::default()).unwrap(),
        RefreshOutcome::BelowThreshold { have: 1, need: 3, .. }
    ));

    let outcome = refresher
        .refresh(
            &CLUB,
            &RefreshOptions {
                initial_threshold: Some(1),
                ..RefreshOptions::default()
            },
        )
        .unwrap();
    assert!(matches!(outcome, RefreshOutcome::Updated { window: 1, .. }));
}

#[test]
fn high_water_mark_never_moves_backwards() {
    let store = seeded_store();
    let refresher = refresher(&store, ScriptedClient::replying("Evolving picture."), settings(3, 3, 2));

    let mut marks = Vec::new();
    for batch in [3, 1, 2, 3, 7, 3] {
        add_reviews(&store, COURSE, batch);
        if let RefreshOutcome::Updated { last_review_id, .. } =
            refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap()
        {
            marks.push(last_review_id);
        }
    }

    assert!(marks.len() >= 3);
    assert!(marks.windows(2).all(|w| w[0] < w[1]), "marks went backwards: {marks:?}");
}

#[test]
fn concurrent_triggers_generate_once() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 5);
    let llm = ScriptedClient::slow("Serialized.", Duration::from_millis(150));
    let refresher = Arc::new(refresher(&store, llm.clone(), settings(3, 3, 40)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let refresher = Arc::clone(&refresher);
            thread::spawn(move || refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap())
        })
        .collect();
    let outcomes: Vec<RefreshOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let updated = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::Updated { .. }))
        .count();
    assert_eq!(updated, 1, "outcomes: {outcomes:?}");
    assert_eq!(llm.calls(), 1);
    assert_eq!(store.persist_calls().unwrap(), 1);
}

#[test]
fn waiting_refresh_sees_reviews_written_while_it_waited() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 3);
    let llm = ScriptedClient::slow("Refreshed in turn.", Duration::from_millis(300));
    let refresher = Arc::new(refresher(&store, llm.clone(), settings(3, 3, 40)));

    let spawn = |refresher: &Arc<reviewbot::Refresher>| {
        let refresher = Arc::clone(refresher);
        thread::spawn(move || refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap())
    };

    let first = spawn(&refresher);
    thread::sleep(Duration::from_millis(50));
    let second = spawn(&refresher);
    thread::sleep(Duration::from_millis(50));
    // Lands while the first call is still generating and the second is queued on the lock.
    let later = add_reviews(&store, COURSE, 3);

    assert!(matches!(
        first.join().unwrap(),
        RefreshOutcome::Updated { mode: GenerationMode::ColdStart, .. }
    ));
    assert!(matches!(
        second.join().unwrap(),
        RefreshOutcome::Updated { mode: GenerationMode::WarmRefresh, window: 3, .. }
    ));
    assert_eq!(llm.calls(), 2);
    assert_eq!(store.get(&COURSE).unwrap().unwrap().last_review_id, later.last().copied());
}

#[test]
fn targets_are_independent() {
    let store = seeded_store();
    add_reviews(&store, COURSE, 3);
    add_reviews(&store, CLUB, 3);
    let llm = ScriptedClient::replying("Independent.");
    let refresher = refresher(&store, llm.clone(), settings(3, 3, 40));

    refresher.refresh(&COURSE, &RefreshOptions::default()).unwrap();
    assert!(refresher.is_missing(&CLUB).unwrap());
    refresher.refresh(&CLUB, &RefreshOptions::default()).unwrap();
    assert!(!refresher.is_missing(&CLUB).unwrap());

    let payload = llm.last_payload();
    assert_eq!(payload["entity"]["name"], "Robotics Club");
    assert_eq!(store.list().unwrap().len(), 2);
}
