//! Executor, loader and dispatcher against scripted sessions.
mod common;

use chrono::NaiveDate;
use common::{fast_config, init_logger, FakeFactory, FakeSession, PageScript, Popup};
use hotel_sweep::dispatch::dispatch;
use hotel_sweep::executor::TaskExecutor;
use hotel_sweep::load_more::load_hotel_cards;
use hotel_sweep::partition::generate_tasks;
use hotel_sweep::scraping::site::SiteProfile;
use hotel_sweep::sink::{count_rows, CsvSink};
use hotel_sweep::{AbandonReason, DateTask, HotelRecord, Pacing, TaskOutcome};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn task() -> DateTask {
    DateTask::new(d(2024, 1, 1), d(2024, 1, 3)).unwrap()
}

#[tokio::test]
async fn ninety_nine_records_are_discarded_and_retried() {
    init_logger();
    let factory = FakeFactory::yields([99, 100]);
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(Some(10), 3));

    match executor.run(&task()).await {
        TaskOutcome::Accepted { records, attempts } => {
            assert_eq!(attempts, 2);
            assert_eq!(records.len(), 100);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(tally.opened(), 2);
    assert_eq!(tally.closed(), 2, "every session must be closed");
}

#[tokio::test]
async fn exactly_one_hundred_is_accepted_without_further_attempts() {
    let factory = FakeFactory::yields([100, 100, 100]);
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(Some(10), 3));

    let outcome = executor.run(&task()).await;

    let TaskOutcome::Accepted { records, attempts } = outcome else {
        panic!("expected acceptance");
    };
    assert_eq!(attempts, 1);
    assert_eq!(records.len(), 100);
    assert_eq!(tally.opened(), 1);
    assert_eq!(tally.closed(), 1);
}

#[tokio::test]
async fn extraction_caps_at_the_acceptance_threshold() {
    let factory = FakeFactory::yields([250]);
    let executor = TaskExecutor::new(factory, fast_config(Some(1), 3));

    let TaskOutcome::Accepted { records, .. } = executor.run(&task()).await else {
        panic!("expected acceptance");
    };
    assert_eq!(records.len(), 100);
    assert_eq!(records[0].hotel_name, "Hotel 0");
    assert_eq!(records[99].hotel_name, "Hotel 99");
}

#[tokio::test]
async fn repeated_short_yield_is_abandoned_as_exhausted() {
    let factory = FakeFactory::new([], 40);
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(Some(10), 3));

    let outcome = executor.run(&task()).await;

    assert!(matches!(
        outcome,
        TaskOutcome::Abandoned(AbandonReason::RecordsExhausted {
            attempts: 3,
            yield_count: 40
        })
    ));
    assert_eq!(tally.opened(), 3);
    assert_eq!(tally.closed(), 3);
}

#[tokio::test]
async fn attempt_budget_bounds_the_retry_loop() {
    let factory = FakeFactory::yields([10, 30, 20, 90]);
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(Some(3), 3));

    let outcome = executor.run(&task()).await;

    match outcome {
        TaskOutcome::Abandoned(AbandonReason::MaxAttemptsReached {
            attempts,
            best_yield,
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(best_yield, 30);
        }
        other => panic!("expected max attempts, got {:?}", other),
    }
    assert_eq!(tally.opened(), 3);
}

#[tokio::test]
async fn failed_launch_counts_as_zero_yield_attempt() {
    let factory = FakeFactory::new([None, None, Some(100)], 0);
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(None, 3));

    let TaskOutcome::Accepted { attempts, .. } = executor.run(&task()).await else {
        panic!("expected acceptance after launch failures");
    };
    assert_eq!(attempts, 3);
    assert_eq!(tally.opened(), 1);
    assert_eq!(tally.closed(), 1);
}

#[tokio::test]
async fn extraction_cap_rises_to_meet_a_lower_threshold() {
    let mut config = fast_config(Some(1), 3);
    config.min_cards_per_task = 50;
    let executor = TaskExecutor::new(FakeFactory::yields([250]), config);

    let TaskOutcome::Accepted { records, .. } = executor.run(&task()).await else {
        panic!("expected acceptance");
    };
    assert_eq!(records.len(), 100);
}

#[tokio::test]
async fn extraction_cap_follows_a_higher_threshold() {
    let mut config = fast_config(Some(1), 3);
    config.min_cards_per_task = 150;
    let executor = TaskExecutor::new(FakeFactory::yields([250]), config);

    let TaskOutcome::Accepted { records, .. } = executor.run(&task()).await else {
        panic!("threshold above 100 must still be reachable");
    };
    assert_eq!(records.len(), 150);
}

#[tokio::test]
async fn calendar_steps_forward_then_clicks_the_date_anyway() {
    init_logger();
    let factory = FakeFactory::always(100).with_page(PageScript {
        calendar_hidden: true,
        ..PageScript::default()
    });
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(Some(1), 3));

    let outcome = executor.run(&task()).await;

    assert!(matches!(outcome, TaskOutcome::Accepted { attempts: 1, .. }));
    // 12 steps per date, two dates
    assert_eq!(tally.clicks_on("button 'Next month'"), 24);
    assert_eq!(tally.clicks_on("checkbox '1 January 2024'"), 1);
    assert_eq!(tally.clicks_on("checkbox '3 January 2024'"), 1);
    assert_eq!(tally.mouse_clicks(), 0);
}

#[test]
fn loader_stops_once_target_is_on_the_page() {
    let site = SiteProfile::default();
    let session = FakeSession::new(120, site.clone());
    let pacing = Pacing::immediate();

    let outcome = tokio_test::block_on(load_hotel_cards(&session, &site, &pacing, 100, 5));

    assert!(outcome.reached_target);
    assert_eq!(outcome.rounds_used, 1);
    assert_eq!(outcome.final_count, 120);
}

#[test]
fn loader_spends_every_round_when_cards_never_grow() {
    let site = SiteProfile::default();
    let session = FakeSession::new(30, site.clone());
    let pacing = Pacing::immediate();

    let outcome = tokio_test::block_on(load_hotel_cards(&session, &site, &pacing, 100, 5));

    assert!(!outcome.reached_target);
    assert_eq!(outcome.rounds_used, 5);
    assert_eq!(outcome.final_count, 30);
}

fn run_loader(session: &FakeSession, site: &SiteProfile) -> hotel_sweep::load_more::LoadOutcome {
    let pacing = Pacing::immediate();
    tokio_test::block_on(load_hotel_cards(session, site, &pacing, 100, 5))
}

#[test]
fn hidden_load_more_without_popup_spends_rounds_without_fallback_clicks() {
    let site = SiteProfile::default();
    let session = FakeSession::scripted(
        30,
        site.clone(),
        PageScript {
            load_more_hidden_checks: u32::MAX,
            ..PageScript::default()
        },
    );

    let outcome = run_loader(&session, &site);

    assert_eq!(outcome.rounds_used, 5);
    assert!(!outcome.reached_target);
    assert_eq!(session.tally().mouse_clicks(), 0);
    assert!(session.tally().clicks().is_empty());
}

#[test]
fn dismissed_popup_reveals_load_more_in_the_same_round() {
    let site = SiteProfile::default();
    let session = FakeSession::scripted(
        120,
        site.clone(),
        PageScript {
            load_more_hidden_checks: 1,
            popup: Popup::Closes,
            ..PageScript::default()
        },
    );

    let outcome = run_loader(&session, &site);

    assert_eq!(outcome.rounds_used, 1);
    assert!(outcome.reached_target);
    let tally = session.tally();
    assert_eq!(
        tally.clicks_on("button 'Close' in dialog 'Sign in, save money'"),
        1
    );
    assert_eq!(tally.mouse_clicks(), 0);
}

#[test]
fn failed_popup_close_falls_back_to_a_coordinate_click() {
    let site = SiteProfile::default();
    let session = FakeSession::scripted(
        30,
        site.clone(),
        PageScript {
            load_more_hidden_checks: u32::MAX,
            popup: Popup::CloseFails,
            ..PageScript::default()
        },
    );

    let outcome = run_loader(&session, &site);

    assert_eq!(outcome.rounds_used, 5);
    assert_eq!(session.tally().mouse_clicks(), 5);
}

#[test]
fn closed_target_skips_the_coordinate_click() {
    let site = SiteProfile::default();
    let session = FakeSession::scripted(
        30,
        site.clone(),
        PageScript {
            load_more_hidden_checks: u32::MAX,
            popup: Popup::TargetClosed,
            ..PageScript::default()
        },
    );

    let outcome = run_loader(&session, &site);

    assert_eq!(outcome.rounds_used, 5);
    assert_eq!(session.tally().mouse_clicks(), 0);
}

#[test]
fn failed_load_more_click_uses_the_fallback_and_consumes_the_round() {
    let site = SiteProfile::default();
    let session = FakeSession::scripted(
        30,
        site.clone(),
        PageScript {
            load_more_click_fails: true,
            ..PageScript::default()
        },
    );

    let outcome = run_loader(&session, &site);

    assert_eq!(outcome.rounds_used, 5);
    assert_eq!(outcome.final_count, 30);
    assert_eq!(session.tally().mouse_clicks(), 5);
}

#[test]
fn cards_growing_per_click_reach_the_target_mid_budget() {
    let site = SiteProfile::default();
    let session = FakeSession::scripted(
        40,
        site.clone(),
        PageScript {
            growth_per_click: 30,
            ..PageScript::default()
        },
    );

    let outcome = run_loader(&session, &site);

    assert_eq!(outcome.rounds_used, 3);
    assert_eq!(outcome.final_count, 100);
    assert!(outcome.reached_target);
    assert_eq!(session.tally().clicks_on("button 'Load more results'"), 2);
}

#[tokio::test]
async fn single_day_sweep_appends_every_accepted_batch() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("booking_com_20240101.csv");
    let sink = CsvSink::new(&path);

    let tasks = generate_tasks(d(2024, 1, 1), d(2024, 1, 1), 2);
    assert_eq!(tasks.len(), 2);

    let factory = FakeFactory::always(100);
    let tally = factory.tally();
    let executor = TaskExecutor::new(factory, fast_config(Some(10), 3));

    let report = dispatch(tasks, 4, &executor, &sink).await;

    assert_eq!(report.accepted, 2);
    assert!(report.abandoned.is_empty());
    assert!(report.sink_failures.is_empty());
    assert_eq!(report.total_records, 200);
    assert_eq!(count_rows(&path).unwrap(), 200);
    assert_eq!(tally.opened(), tally.closed());

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let records: Vec<HotelRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
    let mut checkouts: Vec<&str> = records.iter().map(|r| r.checkout.as_str()).collect();
    checkouts.dedup();
    checkouts.sort();
    assert_eq!(checkouts, vec!["2 January 2024", "3 January 2024"]);
    assert!(records.iter().all(|r| r.checkin == "1 January 2024"));

    let first = &records[0];
    assert_eq!(first.star_rating, Some(4));
    assert_eq!(first.location_score, Some(8.3));
    assert_eq!(first.review_amount, Some(1234));
    assert_eq!(first.price, "$250");
    assert_eq!(first.bed_info, "N/A");
    assert!(first.free_cancellation);
    assert!(!first.breakfast_included);
    assert!(first.centrally_located);
}

#[tokio::test]
async fn abandoned_tasks_are_reported_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let sink = CsvSink::new(&path);

    let tasks = generate_tasks(d(2024, 1, 1), d(2024, 1, 2), 1);
    let executor = TaskExecutor::new(FakeFactory::always(12), fast_config(Some(2), 0));

    let report = dispatch(tasks, 2, &executor, &sink).await;

    assert_eq!(report.accepted, 0);
    assert_eq!(report.total_records, 0);
    assert_eq!(report.abandoned.len(), 2);
    assert!(!path.exists());
}
