//! Batch orchestration and the purger facade

use std::sync::Arc;

use discord_purge::{
    BatchOrchestrator, ChannelObserver, Configuration, HttpOutcome, Job, Phase, Purger, RunEvent,
};

use crate::common::{dm, guild, messages, FakeApi};

fn config() -> Configuration {
    Configuration::builder("token").author_id("u1").build().unwrap()
}

fn orchestrator(api: &Arc<FakeApi>) -> BatchOrchestrator {
    BatchOrchestrator::new(api.clone(), Arc::new(config()))
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_jobs_run_in_order_and_stats_merge() {
    let api = Arc::new(
        FakeApi::new()
            .with_messages("1", messages(100, 3, "10", "u1"))
            .with_messages("2", messages(200, 4, "20", "u1")),
    );

    let report = orchestrator(&api)
        .run(vec![Job::guild("1"), Job::guild("2")])
        .await;

    assert_eq!(report.phase(), Phase::Completed);
    assert_eq!(report.stats().deleted, 7);
    assert_eq!(report.jobs.len(), 2);
    assert_eq!(report.jobs[0].job, Some(Job::guild("1")));
    assert_eq!(report.jobs[1].job_index, 1);

    let searched: Vec<String> = api
        .searches()
        .into_iter()
        .map(|(job, _, _)| job.guild_id)
        .collect();
    let first_two = searched.iter().position(|g| g == "2").unwrap();
    assert!(searched[..first_two].iter().all(|g| g == "1"));
}

#[tokio::test(start_paused = true)]
async fn test_page_events_carry_cumulative_stats() {
    let api = Arc::new(
        FakeApi::new()
            .with_messages("1", messages(100, 2, "10", "u1"))
            .with_messages("2", messages(200, 3, "20", "u1")),
    );
    let (observer, mut rx) = ChannelObserver::new();

    orchestrator(&api)
        .with_observer(Arc::new(observer))
        .run(vec![Job::guild("1"), Job::guild("2")])
        .await;

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(RunEvent::Started(s)) if s.job.is_none()));
    assert!(matches!(events.last(), Some(RunEvent::Stopped(s, stats)) if s.job.is_none() && stats.deleted == 5));

    let page_totals: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Page(_, stats) => Some(stats.deleted),
            _ => None,
        })
        .collect();
    assert_eq!(page_totals, vec![2, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_batch_still_reports() {
    let api = Arc::new(FakeApi::new());
    let (observer, mut rx) = ChannelObserver::new();

    let report = orchestrator(&api)
        .with_observer(Arc::new(observer))
        .run(Vec::new())
        .await;

    assert_eq!(report.phase(), Phase::Completed);
    assert_eq!(report.stats().processed(), 0);
    assert!(api.calls().is_empty());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], RunEvent::Started(_)));
    assert!(matches!(events[1], RunEvent::Stopped(_, stats) if stats.deleted == 0));
}

#[tokio::test(start_paused = true)]
async fn test_stop_skips_remaining_jobs() {
    let api = Arc::new(
        FakeApi::new()
            .with_messages("1", messages(100, 5, "10", "u1"))
            .with_messages("2", messages(200, 5, "20", "u1")),
    );
    let batch = orchestrator(&api);
    api.stop_after_deletes(2, batch.stop_handle());

    let report = batch.run(vec![Job::guild("1"), Job::guild("2")]).await;

    assert_eq!(report.phase(), Phase::Aborted);
    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].phase, Phase::Aborted);
    assert_eq!(report.stats().deleted, 2);
    assert!(api.searches().iter().all(|(job, _, _)| job.guild_id == "1"));
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_aborts_batch() {
    let api = Arc::new(FakeApi::new().script_search(HttpOutcome::ClientError {
        status: 401,
        code: Some(0),
        message: "401: Unauthorized".into(),
    }));

    let report = orchestrator(&api)
        .run(vec![Job::guild("1"), Job::guild("2")])
        .await;

    assert_eq!(report.phase(), Phase::Failed);
    assert!(report.state.failed_on_auth());
    assert_eq!(report.jobs.len(), 1);
    assert_eq!(api.searches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_job_failures_do_not_stop_batch() {
    let api = Arc::new(
        FakeApi::new()
            .with_messages("2", messages(200, 2, "20", "u1"))
            .script_search(HttpOutcome::ClientError {
                status: 403,
                code: Some(50001),
                message: "Missing Access".into(),
            }),
    );

    let report = orchestrator(&api)
        .run(vec![Job::guild("1"), Job::guild("2")])
        .await;

    assert_eq!(report.phase(), Phase::Completed);
    assert_eq!(report.jobs.len(), 2);
    assert_eq!(report.jobs[0].phase, Phase::Failed);
    assert_eq!(report.stats().deleted, 2);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, &Job::guild("1"));
}

#[tokio::test(start_paused = true)]
async fn test_purger_resolves_and_runs_everything() {
    let api = Arc::new(
        FakeApi::new()
            .with_guilds(vec![guild("1", false), guild("2", true)])
            .with_dms(vec![dm("50")])
            .with_messages("1", messages(100, 2, "10", "u1"))
            .with_messages("@me", messages(500, 3, "50", "u1")),
    );

    let purger = Purger::with_api(api.clone(), config());
    let report = purger.run().await.unwrap();

    assert_eq!(report.phase(), Phase::Completed);
    assert_eq!(report.jobs.len(), 2);
    assert_eq!(report.stats().deleted, 5);
    assert!(api.remaining().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_purger_single_job_path() {
    let api = Arc::new(FakeApi::new().with_messages("9", messages(100, 4, "90", "u1")));
    let config = Configuration::builder("token")
        .guild_id("9")
        .channel_id("90")
        .author_id("u1")
        .build()
        .unwrap();

    let report = Purger::with_api(api.clone(), config).run().await.unwrap();

    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.state.job, Some(Job::channel("9", "90")));
    assert_eq!(report.stats().deleted, 4);
}

#[tokio::test(start_paused = true)]
async fn test_purger_routes_resolved_jobs() {
    let api = Arc::new(
        FakeApi::new()
            .with_messages("1", messages(100, 2, "10", "u1"))
            .with_messages("2", messages(200, 3, "20", "u1")),
    );
    let purger = Purger::with_api(api.clone(), config());

    let single = purger.run_jobs(vec![Job::guild("1")]).await;
    assert_eq!(single.jobs.len(), 1);
    assert_eq!(single.state.job, Some(Job::guild("1")));
    assert_eq!(single.stats().deleted, 2);

    let batch = purger.run_jobs(vec![Job::guild("2"), Job::guild("3")]).await;
    assert_eq!(batch.jobs.len(), 2);
    assert!(batch.state.job.is_none());
    assert_eq!(batch.stats().deleted, 3);
}
