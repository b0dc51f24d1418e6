//! Integration tests for the job runtime.
//!
//! This test suite validates:
//! - Status transitions only move forward and progress never decreases
//! - Subscribing before submission yields exactly one terminal event
//! - Cancellation of completed, queued, and processing jobs
//! - Partial batch failure produces per-item errors, not a failed batch
//! - Retention sweeping and single-result consumption
//! - Independent delivery to concurrent subscribers
//! - Failure isolation: one bad job never stops the pool
//! - Disabled workers leave submissions queued

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use resmatch_core::{
    ArtifactRef, ArtifactStore, Error, JobId, JobProfile, JobResult, JobStatus, MatchResult,
    MatchingEngine, Result, ResumeDocument,
};
use resmatch_engine::KeywordMatchingEngine;
use resmatch_jobs::{
    job_queue, JobService, JobStore, MemoryArtifactStore, ProgressBroadcaster, StreamConfig,
    StreamEvent, Subscription, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle,
};
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// HELPERS
// ============================================================================

/// Engine that panics while scoring any resume mentioning "boom".
struct PanickyEngine {
    inner: KeywordMatchingEngine,
}

impl MatchingEngine for PanickyEngine {
    fn analyze(&self, job_description: &str) -> Result<JobProfile> {
        self.inner.analyze(job_description)
    }

    fn score(&self, resume: &ResumeDocument, profile: &JobProfile) -> Result<MatchResult> {
        if resume.text.contains("boom") {
            panic!("scoring exploded");
        }
        self.inner.score(resume, profile)
    }
}

/// Engine whose `score` blocks until the gate is opened.
struct GatedEngine {
    inner: KeywordMatchingEngine,
    open: Mutex<bool>,
    opened: Condvar,
    entered: Notify,
}

impl GatedEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: KeywordMatchingEngine::default(),
            open: Mutex::new(false),
            opened: Condvar::new(),
            entered: Notify::new(),
        })
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl MatchingEngine for GatedEngine {
    fn analyze(&self, job_description: &str) -> Result<JobProfile> {
        self.inner.analyze(job_description)
    }

    fn score(&self, resume: &ResumeDocument, profile: &JobProfile) -> Result<MatchResult> {
        self.entered.notify_one();
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        self.inner.score(resume, profile)
    }
}

struct Harness {
    service: JobService,
    artifacts: Arc<MemoryArtifactStore>,
    pending: Option<WorkerBuilder>,
    handle: Option<WorkerHandle>,
}

impl Harness {
    fn new(engine: Arc<dyn MatchingEngine>) -> Self {
        Self::with_config(engine, WorkerConfig::default())
    }

    fn with_config(engine: Arc<dyn MatchingEngine>, config: WorkerConfig) -> Self {
        // Forward every snapshot so tests observe the full sequence.
        let stream = StreamConfig::default()
            .with_min_progress_delta(0)
            .with_min_interval(Duration::ZERO);
        let broadcaster = Arc::new(ProgressBroadcaster::new(stream));
        let store = Arc::new(JobStore::new(broadcaster));
        let (queue, receiver) = job_queue();
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let shared: Arc<dyn ArtifactStore> = artifacts.clone();

        let builder = WorkerBuilder::new(store.clone(), receiver, engine, shared.clone())
            .with_config(config);
        Self {
            service: JobService::new(store, queue, shared),
            artifacts,
            pending: Some(builder),
            handle: None,
        }
    }

    fn start(&mut self) -> &WorkerHandle {
        if let Some(builder) = self.pending.take() {
            self.handle = Some(builder.build().start());
        }
        self.handle.as_ref().unwrap()
    }

    async fn resume(&self, name: &str, text: &str) -> ArtifactRef {
        self.artifacts.put(name, text.as_bytes()).await.unwrap()
    }

    async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
            handle.join().await.unwrap();
        }
    }
}

/// Collect every event for a job until its stream ends.
async fn collect_events(service: &JobService, id: JobId) -> Vec<StreamEvent> {
    drain(service.subscribe(id).unwrap()).await
}

async fn drain(mut sub: Subscription) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    timeout(WAIT, async {
        while let Some(event) = sub.next().await {
            events.push(event);
        }
    })
    .await
    .expect("stream did not finish in time");
    events
}

async fn wait_for_event<F>(handle: &WorkerHandle, mut matches: F) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    let mut events = handle.events();
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("worker event not observed in time")
}

fn statuses(events: &[StreamEvent]) -> Vec<(JobStatus, u8)> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Progress(s) => Some((s.status, s.progress)),
            StreamEvent::Heartbeat => None,
        })
        .collect()
}

const JD: &str = "Backend engineer with Rust, PostgreSQL, Docker and Kubernetes experience.";

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_subscribe_before_processing_yields_one_terminal_event() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    let resume = h.resume("jane.txt", "Rust and Docker on Kubernetes").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();

    // Workers are not running yet, so the job is still queued.
    let sub = h.service.subscribe(id).unwrap();
    h.start();

    let events = drain(sub).await;
    let seen = statuses(&events);

    let terminal: Vec<_> = seen.iter().filter(|(s, _)| s.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(seen.last().unwrap().0, JobStatus::Completed);
    assert_eq!(seen.last().unwrap().1, 100);

    for pair in seen.windows(2) {
        let (from, p_from) = pair[0];
        let (to, p_to) = pair[1];
        assert!(
            from == to || from.can_transition_to(to),
            "illegal transition {} -> {}",
            from,
            to
        );
        if from == JobStatus::Processing && to == JobStatus::Processing {
            assert!(p_to >= p_from, "progress went backwards: {} -> {}", p_from, p_to);
        }
    }

    match events.last().unwrap() {
        StreamEvent::Progress(s) => {
            assert_eq!(s.redirect_url, Some(format!("/results?id={}", id)));
            assert!(s.result_url.is_some());
        }
        other => panic!("unexpected final event {:?}", other),
    }

    match h.service.get_result(id).unwrap() {
        JobResult::Single { result } => {
            assert_eq!(result.resume_name, "jane.txt");
            assert!(result.matching_skills.contains(&"Rust".to_string()));
        }
        other => panic!("expected single result, got {:?}", other),
    }
    assert!(h.artifacts.is_empty(), "artifacts must be released");
    h.shutdown().await;
}

#[tokio::test]
async fn test_cancel_completed_job_is_already_terminal() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    h.start();
    let resume = h.resume("cv.txt", "Rust").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    collect_events(&h.service, id).await;

    let err = h.service.cancel(id).unwrap_err();
    assert!(matches!(
        err,
        Error::AlreadyTerminal {
            status: JobStatus::Completed,
            ..
        }
    ));
    assert_eq!(h.service.get_status(id).unwrap().status, JobStatus::Completed);
    h.shutdown().await;
}

#[tokio::test]
async fn test_cancel_queued_job_is_skipped_by_worker() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    let resume = h.resume("cv.txt", "Rust").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();

    let job = h.service.cancel(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 100);

    let handle = h.start();
    wait_for_event(handle, |e| matches!(e, WorkerEvent::JobCancelled { job_id } if *job_id == id))
        .await;
    assert_eq!(h.service.get_status(id).unwrap().status, JobStatus::Cancelled);
    assert!(matches!(
        h.service.get_result(id),
        Err(Error::NoResult { .. })
    ));
    assert!(h.artifacts.is_empty());
    h.shutdown().await;
}

#[tokio::test]
async fn test_cancel_processing_job_stops_at_next_boundary() {
    let engine = GatedEngine::new();
    let mut h = Harness::new(engine.clone());
    let resume = h.resume("cv.txt", "Rust and Docker").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    let sub = h.service.subscribe(id).unwrap();
    let mut events_rx = h.start().events();

    // Wait until the worker is inside the scoring stage.
    timeout(WAIT, engine.entered.notified()).await.unwrap();
    assert_eq!(h.service.get_status(id).unwrap().status, JobStatus::Processing);

    let job = h.service.cancel(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    engine.open();

    timeout(WAIT, async {
        loop {
            if let Ok(WorkerEvent::JobCancelled { job_id }) = events_rx.recv().await {
                if job_id == id {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();

    let seen = statuses(&drain(sub).await);
    let cancel_at = seen
        .iter()
        .position(|(s, _)| *s == JobStatus::Cancelled)
        .expect("cancelled event delivered");
    assert_eq!(cancel_at, seen.len() - 1, "nothing follows the terminal event");
    assert!(seen[..cancel_at]
        .iter()
        .all(|(s, _)| !s.is_terminal()));

    let job = h.service.get_status(id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.message, "Job cancelled by user");
    assert!(h.artifacts.is_empty());
    h.shutdown().await;
}

// ============================================================================
// BATCH
// ============================================================================

#[tokio::test]
async fn test_batch_with_one_unreadable_item_still_completes() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    h.start();

    let mut resumes = vec![
        h.resume("alice.txt", "Rust, PostgreSQL, Docker and Kubernetes backend engineer").await,
        h.resume("bob.md", "Rust developer").await,
        h.resume("carol.txt", "Docker and Kubernetes operator").await,
        h.resume("dave.txt", "Graphic designer").await,
    ];
    let broken = h.artifacts.put("broken.txt", &[0xff, 0xfe, 0xfd]).await.unwrap();
    resumes.insert(2, broken);

    let id = h.service.submit_batch(resumes, JD).await.unwrap();
    let events = collect_events(&h.service, id).await;
    assert_eq!(statuses(&events).last().unwrap().0, JobStatus::Completed);

    let results = match h.service.get_result(id).unwrap() {
        JobResult::Batch { results } => results,
        other => panic!("expected batch result, got {:?}", other),
    };
    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|r| r.error.is_none()).count(), 4);

    let last = results.last().unwrap();
    assert_eq!(last.resume_name, "broken.txt");
    assert!(last.error.is_some());
    assert_eq!(last.overall_score, 0.0);

    assert_eq!(results[0].resume_name, "alice.txt");
    let ranks: Vec<u32> = results.iter().map(|r| r.rank.unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    for pair in results[..4].windows(2) {
        assert!(pair[0].overall_score >= pair[1].overall_score);
    }

    let job = h.service.get_status(id).unwrap();
    assert_eq!(job.redirect_url, Some(format!("/batch-results?id={}", id)));
    h.shutdown().await;
}

#[tokio::test]
async fn test_batch_item_that_panics_while_scoring_is_an_item_error() {
    let mut h = Harness::new(Arc::new(PanickyEngine {
        inner: KeywordMatchingEngine::default(),
    }));
    h.start();

    let resumes = vec![
        h.resume("alice.txt", "Rust, PostgreSQL, Docker and Kubernetes").await,
        h.resume("boom.txt", "Rust boom").await,
        h.resume("carol.txt", "Docker and Kubernetes operator").await,
    ];
    let id = h.service.submit_batch(resumes, JD).await.unwrap();
    let events = collect_events(&h.service, id).await;
    assert_eq!(statuses(&events).last().unwrap().0, JobStatus::Completed);

    let results = match h.service.get_result(id).unwrap() {
        JobResult::Batch { results } => results,
        other => panic!("expected batch result, got {:?}", other),
    };
    assert_eq!(results.len(), 3);
    let last = results.last().unwrap();
    assert!(last.error.is_some());
    assert_eq!(last.overall_score, 0.0);
    assert_eq!(last.rank, Some(3));
    assert_eq!(results.iter().filter(|r| r.error.is_none()).count(), 2);
    h.shutdown().await;
}

#[tokio::test]
async fn test_single_job_that_panics_while_scoring_fails() {
    let mut h = Harness::new(Arc::new(PanickyEngine {
        inner: KeywordMatchingEngine::default(),
    }));
    h.start();

    let resume = h.resume("boom.txt", "Rust boom").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    collect_events(&h.service, id).await;

    let job = h.service.get_status(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.message.starts_with("Failed to score resume"));

    // The worker survives and serves the next job.
    let resume = h.resume("alice.txt", "Rust and Docker").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    collect_events(&h.service, id).await;
    assert_eq!(h.service.get_status(id).unwrap().status, JobStatus::Completed);
    h.shutdown().await;
}

#[tokio::test]
async fn test_batch_with_no_readable_items_fails() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    h.start();
    let a = h.artifacts.put("a.txt", &[0xff]).await.unwrap();
    let b = h.artifacts.put("b.txt", &[0xfe]).await.unwrap();

    let id = h.service.submit_batch(vec![a, b], JD).await.unwrap();
    collect_events(&h.service, id).await;

    let job = h.service.get_status(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.message, "No valid files to process");
    assert!(h.artifacts.is_empty());
    h.shutdown().await;
}

// ============================================================================
// FAILURE ISOLATION
// ============================================================================

#[tokio::test]
async fn test_failed_job_does_not_stop_the_pool() {
    let mut h = Harness::with_config(
        Arc::new(KeywordMatchingEngine::default()),
        WorkerConfig::default().with_worker_count(1),
    );
    h.start();

    let bad = h.artifacts.put("bad.txt", &[0xff, 0x00]).await.unwrap();
    let bad_id = h.service.submit_single(bad, JD).await.unwrap();
    let good = h.resume("good.txt", "Rust and Docker").await;
    let good_id = h.service.submit_single(good, JD).await.unwrap();

    collect_events(&h.service, bad_id).await;
    collect_events(&h.service, good_id).await;

    let bad_job = h.service.get_status(bad_id).unwrap();
    assert_eq!(bad_job.status, JobStatus::Error);
    assert!(bad_job.message.contains("bad.txt"));
    assert!(bad_job.progress < 100);
    assert_eq!(
        h.service.get_status(good_id).unwrap().status,
        JobStatus::Completed
    );
    h.shutdown().await;
}

#[tokio::test]
async fn test_job_timeout_marks_job_as_error() {
    let engine = GatedEngine::new();
    let mut h = Harness::with_config(
        engine.clone(),
        WorkerConfig::default().with_job_timeout_secs(1),
    );
    let resume = h.resume("slow.txt", "Rust").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    let handle = h.start();

    let event = wait_for_event(handle, |e| matches!(e, WorkerEvent::JobFailed { job_id, .. } if *job_id == id)).await;
    engine.open();

    match event {
        WorkerEvent::JobFailed { error, .. } => assert!(error.contains("timeout")),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.service.get_status(id).unwrap().status, JobStatus::Error);
    h.shutdown().await;
}

// ============================================================================
// RETENTION AND CONSUMPTION
// ============================================================================

#[tokio::test]
async fn test_result_is_gone_after_retention_window() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    h.start();
    let resume = h.resume("cv.txt", "Rust").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    collect_events(&h.service, id).await;
    assert!(h.service.get_result(id).is_ok());

    let purged = h.service.store().sweep(Duration::ZERO);
    assert_eq!(purged, 1);
    assert!(matches!(h.service.get_result(id), Err(Error::JobNotFound(_))));
    assert!(matches!(h.service.get_status(id), Err(Error::JobNotFound(_))));
    h.shutdown().await;
}

#[tokio::test]
async fn test_consume_result_removes_job() {
    let mut h = Harness::new(Arc::new(KeywordMatchingEngine::default()));
    h.start();
    let resume = h.resume("cv.txt", "Rust").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    collect_events(&h.service, id).await;

    assert!(h.service.consume_result(id).is_ok());
    assert!(matches!(
        h.service.consume_result(id),
        Err(Error::JobNotFound(_))
    ));
    h.shutdown().await;
}

// ============================================================================
// FAN-OUT
// ============================================================================

#[tokio::test]
async fn test_two_subscribers_each_receive_terminal_event() {
    let engine = GatedEngine::new();
    let mut h = Harness::new(engine.clone());
    let resume = h.resume("cv.txt", "Rust and Docker").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();

    let mut first = h.service.subscribe(id).unwrap();
    let mut second = h.service.subscribe(id).unwrap();
    h.start();

    timeout(WAIT, engine.entered.notified()).await.unwrap();
    first.next().await.unwrap();
    drop(first);
    engine.open();

    let mut last = None;
    timeout(WAIT, async {
        while let Some(event) = second.next().await {
            last = Some(event);
        }
    })
    .await
    .unwrap();
    match last {
        Some(StreamEvent::Progress(s)) => assert_eq!(s.status, JobStatus::Completed),
        other => panic!("second subscriber missed the terminal event: {:?}", other),
    }
    h.shutdown().await;
}

#[tokio::test]
async fn test_stats_and_disabled_workers() {
    let mut h = Harness::with_config(
        Arc::new(KeywordMatchingEngine::default()),
        WorkerConfig::default().with_enabled(false),
    );
    let handle = h.start();
    assert_eq!(handle.worker_count(), 0);
    assert!(handle.is_parked());

    let resume = h.resume("cv.txt", "Rust").await;
    let id = h.service.submit_single(resume, JD).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.service.get_status(id).unwrap().status, JobStatus::Queued);
    let stats = h.service.stats();
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.total, 1);
    assert_eq!(h.service.queue_depth(), 1);
    h.shutdown().await;
}
