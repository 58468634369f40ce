//! Tests for the bounded streaming dispatcher.
//!
//! Latency-sensitive tests run on tokio's paused clock, so simulated call
//! durations are deterministic and cost no wall time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::Instant;

use sluice::{
    CallResult, Dispatch, DispatchState, Invoker, SluiceError, TransportError, WorkerPool,
    dispatch, invoker_fn,
};

// ============================================================================
// Helpers
// ============================================================================

/// A simulated request: a label, how long the call takes, and whether it fails.
#[derive(Debug, Clone, PartialEq)]
struct Job {
    label: char,
    latency_ms: u64,
    fail: bool,
}

fn job(label: char, latency_ms: u64) -> Job {
    Job {
        label,
        latency_ms,
        fail: false,
    }
}

fn failing(label: char, latency_ms: u64) -> Job {
    Job {
        label,
        latency_ms,
        fail: true,
    }
}

/// Counters shared between a test and its invoker.
#[derive(Clone, Default)]
struct Probe {
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Probe {
    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Invoker that sleeps for the job's latency and echoes its label.
fn sleepy(probe: &Probe) -> Arc<impl Invoker<Request = Job, Response = char>> {
    let probe = probe.clone();
    Arc::new(invoker_fn("sleepy", move |job: Job| {
        let probe = probe.clone();
        async move {
            probe.started.fetch_add(1, Ordering::SeqCst);
            let now = probe.running.fetch_add(1, Ordering::SeqCst) + 1;
            probe.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(job.latency_ms)).await;

            probe.running.fetch_sub(1, Ordering::SeqCst);
            probe.finished.fetch_add(1, Ordering::SeqCst);
            if job.fail {
                Err(TransportError::Status {
                    status: 500,
                    message: format!("{} failed", job.label),
                })
            } else {
                Ok(job.label)
            }
        }
    }))
}

/// Invoker whose calls never complete.
fn stuck() -> Arc<impl Invoker<Request = u32, Response = u32>> {
    Arc::new(invoker_fn("stuck", |_: u32| async {
        std::future::pending::<CallResult<u32>>().await
    }))
}

/// Poll a stream exactly once.
async fn poll_once<S: Stream + Unpin>(stream: &mut S) -> Poll<Option<S::Item>> {
    std::future::poll_fn(|cx| Poll::Ready(stream.poll_next_unpin(cx))).await
}

fn labels(jobs: &str) -> Vec<Job> {
    jobs.chars().map(|c| job(c, 10)).collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn yields_in_submission_order_not_completion_order() {
    let probe = Probe::default();
    let inputs = vec![job('A', 300), job('B', 100), job('C', 100), job('D', 0)];
    let start = Instant::now();

    let mut stream = dispatch(inputs, sleepy(&probe), 2, None).unwrap();

    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        let completed = item.unwrap();
        seen.push((completed.result.unwrap(), start.elapsed()));
    }

    let order: Vec<char> = seen.iter().map(|(label, _)| *label).collect();
    assert_eq!(order, vec!['A', 'B', 'C', 'D']);

    // B finished at 100ms but is held back until A is yielded at 300ms
    let (_, b_at) = seen[1];
    assert!(b_at >= Duration::from_millis(300), "B yielded at {b_at:?}");
    assert_eq!(stream.state(), DispatchState::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn completed_items_carry_index_and_request() {
    let probe = Probe::default();
    let inputs = labels("xyz");

    let stream = dispatch(inputs.clone(), sleepy(&probe), 2, None).unwrap();
    let completed: Vec<_> = stream.map(|item| item.unwrap()).collect().await;

    for (i, done) in completed.iter().enumerate() {
        assert_eq!(done.index, i as u64);
        assert_eq!(done.request, inputs[i]);
        assert_eq!(done.elapsed, Duration::from_millis(10));
    }
}

#[tokio::test(start_paused = true)]
async fn rerunning_same_inputs_is_idempotent() {
    let inputs: Vec<Job> = "abcdefghij"
        .chars()
        .enumerate()
        .map(|(i, c)| job(c, ((i * 37) % 50) as u64))
        .collect();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let probe = Probe::default();
        let stream = dispatch(inputs.clone(), sleepy(&probe), 3, None).unwrap();
        let out: Vec<char> = stream.map(|item| item.unwrap().result.unwrap()).collect().await;
        runs.push(out);
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], "abcdefghij".chars().collect::<Vec<_>>());
}

// ============================================================================
// Window bounds
// ============================================================================

#[tokio::test(start_paused = true)]
async fn nothing_is_submitted_before_first_poll() {
    let probe = Probe::default();
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let inputs = labels("abcd")
        .into_iter()
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let stream = dispatch(inputs, sleepy(&probe), 2, None).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(pulled.load(Ordering::SeqCst), 0);
    assert_eq!(probe.started(), 0);
    assert_eq!(stream.state(), DispatchState::Filling);
    assert_eq!(stream.submitted(), 0);
}

#[tokio::test]
async fn fills_exactly_capacity_before_first_result() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let inputs = (0..10u32).inspect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut stream = dispatch(inputs, stuck(), 3, None).unwrap();
    tokio_test::assert_pending!(poll_once(&mut stream).await);

    assert_eq!(pulled.load(Ordering::SeqCst), 3);
    assert_eq!(stream.submitted(), 3);
    assert_eq!(stream.in_flight(), 3);
    assert_eq!(stream.state(), DispatchState::Draining);

    // Polling again while the head is still pending submits nothing new
    tokio_test::assert_pending!(poll_once(&mut stream).await);
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fills_only_available_inputs_when_fewer_than_capacity() {
    let mut stream = dispatch(0..2u32, stuck(), 5, None).unwrap();
    tokio_test::assert_pending!(poll_once(&mut stream).await);

    assert_eq!(stream.submitted(), 2);
    assert_eq!(stream.in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn in_flight_never_exceeds_capacity() {
    let probe = Probe::default();
    let inputs: Vec<Job> = (0..20u8)
        .map(|i| job((b'a' + i) as char, u64::from((i % 5) * 20 + 5)))
        .collect();

    let mut stream = dispatch(inputs, sleepy(&probe), 4, None).unwrap();
    let mut count = 0;
    while let Some(item) = stream.next().await {
        item.unwrap();
        assert!(stream.in_flight() <= 4);
        assert!(stream.submitted() - count <= 4 + 1);
        count += 1;
    }

    assert_eq!(count, 20);
    assert_eq!(probe.peak(), 4);
    assert_eq!(probe.finished(), 20);
}

#[tokio::test(start_paused = true)]
async fn window_may_exceed_worker_count() {
    let probe = Probe::default();
    let pool = WorkerPool::new(sleepy(&probe), 2).unwrap();
    let mut stream = Dispatch::new(labels("abcdefgh"), pool, 5, None).unwrap();

    tokio_test::assert_pending!(poll_once(&mut stream).await);
    assert_eq!(stream.in_flight(), 5);

    let out: Vec<char> = stream.map(|item| item.unwrap().result.unwrap()).collect().await;
    assert_eq!(out, "abcdefgh".chars().collect::<Vec<_>>());
    assert_eq!(probe.peak(), 2);
}

#[tokio::test]
async fn empty_input_is_exhausted_immediately() {
    let probe = Probe::default();
    let mut stream = dispatch(Vec::<Job>::new(), sleepy(&probe), 3, None).unwrap();

    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), DispatchState::Exhausted);
    assert_eq!(stream.submitted(), 0);
    assert!(stream.next().await.is_none());
}

#[test]
fn zero_capacity_is_rejected() {
    let probe = Probe::default();
    let result = dispatch(labels("a"), sleepy(&probe), 0, None);
    assert!(matches!(result, Err(SluiceError::Configuration(_))));
}

// ============================================================================
// Transport errors and faults
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transport_errors_are_yielded_as_values() {
    let probe = Probe::default();
    let inputs = vec![job('a', 10), failing('b', 5), job('c', 1)];

    let stream = dispatch(inputs, sleepy(&probe), 3, None).unwrap();
    let results: Vec<_> = stream.map(|item| item.unwrap().result).collect().await;

    assert_eq!(results[0], Ok('a'));
    assert!(matches!(
        results[1],
        Err(TransportError::Status { status: 500, .. })
    ));
    assert_eq!(results[2], Ok('c'));
}

#[tokio::test]
async fn invoker_panic_is_fatal() {
    let invoker = Arc::new(invoker_fn("panicky", |n: u32| async move {
        if n == 2 {
            panic!("boom at {n}");
        }
        CallResult::Ok(n)
    }));

    let mut stream = dispatch(0..10u32, invoker, 2, None).unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok(0));
    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok(1));

    match stream.next().await {
        Some(Err(SluiceError::InvokerPanicked { index, message })) => {
            assert_eq!(index, 2);
            assert!(message.contains("boom at 2"), "message: {message}");
        }
        other => panic!("expected panic error, got {other:?}"),
    }

    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), DispatchState::Cancelled);
    assert_eq!(stream.in_flight(), 0);
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn deadline_exceeded_propagates_and_ends_stream() {
    let probe = Probe::default();
    let start = Instant::now();
    let mut stream = dispatch(
        vec![job('a', 10_000), job('b', 10)],
        sleepy(&probe),
        2,
        Some(Duration::from_secs(1)),
    )
    .unwrap();

    match stream.next().await {
        Some(Err(SluiceError::DeadlineExceeded { budget })) => {
            assert_eq!(budget, Duration::from_secs(1));
        }
        other => panic!("expected deadline error, got {other:?}"),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(1));

    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), DispatchState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn deadline_budget_is_shared_across_waits() {
    let probe = Probe::default();
    let inputs = vec![job('a', 400), job('b', 400), job('c', 400)];
    let mut stream = dispatch(inputs, sleepy(&probe), 1, Some(Duration::from_secs(1))).unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok('a'));
    assert_eq!(stream.remaining(), Some(Duration::from_millis(600)));
    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok('b'));

    // 'c' would finish at 1200ms, past the 1s budget
    assert!(matches!(
        stream.next().await,
        Some(Err(SluiceError::DeadlineExceeded { .. }))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn no_deadline_waits_as_long_as_needed() {
    let probe = Probe::default();
    let mut stream = dispatch(vec![job('z', 3_600_000)], sleepy(&probe), 1, None).unwrap();

    assert_eq!(stream.remaining(), None);
    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok('z'));
}

#[tokio::test(start_paused = true)]
async fn huge_deadline_behaves_as_unbounded() {
    let probe = Probe::default();
    let mut stream =
        dispatch(labels("abc"), sleepy(&probe), 2, Some(Duration::MAX)).unwrap();

    assert_eq!(stream.remaining(), None);
    let yielded: Vec<char> = stream
        .by_ref()
        .map(|item| item.unwrap().result.unwrap())
        .collect()
        .await;
    assert_eq!(yielded, vec!['a', 'b', 'c']);
    assert_eq!(stream.state(), DispatchState::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn size_hint_lower_bound_allows_early_failure() {
    let probe = Probe::default();
    let inputs: Vec<Job> = (0..100u8).map(|_| job('x', 10_000)).collect();
    let mut stream = dispatch(inputs, sleepy(&probe), 2, Some(Duration::from_secs(1))).unwrap();

    assert_eq!(stream.size_hint(), (0, Some(100)));
    assert!(matches!(poll_once(&mut stream).await, Poll::Pending));
    assert_eq!(stream.size_hint(), (0, Some(100)));

    // Only one fatal item follows, whatever the inputs promised
    assert!(matches!(
        stream.next().await,
        Some(Err(SluiceError::DeadlineExceeded { .. }))
    ));
    assert_eq!(stream.size_hint(), (0, Some(0)));
    assert!(stream.next().await.is_none());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn close_cancels_window_and_stops_submitting() {
    let probe = Probe::default();
    let pool = WorkerPool::new(sleepy(&probe), 1).unwrap();
    let inputs: Vec<Job> = (0..10u8).map(|i| job((b'a' + i) as char, 100)).collect();
    let mut stream = Dispatch::new(inputs, pool, 4, None).unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok('a'));
    assert_eq!(stream.next().await.unwrap().unwrap().result, Ok('b'));
    let submitted = stream.submitted();
    assert_eq!(submitted, 5);

    stream.close();
    assert_eq!(stream.state(), DispatchState::Cancelled);
    assert_eq!(stream.in_flight(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;

    // At most the call that had just taken the worker got started; none finished
    assert!(probe.started() <= 3, "started {}", probe.started());
    assert_eq!(probe.finished(), 2);
    assert!(stream.next().await.is_none());
    assert_eq!(stream.submitted(), submitted);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_cancels_pending_calls() {
    let probe = Probe::default();
    let pool = WorkerPool::new(sleepy(&probe), 2).unwrap();
    let inputs: Vec<Job> = (0..50u8).map(|i| job((b'a' + (i % 26)) as char, 100)).collect();
    let mut stream = Dispatch::new(inputs, pool, 6, None).unwrap();

    let _ = stream.next().await;
    drop(stream);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(probe.started() <= 4, "started {}", probe.started());
    assert!(probe.finished() <= 2, "finished {}", probe.finished());
}

#[tokio::test(start_paused = true)]
async fn close_after_exhaustion_is_a_no_op() {
    let probe = Probe::default();
    let mut stream = dispatch(labels("ab"), sleepy(&probe), 2, None).unwrap();
    while stream.next().await.is_some() {}

    stream.close();
    assert_eq!(stream.state(), DispatchState::Exhausted);
}
