//! Concurrent access tests for opened journals.
//!
//! Once `open()` returns, any number of threads may share a journal and
//! resolve segments or read records without further coordination.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use zdb_journal::{Segment, SegmentedJournal, SegmentsManager};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations whose answer matched the journal layout.
    pub successful_ops: usize,
    /// Operations that failed or returned a wrong answer.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform across all threads.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
        }
    }
}

/// Resolves segments from many threads at once.
///
/// Every thread runs `get_segment`, `get_next_segment` and
/// `get_current_segment` over indexes spanning the whole journal plus one
/// past its end, and checks each answer against the loaded layout.
pub fn stress_concurrent_lookups(
    journal: Arc<SegmentedJournal>,
    config: &StressConfig,
) -> StressTestResult {
    run_threads(journal, config, |journal, index| {
        check_lookup(journal.manager(), index)
    })
}

/// Seeks and reads one record from many threads at once.
///
/// Every thread owns its reader; only the journal is shared.
pub fn stress_concurrent_reads(
    journal: Arc<SegmentedJournal>,
    config: &StressConfig,
) -> StressTestResult {
    run_threads(journal, config, |journal, index| {
        if index > journal.last_index() {
            return true;
        }
        let mut reader = journal.reader();
        match reader.seek(index) {
            Ok(next) if next == index => {}
            _ => return false,
        }
        matches!(reader.next(), Some(Ok(record)) if record.index == index)
    })
}

fn run_threads<F>(journal: Arc<SegmentedJournal>, config: &StressConfig, op: F) -> StressTestResult
where
    F: Fn(&SegmentedJournal, u64) -> bool + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;

    let first = journal.first_index();
    let span = journal.last_index() + 2 - first;

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let journal = Arc::clone(&journal);
            let op = Arc::clone(&op);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let offset = ((t * ops_per_thread + i) as u64 * 7) % span;
                    if op(&journal, first + offset) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

fn check_lookup(manager: &SegmentsManager, index: u64) -> bool {
    let (Some(segment), Some(current)) = (manager.get_segment(index), manager.get_current_segment())
    else {
        return false;
    };

    let is_current = Arc::ptr_eq(&segment, &current);
    if segment.index() > index || (index > segment.last_index() && !is_current) {
        return false;
    }

    match manager.get_next_segment(segment.index()) {
        None => is_current,
        Some(next) => !is_current && follows(&segment, &next),
    }
}

fn follows(segment: &Segment, next: &Segment) -> bool {
    next.index() == segment.last_index() + 1
}
