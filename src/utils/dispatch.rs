/// Work distribution: splits sample lists into balanced partitions and
/// supervises one worker per partition.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use log::{error, info};
use tokio::time::{sleep, Duration};

use crate::config::defs::PipelineError;
use crate::utils::report::Reporter;

/// Splits `items` into exactly `split_size` contiguous partitions.
///
/// Boundary `i` sits at `floor(len * i / n)`, so sizes differ by at
/// most one with the remainder pushed toward later partitions, and the
/// concatenation of all partitions is the input sequence unchanged.
/// Partitions may be empty when `split_size` exceeds the item count.
pub fn partition_items<T: Clone>(items: &[T], split_size: usize) -> Vec<Vec<T>> {
    let n = split_size.max(1);
    let len = items.len();
    let bounds: Vec<usize> = (0..=n).map(|i| len * i / n).collect();
    bounds
        .windows(2)
        .map(|pair| items[pair[0]..pair[1]].to_vec())
        .collect()
}

/// What to do after collection when one or more workers failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failures and hand all reports back to the caller.
    #[default]
    Proceed,
    /// Return an error so the caller stops the stage.
    Halt,
}

/// Owned-per-partition status handle. Only its worker writes to it;
/// the coordinator reads the item counter after all workers are done.
pub struct WorkerSlot {
    index: usize,
    reporter: Reporter,
    processed: Arc<AtomicUsize>,
}

impl WorkerSlot {
    fn new(index: usize, reporter: Reporter) -> (Self, Arc<AtomicUsize>) {
        let processed = Arc::new(AtomicUsize::new(0));
        let slot = WorkerSlot {
            index,
            reporter,
            processed: processed.clone(),
        };
        (slot, processed)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn update(&self, message: &str) {
        self.reporter.status(self.index, message);
    }

    pub fn item_done(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one partition's worker.
#[derive(Debug)]
pub struct WorkerReport {
    pub slot: usize,
    pub processed: usize,
    pub outcome: Result<(), PipelineError>,
}

impl WorkerReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Partitions `items` and runs `run_func` once per partition.
///
/// With `split_size == 1` the single partition is processed inline on
/// the caller's task. Otherwise one worker task is spawned per
/// partition, with `stagger` slept between launches so external tools
/// do not all start at the same instant. Every worker is awaited;
/// a failing or panicking worker never cancels its siblings, and all
/// captured failures are logged once collection is complete.
///
/// # Arguments
///
/// * `reporter` - Shared sink cloned into each worker slot.
/// * `split_size` - Requested number of partitions/workers.
/// * `items` - Full ordered list of work items (sample IDs).
/// * `stagger` - Pause between successive worker launches.
/// * `policy` - Whether a failed worker aborts the stage.
/// * `run_func` - Per-partition unit of work.
///
/// # Returns
///
/// One report per partition, in partition order.
pub async fn dispatch<F, Fut>(
    reporter: &Reporter,
    split_size: usize,
    items: &[String],
    stagger: Duration,
    policy: ErrorPolicy,
    run_func: F,
) -> Result<Vec<WorkerReport>, PipelineError>
where
    F: Fn(Vec<String>, WorkerSlot) -> Fut,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    let partitions = partition_items(items, split_size);
    let mut reports = Vec::with_capacity(partitions.len());

    if partitions.len() == 1 {
        info!("Executing as a single process...");
        let (slot, processed) = WorkerSlot::new(0, reporter.clone());
        let partition = partitions.into_iter().next().unwrap_or_default();
        let outcome = run_func(partition, slot).await;
        if let Err(e) = &outcome {
            error!("Error in worker 0: {}", e);
        }
        reports.push(WorkerReport {
            slot: 0,
            processed: processed.load(Ordering::Relaxed),
            outcome,
        });
    } else {
        info!("Initiating {} processes...", partitions.len());
        let mut counters = Vec::with_capacity(partitions.len());
        let mut handles = Vec::with_capacity(partitions.len());
        let last = partitions.len() - 1;
        for (i, partition) in partitions.into_iter().enumerate() {
            let (slot, processed) = WorkerSlot::new(i, reporter.clone());
            counters.push(processed);
            handles.push(tokio::spawn(run_func(partition, slot)));
            if i < last {
                sleep(stagger).await;
            }
        }

        for (i, joined) in join_all(handles).await.into_iter().enumerate() {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(PipelineError::WorkerPanic {
                    slot: i,
                    error: e.to_string(),
                }),
            };
            if let Err(e) = &outcome {
                error!("Error in concurrent execution (worker {}): {}", i, e);
            }
            reports.push(WorkerReport {
                slot: i,
                processed: counters[i].load(Ordering::Relaxed),
                outcome,
            });
        }
    }

    match policy {
        ErrorPolicy::Proceed => Ok(reports),
        ErrorPolicy::Halt => match reports.iter().find(|r| !r.is_ok()) {
            Some(failed) => Err(PipelineError::WorkerAborted { slot: failed.slot }),
            None => Ok(reports),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("S{:03}", i)).collect()
    }

    #[test]
    fn ten_items_three_ways_is_3_3_4() {
        let items = ids(10);
        let parts = partition_items(&items, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], &items[0..3]);
        assert_eq!(parts[1], &items[3..6]);
        assert_eq!(parts[2], &items[6..10]);
    }

    #[test]
    fn partitions_reassemble_the_input() {
        for len in 0..25 {
            let items = ids(len);
            for n in 1..8 {
                let parts = partition_items(&items, n);
                assert_eq!(parts.len(), n, "len={} n={}", len, n);
                let total: usize = parts.iter().map(|p| p.len()).sum();
                assert_eq!(total, len, "len={} n={}", len, n);
                let rejoined: Vec<String> = parts.iter().flatten().cloned().collect();
                assert_eq!(rejoined, items, "len={} n={}", len, n);
            }
        }
    }

    #[test]
    fn partition_sizes_are_fair() {
        for len in 0..40 {
            let items = ids(len);
            for n in 1..10 {
                let floor = len / n;
                let ceil = len.div_ceil(n);
                for part in partition_items(&items, n) {
                    assert!(
                        part.len() == floor || part.len() == ceil,
                        "len={} n={} part={}",
                        len,
                        n,
                        part.len()
                    );
                }
            }
        }
    }

    #[test]
    fn split_of_one_is_the_whole_input() {
        let items = ids(7);
        let parts = partition_items(&items, 1);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0], items);
    }

    #[test]
    fn oversplit_yields_empty_tails() {
        let items = ids(2);
        let parts = partition_items(&items, 5);
        assert_eq!(parts.len(), 5);
        let total: usize = parts.iter().map(|p| p.len()).sum();
        assert_eq!(total, 2);
        assert!(parts.iter().any(|p| p.is_empty()));
    }

    #[test]
    fn partitioning_is_deterministic() {
        let items = ids(13);
        assert_eq!(partition_items(&items, 4), partition_items(&items, 4));
    }
}
