use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use tokio::time::{sleep, Duration};

use resistome_pipelines::config::defs::PipelineError;
use resistome_pipelines::utils::dispatch::{dispatch, ErrorPolicy};
use resistome_pipelines::utils::report::Reporter;

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SRR{:04}", i)).collect()
}

#[tokio::test]
async fn single_split_runs_inline_once() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let items = ids(5);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let calls_outer = calls.clone();
    let seen_outer = seen.clone();
    let reports = dispatch(
        &reporter,
        1,
        &items,
        Duration::from_millis(0),
        ErrorPolicy::Proceed,
        move |partition, slot| {
            let calls = calls_outer.clone();
            let seen = seen_outer.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                for item in &partition {
                    seen.lock().unwrap().push(item.clone());
                    slot.item_done();
                }
                Ok(())
            }
        },
    )
    .await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_ok());
    assert_eq!(reports[0].processed, 5);
    assert_eq!(*seen.lock().unwrap(), items);
    Ok(())
}

#[tokio::test]
async fn empty_input_still_invokes_every_partition() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let items: Vec<String> = Vec::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_outer = calls.clone();
    let reports = dispatch(
        &reporter,
        3,
        &items,
        Duration::from_millis(1),
        ErrorPolicy::Proceed,
        move |partition, _slot| {
            let calls = calls_outer.clone();
            async move {
                assert!(partition.is_empty());
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
    )
    .await?;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.is_ok() && r.processed == 0));
    Ok(())
}

#[tokio::test]
async fn failed_partition_does_not_cancel_siblings() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    // 12 items over 4 workers puts 3 in every partition
    let items = ids(12);

    let reports = dispatch(
        &reporter,
        4,
        &items,
        Duration::from_millis(1),
        ErrorPolicy::Proceed,
        |partition, slot| async move {
            for (i, _item) in partition.iter().enumerate() {
                if slot.index() == 2 && i == 1 {
                    return Err(PipelineError::InvalidConfig(
                        "simulated worker failure".to_string(),
                    ));
                }
                slot.item_done();
            }
            Ok(())
        },
    )
    .await?;

    assert_eq!(reports.len(), 4);
    for report in &reports {
        if report.slot == 2 {
            assert!(!report.is_ok());
            assert_eq!(report.processed, 1);
        } else {
            assert!(report.is_ok(), "worker {} should have finished", report.slot);
            assert_eq!(report.processed, 3);
        }
    }
    assert_eq!(reports.iter().filter(|r| !r.is_ok()).count(), 1);
    Ok(())
}

#[tokio::test]
async fn worker_panic_is_contained() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let items = ids(4);

    let reports = dispatch(
        &reporter,
        2,
        &items,
        Duration::from_millis(1),
        ErrorPolicy::Proceed,
        |_partition, slot| async move {
            if slot.index() == 0 {
                panic!("worker blew up");
            }
            Ok(())
        },
    )
    .await?;

    assert_eq!(reports.len(), 2);
    assert!(matches!(
        reports[0].outcome,
        Err(PipelineError::WorkerPanic { slot: 0, .. })
    ));
    assert!(reports[1].is_ok());
    Ok(())
}

#[tokio::test]
async fn workers_overlap_rather_than_serialize() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let items = ids(4);
    let start = Instant::now();

    let reports = dispatch(
        &reporter,
        4,
        &items,
        Duration::from_millis(50),
        ErrorPolicy::Proceed,
        |_partition, _slot| async move {
            sleep(Duration::from_millis(200)).await;
            Ok::<(), PipelineError>(())
        },
    )
    .await?;
    let elapsed = start.elapsed();

    assert!(reports.iter().all(|r| r.is_ok()));
    // max(worker time) + 3 staggers is ~350ms; a serial run would need 800ms
    assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(700), "elapsed {:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn halt_policy_surfaces_worker_failure() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let items = ids(6);

    let outcome = dispatch(
        &reporter,
        2,
        &items,
        Duration::from_millis(1),
        ErrorPolicy::Halt,
        |_partition, slot| async move {
            if slot.index() == 1 {
                Err(PipelineError::InvalidConfig("boom".to_string()))
            } else {
                Ok(())
            }
        },
    )
    .await;

    match outcome {
        Err(PipelineError::WorkerAborted { slot }) => assert_eq!(slot, 1),
        other => panic!("expected WorkerAborted, got {:?}", other.map(|r| r.len())),
    }
    Ok(())
}

#[tokio::test]
async fn worker_status_lines_reach_the_shared_sink() -> Result<()> {
    let (reporter, buf) = Reporter::buffer();
    let items = ids(2);

    dispatch(
        &reporter,
        2,
        &items,
        Duration::from_millis(1),
        ErrorPolicy::Proceed,
        |partition, slot| async move {
            for item in &partition {
                slot.update(&format!("processing {}", item));
                slot.item_done();
            }
            Ok(())
        },
    )
    .await?;

    let out = buf.contents();
    assert!(out.contains("[worker 0] processing SRR0000"));
    assert!(out.contains("[worker 1] processing SRR0001"));
    Ok(())
}
