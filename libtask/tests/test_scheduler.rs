use libtask::console::Capture;
use libtask::{Console, RuntimeFault, Scheduler, SchedulerConfig, TaskState};
use std::io::Write;
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn make_scheduler(config: SchedulerConfig) -> (Scheduler, Capture, Capture) {
    init_logging();
    let (console, out, err) = Console::captured();
    (Scheduler::new(&config, Arc::new(console)), out, err)
}

#[test]
fn test_critical_section_keeps_lines_intact() {
    let (scheduler, out, _err) = make_scheduler(SchedulerConfig::fixed(8));
    let h = scheduler.handle().clone();
    scheduler.run_group(move || {
        for i in 0..32 {
            let console = Arc::clone(h.console());
            h.submit(move || {
                let line = format!("item-{i:02}-{}", "x".repeat(40));
                console.critical(|s| {
                    // one byte per write to give other threads every chance to interleave
                    for b in line.bytes() {
                        s.out().write_all(&[b]).unwrap();
                        thread::yield_now();
                    }
                    s.out().write_all(b"\n").unwrap();
                });
                Ok(())
            });
        }
        Ok(())
    });

    let text = out.contents();
    let mut lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 32);
    lines.sort();
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(*line, format!("item-{i:02}-{}", "x".repeat(40)));
    }
}

#[test]
fn test_with_mutual_exclusion_is_exclusive() {
    let (scheduler, _out, _err) = make_scheduler(SchedulerConfig::fixed(4));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let h = scheduler.handle().clone();
    let (inside2, max2) = (Arc::clone(&inside), Arc::clone(&max_seen));
    scheduler.run_group(move || {
        for _ in 0..16 {
            let (h2, inside, max_seen) = (h.clone(), Arc::clone(&inside2), Arc::clone(&max2));
            h.submit(move || {
                h2.with_mutual_exclusion(|| {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
                Ok(())
            });
        }
        Ok(())
    });
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_group_waits_for_longest_delay() {
    let (scheduler, _out, _err) = make_scheduler(SchedulerConfig::fixed(4));
    let finished = Arc::new(AtomicUsize::new(0));
    let h = scheduler.handle().clone();
    let f = Arc::clone(&finished);
    let start = Instant::now();
    scheduler.run_group(move || {
        for delay in [10_u64, 60, 200, 30] {
            let f = Arc::clone(&f);
            h.submit(move || {
                thread::sleep(Duration::from_millis(delay));
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        Ok(())
    });
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(finished.load(Ordering::SeqCst), 4);
}

#[test]
fn test_group_covers_transitive_submissions() {
    let (scheduler, _out, _err) = make_scheduler(SchedulerConfig::dynamic());
    let finished = Arc::new(AtomicUsize::new(0));
    let h = scheduler.handle().clone();
    let f = Arc::clone(&finished);
    scheduler.run_group(move || {
        let h2 = h.clone();
        h.submit(move || {
            // grandchild submitted by a child, with the longest delay
            h2.submit(move || {
                thread::sleep(Duration::from_millis(150));
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
        Ok(())
    });
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_runtime_fault_does_not_stop_siblings() {
    let (scheduler, _out, err) = make_scheduler(SchedulerConfig::fixed(2));
    let finished = Arc::new(AtomicUsize::new(0));
    let h = scheduler.handle().clone();
    let f = Arc::clone(&finished);
    scheduler.run_group(move || {
        h.submit(|| Err(RuntimeFault::aborted("deliberate abort").into()));
        for _ in 0..3 {
            let f = Arc::clone(&f);
            h.submit(move || {
                thread::sleep(Duration::from_millis(20));
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        Ok(())
    });

    assert_eq!(finished.load(Ordering::SeqCst), 3);
    let log = err.contents();
    assert!(log.contains("] Runtime error: deliberate abort"), "{log}");
    assert!(log.starts_with("[thread "));
}

#[test]
fn test_all_fault_categories_are_logged() {
    let (scheduler, _out, err) = make_scheduler(SchedulerConfig::fixed(2));
    let h = scheduler.handle().clone();
    scheduler.run_group(move || {
        h.submit(|| Err(RuntimeFault::aborted("declared").into()));
        h.submit(|| Err(anyhow::anyhow!("generic")));
        h.submit(|| std::panic::panic_any(7_i32));
        Ok(())
    });

    let log = err.contents();
    assert!(log.contains("Runtime error: declared"), "{log}");
    assert!(log.contains("Caught a general exception: generic"), "{log}");
    assert!(log.contains("An unknown error occurred."), "{log}");
    assert_eq!(scheduler.handle().stats().failed, 3);
}

#[test]
fn test_failing_entry_still_returns() {
    let (scheduler, _out, err) = make_scheduler(SchedulerConfig::fixed(1));
    scheduler.run_group(|| panic!("entry blew up"));
    assert!(err.contents().contains("Caught a general exception: entry blew up"));
}

#[test]
fn test_nested_groups_do_not_deadlock_single_worker() {
    let (scheduler, _out, _err) = make_scheduler(SchedulerConfig::fixed(1));
    let finished = Arc::new(AtomicUsize::new(0));
    let h = scheduler.handle().clone();
    let f = Arc::clone(&finished);
    scheduler.run_group(move || {
        let inner = h.clone();
        let f2 = Arc::clone(&f);
        h.run_group(move || {
            for _ in 0..4 {
                let f = Arc::clone(&f2);
                inner.submit(move || {
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            Ok(())
        });
        // the inner barrier already drained
        assert_eq!(f.load(Ordering::SeqCst), 4);
        Ok(())
    });
    assert_eq!(finished.load(Ordering::SeqCst), 4);
    assert_eq!(scheduler.handle().stats().failed, 0);
}

#[test]
fn test_spawned_handle_from_inside_group() {
    let (scheduler, _out, _err) = make_scheduler(SchedulerConfig::fixed(2));
    let h = scheduler.handle().clone();
    scheduler.run_group(move || {
        let t = h.spawn(|| Ok(()));
        anyhow::ensure!(t.wait() == TaskState::Completed, "task did not complete");
        Ok(())
    });
    assert_eq!(scheduler.handle().stats().failed, 0);
}
