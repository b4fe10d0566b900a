//! Property-based checks of admission under arbitrary completion orders.
//!
//! For any submission count, concurrency limit, and order in which in-flight
//! transfers complete:
//!   1. The number of started-but-unfinished tasks never exceeds the limit
//!   2. Tasks are admitted in submission order
//!   3. Every task gets exactly one start and exactly one terminal event

mod common;

use common::{config, eventually, file, ScriptedTransport};
use medialift_upload::{TaskId, UploadCoordinator, UploadEventKind};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Outcome {
    max_in_flight: usize,
    start_order: Vec<TaskId>,
    per_task: HashMap<TaskId, Vec<UploadEventKind>>,
}

fn drive(files: usize, limit: usize, picks: Vec<usize>) -> Outcome {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async move {
        let transport = ScriptedTransport::default();
        let coord = UploadCoordinator::new(&config(limit), transport.clone()).unwrap();

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let log: Arc<Mutex<Vec<(TaskId, UploadEventKind)>>> = Arc::default();

        for kind in UploadEventKind::ALL {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let log = Arc::clone(&log);
            coord.on(kind, move |event| {
                if event.kind == UploadEventKind::Start {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                } else if event.kind.is_terminal() {
                    // Nothing is cancelled here, so every terminal follows a start
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                log.lock().unwrap().push((event.task_id, event.kind));
            });
        }

        for i in 0..files {
            coord.submit(file(&format!("p{i}"))).unwrap();
        }

        let mut picks = picks.into_iter().cycle();
        loop {
            let done = log
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, k)| k.is_terminal())
                .count();
            if done == files {
                break;
            }
            let expected_in_flight = in_flight.load(Ordering::SeqCst);
            eventually(|| transport.pending_names().len() == expected_in_flight).await;
            let pick = picks.next().unwrap_or(0);
            transport.succeed_nth(pick);
            eventually(|| {
                log.lock()
                    .unwrap()
                    .iter()
                    .filter(|(_, k)| k.is_terminal())
                    .count()
                    > done
            })
            .await;
        }
        coord.wait_idle().await;

        let log = log.lock().unwrap().clone();
        let start_order = log
            .iter()
            .filter(|(_, k)| *k == UploadEventKind::Start)
            .map(|(id, _)| *id)
            .collect();
        let mut per_task: HashMap<TaskId, Vec<UploadEventKind>> = HashMap::new();
        for (id, kind) in log {
            per_task.entry(id).or_default().push(kind);
        }

        Outcome {
            max_in_flight: max_in_flight.load(Ordering::SeqCst),
            start_order,
            per_task,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn admission_is_bounded_and_fifo(
        files in 1usize..16,
        limit in 1usize..6,
        picks in prop::collection::vec(0usize..8, 1..16),
    ) {
        let outcome = drive(files, limit, picks);

        prop_assert!(outcome.max_in_flight <= limit);
        prop_assert_eq!(outcome.max_in_flight, files.min(limit));

        let expected: Vec<TaskId> = (1..=files as u64).map(TaskId).collect();
        prop_assert_eq!(outcome.start_order, expected);

        for (id, kinds) in &outcome.per_task {
            prop_assert_eq!(kinds.first(), Some(&UploadEventKind::Start), "task {}", id);
            prop_assert_eq!(kinds.iter().filter(|k| k.is_terminal()).count(), 1, "task {}", id);
            prop_assert_eq!(kinds.last(), Some(&UploadEventKind::Success), "task {}", id);
        }
        prop_assert_eq!(outcome.per_task.len(), files);
    }
}
