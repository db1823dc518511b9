use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use quire_scheduler::{KeyedWorkQueue, Scheduler, SchedulerConfig};

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        worker_threads: 2,
        timer_threads: 1,
    })
    .unwrap()
}

#[test]
fn rapid_enqueues_collapse_into_one_run_of_the_latest_item() {
    let queue = KeyedWorkQueue::new(scheduler(), Duration::from_millis(200));
    let runs = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    for payload in 1..=5 {
        let runs = Arc::clone(&runs);
        let tx = tx.clone();
        queue.enqueue("K", move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            tx.send(payload).unwrap();
            Ok(())
        });
        std::thread::sleep(Duration::from_millis(10));
    }
    drop(tx);

    assert!(queue.block_until_idle(Duration::from_secs(5)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 5);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(queue.completed(), 1);
}

#[test]
fn slow_key_does_not_delay_other_keys() {
    let queue = KeyedWorkQueue::new(scheduler(), Duration::from_millis(20));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel();

    let slow_done = done_tx.clone();
    queue.enqueue("K1", move |_| {
        // Held until the test releases it.
        release_rx.recv_timeout(Duration::from_secs(10)).ok();
        slow_done.send(("K1", Instant::now())).unwrap();
        Ok(())
    });
    queue.enqueue("K2", move |_| {
        done_tx.send(("K2", Instant::now())).unwrap();
        Ok(())
    });

    let (first, _) = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first, "K2");
    assert!(queue.pending_keys().contains(&"K1"));

    release_tx.send(()).unwrap();
    let (second, _) = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(second, "K1");
    assert!(queue.block_until_idle(Duration::from_secs(5)));
}

#[test]
fn item_enqueued_while_executing_runs_after_the_in_flight_one() {
    let queue = KeyedWorkQueue::new(scheduler(), Duration::from_millis(10));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (order_tx, order_rx) = mpsc::channel();

    let enqueue = |label: &'static str, hold: Duration, started: Option<mpsc::Sender<()>>| {
        let in_flight = Arc::clone(&in_flight);
        let overlapped = Arc::clone(&overlapped);
        let order_tx = order_tx.clone();
        queue.enqueue("K", move |_| {
            if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(started) = started {
                started.send(()).unwrap();
            }
            std::thread::sleep(hold);
            in_flight.fetch_sub(1, Ordering::SeqCst);
            order_tx.send(label).unwrap();
            Ok(())
        });
    };

    enqueue("first", Duration::from_millis(150), Some(started_tx));
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    enqueue("second", Duration::ZERO, None);

    assert_eq!(order_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "first");
    assert_eq!(order_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
    assert!(queue.block_until_idle(Duration::from_secs(5)));
    assert_eq!(overlapped.load(Ordering::SeqCst), 0);
    assert_eq!(queue.completed(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_until_idle_resolves_after_last_key_settles() {
    let scheduler = Scheduler::with_runtime(
        SchedulerConfig::default(),
        tokio::runtime::Handle::current(),
    );
    let queue = KeyedWorkQueue::new(scheduler, Duration::from_millis(30));
    let runs = Arc::new(AtomicUsize::new(0));

    for key in ["a", "b", "c"] {
        let runs = Arc::clone(&runs);
        queue.enqueue(key, move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    assert!(!queue.is_idle());

    tokio::time::timeout(Duration::from_secs(5), queue.wait_until_idle())
        .await
        .expect("queue settles");
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(queue.is_idle());
}
