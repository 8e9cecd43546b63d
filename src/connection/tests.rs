//! Tests for the connection queue and notification dispatch

use super::*;
use crate::test_utils::{f64_descriptor, ramp, samples_packet, value_changed};
use crate::types::{EventPacket, Number};
use futures::StreamExt;
use std::sync::atomic::AtomicUsize;
use std::thread;
use std::time::Duration;

fn data(len: usize) -> Packet {
    samples_packet(&f64_descriptor(), &ramp(0.0, len))
}

fn counting_listener() -> (Arc<AtomicUsize>, Arc<dyn PacketListener>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let listener = move |_: &Connection| {
        counter.fetch_add(1, Ordering::SeqCst);
    };
    (calls, Arc::new(listener))
}

fn connection_with(mode: NotificationMode, scheduler: Option<Arc<dyn Scheduler>>) -> Connection {
    let notifier = Arc::new(PacketNotifier::new(mode, scheduler));
    Connection::attached(Weak::new(), "input".to_string(), notifier, false)
}

fn set_listener(connection: &Connection, listener: Arc<dyn PacketListener>) {
    connection.inner.notifier.set_listener(Some(listener));
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn dequeue_returns_packets_in_enqueue_order(sizes in prop::collection::vec(0usize..16, 0..32)) {
            let connection = Connection::new("input");
            let packets: Vec<Packet> = sizes.iter().map(|&n| data(n)).collect();
            for packet in &packets {
                connection.enqueue(packet);
            }

            for expected in &packets {
                let packet = connection.dequeue().unwrap();
                prop_assert!(packet.ptr_eq(expected));
            }
            prop_assert!(connection.dequeue().is_none());
        }

        #[test]
        fn available_samples_ignores_descriptors(
            sizes in prop::collection::vec(0usize..16, 0..16),
            event_at in 0usize..16
        ) {
            let connection = Connection::new("input");
            for (i, &n) in sizes.iter().enumerate() {
                if i == event_at {
                    connection.enqueue_and_steal_ref(value_changed(&f64_descriptor()));
                }
                connection.enqueue_and_steal_ref(data(n));
            }

            let total: usize = sizes.iter().sum();
            let before_event: usize = sizes.iter().take(event_at).sum();
            prop_assert_eq!(connection.available_samples(), total);
            prop_assert_eq!(connection.samples_until_next_descriptor(), before_event.min(total));
        }
    }
}

#[test]
fn peek_is_idempotent() {
    let connection = Connection::new("input");
    connection.enqueue_and_steal_ref(data(3));
    connection.enqueue_and_steal_ref(data(1));

    let first = connection.peek().unwrap();
    let second = connection.peek().unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(connection.packet_count(), 2);
    assert!(connection.dequeue().unwrap().ptr_eq(&first));
}

#[test]
fn empty_queue_reports_no_items() {
    let connection = Connection::new("input");
    assert!(connection.dequeue().is_none());
    assert!(connection.peek().is_none());
    assert!(connection.dequeue_all().is_empty());
    assert_eq!(connection.available_samples(), 0);
}

#[test]
fn dequeue_all_takes_everything_in_order() {
    let connection = Connection::new("input");
    let packets = vec![data(1), data(2), data(3)];
    connection.enqueue_multiple(&packets);

    let drained = connection.dequeue_all();
    assert_eq!(drained.len(), 3);
    for (got, expected) in drained.iter().zip(&packets) {
        assert!(got.ptr_eq(expected));
    }
    assert_eq!(connection.packet_count(), 0);
}

#[test]
fn descriptor_boundary_only_stops_at_descriptor_events() {
    let connection = Connection::new("input");
    connection.enqueue_and_steal_ref(data(3));
    connection.enqueue_and_steal_ref(Packet::from(EventPacket::domain_gap(Number::Int(10))));
    connection.enqueue_and_steal_ref(data(2));
    connection.enqueue_and_steal_ref(value_changed(&f64_descriptor()));
    connection.enqueue_and_steal_ref(data(4));

    assert_eq!(connection.available_samples(), 9);
    assert_eq!(connection.samples_until_next_descriptor(), 5);
    assert_eq!(connection.samples_until_next_event(), 3);
    assert!(connection.has_event_packet());
}

#[test]
fn remote_connection_stays_empty() {
    let connection = Connection::new_remote("input");
    connection.enqueue_and_steal_ref(data(4));
    connection.enqueue_multiple(&[data(1), data(2)]);

    assert!(connection.is_remote());
    assert_eq!(connection.packet_count(), 0);
    assert!(connection.dequeue().is_none());
}

#[test]
fn close_drains_and_refuses_packets() {
    let connection = Connection::new("input");
    connection.enqueue_and_steal_ref(data(4));
    connection.close();

    assert!(connection.is_closed());
    assert_eq!(connection.packet_count(), 0);
    connection.enqueue_and_steal_ref(data(4));
    assert_eq!(connection.packet_count(), 0);
}

#[test]
fn close_wakes_blocked_waiter() {
    let connection = Connection::new("input");
    let waiter = connection.clone();
    let handle = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        waiter.wait_until(Some(deadline), |queue| !queue.is_empty())
    });

    thread::sleep(Duration::from_millis(20));
    let started = Instant::now();
    connection.close();
    assert!(!handle.join().unwrap());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn waiter_sees_packets_from_producer_thread() {
    let connection = Connection::new("input");
    let producer = connection.clone();
    let handle = thread::spawn(move || {
        for _ in 0..100 {
            producer.enqueue_and_steal_ref(data(1));
        }
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    assert!(connection.wait_until(Some(deadline), |queue| queue.len() == 100));
    handle.join().unwrap();
    assert_eq!(connection.available_samples(), 100);
}

#[test]
fn same_thread_mode_notifies_every_enqueue() {
    let connection = connection_with(NotificationMode::SameThread, None);
    let (calls, listener) = counting_listener();
    set_listener(&connection, listener);

    connection.enqueue_and_steal_ref(data(1));
    connection.enqueue_and_steal_ref(data(1));
    connection.enqueue_multiple(&[data(1), data(1)]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn scheduler_mode_defers_to_main_loop() {
    let scheduler = Arc::new(MainLoopScheduler::new());
    let connection = connection_with(
        NotificationMode::Scheduler,
        Some(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
    );
    let (calls, listener) = counting_listener();
    set_listener(&connection, listener);

    connection.enqueue_and_steal_ref(data(1));
    connection.enqueue_and_steal_ref(data(1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.pending(), 2);

    assert_eq!(scheduler.run_pending(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn queue_was_empty_mode_notifies_once_per_burst() {
    let scheduler = Arc::new(MainLoopScheduler::new());
    let connection = connection_with(
        NotificationMode::SchedulerQueueWasEmpty,
        Some(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
    );
    let (calls, listener) = counting_listener();
    set_listener(&connection, listener);

    connection.enqueue_and_steal_ref(data(1));
    connection.enqueue_and_steal_ref(data(1));
    connection.enqueue_and_steal_ref(data(1));
    scheduler.run_pending();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    connection.dequeue_all();
    connection.enqueue_and_steal_ref(data(1));
    scheduler.run_pending();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn scheduled_modes_fall_back_without_scheduler() {
    let connection = connection_with(NotificationMode::Scheduler, None);
    let (calls, listener) = counting_listener();
    set_listener(&connection, listener);

    connection.enqueue_and_steal_ref(data(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn enqueue_on_this_thread_bypasses_scheduler() {
    let scheduler = Arc::new(MainLoopScheduler::new());
    let connection = connection_with(
        NotificationMode::Scheduler,
        Some(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
    );
    let (calls, listener) = counting_listener();
    set_listener(&connection, listener);

    connection.enqueue_on_this_thread(data(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn listener_can_dequeue_from_callback() {
    let connection = connection_with(NotificationMode::SameThread, None);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    set_listener(
        &connection,
        Arc::new(move |conn: &Connection| {
            while let Some(packet) = conn.dequeue() {
                counter.fetch_add(packet.sample_count(), Ordering::SeqCst);
            }
        }),
    );

    connection.enqueue_and_steal_ref(data(3));
    connection.enqueue_and_steal_ref(data(2));
    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(connection.packet_count(), 0);
}

#[tokio::test]
async fn packet_stream_yields_until_closed() {
    let connection = Connection::new("input");
    let mut stream = Box::pin(connection.packet_stream());

    connection.enqueue_and_steal_ref(data(2));
    let first = stream.next().await.unwrap();
    assert_eq!(first.sample_count(), 2);

    let producer = connection.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.enqueue_and_steal_ref(data(5));
        producer.close();
    });

    let second = stream.next().await.unwrap();
    assert_eq!(second.sample_count(), 5);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn tokio_scheduler_runs_listener_on_blocking_pool() {
    let scheduler = TokioScheduler::current().unwrap();
    let connection = connection_with(NotificationMode::Scheduler, Some(Arc::new(scheduler)));
    let (tx, rx) = tokio::sync::oneshot::channel::<usize>();
    let tx = Mutex::new(Some(tx));
    set_listener(
        &connection,
        Arc::new(move |conn: &Connection| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(conn.available_samples());
            }
        }),
    );

    connection.enqueue_and_steal_ref(data(4));
    let seen = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert_eq!(seen, 4);
}
