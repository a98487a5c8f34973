use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rally_core::{BoundedClosableQueue, Fault, FaultMonitor, PutError, ShutdownCause, TakeError};

#[test]
fn blocked_put_proceeds_once_consumer_frees_space() {
    let queue = Arc::new(BoundedClosableQueue::with_capacity(1).unwrap());
    queue.put(1u32, Duration::from_millis(10)).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.put(2u32, Duration::from_secs(5)))
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.take(Duration::from_secs(1)), Ok(1));
    assert!(producer.join().unwrap().is_ok());
    assert_eq!(queue.take(Duration::from_secs(1)), Ok(2));
}

#[test]
fn close_wakes_blocked_producer_with_its_item() {
    let queue = Arc::new(BoundedClosableQueue::with_capacity(1).unwrap());
    queue.put("held", Duration::from_millis(10)).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let started = Instant::now();
            (queue.put("blocked", Duration::from_secs(30)), started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(50));
    queue.close();

    let (result, waited) = producer.join().unwrap();
    assert_eq!(result, Err(PutError::Closed("blocked")));
    assert!(waited < Duration::from_secs(30));
    // the held item is still drained after close
    assert_eq!(queue.take(Duration::ZERO), Ok("held"));
    assert_eq!(queue.take(Duration::ZERO), Err(TakeError::Closed));
}

#[test]
fn close_wakes_blocked_consumer() {
    let queue = Arc::new(BoundedClosableQueue::<u8>::with_capacity(4).unwrap());
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.take(Duration::from_secs(30)))
    };

    thread::sleep(Duration::from_millis(50));
    queue.close();
    assert_eq!(consumer.join().unwrap(), Err(TakeError::Closed));
}

#[test]
fn every_item_delivered_exactly_once_across_consumers() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let queue = Arc::new(BoundedClosableQueue::with_capacity(16).unwrap());
    let seen = Arc::new(AtomicUsize::new(0));
    let sum = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut item = p * PER_PRODUCER + i;
                    loop {
                        match queue.put(item, Duration::from_millis(100)) {
                            Ok(()) => break,
                            Err(PutError::Timeout(back)) => item = back,
                            Err(PutError::Closed(_)) => panic!("queue closed early"),
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let seen = Arc::clone(&seen);
            let sum = Arc::clone(&sum);
            thread::spawn(move || {
                loop {
                    match queue.take(Duration::from_millis(100)) {
                        Ok(item) => {
                            seen.fetch_add(1, Ordering::SeqCst);
                            sum.fetch_add(item, Ordering::SeqCst);
                        }
                        Err(TakeError::Timeout) => continue,
                        Err(TakeError::Closed) => break,
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    queue.close();
    for consumer in consumers {
        consumer.join().unwrap();
    }

    let total = PRODUCERS * PER_PRODUCER;
    assert_eq!(seen.load(Ordering::SeqCst), total);
    assert_eq!(sum.load(Ordering::SeqCst), total * (total - 1) / 2);
}

#[test]
fn listener_wakes_on_fault_from_other_thread() {
    let monitor = FaultMonitor::new();
    let listener = monitor.listen_only();
    let panicker = monitor.panic_only();

    let waiter = thread::spawn(move || listener.wait_for_cause());
    thread::sleep(Duration::from_millis(30));
    panicker.panic(Fault::new("worker-2", "result queue closed"));

    assert_eq!(
        waiter.join().unwrap(),
        ShutdownCause::Fault(Fault::new("worker-2", "result queue closed"))
    );
}

#[test]
fn racing_faults_keep_exactly_one() {
    let monitor = FaultMonitor::new();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let panicker = monitor.panic_only();
            thread::spawn(move || panicker.panic(Fault::new(format!("worker-{i}"), "boom")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let listener = monitor.listen_only();
    let first = listener.fault().unwrap();
    // repeated observations agree
    for _ in 0..3 {
        assert_eq!(listener.fault().as_ref(), Some(&first));
    }
}
