//! Bounded background prefetch for the input volume stream.
//!
//! A single producer thread drains the source iterator into a bounded
//! channel so that loading and preprocessing of the next volume overlaps
//! with inference on the current one. Ordering is preserved; the buffer
//! capacity only limits how far the producer may run ahead.

use crossbeam_channel::{bounded, Receiver};
use std::thread::{self, JoinHandle};

/// Wrap an iterator in a background-filled bounded buffer.
///
/// The producer thread blocks once `capacity` items are queued and stops
/// early if the consumer is dropped.
pub fn buffered<I>(source: I, capacity: usize) -> Buffered<I::Item>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    assert!(capacity > 0, "prefetch buffer needs capacity");

    let (sender, receiver) = bounded(capacity);
    let producer = thread::spawn(move || {
        for item in source {
            if sender.send(item).is_err() {
                // Consumer hung up; stop pulling from the source.
                break;
            }
        }
    });

    Buffered {
        receiver: Some(receiver),
        producer: Some(producer),
    }
}

/// Iterator over a background-buffered stream. FIFO with the source.
pub struct Buffered<T> {
    receiver: Option<Receiver<T>>,
    producer: Option<JoinHandle<()>>,
}

impl<T> Iterator for Buffered<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.as_ref().and_then(|rx| rx.recv().ok())
    }
}

impl<T> Drop for Buffered<T> {
    fn drop(&mut self) {
        // Disconnect first so a blocked producer can observe the hangup.
        self.receiver.take();
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn preserves_order_and_completeness() {
        let items: Vec<usize> = (0..100).collect();
        let collected: Vec<usize> = buffered(items.clone().into_iter(), 2).collect();
        assert_eq!(collected, items);
    }

    #[test]
    fn empty_source_yields_nothing() {
        let mut stream = buffered(std::iter::empty::<u32>(), 2);
        assert!(stream.next().is_none());
    }

    #[test]
    fn producer_stays_within_the_buffer_bound() {
        let produced = Arc::new(AtomicUsize::new(0));
        let produced_in_source = Arc::clone(&produced);

        let source = (0..50usize).map(move |i| {
            produced_in_source.fetch_add(1, Ordering::SeqCst);
            i
        });

        let capacity = 2;
        let mut consumed = 0usize;
        for _ in buffered(source, capacity) {
            consumed += 1;
            // Give the producer every chance to run ahead.
            std::thread::sleep(Duration::from_millis(2));
            let lead = produced.load(Ordering::SeqCst) - consumed;
            // Queue plus one item parked in a blocked send, plus the one
            // currently held by the consumer loop.
            assert!(lead <= capacity + 2, "producer ran {lead} items ahead");
        }
        assert_eq!(consumed, 50);
    }

    #[test]
    fn dropping_the_consumer_stops_the_producer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let produced_in_source = Arc::clone(&produced);

        let source = (0..1_000_000usize).map(move |i| {
            produced_in_source.fetch_add(1, Ordering::SeqCst);
            i
        });

        let mut stream = buffered(source, 2);
        assert_eq!(stream.next(), Some(0));
        drop(stream); // joins the producer

        let total = produced.load(Ordering::SeqCst);
        assert!(total < 100, "producer kept running after drop: {total}");
    }
}
