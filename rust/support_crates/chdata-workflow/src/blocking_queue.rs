//! A condition-variable based queue that parks the producer when full and the consumer
//! when empty.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard},
    time::Duration,
};

use crate::queue::{self, ChunkQueue, OfferError, PollError};

pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    capacity: Option<usize>,
    not_empty: Condvar, // To signal the consumer that an item has been added.
    not_full: Condvar,  // To signal the producer that space has become available.
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> BlockingQueue<T> {
        assert_ne!(capacity, 0, "BlockingQueue does not support zero capacity");
        Self::with_capacity(Some(capacity))
    }

    /// Creates a queue whose `offer` never waits.
    pub fn unbounded() -> BlockingQueue<T> {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> BlockingQueue<T> {
        BlockingQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn is_full(&self, state: &State<T>) -> bool {
        self.capacity.is_some_and(|cap| state.items.len() >= cap)
    }

    /// Waits on `condvar` until woken or `remaining` elapses. Returns `false` if the
    /// wait had already expired.
    fn park<'a>(
        condvar: &Condvar,
        guard: MutexGuard<'a, State<T>>,
        remaining: Option<Duration>,
    ) -> (MutexGuard<'a, State<T>>, bool) {
        match remaining {
            None => (condvar.wait(guard).unwrap(), true),
            Some(left) if left.is_zero() => (guard, false),
            Some(left) => (condvar.wait_timeout(guard, left).unwrap().0, true),
        }
    }
}

impl<T: Send> ChunkQueue<T> for BlockingQueue<T> {
    fn offer(&self, item: T, timeout: Option<Duration>) -> Result<(), OfferError<T>> {
        let deadline = queue::deadline(timeout);
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(OfferError::Closed(item));
            }
            if !self.is_full(&state) {
                break;
            }
            let (guard, waited) = Self::park(&self.not_full, state, queue::remaining(deadline));
            state = guard;
            if !waited {
                return Err(OfferError::Timeout(item));
            }
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<T, PollError> {
        let deadline = queue::deadline(timeout);
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(PollError::Closed);
            }
            let (guard, waited) = Self::park(&self.not_empty, state, queue::remaining(deadline));
            state = guard;
            if !waited {
                return Err(PollError::Timeout);
            }
        }
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn clear(&self) {
        self.state.lock().unwrap().items.clear();
        self.not_full.notify_all();
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    #[test]
    fn test_fifo_order() {
        let q = BlockingQueue::bounded(4);
        for i in 0..4 {
            q.offer(i, None).unwrap();
        }
        for i in 0..4 {
            assert_eq!(q.poll(None).unwrap(), i);
        }
    }

    #[test]
    fn test_unbounded_never_waits() {
        let q = BlockingQueue::unbounded();
        for i in 0..1000 {
            q.offer(i, Some(Duration::ZERO)).unwrap();
        }
        assert_eq!(q.len(), 1000);
        assert_eq!(q.capacity(), None);
    }

    #[test]
    fn test_offer_times_out_when_full() {
        let q = BlockingQueue::bounded(1);
        q.offer("first", None).unwrap();
        let started = Instant::now();
        let err = q.offer("second", Some(Duration::from_millis(40))).unwrap_err();
        assert_eq!(err, OfferError::Timeout("second"));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_poll_times_out_when_empty() {
        let q = BlockingQueue::<u8>::bounded(1);
        assert_eq!(
            q.poll(Some(Duration::from_millis(20))),
            Err(PollError::Timeout)
        );
    }

    #[test]
    fn test_full_queue_blocks_until_drained() {
        let q = Arc::new(BlockingQueue::bounded(1));
        q.offer(1, None).unwrap();

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                let started = Instant::now();
                q.offer(2, Some(Duration::from_secs(5))).unwrap();
                started.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.poll(None).unwrap(), 1);
        let blocked_for = producer.join().unwrap();
        assert!(blocked_for >= Duration::from_millis(40));
        assert_eq!(q.poll(None).unwrap(), 2);
    }

    #[test]
    fn test_close_wakes_consumer_after_drain() {
        let q = Arc::new(BlockingQueue::bounded(2));
        q.offer(10, None).unwrap();

        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let first = q.poll(None);
                let second = q.poll(None);
                (first, second)
            })
        };

        thread::sleep(Duration::from_millis(20));
        q.close();
        q.close();
        let (first, second) = consumer.join().unwrap();
        assert_eq!(first, Ok(10));
        assert_eq!(second, Err(PollError::Closed));
        assert_eq!(q.offer(11, None), Err(OfferError::Closed(11)));
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let q = Arc::new(BlockingQueue::bounded(1));
        q.offer(0, None).unwrap();
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.offer(1, None))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(producer.join().unwrap(), Err(OfferError::Closed(1)));
    }
}
