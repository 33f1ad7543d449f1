//! A queue that never parks on a condition variable.
//!
//! Waiting producers and consumers spin, then yield, then nap briefly while re-checking
//! the queue. Instead of making the producer wait longer, sustained pressure grows the
//! capacity as dictated by a [`CapacityPolicy`].

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::queue::{self, ChunkQueue, OfferError, PollError};

/// How an [`AdaptiveQueue`] sizes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Constant capacity; zero means unbounded.
    Fixed { capacity: usize },
    /// Starts at `initial` and grows by one every `variation` consecutive offers that
    /// find the queue full, up to `max` (zero means no upper limit).
    Linear {
        initial: usize,
        max: usize,
        variation: usize,
    },
}

impl CapacityPolicy {
    pub fn fixed(capacity: usize) -> CapacityPolicy {
        CapacityPolicy::Fixed { capacity }
    }

    pub fn unbounded() -> CapacityPolicy {
        CapacityPolicy::Fixed { capacity: 0 }
    }

    pub fn linear(initial: usize, max: usize, variation: usize) -> CapacityPolicy {
        let initial = initial.max(1);
        CapacityPolicy::Linear {
            initial: if max > 0 { initial.min(max) } else { initial },
            max,
            variation: variation.max(1),
        }
    }

    /// Capacity a new queue starts with, `None` when unbounded.
    pub fn initial_capacity(&self) -> Option<usize> {
        match *self {
            CapacityPolicy::Fixed { capacity: 0 } => None,
            CapacityPolicy::Fixed { capacity } => Some(capacity),
            CapacityPolicy::Linear { initial, .. } => Some(initial),
        }
    }

    /// Returns the capacity to use after `full_events` consecutive full offers at
    /// `current` capacity.
    pub fn next_capacity(&self, current: usize, full_events: usize) -> usize {
        match *self {
            CapacityPolicy::Fixed { .. } => current,
            CapacityPolicy::Linear { max, variation, .. } => {
                if full_events < variation || (max > 0 && current >= max) {
                    current
                } else {
                    current + 1
                }
            }
        }
    }
}

pub struct AdaptiveQueue<T> {
    policy: CapacityPolicy,
    state: Mutex<State<T>>,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
    full_events: usize,
    closed: bool,
}

impl<T> AdaptiveQueue<T> {
    pub fn new(policy: CapacityPolicy) -> AdaptiveQueue<T> {
        AdaptiveQueue {
            policy,
            state: Mutex::new(State {
                items: VecDeque::new(),
                capacity: policy.initial_capacity(),
                full_events: 0,
                closed: false,
            }),
        }
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// Pushes the item if there is room, counting a full event (and possibly growing)
    /// the first time a given offer finds the queue full.
    fn try_push(&self, item: T, first_attempt: bool) -> Result<(), OfferError<T>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(OfferError::Closed(item));
        }
        let Some(capacity) = state.capacity else {
            state.items.push_back(item);
            return Ok(());
        };
        if state.items.len() < capacity {
            if first_attempt {
                state.full_events = 0;
            }
            state.items.push_back(item);
            return Ok(());
        }
        if first_attempt {
            state.full_events += 1;
            let grown = self.policy.next_capacity(capacity, state.full_events);
            if grown > capacity {
                log::trace!("adaptive queue capacity {capacity} -> {grown}");
                state.capacity = Some(grown);
                state.full_events = 0;
                state.items.push_back(item);
                return Ok(());
            }
        }
        Err(OfferError::Timeout(item))
    }
}

impl<T: Send> ChunkQueue<T> for AdaptiveQueue<T> {
    fn offer(&self, item: T, timeout: Option<Duration>) -> Result<(), OfferError<T>> {
        let deadline = queue::deadline(timeout);
        let mut backoff = Backoff::default();
        let mut item = item;
        let mut first_attempt = true;
        loop {
            match self.try_push(item, first_attempt) {
                Err(OfferError::Timeout(rejected)) => item = rejected,
                res => return res,
            }
            first_attempt = false;
            if expired(deadline) {
                return Err(OfferError::Timeout(item));
            }
            backoff.snooze();
        }
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<T, PollError> {
        let deadline = queue::deadline(timeout);
        let mut backoff = Backoff::default();
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(item) = state.items.pop_front() {
                    return Ok(item);
                }
                if state.closed {
                    return Err(PollError::Closed);
                }
            }
            if expired(deadline) {
                return Err(PollError::Timeout);
            }
            backoff.snooze();
        }
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn clear(&self) {
        self.state.lock().unwrap().items.clear();
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.state.lock().unwrap().capacity
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[derive(Default)]
struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 16;

    fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                std::hint::spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_micros(100));
        }
        self.step = self.step.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_policy_constructors() {
        assert_eq!(CapacityPolicy::unbounded().initial_capacity(), None);
        assert_eq!(CapacityPolicy::fixed(8).initial_capacity(), Some(8));
        assert_eq!(CapacityPolicy::linear(0, 10, 0).initial_capacity(), Some(1));
        assert_eq!(
            CapacityPolicy::linear(1, 10, 0),
            CapacityPolicy::Linear {
                initial: 1,
                max: 10,
                variation: 1
            }
        );
    }

    #[test]
    fn test_linear_growth_steps() {
        let policy = CapacityPolicy::linear(1, 3, 2);
        assert_eq!(policy.next_capacity(1, 1), 1);
        assert_eq!(policy.next_capacity(1, 2), 2);
        assert_eq!(policy.next_capacity(3, 2), 3);
        let unlimited = CapacityPolicy::linear(1, 0, 1);
        assert_eq!(unlimited.next_capacity(1000, 1), 1001);
        assert_eq!(CapacityPolicy::fixed(4).next_capacity(4, 100), 4);
    }

    #[test]
    fn test_queue_grows_under_pressure() {
        let q = AdaptiveQueue::new(CapacityPolicy::linear(1, 2, 2));
        q.offer(1, Some(Duration::ZERO)).unwrap();
        assert_eq!(
            q.offer(2, Some(Duration::ZERO)),
            Err(OfferError::Timeout(2))
        );
        q.offer(3, Some(Duration::ZERO)).unwrap();
        assert_eq!(q.capacity(), Some(2));
        assert_eq!(q.len(), 2);

        // The maximum has been reached.
        for _ in 0..4 {
            assert!(q.offer(4, Some(Duration::ZERO)).is_err());
        }
        assert_eq!(q.capacity(), Some(2));
        assert_eq!(q.poll(None).unwrap(), 1);
        assert_eq!(q.poll(None).unwrap(), 3);
    }

    #[test]
    fn test_fixed_queue_times_out() {
        let q = AdaptiveQueue::new(CapacityPolicy::fixed(1));
        q.offer('a', None).unwrap();
        let started = Instant::now();
        assert_eq!(
            q.offer('b', Some(Duration::from_millis(30))),
            Err(OfferError::Timeout('b'))
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(
            AdaptiveQueue::<u8>::new(CapacityPolicy::fixed(1)).poll(Some(Duration::ZERO)),
            Err(PollError::Timeout)
        );
    }

    #[test]
    fn test_producer_consumer_order() {
        let q = Arc::new(AdaptiveQueue::new(CapacityPolicy::linear(1, 16, 4)));
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    q.offer(i, Some(Duration::from_secs(10))).unwrap();
                }
                q.close();
            })
        };
        let mut received = Vec::new();
        loop {
            match q.poll(Some(Duration::from_secs(10))) {
                Ok(v) => received.push(v),
                Err(PollError::Closed) => break,
                Err(e) => panic!("unexpected {e}"),
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0..2000).collect::<Vec<_>>());
        assert!(q.capacity().unwrap() <= 16);
    }

    #[test]
    fn test_close_rejects_offers() {
        let q = AdaptiveQueue::new(CapacityPolicy::unbounded());
        q.offer(1, None).unwrap();
        q.close();
        assert!(q.is_closed());
        assert_eq!(q.offer(2, None), Err(OfferError::Closed(2)));
        assert_eq!(q.poll(None), Ok(1));
        assert_eq!(q.poll(None), Err(PollError::Closed));
    }
}
