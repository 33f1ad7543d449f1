//! Single-value hand-off between a task and whoever waits for it.
//!
//! The channel moves through `Pending -> Ready -> Consumed`. Dropping the sender while
//! still pending moves it to `Abandoned`, which wakes the receiver so it never waits for
//! a value that cannot arrive.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::Instant,
};

pub fn channel<T>() -> (OneshotSender<T>, OneshotReceiver<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(State::Pending),
        ready: Condvar::new(),
    });
    (OneshotSender(slot.clone()), OneshotReceiver(slot))
}

/// Creates a receiver that already holds `value`.
pub fn ready<T>(value: T) -> OneshotReceiver<T> {
    OneshotReceiver(Arc::new(Slot {
        state: Mutex::new(State::Ready(value)),
        ready: Condvar::new(),
    }))
}

/// What a receiver observed.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Value(T),
    /// The sender went away without sending.
    Abandoned,
    /// The value was already taken.
    Consumed,
    /// The deadline passed while the channel was still pending.
    TimedOut,
}

pub struct OneshotSender<T>(Arc<Slot<T>>);

impl<T> OneshotSender<T> {
    /// Delivers the value. Fails with the value if the receiver side is no longer
    /// pending.
    pub fn send(self, value: T) -> Result<(), T> {
        let res = {
            let mut state = self.0.state.lock().unwrap();
            if matches!(*state, State::Pending) {
                *state = State::Ready(value);
                Ok(())
            } else {
                Err(value)
            }
        };
        self.0.ready.notify_all();
        res
    }
}

impl<T> Drop for OneshotSender<T> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        if matches!(*state, State::Pending) {
            *state = State::Abandoned;
            drop(state);
            self.0.ready.notify_all();
        }
    }
}

pub struct OneshotReceiver<T>(Arc<Slot<T>>);

impl<T> OneshotReceiver<T> {
    pub fn is_pending(&self) -> bool {
        matches!(*self.0.state.lock().unwrap(), State::Pending)
    }

    /// Blocks until the channel leaves the pending state.
    pub fn recv(&self) -> Received<T> {
        let guard = self.0.state.lock().unwrap();
        let mut guard = self
            .0
            .ready
            .wait_while(guard, |s| matches!(s, State::Pending))
            .unwrap();
        guard.take()
    }

    /// Blocks until the channel leaves the pending state or `deadline` passes.
    pub fn recv_deadline(&self, deadline: Instant) -> Received<T> {
        let mut guard = self.0.state.lock().unwrap();
        loop {
            if !matches!(*guard, State::Pending) {
                return guard.take();
            }
            let now = Instant::now();
            if now >= deadline {
                return Received::TimedOut;
            }
            guard = self.0.ready.wait_timeout(guard, deadline - now).unwrap().0;
        }
    }
}

struct Slot<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

enum State<T> {
    Pending,
    Ready(T),
    Abandoned,
    Consumed,
}

impl<T> State<T> {
    fn take(&mut self) -> Received<T> {
        match std::mem::replace(self, State::Consumed) {
            State::Ready(value) => Received::Value(value),
            State::Abandoned => {
                *self = State::Abandoned;
                Received::Abandoned
            }
            State::Consumed => Received::Consumed,
            State::Pending => {
                *self = State::Pending;
                Received::TimedOut
            }
        }
    }
}
