//! Threading utilities for the data layer.
//!
//! # Key Components
//!
//! ## Thread Pool
//!
//! - [`thread_pool::ThreadPool`] - A fixed-size pool with fail-fast admission: once
//!   `threads + queue_limit` tasks are in flight, further submissions are rejected
//!   instead of queued.
//! - [`join_handle::JoinHandle`] - Waits for a task result, optionally with a deadline.
//!   Every way a bounded wait can fail is reported as a single `Timeout` error.
//!
//! ## Chunk Queues
//!
//! - [`queue::ChunkQueue`] - The single-producer/single-consumer queue interface used by
//!   the piped byte channel.
//! - [`blocking_queue::BlockingQueue`] - Bounded queue that parks the producer when full
//!   and the consumer when empty.
//! - [`adaptive_queue::AdaptiveQueue`] - Non-parking queue whose capacity grows under a
//!   [`adaptive_queue::CapacityPolicy`].

pub mod adaptive_queue;
pub mod blocking_queue;
pub mod join_handle;
pub mod oneshot;
pub mod queue;
pub mod thread_pool;

pub use adaptive_queue::{AdaptiveQueue, CapacityPolicy};
pub use blocking_queue::BlockingQueue;
pub use join_handle::JoinHandle;
pub use queue::{ChunkQueue, OfferError, PollError};
pub use thread_pool::ThreadPool;
