//! muxpool — Bounded Object-Pool Pipeline Fabric
//!
//! Pipeline stages never share mutable state directly; they exchange
//! ownership of pooled work items through a [`SystemResource`]: a fixed set
//! of reusable wrappers multiplexed between an empty-side and a full-side
//! muxing queue. Each queue pairs a rank-ordered ring of pending wrappers
//! with a FIFO ring of idle workers and dispatches whenever both sides are
//! non-empty.
//!
//! # Key properties
//!
//! - Zero-allocation steady state: wrappers, rings and FIFOs are sized at
//!   construction
//! - Rank-ordered dispatch: producers assign a 64-bit rank; each stage
//!   consumes pending work in non-decreasing rank order
//! - At-most-one consumer per item: tokens are unique capabilities, and a
//!   released-sentinel live count catches double release
//! - Blocking only on counting semaphores; every other path is a short
//!   mutex-protected critical section
//!
//! # Example
//!
//! ```
//! use muxpool::{ResourceConfig, SystemResource};
//!
//! let resource = SystemResource::new(ResourceConfig::new(4, 1, 1), || 0u64).unwrap();
//! let producer = resource.register_producer().unwrap();
//! let consumer = resource.register_consumer().unwrap();
//!
//! // Producer: fetch a recycled wrapper, fill it, post it full.
//! let mut token = producer.get_empty().unwrap();
//! *token.payload_mut() = 42;
//! token.set_rank(7);
//! token.post_full().unwrap();
//!
//! // Consumer: block for work, process, release for reuse.
//! let token = consumer.get_full().unwrap();
//! assert_eq!(*token.payload(), 42);
//! token.release();
//! ```

mod config;
mod fifo;
mod invariants;
mod queue;
mod resource;
mod ring;
mod semaphore;

pub use config::ResourceConfig;
pub use fifo::WaitStatsSnapshot;
pub use resource::{
    ConsumerPort, ObjectRef, ProducerPort, ResourceError, SystemResource, WrapperId, WrapperToken,
    RELEASED_SENTINEL,
};
pub use ring::OrderedRing;
