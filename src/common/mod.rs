//! Shared infrastructure borrowed by every subsystem.
//!
//! # Data Flow
//! ```text
//! Dependency initializer (lifecycle/startup.rs) creates, in order:
//!     → pool.rs (ResourcePool, sized from the run mode)
//!     → store.rs (ConfigStore: connect, then init_databases)
//!     → [plugins register tables and event handlers]
//!     → mqueue.rs (MessageQueue, outbound messages)
//!
//! pubsub.rs (EventBus) is created with the store and polled by a
//! background task for the whole process lifetime.
//!
//! stop.rs (StopSignal) is the one-shot stop trigger used by long-running
//! loops.
//! ```
//!
//! # Design Decisions
//! - Created once, never recreated; subsystems hold `Arc`s, never close them
//! - Each type does its own internal locking

pub mod mqueue;
pub mod pool;
pub mod pubsub;
pub mod stop;
pub mod store;

pub use mqueue::{MessageQueue, OutboundMessage};
pub use pool::{PoolError, PoolGuard, ResourcePool};
pub use pubsub::{Event, EventBus, EventPollerHandle};
pub use stop::StopSignal;
pub use store::{ConfigStore, StoreError};
