//! Shared resource pool.
//!
//! # Responsibilities
//! - Bound the number of concurrent borrowers across all subsystems
//! - Hand out RAII guards that return capacity on drop
//!
//! The size is fixed at construction, so sizing always precedes creation.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("resource pool is closed")]
    Closed,
}

/// Semaphore-bounded pool shared by every subsystem.
#[derive(Debug)]
pub struct ResourcePool {
    size: usize,
    permits: Arc<Semaphore>,
}

impl ResourcePool {
    /// Create a pool with `size` slots.
    pub fn with_size(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Configured number of slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently borrowed.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Borrow a slot, waiting if the pool is exhausted.
    pub async fn acquire(&self) -> Result<PoolGuard, PoolError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(PoolGuard { _permit: permit })
    }

    /// Borrow a slot without waiting.
    pub fn try_acquire(&self) -> Option<PoolGuard> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| PoolGuard { _permit: permit })
    }
}

/// A borrowed pool slot, returned on drop.
#[derive(Debug)]
pub struct PoolGuard {
    _permit: OwnedSemaphorePermit,
}
