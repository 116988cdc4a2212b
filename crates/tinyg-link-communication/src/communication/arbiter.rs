//! Link arbiter
//!
//! A single gate in front of the [`Channel`]. Writers and the reader task take
//! turns; nothing touches the channel without holding the gate.

use super::Channel;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use tinyg_link_core::{ConnectionError, Result};
use tokio::sync::{Mutex, MutexGuard};

/// Mutual exclusion over the channel
///
/// Backed by `tokio::sync::Mutex`, which hands the lock out in FIFO order.
pub struct LinkArbiter {
    channel: Mutex<Box<dyn Channel>>,
    closed: AtomicBool,
}

/// Exclusive access to the channel, released on drop
pub struct LinkGuard<'a> {
    guard: MutexGuard<'a, Box<dyn Channel>>,
}

impl Deref for LinkGuard<'_> {
    type Target = dyn Channel;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for LinkGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

impl LinkArbiter {
    /// Take ownership of an open channel
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            channel: Mutex::new(channel),
            closed: AtomicBool::new(false),
        }
    }

    /// Wait for exclusive access
    pub async fn acquire(&self) -> Result<LinkGuard<'_>> {
        let guard = self.channel.lock().await;
        if self.is_closed() {
            return Err(ConnectionError::NotConnected.into());
        }
        Ok(LinkGuard { guard })
    }

    /// Take exclusive access only if nobody holds it right now
    pub fn try_acquire(&self) -> Result<Option<LinkGuard<'_>>> {
        if self.is_closed() {
            return Err(ConnectionError::NotConnected.into());
        }
        Ok(self.channel.try_lock().ok().map(|guard| LinkGuard { guard }))
    }

    /// Run `operation` with exclusive access
    ///
    /// The gate is released before an error from `operation` propagates.
    pub async fn with_link<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Channel) -> Result<T>,
    {
        let mut link = self.acquire().await?;
        operation(&mut *link)
    }

    /// Close the channel; later acquisitions fail with `NotConnected`
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.channel.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Closing channel {}", guard.name());
        guard.close().map_err(ConnectionError::from)?;
        Ok(())
    }

    /// Whether [`LinkArbiter::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
