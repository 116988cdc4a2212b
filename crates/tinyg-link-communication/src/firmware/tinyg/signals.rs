//! Link signals
//!
//! State shared between the caller and the reader task of one link:
//! - fault: raised when the controller reports a hard stop, never cleared
//!   for the life of the link
//! - completion: pending while a command is in flight, set complete by the
//!   reader once the channel has gone quiet
//! - liveness: set while the link is open; the reader exits when it clears

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tinyg_link_core::{ProtocolError, Result};
use tokio::sync::watch;

/// Fault, completion and liveness flags for one link
#[derive(Debug)]
pub struct LinkSignals {
    faulted: AtomicBool,
    fault_reason: Mutex<Option<String>>,
    alive: AtomicBool,
    completion: watch::Sender<bool>,
}

impl Default for LinkSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkSignals {
    /// Clear fault, completion already satisfied, not yet alive
    pub fn new() -> Self {
        let (completion, _) = watch::channel(true);
        Self {
            faulted: AtomicBool::new(false),
            fault_reason: Mutex::new(None),
            alive: AtomicBool::new(false),
            completion,
        }
    }

    /// Raise the fault signal and release anyone waiting for completion
    ///
    /// The first reason is kept; later ones are logged only.
    pub fn raise_fault(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut slot = self.fault_reason.lock();
            if slot.is_none() {
                tracing::error!("Link fault raised: {}", reason);
                *slot = Some(reason);
            } else {
                tracing::debug!("Additional fault after first: {}", reason);
            }
        }
        self.faulted.store(true, Ordering::SeqCst);
        self.mark_complete();
    }

    /// Check if the fault signal is raised
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Diagnostic recorded with the fault
    pub fn fault_reason(&self) -> Option<String> {
        self.fault_reason.lock().clone()
    }

    /// Fail with `ProtocolError::Faulted` if the fault signal is raised
    pub fn ensure_clear(&self) -> Result<()> {
        if self.is_faulted() {
            return Err(self.fault_error());
        }
        Ok(())
    }

    /// The error reported to callers of a faulted link
    pub fn fault_error(&self) -> tinyg_link_core::Error {
        ProtocolError::Faulted {
            reason: self
                .fault_reason()
                .unwrap_or_else(|| "fault signal raised".to_string()),
        }
        .into()
    }

    /// Mark the link open
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Check if the link is open
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// A command is about to be written
    pub fn mark_pending(&self) {
        self.completion.send_replace(false);
    }

    /// The last command is considered finished
    pub fn mark_complete(&self) {
        self.completion.send_replace(true);
    }

    /// Check if no command is in flight
    pub fn is_complete(&self) -> bool {
        *self.completion.borrow()
    }

    /// Wait until completion is signalled, optionally bounded
    ///
    /// Returns as soon as completion is set, including by a fault; callers
    /// check the fault signal afterwards.
    pub async fn wait_complete(&self, timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.completion.subscribe();
        let wait = async move {
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.wait_for(|complete| *complete).await;
        };

        match timeout {
            None => {
                wait.await;
                Ok(())
            }
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                ProtocolError::CompletionTimeout {
                    timeout_ms: limit.as_millis() as u64,
                }
                .into()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        let signals = LinkSignals::new();
        assert!(!signals.is_faulted());
        assert!(!signals.is_alive());
        assert!(signals.is_complete());
        assert!(signals.ensure_clear().is_ok());
    }

    #[test]
    fn test_fault_keeps_first_reason_and_completes() {
        let signals = LinkSignals::new();
        signals.mark_pending();
        assert!(!signals.is_complete());

        signals.raise_fault("limit switch");
        signals.raise_fault("second");

        assert!(signals.is_faulted());
        assert!(signals.is_complete());
        assert_eq!(signals.fault_reason().as_deref(), Some("limit switch"));
        assert!(signals.ensure_clear().unwrap_err().is_fault());
    }

    #[tokio::test]
    async fn test_wait_released_by_completion() {
        let signals = Arc::new(LinkSignals::new());
        signals.mark_pending();

        let completer = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            completer.mark_complete();
        });

        signals.wait_complete(None).await.unwrap();
        assert!(signals.is_complete());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let signals = LinkSignals::new();
        signals.mark_pending();

        let err = signals
            .wait_complete(Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!signals.is_faulted());
    }
}
