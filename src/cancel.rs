//! Operator cancellation.
//!
//! SIGINT and SIGTERM set a shared flag; the pipeline polls it between units of
//! work and before every commit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::IngestError;

/// Exit status when the operator interrupts twice.
pub const SECOND_SIGNAL_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<(), IngestError> {
        if self.is_cancelled() {
            Err(IngestError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Route SIGINT and SIGTERM to this flag.
    ///
    /// The first signal sets the flag; a second one, arriving while the flag is
    /// already set, exits the process with `SECOND_SIGNAL_EXIT_CODE`.
    pub fn install_signal_handlers(&self) -> Result<(), IngestError> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            // Registered first so it sees the flag before this signal sets it.
            signal_hook::flag::register_conditional_shutdown(signal, SECOND_SIGNAL_EXIT_CODE, Arc::clone(&self.0))
                .and_then(|_| signal_hook::flag::register(signal, Arc::clone(&self.0)))
                .map_err(|e| IngestError::config(format!("failed to install signal handler: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let worker = flag.clone();
        assert!(worker.check().is_ok());
        flag.cancel();
        assert!(worker.is_cancelled());
        assert_eq!(worker.check().unwrap_err().kind(), "cancelled");
    }
}
