//! Explicit shutdown signal observed by the scheduler loop.

use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

/// Requests a graceful stop.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    /// Ask the loop to stop after its current tick.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Observed by the scheduler once per tick.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Whether a stop was requested.
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_observed() {
        let (trigger, signal) = shutdown_channel();
        assert!(!signal.is_triggered());
        trigger.trigger();
        assert!(signal.is_triggered());
        assert!(signal.clone().is_triggered());
    }

    #[test]
    fn test_dropped_trigger_keeps_running() {
        let (trigger, signal) = shutdown_channel();
        drop(trigger);
        assert!(!signal.is_triggered());
    }
}
