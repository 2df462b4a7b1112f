//! Broker connection supervision.
//!
//! After an unsolicited disconnect the supervisor runs a bounded exponential
//! backoff:
//!
//! ```text
//! Connected ──disconnect──▶ Reconnecting(0, first)
//! Reconnecting(n, d) ──sleep d, connect ok──▶ Connected
//! Reconnecting(n, d) ──connect failed──▶ Reconnecting(n + 1, min(d × rate, max))
//! Reconnecting(max_attempts, _) ──▶ Exhausted (terminal)
//! ```
//!
//! The backoff blocks the calling task: with the broker gone there is nothing
//! useful to poll.

use std::time::Duration;

use prodmon_common::ReconnectConfig;

use crate::transport::ConnectionDriver;

/// Reconnect backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub first_delay: Duration,
    /// Multiplier applied after every failed attempt.
    pub backoff_rate: u32,
    /// Cap on the delay.
    pub max_delay: Duration,
    /// Failed attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            first_delay: Duration::from_secs(config.first_delay_secs),
            backoff_rate: config.backoff_rate,
            max_delay: Duration::from_secs(config.max_delay_secs),
            max_attempts: config.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delay that follows `delay` after a failed attempt.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.backoff_rate).min(self.max_delay)
    }
}

/// Connection state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// The broker session is up.
    Connected,
    /// Waiting `delay` before attempt number `attempt` (0-based).
    Reconnecting { attempt: u32, delay: Duration },
    /// Every attempt failed. Terminal.
    Exhausted { attempts: u32 },
}

/// Watches the connection lifecycle and reconnects with backoff.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    policy: ReconnectPolicy,
    state: SupervisorState,
}

impl ConnectionSupervisor {
    /// Create a supervisor for an already connected transport.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: SupervisorState::Connected,
        }
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Whether the supervisor gave up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, SupervisorState::Exhausted { .. })
    }

    /// Handle a CONNACK seen by the event loop.
    pub fn on_connect(&mut self, code: u8) {
        if code == 0 {
            tracing::info!("Connected to MQTT broker");
            if !self.is_exhausted() {
                self.state = SupervisorState::Connected;
            }
        } else {
            tracing::info!(code, "Failed to connect, return code {}", code);
        }
    }

    /// Handle an unsolicited disconnect by reconnecting with backoff.
    ///
    /// Returns once the connection is back or the attempt budget is spent.
    pub async fn on_disconnect<C: ConnectionDriver>(
        &mut self,
        connection: &mut C,
        reason: &str,
    ) -> SupervisorState {
        if self.is_exhausted() {
            return self.state;
        }

        tracing::warn!(reason = %reason, "Disconnected from MQTT broker");

        let mut attempt = 0;
        let mut delay = self.policy.first_delay;

        while attempt < self.policy.max_attempts {
            self.state = SupervisorState::Reconnecting { attempt, delay };
            tracing::warn!(
                attempt = attempt + 1,
                delay_secs = delay.as_secs_f64(),
                "Reconnecting in {:?}...",
                delay
            );
            tokio::time::sleep(delay).await;

            match connection.connect().await {
                Ok(()) => {
                    tracing::warn!(attempt = attempt + 1, "Reconnected successfully");
                    self.state = SupervisorState::Connected;
                    return self.state;
                }
                Err(e) => {
                    tracing::error!(
                        attempt = attempt + 1,
                        error = %e,
                        "Reconnect failed. Retrying..."
                    );
                }
            }

            delay = self.policy.next_delay(delay);
            attempt += 1;
        }

        tracing::error!(
            attempts = attempt,
            "Reconnect failed after {} attempts. Exiting...",
            attempt
        );
        self.state = SupervisorState::Exhausted { attempts: attempt };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectionEvent, TransportError};

    /// Connection whose `connect` fails a fixed number of times.
    struct Flaky {
        failures_left: u32,
        attempts: u32,
        attempted_at: Vec<tokio::time::Instant>,
    }

    impl Flaky {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: times,
                attempts: 0,
                attempted_at: Vec::new(),
            }
        }
    }

    impl ConnectionDriver for Flaky {
        async fn step(&mut self) -> ConnectionEvent {
            ConnectionEvent::Idle
        }

        async fn connect(&mut self) -> Result<(), TransportError> {
            self.attempts += 1;
            self.attempted_at.push(tokio::time::Instant::now());
            if self.failures_left > 0 {
                self.failures_left -= 1;
                Err(TransportError::Connection("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_delay_sequence_is_capped() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.first_delay;
        let mut seen = vec![delay.as_secs()];
        for _ in 1..policy.max_attempts {
            delay = policy.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60, 60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_on_third_attempt() {
        let mut supervisor = ConnectionSupervisor::new(ReconnectPolicy::default());
        let mut connection = Flaky::failing(2);
        let start = tokio::time::Instant::now();

        let state = supervisor.on_disconnect(&mut connection, "io error").await;

        assert_eq!(state, SupervisorState::Connected);
        assert_eq!(connection.attempts, 3);
        let offsets: Vec<u64> = connection
            .attempted_at
            .iter()
            .map(|t| (*t - start).as_secs())
            .collect();
        // Sleeps of 1s, 2s, 4s before each attempt.
        assert_eq!(offsets, vec![1, 3, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let mut supervisor = ConnectionSupervisor::new(ReconnectPolicy::default());
        let mut connection = Flaky::failing(u32::MAX);

        let state = supervisor.on_disconnect(&mut connection, "io error").await;

        assert_eq!(state, SupervisorState::Exhausted { attempts: 12 });
        assert_eq!(connection.attempts, 12);
        assert!(supervisor.is_exhausted());

        // Terminal: no further attempts are made.
        let state = supervisor.on_disconnect(&mut connection, "io error").await;
        assert_eq!(state, SupervisorState::Exhausted { attempts: 12 });
        assert_eq!(connection.attempts, 12);
    }

    #[test]
    fn test_failed_connack_keeps_state() {
        let mut supervisor = ConnectionSupervisor::new(ReconnectPolicy::default());
        supervisor.on_connect(5);
        assert_eq!(supervisor.state(), SupervisorState::Connected);
    }
}
