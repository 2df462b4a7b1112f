//! The main polling loop.

use std::future::Future;

use crate::dispatcher::Dispatcher;
use crate::shutdown::ShutdownSignal;
use crate::supervisor::{ConnectionSupervisor, SupervisorState};
use crate::transport::{ConnectionDriver, ConnectionEvent};

/// Something the scheduler visits once per tick, in configuration order.
pub trait PollTarget {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Poll every tag that is due, dispatching whatever changed.
    fn poll(&mut self, dispatcher: &mut Dispatcher) -> impl Future<Output = ()>;
}

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// A graceful stop was requested.
    Shutdown,
    /// The broker could not be reached within the reconnect budget.
    ReconnectExhausted { attempts: u32 },
}

/// Single-threaded loop over targets and the transport event loop.
///
/// The loop has no sleep of its own. Each tag skips itself until its cadence
/// is due, and the transport step is bounded by its own timeout.
pub struct Scheduler<T, C> {
    targets: Vec<T>,
    dispatcher: Dispatcher,
    connection: C,
    supervisor: ConnectionSupervisor,
}

impl<T: PollTarget, C: ConnectionDriver> Scheduler<T, C> {
    /// Create a scheduler over connected transport halves.
    pub fn new(
        targets: Vec<T>,
        dispatcher: Dispatcher,
        connection: C,
        supervisor: ConnectionSupervisor,
    ) -> Self {
        Self {
            targets,
            dispatcher,
            connection,
            supervisor,
        }
    }

    /// The targets, in visiting order.
    pub fn targets(&self) -> &[T] {
        &self.targets
    }

    /// The dispatcher shared by every target.
    pub fn dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Run until shutdown is signaled or reconnecting is exhausted.
    pub async fn run(&mut self, shutdown: &ShutdownSignal) -> SchedulerExit {
        tracing::info!(targets = self.targets.len(), "Scheduler running");

        loop {
            if shutdown.is_triggered() {
                return SchedulerExit::Shutdown;
            }

            if let Some(exit) = self.tick().await {
                return exit;
            }
        }
    }

    /// Visit every target once, then service one transport step.
    pub async fn tick(&mut self) -> Option<SchedulerExit> {
        for target in &mut self.targets {
            target.poll(&mut self.dispatcher).await;
        }

        self.service_events().await
    }

    /// Service one iteration of the transport's event loop.
    pub async fn service_events(&mut self) -> Option<SchedulerExit> {
        match self.connection.step().await {
            ConnectionEvent::Idle | ConnectionEvent::Activity => None,
            ConnectionEvent::Connected { code } => {
                self.supervisor.on_connect(code);
                None
            }
            ConnectionEvent::Disconnected { reason } => {
                match self
                    .supervisor
                    .on_disconnect(&mut self.connection, &reason)
                    .await
                {
                    SupervisorState::Exhausted { attempts } => {
                        Some(SchedulerExit::ReconnectExhausted { attempts })
                    }
                    _ => None,
                }
            }
        }
    }
}
