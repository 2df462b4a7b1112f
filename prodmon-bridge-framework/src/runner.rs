//! Bridge runner for lifecycle management.

use prodmon_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::mqtt::{self, MqttConnection};
use crate::scheduler::{PollTarget, Scheduler, SchedulerExit};
use crate::shutdown::shutdown_channel;
use crate::status::StatusPublisher;
use crate::supervisor::{ConnectionSupervisor, ReconnectPolicy};
use crate::transport::ConnectionDriver;

/// Transport steps serviced after the offline status so it leaves the client.
const FLUSH_STEPS: usize = 8;

/// Bridge runner that manages the lifecycle of a polling bridge.
///
/// Handles:
/// - MQTT connection (the initial connect must succeed)
/// - Running the scheduler until Ctrl+C or reconnect exhaustion
/// - Status publishing (when `mqtt.status_topic` is set)
///
/// # Example
///
/// ```ignore
/// use prodmon_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, init_logging};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("/etc/prodmon/mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///     init_logging(config.logging(), Some(&args))?;
///     let devices = build_devices(&config)?;
///
///     let runner = BridgeRunner::new("mybridge", config).await?;
///     runner.run(devices).await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// The loaded configuration.
    config: C,
    /// Dispatcher over the MQTT publish half.
    dispatcher: Dispatcher,
    /// MQTT event loop.
    connection: MqttConnection,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner.
    ///
    /// Logging must already be initialized (see [`init_logging`]). This will:
    /// 1. Connect to the MQTT broker
    /// 2. Create the dispatcher
    pub async fn new(name: impl Into<String>, config: C) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION");

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let mqtt_config = config.mqtt();
        let (publisher, mut connection) = mqtt::transport(mqtt_config);

        connection
            .connect()
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))?;

        tracing::info!(
            host = %mqtt_config.host,
            port = mqtt_config.port,
            "Connected to MQTT broker"
        );

        let dispatcher = Dispatcher::new(Box::new(publisher), mqtt_config.qos);
        let status_publisher = mqtt_config
            .status_topic
            .as_ref()
            .map(|topic| StatusPublisher::new(topic, &name, version));

        Ok(Self {
            name,
            config,
            dispatcher,
            connection,
            status_publisher,
        })
    }

    /// Run the bridge over `targets` until Ctrl+C or reconnect exhaustion.
    ///
    /// This will:
    /// 1. Publish "running" status (if enabled)
    /// 2. Run the scheduler
    /// 3. On Ctrl+C, publish "offline" status (if enabled) and return `Ok`
    /// 4. On reconnect exhaustion, return [`BridgeError::ReconnectExhausted`]
    pub async fn run<T: PollTarget>(self, targets: Vec<T>) -> Result<()> {
        let Self {
            name,
            config,
            mut dispatcher,
            connection,
            status_publisher,
        } = self;

        let names: Vec<String> = targets.iter().map(|t| t.name().to_string()).collect();
        tracing::debug!(qos = ?dispatcher.qos(), "Dispatcher ready");

        if let Some(ref status_pub) = status_publisher {
            status_pub.publish_running(
                &mut dispatcher,
                Some(serde_json::json!({ "devices": names })),
            );
        }

        let (trigger, signal) = shutdown_channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received shutdown signal");
                    trigger.trigger();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        });

        let supervisor = ConnectionSupervisor::new(ReconnectPolicy::from(&config.mqtt().reconnect));
        let mut scheduler = Scheduler::new(targets, dispatcher, connection, supervisor);

        tracing::info!(
            bridge = %name,
            devices = names.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        let exit = scheduler.run(&signal).await;

        let stats = scheduler.dispatcher().stats();
        tracing::info!(
            sent = stats.success,
            dropped = stats.failed,
            "Dispatch totals"
        );

        match exit {
            SchedulerExit::Shutdown => {
                if let Some(ref status_pub) = status_publisher {
                    status_pub.publish_offline(scheduler.dispatcher());
                    for _ in 0..FLUSH_STEPS {
                        if scheduler.service_events().await.is_some() {
                            break;
                        }
                    }
                }
                tracing::info!(bridge = %name, "Goodbye!");
                Ok(())
            }
            SchedulerExit::ReconnectExhausted { attempts } => {
                tracing::error!(
                    bridge = %name,
                    attempts,
                    "MQTT broker unreachable, stopping bridge"
                );
                Err(BridgeError::ReconnectExhausted { attempts })
            }
        }
    }
}

/// Initialize tracing from the bridge's logging config and CLI override.
pub fn init_logging(config: &LoggingConfig, args: Option<&BridgeArgs>) -> Result<()> {
    init_tracing(&log_config(config, args)).map_err(|e| BridgeError::config(e.to_string()))
}

/// Logging config with the CLI `--log-level` override applied.
fn log_config(config: &LoggingConfig, args: Option<&BridgeArgs>) -> LoggingConfig {
    match args.and_then(|a| a.log_level.as_ref()) {
        Some(level) => LoggingConfig {
            level: level.clone(),
            format: config.format,
        },
        None => config.clone(),
    }
}

/// Convenience function to run a bridge with minimal boilerplate.
///
/// Loads the configuration, initializes logging, lets `build` turn the
/// configuration into poll targets, connects, then runs the bridge.
/// Configuration failures are logged at error level before the error is
/// returned, and before anything touches the network.
///
/// # Example
///
/// ```ignore
/// use prodmon_bridge_framework::run_bridge;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_bridge::<MyBridgeConfig, _, _>("mybridge", "/etc/prodmon/mybridge.json5", |config| {
///         build_devices(config)
///     })
///     .await
/// }
/// ```
pub async fn run_bridge<C, T, F>(
    name: &str,
    default_config: &'static str,
    build: F,
) -> anyhow::Result<()>
where
    C: BridgeConfig,
    T: PollTarget,
    F: FnOnce(&C) -> Result<Vec<T>>,
{
    let args = BridgeArgs::parse_with_default(default_config);

    let config = match C::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // The file's logging section is unavailable; report with defaults.
            let _ = init_logging(&LoggingConfig::default(), Some(&args));
            tracing::error!(config = %args.config.display(), error = %e, "Invalid configuration");
            return Err(anyhow::anyhow!("{}", e));
        }
    };

    init_logging(config.logging(), Some(&args)).map_err(|e| anyhow::anyhow!("{}", e))?;
    tracing::info!(config = %args.config.display(), "Loaded configuration");

    let targets = match build(&config) {
        Ok(targets) => targets,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(anyhow::anyhow!("{}", e));
        }
    };

    let runner = match BridgeRunner::new(name, config).await {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start bridge");
            return Err(anyhow::anyhow!("{}", e));
        }
    };

    runner.run(targets).await.map_err(|e| anyhow::anyhow!("{}", e))
}
