//! prodmon bridge for PLC tag polling.
//!
//! Polls controllers for configured tags and publishes changes to MQTT.

use prodmon_bridge_framework::run_bridge;
use prodmon_bridge_plc::{PlcBridgeConfig, build_devices};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    run_bridge::<PlcBridgeConfig, _, _>("plc", "/etc/prodmon/plc.json5", build_devices).await
}
