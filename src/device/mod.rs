//! Device telemetry engine.
//!
//! ```text
//!   DeviceLink (transport port) ──▶ handshake ──▶ AttributePoller × N ──▶ TelemetryAggregator
//! ```
//!
//! The transport is abstracted behind [`DeviceLink`] so the engine runs the
//! same against a real GATT connection or [`sim::SimulatedDevice`].

pub mod command;
pub mod decode;
pub mod handshake;
pub mod poller;
pub mod sim;
pub mod telemetry;

use futures_util::future::BoxFuture;
use std::fmt;

use crate::error::DeviceError;

pub const SERVICE_UUID: &str = "06caf9c0-74d3-454f-9be9-e30cd999c17a";
pub const MODEL_INFORMATION_UUID: &str = "00002a24-0000-1000-8000-00805f9b34fb";
pub const ATTRIBUTE_PREFIX: &str = "f9a98c15-c651-4f34-b656-d100bf5800";

/// Attribute suffixes appended to [`ATTRIBUTE_PREFIX`].
pub mod characteristic {
    pub const ACCESS_KEY: u8 = 0xe0;
    pub const COMMAND: u8 = 0x40;
    pub const BATTERY_SOC: u8 = 0x20;
    pub const BATTERY_VOLTAGE: u8 = 0x21;
    pub const OPERATING_STATE: u8 = 0x22;
    pub const STATE_ELAPSED_TIME: u8 = 0x23;
    pub const STATE_TOTAL_TIME: u8 = 0x24;
    pub const HEATER_TEMP: u8 = 0x25;
    pub const ACTIVE_LED_COLOR: u8 = 0x27;
    pub const HEATER_POWER: u8 = 0x28;
    pub const HEATER_DUTY: u8 = 0x29;
    pub const HEATER_VOLTAGE: u8 = 0x2a;
    pub const HEATER_CURRENT: u8 = 0x2b;
    pub const SAFETY_THERMAL_EST_TEMP: u8 = 0x2c;
    pub const HEATER_RESISTANCE: u8 = 0x2d;
    pub const BATTERY_CHARGE_CURRENT: u8 = 0x2e;
    pub const TOTAL_HEAT_CYCLES: u8 = 0x2f;
    pub const TOTAL_HEAT_CYCLE_TIME: u8 = 0x30;
    pub const BATTERY_CHARGE_STATE: u8 = 0x31;
    pub const BATTERY_CHARGE_ELAPSED_TIME: u8 = 0x32;
    pub const BATTERY_CHARGE_EST_TIME_TO_FULL: u8 = 0x33;
    pub const BATTERY_TEMP: u8 = 0x34;
    pub const UPTIME: u8 = 0x35;
    pub const INPUT_CURRENT: u8 = 0x37;
    pub const BATTERY_CAPACITY: u8 = 0x38;
    pub const BATTERY_CURRENT: u8 = 0x39;
    pub const APPROX_DABS_REMAINING: u8 = 0x3a;
    pub const DABS_PER_DAY: u8 = 0x3b;
    pub const RAW_HEATER_TEMP: u8 = 0x3c;
    pub const RAW_HEATER_TEMP_COMMAND: u8 = 0x3d;
    pub const BATTERY_CHARGE_SOURCE: u8 = 0x3e;
    pub const CHAMBER_TYPE: u8 = 0x3f;
    pub const MODE_COMMAND: u8 = 0x40;
    pub const STEALTH_MODE: u8 = 0x42;
    pub const TEMPERATURE_OVERRIDE: u8 = 0x45;
    pub const LANTERN_COLOR: u8 = 0x48;
    pub const LED_BRIGHTNESS: u8 = 0x4b;
    pub const DEVICE_NAME: u8 = 0x4d;
    pub const DEVICE_BIRTHDAY: u8 = 0x4e;
    pub const TRIP_HEAT_CYCLES: u8 = 0x51;
    pub const TRIP_HEAT_CYCLE_TIME: u8 = 0x52;
    pub const HEAT_CYCLE_COUNT: u8 = 0x60;
    pub const PROFILE_NAME: u8 = 0x62;
    pub const PROFILE_COLOR: u8 = 0x65;
}

/// Full attribute UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeId(String);

impl AttributeId {
    pub fn from_suffix(suffix: u8) -> Self {
        Self(format!("{ATTRIBUTE_PREFIX}{suffix:02x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport port to one connected device. Implementations must tolerate
/// reads from several pollers at once; writes to the same attribute are
/// never issued concurrently by this crate.
pub trait DeviceLink: Send + Sync + 'static {
    fn read<'a>(&'a self, attribute: &'a AttributeId) -> BoxFuture<'a, Result<Vec<u8>, DeviceError>>;

    fn write<'a>(
        &'a self,
        attribute: &'a AttributeId,
        value: &'a [u8],
    ) -> BoxFuture<'a, Result<(), DeviceError>>;

    /// Release the underlying connection.
    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}
