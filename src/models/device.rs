use serde::{Deserialize, Serialize};

/// Where the device is drawing charge from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeSource {
    Usb,
    Wireless,
    None,
    Unknown(u8),
}

impl ChargeSource {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChargeSource::Usb,
            1 => ChargeSource::Wireless,
            3 => ChargeSource::None,
            other => ChargeSource::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ChargeSource::Usb => 0,
            ChargeSource::Wireless => 1,
            ChargeSource::None => 3,
            ChargeSource::Unknown(other) => other,
        }
    }
}

// On the wire the charge source is the bare numeric code.
impl Serialize for ChargeSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ChargeSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(ChargeSource::from_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Sparse device attribute map. Used both as the accumulated snapshot and
/// as the delta broadcast to the gateway with `SendDeviceState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_source: Option<ChargeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_color: Option<LedColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_dabs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl DeviceState {
    pub fn is_empty(&self) -> bool {
        *self == DeviceState::default()
    }

    /// Fold `delta` into `self`, returning the part of `delta` that actually
    /// changed something. Keys are never removed.
    pub fn merge(&mut self, delta: &DeviceState) -> DeviceState {
        fn apply<T: Clone + PartialEq>(slot: &mut Option<T>, incoming: &Option<T>) -> Option<T> {
            match incoming {
                Some(value) if slot.as_ref() != Some(value) => {
                    *slot = Some(value.clone());
                    Some(value.clone())
                }
                _ => None,
            }
        }

        DeviceState {
            battery: apply(&mut self.battery, &delta.battery),
            temperature: apply(&mut self.temperature, &delta.temperature),
            charge_source: apply(&mut self.charge_source, &delta.charge_source),
            state: apply(&mut self.state, &delta.state),
            active_color: apply(&mut self.active_color, &delta.active_color),
            total_dabs: apply(&mut self.total_dabs, &delta.total_dabs),
            profile_name: apply(&mut self.profile_name, &delta.profile_name),
            device_name: apply(&mut self.device_name, &delta.device_name),
        }
    }
}
