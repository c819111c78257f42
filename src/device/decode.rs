use std::fmt;

use crate::error::DeviceError;
use crate::models::device::{ChargeSource, LedColor};

/// Raw attribute bytes -> domain value. `Ok(None)` rejects the reading:
/// the poller emits nothing for it and keeps its previous value.
pub trait Decode: Send + Sync + 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    fn decode(&self, raw: &[u8]) -> Result<Option<Self::Value>, DeviceError>;
}

fn four_bytes(raw: &[u8]) -> Result<[u8; 4], DeviceError> {
    raw.get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| DeviceError::Decode(format!("expected 4 bytes, got {}", raw.len())))
}

/// Numeric attributes are little-endian f32.
pub fn f32_le(raw: &[u8]) -> Result<f32, DeviceError> {
    Ok(f32::from_le_bytes(four_bytes(raw)?))
}

fn rounded(raw: &[u8]) -> Result<f32, DeviceError> {
    let value = f32_le(raw)?;
    if !value.is_finite() {
        return Err(DeviceError::Decode(format!("non-finite value {value}")));
    }
    Ok(value.round())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatDecoder;

impl Decode for FloatDecoder {
    type Value = f32;

    fn decode(&self, raw: &[u8]) -> Result<Option<f32>, DeviceError> {
        f32_le(raw).map(Some)
    }
}

/// Battery state of charge, 0-100.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentDecoder;

impl Decode for PercentDecoder {
    type Value = u8;

    fn decode(&self, raw: &[u8]) -> Result<Option<u8>, DeviceError> {
        Ok(Some(rounded(raw)?.clamp(0.0, 100.0) as u8))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChargeSourceDecoder;

impl Decode for ChargeSourceDecoder {
    type Value = ChargeSource;

    fn decode(&self, raw: &[u8]) -> Result<Option<ChargeSource>, DeviceError> {
        Ok(Some(ChargeSource::from_code(
            rounded(raw)?.clamp(0.0, 255.0) as u8,
        )))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OperatingStateDecoder;

impl Decode for OperatingStateDecoder {
    type Value = u8;

    fn decode(&self, raw: &[u8]) -> Result<Option<u8>, DeviceError> {
        Ok(Some(rounded(raw)?.clamp(0.0, 255.0) as u8))
    }
}

/// Heater temperature. Readings outside `min..=max` are transient garbage.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureDecoder {
    pub min: u16,
    pub max: u16,
}

impl Default for TemperatureDecoder {
    fn default() -> Self {
        Self { min: 1, max: 999 }
    }
}

impl Decode for TemperatureDecoder {
    type Value = u16;

    fn decode(&self, raw: &[u8]) -> Result<Option<u16>, DeviceError> {
        let value = rounded(raw)?;
        if value < f32::from(self.min) || value > f32::from(self.max) {
            tracing::trace!("rejecting temperature reading {value}");
            return Ok(None);
        }
        Ok(Some(value as u16))
    }
}

/// Lifetime heat-cycle counter. The bytes arrive reversed relative to the
/// big-endian float they encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDecoder;

impl Decode for CounterDecoder {
    type Value = u32;

    fn decode(&self, raw: &[u8]) -> Result<Option<u32>, DeviceError> {
        let mut bytes = four_bytes(raw)?;
        bytes.reverse();
        let value = f32::from_be_bytes(bytes);
        if !value.is_finite() || value < 0.0 {
            return Err(DeviceError::Decode(format!("invalid counter value {value}")));
        }
        Ok(Some(value.round() as u32))
    }
}

/// Three-byte colour. Compared as a whole, so any channel change is a change.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedColorDecoder;

impl Decode for LedColorDecoder {
    type Value = LedColor;

    fn decode(&self, raw: &[u8]) -> Result<Option<LedColor>, DeviceError> {
        match raw {
            [r, g, b, ..] => Ok(Some(LedColor {
                r: *r,
                g: *g,
                b: *b,
            })),
            _ => Err(DeviceError::Decode(format!(
                "expected 3 colour bytes, got {}",
                raw.len()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NameDecoder;

impl Decode for NameDecoder {
    type Value = String;

    fn decode(&self, raw: &[u8]) -> Result<Option<String>, DeviceError> {
        let name = String::from_utf8_lossy(raw);
        Ok(Some(name.trim_end_matches('\0').to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(value: f32) -> Vec<u8> {
        value.to_le_bytes().to_vec()
    }

    #[test]
    fn test_float_reconstruction() {
        assert_eq!(FloatDecoder.decode(&le(87.4)).unwrap(), Some(87.4));
        assert_eq!(FloatDecoder.decode(&[0, 0, 200, 67]).unwrap(), Some(400.0));
        assert!(FloatDecoder.decode(&[0, 0]).is_err());
    }

    #[test]
    fn test_percent_rounds_and_clamps() {
        assert_eq!(PercentDecoder.decode(&le(87.6)).unwrap(), Some(88));
        assert_eq!(PercentDecoder.decode(&le(140.0)).unwrap(), Some(100));
    }

    #[test]
    fn test_charge_source() {
        assert_eq!(
            ChargeSourceDecoder.decode(&le(0.0)).unwrap(),
            Some(ChargeSource::Usb)
        );
        assert_eq!(
            ChargeSourceDecoder.decode(&le(3.0)).unwrap(),
            Some(ChargeSource::None)
        );
    }

    #[test]
    fn test_temperature_range() {
        let decoder = TemperatureDecoder::default();
        assert_eq!(decoder.decode(&[0, 128, 187, 68]).unwrap(), None); // 1500
        assert_eq!(decoder.decode(&le(0.2)).unwrap(), None);
        assert_eq!(decoder.decode(&le(-20.0)).unwrap(), None);
        assert_eq!(decoder.decode(&le(400.0)).unwrap(), Some(400));
        assert_eq!(decoder.decode(&le(999.0)).unwrap(), Some(999));
        assert_eq!(decoder.decode(&le(1.0)).unwrap(), Some(1));
    }

    #[test]
    fn test_counter_byte_order() {
        // 1234.0 little-endian on the wire
        assert_eq!(CounterDecoder.decode(&[0, 64, 154, 68]).unwrap(), Some(1234));
        assert!(CounterDecoder.decode(&le(-1.0)).is_err());
    }

    #[test]
    fn test_led_color() {
        assert_eq!(
            LedColorDecoder.decode(&[255, 16, 0, 1]).unwrap(),
            Some(LedColor { r: 255, g: 16, b: 0 })
        );
        assert!(LedColorDecoder.decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_name_trims_padding() {
        assert_eq!(
            NameDecoder.decode(b"Peak Pro\0\0").unwrap().as_deref(),
            Some("Peak Pro")
        );
    }
}
