use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};

use super::{characteristic, AttributeId, DeviceLink};
use crate::error::{DeviceError, HandshakeStep};

pub const KEY_LEN: usize = 16;

/// Preshared secret baked into the device firmware
/// (base64 `FUrZc0WilhUBteT2JlCc+A==`).
pub const HANDSHAKE_SECRET: [u8; KEY_LEN] = [
    0x15, 0x4a, 0xd9, 0x73, 0x45, 0xa2, 0x96, 0x15, 0x01, 0xb5, 0xe4, 0xf6, 0x26, 0x50, 0x9c, 0xf8,
];

/// Inputs and output of one handshake attempt. Lives only for that attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMaterial {
    pub preshared_secret: [u8; KEY_LEN],
    pub device_seed: [u8; KEY_LEN],
    pub derived_key: [u8; KEY_LEN],
}

impl HandshakeMaterial {
    pub fn new(preshared_secret: [u8; KEY_LEN], device_seed: [u8; KEY_LEN]) -> Self {
        Self {
            preshared_secret,
            device_seed,
            derived_key: derive_key(&preshared_secret, &device_seed),
        }
    }
}

/// First 16 bytes of SHA-256(secret || seed).
pub fn derive_key(secret: &[u8; KEY_LEN], seed: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let mut buffer = [0u8; KEY_LEN * 2];
    buffer[..KEY_LEN].copy_from_slice(secret);
    buffer[KEY_LEN..].copy_from_slice(seed);

    let digest = Sha256::digest(buffer);
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    key
}

/// Read the seed from the access attribute, derive the key and write it
/// back. Any failure aborts the attempt; there is no retry here.
pub async fn authenticate<L>(link: &L, secret: &[u8; KEY_LEN]) -> Result<(), DeviceError>
where
    L: DeviceLink + ?Sized,
{
    let access = AttributeId::from_suffix(characteristic::ACCESS_KEY);

    let raw = link
        .read(&access)
        .await
        .map_err(|e| e.in_handshake(HandshakeStep::ReadSeed))?;
    let seed: [u8; KEY_LEN] = raw
        .get(..KEY_LEN)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| DeviceError::HandshakeFailed {
            step: HandshakeStep::Derive,
            reason: format!("seed is {} bytes, expected {KEY_LEN}", raw.len()),
        })?;

    let material = HandshakeMaterial::new(*secret, seed);
    tracing::debug!(
        "derived access key {} from seed {}",
        HEXLOWER.encode(&material.derived_key),
        HEXLOWER.encode(&material.device_seed)
    );

    link.write(&access, &material.derived_key)
        .await
        .map_err(|e| e.in_handshake(HandshakeStep::WriteKey))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::BASE64;

    #[test]
    fn test_secret_matches_published_value() {
        assert_eq!(BASE64.encode(&HANDSHAKE_SECRET), "FUrZc0WilhUBteT2JlCc+A==");
    }

    #[test]
    fn test_derive_key_golden_vectors() {
        let counting: [u8; KEY_LEN] = core::array::from_fn(|i| i as u8);
        assert_eq!(
            HEXLOWER.encode(&derive_key(&HANDSHAKE_SECRET, &counting)),
            "39232bbe2b79d430b6539f7f274d2843"
        );
        assert_eq!(
            HEXLOWER.encode(&derive_key(&HANDSHAKE_SECRET, &[0xa5; KEY_LEN])),
            "9f7ecf175eb3989584408df4dfe70263"
        );
    }

    #[test]
    fn test_material_is_deterministic() {
        let a = HandshakeMaterial::new(HANDSHAKE_SECRET, [7; KEY_LEN]);
        let b = HandshakeMaterial::new(HANDSHAKE_SECRET, [7; KEY_LEN]);
        assert_eq!(a.derived_key, b.derived_key);
        assert_ne!(
            a.derived_key,
            HandshakeMaterial::new(HANDSHAKE_SECRET, [8; KEY_LEN]).derived_key
        );
    }
}
