use data_encoding::BASE64;
use std::time::Duration;

use crate::device::handshake::{HANDSHAKE_SECRET, KEY_LEN};
use crate::device::poller::DEFAULT_INTERVAL;
use crate::gateway::codec::{Compression, Encoding};
use crate::gateway::DEFAULT_GATEWAY_URL;

pub struct Config {
    pub gateway_url: String,
    pub encoding: Encoding,
    pub compression: Compression,
    pub display_name: Option<String>,
    pub poll_interval: Duration,
    pub handshake_secret: [u8; KEY_LEN],
}

impl Config {
    pub fn from_env() -> Self {
        let encoding = match std::env::var("PUFF_GATEWAY_ENCODING") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{e}, using json");
                Encoding::Json
            }),
            Err(_) => Encoding::default(),
        };

        let compression = match std::env::var("PUFF_GATEWAY_COMPRESSION") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{e}, using zlib");
                Compression::default()
            }),
            Err(_) => Compression::default(),
        };

        let handshake_secret = std::env::var("PUFF_HANDSHAKE_SECRET")
            .ok()
            .and_then(|raw| match parse_secret(&raw) {
                Some(secret) => Some(secret),
                None => {
                    tracing::warn!("PUFF_HANDSHAKE_SECRET is not 16 base64 bytes, ignoring");
                    None
                }
            })
            .unwrap_or(HANDSHAKE_SECRET);

        Self {
            gateway_url: std::env::var("PUFF_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            encoding,
            compression,
            display_name: std::env::var("PUFF_DISPLAY_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty()),
            poll_interval: std::env::var("PUFF_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_INTERVAL),
            handshake_secret,
        }
    }
}

pub fn parse_secret(raw: &str) -> Option<[u8; KEY_LEN]> {
    BASE64
        .decode(raw.trim().as_bytes())
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
}
