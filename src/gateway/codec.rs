use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tokio_tungstenite::tungstenite::Message;

use super::events::Envelope;
use crate::error::GatewayError;

/// Wire encoding requested in the connect query. Only JSON is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Json => "json",
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            other => Err(format!("unsupported encoding '{other}'")),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Zlib,
    None,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Zlib => "zlib",
            Compression::None => "none",
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zlib" => Ok(Compression::Zlib),
            "none" => Ok(Compression::None),
            other => Err(format!("unsupported compression '{other}'")),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope <-> websocket frame conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec {
    pub compression: Compression,
}

impl WireCodec {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn encode(&self, envelope: &Envelope) -> Result<Message, GatewayError> {
        let json = serde_json::to_string(envelope)?;
        match self.compression {
            Compression::None => Ok(Message::Text(json.into())),
            Compression::Zlib => Ok(Message::Binary(deflate(json.as_bytes())?.into())),
        }
    }

    /// Control frames decode to `None`.
    pub fn decode(&self, message: &Message) -> Result<Option<Envelope>, GatewayError> {
        match message {
            Message::Text(text) => Ok(Some(serde_json::from_str(text.as_str())?)),
            Message::Binary(bytes) => {
                let json = match self.compression {
                    Compression::Zlib => inflate(bytes)?,
                    Compression::None => bytes.to_vec(),
                };
                Ok(Some(serde_json::from_slice(&json)?))
            }
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => Ok(None),
            Message::Frame(_) => Err(GatewayError::UnexpectedFrame),
        }
    }
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::events::Op;

    #[test]
    fn test_plain_codec_sends_text() {
        let codec = WireCodec::new(Compression::None);
        let message = codec.encode(&Envelope::new(Op::Heartbeat, None)).unwrap();
        match message {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"op":420}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_zlib_codec_sends_deflated_binary() {
        let codec = WireCodec::new(Compression::Zlib);
        let envelope = Envelope::new(Op::SendReaction, Some(serde_json::json!({ "emoji": "💨" })));
        let message = codec.encode(&envelope).unwrap();
        let Message::Binary(bytes) = &message else {
            panic!("expected binary frame");
        };
        // zlib header
        assert_eq!(bytes[0], 0x78);
        assert_eq!(codec.decode(&message).unwrap(), Some(envelope));
    }

    #[test]
    fn test_text_frames_parse_even_when_compressed() {
        let codec = WireCodec::new(Compression::Zlib);
        let decoded = codec
            .decode(&Message::Text(r#"{"op":0,"d":{"heartbeat_interval":5}}"#.into()))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.op, 0);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let codec = WireCodec::new(Compression::Zlib);
        assert!(codec
            .decode(&Message::Binary(vec![1u8, 2, 3].into()))
            .is_err());
        assert!(codec.decode(&Message::Text("{not json".into())).is_err());
    }

    #[test]
    fn test_control_frames_are_skipped() {
        let codec = WireCodec::default();
        assert_eq!(codec.decode(&Message::Ping(Vec::<u8>::new().into())).unwrap(), None);
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("JSON".parse::<Encoding>(), Ok(Encoding::Json));
        assert!("etf".parse::<Encoding>().is_err());
        assert_eq!("none".parse::<Compression>(), Ok(Compression::None));
        assert_eq!("zlib".parse::<Compression>(), Ok(Compression::Zlib));
    }
}
