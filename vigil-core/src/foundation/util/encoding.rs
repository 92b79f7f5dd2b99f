use crate::foundation::VigilError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(value: &str) -> Result<Vec<u8>, VigilError> {
    Ok(BASE64.decode(value.trim())?)
}

pub fn parse_hex_fixed<const N: usize>(value: &str) -> Result<[u8; N], VigilError> {
    let stripped = value.trim().trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(stripped)?;
    if bytes.len() != N {
        return Err(VigilError::SerializationError {
            format: "hex".to_string(),
            details: format!("expected {N} bytes, got {}", bytes.len()),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Serde adapter for byte fields persisted as base64 strings.
pub mod base64_bytes {
    use super::{decode_base64, encode_base64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        decode_base64(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let data = b"sign bytes";
        assert_eq!(decode_base64(&encode_base64(data)).expect("decode"), data);
    }

    #[test]
    fn parse_hex_fixed_enforces_length() {
        assert!(parse_hex_fixed::<32>("0xabcd").is_err());
        let parsed = parse_hex_fixed::<2>("0xabcd").expect("2 bytes");
        assert_eq!(parsed, [0xab, 0xcd]);
    }
}
