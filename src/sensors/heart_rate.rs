// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Bluetooth heart-rate profile identifiers and measurement decoding

use uuid::Uuid;

use crate::error::{Result, WearablesError};

/// Heart Rate service (0x180D)
pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/// Heart Rate Measurement characteristic (0x2A37)
pub const HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Flags bit 0: bpm value is a 16-bit little-endian field
const FLAG_UINT16: u8 = 0x01;

/// Decode the bpm field of a Heart Rate Measurement value.
///
/// Byte 0 holds flags; the value starts at byte 1 and is one byte wide unless
/// flag bit 0 is set. Trailing fields (energy, RR intervals) are ignored.
pub fn decode_measurement(data: &[u8]) -> Result<u16> {
    let Some(&flags) = data.first() else {
        return Err(WearablesError::Decode("empty measurement".to_string()));
    };

    if flags & FLAG_UINT16 != 0 {
        match data.get(1..3) {
            Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
            _ => Err(WearablesError::Decode(format!(
                "16-bit value needs 3 bytes, got {}",
                data.len()
            ))),
        }
    } else {
        data.get(1)
            .map(|&b| u16::from(b))
            .ok_or_else(|| WearablesError::Decode(format!("8-bit value needs 2 bytes, got {}", data.len())))
    }
}

/// Encode a bpm value the way a strap would, used by simulators and tests
pub fn encode_measurement(bpm: u16) -> Vec<u8> {
    match u8::try_from(bpm) {
        Ok(b) => vec![0x00, b],
        Err(_) => {
            let [lo, hi] = bpm.to_le_bytes();
            vec![FLAG_UINT16, lo, hi]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uint8() {
        assert_eq!(decode_measurement(&[0x00, 72]).unwrap(), 72);
        // sensor contact bits and RR data do not change the value
        assert_eq!(decode_measurement(&[0x16, 140, 0x10, 0x03]).unwrap(), 140);
    }

    #[test]
    fn test_decode_uint16_little_endian() {
        assert_eq!(decode_measurement(&[0x01, 0x2C, 0x01]).unwrap(), 300);
        assert_eq!(decode_measurement(&[0x01, 95, 0]).unwrap(), 95);
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(decode_measurement(&[]), Err(WearablesError::Decode(_))));
        assert!(matches!(decode_measurement(&[0x00]), Err(WearablesError::Decode(_))));
        assert!(matches!(decode_measurement(&[0x01, 0x40]), Err(WearablesError::Decode(_))));
    }

    #[test]
    fn test_encode_picks_width() {
        assert_eq!(encode_measurement(180), vec![0x00, 180]);
        assert_eq!(decode_measurement(&encode_measurement(256)).unwrap(), 256);
    }

    #[test]
    fn test_profile_uuids() {
        assert_eq!(HEART_RATE_SERVICE.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(HEART_RATE_MEASUREMENT.to_string(), "00002a37-0000-1000-8000-00805f9b34fb");
    }
}
