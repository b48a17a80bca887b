//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs polled by the dashboard and decodes
//! raw ELM327 text responses into typed readings.

use crate::mode;
use serde::{Deserialize, Serialize};

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
}

impl Pid {
    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Rpm => 2,
            Pid::Speed => 1,
        }
    }

    /// Build the Mode 01 request for this PID
    pub fn request(self) -> PidRequest {
        PidRequest {
            mode: mode::CURRENT_DATA,
            pid: self,
            data_bytes: self.response_bytes(),
        }
    }
}

/// A single Mode/PID request and the data length its reply carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidRequest {
    /// OBD-II service mode
    pub mode: u8,
    /// Parameter being requested
    pub pid: Pid,
    /// Number of data bytes following the mode/PID echo
    pub data_bytes: usize,
}

impl PidRequest {
    /// Engine speed request (`010C`)
    pub const RPM: PidRequest = PidRequest {
        mode: mode::CURRENT_DATA,
        pid: Pid::Rpm,
        data_bytes: 2,
    };

    /// Vehicle speed request (`010D`)
    pub const SPEED: PidRequest = PidRequest {
        mode: mode::CURRENT_DATA,
        pid: Pid::Speed,
        data_bytes: 1,
    };

    /// ASCII command sent to the adapter, e.g. `010C`
    pub fn command(&self) -> String {
        format!("{:02X}{:02X}", self.mode, self.pid.as_hex())
    }

    /// Locate the positive response for this request and return its data bytes.
    ///
    /// Every line of the response is tried in turn, so echoed commands,
    /// `SEARCHING...` banners and the trailing `>` prompt are skipped.
    pub fn extract_data(&self, raw: &str) -> Option<Vec<u8>> {
        let header = [self.mode.wrapping_add(mode::RESPONSE_OFFSET), self.pid.as_hex()];

        raw.split(['\r', '\n'])
            .filter_map(parse_hex_line)
            .find_map(|bytes| {
                let start = bytes.windows(2).position(|w| w == header)? + 2;
                bytes.get(start..start + self.data_bytes).map(<[u8]>::to_vec)
            })
    }

    /// Decode a raw response into a reading; never fails loudly
    pub fn decode(&self, raw: &str) -> Reading {
        let Some(data) = self.extract_data(raw) else {
            return Reading::DecodeFailed;
        };

        match (self.pid, data.as_slice()) {
            // RPM: ((A*256)+B)/4
            (Pid::Rpm, &[a, b]) => Reading::Rpm((u32::from(a) * 256 + u32::from(b)) / 4),
            // Speed: A (km/h)
            (Pid::Speed, &[a]) => Reading::SpeedKmh(u32::from(a)),
            _ => Reading::DecodeFailed,
        }
    }
}

/// A decoded physical value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reading {
    /// Engine speed in revolutions per minute
    Rpm(u32),
    /// Vehicle speed in km/h
    SpeedKmh(u32),
    /// The response was missing, truncated or malformed
    DecodeFailed,
}

impl Reading {
    /// Numeric value, if decoding succeeded
    pub fn value(&self) -> Option<u32> {
        match self {
            Reading::Rpm(v) | Reading::SpeedKmh(v) => Some(*v),
            Reading::DecodeFailed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Reading::DecodeFailed)
    }
}

/// Decode an engine RPM response such as `41 0C 1A F8`
pub fn decode_rpm(raw: &str) -> Reading {
    PidRequest::RPM.decode(raw)
}

/// Decode a vehicle speed response such as `41 0D 32`
pub fn decode_speed(raw: &str) -> Reading {
    PidRequest::SPEED.decode(raw)
}

/// Parse one response line of hex byte pairs.
///
/// Accepts both spaced (`41 0C 1A F8`) and packed (`410C1AF8`) output.
/// When spaces are present every group must hold whole bytes.
fn parse_hex_line(line: &str) -> Option<Vec<u8>> {
    let line = line.replace('>', "");
    let groups: Vec<&str> = line.split_whitespace().collect();
    if groups.is_empty() || groups.iter().any(|g| g.len() % 2 != 0) {
        return None;
    }
    hex::decode(groups.concat()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_decode() {
        // 1A F8 => ((0x1A * 256) + 0xF8) / 4 = (6656 + 248) / 4 = 1726
        assert_eq!(decode_rpm("41 0C 1A F8"), Reading::Rpm(1726));
        assert_eq!(decode_rpm("410C1AF8"), Reading::Rpm(1726));
    }

    #[test]
    fn test_rpm_truncated() {
        assert_eq!(decode_rpm("41 0C"), Reading::DecodeFailed);
        assert_eq!(decode_rpm("41 0C 1A"), Reading::DecodeFailed);
    }

    #[test]
    fn test_speed_decode() {
        // 0x32 = 50 km/h
        assert_eq!(decode_speed("41 0D 32"), Reading::SpeedKmh(50));
        assert_eq!(decode_speed(""), Reading::DecodeFailed);
    }

    #[test]
    fn test_echo_and_prompt_tolerated() {
        assert_eq!(decode_rpm("010C\r41 0C 0F A0 \r\r>"), Reading::Rpm(1000));
        assert_eq!(decode_speed("SEARCHING...\r41 0D 78\r\r>"), Reading::SpeedKmh(120));
        assert_eq!(decode_speed("41 0D 32>"), Reading::SpeedKmh(50));
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(decode_rpm("41 0C 1G F8"), Reading::DecodeFailed);
        assert_eq!(decode_rpm("41 0C 1A F"), Reading::DecodeFailed);
        assert_eq!(decode_rpm("NO DATA"), Reading::DecodeFailed);
        assert_eq!(decode_speed("41 0C 1A F8"), Reading::DecodeFailed);
        assert_eq!(decode_speed("?\r\r>"), Reading::DecodeFailed);
    }

    #[test]
    fn test_request_command() {
        assert_eq!(PidRequest::RPM.command(), "010C");
        assert_eq!(PidRequest::SPEED.command(), "010D");
        assert_eq!(Pid::Speed.request(), PidRequest::SPEED);
        assert_eq!(Pid::Rpm.request(), PidRequest::RPM);
    }

    #[test]
    fn test_reading_value() {
        assert_eq!(Reading::Rpm(800).value(), Some(800));
        assert_eq!(Reading::DecodeFailed.value(), None);
        assert!(Reading::DecodeFailed.is_failed());
    }
}
