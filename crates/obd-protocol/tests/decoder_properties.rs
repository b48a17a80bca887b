//! Property tests for response decoding robustness.

use obd_protocol::{decode_rpm, decode_speed, Reading};
use proptest::prelude::*;

proptest! {
    /// Any well-formed RPM reply decodes with ((A*256)+B)/4.
    #[test]
    fn rpm_formula_holds(a in any::<u8>(), b in any::<u8>(), spaced in any::<bool>()) {
        let raw = if spaced {
            format!("41 0C {a:02X} {b:02X}")
        } else {
            format!("410C{a:02X}{b:02X}")
        };
        let expected = (u32::from(a) * 256 + u32::from(b)) / 4;
        prop_assert_eq!(decode_rpm(&raw), Reading::Rpm(expected));
    }

    /// Speed is the raw data byte, regardless of echo or prompt framing.
    #[test]
    fn speed_is_data_byte(a in any::<u8>()) {
        let raw = format!("010D\r41 0D {a:02X} \r\r>");
        prop_assert_eq!(decode_speed(&raw), Reading::SpeedKmh(u32::from(a)));
    }

    /// Arbitrary text never panics and only ever yields the matching variant.
    #[test]
    fn arbitrary_input_never_panics(raw in ".{0,64}") {
        let rpm = decode_rpm(&raw);
        let speed = decode_speed(&raw);
        prop_assert!(matches!(rpm, Reading::Rpm(_) | Reading::DecodeFailed));
        prop_assert!(matches!(speed, Reading::SpeedKmh(_) | Reading::DecodeFailed));
    }

    /// A non-hex character inside the data bytes always fails decoding.
    #[test]
    fn non_hex_data_fails(a in any::<u8>(), junk in "[G-Zg-z]") {
        let raw = format!("41 0C {a:02X} {junk}{junk}");
        prop_assert_eq!(decode_rpm(&raw), Reading::DecodeFailed);
    }

    /// Odd-length byte groups are rejected rather than re-paired.
    #[test]
    fn odd_groups_fail(a in any::<u8>(), nibble in 0u8..16) {
        let raw = format!("41 0D {a:02X}{nibble:X}");
        prop_assert_eq!(decode_speed(&raw), Reading::DecodeFailed);
    }

    /// Replies without the mode/PID echo are never decoded.
    #[test]
    fn missing_echo_fails(data in proptest::collection::vec(any::<u8>(), 0..6)) {
        let raw = data.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ");
        prop_assume!(!data.windows(2).any(|w| w == [0x41, 0x0C]));
        prop_assert_eq!(decode_rpm(&raw), Reading::DecodeFailed);
    }
}
