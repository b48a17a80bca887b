//! ELM327 protocol selection and AT commands

use serde::{Deserialize, Serialize};

/// Supported OBD-II protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "ATSP0",
            ObdProtocol::J1850Pwm => "ATSP1",
            ObdProtocol::J1850Vpw => "ATSP2",
            ObdProtocol::Iso9141_2 => "ATSP3",
            ObdProtocol::Iso14230_4Kwp => "ATSP4",
            ObdProtocol::Iso14230_4KwpFast => "ATSP5",
            ObdProtocol::Iso15765_4Can11bit500 => "ATSP6",
            ObdProtocol::Iso15765_4Can29bit500 => "ATSP7",
            ObdProtocol::Iso15765_4Can11bit250 => "ATSP8",
            ObdProtocol::Iso15765_4Can29bit250 => "ATSP9",
        }
    }

    /// Every protocol, in `ATSPn` digit order
    pub const ALL: [ObdProtocol; 10] = [
        ObdProtocol::Auto,
        ObdProtocol::J1850Pwm,
        ObdProtocol::J1850Vpw,
        ObdProtocol::Iso9141_2,
        ObdProtocol::Iso14230_4Kwp,
        ObdProtocol::Iso14230_4KwpFast,
        ObdProtocol::Iso15765_4Can11bit500,
        ObdProtocol::Iso15765_4Can29bit500,
        ObdProtocol::Iso15765_4Can11bit250,
        ObdProtocol::Iso15765_4Can29bit250,
    ];

    /// Inverse of [`to_elm_command`](Self::to_elm_command), case-insensitive
    pub fn from_elm_command(cmd: &str) -> Option<Self> {
        let cmd = cmd.trim();
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.to_elm_command().eq_ignore_ascii_case(cmd))
    }
}

/// Adapter configuration commands used during link initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// `ATZ` full adapter reset
    Reset,
    /// `ATE0` disable command echo
    EchoOff,
    /// `ATSPn` select the vehicle protocol
    SelectProtocol(ObdProtocol),
}

impl AtCommand {
    /// ASCII command text, without the carriage return terminator
    pub fn as_str(&self) -> &'static str {
        match self {
            AtCommand::Reset => "ATZ",
            AtCommand::EchoOff => "ATE0",
            AtCommand::SelectProtocol(protocol) => protocol.to_elm_command(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_commands() {
        assert_eq!(AtCommand::Reset.as_str(), "ATZ");
        assert_eq!(AtCommand::EchoOff.as_str(), "ATE0");
        assert_eq!(AtCommand::SelectProtocol(ObdProtocol::Auto).as_str(), "ATSP0");
    }

    #[test]
    fn test_protocol_command_parse() {
        assert_eq!(ObdProtocol::from_elm_command("atsp6"), Some(ObdProtocol::Iso15765_4Can11bit500));
        assert_eq!(ObdProtocol::from_elm_command("ATSPA"), None);
        assert_eq!(ObdProtocol::from_elm_command("ATSP0"), Some(ObdProtocol::default()));
        for protocol in ObdProtocol::ALL {
            assert_eq!(ObdProtocol::from_elm_command(protocol.to_elm_command()), Some(protocol));
        }
    }
}
