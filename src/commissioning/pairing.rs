use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Setup codes a new zone must not be able to guess.
const TRIVIAL_SETUP_CODES: [&str; 12] = [
    "00000000", "11111111", "22222222", "33333333", "44444444", "55555555", "66666666",
    "77777777", "88888888", "99999999", "12345678", "87654321",
];

/// Errors returned while validating pairing material.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum PairingCodeError {
    #[error("setup code must be exactly 8 decimal digits")]
    MalformedSetupCode,
    #[error("setup code `{code}` is trivially guessable")]
    TrivialSetupCode { code: String },
    #[error("discriminator {value} is outside 0..=4095")]
    DiscriminatorOutOfRange { value: u16 },
}

/// Validated 8-digit decimal setup code.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SetupCode(String);

impl SetupCode {
    /// Creates a validated setup code.
    ///
    /// # Errors
    ///
    /// Returns an error when `code` is not 8 decimal digits or is trivially
    /// guessable.
    pub fn new(code: impl Into<String>) -> Result<Self, PairingCodeError> {
        let code = code.into();
        if code.len() != 8 || !code.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(PairingCodeError::MalformedSetupCode);
        }
        if TRIVIAL_SETUP_CODES.contains(&code.as_str()) {
            return Err(PairingCodeError::TrivialSetupCode { code });
        }
        Ok(Self(code))
    }

    /// Returns the digit string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SetupCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated 12-bit pairing discriminator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Discriminator(u16);

impl Discriminator {
    /// Creates a validated discriminator.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` exceeds 4095.
    pub fn new(value: u16) -> Result<Self, PairingCodeError> {
        if value > 0x0FFF {
            return Err(PairingCodeError::DiscriminatorOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

impl Display for Discriminator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Complete pairing material advertised while the window is open.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PairingCode {
    pub discriminator: Discriminator,
    pub setup_code: SetupCode,
}

impl PairingCode {
    /// Creates pairing material from validated parts.
    #[must_use]
    pub fn new(discriminator: Discriminator, setup_code: SetupCode) -> Self {
        Self {
            discriminator,
            setup_code,
        }
    }

    /// Renders the QR payload string.
    #[must_use]
    pub fn qr_payload(&self) -> String {
        format!("MASH:1:{}:{}", self.discriminator, self.setup_code)
    }

    /// Renders the digits a user types when no QR scanner is available.
    #[must_use]
    pub fn manual_code(&self) -> String {
        format!("{:04}-{}", self.discriminator.value(), self.setup_code)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("2603154")]
    #[case("260315491")]
    #[case("2603154a")]
    fn malformed_setup_codes_are_rejected(#[case] code: &str) {
        assert_matches!(
            SetupCode::new(code),
            Err(PairingCodeError::MalformedSetupCode)
        );
    }

    #[rstest]
    #[case("00000000")]
    #[case("12345678")]
    #[case("87654321")]
    fn trivial_setup_codes_are_rejected(#[case] code: &str) {
        assert_matches!(
            SetupCode::new(code),
            Err(PairingCodeError::TrivialSetupCode { .. })
        );
    }

    #[test]
    fn discriminator_is_twelve_bits() {
        assert_eq!(4095, Discriminator::new(4095).expect("4095 fits").value());
        assert_matches!(
            Discriminator::new(4096),
            Err(PairingCodeError::DiscriminatorOutOfRange { value: 4096 })
        );
    }

    #[test]
    fn qr_payload_matches_wire_format() {
        let pairing = PairingCode::new(
            Discriminator::new(3840).expect("discriminator fits"),
            SetupCode::new("26031549").expect("setup code is valid"),
        );
        assert_snapshot!(pairing.qr_payload(), @"MASH:1:3840:26031549");
        assert_snapshot!(pairing.manual_code(), @"3840-26031549");
    }
}
