use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub const ADDRESS_SIZE: usize = 20;

/// Account identity on the settlement layer: participants, the operator
/// and the lottery contract itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_SIZE]);

    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| DecodeError::InvalidAddress(hex::encode(bytes)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != ADDRESS_SIZE * 2 {
            return Err(DecodeError::InvalidAddress(s.to_string()));
        }

        let bytes = hex::decode(digits).map_err(|_| DecodeError::InvalidAddress(s.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let address: Address = "0x00000000000000000000000000000000000000Ab".parse().unwrap();
        assert_eq!(address.as_bytes()[19], 0xab);
        assert_eq!(address.to_string(), "0x00000000000000000000000000000000000000ab");
    }

    #[test]
    fn test_parse_without_prefix() {
        let address: Address = "1111111111111111111111111111111111111111".parse().unwrap();
        assert_eq!(address, Address::new([0x11; ADDRESS_SIZE]));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000".parse::<Address>().is_err());
        assert!(Address::from_slice(&[0u8; 32]).is_err());
    }
}
