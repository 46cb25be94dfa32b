//! Type-safe identifiers for holders, collectible units, and event ordinals.
//!
//! Every identifier that crosses a crate boundary has a dedicated type so
//! that a token id can never be passed where a block number is expected.
//! Addresses wrap the 20-byte `alloy` address; they render as lowercase
//! `0x` hex, so two spellings of the same account always compare equal.

use core::fmt;
use core::str::FromStr;

use alloy_primitives::hex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Length of an address in hex characters, excluding the `0x` prefix.
const ADDRESS_HEX_LEN: usize = 40;

/// Errors produced when parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// The value did not start with `0x`.
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    /// The value had the wrong number of hex digits.
    #[error("address must have {ADDRESS_HEX_LEN} hex digits, got {len}: {value}")]
    WrongLength {
        /// The rejected value.
        value: String,
        /// Number of digits after the prefix.
        len: usize,
    },

    /// The value contained a non-hex character.
    #[error("address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// A 20-byte account address.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(try_from = "String", into = "String")]
#[ts(export, export_to = "bindings/")]
pub struct Address(#[ts(as = "String")] alloy_primitives::Address);

impl Address {
    /// Parse an address written as `0x` followed by 40 hex digits, in any
    /// letter case. Checksums are not enforced.
    ///
    /// # Errors
    ///
    /// Returns [`AddressParseError`] if `value` has no `0x` prefix, the
    /// wrong number of digits, or non-hex characters.
    pub fn parse(value: &str) -> Result<Self, AddressParseError> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError::MissingPrefix(value.to_owned()))?;

        if digits.len() != ADDRESS_HEX_LEN {
            return Err(AddressParseError::WrongLength {
                value: value.to_owned(),
                len: digits.len(),
            });
        }

        alloy_primitives::Address::from_str(digits)
            .map(Self)
            .map_err(|e| AddressParseError::InvalidHex(format!("{value}: {e}")))
    }

    /// Whether this is the all-zero address used on-chain as the mint
    /// source and burn sink.
    pub fn is_zero(&self) -> bool {
        self.0 == alloy_primitives::Address::ZERO
    }

    /// The underlying 20-byte address.
    pub const fn to_alloy(&self) -> alloy_primitives::Address {
        self.0
    }
}

impl From<alloy_primitives::Address> for Address {
    fn from(address: alloy_primitives::Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Identifier of one collectible unit (the token id).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct UnitId(pub u64);

impl UnitId {
    /// Return the inner token id.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UnitId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Position of a transfer event in chain order.
///
/// Ordered by block number, then by log index within the block. Events are
/// replayed in ascending order of this value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct EventSequence {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Index of the log within its block.
    pub log_index: u64,
}

impl EventSequence {
    /// Create a sequence from a block number and log index.
    pub const fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_normalized_to_lowercase() {
        let upper = Address::parse("0xABCDEFabcdef0123456789ABCDEF0123456789ab");
        let lower = Address::parse("0xabcdefabcdef0123456789abcdef0123456789ab");
        assert!(upper.is_ok());
        assert_eq!(upper, lower);
    }

    #[test]
    fn address_rejects_malformed_input() {
        assert!(matches!(
            Address::parse("abcdefabcdef0123456789abcdef0123456789ab"),
            Err(AddressParseError::MissingPrefix(_))
        ));
        assert!(matches!(
            Address::parse("0x1234"),
            Err(AddressParseError::WrongLength { len: 4, .. })
        ));
        assert!(matches!(
            Address::parse("0xzzcdefabcdef0123456789abcdef0123456789ab"),
            Err(AddressParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn address_round_trips_through_alloy_words() {
        let word = alloy_primitives::b256!(
            "000000000000000000000000abcdefabcdef0123456789abcdef0123456789ab"
        );
        let address = Address::from(alloy_primitives::Address::from_word(word));
        assert_eq!(
            address.to_string(),
            "0xabcdefabcdef0123456789abcdef0123456789ab"
        );
        assert_eq!(address.to_alloy().into_word(), word);
    }

    #[test]
    fn zero_address_is_detected() {
        let zero = Address::parse("0x0000000000000000000000000000000000000000").ok();
        assert_eq!(zero.map(|a| a.is_zero()), Some(true));
        let other = Address::parse("0x0000000000000000000000000000000000000001").ok();
        assert_eq!(other.map(|a| a.is_zero()), Some(false));
    }

    #[test]
    fn address_serde_rejects_invalid() {
        let bad: Result<Address, _> = serde_json::from_str("\"0x12\"");
        assert!(bad.is_err());
        let good: Result<Address, _> =
            serde_json::from_str("\"0xABCDEFabcdef0123456789ABCDEF0123456789ab\"");
        assert_eq!(
            good.ok().map(String::from),
            Some("0xabcdefabcdef0123456789abcdef0123456789ab".to_owned())
        );
    }

    #[test]
    fn sequence_orders_by_block_then_log_index() {
        let a = EventSequence::new(10, 5);
        let b = EventSequence::new(10, 6);
        let c = EventSequence::new(11, 0);
        assert!(a < b);
        assert!(b < c);
    }
}
