//! Strong type definitions for evave channels.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Text forms
//! are `0x`-prefixed lowercase hex, the way the settlement authority prints them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A block height on the settlement authority.
pub type BlockHeight = u64;

/// Strip an optional `0x` prefix and decode exactly `N` bytes of hex.
pub(crate) fn decode_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// A 32-byte word: digests, Merkle nodes and roots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed_hex::<32>(s).map(Self)
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The all-zero word: no root, no proposal.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Hash32 {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// A 20-byte participant or contract address.
///
/// Derived from a secp256k1 public key as the last 20 bytes of
/// `keccak256(uncompressed_point[1..])`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed_hex::<20>(s).map(Self)
    }

    /// Left-pad to a 32-byte word (event topics, record layout).
    pub fn to_word(&self) -> Hash32 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        Hash32(word)
    }

    /// Whether this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// A channel identifier: `keccak256(uint256(channelCount))` at opening.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Hash32);

impl ChannelId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Hash32(bytes))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    /// The underlying word.
    pub const fn as_hash(&self) -> &Hash32 {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Hash32::from_hex(s).map(Self)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..18])
    }
}

impl From<Hash32> for ChannelId {
    fn from(hash: Hash32) -> Self {
        Self(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = Hash32::from_bytes([0x42; 32]);
        let recovered = Hash32::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, recovered);
        assert!(h.to_hex().starts_with("0x"));
    }

    #[test]
    fn test_hex_without_prefix() {
        let a = Address::from_hex("1111111111111111111111111111111111111111").unwrap();
        assert_eq!(a, Address::from_bytes([0x11; 20]));
    }

    #[test]
    fn test_hex_wrong_length() {
        assert!(Address::from_hex("0x1234").is_err());
        assert!(Hash32::from_hex("0x00").is_err());
    }

    #[test]
    fn test_address_word_padding() {
        let a = Address::from_bytes([0xab; 20]);
        let word = a.to_word();
        assert_eq!(&word.0[..12], &[0u8; 12]);
        assert_eq!(&word.0[12..], &[0xab; 20]);
    }

    #[test]
    fn test_channel_id_display() {
        let id = ChannelId::from_bytes([0xcd; 32]);
        assert_eq!(format!("{}", id), "0xcdcdcdcdcdcdcdcd");
        assert!(format!("{:?}", id).starts_with("ChannelId("));
    }
}
