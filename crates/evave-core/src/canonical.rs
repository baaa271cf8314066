//! Canonical byte encoding shared with the settlement authority.
//!
//! Two encodings live here:
//! - the packed token encoding hashed into fingerprints, leaves and channel
//!   identifiers (fixed-width big-endian integers, 20-byte addresses, 32-byte
//!   words, length-prefixed strings), and
//! - the authority's nine-word record layout returned by `getChannel`.
//!
//! **CRITICAL**: both encodings are FROZEN. Any divergence desynchronizes
//! signature verification between the parties and the authority.

use crate::crypto::keccak256;
use crate::error::{CoreError, Result};
use crate::record::{ChannelRecord, ChannelState};
use crate::types::{Address, BlockHeight, ChannelId, Hash32};

/// Maximum byte length of a string token.
pub const MAX_STRING_LEN: usize = 4096;

/// Number of 32-byte words in the authority's channel record.
pub const RECORD_WORDS: usize = 9;

/// Byte length of an encoded channel record.
pub const RECORD_LEN: usize = RECORD_WORDS * 32;

/// A typed field in the packed encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 20 bytes.
    Address(Address),
    /// 32 bytes.
    Bytes32(Hash32),
    /// 32-byte big-endian unsigned integer.
    Uint(u128),
    /// 32-byte big-endian unsigned integer.
    Uint64(u64),
    /// 1 to 32 bytes, verbatim.
    FixedBytes(Vec<u8>),
    /// 32-byte big-endian length, then UTF-8 bytes.
    String(String),
}

/// Encode tokens into their canonical packed form.
pub fn encode(tokens: &[Token]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(tokens.len() * 32);
    for token in tokens {
        encode_token(&mut buf, token)?;
    }
    Ok(buf)
}

/// Hash the canonical encoding of `tokens`.
pub fn hash_tokens(tokens: &[Token]) -> Result<Hash32> {
    Ok(keccak256(&encode(tokens)?))
}

fn encode_token(buf: &mut Vec<u8>, token: &Token) -> Result<()> {
    match token {
        Token::Address(a) => buf.extend_from_slice(&a.0),
        Token::Bytes32(h) => buf.extend_from_slice(&h.0),
        Token::Uint(n) => buf.extend_from_slice(&u128_word(*n)),
        Token::Uint64(n) => buf.extend_from_slice(&u64_word(*n)),
        Token::FixedBytes(bytes) => {
            if bytes.is_empty() || bytes.len() > 32 {
                return Err(CoreError::EncodingError(format!(
                    "fixed bytes must be 1..=32 bytes, got {}",
                    bytes.len()
                )));
            }
            buf.extend_from_slice(bytes);
        }
        Token::String(s) => {
            if s.len() > MAX_STRING_LEN {
                return Err(CoreError::EncodingError(format!(
                    "string of {} bytes exceeds maximum of {}",
                    s.len(),
                    MAX_STRING_LEN
                )));
            }
            buf.extend_from_slice(&u64_word(s.len() as u64));
            buf.extend_from_slice(s.as_bytes());
        }
    }
    Ok(())
}

/// Left-pad a `u64` into a big-endian word.
pub fn u64_word(n: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&n.to_be_bytes());
    word
}

/// Left-pad a `u128` into a big-endian word.
pub fn u128_word(n: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&n.to_be_bytes());
    word
}

/// Derive the identifier minted for the `count`-th channel of a deployment.
pub fn derive_channel_id(count: u64) -> ChannelId {
    ChannelId(keccak256(&u64_word(count)))
}

/// Encode a record into the authority's nine-word layout:
/// `{contractId, channelId, demand, supply, root, state, expiration, challengeTimeout, proposedRoot}`.
pub fn encode_record(record: &ChannelRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_LEN);
    buf.extend_from_slice(&record.contract_id.to_word().0);
    buf.extend_from_slice(record.channel_id.as_bytes());
    buf.extend_from_slice(&record.demand.to_word().0);
    buf.extend_from_slice(&record.supply.to_word().0);
    buf.extend_from_slice(&record.root.0);
    buf.extend_from_slice(&u64_word(record.state.to_u8() as u64));
    buf.extend_from_slice(&u64_word(record.expiration));
    buf.extend_from_slice(&u64_word(record.challenge_timeout));
    buf.extend_from_slice(&record.proposed_root.0);
    buf
}

/// Decode the authority's nine-word layout back into a record.
pub fn decode_record(bytes: &[u8]) -> Result<ChannelRecord> {
    if bytes.len() != RECORD_LEN {
        return Err(CoreError::DecodingError(format!(
            "record must be {} bytes, got {}",
            RECORD_LEN,
            bytes.len()
        )));
    }

    let word = |i: usize| -> &[u8] { &bytes[i * 32..(i + 1) * 32] };

    let state_tag = word_to_u64(word(5), "state")?;
    let state = u8::try_from(state_tag)
        .ok()
        .and_then(ChannelState::from_u8)
        .ok_or_else(|| CoreError::DecodingError(format!("unknown state tag {}", state_tag)))?;

    Ok(ChannelRecord {
        contract_id: word_to_address(word(0), "contractId")?,
        channel_id: ChannelId(word_to_hash(word(1))),
        demand: word_to_address(word(2), "demand")?,
        supply: word_to_address(word(3), "supply")?,
        root: word_to_hash(word(4)),
        state,
        expiration: word_to_u64(word(6), "expiration")?,
        challenge_timeout: word_to_u64(word(7), "challengeTimeout")?,
        proposed_root: word_to_hash(word(8)),
    })
}

/// Decode a `0x`-prefixed hex record, as returned over JSON-RPC.
pub fn decode_record_hex(s: &str) -> Result<ChannelRecord> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    decode_record(&bytes)
}

fn word_to_hash(word: &[u8]) -> Hash32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(word);
    Hash32(out)
}

fn word_to_address(word: &[u8], field: &str) -> Result<Address> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(CoreError::DecodingError(format!(
            "{} has non-zero address padding",
            field
        )));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..]);
    Ok(Address(out))
}

fn word_to_u64(word: &[u8], field: &str) -> Result<BlockHeight> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(CoreError::DecodingError(format!("{} overflows u64", field)));
    }
    let mut out = [0u8; 8];
    out.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(out))
}

/// Recover the participant address carried in an event topic word.
pub fn parse_log_address(topic: &Hash32) -> Result<Address> {
    word_to_address(&topic.0, "topic")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ChannelRecord {
        ChannelRecord {
            contract_id: Address::from_bytes([0x12; 20]),
            channel_id: derive_channel_id(0),
            demand: Address::from_bytes([0x11; 20]),
            supply: Address::from_bytes([0x22; 20]),
            root: Hash32::from_bytes([0xaa; 32]),
            state: ChannelState::Checkpointing,
            expiration: 110,
            challenge_timeout: 57,
            proposed_root: Hash32::from_bytes([0xbb; 32]),
        }
    }

    #[test]
    fn test_integer_words() {
        let w = u64_word(258);
        assert_eq!(&w[..30], &[0u8; 30]);
        assert_eq!(&w[30..], &[0x01, 0x02]);

        let w = u128_word(u128::MAX);
        assert_eq!(&w[..16], &[0u8; 16]);
        assert_eq!(&w[16..], &[0xff; 16]);
    }

    #[test]
    fn test_packed_layout() {
        let bytes = encode(&[
            Token::Address(Address::from_bytes([0x01; 20])),
            Token::Bytes32(Hash32::from_bytes([0x02; 32])),
            Token::Uint(7),
        ])
        .unwrap();
        assert_eq!(bytes.len(), 20 + 32 + 32);
        assert_eq!(&bytes[..20], &[0x01; 20]);
        assert_eq!(bytes[83], 7);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let bytes = encode(&[Token::String("foo".into())]).unwrap();
        assert_eq!(bytes.len(), 35);
        assert_eq!(bytes[31], 3);
        assert_eq!(&bytes[32..], b"foo");

        // "ab" + "c" must not collide with "a" + "bc"
        let a = encode(&[Token::String("ab".into()), Token::String("c".into())]).unwrap();
        let b = encode(&[Token::String("a".into()), Token::String("bc".into())]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encoding_errors() {
        assert!(matches!(
            encode(&[Token::FixedBytes(vec![])]),
            Err(CoreError::EncodingError(_))
        ));
        assert!(matches!(
            encode(&[Token::FixedBytes(vec![0; 33])]),
            Err(CoreError::EncodingError(_))
        ));
        assert!(matches!(
            encode(&[Token::String("x".repeat(MAX_STRING_LEN + 1))]),
            Err(CoreError::EncodingError(_))
        ));
    }

    #[test]
    fn test_channel_id_derivation() {
        // keccak256(uint256(0))
        assert_eq!(
            derive_channel_id(0).to_hex(),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
        assert_ne!(derive_channel_id(0), derive_channel_id(1));
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample_record();
        let bytes = encode_record(&record);
        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(decode_record(&bytes).unwrap(), record);

        let hex = format!("0x{}", hex::encode(&bytes));
        assert_eq!(decode_record_hex(&hex).unwrap(), record);
    }

    #[test]
    fn test_record_decode_rejects_malformed() {
        let bytes = encode_record(&sample_record());

        assert!(decode_record(&bytes[..RECORD_LEN - 1]).is_err());

        let mut dirty_padding = bytes.clone();
        dirty_padding[64] = 1; // demand word padding
        assert!(matches!(
            decode_record(&dirty_padding),
            Err(CoreError::DecodingError(_))
        ));

        let mut bad_state = bytes.clone();
        bad_state[5 * 32 + 31] = 9;
        assert!(matches!(
            decode_record(&bad_state),
            Err(CoreError::DecodingError(_))
        ));

        let mut huge = bytes;
        huge[6 * 32] = 1; // expiration beyond u64
        assert!(decode_record(&huge).is_err());
    }

    #[test]
    fn test_parse_log_address() {
        let a = Address::from_bytes([0x5a; 20]);
        assert_eq!(parse_log_address(&a.to_word()).unwrap(), a);
        assert!(parse_log_address(&Hash32::from_bytes([0xff; 32])).is_err());
    }
}
