//! Cryptographic primitives for evave channels.
//!
//! Wraps Keccak-256 hashing and recoverable secp256k1 ECDSA with strong types.
//! Both must match the settlement authority's own primitives bit-for-bit.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::{decode_fixed_hex, Address, Hash32};

/// Length of a recoverable signature: `r || s || v`.
pub const SIGNATURE_LEN: usize = 65;

/// Compute the authority-compatible Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash32(out)
}

/// Derive the address of a verifying key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.0[12..]);
    Address(out)
}

/// A 65-byte recoverable ECDSA signature (`r || s || v`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; SIGNATURE_LEN]);

impl RecoverableSignature {
    /// Parse from raw bytes, rejecting anything that is not 65 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|_| {
            CoreError::InvalidSignatureFormat(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed_hex::<SIGNATURE_LEN>(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidSignatureFormat(e.to_string()))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The recovery byte as transmitted (27/28, or 0/1 from some signers).
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Split into the k256 signature and recovery id.
    fn parts(&self) -> Result<(Signature, RecoveryId)> {
        let signature = Signature::from_slice(&self.0[..64])
            .map_err(|e| CoreError::InvalidSignatureFormat(e.to_string()))?;
        let v = match self.v() {
            27 | 28 => self.v() - 27,
            0 | 1 => self.v(),
            other => {
                return Err(CoreError::InvalidSignatureFormat(format!(
                    "invalid recovery byte {}",
                    other
                )))
            }
        };
        let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| {
            CoreError::InvalidSignatureFormat(format!("invalid recovery byte {}", v))
        })?;
        Ok((signature, recovery_id))
    }

    /// Recover the address that produced this signature over `digest`.
    pub fn recover(&self, digest: &Hash32) -> Result<Address> {
        let (signature, recovery_id) = self.parts()?;
        let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &signature, recovery_id)
            .map_err(|_| CoreError::RecoveryFailed)?;
        Ok(address_of(&key))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..18])
    }
}

impl AsRef<[u8]> for RecoverableSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recover the signer of `digest`.
pub fn recover_signer(digest: &Hash32, signature: &RecoverableSignature) -> Result<Address> {
    signature.recover(digest)
}

/// A secp256k1 keypair for signing channel fingerprints.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// The address of this keypair.
    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest, producing `r || s || v` with `v` in {27, 28}.
    pub fn sign(&self, digest: &Hash32) -> Result<RecoverableSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| CoreError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(RecoverableSignature(out))
    }

    /// Get the raw secret scalar.
    pub fn secret(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.address())
    }
}
