//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the hashing, key derivation and identifier minting
//! shared with the settlement authority. Every value is independently
//! known from the Keccak-256 and secp256k1 reference implementations.

use serde::Serialize;

use evave_core::{derive_channel_id, keccak256, Keypair};

/// A golden test vector.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// What is computed.
    pub kind: VectorKind,
    /// UTF-8 text, a hex secret key, or a decimal channel count.
    pub input: &'static str,
    /// Expected output, `0x`-prefixed lowercase hex.
    pub expected: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VectorKind {
    /// `keccak256` of UTF-8 input.
    Keccak,
    /// Address of a secret key.
    Address,
    /// Identifier of the n-th channel.
    ChannelId,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "keccak of empty input",
            kind: VectorKind::Keccak,
            input: "",
            expected: "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470",
        },
        GoldenVector {
            name: "keccak of abc",
            kind: VectorKind::Keccak,
            input: "abc",
            expected: "0x4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45",
        },
        GoldenVector {
            name: "event topic of a transfer signature",
            kind: VectorKind::Keccak,
            input: "Transfer(address,address,uint256)",
            expected: "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
        },
        GoldenVector {
            name: "address of secret key 1",
            kind: VectorKind::Address,
            input: "0000000000000000000000000000000000000000000000000000000000000001",
            expected: "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
        },
        GoldenVector {
            name: "address of secret key 2",
            kind: VectorKind::Address,
            input: "0000000000000000000000000000000000000000000000000000000000000002",
            expected: "0x2b5ad5c4795c026514f8317c7a215e218dccd6cf",
        },
        GoldenVector {
            name: "first channel id",
            kind: VectorKind::ChannelId,
            input: "0",
            expected: "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563",
        },
        GoldenVector {
            name: "second channel id",
            kind: VectorKind::ChannelId,
            input: "1",
            expected: "0xb10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6",
        },
    ]
}

/// Compute the output of a vector, or a description of why it could not be computed.
pub fn compute(vector: &GoldenVector) -> Result<String, String> {
    match vector.kind {
        VectorKind::Keccak => Ok(keccak256(vector.input.as_bytes()).to_hex()),
        VectorKind::Address => {
            let bytes = hex::decode(vector.input).map_err(|e| e.to_string())?;
            let secret: [u8; 32] = bytes
                .try_into()
                .map_err(|_| "secret must be 32 bytes".to_string())?;
            let keypair = Keypair::from_secret(&secret).map_err(|e| e.to_string())?;
            Ok(keypair.address().to_hex())
        }
        VectorKind::ChannelId => {
            let count = vector.input.parse::<u64>().map_err(|e| e.to_string())?;
            Ok(derive_channel_id(count).to_hex())
        }
    }
}

/// Verify all golden vectors.
///
/// Returns `(name, matches, computed)` for each vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let computed = compute(v).unwrap_or_else(|e| format!("error: {}", e));
            (v.name.to_string(), computed == v.expected, computed)
        })
        .collect()
}

/// The vectors as JSON, for cross-implementation checks.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, computed) in verify_all_vectors() {
            assert!(matches, "vector '{}' computed {}", name, computed);
        }
    }

    #[test]
    fn test_vectors_export() {
        let json = vectors_json().unwrap();
        assert!(json.contains("first channel id"));
        assert!(json.contains("\"ChannelId\""));
    }
}
