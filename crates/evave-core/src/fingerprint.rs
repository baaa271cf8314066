//! Channel fingerprints and the signatures that bind parties to them.
//!
//! A fingerprint is the Keccak-256 digest of the packed encoding
//! `{contract_id, channel_id, demand, supply, root}` followed by the message
//! kind's extras. Verification always recomputes the fingerprint from the
//! record; a caller-supplied digest is never trusted.

use serde::{Deserialize, Serialize};

use crate::canonical::{hash_tokens, Token};
use crate::crypto::{Keypair, RecoverableSignature};
use crate::error::{CoreError, Result};
use crate::record::{ChannelRecord, ImpressionRecord};
use crate::types::{Address, Hash32};

/// Separates proposal fingerprints from evidence over the same root and sequence.
pub const PROPOSAL_TAG: &[u8] = b"proposal";

/// The kinds of message a party signs over a channel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The bare record fingerprint. No extras.
    Checkpoint,
    /// A checkpoint proposal or update: the root together with the number
    /// of impressions it covers.
    Proposal { sequence: u64 },
    /// A standalone claim for a single impression.
    Claim { impression_id: Hash32, price: u128 },
    /// Challenge evidence for a newer log state.
    Evidence { sequence: u64 },
}

impl MessageKind {
    /// The claim for `impression`.
    pub fn claim(impression: &ImpressionRecord) -> Self {
        MessageKind::Claim {
            impression_id: impression.impression_id,
            price: impression.price,
        }
    }

    /// The tokens appended after the record fields.
    pub fn extras(&self) -> Vec<Token> {
        match *self {
            MessageKind::Checkpoint => Vec::new(),
            MessageKind::Proposal { sequence } => vec![
                Token::FixedBytes(PROPOSAL_TAG.to_vec()),
                Token::Uint64(sequence),
            ],
            MessageKind::Claim {
                impression_id,
                price,
            } => vec![Token::Bytes32(impression_id), Token::Uint(price)],
            MessageKind::Evidence { sequence } => vec![Token::Uint64(sequence)],
        }
    }
}

/// Compute the fingerprint of `record` with `extras` appended.
pub fn fingerprint(record: &ChannelRecord, extras: &[Token]) -> Result<Hash32> {
    let mut tokens = Vec::with_capacity(5 + extras.len());
    tokens.push(Token::Address(record.contract_id));
    tokens.push(Token::Bytes32(record.channel_id.0));
    tokens.push(Token::Address(record.demand));
    tokens.push(Token::Address(record.supply));
    tokens.push(Token::Bytes32(record.root));
    tokens.extend_from_slice(extras);
    hash_tokens(&tokens)
}

/// Compute the fingerprint of `record` for a message kind.
pub fn fingerprint_for(record: &ChannelRecord, kind: &MessageKind) -> Result<Hash32> {
    fingerprint(record, &kind.extras())
}

/// Sign the fingerprint of `record` with `extras` appended.
pub fn sign_fingerprint(
    keypair: &Keypair,
    record: &ChannelRecord,
    extras: &[Token],
) -> Result<RecoverableSignature> {
    keypair.sign(&fingerprint(record, extras)?)
}

/// Check that `signature` over `record` and `extras` was produced by `expected`.
///
/// Any failure (encoding, malformed signature, failed recovery, wrong signer)
/// yields `false`.
pub fn verify_signature(
    record: &ChannelRecord,
    extras: &[Token],
    signature: &RecoverableSignature,
    expected: &Address,
) -> bool {
    fingerprint(record, extras)
        .and_then(|digest| signature.recover(&digest))
        .map(|signer| signer == *expected)
        .unwrap_or(false)
}

/// Evidence that the log has moved past an outstanding proposal.
///
/// Signed over the `Evidence` fingerprint of the record carrying `root`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeEvidence {
    /// Root of the newer log state.
    pub root: Hash32,
    /// Number of impressions that root covers.
    pub sequence: u64,
}

impl ChallengeEvidence {
    /// The digest a challenger signs for this evidence against `record`.
    pub fn digest(&self, record: &ChannelRecord) -> Result<Hash32> {
        fingerprint_for(
            &record.with_root(self.root),
            &MessageKind::Evidence {
                sequence: self.sequence,
            },
        )
    }

    /// Sign this evidence against `record`.
    pub fn sign(&self, record: &ChannelRecord, keypair: &Keypair) -> Result<RecoverableSignature> {
        keypair.sign(&self.digest(record)?)
    }

    /// Whether `signature` over this evidence was produced by `expected`.
    pub fn verify(
        &self,
        record: &ChannelRecord,
        signature: &RecoverableSignature,
        expected: &Address,
    ) -> bool {
        self.digest(record)
            .and_then(|digest| signature.recover(&digest))
            .map(|signer| signer == *expected)
            .unwrap_or(false)
    }
}

/// An off-chain state update exchanged between the parties.
///
/// The sender signs the `Proposal` fingerprint of `record` at `sequence`,
/// whose root commits to the impression log up to and including
/// `impression`. The signature is accepted as a checkpoint proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUpdate {
    /// Candidate record carrying the new root.
    pub record: ChannelRecord,
    /// Number of impressions the root covers.
    pub sequence: u64,
    /// The impression appended by this update.
    pub impression: ImpressionRecord,
    /// The sender.
    pub signer: Address,
    /// Sender's signature over the record's proposal fingerprint.
    pub signature: RecoverableSignature,
}

impl SignedUpdate {
    /// Build and sign an update.
    pub fn make(
        record: ChannelRecord,
        impression: ImpressionRecord,
        sequence: u64,
        keypair: &Keypair,
    ) -> Result<Self> {
        if impression.sequence != sequence {
            return Err(CoreError::EncodingError(format!(
                "impression sequence {} does not match update sequence {}",
                impression.sequence, sequence
            )));
        }
        let extras = MessageKind::Proposal { sequence }.extras();
        let signature = sign_fingerprint(keypair, &record, &extras)?;
        Ok(Self {
            record,
            sequence,
            impression,
            signer: keypair.address(),
            signature,
        })
    }

    /// Whether the update is internally consistent and signed by `expected`.
    pub fn verify(&self, expected: &Address) -> bool {
        self.signer == *expected
            && self.impression.sequence == self.sequence
            && verify_signature(
                &self.record,
                &MessageKind::Proposal {
                    sequence: self.sequence,
                }
                .extras(),
                &self.signature,
                expected,
            )
    }

    /// The root this update commits to.
    pub fn root(&self) -> Hash32 {
        self.record.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::derive_channel_id;
    use crate::record::ChannelState;
    use crate::types::ChannelId;
    use proptest::prelude::*;

    fn keypair(seed: u8) -> Keypair {
        Keypair::from_secret(&[seed; 32]).unwrap()
    }

    fn record(demand: &Keypair, supply: &Keypair) -> ChannelRecord {
        ChannelRecord {
            contract_id: Address::from_bytes([0xc0; 20]),
            channel_id: derive_channel_id(0),
            demand: demand.address(),
            supply: supply.address(),
            root: Hash32::from_bytes([0x01; 32]),
            state: ChannelState::Open,
            expiration: 11,
            challenge_timeout: 0,
            proposed_root: Hash32::ZERO,
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        assert_eq!(fingerprint(&r, &[]).unwrap(), fingerprint(&r, &[]).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_lifecycle_fields() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let mut later = r.clone();
        later.state = ChannelState::Checkpointing;
        later.expiration = 999;
        later.proposed_root = Hash32::from_bytes([7; 32]);
        assert_eq!(fingerprint(&r, &[]).unwrap(), fingerprint(&later, &[]).unwrap());
    }

    #[test]
    fn test_fingerprint_sensitive_to_root_bit() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let mut flipped = r.clone();
        flipped.root.0[31] ^= 1;
        assert_ne!(fingerprint(&r, &[]).unwrap(), fingerprint(&flipped, &[]).unwrap());
    }

    #[test]
    fn test_message_kinds_are_distinct() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let checkpoint = fingerprint_for(&r, &MessageKind::Checkpoint).unwrap();
        let evidence = fingerprint_for(&r, &MessageKind::Evidence { sequence: 0 }).unwrap();
        let claim = fingerprint_for(
            &r,
            &MessageKind::Claim {
                impression_id: Hash32::ZERO,
                price: 0,
            },
        )
        .unwrap();
        let proposal = fingerprint_for(&r, &MessageKind::Proposal { sequence: 0 }).unwrap();
        assert_ne!(checkpoint, evidence);
        assert_ne!(checkpoint, claim);
        assert_ne!(evidence, claim);
        assert_ne!(proposal, evidence);
        assert_ne!(proposal, checkpoint);
    }

    #[test]
    fn test_proposal_signature_binds_sequence() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let signed = MessageKind::Proposal { sequence: 1 }.extras();
        let sig = sign_fingerprint(&d, &r, &signed).unwrap();

        assert!(verify_signature(&r, &signed, &sig, &d.address()));
        let inflated = MessageKind::Proposal { sequence: u64::MAX }.extras();
        assert!(!verify_signature(&r, &inflated, &sig, &d.address()));
        assert!(!verify_signature(&r, &[], &sig, &d.address()));
    }

    fn address() -> impl Strategy<Value = Address> {
        any::<[u8; 20]>().prop_map(Address::from_bytes)
    }

    fn hash() -> impl Strategy<Value = Hash32> {
        any::<[u8; 32]>().prop_map(Hash32::from_bytes)
    }

    proptest! {
        #[test]
        fn prop_fingerprint_covers_every_signable_field(
            contract_id in address(),
            channel_id in hash(),
            demand in address(),
            supply in address(),
            root in hash(),
            field in 0usize..5,
            other in hash(),
        ) {
            let record = ChannelRecord {
                contract_id,
                channel_id: ChannelId(channel_id),
                demand,
                supply,
                root,
                state: ChannelState::Open,
                expiration: 11,
                challenge_timeout: 0,
                proposed_root: Hash32::ZERO,
            };
            let mut changed = record.clone();
            let mut other_address = [0u8; 20];
            other_address.copy_from_slice(&other.as_bytes()[..20]);
            let other_address = Address::from_bytes(other_address);
            match field {
                0 => changed.contract_id = other_address,
                1 => changed.channel_id = ChannelId(other),
                2 => changed.demand = other_address,
                3 => changed.supply = other_address,
                _ => changed.root = other,
            }
            prop_assume!(changed != record);
            prop_assert_ne!(
                fingerprint(&record, &[]).unwrap(),
                fingerprint(&changed, &[]).unwrap()
            );
        }
    }

    #[test]
    fn test_signature_soundness() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let sig = sign_fingerprint(&d, &r, &[]).unwrap();

        assert!(verify_signature(&r, &[], &sig, &d.address()));
        assert!(!verify_signature(&r, &[], &sig, &s.address()));

        let tampered = r.with_root(Hash32::from_bytes([0x02; 32]));
        assert!(!verify_signature(&tampered, &[], &sig, &d.address()));
    }

    #[test]
    fn test_claim_signature() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let impression = ImpressionRecord::new(Hash32::from_bytes([0x0a; 32]), 1_000, 1);
        let extras = MessageKind::claim(&impression).extras();
        let sig = sign_fingerprint(&s, &r, &extras).unwrap();

        assert!(verify_signature(&r, &extras, &sig, &s.address()));

        let inflated = MessageKind::Claim {
            impression_id: impression.impression_id,
            price: 1_001,
        };
        assert!(!verify_signature(&r, &inflated.extras(), &sig, &s.address()));
    }

    #[test]
    fn test_garbage_signature_is_false() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let garbage = RecoverableSignature([0xff; 65]);
        assert!(!verify_signature(&r, &[], &garbage, &d.address()));
    }

    #[test]
    fn test_challenge_evidence() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let evidence = ChallengeEvidence {
            root: Hash32::from_bytes([0x33; 32]),
            sequence: 7,
        };
        let sig = evidence.sign(&r, &s).unwrap();

        assert!(evidence.verify(&r, &sig, &s.address()));
        assert!(!evidence.verify(&r, &sig, &d.address()));

        // The stored root does not matter, only the evidence root
        let moved = r.with_root(Hash32::from_bytes([0x44; 32]));
        assert!(evidence.verify(&moved, &sig, &s.address()));

        let replayed = ChallengeEvidence {
            sequence: 8,
            ..evidence
        };
        assert!(!replayed.verify(&r, &sig, &s.address()));

        // Evidence is not interchangeable with a checkpoint signature
        assert!(!verify_signature(
            &r.with_root(evidence.root),
            &[],
            &sig,
            &s.address()
        ));
    }

    #[test]
    fn test_signed_update() {
        let (d, s) = (keypair(1), keypair(2));
        let r = record(&d, &s);
        let impression = ImpressionRecord::new(Hash32::from_bytes([0x0b; 32]), 5, 1);
        let update = SignedUpdate::make(r, impression, 1, &s).unwrap();

        assert!(update.verify(&s.address()));
        assert!(!update.verify(&d.address()));

        let mut forged = update.clone();
        forged.record.root = Hash32::from_bytes([0xee; 32]);
        assert!(!forged.verify(&s.address()));

        let mut reordered = update;
        reordered.sequence = 2;
        assert!(!reordered.verify(&s.address()));
    }

    #[test]
    fn test_signed_update_sequence_mismatch() {
        let (d, s) = (keypair(1), keypair(2));
        let impression = ImpressionRecord::new(Hash32::ZERO, 5, 3);
        assert!(SignedUpdate::make(record(&d, &s), impression, 4, &s).is_err());
    }

    #[test]
    fn test_signed_update_serde() {
        let (d, s) = (keypair(1), keypair(2));
        let impression = ImpressionRecord::new(Hash32::ZERO, 5, 1);
        let update = SignedUpdate::make(record(&d, &s), impression, 1, &s).unwrap();
        let json = serde_json::to_string(&update).unwrap();
        let back: SignedUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(update, back);
        assert!(back.verify(&s.address()));
    }
}
