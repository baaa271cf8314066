//! The channel manager: one party's coordinator.
//!
//! The manager brings together the settlement authority, the local store and
//! the party's signing key. It never caches channel state across calls; every
//! operation re-reads the authority and reconciles the store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use evave_authority::{Authority, AuthorityError};
use evave_core::fingerprint::sign_fingerprint;
use evave_core::lifecycle::{self, Finalization};
use evave_core::{
    decode_record, effective_view, merkle, verify_signature, Address, BlockHeight,
    ChallengeEvidence, ChannelId, ChannelRecord, ChannelState, Hash32, ImpressionRecord, Keypair,
    MerkleProof, MerkleTree, MessageKind, RecoverableSignature, SignedUpdate, TransitionError,
};
use evave_store::{InsertResult, Store, StoreExt};

use crate::error::{EvaveError, Result};

/// Configuration for the channel manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Extra attempts for calls rejected because the channel moved underneath them.
    pub max_retries: u32,
    /// Whether to check that records read back belong to this authority and channel.
    pub verify_reads: bool,
    /// Whether to check record identity and rebuild the root of received updates.
    pub validate_updates: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            verify_reads: true,
            validate_updates: true,
        }
    }
}

/// Result of accepting an update from the supply party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The update extended the local log.
    Accepted { sequence: u64, root: Hash32 },
    /// The identical update was already accepted.
    Duplicate,
}

/// The main coordinator struct.
///
/// Provides a unified API for:
/// - Opening channels and reading their lazily-finalized state
/// - Recording impressions and exchanging signed updates
/// - Proposing, challenging and finalizing checkpoints
/// - Proving and auditing individual impressions
pub struct ChannelManager<A: Authority, S: Store> {
    /// This party's signing key.
    keypair: Keypair,
    /// The settlement authority, shared with the counterparty.
    authority: Arc<A>,
    /// This party's local view.
    store: Arc<S>,
    config: ManagerConfig,
}

impl<A: Authority, S: Store> ChannelManager<A, S> {
    /// Create a new manager for the party holding `keypair`.
    pub fn new(keypair: Keypair, authority: Arc<A>, store: S, config: ManagerConfig) -> Self {
        Self {
            keypair,
            authority,
            store: Arc::new(store),
            config,
        }
    }

    /// This party's address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the authority reference.
    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Get the manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a channel with this party as demand.
    pub async fn open_channel(&self, supply: &Address) -> Result<ChannelRecord> {
        let channel_id = self.authority.open_channel(&self.address(), supply).await?;
        info!(channel = %channel_id, supply = %supply, "opened channel");
        self.channel(&channel_id).await
    }

    /// The channel as it stands at the authority's current height.
    ///
    /// A due proposal appears finalized even if no call has applied it yet.
    /// The view is recorded in the local store.
    pub async fn channel(&self, channel_id: &ChannelId) -> Result<ChannelRecord> {
        let (record, height) = self.read(channel_id).await?;
        let view = effective_view(&record, height);
        self.store.put_channel(&view, height).await?;
        debug!(channel = %channel_id, state = ?view.state, height, "reconciled channel");
        Ok(view)
    }

    /// Read and decode the stored record, with the height it was read at.
    async fn read(&self, channel_id: &ChannelId) -> Result<(ChannelRecord, BlockHeight)> {
        let height = self.authority.block_number().await?;
        let bytes = self.authority.get_channel(channel_id).await?;
        let record = decode_record(&bytes)?;

        if self.config.verify_reads {
            let contract_id = self.authority.contract_id().await?;
            if record.contract_id != contract_id {
                return Err(EvaveError::RecordMismatch {
                    expected: contract_id.to_hex(),
                    got: record.contract_id.to_hex(),
                });
            }
            if record.channel_id != *channel_id {
                return Err(EvaveError::RecordMismatch {
                    expected: channel_id.to_hex(),
                    got: record.channel_id.to_hex(),
                });
            }
        }

        Ok((record, height))
    }

    /// Require this party to be `holder`, the channel's `role`.
    fn require_role(
        &self,
        record: &ChannelRecord,
        holder: &Address,
        role: &'static str,
    ) -> Result<()> {
        if !record.is_participant(&self.address()) {
            return Err(EvaveError::NotParticipant(self.address(), record.channel_id));
        }
        if *holder != self.address() {
            return Err(EvaveError::WrongRole {
                address: self.address(),
                channel_id: record.channel_id,
                role,
            });
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Impression Log
    // ─────────────────────────────────────────────────────────────────────────

    /// Append the next impression to the local log and sign the new root.
    ///
    /// Only the supply party produces impressions, and never on a closed
    /// channel. The returned update is what demand passes to
    /// [`accept_update`](Self::accept_update).
    pub async fn record_impression(
        &self,
        channel_id: &ChannelId,
        impression_id: Hash32,
        price: u128,
    ) -> Result<SignedUpdate> {
        let record = self.channel(channel_id).await?;
        self.require_role(&record, &record.supply, "supply")?;
        if record.state == ChannelState::Closed {
            return Err(TransitionError::IllegalTransition {
                state: record.state,
                action: "record an impression on",
            }
            .into());
        }

        let mut log = self.store.impressions(channel_id).await?;
        let sequence = log.len() as u64 + 1;
        let impression = ImpressionRecord::new(impression_id, price, sequence);
        log.push(impression);
        let root = MerkleTree::from_impressions(&log)?.root();

        // Signed before anything is written
        let update = SignedUpdate::make(record.with_root(root), impression, sequence, &self.keypair)?;
        self.append_impression(channel_id, &impression).await?;
        self.store_update(&update).await?;

        info!(channel = %channel_id, sequence, root = %root, "recorded impression");
        Ok(update)
    }

    /// Validate and store an update received from the supply party.
    ///
    /// Only demand accepts updates. The update must be signed by supply and
    /// extend the local log by exactly one impression. With
    /// `validate_updates`, its record must match the channel and its root
    /// must equal the rebuilt log root.
    pub async fn accept_update(&self, update: &SignedUpdate) -> Result<AcceptOutcome> {
        let channel_id = update.record.channel_id;
        let record = self.channel(&channel_id).await?;
        self.require_role(&record, &record.demand, "demand")?;
        let expected = record.supply;

        if self.config.validate_updates
            && (update.record.contract_id != record.contract_id
                || update.record.demand != record.demand
                || update.record.supply != record.supply)
        {
            return Err(EvaveError::InvalidUpdate(
                "record identity does not match channel".into(),
            ));
        }

        if !update.verify(&expected) {
            warn!(channel = %channel_id, expected = %expected, "rejected update signature");
            return Err(EvaveError::InvalidUpdate(format!(
                "update not signed by {}",
                expected
            )));
        }

        if let Some(latest) = self.store.latest_update(&channel_id).await? {
            if update.sequence <= latest.sequence {
                if *update == latest {
                    return Ok(AcceptOutcome::Duplicate);
                }
                return Err(EvaveError::InvalidUpdate(format!(
                    "sequence {} does not exceed latest accepted {}",
                    update.sequence, latest.sequence
                )));
            }
        }

        if self.config.validate_updates {
            let mut log = self.store.impressions(&channel_id).await?;
            let next = log.len() as u64 + 1;
            if update.sequence != next {
                return Err(EvaveError::InvalidUpdate(format!(
                    "expected sequence {}, got {}",
                    next, update.sequence
                )));
            }
            log.push(update.impression);
            let root = MerkleTree::from_impressions(&log)?.root();
            if root != update.root() {
                warn!(channel = %channel_id, sequence = update.sequence, "update root does not match log");
                return Err(EvaveError::InvalidUpdate(format!(
                    "root {} does not match rebuilt log root {}",
                    update.root(),
                    root
                )));
            }
        }

        self.append_impression(&channel_id, &update.impression)
            .await?;
        self.store_update(update).await?;

        info!(channel = %channel_id, sequence = update.sequence, "accepted update");
        Ok(AcceptOutcome::Accepted {
            sequence: update.sequence,
            root: update.root(),
        })
    }

    /// The newest update stored for a channel, sent or received.
    pub async fn latest_update(&self, channel_id: &ChannelId) -> Result<Option<SignedUpdate>> {
        Ok(self.store.latest_update(channel_id).await?)
    }

    /// Root of the full local log.
    pub async fn log_root(&self, channel_id: &ChannelId) -> Result<Hash32> {
        let log = self.store.impressions(channel_id).await?;
        Ok(MerkleTree::from_impressions(&log)?.root())
    }

    async fn append_impression(
        &self,
        channel_id: &ChannelId,
        impression: &ImpressionRecord,
    ) -> Result<()> {
        match self.store.put_impression(channel_id, impression).await? {
            InsertResult::Inserted | InsertResult::AlreadyExists => Ok(()),
            InsertResult::Conflict { existing } => Err(EvaveError::Conflict {
                channel_id: *channel_id,
                sequence: impression.sequence,
                existing,
            }),
        }
    }

    async fn store_update(&self, update: &SignedUpdate) -> Result<()> {
        match self.store.put_update(update).await? {
            InsertResult::Inserted | InsertResult::AlreadyExists => Ok(()),
            InsertResult::Conflict { existing } => Err(EvaveError::Conflict {
                channel_id: update.record.channel_id,
                sequence: update.sequence,
                existing,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signing
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign `root`, covering `sequence` impressions, as a checkpoint proposal of `record`.
    pub fn sign_checkpoint(
        &self,
        record: &ChannelRecord,
        root: Hash32,
        sequence: u64,
    ) -> Result<RecoverableSignature> {
        let extras = MessageKind::Proposal { sequence }.extras();
        Ok(sign_fingerprint(&self.keypair, &record.with_root(root), &extras)?)
    }

    /// Sign a standalone claim for one impression against `record`.
    pub fn sign_claim(
        &self,
        record: &ChannelRecord,
        impression: &ImpressionRecord,
    ) -> Result<RecoverableSignature> {
        let extras = MessageKind::claim(impression).extras();
        Ok(sign_fingerprint(&self.keypair, record, &extras)?)
    }

    /// Whether `signature` is `expected`'s claim for `impression` against `record`.
    pub fn verify_claim(
        &self,
        record: &ChannelRecord,
        impression: &ImpressionRecord,
        signature: &RecoverableSignature,
        expected: &Address,
    ) -> bool {
        let extras = MessageKind::claim(impression).extras();
        verify_signature(record, &extras, signature, expected)
    }

    /// Build and sign challenge evidence for the log at `root` covering `sequence`.
    pub fn sign_evidence(
        &self,
        record: &ChannelRecord,
        root: Hash32,
        sequence: u64,
    ) -> Result<(ChallengeEvidence, RecoverableSignature)> {
        let evidence = ChallengeEvidence { root, sequence };
        let signature = evidence.sign(record, &self.keypair)?;
        Ok((evidence, signature))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a checkpoint proposal and return the resulting record.
    ///
    /// If a retry finds the root already proposed or finalized, that record
    /// is returned without resubmitting. A rejection is only resubmitted when
    /// the channel moved since the previous attempt.
    pub async fn propose_checkpoint(
        &self,
        channel_id: &ChannelId,
        root: Hash32,
        sequence: u64,
        signature: &RecoverableSignature,
    ) -> Result<ChannelRecord> {
        let mut before = self.channel(channel_id).await?;
        let mut attempt = 0;
        loop {
            let err = match self
                .authority
                .propose_checkpoint(&self.address(), channel_id, root, sequence, signature)
                .await
            {
                Ok(()) => {
                    info!(channel = %channel_id, root = %root, sequence, "proposed checkpoint");
                    return self.channel(channel_id).await;
                }
                Err(err) => err,
            };

            let record = self
                .reread_for_retry(channel_id, err.clone(), &mut attempt, "propose")
                .await?;
            if (record.has_proposal() && record.proposed_root == root) || record.root == root {
                debug!(channel = %channel_id, root = %root, "checkpoint already in place");
                return Ok(record);
            }
            if record == before {
                return Err(err.into());
            }
            before = record;
        }
    }

    /// Challenge the outstanding proposal with signed evidence.
    pub async fn challenge_checkpoint(
        &self,
        channel_id: &ChannelId,
        evidence: &ChallengeEvidence,
        signature: &RecoverableSignature,
    ) -> Result<ChannelRecord> {
        let mut before = self.channel(channel_id).await?;
        let mut attempt = 0;
        loop {
            let err = match self
                .authority
                .challenge_checkpoint(&self.address(), channel_id, evidence, signature)
                .await
            {
                Ok(()) => {
                    info!(channel = %channel_id, sequence = evidence.sequence, "challenged checkpoint");
                    return self.channel(channel_id).await;
                }
                Err(err) => err,
            };

            let record = self
                .reread_for_retry(channel_id, err.clone(), &mut attempt, "challenge")
                .await?;
            if !record.has_proposal() || record == before {
                // Finalized or cancelled in the meantime, or nothing moved
                return Err(err.into());
            }
            before = record;
        }
    }

    /// Apply a due finalization. Returns whether a proposal was finalized.
    ///
    /// Polls the authority's height and only submits when the challenge
    /// window has passed.
    pub async fn finalize_if_due(&self, channel_id: &ChannelId) -> Result<bool> {
        let (record, height) = self.read(channel_id).await?;
        match lifecycle::finalize(&record, height) {
            Finalization::Finalized(_) => {
                let applied = self
                    .authority
                    .finalize_checkpoint(&self.address(), channel_id)
                    .await?;
                self.channel(channel_id).await?;
                Ok(applied)
            }
            Finalization::Pending { challenge_timeout } => {
                debug!(channel = %channel_id, height, challenge_timeout, "finalization not due");
                Ok(false)
            }
            Finalization::Nothing => Ok(false),
        }
    }

    /// Close an unused channel past its expiration.
    pub async fn close_expired(&self, channel_id: &ChannelId) -> Result<ChannelRecord> {
        let (record, height) = self.read(channel_id).await?;
        lifecycle::close_expired(&effective_view(&record, height), &self.address(), height)?;

        self.authority
            .close_expired_channel(&self.address(), channel_id)
            .await?;
        info!(channel = %channel_id, "closed expired channel");
        self.channel(channel_id).await
    }

    /// Re-read the channel after a rejection, or surface the rejection.
    async fn reread_for_retry(
        &self,
        channel_id: &ChannelId,
        err: AuthorityError,
        attempt: &mut u32,
        action: &'static str,
    ) -> Result<ChannelRecord> {
        if !err.is_retryable() || *attempt >= self.config.max_retries {
            warn!(channel = %channel_id, action, attempts = *attempt, error = %err, "call rejected");
            return Err(err.into());
        }
        *attempt += 1;
        warn!(channel = %channel_id, action, attempt = *attempt, error = %err, "retrying");
        tokio::task::yield_now().await;
        self.channel(channel_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit
    // ─────────────────────────────────────────────────────────────────────────

    /// Prove inclusion of the impression at `sequence` in the full local log.
    ///
    /// Returns the impression, its proof, and the root the proof is against.
    pub async fn prove_impression(
        &self,
        channel_id: &ChannelId,
        sequence: u64,
    ) -> Result<(ImpressionRecord, MerkleProof, Hash32)> {
        let log = self.store.impressions(channel_id).await?;
        let not_found = || EvaveError::ImpressionNotFound {
            channel_id: *channel_id,
            sequence,
        };

        let index = usize::try_from(sequence)
            .ok()
            .and_then(|s| s.checked_sub(1))
            .ok_or_else(not_found)?;
        let impression = *log.get(index).ok_or_else(not_found)?;

        let tree = MerkleTree::from_impressions(&log)?;
        let proof = tree.proof(index)?;
        Ok((impression, proof, tree.root()))
    }

    /// Check an impression against a root without any local state.
    pub fn audit_impression(
        &self,
        root: &Hash32,
        impression: &ImpressionRecord,
        proof: &MerkleProof,
    ) -> Result<bool> {
        let leaf = impression.leaf_hash()?;
        Ok(merkle::verify(root, &leaf, proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evave_authority::{AuthorityConfig, MemoryAuthority};
    use evave_core::keccak256;
    use evave_store::MemoryStore;

    type Manager = ChannelManager<MemoryAuthority, MemoryStore>;

    const OWNER: Address = Address::from_bytes([0x01; 20]);
    const CONTRACT: Address = Address::from_bytes([0x12; 20]);

    async fn setup(config: ManagerConfig) -> (Arc<MemoryAuthority>, Manager, Manager) {
        let authority = Arc::new(MemoryAuthority::new(AuthorityConfig::new(CONTRACT, OWNER)));
        let demand = Keypair::from_secret(&[0x0a; 32]).unwrap();
        let supply = Keypair::from_secret(&[0x0b; 32]).unwrap();
        authority
            .register_demand(&OWNER, &demand.address(), "https://demand")
            .await
            .unwrap();
        authority
            .register_supply(&OWNER, &supply.address(), "https://supply")
            .await
            .unwrap();

        let demand = ChannelManager::new(
            demand,
            Arc::clone(&authority),
            MemoryStore::new(),
            config.clone(),
        );
        let supply = ChannelManager::new(supply, Arc::clone(&authority), MemoryStore::new(), config);
        (authority, demand, supply)
    }

    fn impression_id(n: u64) -> Hash32 {
        keccak256(format!("impression-{}", n).as_bytes())
    }

    #[tokio::test]
    async fn test_open_and_read() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        assert_eq!(record.state, ChannelState::Open);
        assert_eq!(record.contract_id, CONTRACT);

        let seen = supply.channel(&record.channel_id).await.unwrap();
        assert_eq!(seen, record);

        let observed = supply
            .store()
            .get_channel(&record.channel_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.record, record);
    }

    #[tokio::test]
    async fn test_record_and_accept() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;

        let first = supply.record_impression(&id, impression_id(1), 100).await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(
            demand.accept_update(&first).await.unwrap(),
            AcceptOutcome::Accepted {
                sequence: 1,
                root: first.root()
            }
        );
        assert_eq!(demand.accept_update(&first).await.unwrap(), AcceptOutcome::Duplicate);

        let second = supply.record_impression(&id, impression_id(2), 250).await.unwrap();
        demand.accept_update(&second).await.unwrap();
        assert_eq!(demand.log_root(&id).await.unwrap(), supply.log_root(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_reject_forged_update() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();

        let mut update = supply
            .record_impression(&record.channel_id, impression_id(1), 100)
            .await
            .unwrap();
        update.impression.price = 1;
        assert!(matches!(
            demand.accept_update(&update).await,
            Err(EvaveError::InvalidUpdate(_))
        ));

        // An update signed by demand is not from supply
        let demand_key = Keypair::from_secret(&[0x0a; 32]).unwrap();
        let impression = ImpressionRecord::new(impression_id(1), 100, 1);
        let root = MerkleTree::from_impressions(&[impression]).unwrap().root();
        let forged = SignedUpdate::make(record.with_root(root), impression, 1, &demand_key).unwrap();
        assert!(matches!(
            demand.accept_update(&forged).await,
            Err(EvaveError::InvalidUpdate(_))
        ));
    }

    #[tokio::test]
    async fn test_only_supply_records_impressions() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;

        assert!(matches!(
            demand.record_impression(&id, impression_id(1), 100).await,
            Err(EvaveError::WrongRole { role: "supply", .. })
        ));
        assert_eq!(demand.store().impression_count(&id).await.unwrap(), 0);

        let update = supply.record_impression(&id, impression_id(1), 100).await.unwrap();
        assert!(matches!(
            supply.accept_update(&update).await,
            Err(EvaveError::WrongRole { role: "demand", .. })
        ));
        assert_eq!(supply.store().impression_count(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_impressions_on_closed_channel() {
        let (authority, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;

        authority.advance_blocks(11).await;
        demand.close_expired(&id).await.unwrap();

        assert!(matches!(
            supply.record_impression(&id, impression_id(1), 100).await,
            Err(EvaveError::Transition(TransitionError::IllegalTransition {
                state: ChannelState::Closed,
                ..
            }))
        ));
        assert_eq!(supply.store().impression_count(&id).await.unwrap(), 0);
        assert!(supply.latest_update(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_skipped_update() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;

        supply.record_impression(&id, impression_id(1), 1).await.unwrap();
        let second = supply.record_impression(&id, impression_id(2), 2).await.unwrap();
        assert!(matches!(
            demand.accept_update(&second).await,
            Err(EvaveError::InvalidUpdate(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_signature() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let impression = ImpressionRecord::new(impression_id(1), 42, 1);

        let sig = supply.sign_claim(&record, &impression).unwrap();
        assert!(demand.verify_claim(&record, &impression, &sig, &supply.address()));
        assert!(!demand.verify_claim(&record, &impression, &sig, &demand.address()));

        let altered = ImpressionRecord::new(impression_id(1), 43, 1);
        assert!(!demand.verify_claim(&record, &altered, &sig, &supply.address()));
    }

    #[tokio::test]
    async fn test_prove_and_audit() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;
        for n in 1..=5 {
            supply.record_impression(&id, impression_id(n), n as u128).await.unwrap();
        }

        let (impression, proof, root) = supply.prove_impression(&id, 3).await.unwrap();
        assert_eq!(impression.sequence, 3);
        assert!(demand.audit_impression(&root, &impression, &proof).unwrap());

        let forged = ImpressionRecord::new(impression_id(3), 999, 3);
        assert!(!demand.audit_impression(&root, &forged, &proof).unwrap());

        assert!(matches!(
            supply.prove_impression(&id, 0).await,
            Err(EvaveError::ImpressionNotFound { .. })
        ));
        assert!(matches!(
            supply.prove_impression(&id, 6).await,
            Err(EvaveError::ImpressionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_finalize_if_due() {
        let (authority, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;
        let root = keccak256(b"root");

        let sig = demand.sign_checkpoint(&record, root, 1).unwrap();
        let proposed = demand.propose_checkpoint(&id, root, 1, &sig).await.unwrap();
        assert_eq!(proposed.state, ChannelState::Checkpointing);

        assert!(!supply.finalize_if_due(&id).await.unwrap());

        authority.advance_blocks(10).await;
        // The view already shows the root before anyone applies it
        assert_eq!(supply.channel(&id).await.unwrap().root, root);
        assert!(supply.finalize_if_due(&id).await.unwrap());
        assert!(!supply.finalize_if_due(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_propose_retry_finds_existing_proposal() {
        let (_, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;
        let root = keccak256(b"root");
        let sig = demand.sign_checkpoint(&record, root, 1).unwrap();

        demand.propose_checkpoint(&id, root, 1, &sig).await.unwrap();
        // The same proposal submitted by the counterparty is already in place
        let again = supply.propose_checkpoint(&id, root, 1, &sig).await.unwrap();
        assert_eq!(again.proposed_root, root);
    }

    #[tokio::test]
    async fn test_propose_on_unchanged_channel_is_not_retried() {
        let (authority, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;

        let first = keccak256(b"first");
        let sig = demand.sign_checkpoint(&record, first, 1).unwrap();
        demand.propose_checkpoint(&id, first, 1, &sig).await.unwrap();

        let second = keccak256(b"second");
        let sig = demand.sign_checkpoint(&record, second, 2).unwrap();
        let before = authority.block_number().await.unwrap();
        let err = demand.propose_checkpoint(&id, second, 2, &sig).await.unwrap_err();
        assert!(matches!(
            err,
            EvaveError::Authority(AuthorityError::Transition(
                TransitionError::IllegalTransition { .. }
            ))
        ));
        // The outstanding proposal did not move, so one submission only
        assert_eq!(authority.block_number().await.unwrap(), before + 1);
    }

    #[tokio::test]
    async fn test_wrong_signer_is_submitted_once() {
        let (authority, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;
        let root = keccak256(b"root");

        // Default policy wants demand's signature
        let sig = supply.sign_checkpoint(&record, root, 1).unwrap();
        let before = authority.block_number().await.unwrap();
        let err = supply.propose_checkpoint(&id, root, 1, &sig).await.unwrap_err();
        assert!(matches!(
            err,
            EvaveError::Authority(AuthorityError::AuthenticationFailed(_))
        ));
        assert_eq!(authority.block_number().await.unwrap(), before + 1);
        assert_eq!(supply.channel(&id).await.unwrap().state, ChannelState::Open);
    }

    #[tokio::test]
    async fn test_stale_challenge_is_not_retried() {
        let (authority, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;
        let root = keccak256(b"root");
        let sig = demand.sign_checkpoint(&record, root, 1).unwrap();
        demand.propose_checkpoint(&id, root, 1, &sig).await.unwrap();

        authority.advance_blocks(10).await;
        let before = authority.block_number().await.unwrap();
        let (evidence, sig) = supply.sign_evidence(&record, keccak256(b"newer"), 2).unwrap();
        let err = supply.challenge_checkpoint(&id, &evidence, &sig).await.unwrap_err();
        assert!(matches!(
            err,
            EvaveError::Authority(AuthorityError::Transition(
                TransitionError::StaleChallenge { .. }
            ))
        ));
        // Exactly one submission
        assert_eq!(authority.block_number().await.unwrap(), before + 1);
    }

    #[tokio::test]
    async fn test_close_expired_checks_locally() {
        let (authority, demand, supply) = setup(ManagerConfig::default()).await;
        let record = demand.open_channel(&supply.address()).await.unwrap();
        let id = record.channel_id;

        let before = authority.block_number().await.unwrap();
        assert!(matches!(
            supply.close_expired(&id).await,
            Err(EvaveError::Transition(TransitionError::NotExpired { .. }))
        ));
        assert_eq!(authority.block_number().await.unwrap(), before);

        authority.advance_blocks(11).await;
        let closed = supply.close_expired(&id).await.unwrap();
        assert_eq!(closed.state, ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let (_, demand, _) = setup(ManagerConfig::default()).await;
        let id = evave_core::derive_channel_id(7);
        assert!(matches!(
            demand.channel(&id).await,
            Err(EvaveError::Authority(AuthorityError::ChannelNotFound(_)))
        ));
    }
}
