//! In-memory settlement authority.
//!
//! Enforces the same rules as the on-chain authority over local state: an
//! owner-managed registry, signer policy checked against recomputed
//! fingerprints, and the pure lifecycle transitions. Every mutating call is
//! evaluated at the current height and then mines one block, whether it
//! succeeds or not.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use evave_core::canonical::MAX_STRING_LEN;
use evave_core::lifecycle::{self, Finalization};
use evave_core::{
    verify_signature, Address, BlockHeight, ChallengeEvidence, ChannelId, ChannelRecord, Hash32,
    MessageKind, RecoverableSignature, TransitionError,
};

use crate::config::{AuthorityConfig, SignerRole};
use crate::error::{AuthorityError, Result};
use crate::event::{EventKind, LogEvent};
use crate::traits::Authority;

/// Which registry a participant is listed in.
#[derive(Debug, Clone, Copy)]
enum Role {
    Demand,
    Supply,
}

impl Role {
    fn registered(self) -> EventKind {
        match self {
            Role::Demand => EventKind::DemandRegistered,
            Role::Supply => EventKind::SupplyRegistered,
        }
    }

    fn deregistered(self) -> EventKind {
        match self {
            Role::Demand => EventKind::DemandDeregistered,
            Role::Supply => EventKind::SupplyDeregistered,
        }
    }

    fn url_updated(self) -> EventKind {
        match self {
            Role::Demand => EventKind::DemandUrlUpdated,
            Role::Supply => EventKind::SupplyUrlUpdated,
        }
    }
}

struct ChannelEntry {
    record: ChannelRecord,
    /// Sequence declared with the outstanding proposal.
    proposal_sequence: u64,
}

#[derive(Default)]
struct AuthorityState {
    height: BlockHeight,
    channel_count: u64,
    channels: HashMap<ChannelId, ChannelEntry>,
    demand_urls: HashMap<Address, String>,
    supply_urls: HashMap<Address, String>,
    logs: Vec<LogEvent>,
}

impl AuthorityState {
    fn urls(&mut self, role: Role) -> &mut HashMap<Address, String> {
        match role {
            Role::Demand => &mut self.demand_urls,
            Role::Supply => &mut self.supply_urls,
        }
    }

    fn channel_mut(&mut self, channel_id: &ChannelId) -> Result<&mut ChannelEntry> {
        self.channels
            .get_mut(channel_id)
            .ok_or(AuthorityError::ChannelNotFound(*channel_id))
    }
}

/// An in-memory authority for tests and local simulation.
///
/// Thread-safe via an async RwLock; calls are serialized the way a ledger
/// serializes transactions.
pub struct MemoryAuthority {
    config: AuthorityConfig,
    state: RwLock<AuthorityState>,
}

impl MemoryAuthority {
    /// Create an authority at height 0 with no channels and an empty registry.
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            state: RwLock::new(AuthorityState::default()),
        }
    }

    /// The deployment configuration.
    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Mine `n` empty blocks.
    pub async fn advance_blocks(&self, n: u64) {
        let mut state = self.state.write().await;
        state.height = state.height.saturating_add(n);
        debug!(height = state.height, "advanced blocks");
    }

    /// Run a mutating call at the current height, then mine its block.
    async fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut AuthorityState, BlockHeight) -> Result<T> + Send,
    {
        let mut state = self.state.write().await;
        let height = state.height;
        let result = f(&mut state, height);
        state.height += 1;
        result
    }

    fn require_owner(&self, caller: &Address, action: &'static str) -> Result<()> {
        if *caller != self.config.owner {
            warn!(caller = %caller, action, "unauthorized registry call");
            return Err(AuthorityError::Unauthorized {
                caller: *caller,
                action,
            });
        }
        Ok(())
    }

    fn resolve_signer(
        role: SignerRole,
        record: &ChannelRecord,
        caller: &Address,
        action: &'static str,
    ) -> Result<Address> {
        role.resolve(record, caller)
            .ok_or(AuthorityError::Unauthorized {
                caller: *caller,
                action,
            })
    }

    async fn register(&self, role: Role, caller: &Address, who: &Address, url: &str) -> Result<()> {
        self.execute(|state, height| {
            self.require_owner(caller, "register participants")?;
            validate_url(url)?;
            state.urls(role).insert(*who, url.to_string());
            state.logs.push(LogEvent::new(
                role.registered(),
                height,
                &[*who],
                url.as_bytes().to_vec(),
            ));
            info!(participant = %who, ?role, "registered");
            Ok(())
        })
        .await
    }

    async fn deregister(&self, role: Role, caller: &Address, who: &Address) -> Result<()> {
        self.execute(|state, height| {
            self.require_owner(caller, "deregister participants")?;
            if state.urls(role).remove(who).is_none() {
                return Err(AuthorityError::NotRegistered(*who));
            }
            state
                .logs
                .push(LogEvent::new(role.deregistered(), height, &[*who], Vec::new()));
            info!(participant = %who, ?role, "deregistered");
            Ok(())
        })
        .await
    }

    async fn update_url(&self, role: Role, caller: &Address, url: &str) -> Result<()> {
        self.execute(|state, height| {
            validate_url(url)?;
            let entry = state
                .urls(role)
                .get_mut(caller)
                .ok_or(AuthorityError::NotRegistered(*caller))?;
            *entry = url.to_string();
            state.logs.push(LogEvent::new(
                role.url_updated(),
                height,
                &[*caller],
                url.as_bytes().to_vec(),
            ));
            Ok(())
        })
        .await
    }

    async fn url(&self, role: Role, who: &Address) -> String {
        let state = self.state.read().await;
        let urls = match role {
            Role::Demand => &state.demand_urls,
            Role::Supply => &state.supply_urls,
        };
        urls.get(who).cloned().unwrap_or_default()
    }
}

fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(AuthorityError::InvalidUrl("url is empty".into()));
    }
    if url.len() > MAX_STRING_LEN {
        return Err(AuthorityError::InvalidUrl(format!(
            "url of {} bytes exceeds maximum of {}",
            url.len(),
            MAX_STRING_LEN
        )));
    }
    Ok(())
}

fn channel_data(channel_id: &ChannelId, root: Option<&Hash32>) -> Vec<u8> {
    let mut data = channel_id.as_bytes().to_vec();
    if let Some(root) = root {
        data.extend_from_slice(&root.0);
    }
    data
}

fn require_participant(record: &ChannelRecord, caller: &Address) -> Result<()> {
    if !record.is_participant(caller) {
        return Err(TransitionError::NotParticipant(*caller).into());
    }
    Ok(())
}

#[async_trait]
impl Authority for MemoryAuthority {
    async fn open_channel(&self, caller: &Address, supply: &Address) -> Result<ChannelId> {
        let params = self.config.params();
        let contract_id = self.config.contract_id;

        self.execute(|state, height| {
            if !state.demand_urls.contains_key(caller) {
                return Err(AuthorityError::NotRegistered(*caller));
            }
            if !state.supply_urls.contains_key(supply) {
                return Err(AuthorityError::NotRegistered(*supply));
            }

            let record = lifecycle::open(
                contract_id,
                state.channel_count,
                *caller,
                *supply,
                height,
                &params,
            )?;
            let channel_id = record.channel_id;

            state.channel_count += 1;
            state.channels.insert(
                channel_id,
                ChannelEntry {
                    record,
                    proposal_sequence: 0,
                },
            );
            state.logs.push(LogEvent::new(
                EventKind::ChannelOpened,
                height,
                &[*caller, *supply],
                channel_data(&channel_id, None),
            ));

            info!(channel = %channel_id, demand = %caller, supply = %supply, "channel opened");
            Ok(channel_id)
        })
        .await
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Vec<u8>> {
        let state = self.state.read().await;
        state
            .channels
            .get(channel_id)
            .map(|entry| entry.record.to_bytes())
            .ok_or(AuthorityError::ChannelNotFound(*channel_id))
    }

    async fn propose_checkpoint(
        &self,
        caller: &Address,
        channel_id: &ChannelId,
        proposed_root: Hash32,
        sequence: u64,
        signature: &RecoverableSignature,
    ) -> Result<()> {
        let params = self.config.params();
        let policy = self.config.proposal_signer;

        self.execute(|state, height| {
            let entry = state.channel_mut(channel_id)?;
            require_participant(&entry.record, caller)?;

            let next = lifecycle::propose(&entry.record, proposed_root, height, &params)?;

            let signer = Self::resolve_signer(policy, &entry.record, caller, "propose")?;
            let extras = MessageKind::Proposal { sequence }.extras();
            if !verify_signature(
                &entry.record.with_root(proposed_root),
                &extras,
                signature,
                &signer,
            ) {
                warn!(channel = %channel_id, caller = %caller, sequence, "proposal signature rejected");
                return Err(AuthorityError::AuthenticationFailed(format!(
                    "proposal at sequence {} not signed by {}",
                    sequence, signer
                )));
            }

            let finalized = match lifecycle::finalize(&entry.record, height) {
                Finalization::Finalized(record) => Some(record.root),
                Finalization::Pending { .. } | Finalization::Nothing => None,
            };

            entry.record = next;
            entry.proposal_sequence = sequence;

            if let Some(root) = finalized {
                state.logs.push(LogEvent::new(
                    EventKind::CheckpointFinalized,
                    height,
                    &[*caller],
                    channel_data(channel_id, Some(&root)),
                ));
            }
            state.logs.push(LogEvent::new(
                EventKind::CheckpointProposed,
                height,
                &[*caller],
                channel_data(channel_id, Some(&proposed_root)),
            ));

            info!(
                channel = %channel_id,
                root = %proposed_root,
                sequence,
                "checkpoint proposed"
            );
            Ok(())
        })
        .await
    }

    async fn challenge_checkpoint(
        &self,
        caller: &Address,
        channel_id: &ChannelId,
        evidence: &ChallengeEvidence,
        signature: &RecoverableSignature,
    ) -> Result<()> {
        let policy = self.config.evidence_signer;

        self.execute(|state, height| {
            let entry = state.channel_mut(channel_id)?;
            require_participant(&entry.record, caller)?;

            let next = lifecycle::challenge(
                &entry.record,
                entry.proposal_sequence,
                evidence.sequence,
                height,
            )
            .map_err(|e| {
                warn!(channel = %channel_id, error = %e, "challenge rejected");
                e
            })?;

            let signer = Self::resolve_signer(policy, &entry.record, caller, "challenge")?;
            if !evidence.verify(&entry.record, signature, &signer) {
                warn!(channel = %channel_id, caller = %caller, "evidence signature rejected");
                return Err(AuthorityError::AuthenticationFailed(format!(
                    "evidence not signed by {}",
                    signer
                )));
            }

            entry.record = next;
            entry.proposal_sequence = 0;
            state.logs.push(LogEvent::new(
                EventKind::CheckpointChallenged,
                height,
                &[*caller],
                channel_data(channel_id, None),
            ));

            info!(channel = %channel_id, sequence = evidence.sequence, "checkpoint challenged");
            Ok(())
        })
        .await
    }

    async fn finalize_checkpoint(&self, caller: &Address, channel_id: &ChannelId) -> Result<bool> {
        self.execute(|state, height| {
            let entry = state.channel_mut(channel_id)?;
            match lifecycle::finalize(&entry.record, height) {
                Finalization::Finalized(record) => {
                    let root = record.root;
                    entry.record = record;
                    entry.proposal_sequence = 0;
                    state.logs.push(LogEvent::new(
                        EventKind::CheckpointFinalized,
                        height,
                        &[*caller],
                        channel_data(channel_id, Some(&root)),
                    ));
                    info!(channel = %channel_id, root = %root, "checkpoint finalized");
                    Ok(true)
                }
                Finalization::Pending { challenge_timeout } => {
                    debug!(channel = %channel_id, challenge_timeout, "checkpoint not yet due");
                    Ok(false)
                }
                Finalization::Nothing => Ok(false),
            }
        })
        .await
    }

    async fn close_expired_channel(&self, caller: &Address, channel_id: &ChannelId) -> Result<()> {
        self.execute(|state, height| {
            let entry = state.channel_mut(channel_id)?;
            let view = lifecycle::effective_view(&entry.record, height);
            let next = lifecycle::close_expired(&view, caller, height)?;

            entry.record = next;
            state.logs.push(LogEvent::new(
                EventKind::ChannelExpired,
                height,
                &[*caller],
                channel_data(channel_id, None),
            ));

            info!(channel = %channel_id, "expired channel closed");
            Ok(())
        })
        .await
    }

    async fn channel_count(&self) -> Result<u64> {
        Ok(self.state.read().await.channel_count)
    }

    async fn channel_timeout(&self) -> Result<u64> {
        Ok(self.config.channel_timeout)
    }

    async fn challenge_period(&self) -> Result<u64> {
        Ok(self.config.challenge_period)
    }

    async fn contract_id(&self) -> Result<Address> {
        Ok(self.config.contract_id)
    }

    async fn block_number(&self) -> Result<BlockHeight> {
        Ok(self.state.read().await.height)
    }

    async fn register_demand(&self, caller: &Address, demand: &Address, url: &str) -> Result<()> {
        self.register(Role::Demand, caller, demand, url).await
    }

    async fn register_supply(&self, caller: &Address, supply: &Address, url: &str) -> Result<()> {
        self.register(Role::Supply, caller, supply, url).await
    }

    async fn deregister_demand(&self, caller: &Address, demand: &Address) -> Result<()> {
        self.deregister(Role::Demand, caller, demand).await
    }

    async fn deregister_supply(&self, caller: &Address, supply: &Address) -> Result<()> {
        self.deregister(Role::Supply, caller, supply).await
    }

    async fn update_demand_url(&self, caller: &Address, url: &str) -> Result<()> {
        self.update_url(Role::Demand, caller, url).await
    }

    async fn update_supply_url(&self, caller: &Address, url: &str) -> Result<()> {
        self.update_url(Role::Supply, caller, url).await
    }

    async fn registered_demand(&self, demand: &Address) -> Result<String> {
        Ok(self.url(Role::Demand, demand).await)
    }

    async fn registered_supply(&self, supply: &Address) -> Result<String> {
        Ok(self.url(Role::Supply, supply).await)
    }

    async fn logs(&self, from_height: BlockHeight) -> Result<Vec<LogEvent>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .filter(|log| log.block >= from_height)
            .cloned()
            .collect())
    }
}
