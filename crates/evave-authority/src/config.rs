//! Deployment configuration of a settlement authority.

use serde::{Deserialize, Serialize};

use evave_core::{Address, ChannelRecord, LifecycleParams};

/// Which party's key must sign a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerRole {
    /// The channel's demand participant.
    Demand,
    /// The channel's supply participant.
    Supply,
    /// Whoever submits the call.
    Submitter,
    /// The participant opposite the submitter.
    Counterparty,
}

impl SignerRole {
    /// The address that must have signed, for a call by `caller` on `record`.
    ///
    /// `None` when the role is undefined for this caller (a counterparty of a
    /// non-participant).
    pub fn resolve(&self, record: &ChannelRecord, caller: &Address) -> Option<Address> {
        match self {
            SignerRole::Demand => Some(record.demand),
            SignerRole::Supply => Some(record.supply),
            SignerRole::Submitter => Some(*caller),
            SignerRole::Counterparty => record.counterparty(caller),
        }
    }
}

/// Configuration for an authority deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Address of this authority instance, bound into every fingerprint.
    pub contract_id: Address,
    /// The registrar allowed to register and deregister participants.
    pub owner: Address,
    /// Blocks an unused channel stays open.
    pub channel_timeout: u64,
    /// Blocks a checkpoint proposal can be challenged.
    pub challenge_period: u64,
    /// Who signs checkpoint proposals.
    pub proposal_signer: SignerRole,
    /// Who signs challenge evidence.
    pub evidence_signer: SignerRole,
}

impl AuthorityConfig {
    /// Default windows and signer policy for a deployment.
    pub fn new(contract_id: Address, owner: Address) -> Self {
        Self {
            contract_id,
            owner,
            ..Self::default()
        }
    }

    /// The lifecycle windows of this deployment.
    pub fn params(&self) -> LifecycleParams {
        LifecycleParams {
            channel_timeout: self.channel_timeout,
            challenge_period: self.challenge_period,
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        let params = LifecycleParams::default();
        Self {
            contract_id: Address::ZERO,
            owner: Address::ZERO,
            channel_timeout: params.channel_timeout,
            challenge_period: params.challenge_period,
            proposal_signer: SignerRole::Demand,
            evidence_signer: SignerRole::Submitter,
        }
    }
}
