//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a shared in-memory authority
//! with a registered demand and supply party, each running its own manager.

use std::sync::Arc;

use rand::RngCore;

use evave::{ChannelManager, ManagerConfig};
use evave_authority::{Authority, AuthorityConfig, MemoryAuthority};
use evave_core::{keccak256, Address, ChannelRecord, Hash32, Keypair};
use evave_store::MemoryStore;

/// A manager over the in-memory authority and store.
pub type MemoryManager = ChannelManager<MemoryAuthority, MemoryStore>;

/// Registrar of the fixture deployment.
pub const OWNER_SECRET: [u8; 32] = [0x01; 32];
/// The demand party.
pub const DEMAND_SECRET: [u8; 32] = [0x0a; 32];
/// The supply party.
pub const SUPPLY_SECRET: [u8; 32] = [0x0b; 32];
/// Address of the fixture authority.
pub const CONTRACT_ID: Address = Address::from_bytes([0xc0; 20]);

/// A deployment with two registered parties.
pub struct Deployment {
    pub authority: Arc<MemoryAuthority>,
    pub owner: Keypair,
    pub demand: MemoryManager,
    pub supply: MemoryManager,
}

impl Deployment {
    /// Deploy with default windows and signer policy.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(AuthorityConfig::default(), ManagerConfig::default()).await
    }

    /// Deploy with explicit configuration. `contract_id` and `owner` are
    /// overridden with the fixture's.
    pub async fn with_config(
        mut config: AuthorityConfig,
        manager: ManagerConfig,
    ) -> anyhow::Result<Self> {
        let owner = Keypair::from_secret(&OWNER_SECRET)?;
        config.contract_id = CONTRACT_ID;
        config.owner = owner.address();

        let authority = Arc::new(MemoryAuthority::new(config));
        let demand = Keypair::from_secret(&DEMAND_SECRET)?;
        let supply = Keypair::from_secret(&SUPPLY_SECRET)?;

        authority
            .register_demand(&owner.address(), &demand.address(), "https://demand.test")
            .await?;
        authority
            .register_supply(&owner.address(), &supply.address(), "https://supply.test")
            .await?;

        Ok(Self {
            demand: ChannelManager::new(
                demand,
                Arc::clone(&authority),
                MemoryStore::new(),
                manager.clone(),
            ),
            supply: ChannelManager::new(
                supply,
                Arc::clone(&authority),
                MemoryStore::new(),
                manager,
            ),
            authority,
            owner,
        })
    }

    /// Open a channel from demand to supply.
    pub async fn open(&self) -> anyhow::Result<ChannelRecord> {
        Ok(self.demand.open_channel(&self.supply.address()).await?)
    }

    /// Current height of the authority.
    pub async fn height(&self) -> anyhow::Result<u64> {
        Ok(self.authority.block_number().await?)
    }

    /// Mine `n` empty blocks.
    pub async fn mine(&self, n: u64) {
        self.authority.advance_blocks(n).await;
    }
}

/// Deterministic impression identifier for the `n`-th test impression.
pub fn impression_id(n: u64) -> Hash32 {
    keccak256(format!("impression-{}", n).as_bytes())
}

/// A random impression identifier.
pub fn random_impression_id() -> Hash32 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Hash32::from_bytes(bytes)
}

/// Deterministic keypairs for multi-party tests.
pub fn keypairs(count: usize) -> Vec<Keypair> {
    (0..count)
        .filter_map(|i| {
            let mut secret = [0u8; 32];
            secret[31] = i as u8 + 1;
            Keypair::from_secret(&secret).ok()
        })
        .collect()
}
