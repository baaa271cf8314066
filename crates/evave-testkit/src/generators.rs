//! Proptest generators for property-based testing.

use proptest::prelude::*;

use evave_core::{
    derive_channel_id, Address, ChannelRecord, ChannelState, Hash32, ImpressionRecord, Keypair,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_filter_map("invalid secret", |secret| Keypair::from_secret(&secret).ok())
}

/// Generate a random 32-byte word.
pub fn hash32() -> impl Strategy<Value = Hash32> {
    any::<[u8; 32]>().prop_map(Hash32::from_bytes)
}

/// Generate a random address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate a channel state.
pub fn channel_state() -> impl Strategy<Value = ChannelState> {
    prop_oneof![
        Just(ChannelState::Open),
        Just(ChannelState::Checkpointing),
        Just(ChannelState::Closed),
    ]
}

/// Generate an arbitrary, not necessarily reachable, channel record.
pub fn channel_record() -> impl Strategy<Value = ChannelRecord> {
    (
        address(),
        any::<u64>(),
        address(),
        address(),
        hash32(),
        channel_state(),
        any::<u64>(),
        any::<u64>(),
        hash32(),
    )
        .prop_map(
            |(contract_id, count, demand, supply, root, state, expiration, challenge_timeout, proposed_root)| {
                ChannelRecord {
                    contract_id,
                    channel_id: derive_channel_id(count),
                    demand,
                    supply,
                    root,
                    state,
                    expiration,
                    challenge_timeout,
                    proposed_root,
                }
            },
        )
}

/// Generate a contiguous impression log of up to `max_len` entries.
pub fn impression_log(max_len: usize) -> impl Strategy<Value = Vec<ImpressionRecord>> {
    prop::collection::vec((hash32(), any::<u128>()), 0..=max_len).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (id, price))| ImpressionRecord::new(id, price, i as u64 + 1))
            .collect()
    })
}
