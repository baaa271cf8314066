//! Event logs emitted by the authority.
//!
//! Each log carries `topics[0] = keccak256(event signature)` and the acting or
//! affected participant as `topics[1]`, left-padded to a word. Channel events
//! put the channel identifier in the first data word.

use serde::{Deserialize, Serialize};

use evave_core::canonical::parse_log_address;
use evave_core::{keccak256, Address, BlockHeight, ChannelId, CoreError, Hash32};

/// Events emitted by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DemandRegistered,
    DemandDeregistered,
    DemandUrlUpdated,
    SupplyRegistered,
    SupplyDeregistered,
    SupplyUrlUpdated,
    ChannelOpened,
    CheckpointProposed,
    CheckpointChallenged,
    CheckpointFinalized,
    ChannelExpired,
}

impl EventKind {
    /// The event's declared signature.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::DemandRegistered => "DemandRegistered(address,string)",
            EventKind::DemandDeregistered => "DemandDeregistered(address)",
            EventKind::DemandUrlUpdated => "DemandUrlUpdated(address,string)",
            EventKind::SupplyRegistered => "SupplyRegistered(address,string)",
            EventKind::SupplyDeregistered => "SupplyDeregistered(address)",
            EventKind::SupplyUrlUpdated => "SupplyUrlUpdated(address,string)",
            EventKind::ChannelOpened => "ChannelOpened(address,address,bytes32)",
            EventKind::CheckpointProposed => "CheckpointProposed(address,bytes32,bytes32)",
            EventKind::CheckpointChallenged => "CheckpointChallenged(address,bytes32)",
            EventKind::CheckpointFinalized => "CheckpointFinalized(address,bytes32,bytes32)",
            EventKind::ChannelExpired => "ChannelExpired(address,bytes32)",
        }
    }

    /// `keccak256` of the signature, as carried in `topics[0]`.
    pub fn topic(&self) -> Hash32 {
        keccak256(self.signature().as_bytes())
    }
}

/// A log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub kind: EventKind,
    /// Height of the block the emitting call was executed in.
    pub block: BlockHeight,
    pub topics: Vec<Hash32>,
    pub data: Vec<u8>,
}

impl LogEvent {
    /// Build a log with `indexed` addresses as topics after the signature topic.
    pub fn new(kind: EventKind, block: BlockHeight, indexed: &[Address], data: Vec<u8>) -> Self {
        let mut topics = Vec::with_capacity(1 + indexed.len());
        topics.push(kind.topic());
        topics.extend(indexed.iter().map(Address::to_word));
        Self {
            kind,
            block,
            topics,
            data,
        }
    }

    /// The participant carried in `topics[1]`.
    pub fn participant(&self) -> Result<Address, CoreError> {
        let topic = self
            .topics
            .get(1)
            .ok_or_else(|| CoreError::DecodingError("log has no participant topic".into()))?;
        parse_log_address(topic)
    }

    /// The channel a channel event refers to.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self.kind {
            EventKind::ChannelOpened
            | EventKind::CheckpointProposed
            | EventKind::CheckpointChallenged
            | EventKind::CheckpointFinalized
            | EventKind::ChannelExpired => Hash32::try_from(self.data.get(..32)?)
                .ok()
                .map(ChannelId),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        let who = Address::from_bytes([0x5a; 20]);
        let log = LogEvent::new(EventKind::DemandRegistered, 3, &[who], b"foo".to_vec());
        assert_eq!(log.topics[0], keccak256(b"DemandRegistered(address,string)"));
        assert_eq!(log.participant().unwrap(), who);
        assert_eq!(log.channel_id(), None);
    }

    #[test]
    fn test_channel_event_carries_id() {
        let id = ChannelId::from_bytes([0x77; 32]);
        let log = LogEvent::new(
            EventKind::ChannelExpired,
            9,
            &[Address::from_bytes([1; 20])],
            id.as_bytes().to_vec(),
        );
        assert_eq!(log.channel_id(), Some(id));
    }

    #[test]
    fn test_missing_participant_topic() {
        let log = LogEvent::new(EventKind::ChannelOpened, 0, &[], Vec::new());
        assert!(log.participant().is_err());
        assert_eq!(log.channel_id(), None);
    }

    #[test]
    fn test_topics_distinct() {
        assert_ne!(
            EventKind::DemandRegistered.topic(),
            EventKind::SupplyRegistered.topic()
        );
    }
}
