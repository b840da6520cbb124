//! Append-only, hash-chained audit log.
//!
//! Each entry commits to its predecessor: `operation_hash = SHA-256(previous_hash ‖ canonical)`,
//! where `canonical` is a fixed binary encoding of the operation, proposal id, timestamp
//! and payload. The first entry chains from [`OperationHash::GENESIS`]. Changing any
//! field of any entry therefore changes the recomputed hash of that entry and every
//! entry after it.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use std::fmt;

use crate::{ballot::VoterTag, lifecycle::ProposalId};

/// SHA-256 digest linking audit entries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHash(#[serde(with = "crate::serde::hex_array")] [u8; 32]);

impl fmt::Debug for OperationHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("OperationHash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl fmt::Display for OperationHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.0))
    }
}

impl OperationHash {
    /// Hash the first entry of a log chains from.
    pub const GENESIS: Self = Self([0; 32]);

    /// Wraps digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn chain(previous: &Self, canonical: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(previous.0);
        hasher.update(canonical);
        Self(hasher.finalize().into())
    }

    /// Compares hashes in constant time.
    pub fn ct_matches(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

/// Kind of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    /// Proposal was created.
    ProposalCreated,
    /// Ballot was admitted.
    VoteCast,
    /// Participation threshold was reached.
    ThresholdAlert,
    /// Proposal results were finalized.
    FinalizeResults,
}

impl AuditOperation {
    /// Returns the name of the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProposalCreated => "PROPOSAL_CREATED",
            Self::VoteCast => "VOTE_CAST",
            Self::ThresholdAlert => "THRESHOLD_ALERT",
            Self::FinalizeResults => "FINALIZE_RESULTS",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::ProposalCreated => 1,
            Self::VoteCast => 2,
            Self::ThresholdAlert => 3,
            Self::FinalizeResults => 4,
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Operation-specific data of an [`AuditEntry`].
///
/// Payloads never contain voter identities, plaintext weights or choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditPayload {
    /// Payload of [`AuditOperation::ProposalCreated`].
    ProposalCreated {
        /// SHA-256 digest of the title and description.
        #[serde(with = "crate::serde::hex_array")]
        content_digest: [u8; 32],
        /// Start of the voting window (Unix milliseconds).
        start_ms: i64,
        /// End of the voting window (Unix milliseconds).
        end_ms: i64,
        /// Eligible voters captured at creation.
        eligible_voters: u64,
    },
    /// Payload of [`AuditOperation::VoteCast`].
    VoteCast {
        /// Pseudonymous voter tag.
        voter: VoterTag,
        /// SHA-256 digest of the encrypted weight.
        #[serde(with = "crate::serde::hex_array")]
        ballot_digest: [u8; 32],
        /// Number of admitted ballots including this one.
        votes_cast: u64,
    },
    /// Payload of [`AuditOperation::ThresholdAlert`].
    ThresholdAlert {
        /// Number of admitted ballots when the alert was raised.
        votes_cast: u64,
        /// Eligible voters of the proposal.
        eligible_voters: u64,
    },
    /// Payload of [`AuditOperation::FinalizeResults`].
    FinalizeResults {
        /// Digest of the final encrypted tally.
        #[serde(with = "crate::serde::hex_array")]
        tally_digest: [u8; 32],
        /// Number of admitted ballots.
        votes_cast: u64,
    },
}

impl AuditPayload {
    /// Returns the operation this payload belongs to.
    pub const fn operation(&self) -> AuditOperation {
        match self {
            Self::ProposalCreated { .. } => AuditOperation::ProposalCreated,
            Self::VoteCast { .. } => AuditOperation::VoteCast,
            Self::ThresholdAlert { .. } => AuditOperation::ThresholdAlert,
            Self::FinalizeResults { .. } => AuditOperation::FinalizeResults,
        }
    }

    fn write_canonical(&self, buffer: &mut Vec<u8>) {
        match self {
            Self::ProposalCreated {
                content_digest,
                start_ms,
                end_ms,
                eligible_voters,
            } => {
                buffer.extend_from_slice(content_digest);
                buffer.extend_from_slice(&start_ms.to_be_bytes());
                buffer.extend_from_slice(&end_ms.to_be_bytes());
                buffer.extend_from_slice(&eligible_voters.to_be_bytes());
            }
            Self::VoteCast {
                voter,
                ballot_digest,
                votes_cast,
            } => {
                buffer.extend_from_slice(voter.as_bytes());
                buffer.extend_from_slice(ballot_digest);
                buffer.extend_from_slice(&votes_cast.to_be_bytes());
            }
            Self::ThresholdAlert {
                votes_cast,
                eligible_voters,
            } => {
                buffer.extend_from_slice(&votes_cast.to_be_bytes());
                buffer.extend_from_slice(&eligible_voters.to_be_bytes());
            }
            Self::FinalizeResults {
                tally_digest,
                votes_cast,
            } => {
                buffer.extend_from_slice(tally_digest);
                buffer.extend_from_slice(&votes_cast.to_be_bytes());
            }
        }
    }
}

/// Single record in the [`AuditLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Sequential id, starting from 1.
    pub id: u64,
    /// Proposal the operation relates to.
    pub proposal_id: ProposalId,
    /// Recorded operation.
    pub operation: AuditOperation,
    /// Operation payload.
    pub payload: AuditPayload,
    /// Time of the operation, truncated to milliseconds.
    pub timestamp: DateTime<Utc>,
    /// Hash of the preceding entry, or [`OperationHash::GENESIS`] for the first one.
    pub previous_hash: OperationHash,
    /// Hash of this entry.
    pub operation_hash: OperationHash,
    /// Whether an external proof for this entry was accepted.
    pub verified: bool,
}

impl AuditEntry {
    /// Returns the canonical encoding of the entry contents covered by its hash
    /// (not including the previous hash).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(self.operation, self.proposal_id, self.timestamp, &self.payload)
    }
}

fn canonical_bytes(
    operation: AuditOperation,
    proposal_id: ProposalId,
    timestamp: DateTime<Utc>,
    payload: &AuditPayload,
) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(96);
    buffer.push(operation.tag());
    buffer.extend_from_slice(&proposal_id.get().to_be_bytes());
    buffer.extend_from_slice(&timestamp.timestamp_millis().to_be_bytes());
    payload.write_canonical(&mut buffer);
    buffer
}

/// Statement about an audit entry presented to a
/// [`ProofVerifier`](crate::ProofVerifier).
///
/// The hash is the one *recomputed* from the chain, not the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStatement {
    /// Entry id.
    pub entry_id: u64,
    /// Recomputed operation hash.
    pub operation_hash: OperationHash,
    /// Canonical entry contents.
    pub canonical_bytes: Vec<u8>,
}

impl AuditStatement {
    /// Serializes this statement for binding it into proofs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(40 + self.canonical_bytes.len());
        bytes.extend_from_slice(&self.entry_id.to_be_bytes());
        bytes.extend_from_slice(self.operation_hash.as_bytes());
        bytes.extend_from_slice(&self.canonical_bytes);
        bytes
    }
}

/// Opaque proof submitted for an audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditProof(pub Vec<u8>);

/// Inconsistency found while verifying the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ChainError {
    /// Entry ids are not sequential.
    #[error("audit entry at position {position} has id {actual}; expected {}", position + 1)]
    NonSequentialId {
        /// Zero-based position of the entry.
        position: usize,
        /// Stored id.
        actual: u64,
    },
    /// Entry operation does not match its payload.
    #[error("operation of audit entry {entry_id} does not match its payload")]
    OperationMismatch {
        /// Entry id.
        entry_id: u64,
    },
    /// Stored previous hash differs from the hash of the preceding entry.
    #[error("audit entry {entry_id} is not linked to the preceding entry")]
    BrokenLink {
        /// Entry id.
        entry_id: u64,
    },
    /// Stored operation hash differs from the recomputed one.
    #[error("hash mismatch for audit entry {entry_id}")]
    HashMismatch {
        /// Entry id.
        entry_id: u64,
    },
}

/// Append-only audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a log from `entries`, checking the hash chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries do not form a valid chain.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Result<Self, ChainError> {
        let log = Self { entries };
        log.verify_chain()?;
        Ok(log)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all entries in ascending id order.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Returns an entry by its id.
    pub fn get(&self, entry_id: u64) -> Option<&AuditEntry> {
        let index = usize::try_from(entry_id.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }

    /// Returns the hash of the last entry, or [`OperationHash::GENESIS`] for an empty log.
    pub fn head(&self) -> OperationHash {
        self.entries
            .last()
            .map_or(OperationHash::GENESIS, |entry| entry.operation_hash)
    }

    /// Appends a new entry and returns it.
    pub fn append(
        &mut self,
        proposal_id: ProposalId,
        payload: AuditPayload,
        timestamp: DateTime<Utc>,
    ) -> &AuditEntry {
        let operation = payload.operation();
        let timestamp = timestamp.trunc_subsecs(3);
        let previous_hash = self.head();
        let canonical = canonical_bytes(operation, proposal_id, timestamp, &payload);
        let operation_hash = OperationHash::chain(&previous_hash, &canonical);

        let id = self.entries.len() as u64 + 1;
        self.entries.push(AuditEntry {
            id,
            proposal_id,
            operation,
            payload,
            timestamp,
            previous_hash,
            operation_hash,
            verified: false,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Recomputes hashes of all entries from genesis, ignoring stored hashes.
    pub fn recompute_hashes(&self) -> Vec<OperationHash> {
        let mut previous = OperationHash::GENESIS;
        self.entries
            .iter()
            .map(|entry| {
                previous = OperationHash::chain(&previous, &entry.canonical_bytes());
                previous
            })
            .collect()
    }

    /// Verifies the entire chain.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn verify_chain(&self) -> Result<(), ChainError> {
        let mut previous = OperationHash::GENESIS;
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.id != position as u64 + 1 {
                return Err(ChainError::NonSequentialId {
                    position,
                    actual: entry.id,
                });
            }
            if entry.operation != entry.payload.operation() {
                return Err(ChainError::OperationMismatch { entry_id: entry.id });
            }
            if !entry.previous_hash.ct_matches(&previous) {
                return Err(ChainError::BrokenLink { entry_id: entry.id });
            }
            let expected = OperationHash::chain(&previous, &entry.canonical_bytes());
            if !entry.operation_hash.ct_matches(&expected) {
                return Err(ChainError::HashMismatch { entry_id: entry.id });
            }
            previous = expected;
        }
        Ok(())
    }

    /// Builds the statement for the specified entry with the hash recomputed from genesis.
    /// Returns `None` if there is no such entry.
    pub fn statement(&self, entry_id: u64) -> Option<AuditStatement> {
        let entry = self.get(entry_id)?;
        let mut previous = OperationHash::GENESIS;
        for prefix_entry in &self.entries[..entry_id as usize] {
            previous = OperationHash::chain(&previous, &prefix_entry.canonical_bytes());
        }
        Some(AuditStatement {
            entry_id,
            operation_hash: previous,
            canonical_bytes: entry.canonical_bytes(),
        })
    }

    /// Flags an entry as verified. Returns `false` if there is no such entry.
    pub(crate) fn mark_verified(&mut self, entry_id: u64) -> bool {
        let Some(index) = entry_id.checked_sub(1) else {
            return false;
        };
        match self.entries.get_mut(index as usize) {
            Some(entry) => {
                entry.verified = true;
                true
            }
            None => false,
        }
    }
}
