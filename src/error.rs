//! Registry errors.

use std::{fmt, time::Duration};

use crate::{
    algebra::RevealError,
    audit::ChainError,
    config::ConfigError,
    lifecycle::{ProposalId, ProposalState},
    persistence::StorageError,
    validator::VoteRejection,
};

/// Entity that was looked up and not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    /// Proposal with the specified id.
    Proposal(ProposalId),
    /// Audit log entry with the specified id.
    AuditEntry(u64),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposal(id) => write!(formatter, "proposal {id}"),
            Self::AuditEntry(id) => write!(formatter, "audit entry {id}"),
        }
    }
}

/// External service called by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    /// [`RevealAuthority`](crate::RevealAuthority).
    RevealAuthority,
    /// [`ProofVerifier`](crate::ProofVerifier).
    ProofVerifier,
}

impl fmt::Display for ExternalService {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::RevealAuthority => "reveal authority",
            Self::ProofVerifier => "proof verifier",
        })
    }
}

/// Errors produced by [`Registry`](crate::Registry) operations.
///
/// Every error means the operation had no effect: nothing was appended to the audit log,
/// and no proposal or tally was modified.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(EntityRef),
    /// Operation is not allowed in the current proposal state.
    #[error("cannot {operation} proposal {proposal} in state `{state}`")]
    InvalidState {
        /// Proposal id.
        proposal: ProposalId,
        /// State of the proposal at the time of the operation.
        state: ProposalState,
        /// Attempted operation.
        operation: &'static str,
    },
    /// Voter has already voted for the proposal.
    #[error("duplicate vote for proposal {proposal}")]
    DuplicateVote {
        /// Proposal id.
        proposal: ProposalId,
    },
    /// Encrypted ballot weight is not proven to lie in `1..=cap`.
    #[error("weight is not proven to lie in 1..={cap} (declared bound: {max_weight})")]
    InvalidWeight {
        /// Declared weight bound.
        max_weight: u64,
        /// Effective cap for the voter.
        cap: u64,
    },
    /// Ballot choice is not one of the supported options.
    #[error("unknown choice `{0}`")]
    UnknownChoice(String),
    /// Voter is not known to the membership provider.
    #[error("voter is not eligible to vote on proposal {proposal}")]
    NotEligible {
        /// Proposal id.
        proposal: ProposalId,
    },
    /// Proposal is already finalized.
    #[error("proposal {0} is already finalized")]
    AlreadyFinalized(ProposalId),
    /// Proof for an audit entry was not accepted.
    #[error("verification of audit entry {entry_id} failed: {reason}")]
    VerificationFailed {
        /// Entry id.
        entry_id: u64,
        /// Human-readable reason.
        reason: String,
    },
    /// External service did not respond in time.
    #[error("{service} did not respond within {timeout:?}")]
    ExternalServiceTimeout {
        /// Called service.
        service: ExternalService,
        /// Applied timeout.
        timeout: Duration,
    },
    /// A required collaborator is not configured.
    #[error("{0} is not configured")]
    ServiceUnavailable(ExternalService),
    /// Operation arguments are malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Reveal authority failed to decrypt the tally.
    #[error(transparent)]
    Reveal(#[from] RevealError),
    /// Audit log hash chain is inconsistent.
    #[error("audit log is corrupted: {0}")]
    Chain(#[from] ChainError),
    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn from_rejection(proposal: ProposalId, rejection: VoteRejection) -> Self {
        match rejection {
            VoteRejection::ProposalNotActive(state) => Self::InvalidState {
                proposal,
                state,
                operation: "vote on",
            },
            VoteRejection::DuplicateVote => Self::DuplicateVote { proposal },
            VoteRejection::NotEligible => Self::NotEligible { proposal },
            VoteRejection::UnknownChoice(choice) => Self::UnknownChoice(choice),
            VoteRejection::InvalidWeight { max_weight, cap } => {
                Self::InvalidWeight { max_weight, cap }
            }
        }
    }
}
