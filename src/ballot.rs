//! Ballots and vote choices.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::{fmt, str::FromStr};

use crate::{algebra::TallyCiphertext, lifecycle::ProposalId};

/// Closed set of options a ballot can choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// Vote in favor of the proposal.
    Approve,
    /// Vote against the proposal.
    Reject,
    /// Counted towards participation, but neither for nor against.
    Abstain,
}

impl Choice {
    /// All choices in their canonical order.
    pub const ALL: [Self; 3] = [Self::Approve, Self::Reject, Self::Abstain];

    /// Returns the tag of this choice as used in ballots.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Abstain => "abstain",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Approve => 0,
            Self::Reject => 1,
            Self::Abstain => 2,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error parsing a [`Choice`] from a tag outside of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown choice `{0}`; expected one of `approve`, `reject` or `abstain`")]
pub struct UnknownChoice(pub String);

impl FromStr for Choice {
    type Err = UnknownChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|choice| choice.as_str() == s)
            .ok_or_else(|| UnknownChoice(s.to_owned()))
    }
}

/// Opaque reference to a voter, as understood by the
/// [`MembershipProvider`](crate::MembershipProvider).
///
/// The registry never stores or logs voter ids; it only keeps per-proposal [`VoterTag`]s.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoterId(String);

impl fmt::Debug for VoterId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("VoterId").field(&"_").finish()
    }
}

impl VoterId {
    /// Creates a voter id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VoterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VoterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Pseudonymous voter tag: SHA-256 digest of a [`VoterId`] scoped to a single proposal.
///
/// Tags for the same voter differ across proposals, so the audit log cannot be used
/// to link a voter's participation in different proposals by tag alone.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterTag(#[serde(with = "crate::serde::hex_array")] [u8; 32]);

impl fmt::Debug for VoterTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("VoterTag")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl fmt::Display for VoterTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.0))
    }
}

impl VoterTag {
    /// Computes the tag of `voter` for the specified proposal.
    pub fn new(proposal_id: ProposalId, voter: &VoterId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"elastic-tally/voter-tag");
        hasher.update(proposal_id.get().to_be_bytes());
        hasher.update((voter.0.len() as u64).to_be_bytes());
        hasher.update(voter.0.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Returns the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Encrypted ballot weight together with a proof that it lies in `1..=max_weight`.
///
/// `max_weight` is public. Voters should declare their weight cap as the bound, so that it
/// reveals nothing beyond what the membership provider already knows.
#[derive(Debug, Clone)]
pub struct EncryptedWeight<C: TallyCiphertext> {
    ciphertext: C,
    proof: C::WeightProof,
    max_weight: u64,
}

impl<C: TallyCiphertext> EncryptedWeight<C> {
    /// Combines a ciphertext with the proof that it encrypts a value in `1..=max_weight`.
    pub fn new(ciphertext: C, proof: C::WeightProof, max_weight: u64) -> Self {
        Self {
            ciphertext,
            proof,
            max_weight,
        }
    }

    /// Returns the encrypted weight.
    pub fn ciphertext(&self) -> &C {
        &self.ciphertext
    }

    /// Returns the range proof.
    pub fn proof(&self) -> &C::WeightProof {
        &self.proof
    }

    /// Returns the declared upper bound of the weight.
    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }
}

/// Ballot submitted to [`Registry::cast_vote()`](crate::Registry::cast_vote()).
///
/// The ballot is never persisted: once admitted, its encrypted weight is folded into the
/// proposal tally and the ballot is dropped. The weight is never revealed; the
/// [`BallotValidator`](crate::BallotValidator) only checks its range proof.
#[derive(Clone)]
pub struct Ballot<C: TallyCiphertext> {
    pub(crate) voter: VoterId,
    pub(crate) choice: String,
    pub(crate) weight: EncryptedWeight<C>,
}

impl<C: TallyCiphertext> fmt::Debug for Ballot<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Ballot")
            .field("encrypted_weight", &self.weight.ciphertext)
            .field("max_weight", &self.weight.max_weight)
            .finish_non_exhaustive()
    }
}

impl<C: TallyCiphertext> Ballot<C> {
    /// Creates a ballot with a raw choice tag, e.g. received from a client.
    pub fn new(
        voter: impl Into<VoterId>,
        choice: impl Into<String>,
        weight: EncryptedWeight<C>,
    ) -> Self {
        Self {
            voter: voter.into(),
            choice: choice.into(),
            weight,
        }
    }

    /// Creates a ballot for a typed `choice`.
    pub fn for_choice(voter: impl Into<VoterId>, choice: Choice, weight: EncryptedWeight<C>) -> Self {
        Self::new(voter, choice.as_str(), weight)
    }

    /// Returns the voter id.
    pub fn voter(&self) -> &VoterId {
        &self.voter
    }

    /// Returns the encrypted weight with its range proof.
    pub fn weight(&self) -> &EncryptedWeight<C> {
        &self.weight
    }

    /// Returns the encrypted weight.
    pub fn encrypted_weight(&self) -> &C {
        &self.weight.ciphertext
    }

    /// Digest of the encrypted part of the ballot, recorded in the audit log.
    pub(crate) fn ciphertext_digest(&self) -> [u8; 32] {
        Sha256::digest(self.weight.ciphertext.to_bytes()).into()
    }
}
