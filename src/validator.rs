//! Ballot admission rules.

use crate::{
    algebra::{TallyCiphertext, WeightVerifier},
    ballot::{Ballot, Choice},
    collaborators::Membership,
    lifecycle::ProposalState,
};

/// Ballot admitted by the [`BallotValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Parsed choice.
    pub choice: Choice,
    /// Declared weight bound, proven to be an upper bound of the encrypted weight.
    pub max_weight: u64,
}

/// Reason for rejecting a ballot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum VoteRejection {
    /// The proposal is not accepting votes.
    #[error("proposal is not active (state: {0})")]
    ProposalNotActive(ProposalState),
    /// The voter has already voted for the proposal.
    #[error("voter has already voted")]
    DuplicateVote,
    /// The voter is not known to the membership provider.
    #[error("voter is not eligible")]
    NotEligible,
    /// The choice tag is outside of the closed set of choices.
    #[error("unknown choice `{0}`")]
    UnknownChoice(String),
    /// The encrypted weight is not proven to lie in `1..=cap`: the declared bound is zero
    /// or exceeds the cap, or the range proof is invalid.
    #[error("weight is not proven to lie in 1..={cap} (declared bound: {max_weight})")]
    InvalidWeight {
        /// Declared weight bound.
        max_weight: u64,
        /// Effective cap for the voter.
        cap: u64,
    },
}

/// Stateless validator deciding whether a ballot can be admitted.
///
/// Validation is pure: all inputs (the derived proposal state, whether the voter has already
/// voted, and the freshly queried membership) are supplied by the caller. Weights are never
/// decrypted; the ballot range proof is checked with a [`WeightVerifier`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct BallotValidator {
    max_weight: Option<u64>,
}

impl BallotValidator {
    /// Creates a validator with an optional global cap on ballot weights, applied on top
    /// of per-voter caps.
    pub fn new(max_weight: Option<u64>) -> Self {
        Self { max_weight }
    }

    /// Returns the effective weight cap for a voter with the specified `membership`.
    pub fn weight_cap(&self, membership: &Membership) -> u64 {
        self.max_weight
            .map_or(membership.weight_cap, |max| max.min(membership.weight_cap))
    }

    /// Validates a `ballot`.
    ///
    /// Checks are performed in the following order: proposal state, duplicate vote,
    /// eligibility, choice, weight. The weight check passes if the declared bound is in
    /// `1..=cap` and `weights` accepts the range proof for it.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn validate<C: TallyCiphertext>(
        &self,
        state: ProposalState,
        ballot: &Ballot<C>,
        already_voted: bool,
        membership: Option<&Membership>,
        weights: &dyn WeightVerifier<C>,
    ) -> Result<Admission, VoteRejection> {
        if state != ProposalState::Active {
            return Err(VoteRejection::ProposalNotActive(state));
        }
        if already_voted {
            return Err(VoteRejection::DuplicateVote);
        }
        let membership = membership.ok_or(VoteRejection::NotEligible)?;
        let choice = ballot
            .choice
            .parse::<Choice>()
            .map_err(|err| VoteRejection::UnknownChoice(err.0))?;

        let cap = self.weight_cap(membership);
        let weight = ballot.weight();
        let max_weight = weight.max_weight();
        let is_proven = (1..=cap).contains(&max_weight)
            && weights.verify_weight(weight.ciphertext(), weight.proof(), max_weight);
        if !is_proven {
            return Err(VoteRejection::InvalidWeight { max_weight, cap });
        }
        Ok(Admission { choice, max_weight })
    }
}
