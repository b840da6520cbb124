//! Encrypted tally aggregation and the participation threshold.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{algebra::TallyCiphertext, ballot::Choice};

/// Per-choice encrypted running totals of a proposal.
///
/// The tally consists of one ciphertext accumulator per [`Choice`], an accumulator for the
/// total weight, and a plaintext counter of admitted ballots. The counter is the only
/// unencrypted signal and is what [`ThresholdRule`]s are evaluated on.
///
/// Tallies are immutable values: [`Self::apply_vote()`] returns a new tally, which lets
/// the registry prepare an update and commit it atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTally<C> {
    choices: [C; 3],
    total: C,
    votes_cast: u64,
}

impl<C: TallyCiphertext> Default for EncryptedTally<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TallyCiphertext> EncryptedTally<C> {
    /// Creates an empty tally with all accumulators set to [`TallyCiphertext::zero()`].
    pub fn new() -> Self {
        Self {
            choices: [C::zero(), C::zero(), C::zero()],
            total: C::zero(),
            votes_cast: 0,
        }
    }

    /// Returns the accumulator for `choice`.
    pub fn for_choice(&self, choice: Choice) -> &C {
        &self.choices[choice.index()]
    }

    /// Returns the accumulator for the total weight over all choices.
    pub fn total(&self) -> &C {
        &self.total
    }

    /// Returns the number of ballots folded into this tally.
    pub fn votes_cast(&self) -> u64 {
        self.votes_cast
    }

    /// Folds an encrypted weight for `choice` into the tally. Accumulators for other choices
    /// are left unchanged.
    #[must_use = "tallies are immutable; the updated tally is returned"]
    pub fn apply_vote(&self, choice: Choice, encrypted_weight: &C) -> Self {
        let mut choices = self.choices.clone();
        let slot = &mut choices[choice.index()];
        *slot = slot.add(encrypted_weight);
        Self {
            choices,
            total: self.total.add(encrypted_weight),
            votes_cast: self.votes_cast + 1,
        }
    }

    /// SHA-256 digest binding every accumulator and the vote counter. Recorded in
    /// the audit log on finalization.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"elastic-tally/tally");
        for accumulator in self.choices.iter().chain([&self.total]) {
            let bytes = accumulator.to_bytes();
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(&bytes);
        }
        hasher.update(self.votes_cast.to_be_bytes());
        hasher.finalize().into()
    }
}

/// Alerting rule evaluated after every admitted ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdRule {
    /// Never raises an alert.
    #[default]
    Disabled,
    /// Raises an alert once the number of ballots reaches `percent`% of eligible voters.
    Participation {
        /// Percentage of eligible voters, `1..=100`.
        percent: u8,
    },
}

impl ThresholdRule {
    /// Checks whether the rule is satisfied by `tally` for a proposal with `eligible_voters`.
    ///
    /// Only the plaintext ballot counter is consulted; no accumulator is decrypted.
    pub fn check_threshold<C: TallyCiphertext>(
        &self,
        tally: &EncryptedTally<C>,
        eligible_voters: u64,
    ) -> bool {
        match *self {
            Self::Disabled => false,
            Self::Participation { percent } => {
                eligible_voters > 0
                    && u128::from(tally.votes_cast()) * 100
                        >= u128::from(percent) * u128::from(eligible_voters)
            }
        }
    }
}

/// Plaintext tally returned by a [`RevealAuthority`](crate::RevealAuthority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedTally {
    /// Total weight for [`Choice::Approve`].
    pub approve: u64,
    /// Total weight for [`Choice::Reject`].
    pub reject: u64,
    /// Total weight for [`Choice::Abstain`].
    pub abstain: u64,
    /// Total weight over all choices.
    pub total: u64,
    /// Number of admitted ballots.
    pub votes_cast: u64,
}

impl RevealedTally {
    /// Returns the total weight for `choice`.
    pub fn for_choice(&self, choice: Choice) -> u64 {
        match choice {
            Choice::Approve => self.approve,
            Choice::Reject => self.reject,
            Choice::Abstain => self.abstain,
        }
    }

    /// Checks that per-choice totals add up to the overall total.
    pub fn is_consistent(&self) -> bool {
        self.approve
            .checked_add(self.reject)
            .and_then(|sum| sum.checked_add(self.abstain))
            == Some(self.total)
    }
}
