//! Proposal lifecycle state machine.
//!
//! A proposal moves through the following states:
//!
//! ```text
//! Upcoming --(start_time)--> Active --(end_time)--> Ended --(finalize)--> Finalized
//! ```
//!
//! All edges except the last one are derived from the current time; `Ended -> Finalized` is
//! the only explicit transition, and `Finalized` is terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::{collections::BTreeSet, fmt};

use crate::{
    algebra::TallyCiphertext,
    ballot::VoterTag,
    error::Error,
    tally::EncryptedTally,
};

/// Unique proposal identifier, assigned monotonically starting from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(u64);

impl ProposalId {
    /// Wraps a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Lifecycle state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Voting has not started yet.
    Upcoming,
    /// Voting window is open.
    Active,
    /// Voting window has closed, but results are not finalized.
    Ended,
    /// Results are finalized and may be revealed. Terminal state.
    Finalized,
}

impl ProposalState {
    /// Returns the snake-case name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Finalized => "finalized",
        }
    }

    /// Checks whether the proposal no longer accepts votes.
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Ended | Self::Finalized)
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Voting window `[start, end]`; both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl VotingWindow {
    /// Creates a window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, Error> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(Error::InvalidInput(format!(
                "voting window must start before it ends (start: {start}, end: {end})"
            )))
        }
    }

    /// Returns the start of the window.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end of the window.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Checks whether `now` falls into this window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }
}

/// Parameters of a proposal to be created via
/// [`Registry::create_proposal()`](crate::Registry::create_proposal()).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    /// Proposal title. Must not be empty.
    pub title: String,
    /// Proposal description. Must not be empty.
    pub description: String,
    /// Start of the voting window.
    pub start_time: DateTime<Utc>,
    /// End of the voting window.
    pub end_time: DateTime<Utc>,
}

impl NewProposal {
    /// Creates parameters for a proposal opened at `now` for `duration`.
    pub fn starting_at(
        title: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            start_time: now,
            end_time: now + duration,
        }
    }

    pub(crate) fn validate(&self) -> Result<VotingWindow, Error> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("proposal title must not be empty".to_owned()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "proposal description must not be empty".to_owned(),
            ));
        }
        VotingWindow::new(self.start_time, self.end_time)
    }
}

/// Proposal together with its encrypted tally.
///
/// Proposals are owned by the [`Registry`](crate::Registry) and are only exposed through
/// [`ProposalSummary`] views; the tally is released only after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal<C> {
    pub(crate) id: ProposalId,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) window: VotingWindow,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) eligible_voters: u64,
    pub(crate) tally: EncryptedTally<C>,
    pub(crate) threshold_alert: bool,
    pub(crate) finalized_at: Option<DateTime<Utc>>,
    pub(crate) voters: BTreeSet<VoterTag>,
}

impl<C: TallyCiphertext> Proposal<C> {
    pub(crate) fn new(
        id: ProposalId,
        params: NewProposal,
        window: VotingWindow,
        eligible_voters: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: params.title,
            description: params.description,
            window,
            created_at,
            eligible_voters,
            tally: EncryptedTally::new(),
            threshold_alert: false,
            finalized_at: None,
            voters: BTreeSet::new(),
        }
    }

    /// Derives the state of this proposal at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> ProposalState {
        if self.finalized_at.is_some() {
            ProposalState::Finalized
        } else if now < self.window.start {
            ProposalState::Upcoming
        } else if now <= self.window.end {
            ProposalState::Active
        } else {
            ProposalState::Ended
        }
    }

    /// Digest of the title and description recorded in the audit log.
    pub(crate) fn content_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for text in [&self.title, &self.description] {
            hasher.update((text.len() as u64).to_be_bytes());
            hasher.update(text.as_bytes());
        }
        hasher.finalize().into()
    }

    pub(crate) fn has_voted(&self, tag: &VoterTag) -> bool {
        self.voters.contains(tag)
    }

    /// Checks that the proposal can be finalized at `now`.
    pub(crate) fn ensure_finalizable(&self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.state_at(now) {
            ProposalState::Ended => Ok(()),
            ProposalState::Finalized => Err(Error::AlreadyFinalized(self.id)),
            state => Err(Error::InvalidState {
                proposal: self.id,
                state,
                operation: "finalize",
            }),
        }
    }

    /// Performs the `Ended -> Finalized` transition. The caller must have checked
    /// [`Self::ensure_finalizable()`] while holding the proposal lock.
    pub(crate) fn seal(&mut self, now: DateTime<Utc>) {
        debug_assert!(self.finalized_at.is_none(), "proposal finalized twice");
        self.finalized_at = Some(now);
    }

    pub(crate) fn summary(&self, now: DateTime<Utc>) -> ProposalSummary {
        ProposalSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.window.start,
            end_time: self.window.end,
            created_at: self.created_at,
            state: self.state_at(now),
            eligible_voters: self.eligible_voters,
            votes_cast: self.tally.votes_cast(),
            threshold_alert: self.threshold_alert,
            finalized_at: self.finalized_at,
        }
    }
}

/// Public view of a proposal. Does not include the encrypted tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSummary {
    /// Proposal id.
    pub id: ProposalId,
    /// Proposal title.
    pub title: String,
    /// Proposal description.
    pub description: String,
    /// Start of the voting window.
    pub start_time: DateTime<Utc>,
    /// End of the voting window.
    pub end_time: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// State at the time the summary was produced.
    pub state: ProposalState,
    /// Number of voters eligible at proposal creation.
    pub eligible_voters: u64,
    /// Number of admitted ballots.
    pub votes_cast: u64,
    /// Whether the participation threshold alert was raised.
    pub threshold_alert: bool,
    /// Finalization time, if the proposal is finalized.
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ProposalSummary {
    /// Checks whether the proposal is finalized.
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}
