//! External collaborators of the [`Registry`](crate::Registry).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError, RwLock},
};

use crate::{
    audit::{AuditProof, AuditStatement},
    ballot::VoterId,
};

/// Membership record of a voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// Maximum weight the voter may declare in a ballot.
    pub weight_cap: u64,
}

/// Source of truth on who can vote and with what weight.
///
/// The registry queries the provider on every vote and never caches the answers.
pub trait MembershipProvider: Send + Sync {
    /// Returns membership of the specified voter, or `None` if the voter is not a member.
    fn member(&self, voter: &VoterId) -> Option<Membership>;

    /// Returns the number of eligible voters.
    fn eligible_voters(&self) -> u64;
}

/// In-memory [`MembershipProvider`].
#[derive(Debug, Default)]
pub struct Roster {
    members: RwLock<HashMap<VoterId, Membership>>,
}

impl Roster {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a roster with the specified `(voter, weight_cap)` pairs.
    pub fn with_members<V: Into<VoterId>>(members: impl IntoIterator<Item = (V, u64)>) -> Self {
        let members = members
            .into_iter()
            .map(|(voter, weight_cap)| (voter.into(), Membership { weight_cap }))
            .collect();
        Self {
            members: RwLock::new(members),
        }
    }

    /// Adds a member or updates its weight cap.
    pub fn insert(&self, voter: impl Into<VoterId>, weight_cap: u64) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(voter.into(), Membership { weight_cap });
    }

    /// Removes a member. Returns `true` if the voter was a member.
    pub fn remove(&self, voter: &VoterId) -> bool {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(voter)
            .is_some()
    }
}

impl MembershipProvider for Roster {
    fn member(&self, voter: &VoterId) -> Option<Membership> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.get(voter).copied()
    }

    fn eligible_voters(&self) -> u64 {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        members.len() as u64
    }
}

/// Service checking proofs submitted for audit entries.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Checks `proof` for the `statement`.
    async fn verify(&self, statement: &AuditStatement, proof: &AuditProof) -> bool;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] returning the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven [`Clock`].
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock set to `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
