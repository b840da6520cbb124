//! [`Registry`]: the public operation surface.
//!
//! # Concurrency
//!
//! Every proposal lives in its own mutex-protected slot, so that mutations of a single
//! proposal serialize while different proposals proceed in parallel. The audit log has its
//! own mutex and is the single global ordering point. Locks are always acquired in the
//! order *proposal map → proposal slot → audit log*; a thread holding a slot never waits
//! for the proposal map. No lock is held across calls to async collaborators.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard},
    time::Duration,
};

use crate::{
    algebra::{RevealAuthority, TallyCiphertext, WeightVerifier},
    audit::{AuditEntry, AuditLog, AuditPayload, AuditProof},
    ballot::{Ballot, VoterTag},
    collaborators::{Clock, MembershipProvider, ProofVerifier, SystemClock},
    config::RegistryConfig,
    error::{EntityRef, Error, ExternalService},
    lifecycle::{NewProposal, Proposal, ProposalId, ProposalState, ProposalSummary},
    persistence::{self, RegistrySnapshot, Storage, StorageError, SNAPSHOT_VERSION},
    tally::{EncryptedTally, RevealedTally},
    validator::BallotValidator,
};

const EVENT_CAPACITY: usize = 256;

/// Event emitted by the [`Registry`] after every committed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryEvent {
    /// Proposal was created.
    ProposalCreated {
        /// Proposal id.
        proposal: ProposalId,
        /// Id of the `PROPOSAL_CREATED` audit entry.
        entry_id: u64,
    },
    /// Ballot was admitted.
    VoteCast {
        /// Proposal id.
        proposal: ProposalId,
        /// Id of the `VOTE_CAST` audit entry.
        entry_id: u64,
        /// Number of admitted ballots including this one.
        votes_cast: u64,
    },
    /// Participation threshold was reached.
    ThresholdAlert {
        /// Proposal id.
        proposal: ProposalId,
        /// Id of the `THRESHOLD_ALERT` audit entry.
        entry_id: u64,
    },
    /// Proposal was finalized.
    Finalized {
        /// Proposal id.
        proposal: ProposalId,
        /// Id of the `FINALIZE_RESULTS` audit entry.
        entry_id: u64,
    },
    /// Audit entry was verified.
    EntryVerified {
        /// Entry id.
        entry_id: u64,
    },
}

/// Receipt for an admitted ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    /// Proposal id.
    pub proposal: ProposalId,
    /// Pseudonymous tag of the voter.
    pub voter: VoterTag,
    /// Id of the `VOTE_CAST` audit entry.
    pub entry_id: u64,
    /// Number of admitted ballots including this one.
    pub votes_cast: u64,
    /// Whether this ballot raised the participation alert.
    pub threshold_alert: bool,
}

/// Filter for [`Registry::list_proposals()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProposalFilter {
    /// All proposals.
    #[default]
    All,
    /// Proposals accepting votes.
    Active,
    /// Proposals with the voting window in the future.
    Upcoming,
    /// Ended or finalized proposals.
    Completed,
}

impl ProposalFilter {
    /// Checks whether a proposal in `state` passes this filter.
    pub fn matches(self, state: ProposalState) -> bool {
        match self {
            Self::All => true,
            Self::Active => state == ProposalState::Active,
            Self::Upcoming => state == ProposalState::Upcoming,
            Self::Completed => state.is_completed(),
        }
    }
}

/// Aggregate statistics of a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Total number of proposals.
    pub total: usize,
    /// Number of active proposals.
    pub active: usize,
    /// Number of upcoming proposals.
    pub upcoming: usize,
    /// Number of ended or finalized proposals.
    pub completed: usize,
    /// Number of proposals with a raised participation alert.
    pub threshold_alerts: usize,
    /// Number of eligible voters according to the membership provider.
    pub registered_voters: u64,
}

type ProposalSlot<C> = Arc<Mutex<Proposal<C>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for a [`Registry`].
pub struct RegistryBuilder<C: TallyCiphertext> {
    membership: Arc<dyn MembershipProvider>,
    weight_verifier: Arc<dyn WeightVerifier<C>>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    proof_verifier: Option<Arc<dyn ProofVerifier>>,
    reveal_authority: Option<Arc<dyn RevealAuthority<C>>>,
}

impl<C: TallyCiphertext> std::fmt::Debug for RegistryBuilder<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("has_proof_verifier", &self.proof_verifier.is_some())
            .field("has_reveal_authority", &self.reveal_authority.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: TallyCiphertext> RegistryBuilder<C> {
    /// Sets the registry configuration.
    #[must_use]
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock. By default, [`SystemClock`] is used.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the service verifying audit entry proofs.
    #[must_use]
    pub fn with_proof_verifier(mut self, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.proof_verifier = Some(verifier);
        self
    }

    /// Sets the authority decrypting finalized tallies.
    #[must_use]
    pub fn with_reveal_authority(mut self, authority: Arc<dyn RevealAuthority<C>>) -> Self {
        self.reveal_authority = Some(authority);
        self
    }

    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Registry<C>, Error> {
        self.assemble(BTreeMap::new(), AuditLog::new(), None)
    }

    /// Restores a registry from a `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the snapshot has an unsupported
    /// version, or its contents are inconsistent (including a broken audit hash chain).
    pub fn restore(self, snapshot: RegistrySnapshot<C>) -> Result<Registry<C>, Error> {
        let (proposals, audit_log) = Self::check_snapshot(snapshot)?;
        self.assemble(proposals, audit_log, None)
    }

    /// Opens a registry backed by `storage`: restores the last saved snapshot if there is one,
    /// or creates an empty registry otherwise. [`Registry::flush()`] saves to the same storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded or restored.
    pub fn open(self, storage: Arc<dyn Storage<C>>) -> Result<Registry<C>, Error> {
        let (proposals, audit_log) = match storage.load()? {
            Some(snapshot) => Self::check_snapshot(snapshot)?,
            None => (BTreeMap::new(), AuditLog::new()),
        };
        self.assemble(proposals, audit_log, Some(storage))
    }

    fn check_snapshot(
        snapshot: RegistrySnapshot<C>,
    ) -> Result<(BTreeMap<ProposalId, ProposalSlot<C>>, AuditLog), Error> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion(snapshot.version).into());
        }
        let mut entries = snapshot.audit_log;
        // Proofs are not persisted, so no stored `verified` flag can be justified.
        let mut cleared_flags = 0_usize;
        for entry in entries.iter_mut().filter(|entry| entry.verified) {
            entry.verified = false;
            cleared_flags += 1;
        }
        if cleared_flags > 0 {
            warn!(cleared_flags, "verification flags dropped on restore");
        }
        let audit_log = AuditLog::from_entries(entries)?;

        let mut proposals = BTreeMap::new();
        for proposal in snapshot.proposals {
            let id = proposal.id;
            if proposals
                .insert(id, Arc::new(Mutex::new(proposal)))
                .is_some()
            {
                let message = format!("proposal {id} is present multiple times");
                return Err(StorageError::Inconsistent(message).into());
            }
        }
        let orphan = audit_log
            .entries()
            .iter()
            .find(|entry| !proposals.contains_key(&entry.proposal_id));
        if let Some(entry) = orphan {
            let message = format!(
                "audit entry {} refers to unknown proposal {}",
                entry.id, entry.proposal_id
            );
            return Err(StorageError::Inconsistent(message).into());
        }

        let mut entries_by_proposal = BTreeMap::<_, Vec<_>>::new();
        for entry in audit_log.entries() {
            entries_by_proposal
                .entry(entry.proposal_id)
                .or_default()
                .push(entry);
        }
        for (id, slot) in &proposals {
            let entries = entries_by_proposal.get(id).map_or(&[][..], Vec::as_slice);
            persistence::reconcile(&lock(slot), entries)?;
        }
        Ok((proposals, audit_log))
    }

    fn assemble(
        self,
        proposals: BTreeMap<ProposalId, ProposalSlot<C>>,
        audit_log: AuditLog,
        storage: Option<Arc<dyn Storage<C>>>,
    ) -> Result<Registry<C>, Error> {
        self.config.validate()?;
        info!(
            proposals = proposals.len(),
            audit_entries = audit_log.len(),
            "registry initialized"
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Registry {
            proposals: RwLock::new(proposals),
            audit_log: Mutex::new(audit_log),
            validator: BallotValidator::new(self.config.max_weight),
            config: self.config,
            membership: self.membership,
            weight_verifier: self.weight_verifier,
            clock: self.clock,
            proof_verifier: self.proof_verifier,
            reveal_authority: self.reveal_authority,
            storage,
            events,
        })
    }
}

/// Confidential voting registry.
///
/// # Examples
///
/// ```
/// # use elastic_tally::{
/// #     elgamal::{Ciphertext, KeyholderAuthority, Keypair}, Ballot, Choice, Clock, ManualClock,
/// #     NewProposal, Registry, Roster,
/// # };
/// # use chrono::{Duration, Utc};
/// # use rand::thread_rng;
/// # use std::sync::Arc;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut rng = thread_rng();
/// let (public_key, secret_key) = Keypair::generate(&mut rng).into_tuple();
/// let clock = Arc::new(ManualClock::new(Utc::now()));
/// let roster = Arc::new(Roster::with_members([("alice", 10), ("bob", 5)]));
/// let registry = Registry::<Ciphertext>::builder(roster, Arc::new(public_key))
///     .with_clock(clock.clone())
///     .with_reveal_authority(Arc::new(KeyholderAuthority::new(secret_key, 100)))
///     .build()?;
///
/// let proposal = registry.create_proposal(NewProposal::starting_at(
///     "Merger",
///     "Approve the merger with Acme",
///     clock.now(),
///     Duration::days(3),
/// ))?;
/// let weight = public_key.encrypt_weight(10, 10, &mut rng);
/// registry.cast_vote(proposal.id, Ballot::for_choice("alice", Choice::Approve, weight))?;
///
/// clock.advance(Duration::days(4));
/// registry.finalize(proposal.id)?;
/// let tally = registry
///     .reveal_tally(proposal.id, registry.external_timeout())
///     .await?;
/// assert_eq!(tally.approve, 10);
/// # Ok(())
/// # }
/// ```
pub struct Registry<C: TallyCiphertext> {
    proposals: RwLock<BTreeMap<ProposalId, ProposalSlot<C>>>,
    audit_log: Mutex<AuditLog>,
    validator: BallotValidator,
    config: RegistryConfig,
    membership: Arc<dyn MembershipProvider>,
    weight_verifier: Arc<dyn WeightVerifier<C>>,
    clock: Arc<dyn Clock>,
    proof_verifier: Option<Arc<dyn ProofVerifier>>,
    reveal_authority: Option<Arc<dyn RevealAuthority<C>>>,
    storage: Option<Arc<dyn Storage<C>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl<C: TallyCiphertext> std::fmt::Debug for Registry<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Registry")
            .field("config", &self.config)
            .field("proposals", &self.read_proposals().len())
            .field("audit_entries", &lock(&self.audit_log).len())
            .finish_non_exhaustive()
    }
}

impl<C: TallyCiphertext> Registry<C> {
    /// Starts building a registry with the specified membership provider and the verifier
    /// of ballot weight proofs.
    pub fn builder(
        membership: Arc<dyn MembershipProvider>,
        weight_verifier: Arc<dyn WeightVerifier<C>>,
    ) -> RegistryBuilder<C> {
        RegistryBuilder {
            membership,
            weight_verifier,
            config: RegistryConfig::default(),
            clock: Arc::new(SystemClock),
            proof_verifier: None,
            reveal_authority: None,
        }
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the default timeout for calls to external services.
    pub fn external_timeout(&self) -> Duration {
        self.config.external_timeout()
    }

    /// Subscribes to events emitted after committed operations.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistryEvent) {
        // Sending only fails if there are no subscribers.
        self.events.send(event).ok();
    }

    fn read_proposals(&self) -> RwLockReadGuard<'_, BTreeMap<ProposalId, ProposalSlot<C>>> {
        self.proposals.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, id: ProposalId) -> Result<ProposalSlot<C>, Error> {
        self.read_proposals()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(EntityRef::Proposal(id)))
    }

    /// Creates a new proposal. The number of eligible voters is captured from
    /// the membership provider at this point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the title or description is empty, or if
    /// the voting window is empty.
    pub fn create_proposal(&self, params: NewProposal) -> Result<ProposalSummary, Error> {
        let window = params.validate().map_err(|err| {
            warn!(%err, "proposal rejected");
            err
        })?;
        let now = self.clock.now();
        let eligible_voters = self.membership.eligible_voters();

        let mut proposals = self.proposals.write().unwrap_or_else(PoisonError::into_inner);
        let id = proposals
            .keys()
            .next_back()
            .map_or(ProposalId::new(1), |last| last.next());
        let proposal = Proposal::new(id, params, window, eligible_voters, now);
        let payload = AuditPayload::ProposalCreated {
            content_digest: proposal.content_digest(),
            start_ms: window.start().timestamp_millis(),
            end_ms: window.end().timestamp_millis(),
            eligible_voters,
        };
        let entry_id = lock(&self.audit_log).append(id, payload, now).id;
        let summary = proposal.summary(now);
        proposals.insert(id, Arc::new(Mutex::new(proposal)));
        drop(proposals);

        info!(
            proposal = %id,
            entry_id,
            eligible_voters,
            start = %window.start(),
            end = %window.end(),
            "proposal created"
        );
        self.emit(RegistryEvent::ProposalCreated {
            proposal: id,
            entry_id,
        });
        Ok(summary)
    }

    /// Casts a vote. On success, the encrypted weight is folded into the proposal tally and
    /// a `VOTE_CAST` audit entry is appended; if the ballot makes the proposal reach
    /// the participation threshold for the first time, a `THRESHOLD_ALERT` entry follows.
    ///
    /// # Errors
    ///
    /// Returns an error if the proposal does not exist or the ballot is rejected
    /// by the [`BallotValidator`]. Rejected ballots leave no trace.
    pub fn cast_vote(&self, proposal_id: ProposalId, ballot: Ballot<C>) -> Result<VoteReceipt, Error> {
        let slot = self.slot(proposal_id)?;
        let mut proposal = lock(&slot);
        let now = self.clock.now();

        let state = proposal.state_at(now);
        let tag = VoterTag::new(proposal_id, ballot.voter());
        let membership = self.membership.member(ballot.voter());
        let admission = self
            .validator
            .validate(
                state,
                &ballot,
                proposal.has_voted(&tag),
                membership.as_ref(),
                self.weight_verifier.as_ref(),
            )
            .map_err(|rejection| {
                warn!(proposal = %proposal_id, voter = %tag, %rejection, "ballot rejected");
                Error::from_rejection(proposal_id, rejection)
            })?;

        let tally = proposal
            .tally
            .apply_vote(admission.choice, ballot.encrypted_weight());
        let votes_cast = tally.votes_cast();
        let raise_alert = !proposal.threshold_alert
            && self
                .config
                .threshold
                .check_threshold(&tally, proposal.eligible_voters);

        let (entry_id, alert_entry_id) = {
            let mut audit_log = lock(&self.audit_log);
            let payload = AuditPayload::VoteCast {
                voter: tag,
                ballot_digest: ballot.ciphertext_digest(),
                votes_cast,
            };
            let entry_id = audit_log.append(proposal_id, payload, now).id;
            let alert_entry_id = raise_alert.then(|| {
                let payload = AuditPayload::ThresholdAlert {
                    votes_cast,
                    eligible_voters: proposal.eligible_voters,
                };
                audit_log.append(proposal_id, payload, now).id
            });
            (entry_id, alert_entry_id)
        };
        proposal.tally = tally;
        proposal.voters.insert(tag);
        proposal.threshold_alert |= raise_alert;
        let eligible_voters = proposal.eligible_voters;
        drop(proposal);

        debug!(proposal = %proposal_id, voter = %tag, entry_id, votes_cast, "ballot admitted");
        self.emit(RegistryEvent::VoteCast {
            proposal: proposal_id,
            entry_id,
            votes_cast,
        });
        if let Some(alert_entry_id) = alert_entry_id {
            info!(
                proposal = %proposal_id,
                entry_id = alert_entry_id,
                votes_cast,
                eligible_voters,
                "participation threshold reached"
            );
            self.emit(RegistryEvent::ThresholdAlert {
                proposal: proposal_id,
                entry_id: alert_entry_id,
            });
        }

        Ok(VoteReceipt {
            proposal: proposal_id,
            voter: tag,
            entry_id,
            votes_cast,
            threshold_alert: alert_entry_id.is_some(),
        })
    }

    /// Finalizes an ended proposal, unlocking its tally for the reveal authority.
    /// Returns the appended `FINALIZE_RESULTS` entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinalized`] for a finalized proposal, and [`Error::InvalidState`]
    /// if the voting window has not ended yet.
    pub fn finalize(&self, proposal_id: ProposalId) -> Result<AuditEntry, Error> {
        let slot = self.slot(proposal_id)?;
        let mut proposal = lock(&slot);
        let now = self.clock.now();
        proposal.ensure_finalizable(now).map_err(|err| {
            warn!(proposal = %proposal_id, %err, "finalization rejected");
            err
        })?;

        let payload = AuditPayload::FinalizeResults {
            tally_digest: proposal.tally.digest(),
            votes_cast: proposal.tally.votes_cast(),
        };
        let entry = lock(&self.audit_log)
            .append(proposal_id, payload, now)
            .clone();
        proposal.seal(now);
        drop(proposal);

        info!(proposal = %proposal_id, entry_id = entry.id, "proposal finalized");
        self.emit(RegistryEvent::Finalized {
            proposal: proposal_id,
            entry_id: entry.id,
        });
        Ok(entry)
    }

    /// Verifies an audit entry with the external proof verifier. The entry hash is recomputed
    /// from the chain before the verifier is consulted. Returns the entry with the `verified`
    /// flag set; already verified entries are returned without calling the verifier.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no such entry.
    /// - [`Error::VerificationFailed`] if the recomputed hash does not match the stored one,
    ///   or if the proof is rejected. The entry stays unverified.
    /// - [`Error::ExternalServiceTimeout`] if the verifier does not respond within `timeout`.
    pub async fn verify_audit_entry(
        &self,
        entry_id: u64,
        proof: &AuditProof,
        timeout: Duration,
    ) -> Result<AuditEntry, Error> {
        let statement = {
            let audit_log = lock(&self.audit_log);
            let entry = audit_log
                .get(entry_id)
                .ok_or(Error::NotFound(EntityRef::AuditEntry(entry_id)))?;
            if entry.verified {
                return Ok(entry.clone());
            }
            let statement = audit_log
                .statement(entry_id)
                .ok_or(Error::NotFound(EntityRef::AuditEntry(entry_id)))?;
            if !statement.operation_hash.ct_matches(&entry.operation_hash) {
                warn!(entry_id, "audit entry hash does not match recomputed chain");
                return Err(Error::VerificationFailed {
                    entry_id,
                    reason: "stored hash does not match the recomputed chain".to_owned(),
                });
            }
            statement
        };
        let verifier = self
            .proof_verifier
            .as_ref()
            .ok_or(Error::ServiceUnavailable(ExternalService::ProofVerifier))?;

        let accepted = tokio::time::timeout(timeout, verifier.verify(&statement, proof))
            .await
            .map_err(|_| {
                warn!(entry_id, ?timeout, "proof verifier timed out");
                Error::ExternalServiceTimeout {
                    service: ExternalService::ProofVerifier,
                    timeout,
                }
            })?;
        if !accepted {
            warn!(entry_id, "proof rejected");
            return Err(Error::VerificationFailed {
                entry_id,
                reason: "proof rejected by verifier".to_owned(),
            });
        }

        let entry = {
            let mut audit_log = lock(&self.audit_log);
            audit_log.mark_verified(entry_id);
            audit_log.get(entry_id).cloned()
        }
        .ok_or(Error::NotFound(EntityRef::AuditEntry(entry_id)))?;
        info!(entry_id, operation = %entry.operation, "audit entry verified");
        self.emit(RegistryEvent::EntryVerified { entry_id });
        Ok(entry)
    }

    /// Decrypts the tally of a finalized proposal with the reveal authority.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the proposal is not finalized.
    /// - [`Error::ServiceUnavailable`] if no reveal authority is configured.
    /// - [`Error::ExternalServiceTimeout`] if the authority does not respond within `timeout`.
    pub async fn reveal_tally(
        &self,
        proposal_id: ProposalId,
        timeout: Duration,
    ) -> Result<RevealedTally, Error> {
        let tally = self.final_tally(proposal_id)?;
        let authority = self
            .reveal_authority
            .as_ref()
            .ok_or(Error::ServiceUnavailable(ExternalService::RevealAuthority))?;

        let revealed = tokio::time::timeout(timeout, authority.reveal(&tally))
            .await
            .map_err(|_| {
                warn!(proposal = %proposal_id, ?timeout, "reveal authority timed out");
                Error::ExternalServiceTimeout {
                    service: ExternalService::RevealAuthority,
                    timeout,
                }
            })??;
        info!(proposal = %proposal_id, votes_cast = revealed.votes_cast, "tally revealed");
        Ok(revealed)
    }

    /// Returns the encrypted tally of a finalized proposal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the proposal is not finalized.
    pub fn final_tally(&self, proposal_id: ProposalId) -> Result<EncryptedTally<C>, Error> {
        let slot = self.slot(proposal_id)?;
        let proposal = lock(&slot);
        match proposal.state_at(self.clock.now()) {
            ProposalState::Finalized => Ok(proposal.tally.clone()),
            state => Err(Error::InvalidState {
                proposal: proposal_id,
                state,
                operation: "reveal tally of",
            }),
        }
    }

    /// Returns the current view of a proposal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such proposal.
    pub fn proposal(&self, proposal_id: ProposalId) -> Result<ProposalSummary, Error> {
        let slot = self.slot(proposal_id)?;
        let summary = lock(&slot).summary(self.clock.now());
        Ok(summary)
    }

    /// Lists proposals passing the `filter`, newest first.
    pub fn list_proposals(&self, filter: ProposalFilter) -> Vec<ProposalSummary> {
        let now = self.clock.now();
        self.read_proposals()
            .values()
            .rev()
            .map(|slot| lock(&slot).summary(now))
            .filter(|summary| filter.matches(summary.state))
            .collect()
    }

    /// Computes aggregate statistics.
    pub fn stats(&self) -> RegistryStats {
        let now = self.clock.now();
        let mut stats = RegistryStats {
            registered_voters: self.membership.eligible_voters(),
            ..RegistryStats::default()
        };
        for slot in self.read_proposals().values() {
            let proposal = lock(&slot);
            stats.total += 1;
            match proposal.state_at(now) {
                ProposalState::Active => stats.active += 1,
                ProposalState::Upcoming => stats.upcoming += 1,
                ProposalState::Ended | ProposalState::Finalized => stats.completed += 1,
            }
            if proposal.threshold_alert {
                stats.threshold_alerts += 1;
            }
        }
        stats
    }

    /// Returns all audit entries in ascending id order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        lock(&self.audit_log).entries().to_vec()
    }

    /// Returns audit entries for the specified proposal in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such proposal.
    pub fn audit_entries_for(&self, proposal_id: ProposalId) -> Result<Vec<AuditEntry>, Error> {
        self.slot(proposal_id)?;
        let entries = lock(&self.audit_log)
            .entries()
            .iter()
            .filter(|entry| entry.proposal_id == proposal_id)
            .cloned()
            .collect();
        Ok(entries)
    }

    /// Returns an audit entry by its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such entry.
    pub fn audit_entry(&self, entry_id: u64) -> Result<AuditEntry, Error> {
        lock(&self.audit_log)
            .get(entry_id)
            .cloned()
            .ok_or(Error::NotFound(EntityRef::AuditEntry(entry_id)))
    }

    /// Returns a copy of the audit log.
    pub fn audit_log(&self) -> AuditLog {
        lock(&self.audit_log).clone()
    }

    /// Verifies the audit log hash chain from genesis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Chain`] describing the first inconsistency.
    pub fn verify_chain(&self) -> Result<(), Error> {
        lock(&self.audit_log).verify_chain().map_err(|err| {
            warn!(%err, "audit chain verification failed");
            Error::Chain(err)
        })
    }

    /// Takes a consistent snapshot of the registry state.
    pub fn snapshot(&self) -> RegistrySnapshot<C> {
        let proposals = self.read_proposals();
        let guards: Vec<_> = proposals.values().map(|slot| lock(slot)).collect();
        let audit_log = lock(&self.audit_log).entries().to_vec();
        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            proposals: guards.iter().map(|proposal| Proposal::clone(proposal)).collect(),
            audit_log,
        }
    }

    /// Saves a snapshot to the storage the registry was [opened](RegistryBuilder::open()) with.
    /// Does nothing for registries without storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be saved.
    pub fn flush(&self) -> Result<(), Error> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        storage.save(&snapshot).map_err(|err| {
            warn!(%err, "failed to save registry snapshot");
            err
        })?;
        info!(
            proposals = snapshot.proposals.len(),
            audit_entries = snapshot.audit_log.len(),
            "registry flushed"
        );
        Ok(())
    }
}
