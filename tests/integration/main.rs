//! Integration tests for the voting registry.

use chrono::{Duration, TimeZone, Utc};
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;
use tracing_subscriber::EnvFilter;

use std::sync::Arc;

use elastic_tally::{
    elgamal::{Ciphertext, KeyholderAuthority, Keypair},
    AttestationVerifier, Ballot, Clock, ManualClock, NewProposal, ProposalId, Registry,
    RegistryConfig, Roster,
};

mod audit;
mod concurrency;
mod lifecycle;
mod persistence;
mod threshold;

pub fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

pub fn voter(index: usize) -> String {
    format!("voter-{index}")
}

/// Registry with a roster of `voter-{i}` members (weight cap 10 each), a manual clock,
/// a keyholder reveal authority and an auditor verifying attestations.
pub struct TestRegistry {
    pub registry: Registry<Ciphertext>,
    pub clock: Arc<ManualClock>,
    pub roster: Arc<Roster>,
    pub keypair: Keypair,
    pub auditor: Keypair,
    pub rng: ChaChaRng,
}

impl TestRegistry {
    pub fn new(voters: usize, config: RegistryConfig) -> Self {
        enable_tracing();
        let mut rng = ChaChaRng::seed_from_u64(voters as u64);
        let keypair = Keypair::generate(&mut rng);
        let auditor = Keypair::generate(&mut rng);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let roster = Arc::new(Roster::with_members((0..voters).map(|i| (voter(i), 10))));

        let registry = Self::builder(&roster, &clock, &keypair, &auditor)
            .with_config(config)
            .build()
            .unwrap();
        Self {
            registry,
            clock,
            roster,
            keypair,
            auditor,
            rng,
        }
    }

    pub fn builder(
        roster: &Arc<Roster>,
        clock: &Arc<ManualClock>,
        keypair: &Keypair,
        auditor: &Keypair,
    ) -> elastic_tally::RegistryBuilder<Ciphertext> {
        let authority = KeyholderAuthority::new(keypair.secret().clone(), 10_000);
        Registry::builder(roster.clone(), Arc::new(*keypair.public()))
            .with_clock(clock.clone())
            .with_reveal_authority(Arc::new(authority))
            .with_proof_verifier(Arc::new(AttestationVerifier::new(*auditor.public())))
    }

    pub fn create(&self, duration: Duration) -> ProposalId {
        let params = NewProposal::starting_at(
            "Treasury allocation",
            "Allocate 5% of the treasury to the grants program",
            self.clock.now(),
            duration,
        );
        self.registry.create_proposal(params).unwrap().id
    }

    /// Creates a ballot with the weight bounded by the roster cap.
    pub fn ballot(&mut self, voter: &str, choice: &str, weight: u64) -> Ballot<Ciphertext> {
        self.bounded_ballot(voter, choice, weight, 10)
    }

    pub fn bounded_ballot(
        &mut self,
        voter: &str,
        choice: &str,
        weight: u64,
        max_weight: u64,
    ) -> Ballot<Ciphertext> {
        let weight = self
            .keypair
            .public()
            .encrypt_weight(weight, max_weight, &mut self.rng);
        Ballot::new(voter, choice, weight)
    }
}
