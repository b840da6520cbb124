//! Concurrent operations on the registry.

use chrono::Duration;
use rand::thread_rng;

use std::thread;

use elastic_tally::{
    elgamal::Ciphertext, AuditOperation, Ballot, Choice, Error, ProposalFilter, RegistryConfig,
    ThresholdRule,
};

use crate::{voter, TestRegistry};

#[tokio::test]
async fn concurrent_votes_are_all_counted() {
    const VOTERS: usize = 40;
    const THREADS: usize = 8;

    let test = TestRegistry::new(VOTERS, RegistryConfig::default());
    let id = test.create(Duration::days(1));
    let public_key = *test.keypair.public();

    thread::scope(|scope| {
        for thread_idx in 0..THREADS {
            let registry = &test.registry;
            scope.spawn(move || {
                let mut rng = thread_rng();
                for i in (thread_idx..VOTERS).step_by(THREADS) {
                    let weight = (i % 10) as u64 + 1;
                    let choice = Choice::ALL[i % 3];
                    let weight = public_key.encrypt_weight(weight, 10, &mut rng);
                    let ballot = Ballot::for_choice(voter(i), choice, weight);
                    registry.cast_vote(id, ballot).unwrap();
                }
            });
        }
    });

    let entries = test.registry.audit_entries();
    // Creation, one entry per vote and a single threshold alert.
    assert_eq!(entries.len(), 1 + VOTERS + 1);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.id, i as u64 + 1);
    }
    test.registry.verify_chain().unwrap();

    let vote_counts: Vec<_> = entries
        .iter()
        .filter_map(|entry| match entry.payload {
            elastic_tally::AuditPayload::VoteCast { votes_cast, .. } => Some(votes_cast),
            _ => None,
        })
        .collect();
    let expected_counts: Vec<_> = (1..=VOTERS as u64).collect();
    assert_eq!(vote_counts, expected_counts);

    test.clock.advance(Duration::days(2));
    test.registry.finalize(id).unwrap();
    let tally = test
        .registry
        .reveal_tally(id, test.registry.external_timeout())
        .await
        .unwrap();
    let expected_total: u64 = (0..VOTERS).map(|i| (i % 10) as u64 + 1).sum();
    assert_eq!(tally.total, expected_total);
    assert_eq!(tally.votes_cast, VOTERS as u64);
    for choice in Choice::ALL {
        let expected: u64 = (0..VOTERS)
            .filter(|i| Choice::ALL[i % 3] == choice)
            .map(|i| (i % 10) as u64 + 1)
            .sum();
        assert_eq!(tally.for_choice(choice), expected);
    }
}

#[test]
fn racing_duplicate_votes_are_admitted_once() {
    let test = TestRegistry::new(1, RegistryConfig::default());
    let id = test.create(Duration::days(1));
    let public_key = *test.keypair.public();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = &test.registry;
                scope.spawn(move || {
                    let weight = public_key.encrypt_weight(1, 10, &mut thread_rng());
                    registry.cast_vote(id, Ballot::for_choice(voter(0), Choice::Approve, weight))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let admitted = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(admitted, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, Error::DuplicateVote { .. }), "{err}");
        }
    }
    assert_eq!(test.registry.proposal(id).unwrap().votes_cast, 1);
}

#[test]
fn racing_finalizations_succeed_once() {
    let test = TestRegistry::new(1, RegistryConfig::default());
    let id = test.create(Duration::hours(1));
    test.clock.advance(Duration::hours(2));

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| test.registry.finalize(id)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, Error::AlreadyFinalized(_)), "{err}");
        }
    }
    let finalize_entries = test
        .registry
        .audit_entries()
        .iter()
        .filter(|entry| entry.operation == AuditOperation::FinalizeResults)
        .count();
    assert_eq!(finalize_entries, 1);
}

#[test]
fn proposals_are_created_and_voted_on_in_parallel() {
    const PROPOSALS: usize = 6;

    let config = RegistryConfig {
        threshold: ThresholdRule::Disabled,
        ..RegistryConfig::default()
    };
    let test = TestRegistry::new(3, config);
    let public_key = *test.keypair.public();

    thread::scope(|scope| {
        for _ in 0..PROPOSALS {
            let test = &test;
            scope.spawn(move || {
                let id = test.create(Duration::days(1));
                let mut rng = thread_rng();
                for i in 0..3 {
                    let weight = public_key.encrypt_weight(2, 10, &mut rng);
                    let ballot = Ballot::<Ciphertext>::for_choice(voter(i), Choice::Reject, weight);
                    test.registry.cast_vote(id, ballot).unwrap();
                }
            });
        }
        // Snapshots taken concurrently with mutations must be consistent.
        scope.spawn(|| {
            for _ in 0..10 {
                let snapshot = test.registry.snapshot();
                elastic_tally::AuditLog::from_entries(snapshot.audit_log).unwrap();
            }
        });
    });

    let proposals = test.registry.list_proposals(ProposalFilter::Active);
    assert_eq!(proposals.len(), PROPOSALS);
    assert!(proposals.iter().all(|summary| summary.votes_cast == 3));
    let ids: Vec<_> = proposals.iter().map(|summary| summary.id.get()).collect();
    let expected_ids: Vec<_> = (1..=PROPOSALS as u64).rev().collect();
    assert_eq!(ids, expected_ids);
    assert_eq!(test.registry.audit_entries().len(), PROPOSALS * 4);
    test.registry.verify_chain().unwrap();
}
