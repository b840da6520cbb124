//! Proposal lifecycle from creation to revealed results.

use async_trait::async_trait;
use chrono::Duration;

use std::{sync::Arc, time::Duration as StdDuration};

use elastic_tally::{
    elgamal::Ciphertext, AuditOperation, Ballot, Choice, Clock, EncryptedTally, EncryptedWeight,
    EntityRef, Error, ExternalService, NewProposal, ProposalFilter, ProposalId, ProposalState,
    RegistryConfig, RegistryEvent, RevealAuthority, RevealError, RevealedTally, ThresholdRule,
};

use crate::{voter, TestRegistry};

#[tokio::test]
async fn end_to_end_scenario() {
    let mut test = TestRegistry::new(10, RegistryConfig::default());
    let id = test.create(Duration::days(3));
    assert_eq!(id, ProposalId::new(1));

    let votes = [("approve", 10), ("reject", 5), ("approve", 3)];
    for (i, (choice, weight)) in votes.into_iter().enumerate() {
        let ballot = test.ballot(&voter(i), choice, weight);
        let receipt = test.registry.cast_vote(id, ballot).unwrap();
        assert_eq!(receipt.votes_cast, i as u64 + 1);
        assert!(!receipt.threshold_alert);
    }

    let entries = test.registry.audit_entries();
    assert_eq!(entries.len(), 4);
    let operations: Vec<_> = entries.iter().map(|entry| entry.operation).collect();
    assert_eq!(
        operations,
        [
            AuditOperation::ProposalCreated,
            AuditOperation::VoteCast,
            AuditOperation::VoteCast,
            AuditOperation::VoteCast,
        ]
    );
    let ids: Vec<_> = entries.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, [1, 2, 3, 4]);
    test.registry.verify_chain().unwrap();

    test.clock.advance(Duration::days(3) + Duration::seconds(1));
    assert_eq!(test.registry.proposal(id).unwrap().state, ProposalState::Ended);
    let entry = test.registry.finalize(id).unwrap();
    assert_eq!(entry.id, 5);
    assert_eq!(entry.operation, AuditOperation::FinalizeResults);

    let tally = test
        .registry
        .reveal_tally(id, test.registry.external_timeout())
        .await
        .unwrap();
    assert_eq!(tally.total, 18);
    assert_eq!(tally.for_choice(Choice::Approve), 13);
    assert_eq!(tally.for_choice(Choice::Reject), 5);
    assert_eq!(tally.for_choice(Choice::Abstain), 0);
    assert_eq!(tally.votes_cast, 3);
    assert!(tally.is_consistent());

    let summary = test.registry.proposal(id).unwrap();
    assert_eq!(summary.state, ProposalState::Finalized);
    assert!(summary.is_finalized());
}

#[tokio::test]
async fn forged_weight_does_not_reach_tally() {
    let mut test = TestRegistry::new(2, RegistryConfig::default());
    let id = test.create(Duration::days(1));
    let entries_before = test.registry.audit_entries();

    // A valid proof for weight 1, attached to a ciphertext of 1000.
    let honest = test.ballot(&voter(0), "approve", 1);
    let oversized = test.keypair.public().encrypt(1_000, &mut test.rng);
    let forged = EncryptedWeight::new(oversized, honest.weight().proof().clone(), 10);
    let err = test
        .registry
        .cast_vote(id, Ballot::new(voter(0), "approve", forged))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWeight { max_weight: 10, cap: 10 }), "{err}");
    assert_eq!(test.registry.audit_entries(), entries_before);

    test.registry.cast_vote(id, honest).unwrap();
    let ballot = test.ballot(&voter(1), "approve", 10);
    test.registry.cast_vote(id, ballot).unwrap();

    test.clock.advance(Duration::days(2));
    test.registry.finalize(id).unwrap();
    let tally = test
        .registry
        .reveal_tally(id, test.registry.external_timeout())
        .await
        .unwrap();
    assert_eq!(tally.for_choice(Choice::Approve), 11);
    assert_eq!(tally.votes_cast, 2);
}

#[test]
fn votes_outside_of_window_are_rejected() {
    let mut test = TestRegistry::new(3, RegistryConfig::default());
    let start = test.clock.now() + Duration::hours(1);
    let params = NewProposal {
        title: "Upcoming".to_owned(),
        description: "Starts in an hour".to_owned(),
        start_time: start,
        end_time: start + Duration::days(1),
    };
    let id = test.registry.create_proposal(params).unwrap().id;
    let entries_before = test.registry.audit_entries();

    let ballot = test.ballot(&voter(0), "approve", 1);
    let err = test.registry.cast_vote(id, ballot).unwrap_err();
    assert!(
        matches!(err, Error::InvalidState { state: ProposalState::Upcoming, .. }),
        "{err}"
    );

    test.clock.advance(Duration::days(2));
    let ballot = test.ballot(&voter(0), "approve", 1);
    let err = test.registry.cast_vote(id, ballot).unwrap_err();
    assert!(
        matches!(err, Error::InvalidState { state: ProposalState::Ended, .. }),
        "{err}"
    );

    assert_eq!(test.registry.audit_entries(), entries_before);
    assert_eq!(test.registry.proposal(id).unwrap().votes_cast, 0);
}

#[test]
fn window_bounds_are_inclusive() {
    let mut test = TestRegistry::new(3, RegistryConfig::default());
    let id = test.create(Duration::hours(1));

    let ballot = test.ballot(&voter(0), "approve", 1);
    test.registry.cast_vote(id, ballot).unwrap();
    test.clock.advance(Duration::hours(1));
    let ballot = test.ballot(&voter(1), "reject", 1);
    test.registry.cast_vote(id, ballot).unwrap();

    test.clock.advance(Duration::milliseconds(1));
    let ballot = test.ballot(&voter(2), "reject", 1);
    assert!(test.registry.cast_vote(id, ballot).is_err());
}

#[test]
fn finalization_happens_exactly_once() {
    let test = TestRegistry::new(3, RegistryConfig::default());
    let id = test.create(Duration::days(1));

    let err = test.registry.finalize(id).unwrap_err();
    assert!(matches!(err, Error::InvalidState { state: ProposalState::Active, .. }));

    test.clock.advance(Duration::days(2));
    test.registry.finalize(id).unwrap();
    let err = test.registry.finalize(id).unwrap_err();
    assert!(matches!(err, Error::AlreadyFinalized(finalized) if finalized == id));

    let finalize_entries = test
        .registry
        .audit_entries_for(id)
        .unwrap()
        .into_iter()
        .filter(|entry| entry.operation == AuditOperation::FinalizeResults)
        .count();
    assert_eq!(finalize_entries, 1);

    let err = test.registry.finalize(ProposalId::new(2)).unwrap_err();
    assert!(matches!(err, Error::NotFound(EntityRef::Proposal(_))));
}

#[test]
fn membership_is_queried_on_every_vote() {
    let mut test = TestRegistry::new(2, RegistryConfig::default());
    let id = test.create(Duration::days(1));

    test.roster.remove(&voter(0).into());
    let ballot = test.ballot(&voter(0), "approve", 1);
    let err = test.registry.cast_vote(id, ballot).unwrap_err();
    assert!(matches!(err, Error::NotEligible { .. }));

    test.roster.insert("newcomer", 2);
    let ballot = test.ballot("newcomer", "abstain", 2);
    let err = test.registry.cast_vote(id, ballot).unwrap_err();
    assert!(matches!(err, Error::InvalidWeight { max_weight: 10, cap: 2 }), "{err}");
    let ballot = test.bounded_ballot("newcomer", "abstain", 2, 2);
    test.registry.cast_vote(id, ballot).unwrap();
    // Eligible voters are captured at creation.
    assert_eq!(test.registry.proposal(id).unwrap().eligible_voters, 2);
}

#[test]
fn invalid_proposals_are_rejected() {
    let test = TestRegistry::new(1, RegistryConfig::default());
    let now = test.clock.now();
    let params = NewProposal::starting_at("", "Description", now, Duration::days(1));
    let err = test.registry.create_proposal(params).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let params = NewProposal::starting_at("Title", "Description", now, Duration::zero());
    let err = test.registry.create_proposal(params).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    assert!(test.registry.audit_entries().is_empty());
    assert!(test.registry.list_proposals(ProposalFilter::All).is_empty());
}

#[test]
fn events_are_emitted_after_commits() {
    let config = RegistryConfig {
        threshold: ThresholdRule::Participation { percent: 100 },
        ..RegistryConfig::default()
    };
    let mut test = TestRegistry::new(1, config);
    let mut events = test.registry.subscribe();

    let id = test.create(Duration::days(1));
    let ballot = test.ballot(&voter(0), "reject", 4);
    test.registry.cast_vote(id, ballot).unwrap();
    let ballot = test.ballot(&voter(0), "reject", 4);
    test.registry.cast_vote(id, ballot).unwrap_err();
    test.clock.advance(Duration::days(2));
    test.registry.finalize(id).unwrap();

    let mut received = vec![];
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(
        received,
        [
            RegistryEvent::ProposalCreated {
                proposal: id,
                entry_id: 1
            },
            RegistryEvent::VoteCast {
                proposal: id,
                entry_id: 2,
                votes_cast: 1
            },
            RegistryEvent::ThresholdAlert {
                proposal: id,
                entry_id: 3
            },
            RegistryEvent::Finalized {
                proposal: id,
                entry_id: 4
            },
        ]
    );
}

struct StalledAuthority;

#[async_trait]
impl RevealAuthority<Ciphertext> for StalledAuthority {
    async fn reveal(&self, _tally: &EncryptedTally<Ciphertext>) -> Result<RevealedTally, RevealError> {
        tokio::time::sleep(StdDuration::from_secs(60)).await;
        Err(RevealError::Refused("too late".to_owned()))
    }
}

#[tokio::test]
async fn stalled_reveal_authority_times_out() {
    let mut test = TestRegistry::new(3, RegistryConfig::default());
    let id = test.create(Duration::days(1));
    let ballot = test.ballot(&voter(0), "approve", 4);
    test.registry.cast_vote(id, ballot).unwrap();
    test.clock.advance(Duration::days(2));
    test.registry.finalize(id).unwrap();

    let registry = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .with_reveal_authority(Arc::new(StalledAuthority))
        .restore(test.registry.snapshot())
        .unwrap();
    let timeout = StdDuration::from_millis(20);
    let err = registry.reveal_tally(id, timeout).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::ExternalServiceTimeout {
                service: ExternalService::RevealAuthority,
                timeout: t,
            } if t == timeout
        ),
        "{err}"
    );

    // The proposal stays finalized, so a responsive authority can still reveal it.
    let tally = test
        .registry
        .reveal_tally(id, test.registry.external_timeout())
        .await
        .unwrap();
    assert_eq!(tally.approve, 4);
}
