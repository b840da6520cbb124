//! Snapshots and storage.

use chrono::Duration;

use std::sync::Arc;

use elastic_tally::{
    elgamal::Ciphertext, AuditPayload, Clock, Error, JsonFileStorage, MemoryStorage,
    NewProposal, ProposalFilter, ProposalId, RegistryConfig, Storage, StorageError,
};

use crate::{voter, TestRegistry};

#[tokio::test]
async fn registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(JsonFileStorage::new(dir.path().join("registry.json")));

    let mut test = TestRegistry::new(4, RegistryConfig::default());
    let registry = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .open(storage.clone())
        .unwrap();
    let params = NewProposal::starting_at(
        "Rename",
        "Rename the organization",
        test.clock.now(),
        Duration::days(2),
    );
    let id = registry.create_proposal(params).unwrap().id;
    let ballot = test.ballot(&voter(0), "approve", 7);
    registry.cast_vote(id, ballot).unwrap();
    registry.flush().unwrap();
    let proposals_before = registry.list_proposals(ProposalFilter::All);
    let entries_before = registry.audit_entries();
    drop(registry);

    let registry = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .open(storage)
        .unwrap();
    assert_eq!(registry.list_proposals(ProposalFilter::All), proposals_before);
    assert_eq!(registry.audit_entries(), entries_before);
    registry.verify_chain().unwrap();

    // Voter tags survive the restart.
    let ballot = test.ballot(&voter(0), "reject", 1);
    let err = registry.cast_vote(id, ballot).unwrap_err();
    assert!(matches!(err, Error::DuplicateVote { .. }));
    let ballot = test.ballot(&voter(1), "approve", 3);
    registry.cast_vote(id, ballot).unwrap();

    // Ids continue from the restored state.
    let params = NewProposal::starting_at(
        "Follow-up",
        "Second proposal",
        test.clock.now(),
        Duration::days(1),
    );
    assert_eq!(registry.create_proposal(params).unwrap().id, ProposalId::new(2));

    // The encrypted tally is restored as well.
    test.clock.advance(Duration::days(3));
    registry.finalize(id).unwrap();
    let tally = registry
        .reveal_tally(id, registry.external_timeout())
        .await
        .unwrap();
    assert_eq!(tally.approve, 10);
    assert_eq!(tally.reject, 0);
}

#[test]
fn tampered_snapshot_is_not_restored() {
    let mut test = TestRegistry::new(2, RegistryConfig::default());
    let id = test.create(Duration::days(1));
    let ballot = test.ballot(&voter(1), "abstain", 2);
    test.registry.cast_vote(id, ballot).unwrap();

    let mut snapshot = test.registry.snapshot();
    if let AuditPayload::ProposalCreated { eligible_voters, .. } = &mut snapshot.audit_log[0].payload
    {
        *eligible_voters = 1_000;
    }
    let err = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .restore(snapshot)
        .unwrap_err();
    assert!(matches!(err, Error::Chain(_)), "{err}");

    let mut snapshot = test.registry.snapshot();
    snapshot.proposals.clear();
    let err = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .restore(snapshot)
        .unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::Inconsistent(_))), "{err}");
}

#[test]
fn flush_uses_opened_storage() {
    let test = TestRegistry::new(1, RegistryConfig::default());
    let storage = Arc::new(MemoryStorage::<Ciphertext>::new());
    let registry = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .open(storage.clone())
        .unwrap();
    assert!(storage.load().unwrap().is_none());

    registry.flush().unwrap();
    let snapshot = storage.load().unwrap().unwrap();
    assert!(snapshot.proposals.is_empty());

    // Registries without storage do nothing on flush.
    test.registry.flush().unwrap();
}
