//! Audit log verification.

use async_trait::async_trait;
use chrono::Duration;

use std::{sync::Arc, time::Duration as StdDuration};

use elastic_tally::{
    Attestation, AuditLog, AuditPayload, AuditProof, AuditStatement, ChainError, Error,
    ExternalService, ProofVerifier, RegistryConfig,
};

use crate::{voter, TestRegistry};

fn populated_registry() -> TestRegistry {
    let mut test = TestRegistry::new(5, RegistryConfig::default());
    let id = test.create(Duration::days(1));
    for i in 0..2 {
        let ballot = test.ballot(&voter(i), "approve", 3);
        test.registry.cast_vote(id, ballot).unwrap();
    }
    test
}

fn attest(test: &mut TestRegistry, entry_id: u64) -> AuditProof {
    let statement = test.registry.audit_log().statement(entry_id).unwrap();
    Attestation::new(&test.auditor, &statement, &mut test.rng).into()
}

#[tokio::test]
async fn attested_entry_is_verified() {
    let mut test = populated_registry();
    let proof = attest(&mut test, 2);
    let timeout = test.registry.external_timeout();

    let entry = test.registry.verify_audit_entry(2, &proof, timeout).await.unwrap();
    assert!(entry.verified);
    assert!(test.registry.audit_entry(2).unwrap().verified);
    assert!(!test.registry.audit_entry(1).unwrap().verified);

    // Re-verification is idempotent and does not consult the verifier again.
    let entry = test
        .registry
        .verify_audit_entry(2, &AuditProof(vec![]), timeout)
        .await
        .unwrap();
    assert!(entry.verified);
    // Verification does not change hashes.
    test.registry.verify_chain().unwrap();
}

#[tokio::test]
async fn proof_for_other_entry_is_rejected() {
    let mut test = populated_registry();
    let proof = attest(&mut test, 1);
    let timeout = test.registry.external_timeout();

    let err = test
        .registry
        .verify_audit_entry(3, &proof, timeout)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VerificationFailed { entry_id: 3, .. }), "{err}");
    assert!(!test.registry.audit_entry(3).unwrap().verified);

    // The failure is not fatal: a valid proof is still accepted afterwards.
    let proof = attest(&mut test, 3);
    test.registry.verify_audit_entry(3, &proof, timeout).await.unwrap();
}

#[tokio::test]
async fn proof_from_other_auditor_is_rejected() {
    let test = populated_registry();
    let mut other = TestRegistry::new(1, RegistryConfig::default());
    let statement = test.registry.audit_log().statement(1).unwrap();
    let proof: AuditProof = Attestation::new(&other.auditor, &statement, &mut other.rng).into();

    let err = test
        .registry
        .verify_audit_entry(1, &proof, test.registry.external_timeout())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VerificationFailed { entry_id: 1, .. }));
}

struct StalledVerifier;

#[async_trait]
impl ProofVerifier for StalledVerifier {
    async fn verify(&self, _statement: &AuditStatement, _proof: &AuditProof) -> bool {
        tokio::time::sleep(StdDuration::from_secs(60)).await;
        true
    }
}

#[tokio::test]
async fn stalled_verifier_times_out() {
    let test = populated_registry();
    let registry = TestRegistry::builder(&test.roster, &test.clock, &test.keypair, &test.auditor)
        .with_proof_verifier(Arc::new(StalledVerifier))
        .restore(test.registry.snapshot())
        .unwrap();

    let timeout = StdDuration::from_millis(20);
    let err = registry
        .verify_audit_entry(1, &AuditProof(vec![]), timeout)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::ExternalServiceTimeout {
                service: ExternalService::ProofVerifier,
                ..
            }
        ),
        "{err}"
    );
    assert!(!registry.audit_entry(1).unwrap().verified);
}

#[test]
fn tampering_is_detected() {
    let test = populated_registry();
    let mut entries = test.registry.audit_entries();
    let AuditPayload::VoteCast { votes_cast, .. } = &mut entries[1].payload else {
        panic!("unexpected payload for entry 2");
    };
    *votes_cast += 1;

    let err = AuditLog::from_entries(entries.clone()).unwrap_err();
    assert_eq!(err, ChainError::HashMismatch { entry_id: 2 });

    // Fixing up the stored hash breaks the link to the following entry.
    let original = AuditLog::from_entries(test.registry.audit_entries()).unwrap();
    let mut relinked = AuditLog::new();
    for entry in &entries {
        relinked.append(entry.proposal_id, entry.payload.clone(), entry.timestamp);
    }
    let original_hashes = original.recompute_hashes();
    let tampered_hashes = relinked.recompute_hashes();
    assert_eq!(original_hashes[0], tampered_hashes[0]);
    assert_ne!(original_hashes[1], tampered_hashes[1]);
    assert_ne!(original_hashes[2], tampered_hashes[2]);

    entries[1].operation_hash = tampered_hashes[1];
    let err = AuditLog::from_entries(entries).unwrap_err();
    assert_eq!(err, ChainError::BrokenLink { entry_id: 3 });
}

#[tokio::test]
async fn missing_entries_are_reported() {
    let test = populated_registry();
    let err = test
        .registry
        .verify_audit_entry(100, &AuditProof(vec![]), test.registry.external_timeout())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
