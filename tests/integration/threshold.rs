//! Participation threshold alerts.

use chrono::Duration;

use elastic_tally::{AuditOperation, Choice, RegistryConfig, ThresholdRule};

use crate::{voter, TestRegistry};

fn alert_entries(test: &TestRegistry) -> usize {
    test.registry
        .audit_entries()
        .iter()
        .filter(|entry| entry.operation == AuditOperation::ThresholdAlert)
        .count()
}

#[test]
fn alert_is_raised_once_at_half_participation() {
    let config = RegistryConfig {
        threshold: ThresholdRule::Participation { percent: 50 },
        ..RegistryConfig::default()
    };
    let mut test = TestRegistry::new(10, config);
    let id = test.create(Duration::days(1));

    for i in 0..4 {
        let choice = Choice::ALL[i % 3].as_str();
        let ballot = test.ballot(&voter(i), choice, 1);
        let receipt = test.registry.cast_vote(id, ballot).unwrap();
        assert!(!receipt.threshold_alert);
        assert!(!test.registry.proposal(id).unwrap().threshold_alert);
    }
    assert_eq!(alert_entries(&test), 0);

    let ballot = test.ballot(&voter(4), "approve", 1);
    let receipt = test.registry.cast_vote(id, ballot).unwrap();
    assert!(receipt.threshold_alert);
    assert!(test.registry.proposal(id).unwrap().threshold_alert);
    assert_eq!(alert_entries(&test), 1);

    // The alert entry directly follows the vote that triggered it.
    let alert = test.registry.audit_entry(receipt.entry_id + 1).unwrap();
    assert_eq!(alert.operation, AuditOperation::ThresholdAlert);
    assert_eq!(alert.proposal_id, id);

    for i in 5..10 {
        let ballot = test.ballot(&voter(i), "reject", 1);
        let receipt = test.registry.cast_vote(id, ballot).unwrap();
        assert!(!receipt.threshold_alert);
    }
    assert_eq!(alert_entries(&test), 1);
    assert_eq!(test.registry.stats().threshold_alerts, 1);
}

#[test]
fn disabled_rule_never_fires() {
    let config = RegistryConfig {
        threshold: ThresholdRule::Disabled,
        ..RegistryConfig::default()
    };
    let mut test = TestRegistry::new(2, config);
    let id = test.create(Duration::days(1));
    for i in 0..2 {
        let ballot = test.ballot(&voter(i), "approve", 1);
        test.registry.cast_vote(id, ballot).unwrap();
    }
    assert_eq!(alert_entries(&test), 0);
    assert!(!test.registry.proposal(id).unwrap().threshold_alert);
}

#[test]
fn alerts_are_tracked_per_proposal() {
    let config = RegistryConfig {
        threshold: ThresholdRule::Participation { percent: 30 },
        ..RegistryConfig::default()
    };
    let mut test = TestRegistry::new(3, config);
    let first = test.create(Duration::days(1));
    let second = test.create(Duration::days(1));

    let ballot = test.ballot(&voter(0), "approve", 1);
    assert!(test.registry.cast_vote(first, ballot).unwrap().threshold_alert);
    let ballot = test.ballot(&voter(0), "approve", 1);
    assert!(test.registry.cast_vote(second, ballot).unwrap().threshold_alert);
    let ballot = test.ballot(&voter(1), "approve", 1);
    assert!(!test.registry.cast_vote(first, ballot).unwrap().threshold_alert);

    assert_eq!(alert_entries(&test), 2);
    assert_eq!(test.registry.stats().threshold_alerts, 2);
}
