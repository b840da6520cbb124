//! Confidential weighted voting with homomorphically aggregated tallies and
//! a hash-chained audit log.
//!
//! # ⚠ Warnings
//!
//! The cryptographic parts of this crate have not been independently audited.
//! **Use at your own risk.**
//!
//! # Overview
//!
//! Proposals are opened for a bounded voting window. Members cast weighted ballots whose
//! weight is encrypted by the voter and accompanied by a range proof showing that it does not
//! exceed the voter's cap; the [`Registry`] folds encrypted weights into
//! per-choice running totals without decrypting anything, and the totals are revealed only
//! after the proposal is finalized. Every committed operation is recorded in an append-only
//! [`AuditLog`] forming a SHA-256 hash chain.
//!
//! - [`Registry`] is the operation surface: [create](Registry::create_proposal()),
//!   [vote](Registry::cast_vote()), [finalize](Registry::finalize()),
//!   [verify an audit entry](Registry::verify_audit_entry()), and read-only views.
//! - Proposal lifecycle is `Upcoming → Active → Ended → Finalized`; the first two edges are
//!   driven by a [`Clock`], the last one by an explicit [`Registry::finalize()`] call.
//! - [`BallotValidator`] decides whether a ballot is admitted.
//! - [`EncryptedTally`] aggregates ballots; [`ThresholdRule`] raises a one-time participation
//!   alert based on the plaintext ballot count.
//! - Collaborators are plugged in via traits: [`MembershipProvider`], [`WeightVerifier`],
//!   [`RevealAuthority`], [`ProofVerifier`] and [`Storage`].
//!
//! # Backends
//!
//! The core is generic over [`TallyCiphertext`], an opaque additively homomorphic ciphertext.
//! The [`elgamal`] module provides exponential ElGamal encryption on the Ristretto group,
//! range proofs for ballot weights ([`WeightProof`](elgamal::WeightProof)) and
//! a [`KeyholderAuthority`](elgamal::KeyholderAuthority) able to reveal tallies.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: `INFO` for committed proposal creation, finalization,
//! threshold alerts and entry verification, `DEBUG` for admitted ballots, and `WARN` for rejected
//! operations, failed verifications and timeouts. Voter identities never appear in events;
//! only per-proposal [`VoterTag`]s do.
//!
//! [`tracing`]: https://docs.rs/tracing/

// Documentation settings.
#![cfg_attr(docsrs, feature(doc_cfg))]
// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

mod algebra;
mod attestation;
mod audit;
mod ballot;
mod collaborators;
mod config;
pub mod elgamal;
mod error;
mod lifecycle;
mod persistence;
mod registry;
mod serde;
mod tally;
mod transcript;
mod validator;

pub use crate::{
    algebra::{RevealAuthority, RevealError, TallyCiphertext, WeightVerifier},
    attestation::{Attestation, AttestationVerifier},
    audit::{
        AuditEntry, AuditLog, AuditOperation, AuditPayload, AuditProof, AuditStatement,
        ChainError, OperationHash,
    },
    ballot::{Ballot, Choice, EncryptedWeight, UnknownChoice, VoterId, VoterTag},
    collaborators::{
        Clock, ManualClock, Membership, MembershipProvider, ProofVerifier, Roster, SystemClock,
    },
    config::{ConfigError, RegistryConfig},
    error::{EntityRef, Error, ExternalService},
    lifecycle::{NewProposal, Proposal, ProposalId, ProposalState, ProposalSummary, VotingWindow},
    persistence::{
        JsonFileStorage, MemoryStorage, RegistrySnapshot, Storage, StorageError, SNAPSHOT_VERSION,
    },
    registry::{
        ProposalFilter, Registry, RegistryBuilder, RegistryEvent, RegistryStats, VoteReceipt,
    },
    tally::{EncryptedTally, RevealedTally, ThresholdRule},
    validator::{Admission, BallotValidator, VoteRejection},
};
