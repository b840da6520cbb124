//! Auditor attestations for audit log entries.

use async_trait::async_trait;
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

use crate::{
    audit::{AuditProof, AuditStatement},
    collaborators::ProofVerifier,
    elgamal::{mul_generator, Keypair, PublicKey, SecretKey},
    transcript::TranscriptForRistretto,
};

const SCALAR_SIZE: usize = 32;

fn start_attestation(transcript: &mut Transcript, auditor: &PublicKey, statement: &AuditStatement) {
    transcript.start_proof(b"audit_attestation");
    transcript.append_message(b"K", auditor.as_bytes());
    transcript.append_message(b"statement", &statement.to_bytes());
}

/// Zero-knowledge proof that the holder of an auditor key has attested an [`AuditStatement`].
///
/// # Construction
///
/// This is a Schnorr proof of knowledge of the auditor's secret key, with the challenge
/// derived from a Merlin transcript that binds the auditor public key and the statement
/// (entry id, recomputed operation hash and canonical entry contents). An attestation
/// for one entry does not verify for any other entry, nor for the same entry after
/// any preceding entry was modified.
///
/// # Examples
///
/// ```
/// # use elastic_tally::{elgamal::Keypair, Attestation, AuditStatement, OperationHash};
/// # use rand::thread_rng;
/// let mut rng = thread_rng();
/// let auditor = Keypair::generate(&mut rng);
/// let statement = AuditStatement {
///     entry_id: 1,
///     operation_hash: OperationHash::from_bytes([7; 32]),
///     canonical_bytes: b"entry".to_vec(),
/// };
/// let attestation = Attestation::new(&auditor, &statement, &mut rng);
/// assert!(attestation.verify(auditor.public(), &statement));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attestation {
    challenge: Scalar,
    response: Scalar,
}

impl Attestation {
    /// Byte size of a serialized attestation.
    pub const BYTE_SIZE: usize = 2 * SCALAR_SIZE;

    /// Attests `statement` with the auditor `keypair`.
    pub fn new<R: CryptoRng + RngCore>(
        keypair: &Keypair,
        statement: &AuditStatement,
        rng: &mut R,
    ) -> Self {
        let mut transcript = Transcript::new(b"elastic_tally_audit");
        start_attestation(&mut transcript, keypair.public(), statement);

        let randomness = SecretKey::generate(rng);
        let random_element = mul_generator(randomness.expose_scalar());
        transcript.append_element(b"R", &random_element);
        let challenge = transcript.challenge_scalar(b"c");
        let response =
            randomness.expose_scalar() + challenge * keypair.secret().expose_scalar();
        Self {
            challenge,
            response,
        }
    }

    /// Verifies this attestation for the `auditor` key and `statement`.
    pub fn verify(&self, auditor: &PublicKey, statement: &AuditStatement) -> bool {
        let mut transcript = Transcript::new(b"elastic_tally_audit");
        start_attestation(&mut transcript, auditor, statement);

        let random_element = RistrettoPoint::vartime_double_scalar_mul_basepoint(
            &-self.challenge,
            auditor.as_element(),
            &self.response,
        );
        transcript.append_element(b"R", &random_element);
        let expected_challenge = transcript.challenge_scalar(b"c");
        bool::from(expected_challenge.ct_eq(&self.challenge))
    }

    /// Serializes this attestation into bytes.
    pub fn to_bytes(&self) -> [u8; Self::BYTE_SIZE] {
        let mut bytes = [0_u8; Self::BYTE_SIZE];
        bytes[..SCALAR_SIZE].copy_from_slice(self.challenge.as_bytes());
        bytes[SCALAR_SIZE..].copy_from_slice(self.response.as_bytes());
        bytes
    }

    /// Deserializes an attestation from bytes. Returns `None` if the bytes do not
    /// represent a pair of canonical scalars.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::BYTE_SIZE {
            return None;
        }
        let challenge: [u8; SCALAR_SIZE] = bytes[..SCALAR_SIZE].try_into().ok()?;
        let response: [u8; SCALAR_SIZE] = bytes[SCALAR_SIZE..].try_into().ok()?;
        Some(Self {
            challenge: Option::from(Scalar::from_canonical_bytes(challenge))?,
            response: Option::from(Scalar::from_canonical_bytes(response))?,
        })
    }
}

impl From<Attestation> for AuditProof {
    fn from(attestation: Attestation) -> Self {
        Self(attestation.to_bytes().to_vec())
    }
}

/// [`ProofVerifier`] accepting [`Attestation`]s produced by a single auditor.
#[derive(Debug, Clone)]
pub struct AttestationVerifier {
    auditor: PublicKey,
}

impl AttestationVerifier {
    /// Creates a verifier for the specified auditor key.
    pub fn new(auditor: PublicKey) -> Self {
        Self { auditor }
    }
}

#[async_trait]
impl ProofVerifier for AttestationVerifier {
    async fn verify(&self, statement: &AuditStatement, proof: &AuditProof) -> bool {
        Attestation::from_bytes(&proof.0)
            .is_some_and(|attestation| attestation.verify(&self.auditor, statement))
    }
}
