//! Algebraic interface for encrypted tally values.
//!
//! The core of the crate is written against [`TallyCiphertext`], an opaque type supporting
//! homomorphic addition and nothing else. Ballot weights come with proofs checked by
//! a [`WeightVerifier`], so that the registry can enforce weight caps without decrypting
//! anything. Decryption is a separate capability
//! ([`RevealAuthority`]) which the [`Registry`](crate::Registry) only exercises
//! for finalized proposals.

use async_trait::async_trait;

use core::fmt;

use crate::tally::{EncryptedTally, RevealedTally};

/// Encrypted value that can be added to other encrypted values without decryption.
///
/// # Contract
///
/// - [`Self::zero()`] is the additive identity: `x.add(&zero())` encrypts the same value as `x`.
/// - [`Self::add()`] must be associative and commutative, so that folding ballots
///   in any order produces ciphertexts decrypting to the same totals.
/// - No method may reveal the plaintext.
pub trait TallyCiphertext: Clone + fmt::Debug + Send + Sync + 'static {
    /// Zero-knowledge proof that an encrypted ballot weight lies in `1..=max_weight`.
    /// Checked by a [`WeightVerifier`].
    type WeightProof: Clone + fmt::Debug + Send + Sync + 'static;

    /// Returns the encryption of zero that does not depend on any key (i.e., an unblinded
    /// additive identity).
    fn zero() -> Self;

    /// Homomorphically adds two ciphertexts.
    fn add(&self, other: &Self) -> Self;

    /// Canonical serialization of the ciphertext. Used to bind ciphertexts to audit records,
    /// so equal ciphertexts must produce equal bytes.
    fn to_bytes(&self) -> Vec<u8>;
}

/// Capability to check [weight proofs](TallyCiphertext::WeightProof) of ballots.
///
/// For ElGamal ciphertexts, this is implemented by the
/// [`PublicKey`](crate::elgamal::PublicKey) the ballots are encrypted for.
pub trait WeightVerifier<C: TallyCiphertext>: Send + Sync {
    /// Checks that `encrypted_weight` encrypts a value in `1..=max_weight`.
    fn verify_weight(&self, encrypted_weight: &C, proof: &C::WeightProof, max_weight: u64) -> bool;
}

/// Decryption capability for final tallies, held outside of the registry.
///
/// Implementations may be remote (e.g., a threshold committee); the registry wraps every call
/// with a caller-supplied timeout.
#[async_trait]
pub trait RevealAuthority<C: TallyCiphertext>: Send + Sync {
    /// Decrypts every accumulator of a finalized `tally`.
    async fn reveal(&self, tally: &EncryptedTally<C>) -> Result<RevealedTally, RevealError>;
}

/// Error produced by a [`RevealAuthority`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RevealError {
    /// Decrypted value for the accumulator is outside of the range the authority can recover.
    #[error("accumulator `{0}` does not decrypt to a value in the supported range")]
    OutOfRange(&'static str),
    /// Authority refused to decrypt.
    #[error("reveal authority refused to decrypt: {0}")]
    Refused(String),
}
