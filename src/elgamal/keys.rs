//! Cryptographic keys for ElGamal encryption.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::IsIdentity};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use std::fmt;

use super::{
    deserialize_element, mul_generator, Ciphertext, DiscreteLogTable, WeightProof, ELEMENT_SIZE,
};
use crate::ballot::EncryptedWeight;

/// Secret key for ElGamal encryption and attestations. This is a thin wrapper around
/// the Ristretto scalar, which is zeroized on drop.
pub struct SecretKey(Scalar);

impl fmt::Debug for SecretKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SecretKey")
            .field("public", &PublicKey::from(self))
            .finish()
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        SecretKey(self.0)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl SecretKey {
    /// Generates a random secret key.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        SecretKey(Scalar::random(rng))
    }

    /// Deserializes a secret key from bytes. If bytes do not represent a canonical scalar,
    /// returns `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Option::from(Scalar::from_canonical_bytes(bytes)).map(SecretKey)
    }

    pub(crate) fn new(scalar: Scalar) -> Self {
        SecretKey(scalar)
    }

    pub(crate) fn expose_scalar(&self) -> &Scalar {
        &self.0
    }

    /// Decrypts the provided ciphertext and returns the produced group element.
    ///
    /// As the ciphertext does not include a MAC or another way to assert integrity,
    /// this operation cannot fail. If the ciphertext is not produced properly (e.g., it targets
    /// another receiver), the returned element will be garbage.
    pub fn decrypt_to_element(&self, encrypted: Ciphertext) -> RistrettoPoint {
        let dh_element = encrypted.random_element * self.0;
        encrypted.blinded_element - dh_element
    }

    /// Decrypts the provided ciphertext and returns the original encrypted value, or `None`
    /// if the value is not present in `lookup_table`.
    pub fn decrypt(&self, encrypted: Ciphertext, lookup_table: &DiscreteLogTable) -> Option<u64> {
        lookup_table.get(&self.decrypt_to_element(encrypted))
    }
}

/// Public key for ElGamal encryption and attestation verification.
///
/// # Implementation details
///
/// We store both the compressed bytes (which are used in attestation transcripts)
/// and the decompressed group element.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) bytes: [u8; ELEMENT_SIZE],
    element: RistrettoPoint,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("PublicKey")
            .field(&hex::encode(self.bytes))
            .finish()
    }
}

impl PublicKey {
    /// Deserializes a public key from bytes. If the bytes do not represent a valid
    /// non-identity group element, returns `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let element = deserialize_element(bytes).filter(|element| !element.is_identity())?;
        Some(Self::from_element(element))
    }

    fn from_element(element: RistrettoPoint) -> Self {
        Self {
            bytes: element.compress().to_bytes(),
            element,
        }
    }

    /// Returns bytes representing the group element corresponding to this key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn as_element(&self) -> &RistrettoPoint {
        &self.element
    }

    /// Encrypts a value for this key.
    pub fn encrypt<R: CryptoRng + RngCore>(&self, value: u64, rng: &mut R) -> Ciphertext {
        Ciphertext::encrypt(value, self, rng)
    }

    /// Encrypts a ballot `weight` for this key and proves that it lies in `1..=max_weight`.
    ///
    /// # Panics
    ///
    /// Panics if `weight` is outside of `1..=max_weight`.
    pub fn encrypt_weight<R: CryptoRng + RngCore>(
        &self,
        weight: u64,
        max_weight: u64,
        rng: &mut R,
    ) -> EncryptedWeight<Ciphertext> {
        let (ciphertext, proof) = WeightProof::new(self, weight, max_weight, rng);
        EncryptedWeight::new(ciphertext, proof, max_weight)
    }
}

impl From<&SecretKey> for PublicKey {
    fn from(secret_key: &SecretKey) -> Self {
        Self::from_element(mul_generator(&secret_key.0))
    }
}

/// Keypair for ElGamal encryption and attestations, consisting of a [`SecretKey`]
/// and the matching [`PublicKey`].
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Keypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl Keypair {
    /// Generates a random keypair.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        Self::from(SecretKey::generate(rng))
    }

    /// Returns the public part of this keypair.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the secret part of this keypair.
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Returns public and secret keys comprising this keypair.
    pub fn into_tuple(self) -> (PublicKey, SecretKey) {
        (self.public, self.secret)
    }
}

impl From<SecretKey> for Keypair {
    fn from(secret: SecretKey) -> Self {
        Self {
            public: PublicKey::from(&secret),
            secret,
        }
    }
}
