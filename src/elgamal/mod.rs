//! Exponential ElGamal encryption on the Ristretto group.
//!
//! This is the reference [`TallyCiphertext`] backend. A value `m` is encrypted for the public
//! key `K = [x]G` as `(R, B) = ([r]G, [m]G + [r]K)` with a random scalar `r`. Ciphertexts
//! add component-wise, which adds the encrypted values. Decryption recovers `[m]G`; the value
//! itself is then found with a [`DiscreteLogTable`], which limits recoverable values to a range
//! known in advance (for tallies, the maximum possible total weight).

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::{Identity, IsIdentity},
};
use rand_core::{CryptoRng, RngCore};

use std::{collections::HashMap, fmt, ops};

use crate::algebra::TallyCiphertext;

mod authority;
mod keys;
mod range;

pub use self::{
    authority::KeyholderAuthority,
    keys::{Keypair, PublicKey, SecretKey},
    range::WeightProof,
};

/// Byte size of a serialized group element.
pub(crate) const ELEMENT_SIZE: usize = 32;

pub(crate) fn mul_generator(scalar: &Scalar) -> RistrettoPoint {
    scalar * RISTRETTO_BASEPOINT_TABLE
}

pub(crate) fn deserialize_element(bytes: &[u8]) -> Option<RistrettoPoint> {
    CompressedRistretto::from_slice(bytes).ok()?.decompress()
}

/// ElGamal ciphertext.
///
/// Ciphertexts are partially homomorphic: they can be added together, which is the only
/// operation the voting core needs. Ballot weights are additionally accompanied by
/// a [`WeightProof`] showing that the encrypted value is in the admissible range.
///
/// # Examples
///
/// ```
/// # use elastic_tally::elgamal::{DiscreteLogTable, Keypair};
/// # use rand::thread_rng;
/// let mut rng = thread_rng();
/// let keypair = Keypair::generate(&mut rng);
/// let sum = keypair.public().encrypt(10, &mut rng) + keypair.public().encrypt(3, &mut rng);
/// let table = DiscreteLogTable::new(0..=20);
/// assert_eq!(keypair.secret().decrypt(sum, &table), Some(13));
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    pub(crate) random_element: RistrettoPoint,
    pub(crate) blinded_element: RistrettoPoint,
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Ciphertext")
            .field(
                "random_element",
                &hex::encode(self.random_element.compress().as_bytes()),
            )
            .field(
                "blinded_element",
                &hex::encode(self.blinded_element.compress().as_bytes()),
            )
            .finish()
    }
}

impl Ciphertext {
    /// Byte size of a serialized ciphertext.
    pub const BYTE_SIZE: usize = 2 * ELEMENT_SIZE;

    /// Represents encryption of zero value without the blinding factor.
    pub fn zero() -> Self {
        Self {
            random_element: RistrettoPoint::identity(),
            blinded_element: RistrettoPoint::identity(),
        }
    }

    /// Checks whether this is the unblinded encryption of zero returned by [`Self::zero()`].
    pub fn is_trivial(&self) -> bool {
        self.random_element.is_identity() && self.blinded_element.is_identity()
    }

    /// Serializes this ciphertext as two compressed group elements (the random element,
    /// then the blinded value).
    pub fn to_bytes(self) -> [u8; Self::BYTE_SIZE] {
        let mut bytes = [0_u8; Self::BYTE_SIZE];
        bytes[..ELEMENT_SIZE].copy_from_slice(self.random_element.compress().as_bytes());
        bytes[ELEMENT_SIZE..].copy_from_slice(self.blinded_element.compress().as_bytes());
        bytes
    }

    /// Deserializes a ciphertext. Returns `None` if the bytes have an unexpected length
    /// or do not encode valid group elements.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::BYTE_SIZE {
            return None;
        }
        let random_element = deserialize_element(&bytes[..ELEMENT_SIZE])?;
        let blinded_element = deserialize_element(&bytes[ELEMENT_SIZE..])?;
        Some(Self {
            random_element,
            blinded_element,
        })
    }

    pub(crate) fn encrypt<R: CryptoRng + RngCore>(
        value: u64,
        receiver: &PublicKey,
        rng: &mut R,
    ) -> Self {
        let random_scalar = SecretKey::generate(rng);
        Self::encrypt_element(mul_generator(&Scalar::from(value)), &random_scalar, receiver)
    }

    pub(crate) fn encrypt_element(
        element: RistrettoPoint,
        random_scalar: &SecretKey,
        receiver: &PublicKey,
    ) -> Self {
        let random_element = mul_generator(random_scalar.expose_scalar());
        let dh_element = receiver.as_element() * random_scalar.expose_scalar();
        Self {
            random_element,
            blinded_element: element + dh_element,
        }
    }
}

impl ops::Add for Ciphertext {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            random_element: self.random_element + rhs.random_element,
            blinded_element: self.blinded_element + rhs.blinded_element,
        }
    }
}

impl ops::AddAssign for Ciphertext {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl TallyCiphertext for Ciphertext {
    type WeightProof = WeightProof;

    fn zero() -> Self {
        Ciphertext::zero()
    }

    fn add(&self, other: &Self) -> Self {
        *self + *other
    }

    fn to_bytes(&self) -> Vec<u8> {
        Ciphertext::to_bytes(*self).to_vec()
    }
}

/// Lookup table for discrete logarithms.
///
/// Exponential ElGamal decrypts to `[m]G` rather than to `m`; the table maps such elements
/// back to values. It must contain every value that can legitimately appear in a decrypted
/// tally.
#[derive(Debug, Clone)]
pub struct DiscreteLogTable {
    inner: HashMap<[u8; ELEMENT_SIZE], u64>,
}

impl DiscreteLogTable {
    /// Creates a lookup table for the specified `values`.
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        let inner = values
            .into_iter()
            .filter(|&value| value != 0)
            .map(|value| {
                let element = mul_generator(&Scalar::from(value));
                (element.compress().to_bytes(), value)
            })
            .collect();
        Self { inner }
    }

    /// Gets the discrete log of `decrypted_element`, or `None` if it is not present among
    /// `values` supplied when constructing this table.
    pub fn get(&self, decrypted_element: &RistrettoPoint) -> Option<u64> {
        if decrypted_element.is_identity() {
            Some(0)
        } else {
            let bytes = decrypted_element.compress().to_bytes();
            self.inner.get(&bytes).copied()
        }
    }
}
