//! Range proofs for encrypted ballot weights.

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT,
    ristretto::RistrettoPoint,
    scalar::Scalar,
    traits::{Identity, MultiscalarMul, VartimeMultiscalarMul},
};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use std::iter;

use super::{mul_generator, Ciphertext, PublicKey, SecretKey};
use crate::{algebra::WeightVerifier, transcript::TranscriptForRistretto};

const SCALAR_SIZE: usize = 32;

type Commitments = (RistrettoPoint, RistrettoPoint);

/// Decomposition of values `0..max_weight` into digits, each of which has two admissible values:
/// zero and a fixed step.
///
/// With `2^k <= max_weight < 2^(k + 1)`, the steps are `1, 2, ..., 2^(k - 1)` and
/// (if non-zero) `max_weight - 2^k`. A value less than `2^k` is encoded with bits only;
/// a larger value uses the last digit and encodes the difference with bits.
#[derive(Debug, Clone, Copy)]
struct WeightDecomposition {
    bit_count: u32,
    tail: u64,
}

impl WeightDecomposition {
    fn new(max_weight: u64) -> Self {
        debug_assert!(max_weight > 0);
        let bit_count = u64::BITS - 1 - max_weight.leading_zeros();
        Self {
            bit_count,
            tail: max_weight - (1 << bit_count),
        }
    }

    /// Admissible values for every digit. `max_weight == 1` produces a single digit
    /// that must be zero.
    fn digit_values(self) -> Vec<Vec<RistrettoPoint>> {
        let steps = (0..self.bit_count).map(|i| 1_u64 << i);
        let steps = steps.chain((self.tail > 0).then_some(self.tail));
        let mut digit_values: Vec<_> = steps
            .map(|step| vec![RistrettoPoint::identity(), mul_generator(&Scalar::from(step))])
            .collect();
        if digit_values.is_empty() {
            digit_values.push(vec![RistrettoPoint::identity()]);
        }
        digit_values
    }

    /// Indexes of admissible values encoding `value`, which must be less than `max_weight`.
    fn digit_indexes(self, value: u64) -> Vec<usize> {
        let (bits, uses_tail) = if value >> self.bit_count > 0 {
            (value - self.tail, true)
        } else {
            (value, false)
        };
        let mut indexes: Vec<_> = (0..self.bit_count)
            .map(|i| usize::from((bits >> i) & 1 == 1))
            .collect();
        if self.tail > 0 {
            indexes.push(usize::from(uses_tail));
        }
        if indexes.is_empty() {
            indexes.push(0);
        }
        indexes
    }
}

fn initial_transcript(receiver: &PublicKey, ciphertext: &Ciphertext, max_weight: u64) -> Transcript {
    let mut transcript = Transcript::new(b"elastic_tally_weight");
    transcript.start_proof(b"weight_range");
    transcript.append_message(b"K", receiver.as_bytes());
    transcript.append_message(b"enc", &ciphertext.to_bytes());
    transcript.append_u64(b"max", max_weight);
    transcript
}

fn ring_transcript(base: &Transcript, digit: &Ciphertext, index: usize) -> Transcript {
    let mut transcript = base.clone();
    transcript.start_proof(b"ring_enc");
    transcript.append_message(b"enc", &digit.to_bytes());
    transcript.append_u64(b"i", index as u64);
    transcript
}

fn equation_challenge(ring_transcript: &Transcript, eq_index: usize, commitments: &Commitments) -> Scalar {
    let mut transcript = ring_transcript.clone();
    transcript.append_u64(b"j", eq_index as u64);
    transcript.append_element(b"R_G", &commitments.0);
    transcript.append_element(b"R_K", &commitments.1);
    transcript.challenge_scalar(b"c")
}

/// Digit ciphertext together with its random scalar.
struct DigitCiphertext {
    inner: Ciphertext,
    random_scalar: SecretKey,
}

/// Incomplete ring proving that a digit ciphertext encrypts one of its admissible values.
struct Ring<'a> {
    admissible_values: &'a [RistrettoPoint],
    ciphertext: Ciphertext,
    transcript: Transcript,
    responses: Vec<Scalar>,
    terminal_commitments: Commitments,
    value_index: usize,
    discrete_log: SecretKey,
    random_scalar: SecretKey,
}

impl<'a> Ring<'a> {
    fn new<R: CryptoRng + RngCore>(
        index: usize,
        receiver: &PublicKey,
        digit: DigitCiphertext,
        admissible_values: &'a [RistrettoPoint],
        value_index: usize,
        base_transcript: &Transcript,
        rng: &mut R,
    ) -> Self {
        let transcript = ring_transcript(base_transcript, &digit.inner, index);
        let random_scalar = SecretKey::generate(rng);
        let mut commitments = (
            mul_generator(random_scalar.expose_scalar()),
            receiver.as_element() * random_scalar.expose_scalar(),
        );

        let mut responses = vec![Scalar::ZERO; admissible_values.len()];
        let it = admissible_values.iter().enumerate().skip(value_index + 1);
        for (eq_index, admissible_value) in it {
            let challenge = equation_challenge(&transcript, eq_index - 1, &commitments);
            let response = Scalar::random(rng);
            responses[eq_index] = response;
            commitments = Self::commitments(receiver, &digit.inner, admissible_value, response, challenge);
        }

        Self {
            admissible_values,
            ciphertext: digit.inner,
            transcript,
            responses,
            terminal_commitments: commitments,
            value_index,
            discrete_log: digit.random_scalar,
            random_scalar,
        }
    }

    fn commitments(
        receiver: &PublicKey,
        ciphertext: &Ciphertext,
        admissible_value: &RistrettoPoint,
        response: Scalar,
        challenge: Scalar,
    ) -> Commitments {
        let dh_element = ciphertext.blinded_element - admissible_value;
        (
            mul_generator(&response) - ciphertext.random_element * challenge,
            RistrettoPoint::multiscalar_mul(
                [response, -challenge],
                [*receiver.as_element(), dh_element],
            ),
        )
    }

    /// Closes the ring using the common challenge.
    fn finalize<R: CryptoRng + RngCore>(
        mut self,
        receiver: &PublicKey,
        common_challenge: Scalar,
        rng: &mut R,
    ) -> Vec<Scalar> {
        let mut challenge = common_challenge;
        let it = self.admissible_values[..self.value_index].iter().enumerate();
        for (eq_index, admissible_value) in it {
            let response = Scalar::random(rng);
            self.responses[eq_index] = response;
            let commitments =
                Self::commitments(receiver, &self.ciphertext, admissible_value, response, challenge);
            challenge = equation_challenge(&self.transcript, eq_index, &commitments);
        }

        self.responses[self.value_index] =
            self.random_scalar.expose_scalar() + challenge * self.discrete_log.expose_scalar();
        self.responses
    }
}

/// Zero-knowledge proof that an ElGamal ciphertext encrypts a ballot weight in
/// `1..=max_weight`.
///
/// # Construction
///
/// The weight minus one is split into digits (see below), and each digit is encrypted
/// separately so that the digit ciphertexts add up to the ballot ciphertext with `[1]G`
/// subtracted from its blinded element. Every digit ciphertext is accompanied by
/// a Borromean ring signature showing that it encrypts one of the two admissible values
/// of the digit; all rings share a common challenge derived from a Merlin transcript binding
/// the receiver key, the ballot ciphertext and `max_weight`.
///
/// With `2^k <= max_weight < 2^(k + 1)`, the digits are `k` bits with steps `1, 2, ..., 2^(k - 1)`
/// and, unless `max_weight` is a power of two, an additional digit with step `max_weight - 2^k`.
/// The digits can thus express exactly the values `0..max_weight`. Only the digit ciphertexts
/// except the last one are stored; the last one is restored by the verifier from the sum.
///
/// # Examples
///
/// ```
/// # use elastic_tally::elgamal::Keypair;
/// # use rand::thread_rng;
/// let mut rng = thread_rng();
/// let keypair = Keypair::generate(&mut rng);
/// let weight = keypair.public().encrypt_weight(7, 10, &mut rng);
/// assert!(weight.proof().verify(keypair.public(), weight.ciphertext(), 10));
/// // The proof is bound to the bound it was created for.
/// assert!(!weight.proof().verify(keypair.public(), weight.ciphertext(), 8));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightProof {
    partial_ciphertexts: Vec<Ciphertext>,
    common_challenge: Scalar,
    responses: Vec<Scalar>,
}

impl WeightProof {
    /// Encrypts `weight` for `receiver` and proves that it lies in `1..=max_weight`.
    ///
    /// # Panics
    ///
    /// Panics if `weight` is outside of `1..=max_weight`.
    pub(crate) fn new<R: CryptoRng + RngCore>(
        receiver: &PublicKey,
        weight: u64,
        max_weight: u64,
        rng: &mut R,
    ) -> (Ciphertext, Self) {
        assert!(
            (1..=max_weight).contains(&weight),
            "weight {weight} is outside of 1..={max_weight}"
        );
        let decomposition = WeightDecomposition::new(max_weight);
        let digit_values = decomposition.digit_values();
        let digit_indexes = decomposition.digit_indexes(weight - 1);

        let random_scalar = SecretKey::generate(rng);
        let ciphertext = Ciphertext::encrypt_element(
            mul_generator(&Scalar::from(weight)),
            &random_scalar,
            receiver,
        );
        let mut transcript = initial_transcript(receiver, &ciphertext, max_weight);
        let base_transcript = transcript.clone();

        let last_index = digit_values.len() - 1;
        let mut remaining_scalar = *random_scalar.expose_scalar();
        let mut partial_ciphertexts = Vec::with_capacity(last_index);
        let mut rings = Vec::with_capacity(digit_values.len());
        let it = digit_values.iter().zip(digit_indexes).enumerate();
        for (index, (values, value_index)) in it {
            let digit_scalar = if index == last_index {
                SecretKey::new(remaining_scalar)
            } else {
                let scalar = SecretKey::generate(rng);
                remaining_scalar -= scalar.expose_scalar();
                scalar
            };
            let inner = Ciphertext::encrypt_element(values[value_index], &digit_scalar, receiver);
            if index < last_index {
                partial_ciphertexts.push(inner);
            }
            let digit = DigitCiphertext {
                inner,
                random_scalar: digit_scalar,
            };
            rings.push(Ring::new(index, receiver, digit, values, value_index, &base_transcript, rng));
        }
        remaining_scalar.zeroize();

        for ring in &rings {
            transcript.append_element(b"R_G", &ring.terminal_commitments.0);
            transcript.append_element(b"R_K", &ring.terminal_commitments.1);
        }
        let common_challenge = transcript.challenge_scalar(b"c");
        let responses = rings
            .into_iter()
            .flat_map(|ring| ring.finalize(receiver, common_challenge, rng))
            .collect();

        let proof = Self {
            partial_ciphertexts,
            common_challenge,
            responses,
        };
        (ciphertext, proof)
    }

    /// Verifies this proof for the `ciphertext` encrypted for `receiver` and the declared
    /// `max_weight`.
    pub fn verify(&self, receiver: &PublicKey, ciphertext: &Ciphertext, max_weight: u64) -> bool {
        if max_weight == 0 {
            return false;
        }
        let digit_values = WeightDecomposition::new(max_weight).digit_values();
        let total_values: usize = digit_values.iter().map(Vec::len).sum();
        if self.partial_ciphertexts.len() + 1 != digit_values.len()
            || self.responses.len() != total_values
        {
            return false;
        }

        let last_digit = self.partial_ciphertexts.iter().fold(
            Ciphertext {
                random_element: ciphertext.random_element,
                blinded_element: ciphertext.blinded_element - RISTRETTO_BASEPOINT_POINT,
            },
            |acc, digit| Ciphertext {
                random_element: acc.random_element - digit.random_element,
                blinded_element: acc.blinded_element - digit.blinded_element,
            },
        );
        let digits = self.partial_ciphertexts.iter().chain(iter::once(&last_digit));

        let mut transcript = initial_transcript(receiver, ciphertext, max_weight);
        let base_transcript = transcript.clone();
        let mut responses = self.responses.as_slice();
        for (index, (values, digit)) in digit_values.iter().zip(digits).enumerate() {
            let ring_transcript = ring_transcript(&base_transcript, digit, index);
            let (ring_responses, rest) = responses.split_at(values.len());
            responses = rest;

            let mut challenge = self.common_challenge;
            let mut commitments = (RistrettoPoint::identity(), RistrettoPoint::identity());
            for (eq_index, (admissible_value, response)) in
                values.iter().zip(ring_responses).enumerate()
            {
                let dh_element = digit.blinded_element - admissible_value;
                let neg_challenge = -challenge;
                commitments = (
                    RistrettoPoint::vartime_double_scalar_mul_basepoint(
                        &neg_challenge,
                        &digit.random_element,
                        response,
                    ),
                    RistrettoPoint::vartime_multiscalar_mul(
                        [*response, neg_challenge],
                        [*receiver.as_element(), dh_element],
                    ),
                );
                // The challenge after the last equation is not used.
                if eq_index + 1 < values.len() {
                    challenge = equation_challenge(&ring_transcript, eq_index, &commitments);
                }
            }
            transcript.append_element(b"R_G", &commitments.0);
            transcript.append_element(b"R_K", &commitments.1);
        }

        let expected_challenge = transcript.challenge_scalar(b"c");
        bool::from(expected_challenge.ct_eq(&self.common_challenge))
    }

    /// Serializes this proof as the partial digit ciphertexts, followed by the common challenge
    /// and the ring responses.
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = self.partial_ciphertexts.len() * Ciphertext::BYTE_SIZE
            + (self.responses.len() + 1) * SCALAR_SIZE;
        let mut bytes = Vec::with_capacity(capacity);
        for ciphertext in &self.partial_ciphertexts {
            bytes.extend_from_slice(&ciphertext.to_bytes());
        }
        bytes.extend_from_slice(self.common_challenge.as_bytes());
        for response in &self.responses {
            bytes.extend_from_slice(response.as_bytes());
        }
        bytes
    }

    /// Deserializes a proof created for `max_weight`. Returns `None` if the bytes have
    /// an unexpected length or contain invalid group elements or scalars.
    pub fn from_bytes(bytes: &[u8], max_weight: u64) -> Option<Self> {
        if max_weight == 0 {
            return None;
        }
        let digit_values = WeightDecomposition::new(max_weight).digit_values();
        let partial_count = digit_values.len() - 1;
        let response_count: usize = digit_values.iter().map(Vec::len).sum();
        let ciphertexts_len = partial_count * Ciphertext::BYTE_SIZE;
        if bytes.len() != ciphertexts_len + (response_count + 1) * SCALAR_SIZE {
            return None;
        }

        let (ciphertext_bytes, scalar_bytes) = bytes.split_at(ciphertexts_len);
        let partial_ciphertexts = ciphertext_bytes
            .chunks_exact(Ciphertext::BYTE_SIZE)
            .map(Ciphertext::from_bytes)
            .collect::<Option<Vec<_>>>()?;
        let mut scalars = scalar_bytes
            .chunks_exact(SCALAR_SIZE)
            .map(deserialize_scalar)
            .collect::<Option<Vec<_>>>()?;
        let responses = scalars.split_off(1);
        Some(Self {
            partial_ciphertexts,
            common_challenge: scalars[0],
            responses,
        })
    }
}

fn deserialize_scalar(bytes: &[u8]) -> Option<Scalar> {
    let bytes: [u8; SCALAR_SIZE] = bytes.try_into().ok()?;
    Option::from(Scalar::from_canonical_bytes(bytes))
}

impl WeightVerifier<Ciphertext> for PublicKey {
    fn verify_weight(&self, encrypted_weight: &Ciphertext, proof: &WeightProof, max_weight: u64) -> bool {
        proof.verify(self, encrypted_weight, max_weight)
    }
}
