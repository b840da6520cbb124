//! Merlin transcript extensions shared by attestations and weight proofs.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use merlin::Transcript;

pub(crate) trait TranscriptForRistretto {
    fn start_proof(&mut self, proof_label: &'static [u8]);

    fn append_element(&mut self, label: &'static [u8], element: &RistrettoPoint);

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
}

impl TranscriptForRistretto for Transcript {
    fn start_proof(&mut self, proof_label: &'static [u8]) {
        self.append_message(b"dom-sep", proof_label);
    }

    fn append_element(&mut self, label: &'static [u8], element: &RistrettoPoint) {
        self.append_message(label, element.compress().as_bytes());
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut bytes = [0_u8; 64];
        self.challenge_bytes(label, &mut bytes);
        Scalar::from_bytes_mod_order_wide(&bytes)
    }
}
