//! Single-keyholder reveal authority.

use async_trait::async_trait;

use std::fmt;

use super::{Ciphertext, DiscreteLogTable, SecretKey};
use crate::{
    algebra::{RevealAuthority, RevealError},
    ballot::Choice,
    tally::{EncryptedTally, RevealedTally},
};

/// [`RevealAuthority`] holding the whole decryption key.
///
/// Suitable for tests and for deployments where the key is held by a single trusted party;
/// threshold setups should implement [`RevealAuthority`] on top of their own decryption
/// protocol.
pub struct KeyholderAuthority {
    secret: SecretKey,
    lookup_table: DiscreteLogTable,
}

impl fmt::Debug for KeyholderAuthority {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KeyholderAuthority")
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

impl KeyholderAuthority {
    /// Creates an authority able to decrypt totals in `0..=max_total`.
    pub fn new(secret: SecretKey, max_total: u64) -> Self {
        Self {
            secret,
            lookup_table: DiscreteLogTable::new(0..=max_total),
        }
    }

    fn decrypt(&self, ciphertext: &Ciphertext, label: &'static str) -> Result<u64, RevealError> {
        self.secret
            .decrypt(*ciphertext, &self.lookup_table)
            .ok_or(RevealError::OutOfRange(label))
    }
}

#[async_trait]
impl RevealAuthority<Ciphertext> for KeyholderAuthority {
    async fn reveal(&self, tally: &EncryptedTally<Ciphertext>) -> Result<RevealedTally, RevealError> {
        Ok(RevealedTally {
            approve: self.decrypt(tally.for_choice(Choice::Approve), Choice::Approve.as_str())?,
            reject: self.decrypt(tally.for_choice(Choice::Reject), Choice::Reject.as_str())?,
            abstain: self.decrypt(tally.for_choice(Choice::Abstain), Choice::Abstain.as_str())?,
            total: self.decrypt(tally.total(), "total")?,
            votes_cast: tally.votes_cast(),
        })
    }
}
