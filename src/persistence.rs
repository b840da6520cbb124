//! Registry snapshots and their storage.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use crate::{
    algebra::TallyCiphertext,
    audit::{AuditEntry, AuditPayload},
    lifecycle::Proposal,
};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable state of a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot<C> {
    /// Format version.
    pub version: u32,
    /// All proposals in ascending id order.
    pub proposals: Vec<Proposal<C>>,
    /// Audit log entries in ascending id order.
    pub audit_log: Vec<AuditEntry>,
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// I/O error.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    /// Snapshot cannot be (de)serialized.
    #[error("snapshot is malformed: {0}")]
    Format(#[from] serde_json::Error),
    /// Snapshot has an unsupported format version.
    #[error("unsupported snapshot version {0}; expected {SNAPSHOT_VERSION}")]
    UnsupportedVersion(u32),
    /// Snapshot contents are inconsistent.
    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

/// Checks that a restored `proposal` agrees with its audit `entries`, given in log order.
///
/// The log is authoritative: the proposal must carry the parameters recorded at creation,
/// one voter tag per `VOTE_CAST` entry, the alert flag iff there is a `THRESHOLD_ALERT` entry,
/// and the finalization time and tally digest of its `FINALIZE_RESULTS` entry (if any).
pub(crate) fn reconcile<C: TallyCiphertext>(
    proposal: &Proposal<C>,
    entries: &[&AuditEntry],
) -> Result<(), StorageError> {
    let id = proposal.id;
    let inconsistent =
        |message: String| StorageError::Inconsistent(format!("proposal {id}: {message}"));

    let (created, rest) = match entries.split_first() {
        Some((created, rest)) if matches!(created.payload, AuditPayload::ProposalCreated { .. }) => {
            (created, rest)
        }
        _ => {
            let message = "log does not start with a PROPOSAL_CREATED entry".to_owned();
            return Err(inconsistent(message));
        }
    };
    let expected_payload = AuditPayload::ProposalCreated {
        content_digest: proposal.content_digest(),
        start_ms: proposal.window.start().timestamp_millis(),
        end_ms: proposal.window.end().timestamp_millis(),
        eligible_voters: proposal.eligible_voters,
    };
    if created.payload != expected_payload
        || created.timestamp.timestamp_millis() != proposal.created_at.timestamp_millis()
    {
        let message = format!("entry {} does not match proposal parameters", created.id);
        return Err(inconsistent(message));
    }

    let mut votes_cast = 0;
    let mut voters = BTreeSet::new();
    let mut alert_raised = false;
    let mut finalize_entry: Option<&AuditEntry> = None;
    for &entry in rest {
        if let Some(finalize_entry) = finalize_entry {
            let message = format!(
                "entry {} follows FINALIZE_RESULTS entry {}",
                entry.id, finalize_entry.id
            );
            return Err(inconsistent(message));
        }
        match &entry.payload {
            AuditPayload::ProposalCreated { .. } => {
                let message = format!("entry {} repeats PROPOSAL_CREATED", entry.id);
                return Err(inconsistent(message));
            }
            AuditPayload::VoteCast {
                voter,
                votes_cast: count,
                ..
            } => {
                votes_cast += 1;
                if *count != votes_cast || !voters.insert(*voter) {
                    let message = format!("VOTE_CAST entry {} is out of sequence", entry.id);
                    return Err(inconsistent(message));
                }
            }
            AuditPayload::ThresholdAlert {
                votes_cast: count,
                eligible_voters,
            } => {
                let expected = !alert_raised
                    && *count == votes_cast
                    && *eligible_voters == proposal.eligible_voters;
                if !expected {
                    let message = format!("THRESHOLD_ALERT entry {} is unexpected", entry.id);
                    return Err(inconsistent(message));
                }
                alert_raised = true;
            }
            AuditPayload::FinalizeResults {
                tally_digest,
                votes_cast: count,
            } => {
                if *count != votes_cast || *tally_digest != proposal.tally.digest() {
                    let message =
                        format!("FINALIZE_RESULTS entry {} does not match the tally", entry.id);
                    return Err(inconsistent(message));
                }
                finalize_entry = Some(entry);
            }
        }
    }

    if proposal.tally.votes_cast() != votes_cast {
        let message = format!(
            "tally counts {} ballots, but {votes_cast} VOTE_CAST entries are logged",
            proposal.tally.votes_cast()
        );
        return Err(inconsistent(message));
    }
    if proposal.voters != voters {
        return Err(inconsistent("voter tags do not match VOTE_CAST entries".to_owned()));
    }
    if proposal.threshold_alert != alert_raised {
        let message = format!(
            "threshold alert flag is {}, but THRESHOLD_ALERT is {}logged",
            proposal.threshold_alert,
            if alert_raised { "" } else { "not " }
        );
        return Err(inconsistent(message));
    }
    let logged_finalization = finalize_entry.map(|entry| entry.timestamp.timestamp_millis());
    if proposal.finalized_at.map(|at| at.timestamp_millis()) != logged_finalization {
        let message = "finalization does not match FINALIZE_RESULTS entries".to_owned();
        return Err(inconsistent(message));
    }
    Ok(())
}

/// Storage for registry snapshots.
pub trait Storage<C>: Send + Sync {
    /// Loads the last saved snapshot, or returns `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    fn load(&self) -> Result<Option<RegistrySnapshot<C>>, StorageError>;

    /// Saves a snapshot, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, snapshot: &RegistrySnapshot<C>) -> Result<(), StorageError>;
}

/// [`Storage`] keeping a snapshot as a JSON file.
///
/// Writes go to a temporary file in the same directory which then replaces the target file,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Creates storage at the specified path. The file does not need to exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self.path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

impl<C> Storage<C> for JsonFileStorage
where
    C: TallyCiphertext + Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<RegistrySnapshot<C>>, StorageError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: RegistrySnapshot<C> = serde_json::from_slice(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion(snapshot.version));
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RegistrySnapshot<C>) -> Result<(), StorageError> {
        let content = serde_json::to_vec_pretty(snapshot)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory [`Storage`].
#[derive(Debug)]
pub struct MemoryStorage<C> {
    snapshot: Mutex<Option<RegistrySnapshot<C>>>,
}

impl<C> Default for MemoryStorage<C> {
    fn default() -> Self {
        Self {
            snapshot: Mutex::new(None),
        }
    }
}

impl<C: TallyCiphertext> MemoryStorage<C> {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: TallyCiphertext> Storage<C> for MemoryStorage<C> {
    fn load(&self) -> Result<Option<RegistrySnapshot<C>>, StorageError> {
        let snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshot.clone())
    }

    fn save(&self, snapshot: &RegistrySnapshot<C>) -> Result<(), StorageError> {
        let mut stored = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = Some(snapshot.clone());
        Ok(())
    }
}
