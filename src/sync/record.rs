use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::filter::{canonical_lines, FilterSet};
use crate::filtered_dfs::MappingState;
use crate::hash::{hash_set_from_hex, Hash, HashSet};
use crate::sync::SyncId;

/// Bytes in the AES-128 secret-sealing key.
pub const SECRET_KEY_SIZE: usize = 16;

const NONCE_SIZE: usize = 12;

/// One repository on a configured remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoId {
    pub remote: String,
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(remote: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            remote: remote.into(),
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

/// The filter as configured: raw file text plus its canonical line form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub raw_text: String,
    pub canonical_lines: Vec<String>,
}

impl FilterSpec {
    /// Canonicalize filter file text; unsupported negation lines are
    /// skipped. A filter with no usable patterns is rejected.
    pub fn new(raw_text: &str) -> Result<Self> {
        let lines = canonical_lines(raw_text, true)?;
        if lines.is_empty() {
            return Err(Error::EmptyFilter);
        }
        Ok(FilterSpec {
            raw_text: raw_text.to_string(),
            canonical_lines: lines,
        })
    }

    pub fn build(&self) -> Result<FilterSet> {
        FilterSet::from_patterns(&self.canonical_lines)
    }
}

/// The persisted description of one repository pair kept in sync.
///
/// The record is the unit the service stores per sync id; this crate only
/// produces and consumes it, persistence lives with the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncRecord {
    pub id: String,
    pub from_repo: RepoId,
    pub from_branch: String,
    pub to_repo: RepoId,
    pub to_branch: String,
    pub filter: FilterSpec,
    pub root_commits: Vec<String>,
    pub init_head_commit: String,
    pub last_sync_from_commit: String,
    pub last_sync_to_commit: String,
    pub stat: MappingState,
}

impl SyncRecord {
    pub fn new(
        from_repo: RepoId,
        from_branch: impl Into<String>,
        to_repo: RepoId,
        to_branch: impl Into<String>,
        filter: FilterSpec,
    ) -> Self {
        let from_branch = from_branch.into();
        let to_branch = to_branch.into();
        let id = derive_sync_id(&from_repo, &from_branch, &to_repo, &to_branch);
        SyncRecord {
            id: hex::encode(id),
            from_repo,
            from_branch,
            to_repo,
            to_branch,
            filter,
            ..Default::default()
        }
    }

    pub fn sync_id(&self) -> Result<SyncId> {
        let bytes = hex::decode(&self.id).map_err(|_| Error::InvalidHash(self.id.clone()))?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::ShortHash(self.id.clone()))
    }

    /// No completed sync is recorded yet.
    pub fn is_unsynced(&self) -> bool {
        self.last_sync_from_commit.is_empty()
    }

    /// Forget the mapping; the next projection recomputes from scratch.
    pub fn reset_sync_state(&mut self) {
        self.stat.clear();
        self.last_sync_from_commit.clear();
        self.last_sync_to_commit.clear();
    }

    /// The recorded heads and past-commit sets of both sides.
    pub fn heads(&self) -> Result<(Option<Hash>, HashSet, Option<Hash>, HashSet)> {
        if self.is_unsynced() {
            return Ok((None, HashSet::default(), None, HashSet::default()));
        }
        let from_head = Some(Hash::from_hex(&self.last_sync_from_commit)?);
        let from_past = hash_set_from_hex(&self.stat.from_dfs)?;
        let to_head = if self.last_sync_to_commit.is_empty() {
            None
        } else {
            Some(Hash::from_hex(&self.last_sync_to_commit)?)
        };
        let to_past = hash_set_from_hex(&self.stat.to_dfs)?;
        Ok((from_head, from_past, to_head, to_past))
    }
}

/// Derive the sync id for a repository pair: SHA-256 over the dash-joined
/// remote, owner, repo and branch names of both sides.
pub fn derive_sync_id(
    from_repo: &RepoId,
    from_branch: &str,
    to_repo: &RepoId,
    to_branch: &str,
) -> SyncId {
    let raw = format!(
        "{}-{}-{}-{}-{}-{}-{}-{}",
        from_repo.remote,
        from_repo.owner,
        from_repo.repo,
        from_branch,
        to_repo.remote,
        to_repo.owner,
        to_repo.repo,
        to_branch,
    );
    Sha256::digest(raw.as_bytes()).into()
}

/// Seal a sync id into a shareable secret: a fresh random nonce followed by
/// the AEAD ciphertext of the id.
pub fn seal_secret(key: &[u8; SECRET_KEY_SIZE], id: &SyncId) -> Result<Vec<u8>> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, id.as_slice())
        .map_err(|_| Error::InvalidSecret)?;
    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Recover the sync id from a sealed secret. Any mismatch, truncation or
/// tampering fails as [`Error::InvalidSecret`].
pub fn open_secret(key: &[u8; SECRET_KEY_SIZE], secret: &[u8]) -> Result<SyncId> {
    if secret.len() <= NONCE_SIZE {
        return Err(Error::InvalidSecret);
    }
    let (nonce, sealed) = secret.split_at(NONCE_SIZE);
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let id = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| Error::InvalidSecret)?;
    id.as_slice().try_into().map_err(|_| Error::InvalidSecret)
}
