mod lock;
mod record;
mod workspace;

pub use lock::{IdLockGuard, IdLocks};
pub use record::{
    derive_sync_id, open_secret, seal_secret, FilterSpec, RepoId, SyncRecord, SECRET_KEY_SIZE,
};
pub use workspace::{
    branch_ref, Detached, FetchOutcome, PushOutcome, RemoteTransport, Workspace,
};

use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::dfs::{dfs_path, roots_of};
use crate::error::{Error, Result, ResultExt};
use crate::filter::FilterSet;
use crate::filtered_dfs::FilteredDfs;
use crate::hash::{combine_hash_sets, hash_set_from_hex, Hash, HashSet};
use crate::object::{Commit, ObjectStore};
use crate::patch::rejected_files;

/// Sync ids are SHA-256 digests of the repository pair description.
pub type SyncId = [u8; 32];

/// A branch's position relative to its recorded last-synced commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStatus {
    /// Current head equals the recorded head, or both are absent.
    InSync,
    /// The recorded head is an ancestor of the current head.
    Advanced,
    /// The recorded head is not reachable from the current head.
    Diverged,
    /// History inspection could not classify the branch.
    Unknown,
}

/// Outcome of checking or importing commits from the filtered side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    CheckPassed,
    FromNotInSync,
    ToNoNewCommits,
    ToDiverged,
    CommitsRejected,
}

/// Reply of the filtered-side check and import operations.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub status: ImportStatus,
    /// Paths touched outside the filter, sorted and deduplicated.
    pub rejected_files: Vec<String>,
    pub has_signatures: bool,
    /// Full-side commits produced by a completed import.
    pub new_commits: Vec<Hash>,
}

impl ImportReport {
    fn precheck(status: ImportStatus) -> Self {
        ImportReport {
            status,
            rejected_files: Vec::new(),
            has_signatures: false,
            new_commits: Vec::new(),
        }
    }
}

/// Tunables of a sync operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Bound for history inspection walks; zero or less means unbounded.
    pub max_generation: i64,
}

/// Classify a branch against its recorded head.
///
/// When the branch advanced, the commits walked during classification are
/// returned so the caller can reuse them as the new-commit batch.
pub fn branch_status<S: ObjectStore>(
    workspace: &Workspace<S>,
    recorded: Option<Hash>,
    past: &HashSet,
    max_generation: i64,
    cancel: &Cancel,
) -> Result<(BranchStatus, Vec<Commit>)> {
    let Some(head) = workspace.head() else {
        let status = if recorded.is_none() {
            BranchStatus::InSync
        } else {
            BranchStatus::Diverged
        };
        return Ok((status, Vec::new()));
    };
    let Some(recorded) = recorded else {
        return Ok((BranchStatus::Advanced, Vec::new()));
    };
    if head.hash() == recorded {
        return Ok((BranchStatus::InSync, Vec::new()));
    }

    let commits = dfs_path(workspace.store(), head.clone(), past, max_generation, cancel)
        .ctx("inspecting branch history")?;
    let roots = roots_of(&commits);
    if roots.is_empty() {
        warn!(branch = %workspace.branch(), "history inspection found no roots");
        return Ok((BranchStatus::Unknown, commits));
    }
    if roots.len() != 1 || roots[0] != recorded {
        return Ok((BranchStatus::Diverged, commits));
    }
    Ok((BranchStatus::Advanced, commits))
}

/// Parameters for setting up a new repository pair.
#[derive(Debug, Clone, Default)]
pub struct InitRequest {
    pub from_repo: RepoId,
    pub from_branch: String,
    pub to_repo: RepoId,
    pub to_branch: String,
    pub filter_text: String,
    /// Optional hex ids bounding the initial traversal.
    pub root_commits: Vec<String>,
    /// Bound for the initial traversal; zero or less means unbounded.
    pub max_depth: i64,
    pub force_push: bool,
}

/// Set up a sync pair: project the full branch through the filter, point
/// the filtered branch at the result, push it, and return the record to
/// persist.
///
/// An empty full branch yields an unsynced record; a projection with no
/// surviving commits is [`Error::FilteredRepoEmpty`].
pub fn initialize<FS, TS>(
    request: &InitRequest,
    from: &mut Workspace<FS>,
    to: &mut Workspace<TS>,
    cancel: &Cancel,
) -> Result<SyncRecord>
where
    FS: ObjectStore,
    TS: ObjectStore,
{
    let filter = FilterSpec::new(&request.filter_text)?;
    let mut record = SyncRecord::new(
        request.from_repo.clone(),
        request.from_branch.clone(),
        request.to_repo.clone(),
        request.to_branch.clone(),
        filter,
    );

    let Some(head) = from.head().cloned() else {
        warn!("full branch is empty, recording an unsynced pair");
        return Ok(record);
    };
    record.init_head_commit = head.hash().to_hex();

    let requested_roots = hash_set_from_hex(&request.root_commits)?;
    let commits = dfs_path(from.store(), head, &requested_roots, request.max_depth, cancel)
        .ctx("traversing the full branch")?;
    record.root_commits = roots_of(&commits).iter().map(Hash::to_hex).collect();

    let mut dfs = FilteredDfs::new(record.filter.build()?);
    dfs.append_commits(from.store(), to.store(), &commits, cancel)?;
    let (from_head, to_head) = dfs.last_commits(from.store(), to.store())?;

    to.set_head(to_head.clone())?;
    to.push(request.force_push, cancel)?;

    record.last_sync_from_commit = from_head.hash().to_hex();
    record.last_sync_to_commit = to_head.hash().to_hex();
    record.stat = dfs.dump();
    Ok(record)
}

/// A loaded repository pair with both branch statuses resolved, driving
/// the two sync directions.
pub struct SyncPair<FS, TS> {
    record: SyncRecord,
    filter: FilterSet,
    roots: HashSet,
    options: SyncOptions,
    from: Workspace<FS>,
    to: Workspace<TS>,
    from_status: BranchStatus,
    to_status: BranchStatus,
    from_new: Vec<Commit>,
    to_new: Vec<Commit>,
}

impl<FS, TS> SyncPair<FS, TS>
where
    FS: ObjectStore,
    TS: ObjectStore,
{
    /// Resolve both branch statuses against the record.
    pub fn load(
        record: SyncRecord,
        from: Workspace<FS>,
        to: Workspace<TS>,
        options: SyncOptions,
        cancel: &Cancel,
    ) -> Result<Self> {
        let filter = record.filter.build()?;
        if filter.is_empty() {
            return Err(Error::EmptyFilter);
        }
        let roots = hash_set_from_hex(&record.root_commits)?;
        let (from_head, from_past, to_head, to_past) = record.heads()?;

        let from_bounds = combine_hash_sets(&roots, &from_past);
        let (from_status, from_new) =
            branch_status(&from, from_head, &from_bounds, options.max_generation, cancel)?;
        let (to_status, to_new) =
            branch_status(&to, to_head, &to_past, options.max_generation, cancel)?;
        info!(from = ?from_status, to = ?to_status, "loaded sync pair");

        Ok(SyncPair {
            record,
            filter,
            roots,
            options,
            from,
            to,
            from_status,
            to_status,
            from_new,
            to_new,
        })
    }

    pub fn statuses(&self) -> (BranchStatus, BranchStatus) {
        (self.from_status, self.to_status)
    }

    pub fn record(&self) -> &SyncRecord {
        &self.record
    }

    /// Tear the pair apart, handing back the (possibly updated) record and
    /// both workspaces.
    pub fn into_parts(self) -> (SyncRecord, Workspace<FS>, Workspace<TS>) {
        (self.record, self.from, self.to)
    }

    /// Project new full-side commits onto the filtered branch and push it.
    ///
    /// Rejected with [`Error::ToNotInSync`] when the filtered branch moved
    /// and `force` is not set. A no-op when both sides are in sync without
    /// `force`. Any other combination resets the mapping first and
    /// recomputes the projection from scratch. Returns the newly produced
    /// filtered commits; the updated record still has to be persisted by
    /// the caller.
    pub fn sync_to_filtered(&mut self, force: bool, cancel: &Cancel) -> Result<Vec<Commit>> {
        if self.to_status != BranchStatus::InSync && !force {
            warn!(
                status = ?self.to_status,
                expected = %self.record.last_sync_to_commit,
                "filtered branch is not in sync"
            );
            return Err(Error::ToNotInSync);
        }
        if self.from_status == BranchStatus::InSync
            && self.to_status == BranchStatus::InSync
            && !force
        {
            info!("both sides in sync, nothing to do");
            return Ok(Vec::new());
        }

        if self.to_status != BranchStatus::InSync || self.from_status != BranchStatus::Advanced {
            info!(from = ?self.from_status, to = ?self.to_status, "resetting mapping state");
            self.record.reset_sync_state();
            self.from_new.clear();
        }

        let mut dfs = FilteredDfs::restore(self.filter.clone(), &self.record.stat)?;

        if self.from_new.is_empty() {
            if self.from.is_empty() {
                return Err(Error::EmptyFromRepo);
            }
            let (_, from_past, _, _) = self.record.heads()?;
            let bounds = combine_hash_sets(&self.roots, &from_past);
            self.from_new = self
                .from
                .new_commits(&bounds, self.options.max_generation, cancel)?;
        }
        if self.from_new.is_empty() {
            info!("full branch has no new commits");
            return Ok(Vec::new());
        }

        let produced = dfs.append_commits(self.from.store(), self.to.store(), &self.from_new, cancel)?;
        if produced.is_empty() {
            info!("projection produced no new filtered commits");
            return Ok(produced);
        }

        let (from_head, to_head) = dfs.last_commits(self.from.store(), self.to.store())?;
        self.to.set_head(to_head.clone())?;
        self.to.push(force, cancel)?;

        self.record.stat = dfs.dump();
        self.record.last_sync_from_commit = from_head.hash().to_hex();
        self.record.last_sync_to_commit = to_head.hash().to_hex();
        Ok(produced)
    }

    fn import_precheck(&self) -> ImportStatus {
        if self.from_status != BranchStatus::InSync {
            ImportStatus::FromNotInSync
        } else if self.to_status == BranchStatus::InSync {
            ImportStatus::ToNoNewCommits
        } else if self.to_status != BranchStatus::Advanced {
            ImportStatus::ToDiverged
        } else {
            ImportStatus::CheckPassed
        }
    }

    fn ensure_to_new(&mut self, cancel: &Cancel) -> Result<()> {
        if self.to_new.is_empty() {
            let (_, _, _, to_past) = self.record.heads()?;
            self.to_new = self
                .to
                .new_commits(&to_past, self.options.max_generation, cancel)?;
        }
        Ok(())
    }

    /// Gate the filtered branch's new commits without touching anything:
    /// every side of every file patch must lie inside the filter, and
    /// signatures are rejected unless allowed.
    pub fn check_from_filtered(
        &mut self,
        allow_signature: bool,
        cancel: &Cancel,
    ) -> Result<ImportReport> {
        let mut report = ImportReport::precheck(self.import_precheck());
        if report.status != ImportStatus::CheckPassed {
            return Ok(report);
        }

        self.ensure_to_new(cancel)?;
        if self.to_new.is_empty() {
            report.status = ImportStatus::ToNoNewCommits;
            return Ok(report);
        }

        report.has_signatures = self.to_new.iter().any(|c| c.signature.is_some());

        let dfs = FilteredDfs::restore(self.filter.clone(), &self.record.stat)?;
        let checks = dfs.check_commits(self.to.store(), &self.to_new, cancel)?;
        report.rejected_files = rejected_files(&checks);

        if !report.rejected_files.is_empty() || (report.has_signatures && !allow_signature) {
            report.status = ImportStatus::CommitsRejected;
        }
        Ok(report)
    }

    /// Import the filtered branch's new commits onto the full branch.
    ///
    /// Runs the same gate as [`check_from_filtered`](Self::check_from_filtered)
    /// first and returns its report untouched when it does not pass. On
    /// success the expanded commits become the new full head, pushed
    /// without force when `push` is set; the updated record still has to
    /// be persisted by the caller.
    pub fn sync_from_filtered(
        &mut self,
        push: bool,
        allow_signature: bool,
        cancel: &Cancel,
    ) -> Result<ImportReport> {
        let mut report = self.check_from_filtered(allow_signature, cancel)?;
        if report.status != ImportStatus::CheckPassed {
            return Ok(report);
        }

        let mut dfs = FilteredDfs::restore(self.filter.clone(), &self.record.stat)?;
        let expanded =
            dfs.expand_filtered_commits(self.from.store(), self.to.store(), &self.to_new, cancel)?;

        let (from_head, to_head) = dfs.last_commits(self.from.store(), self.to.store())?;
        self.from.set_head(from_head.clone())?;
        if push {
            self.from.push(false, cancel)?;
        }

        self.record.stat = dfs.dump();
        self.record.last_sync_from_commit = from_head.hash().to_hex();
        self.record.last_sync_to_commit = to_head.hash().to_hex();
        report.new_commits = expanded.iter().map(Commit::hash).collect();
        Ok(report)
    }
}
