use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::dfs::dfs_path;
use crate::error::{Error, Result, ResultExt};
use crate::hash::{Hash, HashSet};
use crate::object::{Commit, ObjectStore};

/// Result of fetching a branch from a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    /// The remote repository has no objects at all.
    EmptyRemote,
    /// The remote exists but has no ref for the requested branch.
    NoMatchingRef,
}

/// Result of pushing a branch to a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    AlreadyUpToDate,
}

/// Transport to a hosting provider.
///
/// `fetch` materializes the branch's objects and refs into the given store;
/// `push` publishes the branch head. Both poll the cancellation token.
/// Authentication and wire details live behind implementations of this
/// trait; the sync machinery only depends on the outcomes.
pub trait RemoteTransport {
    fn fetch(&mut self, store: &dyn ObjectStore, branch: &str, cancel: &Cancel)
        -> Result<FetchOutcome>;
    fn push(
        &mut self,
        store: &dyn ObjectStore,
        branch: &str,
        head: Hash,
        force: bool,
        cancel: &Cancel,
    ) -> Result<PushOutcome>;
}

/// Transport of a repository with no remote: fetches find nothing and
/// pushes trivially succeed.
#[derive(Debug, Default)]
pub struct Detached;

impl RemoteTransport for Detached {
    fn fetch(
        &mut self,
        _store: &dyn ObjectStore,
        _branch: &str,
        _cancel: &Cancel,
    ) -> Result<FetchOutcome> {
        Ok(FetchOutcome::NoMatchingRef)
    }

    fn push(
        &mut self,
        _store: &dyn ObjectStore,
        _branch: &str,
        _head: Hash,
        _force: bool,
        _cancel: &Cancel,
    ) -> Result<PushOutcome> {
        Ok(PushOutcome::Pushed)
    }
}

/// Full ref name of a branch.
pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// One branch of one repository held in memory for the duration of a
/// single sync operation.
pub struct Workspace<S> {
    store: S,
    branch: String,
    head: Option<Commit>,
    remote: Box<dyn RemoteTransport>,
}

impl<S: ObjectStore> Workspace<S> {
    /// Fetch the branch through the transport and resolve its head. An
    /// empty remote or a missing ref is an empty branch, not a failure.
    pub fn open(
        store: S,
        branch: impl Into<String>,
        remote: Box<dyn RemoteTransport>,
        cancel: &Cancel,
    ) -> Result<Self> {
        let mut workspace = Workspace {
            store,
            branch: branch.into(),
            head: None,
            remote,
        };
        cancel.checkpoint()?;
        let outcome = workspace
            .remote
            .fetch(&workspace.store, &workspace.branch, cancel)
            .ctx("failed to fetch branch")?;
        match outcome {
            FetchOutcome::Fetched => workspace.reload_head()?,
            FetchOutcome::EmptyRemote | FetchOutcome::NoMatchingRef => {
                warn!(branch = %workspace.branch, ?outcome, "remote branch is empty");
                workspace.reload_head()?;
            }
        }
        Ok(workspace)
    }

    /// Open a workspace around a store that is already populated, without
    /// touching any remote.
    pub fn local(store: S, branch: impl Into<String>) -> Result<Self> {
        let mut workspace = Workspace {
            store,
            branch: branch.into(),
            head: None,
            remote: Box::new(Detached),
        };
        workspace.reload_head()?;
        Ok(workspace)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn head(&self) -> Option<&Commit> {
        self.head.as_ref()
    }

    pub fn head_id(&self) -> Option<Hash> {
        self.head.as_ref().map(Commit::hash)
    }

    /// The branch has no commits.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Re-resolve the branch ref against the store.
    pub fn reload_head(&mut self) -> Result<()> {
        let target = self.store.reference(&branch_ref(&self.branch))?;
        self.head = match target {
            Some(id) if !id.is_zero() => Some(
                self.store
                    .commit(id)
                    .with_ctx(|| format!("cannot resolve head of {}", self.branch))?,
            ),
            _ => None,
        };
        Ok(())
    }

    /// Point the branch at a new head commit.
    pub fn set_head(&mut self, commit: Commit) -> Result<()> {
        self.store
            .set_reference(&branch_ref(&self.branch), commit.hash())?;
        self.head = Some(commit);
        Ok(())
    }

    /// Publish the branch head. `AlreadyUpToDate` from the remote is
    /// success.
    pub fn push(&mut self, force: bool, cancel: &Cancel) -> Result<PushOutcome> {
        let Some(head) = self.head_id() else {
            return Err(Error::StorageFailure(format!(
                "branch {} has no head to push",
                self.branch
            )));
        };
        let outcome = self
            .remote
            .push(&self.store, &self.branch, head, force, cancel)
            .ctx("failed to push branch")?;
        if outcome == PushOutcome::AlreadyUpToDate {
            info!(branch = %self.branch, "remote already up to date");
        }
        Ok(outcome)
    }

    /// Traverse from the current head down to the bounding set. Empty
    /// branches have no new commits.
    pub fn new_commits(
        &self,
        bounds: &HashSet,
        max_generation: i64,
        cancel: &Cancel,
    ) -> Result<Vec<Commit>> {
        match &self.head {
            None => Ok(Vec::new()),
            Some(head) => dfs_path(&self.store, head.clone(), bounds, max_generation, cancel),
        }
    }
}
