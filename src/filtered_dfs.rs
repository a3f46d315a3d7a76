use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::Cancel;
use crate::error::{Error, Result, ResultExt};
use crate::expand::expand_commit;
use crate::filter::FilterSet;
use crate::hash::{Hash, HashSet};
use crate::object::{Commit, ObjectStore};
use crate::patch::{check_file_patches, tree_patches, PatchCheck};
use crate::trim::filter_commit;

/// Serialized form of a [`FilteredDfs`]: the two ordered paths and the two
/// directional maps, as hex strings. This is the `stat` part of a persisted
/// sync record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingState {
    #[serde(default)]
    pub from_dfs: Vec<String>,
    #[serde(default)]
    pub to_dfs: Vec<String>,
    #[serde(default)]
    pub from_to_to: BTreeMap<String, String>,
    #[serde(default)]
    pub to_to_from: BTreeMap<String, String>,
}

impl MappingState {
    pub fn is_empty(&self) -> bool {
        self.from_dfs.is_empty()
            && self.to_dfs.is_empty()
            && self.from_to_to.is_empty()
            && self.to_to_from.is_empty()
    }

    pub fn clear(&mut self) {
        *self = MappingState::default();
    }
}

/// Ordered commit path holding ids eagerly and commit bodies lazily.
///
/// Restored paths start as bare ids; a commit is loaded from the store on
/// first access and cached.
#[derive(Debug, Default)]
struct PathArena {
    order: Vec<Hash>,
    commits: HashMap<Hash, Option<Commit>>,
}

impl PathArena {
    fn contains(&self, id: Hash) -> bool {
        self.commits.contains_key(&id)
    }

    fn push_hash(&mut self, id: Hash) {
        if id.is_zero() || self.commits.contains_key(&id) {
            return;
        }
        self.commits.insert(id, None);
        self.order.push(id);
    }

    fn push_commit(&mut self, commit: Commit) {
        let id = commit.hash();
        match self.commits.entry(id) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                if e.get().is_none() {
                    e.insert(Some(commit));
                }
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(Some(commit));
                self.order.push(id);
            }
        }
    }

    fn get<S: ObjectStore>(&mut self, store: &S, id: Hash) -> Result<Commit> {
        match self.commits.get(&id) {
            Some(Some(c)) => Ok(c.clone()),
            Some(None) => {
                let c = store
                    .commit(id)
                    .with_ctx(|| format!("cannot load path commit {id}"))?;
                self.commits.insert(id, Some(c.clone()));
                Ok(c)
            }
            None => Err(Error::MissingObject(id).context("commit is not part of the recorded path")),
        }
    }

    fn hashes(&self) -> &[Hash] {
        &self.order
    }

    fn last_hash(&self) -> Option<Hash> {
        self.order.last().copied()
    }
}

/// The stateful bidirectional mapping between a full commit graph and its
/// filtered projection.
///
/// Grows monotonically through [`append_commits`](Self::append_commits)
/// (full → filtered) and
/// [`expand_filtered_commits`](Self::expand_filtered_commits)
/// (filtered → full). The zero id on the full→filtered side marks commits
/// whose projection was empty.
#[derive(Debug)]
pub struct FilteredDfs {
    filter: FilterSet,
    from_path: PathArena,
    to_path: PathArena,
    from_to_to: HashMap<Hash, Hash>,
    to_to_from: HashMap<Hash, Hash>,
}

impl FilteredDfs {
    pub fn new(filter: FilterSet) -> Self {
        FilteredDfs {
            filter,
            from_path: PathArena::default(),
            to_path: PathArena::default(),
            from_to_to: HashMap::new(),
            to_to_from: HashMap::new(),
        }
    }

    /// Rebuild the mapping from its serialized form. Commit bodies are
    /// loaded from the stores on first use.
    pub fn restore(filter: FilterSet, state: &MappingState) -> Result<Self> {
        let mut dfs = FilteredDfs::new(filter);
        for id in &state.from_dfs {
            dfs.from_path.push_hash(Hash::from_hex(id)?);
        }
        for id in &state.to_dfs {
            dfs.to_path.push_hash(Hash::from_hex(id)?);
        }
        for (from, to) in &state.from_to_to {
            dfs.from_to_to
                .insert(Hash::from_hex(from)?, Hash::from_hex(to)?);
        }
        for (to, from) in &state.to_to_from {
            dfs.to_to_from
                .insert(Hash::from_hex(to)?, Hash::from_hex(from)?);
        }
        Ok(dfs)
    }

    pub fn dump(&self) -> MappingState {
        MappingState {
            from_dfs: self.from_path.hashes().iter().map(Hash::to_hex).collect(),
            to_dfs: self.to_path.hashes().iter().map(Hash::to_hex).collect(),
            from_to_to: self
                .from_to_to
                .iter()
                .map(|(k, v)| (k.to_hex(), v.to_hex()))
                .collect(),
            to_to_from: self
                .to_to_from
                .iter()
                .map(|(k, v)| (k.to_hex(), v.to_hex()))
                .collect(),
        }
    }

    pub fn filter(&self) -> &FilterSet {
        &self.filter
    }

    pub fn from_hashes(&self) -> &[Hash] {
        self.from_path.hashes()
    }

    pub fn to_hashes(&self) -> &[Hash] {
        self.to_path.hashes()
    }

    /// The filtered counterpart of a full commit. Zero means "projected to
    /// nothing".
    pub fn filtered_id_of(&self, full: Hash) -> Option<Hash> {
        self.from_to_to.get(&full).copied()
    }

    /// The full counterpart of a filtered commit.
    pub fn full_id_of(&self, filtered: Hash) -> Option<Hash> {
        self.to_to_from.get(&filtered).copied()
    }

    /// Project more full-side commits, in traversal order (parents before
    /// children), and return the newly produced filtered commits.
    ///
    /// Commits already mapped are skipped. A commit whose projection is
    /// empty maps to the zero id; a commit whose projection equals one of
    /// its parents' collapses onto that parent and produces nothing new.
    pub fn append_commits<FS, TS>(
        &mut self,
        from_store: &FS,
        to_store: &TS,
        commits: &[Commit],
        cancel: &Cancel,
    ) -> Result<Vec<Commit>>
    where
        FS: ObjectStore,
        TS: ObjectStore,
    {
        if self.filter.is_empty() {
            return Err(Error::NoFilter);
        }

        let total = commits.len();
        let mut produced = Vec::new();

        for (index, commit) in commits.iter().enumerate() {
            cancel.checkpoint()?;

            let commit_id = commit.hash();
            if self.from_path.contains(commit_id) || self.from_to_to.contains_key(&commit_id) {
                continue;
            }
            self.from_path.push_commit(commit.clone());

            // Parent candidates keep their order, drop unmapped and
            // filtered-away ancestors, and keep only first occurrences.
            let mut parents = Vec::with_capacity(commit.parents.len());
            let mut seen = HashSet::default();
            for parent_id in &commit.parents {
                let Some(&mapped) = self.from_to_to.get(parent_id) else {
                    warn!(parent = %parent_id, "parent has no filtered counterpart yet");
                    continue;
                };
                if mapped.is_zero() || !seen.insert(mapped) {
                    continue;
                }
                let parent = self
                    .to_path
                    .get(to_store, mapped)
                    .with_ctx(|| format!("cannot obtain filtered parent {mapped}"))?;
                parents.push(parent);
            }

            let (filtered, reused_parent) =
                filter_commit(from_store, to_store, commit, &parents, &self.filter)
                    .with_ctx(|| format!("cannot filter commit {index} of {total} ({commit_id})"))?;

            match filtered {
                None => {
                    debug!(index, total, commit = %commit_id, "projection is empty");
                    self.from_to_to.insert(commit_id, Hash::ZERO);
                }
                Some(projected) => {
                    let projected_id = projected.hash();
                    self.from_to_to.insert(commit_id, projected_id);
                    if reused_parent {
                        debug!(index, total, commit = %commit_id, parent = %projected_id, "reusing parent commit");
                    } else {
                        debug!(index, total, commit = %commit_id, filtered = %projected_id, "projected commit");
                        self.to_to_from.insert(projected_id, commit_id);
                        self.to_path.push_commit(projected.clone());
                        produced.push(projected);
                    }
                }
            }
        }

        Ok(produced)
    }

    /// Lift filtered-side commits back onto the full side, in order
    /// (parents before children), and return the newly produced full
    /// commits.
    ///
    /// Every commit must have at least one parent, and every parent must
    /// already be mapped (filtered repos always descend from a full repo).
    pub fn expand_filtered_commits<FS, TS>(
        &mut self,
        from_store: &FS,
        to_store: &TS,
        commits: &[Commit],
        cancel: &Cancel,
    ) -> Result<Vec<Commit>>
    where
        FS: ObjectStore,
        TS: ObjectStore,
    {
        let total = commits.len();
        let mut produced = Vec::new();

        for (index, commit) in commits.iter().enumerate() {
            cancel.checkpoint()?;

            let commit_id = commit.hash();
            if self.to_path.contains(commit_id) || self.to_to_from.contains_key(&commit_id) {
                continue;
            }
            if commit.parents.is_empty() {
                return Err(Error::NoParents(commit_id));
            }
            self.to_path.push_commit(commit.clone());

            let mut parents = Vec::with_capacity(commit.parents.len());
            for parent_id in &commit.parents {
                let Some(&full_id) = self.to_to_from.get(parent_id) else {
                    return Err(Error::MissingObject(*parent_id)
                        .context("parent commit has no counterpart in the full path"));
                };
                let parent = self
                    .from_path
                    .get(from_store, full_id)
                    .with_ctx(|| format!("cannot obtain full parent {full_id}"))?;
                parents.push(parent);
            }

            let baseline_filtered = self
                .to_path
                .get(to_store, commit.parents[0])
                .with_ctx(|| format!("cannot obtain filtered parent {}", commit.parents[0]))?;

            let lifted = expand_commit(
                to_store,
                from_store,
                &baseline_filtered,
                commit,
                &parents,
                &self.filter,
            )
            .with_ctx(|| format!("cannot expand commit {commit_id}"))?;

            let lifted_id = lifted.hash();
            info!(index, total, commit = %commit_id, expanded = %lifted_id, "expanded filtered commit");

            self.from_path.push_commit(lifted.clone());
            self.to_to_from.insert(commit_id, lifted_id);
            self.from_to_to.insert(lifted_id, commit_id);
            produced.push(lifted);
        }

        Ok(produced)
    }

    /// Gate candidate filtered-side commits: diff each against its first
    /// parent and verify every file patch stays inside the filter.
    pub fn check_commits<TS>(
        &self,
        to_store: &TS,
        commits: &[Commit],
        cancel: &Cancel,
    ) -> Result<Vec<PatchCheck>>
    where
        TS: ObjectStore,
    {
        let mut checks = Vec::with_capacity(commits.len());

        for commit in commits {
            cancel.checkpoint()?;

            let commit_id = commit.hash();
            if self.to_path.contains(commit_id) {
                continue;
            }
            if commit.parents.is_empty() {
                return Err(Error::NoParents(commit_id));
            }

            let parent = to_store
                .commit(commit.parents[0])
                .with_ctx(|| format!("cannot obtain parent of {commit_id}"))?;
            let parent_tree = to_store
                .tree(parent.tree)
                .with_ctx(|| format!("cannot obtain tree of {}", parent.hash()))?;
            let tree = to_store
                .tree(commit.tree)
                .with_ctx(|| format!("cannot obtain tree of {commit_id}"))?;

            let patches = tree_patches(to_store, Some(&parent_tree), Some(&tree))?;
            checks.push(check_file_patches(&patches, &self.filter));
        }

        Ok(checks)
    }

    /// The current head pair `(full, filtered)`.
    pub fn last_commits<FS, TS>(&mut self, from_store: &FS, to_store: &TS) -> Result<(Commit, Commit)>
    where
        FS: ObjectStore,
        TS: ObjectStore,
    {
        let Some(from_head) = self.from_path.last_hash() else {
            return Err(Error::EmptyFromRepo);
        };
        let Some(to_head) = self.to_path.last_hash() else {
            return Err(Error::FilteredRepoEmpty);
        };
        let from = self.from_path.get(from_store, from_head)?;
        let to = self.to_path.get(to_store, to_head)?;
        Ok((from, to))
    }
}
