use std::collections::HashMap;

use tracing::debug;

use crate::cancel::Cancel;
use crate::error::{Result, ResultExt};
use crate::hash::{Hash, HashSet};
use crate::object::{Commit, ObjectStore};

/// Rewrite a traversal-ordered commit chain without signatures.
///
/// Trees, authors, committers and messages are preserved; parents are
/// re-linked through the old→new mapping (parents outside the input chain
/// are dropped, duplicates collapse) and the rewritten commits are stored.
pub fn strip_signatures<S: ObjectStore>(
    store: &S,
    dfs_path: &[Commit],
    cancel: &Cancel,
) -> Result<Vec<Commit>> {
    let total = dfs_path.len();
    let mut rewritten: HashMap<Hash, Hash> = HashMap::new();
    let mut out = Vec::with_capacity(total);

    for (index, commit) in dfs_path.iter().enumerate() {
        cancel.checkpoint()?;

        let mut parents = Vec::with_capacity(commit.parents.len());
        let mut seen = HashSet::default();
        for parent in &commit.parents {
            let Some(&new_parent) = rewritten.get(parent) else {
                continue;
            };
            if seen.insert(new_parent) {
                parents.push(new_parent);
            }
        }

        let stripped = Commit {
            tree: commit.tree,
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            message: commit.message.clone(),
            parents,
            signature: None,
        };
        let new_id = store
            .store_commit(&stripped)
            .ctx("failed to save rewritten commit")?;
        debug!(index, total, commit = %commit.hash(), rewritten = %new_id, "stripped signature");

        rewritten.insert(commit.hash(), new_id);
        out.push(stripped);
    }

    Ok(out)
}
