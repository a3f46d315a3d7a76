use crate::cancel::Cancel;
use crate::error::{Result, ResultExt};
use crate::hash::{Hash, HashSet};
use crate::object::{Commit, ObjectStore};

struct Node {
    commit: Commit,
    hash: Hash,
    next_visit: usize,
    generation: i64,
}

/// Deterministic post-order traversal of the commit graph starting at
/// `head`.
///
/// Parents are visited in their declared order, so the first commits
/// returned form the first-parent history; the head commit comes last and
/// one of the roots first. Descent stops at (but still includes) any commit
/// whose id is in `roots` or whose distance from the head reaches
/// `max_generation - 1`. A `max_generation` of zero or less means
/// unbounded. Already-visited commits are skipped.
pub fn dfs_path<S: ObjectStore>(
    store: &S,
    head: Commit,
    roots: &HashSet,
    max_generation: i64,
    cancel: &Cancel,
) -> Result<Vec<Commit>> {
    let unbounded = max_generation <= 0;
    let mut seen = HashSet::default();
    let mut stack = Vec::new();
    let mut result = Vec::new();

    let head_hash = head.hash();
    seen.insert(head_hash);
    stack.push(Node {
        commit: head,
        hash: head_hash,
        next_visit: 0,
        generation: 0,
    });

    loop {
        cancel.checkpoint()?;

        let Some(top) = stack.last_mut() else {
            break;
        };

        let exhausted = top.next_visit == top.commit.parents.len();
        let at_root = roots.contains(&top.hash);
        let at_depth = !unbounded && top.generation >= max_generation - 1;
        if exhausted || at_root || at_depth {
            let node = stack.pop().expect("stack is non-empty");
            result.push(node.commit);
            continue;
        }

        let parent_hash = top.commit.parents[top.next_visit];
        top.next_visit += 1;
        let generation = top.generation + 1;
        if seen.insert(parent_hash) {
            let commit = store
                .commit(parent_hash)
                .with_ctx(|| format!("cannot get parent {parent_hash}"))?;
            stack.push(Node {
                commit,
                hash: parent_hash,
                next_visit: 0,
                generation,
            });
        }
    }

    Ok(result)
}

/// The commits of `commits` that have no parent inside the set.
pub fn roots_of(commits: &[Commit]) -> Vec<Hash> {
    let hashed: Vec<(Hash, &Commit)> = commits.iter().map(|c| (c.hash(), c)).collect();
    let all: HashSet = hashed.iter().map(|(h, _)| *h).collect();

    hashed
        .iter()
        .filter(|(_, c)| !c.parents.iter().any(|p| all.contains(p)))
        .map(|(h, _)| *h)
        .collect()
}
