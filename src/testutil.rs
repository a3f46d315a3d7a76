//! Shared fixtures for building synthetic histories in tests.

use std::collections::BTreeMap;

use crate::hash::Hash;
use crate::object::{Commit, EntryMode, Ident, MemoryStore, ObjectStore, Tree, TreeEntry};

/// A fake blob id derived from a seed byte.
pub(crate) fn blob(seed: u8) -> Hash {
    Hash::from_bytes([seed; 20])
}

/// Build (and store) a nested tree from `(path, content-seed)` pairs.
pub(crate) fn tree_from_files(store: &MemoryStore, files: &[(&str, u8)]) -> Tree {
    fn build(store: &MemoryStore, files: &[(Vec<&str>, u8)]) -> Tree {
        let mut leaves = Vec::new();
        let mut dirs: BTreeMap<&str, Vec<(Vec<&str>, u8)>> = BTreeMap::new();
        for (segs, seed) in files {
            match segs.as_slice() {
                [name] => leaves.push(TreeEntry::new(*name, EntryMode::Regular, blob(*seed))),
                [dir, rest @ ..] => dirs
                    .entry(*dir)
                    .or_default()
                    .push((rest.to_vec(), *seed)),
                [] => {}
            }
        }
        for (name, children) in dirs {
            let sub = build(store, &children);
            let id = store.store_tree(&sub).unwrap();
            leaves.push(TreeEntry::new(name, EntryMode::Subtree, id));
        }
        Tree::new(leaves)
    }

    let split: Vec<(Vec<&str>, u8)> = files
        .iter()
        .map(|(p, s)| (p.split('/').collect(), *s))
        .collect();
    let tree = build(store, &split);
    store.store_tree(&tree).unwrap();
    tree
}

/// Build (and store) a commit on top of the given parents.
pub(crate) fn commit(store: &MemoryStore, tree: &Tree, parents: &[&Commit], message: &str, ts: i64) -> Commit {
    let c = Commit {
        tree: tree.hash(),
        author: Ident::new("Test Author", "author@example.com", ts),
        committer: Ident::new("Test Committer", "committer@example.com", ts),
        message: message.to_string(),
        parents: parents.iter().map(|p| p.hash()).collect(),
        signature: None,
    };
    store.store_commit(&c).unwrap();
    c
}
