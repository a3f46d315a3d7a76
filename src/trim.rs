use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::filter::{FilterSet, Match};
use crate::object::{Commit, EntryMode, ObjectStore, Tree, TreeEntry};

/// Project a tree through the filter, writing every surviving tree into the
/// target store.
///
/// Returns `None` when nothing survives; the empty tree is never stored.
/// Submodule entries are dropped unconditionally. When the projection leaves
/// a subtree untouched the original entry is reused, so unchanged regions
/// keep their ids.
pub fn filter_tree<FS, TS>(
    from: &FS,
    to: &TS,
    tree: &Tree,
    filter: &FilterSet,
) -> Result<Option<Tree>>
where
    FS: ObjectStore,
    TS: ObjectStore,
{
    let mut prefix = Vec::new();
    filter_tree_at(from, to, tree, &mut prefix, filter, false)
}

fn filter_tree_at<FS, TS>(
    from: &FS,
    to: &TS,
    tree: &Tree,
    prefix: &mut Vec<String>,
    filter: &FilterSet,
    ancestor_in: bool,
) -> Result<Option<Tree>>
where
    FS: ObjectStore,
    TS: ObjectStore,
{
    let mut entries: Vec<TreeEntry> = Vec::with_capacity(tree.entries().len());

    for entry in tree.entries() {
        if matches!(entry.mode, EntryMode::Submodule) {
            continue;
        }

        prefix.push(entry.name.clone());
        if entry.mode.is_subtree() {
            let decision = if ancestor_in {
                Match::In
            } else {
                filter.matches(prefix, true)
            };
            let kept = match decision {
                Match::Out => None,
                Match::DirDive | Match::In => {
                    let subtree = from
                        .tree(entry.child)
                        .with_ctx(|| format!("cannot get subtree {}", entry.child))?;
                    filter_tree_at(from, to, &subtree, prefix, filter, decision == Match::In)?
                }
            };
            if let Some(new_subtree) = kept {
                let new_id = new_subtree.hash();
                if new_id == entry.child {
                    entries.push(entry.clone());
                } else {
                    entries.push(TreeEntry::new(
                        entry.name.clone(),
                        entry.mode,
                        new_id,
                    ));
                }
            }
        } else {
            // Files under an already-included directory need no lookup.
            if ancestor_in || filter.matches(prefix, false) == Match::In {
                entries.push(entry.clone());
            }
        }
        prefix.pop();
    }

    if entries.is_empty() {
        return Ok(None);
    }

    let filtered = Tree::new(entries);
    to.store_tree(&filtered)
        .ctx("failed to save filtered tree")?;
    Ok(Some(filtered))
}

/// Rewrite one commit under the filter.
///
/// The candidate `parents` must already be deduplicated, first occurrence
/// winning. Returns `(None, false)` when the filtered tree is empty. When
/// the filtered tree equals a candidate parent's tree the parent itself is
/// returned with the flag set: the commit projects to a no-op and must not
/// become a new node. Otherwise the new commit keeps the author, committer
/// and message, links the surviving parents, drops any signature, and is
/// written to the target store.
pub fn filter_commit<FS, TS>(
    from: &FS,
    to: &TS,
    commit: &Commit,
    parents: &[Commit],
    filter: &FilterSet,
) -> Result<(Option<Commit>, bool)>
where
    FS: ObjectStore,
    TS: ObjectStore,
{
    let tree = from
        .tree(commit.tree)
        .with_ctx(|| format!("cannot get tree for commit {}", commit.hash()))?;

    let Some(filtered_tree) = filter_tree(from, to, &tree, filter)? else {
        return Ok((None, false));
    };
    let filtered_tree_id = filtered_tree.hash();

    let mut parent_ids = Vec::with_capacity(parents.len());
    for parent in parents {
        if parent.tree == filtered_tree_id {
            debug!(commit = %commit.hash(), parent = %parent.hash(), "projection equals parent, reusing");
            return Ok((Some(parent.clone()), true));
        }
        parent_ids.push(parent.hash());
    }

    let filtered = Commit {
        tree: filtered_tree_id,
        author: commit.author.clone(),
        committer: commit.committer.clone(),
        message: commit.message.clone(),
        parents: parent_ids,
        signature: None,
    };
    to.store_commit(&filtered)
        .ctx("failed to save filtered commit")?;
    Ok((Some(filtered), false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::object::{EntryMode, MemoryStore};
    use crate::testutil::{blob, commit, tree_from_files};

    fn filter(patterns: &[&str]) -> FilterSet {
        FilterSet::from_patterns(patterns).unwrap()
    }

    #[test]
    fn projects_to_included_entries_only() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(
            &store,
            &[("README.md", 1), ("src/a.go", 2), ("vendor/x.go", 3)],
        );
        let filtered = filter_tree(&store, &out, &tree, &filter(&["src/**/*.go"]))
            .unwrap()
            .unwrap();
        assert_eq!(filtered.entries().len(), 1);
        let src = filtered.entry("src").unwrap();
        assert!(src.mode.is_subtree());
        let src_tree = out.tree(src.child).unwrap();
        assert_eq!(src_tree.entries().len(), 1);
        assert_eq!(src_tree.entries()[0].name, "a.go");
    }

    #[test]
    fn projection_is_independent_of_construction_order() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let t1 = tree_from_files(
            &store,
            &[("README.md", 1), ("src/a.go", 2), ("vendor/x.go", 3)],
        );
        let t2 = tree_from_files(
            &store,
            &[("vendor/x.go", 3), ("src/a.go", 2), ("README.md", 1)],
        );
        let f = filter(&["src/**/*.go"]);
        let r1 = filter_tree(&store, &out, &t1, &f).unwrap().unwrap();
        let r2 = filter_tree(&store, &out, &t2, &f).unwrap().unwrap();
        assert_eq!(r1.hash(), r2.hash());
        assert_eq!(r1.serialize(), r2.serialize());
    }

    #[test]
    fn empty_projection_is_none() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(&store, &[("vendor/x.go", 3)]);
        assert!(filter_tree(&store, &out, &tree, &filter(&["src/**/*.go"]))
            .unwrap()
            .is_none());
        assert_eq!(out.tree_count(), 0);
    }

    #[test]
    fn filtering_is_idempotent() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(
            &store,
            &[("README.md", 1), ("src/a.go", 2), ("src/sub/b.go", 4), ("vendor/x.go", 3)],
        );
        let f = filter(&["src/**/*.go", "README.md"]);
        let once = filter_tree(&store, &out, &tree, &f).unwrap().unwrap();
        let twice = filter_tree(&out, &out, &once, &f).unwrap().unwrap();
        assert_eq!(once.hash(), twice.hash());
    }

    #[test]
    fn fully_included_tree_keeps_its_id() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(&store, &[("src/a.go", 2), ("src/sub/b.go", 4)]);
        let kept = filter_tree(&store, &out, &tree, &filter(&["src"]))
            .unwrap()
            .unwrap();
        assert_eq!(kept.hash(), tree.hash());
    }

    #[test]
    fn submodules_are_dropped_even_under_included_ancestor() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let inner = Tree::new(vec![
            TreeEntry::new("a.go", EntryMode::Regular, blob(1)),
            TreeEntry::new("dep", EntryMode::Submodule, blob(9)),
        ]);
        store.store_tree(&inner).unwrap();
        let root = Tree::new(vec![TreeEntry::new(
            "src",
            EntryMode::Subtree,
            inner.hash(),
        )]);
        store.store_tree(&root).unwrap();

        let filtered = filter_tree(&store, &out, &root, &filter(&["src"]))
            .unwrap()
            .unwrap();
        let src = out.tree(filtered.entry("src").unwrap().child).unwrap();
        assert!(src.entry("a.go").is_some());
        assert!(src.entry("dep").is_none());
    }

    #[test]
    fn executable_and_symlink_entries_survive() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = Tree::new(vec![
            TreeEntry::new("run.sh", EntryMode::Executable, blob(1)),
            TreeEntry::new("link", EntryMode::Symlink, blob(2)),
        ]);
        store.store_tree(&tree).unwrap();
        let filtered = filter_tree(&store, &out, &tree, &filter(&["run.sh", "link"]))
            .unwrap()
            .unwrap();
        assert_eq!(filtered.hash(), tree.hash());
    }

    #[test]
    fn commit_tree_matches_tree_projection() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(&store, &[("README.md", 1), ("src/a.go", 2)]);
        let c = commit(&store, &tree, &[], "initial", 1);
        let f = filter(&["src/**/*.go"]);
        let (projected, reused) = filter_commit(&store, &out, &c, &[], &f).unwrap();
        let projected = projected.unwrap();
        assert!(!reused);
        let direct = filter_tree(&store, &out, &tree, &f).unwrap().unwrap();
        assert_eq!(projected.tree, direct.hash());
        assert!(projected.signature.is_none());
        assert_eq!(projected.author, c.author);
        assert_eq!(projected.message, c.message);
    }

    #[test]
    fn no_op_commit_collapses_onto_parent() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let f = filter(&["src/**/*.go"]);

        let base = tree_from_files(&store, &[("src/a.go", 2), ("vendor/x.go", 3)]);
        let c0 = commit(&store, &base, &[], "base", 1);
        let (p0, _) = filter_commit(&store, &out, &c0, &[], &f).unwrap();
        let p0 = p0.unwrap();

        // Only vendor/x.go changes: the projection is identical.
        let changed = tree_from_files(&store, &[("src/a.go", 2), ("vendor/x.go", 9)]);
        let c1 = commit(&store, &changed, &[&c0], "vendor only", 2);
        let (p1, reused) =
            filter_commit(&store, &out, &c1, std::slice::from_ref(&p0), &f).unwrap();
        assert!(reused);
        assert_eq!(p1.unwrap().hash(), p0.hash());
    }

    #[test]
    fn empty_projection_of_commit_is_none() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(&store, &[("vendor/x.go", 3)]);
        let c = commit(&store, &tree, &[], "outside", 1);
        let (none, reused) =
            filter_commit(&store, &out, &c, &[], &filter(&["src/**/*.go"])).unwrap();
        assert!(none.is_none());
        assert!(!reused);
    }

    #[test]
    fn signature_is_dropped_from_rewritten_commit() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(&store, &[("src/a.go", 2)]);
        let mut c = commit(&store, &tree, &[], "signed", 1);
        c.signature = Some("-----BEGIN PGP SIGNATURE-----\nxyz\n-----END PGP SIGNATURE-----\n".into());
        store.store_commit(&c).unwrap();
        let (projected, _) =
            filter_commit(&store, &out, &c, &[], &filter(&["src"])).unwrap();
        assert!(projected.unwrap().signature.is_none());
    }

    #[test]
    fn unchanged_subtree_entry_is_reused_not_rebuilt() {
        let store = MemoryStore::new();
        let out = MemoryStore::new();
        let tree = tree_from_files(&store, &[("src/a.go", 2), ("README.md", 1)]);
        let src_id: Hash = tree.entry("src").unwrap().child;
        let filtered = filter_tree(&store, &out, &tree, &filter(&["src"]))
            .unwrap()
            .unwrap();
        assert_eq!(filtered.entry("src").unwrap().child, src_id);
    }
}
