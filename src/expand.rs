use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{Error, Result, ResultExt};
use crate::filter::{FilterSet, Match};
use crate::hash::Hash;
use crate::object::{Commit, ObjectStore, Tree, TreeEntry};

/// Re-apply the change `orig -> new` (both filtered trees) onto the full
/// baseline tree `base`, restricted to the filter.
///
/// Entries of `base` outside the filter are carried unchanged; entries the
/// two filtered trees agree on are carried unchanged; additions and
/// modifications take the filtered side's blob; deletions remove the entry
/// when the filter covers it. Every rebuilt tree is written to the full
/// side's store. Returns `None` when nothing is left.
pub fn expand_tree<TS, FS>(
    to_store: &TS,
    from_store: &FS,
    orig: Option<&Tree>,
    new: Option<&Tree>,
    base: Option<&Tree>,
    filter: &FilterSet,
) -> Result<Option<Tree>>
where
    TS: ObjectStore,
    FS: ObjectStore,
{
    let mut prefix = Vec::new();
    expand_tree_at(to_store, from_store, orig, new, base, &mut prefix, filter)
}

fn entry_names<'a>(trees: [Option<&'a Tree>; 3]) -> BTreeSet<&'a str> {
    let mut names = BTreeSet::new();
    for tree in trees.into_iter().flatten() {
        for e in tree.entries() {
            names.insert(e.name.as_str());
        }
    }
    names
}

fn entries_agree(a: Option<&TreeEntry>, b: Option<&TreeEntry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.child == y.child && x.mode == y.mode,
        _ => false,
    }
}

fn subtree_of<S: ObjectStore>(store: &S, entry: Option<&TreeEntry>) -> Result<Option<Tree>> {
    match entry {
        Some(e) if e.mode.is_subtree() => {
            let t = store
                .tree(e.child)
                .with_ctx(|| format!("cannot get subtree {}", e.child))?;
            Ok(Some(t))
        }
        _ => Ok(None),
    }
}

fn expand_tree_at<TS, FS>(
    to_store: &TS,
    from_store: &FS,
    orig: Option<&Tree>,
    new: Option<&Tree>,
    base: Option<&Tree>,
    prefix: &mut Vec<String>,
    filter: &FilterSet,
) -> Result<Option<Tree>>
where
    TS: ObjectStore,
    FS: ObjectStore,
{
    let mut entries: Vec<TreeEntry> = Vec::new();

    for name in entry_names([orig, new, base]) {
        let orig_entry = orig.and_then(|t| t.entry(name));
        let new_entry = new.and_then(|t| t.entry(name));
        let base_entry = base.and_then(|t| t.entry(name));

        prefix.push(name.to_string());
        let covered = filter.matches(prefix, true) != Match::Out;

        if !covered || entries_agree(orig_entry, new_entry) {
            // Outside the filter, or untouched by the filtered change:
            // whatever the baseline has stands.
            if let Some(e) = base_entry {
                entries.push(e.clone());
            }
            prefix.pop();
            continue;
        }

        let any_subtree = [orig_entry, new_entry, base_entry]
            .iter()
            .any(|e| e.is_some_and(|e| e.mode.is_subtree()));

        if any_subtree {
            let orig_sub = subtree_of(to_store, orig_entry)?;
            let new_sub = subtree_of(to_store, new_entry)?;
            let base_sub = subtree_of(from_store, base_entry)?;
            let rebuilt = expand_tree_at(
                to_store,
                from_store,
                orig_sub.as_ref(),
                new_sub.as_ref(),
                base_sub.as_ref(),
                prefix,
                filter,
            )?;
            if let Some(sub) = rebuilt {
                entries.push(TreeEntry::new(
                    name,
                    crate::object::EntryMode::Subtree,
                    sub.hash(),
                ));
            }
        } else {
            match new_entry {
                Some(e) => {
                    // Added or modified on the filtered side.
                    entries.push(e.clone());
                }
                None => {
                    let deleted = orig_entry.is_some()
                        && filter.matches(prefix, false) == Match::In;
                    if !deleted {
                        if let Some(e) = base_entry {
                            entries.push(e.clone());
                        }
                    }
                }
            }
        }
        prefix.pop();
    }

    if entries.is_empty() {
        return Ok(None);
    }

    let rebuilt = Tree::new(entries);
    from_store
        .store_tree(&rebuilt)
        .ctx("failed to save expanded tree")?;
    Ok(Some(rebuilt))
}

/// Lift one filtered commit back onto the full repository.
///
/// `parents` are the full-side parents; the first one is the baseline whose
/// tree receives the filtered diff `filtered_orig -> filtered_new`. Author,
/// committer and message come from the filtered commit; any signature is
/// dropped. An empty expansion is logged and produces a commit with no
/// tree rather than an error.
pub fn expand_commit<TS, FS>(
    to_store: &TS,
    from_store: &FS,
    filtered_orig: &Commit,
    filtered_new: &Commit,
    parents: &[Commit],
    filter: &FilterSet,
) -> Result<Commit>
where
    TS: ObjectStore,
    FS: ObjectStore,
{
    if parents.is_empty() {
        return Err(Error::NoParents(filtered_new.hash()));
    }
    let base = &parents[0];

    let orig_tree = to_store
        .tree(filtered_orig.tree)
        .with_ctx(|| format!("cannot get tree of filtered commit {}", filtered_orig.hash()))?;
    let new_tree = to_store
        .tree(filtered_new.tree)
        .with_ctx(|| format!("cannot get tree of filtered commit {}", filtered_new.hash()))?;
    let base_tree = from_store
        .tree(base.tree)
        .with_ctx(|| format!("cannot get tree of baseline commit {}", base.hash()))?;

    let expanded = expand_tree(
        to_store,
        from_store,
        Some(&orig_tree),
        Some(&new_tree),
        Some(&base_tree),
        filter,
    )?;

    let tree_id = match &expanded {
        Some(t) => t.hash(),
        None => {
            warn!(
                filtered_new = %filtered_new.hash(),
                filtered_orig = %filtered_orig.hash(),
                baseline = %base.hash(),
                "expansion produced an empty tree"
            );
            Hash::ZERO
        }
    };

    let lifted = Commit {
        tree: tree_id,
        author: filtered_new.author.clone(),
        committer: filtered_new.committer.clone(),
        message: filtered_new.message.clone(),
        parents: parents.iter().map(|p| p.hash()).collect(),
        signature: None,
    };
    from_store
        .store_commit(&lifted)
        .ctx("failed to save expanded commit")?;
    Ok(lifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Ident, MemoryStore};
    use crate::testutil::{commit, tree_from_files};
    use crate::trim::filter_tree;

    fn filter(patterns: &[&str]) -> FilterSet {
        FilterSet::from_patterns(patterns).unwrap()
    }

    /// Baseline full tree plus its projection under `src/**/*.go`.
    fn fixture(full: &MemoryStore, filtered: &MemoryStore) -> (Tree, Tree) {
        let base = tree_from_files(
            full,
            &[("README.md", 1), ("src/a.go", 2), ("vendor/x.go", 3)],
        );
        let f = filter(&["src/**/*.go"]);
        let projected = filter_tree(full, filtered, &base, &f).unwrap().unwrap();
        (base, projected)
    }

    fn names(tree: &Tree) -> Vec<&str> {
        tree.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn addition_lands_next_to_untouched_entries() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let (base, orig) = fixture(&full, &filtered);
        let new = tree_from_files(&filtered, &[("src/a.go", 2), ("src/b.go", 4)]);

        let f = filter(&["src/**/*.go"]);
        let out = expand_tree(&filtered, &full, Some(&orig), Some(&new), Some(&base), &f)
            .unwrap()
            .unwrap();
        assert_eq!(names(&out), vec!["README.md", "src", "vendor"]);
        let src = full.tree(out.entry("src").unwrap().child).unwrap();
        assert_eq!(names(&src), vec!["a.go", "b.go"]);
        let vendor = out.entry("vendor").unwrap();
        assert_eq!(vendor.child, base.entry("vendor").unwrap().child);
    }

    #[test]
    fn modification_takes_the_filtered_blob() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let (base, orig) = fixture(&full, &filtered);
        let new = tree_from_files(&filtered, &[("src/a.go", 9)]);

        let f = filter(&["src/**/*.go"]);
        let out = expand_tree(&filtered, &full, Some(&orig), Some(&new), Some(&base), &f)
            .unwrap()
            .unwrap();
        let src = full.tree(out.entry("src").unwrap().child).unwrap();
        assert_eq!(src.entry("a.go").unwrap().child, new.entry("src").map(|e| {
            let t = filtered.tree(e.child).unwrap();
            t.entry("a.go").unwrap().child
        }).unwrap());
    }

    #[test]
    fn deletion_inside_filter_is_applied() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let base = tree_from_files(
            &full,
            &[("README.md", 1), ("src/a.go", 2), ("src/b.go", 4), ("vendor/x.go", 3)],
        );
        let f = filter(&["src/**/*.go"]);
        let orig = filter_tree(&full, &filtered, &base, &f).unwrap().unwrap();
        let new = tree_from_files(&filtered, &[("src/b.go", 4)]);

        let out = expand_tree(&filtered, &full, Some(&orig), Some(&new), Some(&base), &f)
            .unwrap()
            .unwrap();
        let src = full.tree(out.entry("src").unwrap().child).unwrap();
        assert_eq!(names(&src), vec!["b.go"]);
        assert!(out.entry("vendor").is_some());
        assert!(out.entry("README.md").is_some());
    }

    #[test]
    fn identical_filtered_trees_reproduce_the_baseline() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let (base, orig) = fixture(&full, &filtered);
        let f = filter(&["src/**/*.go"]);
        let out = expand_tree(&filtered, &full, Some(&orig), Some(&orig), Some(&base), &f)
            .unwrap()
            .unwrap();
        assert_eq!(out.hash(), base.hash());
    }

    #[test]
    fn expand_commit_matches_scenario() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let (base, orig) = fixture(&full, &filtered);
        let f = filter(&["src/**/*.go"]);

        let base_commit = commit(&full, &base, &[], "baseline", 1);
        let orig_commit = commit(&filtered, &orig, &[], "projected", 1);

        let new_tree = tree_from_files(&filtered, &[("src/a.go", 2), ("src/b.go", 4)]);
        let mut new_commit = commit(&filtered, &new_tree, &[&orig_commit], "add b.go", 7);
        new_commit.author = Ident::new("Contributor", "c@example.com", 7);
        filtered.store_commit(&new_commit).unwrap();

        let lifted = expand_commit(
            &filtered,
            &full,
            &orig_commit,
            &new_commit,
            std::slice::from_ref(&base_commit),
            &f,
        )
        .unwrap();

        let tree = full.tree(lifted.tree).unwrap();
        assert_eq!(names(&tree), vec!["README.md", "src", "vendor"]);
        let src = full.tree(tree.entry("src").unwrap().child).unwrap();
        assert_eq!(names(&src), vec!["a.go", "b.go"]);
        assert_eq!(lifted.author, new_commit.author);
        assert_eq!(lifted.committer, new_commit.committer);
        assert_eq!(lifted.message, new_commit.message);
        assert!(lifted.signature.is_none());
        assert_eq!(lifted.parents, vec![base_commit.hash()]);
    }

    #[test]
    fn expand_commit_requires_parents() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let (base, orig) = fixture(&full, &filtered);
        let _ = base;
        let orig_commit = commit(&filtered, &orig, &[], "projected", 1);
        let err = expand_commit(
            &filtered,
            &full,
            &orig_commit,
            &orig_commit,
            &[],
            &filter(&["src/**/*.go"]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoParents(_)));
    }

    #[test]
    fn empty_expansion_yields_commit_without_tree() {
        let full = MemoryStore::new();
        let filtered = MemoryStore::new();
        let f = filter(&["src/**/*.go"]);

        let base = tree_from_files(&full, &[("src/a.go", 2)]);
        let base_commit = commit(&full, &base, &[], "only src", 1);
        let orig = filter_tree(&full, &filtered, &base, &f).unwrap().unwrap();
        let orig_commit = commit(&filtered, &orig, &[], "projected", 1);

        // The filtered side deletes the only file.
        let gone = Tree::default();
        filtered.store_tree(&gone).unwrap();
        let gone_commit = commit(&filtered, &gone, &[&orig_commit], "remove all", 2);

        let lifted = expand_commit(
            &filtered,
            &full,
            &orig_commit,
            &gone_commit,
            std::slice::from_ref(&base_commit),
            &f,
        )
        .unwrap();
        assert!(lifted.tree.is_zero());
    }
}
