use std::collections::BTreeSet;

use crate::error::{Result, ResultExt};
use crate::filter::{split_path, FilterSet, Match};
use crate::object::{ObjectStore, Tree, TreeEntry};

/// One file-level change between two trees: `(from, to)` paths, either side
/// absent for additions and deletions. Renames are not detected; a moved
/// file shows up as a delete plus an add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// The file patches turning `old` into `new`.
///
/// Subtrees are walked recursively; submodule entries are invisible to the
/// diff, matching the projection operations.
pub fn tree_patches<S: ObjectStore>(
    store: &S,
    old: Option<&Tree>,
    new: Option<&Tree>,
) -> Result<Vec<FilePatch>> {
    let mut out = Vec::new();
    let mut prefix = String::new();
    diff_at(store, old, new, &mut prefix, &mut out)?;
    Ok(out)
}

fn visible<'a>(tree: Option<&'a Tree>, name: &str) -> Option<&'a TreeEntry> {
    tree.and_then(|t| t.entry(name))
        .filter(|e| !matches!(e.mode, crate::object::EntryMode::Submodule))
}

fn joined(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
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

fn diff_at<S: ObjectStore>(
    store: &S,
    old: Option<&Tree>,
    new: Option<&Tree>,
    prefix: &mut String,
    out: &mut Vec<FilePatch>,
) -> Result<()> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for tree in [old, new].into_iter().flatten() {
        for e in tree.entries() {
            names.insert(e.name.as_str());
        }
    }

    for name in names {
        let oe = visible(old, name);
        let ne = visible(new, name);
        if let (Some(a), Some(b)) = (oe, ne) {
            if a.child == b.child && a.mode == b.mode {
                continue;
            }
        }
        if oe.is_none() && ne.is_none() {
            continue;
        }

        let path = joined(prefix, name);
        let any_subtree = oe.is_some_and(|e| e.mode.is_subtree())
            || ne.is_some_and(|e| e.mode.is_subtree());

        if any_subtree {
            // A blob replaced by (or replacing) a directory contributes its
            // own add or delete next to the recursive diff.
            if oe.is_some_and(|e| e.mode.is_blob()) {
                out.push(FilePatch {
                    from: Some(path.clone()),
                    to: None,
                });
            }
            if ne.is_some_and(|e| e.mode.is_blob()) {
                out.push(FilePatch {
                    from: None,
                    to: Some(path.clone()),
                });
            }
            let old_sub = subtree_of(store, oe)?;
            let new_sub = subtree_of(store, ne)?;
            let saved = prefix.len();
            *prefix = path;
            diff_at(store, old_sub.as_ref(), new_sub.as_ref(), prefix, out)?;
            prefix.truncate(saved);
        } else {
            match (oe, ne) {
                (Some(_), Some(_)) => out.push(FilePatch {
                    from: Some(path.clone()),
                    to: Some(path),
                }),
                (Some(_), None) => out.push(FilePatch {
                    from: Some(path),
                    to: None,
                }),
                (None, Some(_)) => out.push(FilePatch {
                    from: None,
                    to: Some(path),
                }),
                (None, None) => {}
            }
        }
    }
    Ok(())
}

/// Result of gating one commit's file patches against the filter.
#[derive(Debug, Clone, Default)]
pub struct PatchCheck {
    /// Patches with a side outside the filter; only the offending sides are
    /// retained.
    pub violations: Vec<FilePatch>,
}

impl PatchCheck {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Every offending path, in order of appearance.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.violations
            .iter()
            .flat_map(|v| [v.from.as_deref(), v.to.as_deref()])
            .flatten()
    }
}

/// Verify that each side of every file patch lies inside the filter.
pub fn check_file_patches(patches: &[FilePatch], filter: &FilterSet) -> PatchCheck {
    let mut check = PatchCheck::default();
    for patch in patches {
        let offending = |side: &Option<String>| -> Option<String> {
            side.as_ref()
                .filter(|p| filter.matches(&split_path(p), false) != Match::In)
                .cloned()
        };
        let from = offending(&patch.from);
        let to = offending(&patch.to);
        if from.is_some() || to.is_some() {
            check.violations.push(FilePatch { from, to });
        }
    }
    check
}

/// Aggregate the offending paths of many checks, sorted and deduplicated.
pub fn rejected_files(checks: &[PatchCheck]) -> Vec<String> {
    let mut files: Vec<String> = checks
        .iter()
        .flat_map(|c| c.paths().map(str::to_string))
        .collect();
    files.sort();
    files.dedup();
    files
}
