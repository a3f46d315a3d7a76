mod store;

pub use store::{MemoryStore, ObjectStore};

use std::cmp::Ordering;
use std::fmt;

use sha1::{Digest, Sha1};

use crate::hash::{Hash, HASH_SIZE};

// ── Identities ──

/// Author or committer identity with the commit timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset from UTC in minutes, e.g. 120 for +0200.
    pub tz_offset_minutes: i32,
}

impl Ident {
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: i64) -> Self {
        Ident {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset_minutes: 0,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let off = self.tz_offset_minutes.unsigned_abs();
        write!(
            f,
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.timestamp,
            sign,
            off / 60,
            off % 60
        )
    }
}

// ── Tree entries ──

/// File type of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Regular,
    Executable,
    Symlink,
    Subtree,
    /// A gitlink to another repository. Never included and never descended
    /// by any projection operation.
    Submodule,
}

impl EntryMode {
    /// Canonical mode string used in tree serialization.
    pub fn mode_str(&self) -> &'static str {
        match self {
            EntryMode::Regular => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Subtree => "40000",
            EntryMode::Submodule => "160000",
        }
    }

    pub fn is_subtree(&self) -> bool {
        matches!(self, EntryMode::Subtree)
    }

    /// Regular, executable or symlink: an entry whose content is a blob.
    pub fn is_blob(&self) -> bool {
        matches!(
            self,
            EntryMode::Regular | EntryMode::Executable | EntryMode::Symlink
        )
    }
}

/// One named child of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub child: Hash,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, mode: EntryMode, child: Hash) -> Self {
        TreeEntry {
            name: name.into(),
            mode,
            child,
        }
    }
}

/// Tree entries sort by name bytes, with subtrees compared as if their name
/// carried a trailing slash.
fn entry_cmp(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    let ab = a.name.as_bytes();
    let bb = b.name.as_bytes();
    let n = ab.len().min(bb.len());
    match ab[..n].cmp(&bb[..n]) {
        Ordering::Equal => {}
        other => return other,
    }
    let tail = |e: &TreeEntry, rest: &[u8]| -> u8 {
        match rest.first() {
            Some(&c) => c,
            None if e.mode.is_subtree() => b'/',
            None => 0,
        }
    };
    tail(a, &ab[n..]).cmp(&tail(b, &bb[n..]))
}

// ── Trees ──

/// An unordered set of entries uniquely keyed by name, held in canonical
/// serialization order.
///
/// The empty tree is representable but is never stored by the filtering
/// operations; they signal "nothing left" with `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, sorting the entries into canonical order.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(entry_cmp);
        Tree { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical serialization: `"{mode} {name}\0"` followed by the raw
    /// child id, per entry, in sorted order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * (HASH_SIZE + 16));
        for e in &self.entries {
            out.extend_from_slice(e.mode.mode_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(e.name.as_bytes());
            out.push(0);
            out.extend_from_slice(e.child.as_bytes());
        }
        out
    }

    pub fn hash(&self) -> Hash {
        object_hash("tree", &self.serialize())
    }
}

// ── Commits ──

/// A commit object. The id covers the serialization below, including the
/// signature when present; commits produced by rewriting never carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Hash,
    pub author: Ident,
    pub committer: Ident,
    pub message: String,
    pub parents: Vec<Hash>,
    pub signature: Option<String>,
}

impl Commit {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("tree ");
        out.push_str(&self.tree.to_hex());
        out.push('\n');
        for p in &self.parents {
            out.push_str("parent ");
            out.push_str(&p.to_hex());
            out.push('\n');
        }
        out.push_str("author ");
        out.push_str(&self.author.to_string());
        out.push('\n');
        out.push_str("committer ");
        out.push_str(&self.committer.to_string());
        out.push('\n');
        if let Some(sig) = &self.signature {
            // Continuation lines of the signature block are indented by one
            // space, matching the loose object format.
            out.push_str("gpgsig ");
            let trimmed = sig.strip_suffix('\n').unwrap_or(sig);
            let mut first = true;
            for line in trimmed.split('\n') {
                if !first {
                    out.push_str("\n ");
                }
                out.push_str(line);
                first = false;
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    pub fn hash(&self) -> Hash {
        object_hash("commit", &self.serialize())
    }

    /// Short summary line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Content address of an object: SHA-1 over `"{kind} {len}\0"` plus the
/// serialized payload.
pub fn object_hash(kind: &str, payload: &[u8]) -> Hash {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    let digest = hasher.finalize();
    let mut bytes = [0u8; HASH_SIZE];
    bytes.copy_from_slice(&digest);
    Hash::from_bytes(bytes)
}
