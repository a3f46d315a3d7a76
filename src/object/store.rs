use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{Commit, Tree};

/// Capability contract for a content-addressed object store.
///
/// Writing an object whose id is already present is a no-op; identity is the
/// hash of the canonical serialization. Reads and writes are synchronous.
pub trait ObjectStore {
    fn commit(&self, id: Hash) -> Result<Commit>;
    fn tree(&self, id: Hash) -> Result<Tree>;
    fn store_commit(&self, commit: &Commit) -> Result<Hash>;
    fn store_tree(&self, tree: &Tree) -> Result<Hash>;
    fn set_reference(&self, name: &str, target: Hash) -> Result<()>;
    fn reference(&self, name: &str) -> Result<Option<Hash>>;
    fn references(&self) -> Result<Vec<(String, Hash)>>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn commit(&self, id: Hash) -> Result<Commit> {
        (**self).commit(id)
    }
    fn tree(&self, id: Hash) -> Result<Tree> {
        (**self).tree(id)
    }
    fn store_commit(&self, commit: &Commit) -> Result<Hash> {
        (**self).store_commit(commit)
    }
    fn store_tree(&self, tree: &Tree) -> Result<Hash> {
        (**self).store_tree(tree)
    }
    fn set_reference(&self, name: &str, target: Hash) -> Result<()> {
        (**self).set_reference(name, target)
    }
    fn reference(&self, name: &str) -> Result<Option<Hash>> {
        (**self).reference(name)
    }
    fn references(&self) -> Result<Vec<(String, Hash)>> {
        (**self).references()
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn commit(&self, id: Hash) -> Result<Commit> {
        (**self).commit(id)
    }
    fn tree(&self, id: Hash) -> Result<Tree> {
        (**self).tree(id)
    }
    fn store_commit(&self, commit: &Commit) -> Result<Hash> {
        (**self).store_commit(commit)
    }
    fn store_tree(&self, tree: &Tree) -> Result<Hash> {
        (**self).store_tree(tree)
    }
    fn set_reference(&self, name: &str, target: Hash) -> Result<()> {
        (**self).set_reference(name, target)
    }
    fn reference(&self, name: &str) -> Result<Option<Hash>> {
        (**self).reference(name)
    }
    fn references(&self) -> Result<Vec<(String, Hash)>> {
        (**self).references()
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    commits: HashMap<Hash, Commit>,
    trees: HashMap<Hash, Tree>,
    refs: BTreeMap<String, Hash>,
}

/// In-memory object store; one instance backs one repository for the
/// duration of a sync operation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_count(&self) -> usize {
        self.inner.read().commits.len()
    }

    pub fn tree_count(&self) -> usize {
        self.inner.read().trees.len()
    }
}

impl ObjectStore for MemoryStore {
    fn commit(&self, id: Hash) -> Result<Commit> {
        self.inner
            .read()
            .commits
            .get(&id)
            .cloned()
            .ok_or(Error::MissingObject(id))
    }

    fn tree(&self, id: Hash) -> Result<Tree> {
        self.inner
            .read()
            .trees
            .get(&id)
            .cloned()
            .ok_or(Error::MissingObject(id))
    }

    fn store_commit(&self, commit: &Commit) -> Result<Hash> {
        let id = commit.hash();
        self.inner
            .write()
            .commits
            .entry(id)
            .or_insert_with(|| commit.clone());
        Ok(id)
    }

    fn store_tree(&self, tree: &Tree) -> Result<Hash> {
        let id = tree.hash();
        self.inner
            .write()
            .trees
            .entry(id)
            .or_insert_with(|| tree.clone());
        Ok(id)
    }

    fn set_reference(&self, name: &str, target: Hash) -> Result<()> {
        self.inner.write().refs.insert(name.to_string(), target);
        Ok(())
    }

    fn reference(&self, name: &str) -> Result<Option<Hash>> {
        Ok(self.inner.read().refs.get(name).copied())
    }

    fn references(&self) -> Result<Vec<(String, Hash)>> {
        Ok(self
            .inner
            .read()
            .refs
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}
