use thiserror::Error;

use crate::hash::Hash;

/// Errors produced by the filtering, expansion and sync machinery.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no filter configured")]
    NoFilter,
    #[error("no object storage for the filtered side")]
    NoToStorage,
    #[error("no object storage for the full side")]
    NoFromStorage,
    #[error("from repo is empty")]
    EmptyFromRepo,
    #[error("filter has no usable patterns")]
    EmptyFilter,
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid hex hash '{0}'")]
    InvalidHash(String),
    #[error("hex hash '{0}' is too short")]
    ShortHash(String),
    #[error("repo sync not found for the provided id")]
    RepoSyncNotFound,
    #[error("sync between the two repos already exists")]
    DuplicateRepoSync,
    #[error("secret not found for id")]
    SecretNotFound,
    #[error("invalid secret")]
    InvalidSecret,
    #[error("storage failure: {0}")]
    StorageFailure(String),
    #[error("object {0} not found in storage")]
    MissingObject(Hash),
    #[error("filtered branch not in sync with last synced commit")]
    ToNotInSync,
    #[error("full branch not in sync with last synced commit")]
    FromNotInSync,
    #[error("filtered branch has no new commits")]
    ToNoNewCommits,
    #[error("filtered branch diverged from last synced commit")]
    ToDiverged,
    #[error("commits rejected: {}", .0.join(", "))]
    CommitsRejected(Vec<String>),
    #[error("filtered repo is empty")]
    FilteredRepoEmpty,
    #[error("commits cannot carry a signature")]
    CommitsHaveSignature,
    #[error("commit {0} has no parents")]
    NoParents(Hash),
    #[error("zero roots found for traversal")]
    ZeroRoots,
    #[error("operation canceled")]
    Canceled,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with an outer context message.
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any context layers.
    pub fn root_cause(&self) -> &Error {
        let mut e = self;
        while let Error::Context { source, .. } = e {
            e = source;
        }
        e
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Extension for attaching context to error paths, in the spirit of
/// `anyhow::Context` but keeping the typed error.
pub trait ResultExt<T> {
    fn ctx(self, context: impl Into<String>) -> Result<T>;
    fn with_ctx(self, f: impl FnOnce() -> String) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn ctx(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_ctx(self, f: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_and_preserves_root_cause() {
        let e: Result<()> = Err(Error::ZeroRoots);
        let e = e.ctx("inspecting history").unwrap_err();
        assert!(matches!(e.root_cause(), Error::ZeroRoots));
        assert!(e.to_string().starts_with("inspecting history: "));
    }

    #[test]
    fn rejected_files_are_listed_in_message() {
        let e = Error::CommitsRejected(vec!["vendor/x.go".into(), "a.txt".into()]);
        assert_eq!(e.to_string(), "commits rejected: vendor/x.go, a.txt");
    }
}
