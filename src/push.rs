//! The one order-sensitive sequence in this crate: push a set of files to a
//! branch through the low-level Git data API.
//!
//! Dependency graph:
//! 1. resolve the authenticated login (owner for every later call)
//! 2. read the branch tip
//! 3. upload one blob per file — independent of each other, joined before 4
//! 4. create a tree on top of the tip with one entry per blob
//! 5. create a commit (tree from 4, sole parent from 2)
//! 6. advance the ref to the new commit, no force
//!
//! Nothing is retried and nothing is rolled back: blobs created before a
//! later step fails stay behind as unreferenced objects, which is harmless
//! until something points at them.

use futures::future::try_join_all;
use tracing::debug;

use crate::api::{Commit, GitHub, TreeEntry};
use crate::error::Result;

pub const DEFAULT_MESSAGE: &str = "Update from gitship";

/// A logical edit awaiting inclusion in a commit. Paths are repository paths
/// with `/` separators; content is arbitrary bytes (base64-encoded on the
/// wire). Duplicate paths are the remote's concern.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: String,
    pub content: Vec<u8>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Commit `files` onto `branch` and advance it. The branch must already
/// exist. Returns the created commit.
///
/// If the tip moves between the read in step 2 and the update in step 6, the
/// remote rejects the non-fast-forward update and this fails with
/// [`crate::Error::PushConflict`]; the caller decides what to do about it.
pub async fn push_files(
    gh: &GitHub,
    repo: &str,
    branch: &str,
    files: &[FileChange],
    message: Option<&str>,
) -> Result<Commit> {
    let owner = gh.authenticated_user().await?.login;
    let tip = gh.get_ref(&owner, repo, branch).await?.object.sha;
    debug!(%owner, repo, branch, %tip, files = files.len(), "starting push");

    let uploads = files
        .iter()
        .map(|f| gh.create_blob(&owner, repo, &f.content));
    let blobs = try_join_all(uploads).await?;

    let entries: Vec<TreeEntry> = files
        .iter()
        .zip(&blobs)
        .map(|(f, b)| TreeEntry::blob(&f.path, &b.sha))
        .collect();
    let tree = gh.create_tree(&owner, repo, &tip, &entries).await?;

    let commit = gh
        .create_commit(
            &owner,
            repo,
            message.unwrap_or(DEFAULT_MESSAGE),
            &tree.sha,
            std::slice::from_ref(&tip),
        )
        .await?;

    gh.update_ref(&owner, repo, branch, &commit.sha).await?;
    debug!(%owner, repo, branch, sha = %commit.sha, "push complete");

    Ok(commit)
}
