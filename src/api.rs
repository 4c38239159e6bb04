//! Thin typed client over the GitHub REST API, including the low-level Git
//! data endpoints (blobs, trees, commits, refs) that `push` builds on.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("gitship/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: RefObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefObject {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Blob {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

/// One entry of a tree creation request. Always a regular file blob; this
/// client never writes submodules, symlinks or executables.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: &str, sha: &str) -> Self {
        Self {
            path: path.to_string(),
            mode: "100644",
            kind: "blob",
            sha: sha.to_string(),
        }
    }
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: &'a [TreeEntry],
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: &'a [String],
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

/// One authenticated session against the API. The token is threaded in
/// explicitly at construction; nothing here touches the token store.
pub struct GitHub {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl GitHub {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base(DEFAULT_API_BASE, token)
    }

    /// Point the session at a non-default API base (GitHub Enterprise, or an
    /// in-process server in tests).
    pub fn with_base(api_base: &str, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", ACCEPT)
    }

    /// Login of the identity the token belongs to.
    pub async fn authenticated_user(&self) -> Result<User> {
        let resp = self.request(Method::GET, "/user").send().await?;
        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(%status, "could not resolve the authenticated user");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    /// Create a new public repository for the authenticated user,
    /// auto-initialized so it has a default branch to push to.
    pub async fn create_repository(&self, name: &str) -> Result<Repository> {
        debug!(name, "creating repository");
        let resp = self
            .request(Method::POST, "/user/repos")
            .json(&CreateRepoRequest {
                name,
                private: false,
                auto_init: true,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(name, %status, "repository creation rejected: {message}");
            return Err(Error::RepoCreate { status, message });
        }
        Ok(resp.json().await?)
    }

    /// Current state of `refs/heads/{branch}`.
    pub async fn get_ref(&self, owner: &str, repo: &str, branch: &str) -> Result<GitRef> {
        let path = format!("/repos/{owner}/{repo}/git/ref/heads/{branch}");
        let resp = self.request(Method::GET, &path).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::RefNotFound {
                repo: repo.to_string(),
                branch: branch.to_string(),
            });
        }
        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(owner, repo, branch, %status, "get-ref failed: {message}");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    pub async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<GitRef> {
        let resp = self
            .request(Method::POST, &format!("/repos/{owner}/{repo}/git/refs"))
            .json(&CreateRefRequest {
                name: format!("refs/heads/{branch}"),
                sha,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(owner, repo, branch, %status, "create-ref failed: {message}");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    /// Upload raw content as a blob. The service hands back the
    /// content-derived SHA; nothing is hashed locally.
    pub async fn create_blob(&self, owner: &str, repo: &str, content: &[u8]) -> Result<Blob> {
        let resp = self
            .request(Method::POST, &format!("/repos/{owner}/{repo}/git/blobs"))
            .json(&CreateBlobRequest {
                content: BASE64.encode(content),
                encoding: "base64",
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(owner, repo, %status, "create-blob failed: {message}");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    pub async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<Tree> {
        let resp = self
            .request(Method::POST, &format!("/repos/{owner}/{repo}/git/trees"))
            .json(&CreateTreeRequest {
                base_tree,
                tree: entries,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(owner, repo, %status, "create-tree failed: {message}");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    pub async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<Commit> {
        let resp = self
            .request(Method::POST, &format!("/repos/{owner}/{repo}/git/commits"))
            .json(&CreateCommitRequest {
                message,
                tree,
                parents,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, message) = error_body(resp).await;
            warn!(owner, repo, %status, "create-commit failed: {message}");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    /// Advance `refs/heads/{branch}` to `sha` without force. The service
    /// rejects the update when the tip moved under us (non-fast-forward),
    /// which surfaces as [`Error::PushConflict`].
    pub async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<GitRef> {
        let path = format!("/repos/{owner}/{repo}/git/refs/heads/{branch}");
        let resp = self
            .request(Method::PATCH, &path)
            .json(&UpdateRefRequest { sha, force: false })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let (status, message) = error_body(resp).await;
            // A 409, or a 422 complaining about fast-forwardness, means the
            // tip moved under us. Other rejections (bad sha, malformed ref)
            // are not conflicts.
            if status == StatusCode::CONFLICT || is_fast_forward_rejection(&message) {
                warn!(owner, repo, branch, "non-fast-forward ref update rejected: {message}");
                return Err(Error::PushConflict { message });
            }
            warn!(owner, repo, branch, %status, "update-ref failed: {message}");
            return Err(Error::Remote { status, message });
        }
        Ok(resp.json().await?)
    }

    /// Create `new_branch` pointing at the tip of `from` (default `main`).
    pub async fn create_branch(
        &self,
        repo: &str,
        new_branch: &str,
        from: Option<&str>,
    ) -> Result<GitRef> {
        let from = from.unwrap_or("main");
        let owner = self.authenticated_user().await?.login;

        let source = match self.get_ref(&owner, repo, from).await {
            Ok(r) => r,
            Err(Error::RefNotFound { .. }) => {
                return Err(Error::BranchCreate {
                    message: format!("source branch '{from}' does not exist"),
                })
            }
            Err(e) => return Err(e),
        };

        debug!(repo, new_branch, from, sha = %source.object.sha, "creating branch");
        match self.create_ref(&owner, repo, new_branch, &source.object.sha).await {
            Ok(r) => Ok(r),
            Err(Error::Remote { message, .. }) => Err(Error::BranchCreate { message }),
            Err(e) => Err(e),
        }
    }
}

fn is_fast_forward_rejection(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("fast forward") || m.contains("fast-forward")
}

/// Pull the human-readable `message` out of an error response body, falling
/// back to the raw body or the status line when there isn't one.
async fn error_body(resp: reqwest::Response) -> (StatusCode, String) {
    let status = resp.status();
    let message = match resp.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    (status, message)
}
