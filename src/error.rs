use reqwest::StatusCode;

/// Everything a remote operation can fail with. Callers branch on the kind;
/// the remote status/message ride along unchanged for display.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token exchange failed: {message}")]
    AuthExchange { message: String },

    #[error("repository creation rejected ({status}): {message}")]
    RepoCreate { status: StatusCode, message: String },

    #[error("branch creation failed: {message}")]
    BranchCreate { message: String },

    #[error("branch '{branch}' not found in '{repo}'")]
    RefNotFound { repo: String, branch: String },

    #[error("push rejected, branch tip moved since it was read: {message}")]
    PushConflict { message: String },

    #[error("remote rejected the request ({status}): {message}")]
    Remote { status: StatusCode, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
