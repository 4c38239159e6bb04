//! In-process stand-in for the GitHub API, stateful enough to exercise the
//! blob → tree → commit → ref pipeline, including fast-forward enforcement
//! on ref updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

pub type Shared = Arc<Mutex<MockGitHub>>;

#[derive(Debug, Clone)]
pub struct CommitRec {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockGitHub {
    pub login: String,
    pub repos: Vec<String>,
    /// (repo, branch) -> commit sha
    pub refs: HashMap<(String, String), String>,
    /// blob sha -> decoded content
    pub blobs: HashMap<String, Vec<u8>>,
    /// tree sha -> entries as posted
    pub trees: HashMap<String, Value>,
    pub commits: HashMap<String, CommitRec>,
    next_sha: u64,
    /// When set to (repo, branch), an interloper commit lands on that branch
    /// right after the next get-ref, simulating a concurrent writer.
    pub advance_after_get: Option<(String, String)>,
}

impl MockGitHub {
    pub fn new(login: &str) -> Self {
        Self {
            login: login.to_string(),
            ..Default::default()
        }
    }

    fn mint_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("{:040x}", self.next_sha)
    }

    fn new_commit(&mut self, message: &str, tree: String, parents: Vec<String>) -> String {
        let sha = self.mint_sha();
        self.commits.insert(
            sha.clone(),
            CommitRec {
                message: message.to_string(),
                tree,
                parents,
            },
        );
        sha
    }

    fn create_repo_with_main(&mut self, name: &str) {
        let tree = self.mint_sha();
        let root = self.new_commit("Initial commit", tree, vec![]);
        self.repos.push(name.to_string());
        self.refs.insert((name.to_string(), "main".to_string()), root);
    }

    /// The commit currently at a branch tip.
    pub fn tip(&self, repo: &str, branch: &str) -> Option<String> {
        self.refs.get(&(repo.to_string(), branch.to_string())).cloned()
    }

    /// Decoded content of the blob at `path` in the tree of `commit_sha`.
    pub fn blob_at(&self, commit_sha: &str, path: &str) -> Option<Vec<u8>> {
        let commit = self.commits.get(commit_sha)?;
        let entries = self.trees.get(&commit.tree)?.as_array()?;
        let entry = entries.iter().find(|e| e["path"] == path)?;
        self.blobs.get(entry["sha"].as_str()?).cloned()
    }
}

pub async fn spawn() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(MockGitHub::new("octocat")));
    let app = Router::new()
        .route("/user", get(get_user))
        .route("/user/repos", post(create_repo))
        .route("/repos/{owner}/{repo}/git/ref/{*refname}", get(get_ref))
        .route("/repos/{owner}/{repo}/git/refs", post(create_ref))
        .route("/repos/{owner}/{repo}/git/refs/{*refname}", patch(update_ref))
        .route("/repos/{owner}/{repo}/git/blobs", post(create_blob))
        .route("/repos/{owner}/{repo}/git/trees", post(create_tree))
        .route("/repos/{owner}/{repo}/git/commits", post(create_commit))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn get_user(State(state): State<Shared>) -> Response {
    let login = state.lock().unwrap().login.clone();
    Json(json!({ "login": login })).into_response()
}

async fn create_repo(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let Some(name) = body["name"].as_str() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "name is required");
    };
    let mut s = state.lock().unwrap();
    if s.repos.iter().any(|r| r == name) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "name already exists on this account",
        );
    }
    s.create_repo_with_main(name);
    let full_name = format!("{}/{}", s.login, name);
    (
        StatusCode::CREATED,
        Json(json!({
            "name": name,
            "full_name": full_name,
            "default_branch": "main",
        })),
    )
        .into_response()
}

async fn get_ref(
    State(state): State<Shared>,
    Path((_owner, repo, refname)): Path<(String, String, String)>,
) -> Response {
    let Some(branch) = refname.strip_prefix("heads/") else {
        return error(StatusCode::NOT_FOUND, "Not Found");
    };
    let mut s = state.lock().unwrap();
    let Some(sha) = s.tip(&repo, branch) else {
        return error(StatusCode::NOT_FOUND, "Not Found");
    };

    // Simulated concurrent writer: land a commit right after the read.
    if s
        .advance_after_get
        .as_ref()
        .is_some_and(|(r, b)| r == &repo && b.as_str() == branch)
    {
        let tree = s.mint_sha();
        let interloper = s.new_commit("concurrent update", tree, vec![sha.clone()]);
        s.refs.insert((repo.clone(), branch.to_string()), interloper);
        s.advance_after_get = None;
    }

    Json(json!({
        "ref": format!("refs/heads/{branch}"),
        "object": { "sha": sha, "type": "commit" },
    }))
    .into_response()
}

async fn create_ref(
    State(state): State<Shared>,
    Path((_owner, repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let (Some(name), Some(sha)) = (body["ref"].as_str(), body["sha"].as_str()) else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "ref and sha are required");
    };
    let Some(branch) = name.strip_prefix("refs/heads/") else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Reference name is not well-formed");
    };
    let mut s = state.lock().unwrap();
    let key = (repo.clone(), branch.to_string());
    if s.refs.contains_key(&key) {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Reference already exists");
    }
    if !s.commits.contains_key(sha) {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Object does not exist");
    }
    s.refs.insert(key, sha.to_string());
    (
        StatusCode::CREATED,
        Json(json!({
            "ref": name,
            "object": { "sha": sha, "type": "commit" },
        })),
    )
        .into_response()
}

async fn update_ref(
    State(state): State<Shared>,
    Path((_owner, repo, refname)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let Some(branch) = refname.strip_prefix("heads/") else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Reference name is not well-formed");
    };
    let Some(sha) = body["sha"].as_str() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "sha is required");
    };
    let force = body["force"].as_bool().unwrap_or(false);

    let mut s = state.lock().unwrap();
    let key = (repo.clone(), branch.to_string());
    let Some(current) = s.refs.get(&key).cloned() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Reference does not exist");
    };
    let Some(commit) = s.commits.get(sha) else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Object does not exist");
    };
    let fast_forward = commit.parents.contains(&current);
    if !force && !fast_forward {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "Update is not a fast forward");
    }
    s.refs.insert(key, sha.to_string());
    Json(json!({
        "ref": format!("refs/heads/{branch}"),
        "object": { "sha": sha, "type": "commit" },
    }))
    .into_response()
}

async fn create_blob(
    State(state): State<Shared>,
    Path((_owner, _repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let Some(content) = body["content"].as_str() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "content is required");
    };
    if body["encoding"] != "base64" {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "unsupported encoding");
    }
    let Ok(decoded) = BASE64.decode(content) else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "content is not valid base64");
    };
    let mut s = state.lock().unwrap();
    let sha = s.mint_sha();
    s.blobs.insert(sha.clone(), decoded);
    (StatusCode::CREATED, Json(json!({ "sha": sha }))).into_response()
}

async fn create_tree(
    State(state): State<Shared>,
    Path((_owner, _repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if body["base_tree"].as_str().is_none() {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "base_tree is required");
    }
    let Some(entries) = body["tree"].as_array() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "tree is required");
    };
    let mut s = state.lock().unwrap();
    let sha = s.mint_sha();
    s.trees.insert(sha.clone(), Value::Array(entries.clone()));
    (StatusCode::CREATED, Json(json!({ "sha": sha }))).into_response()
}

async fn create_commit(
    State(state): State<Shared>,
    Path((_owner, _repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let (Some(message), Some(tree)) = (body["message"].as_str(), body["tree"].as_str()) else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "message and tree are required");
    };
    let parents: Vec<String> = body["parents"]
        .as_array()
        .map(|p| {
            p.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let mut s = state.lock().unwrap();
    let sha = s.new_commit(message, tree.to_string(), parents);
    (
        StatusCode::CREATED,
        Json(json!({ "sha": sha, "message": message })),
    )
        .into_response()
}
