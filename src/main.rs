use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gitship::api::GitHub;
use gitship::config::Config;
use gitship::oauth;
use gitship::push::{push_files, FileChange};
use gitship::token::TokenStore;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in to GitHub and store an access token
    Login,
    /// Print the login the stored token belongs to
    Whoami,
    /// Forget the stored access token
    Logout,
    /// Create a public repository for the authenticated user
    CreateRepo {
        /// Repository name
        name: String,
    },
    /// Create a branch from an existing one
    CreateBranch {
        /// Repository name
        repo: String,
        /// Name of the branch to create
        branch: String,
        /// Branch to fork from
        #[arg(long, default_value = "main")]
        from: String,
    },
    /// Commit local files to a branch and push
    Push {
        /// Repository name
        repo: String,
        /// Files to include in the commit
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Branch to push to
        #[arg(short, long, default_value = "main")]
        branch: String,
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.command {
        Commands::Login => login().await,
        Commands::Whoami => {
            let gh = session()?;
            let user = gh.authenticated_user().await?;
            println!("{}", user.login);
            Ok(())
        }
        Commands::Logout => {
            TokenStore::default_location()?.clear()?;
            println!("Token removed.");
            Ok(())
        }
        Commands::CreateRepo { name } => {
            let gh = session()?;
            let repo = gh.create_repository(&name).await?;
            println!(
                "Created {} (default branch: {})",
                repo.full_name, repo.default_branch
            );
            Ok(())
        }
        Commands::CreateBranch { repo, branch, from } => {
            let gh = session()?;
            let r = gh.create_branch(&repo, &branch, Some(&from)).await?;
            println!("Created {} at {}", r.name, r.object.sha);
            Ok(())
        }
        Commands::Push {
            repo,
            files,
            branch,
            message,
        } => {
            let gh = session()?;
            let changes = read_changes(&files)?;
            let commit = push_files(&gh, &repo, &branch, &changes, message.as_deref()).await?;
            println!(
                "Pushed {} file(s) to {}/{} as {}",
                changes.len(),
                repo,
                branch,
                commit.sha
            );
            Ok(())
        }
    }
}

/// Build an authenticated session from the stored token. Operations never
/// consult the store themselves; the gate lives here. Honors a configured
/// `api_base` (GitHub Enterprise) the same way `login` does.
fn session() -> Result<GitHub> {
    let store = TokenStore::default_location()?;
    let token = store
        .load()?
        .context("no access token stored, run `gitship login` first")?;
    let api_base = Config::api_base_or_default()?;
    Ok(GitHub::with_base(&api_base, token)?)
}

async fn login() -> Result<()> {
    let cfg = Config::load()?;
    let url = oauth::authorize_url(&cfg);

    println!("Open this URL in your browser to authorize gitship:\n");
    println!("  {url}\n");
    println!("Waiting for the callback at {} ...", cfg.redirect_uri);

    let code = oauth::wait_for_callback(&cfg.redirect_uri).await?;

    let http = reqwest::Client::new();
    let store = TokenStore::default_location()?;
    let token = oauth::complete_from_callback(&http, &cfg, &store, &code).await?;

    let user = GitHub::with_base(&cfg.api_base, token)?
        .authenticated_user()
        .await?;
    println!("Signed in as {}", user.login);
    Ok(())
}

fn read_changes(files: &[PathBuf]) -> Result<Vec<FileChange>> {
    let mut changes = Vec::with_capacity(files.len());
    for path in files {
        let content = fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        changes.push(FileChange::new(repo_path(path)?, content));
    }
    Ok(changes)
}

/// Turn a local path into a repository path: `/`-separated, relative, no
/// escapes above the repository root.
fn repo_path(path: &Path) -> Result<String> {
    use std::path::Component;

    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            _ => anyhow::bail!(
                "cannot use {} as a repository path: only relative paths below the current directory can be pushed",
                path.display()
            ),
        }
    }
    anyhow::ensure!(!parts.is_empty(), "empty file path");
    Ok(parts.join("/"))
}
