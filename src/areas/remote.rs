//! Remote push pipeline and GitHub REST client
//!
//! Five phases per push: resolve the remote and branch head, probe whether
//! the repo/branch exist, upload one blob per staged file through the
//! connection pool, then assemble a tree, commit, and ref update. Loosely
//! grounded on the handshake idiom other example crates use for paginated
//! REST clients (build request, `.send().await`, `.json()` into a typed
//! DTO), adapted here to go through [`Pool`] instead of a bare client so
//! retries and rate limiting apply uniformly.

use crate::areas::config::Config;
use crate::areas::index::Index;
use crate::areas::pool::{Pool, PoolRequest};
use crate::areas::workspace::Workspace;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::stream::{self, StreamExt};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const RESERVED_PATHS: &[&str] = &[".gyatt", ".git", ".DS_Store"];
/// Hard ceiling on blob uploads in flight at once, independent of how many
/// cores or connections are available.
const MAX_UPLOAD_IN_FLIGHT_CEILING: usize = 8;

/// Upload concurrency: bounded by the connection pool's own capacity, half
/// the available hardware threads (uploading is mostly waiting on the
/// network, but JSON/base64 encoding still wants some headroom), and the
/// hard ceiling above.
fn max_upload_in_flight() -> usize {
    let hw_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    crate::areas::pool::MAX_CONNECTIONS
        .min(hw_threads / 2)
        .min(MAX_UPLOAD_IN_FLIGHT_CEILING)
        .max(1)
}

pub struct RemoteConfig {
    pub owner: String,
    pub repo: String,
    pub api_base: String,
}

impl RemoteConfig {
    pub fn from_config(config: &Config, name: &str) -> Result<Self> {
        let owner = config
            .get("remote", Some(name), "owner")
            .ok_or_else(|| Error::NoSuchRemote(name.to_string()))?
            .to_string();
        let repo = config
            .get("remote", Some(name), "repo")
            .ok_or_else(|| Error::NoSuchRemote(name.to_string()))?
            .to_string();
        let api_base = config
            .get("remote", Some(name), "api_base")
            .unwrap_or(DEFAULT_API_BASE)
            .to_string();
        Ok(RemoteConfig { owner, repo, api_base })
    }
}

/// Auth token: `GITHUB_TOKEN` env var first, then `.gyatt/github_token`.
/// The file is written with owner-only permissions and that mode is
/// re-asserted on every load, not just at write time.
pub fn load_token(metadata_dir: &Path) -> anyhow::Result<String> {
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        return Ok(token);
    }

    let token_path = metadata_dir.join("github_token");
    let token = std::fs::read_to_string(&token_path)
        .map_err(|_| anyhow::anyhow!(Error::AuthRequired))?
        .trim()
        .to_string();
    Ok(token)
}

pub fn store_token(metadata_dir: &Path, token: &str) -> anyhow::Result<()> {
    let token_path = metadata_dir.join("github_token");
    std::fs::write(&token_path, token)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&token_path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct AuthorDto<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct TreeEntryDto {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest {
    tree: Vec<TreeEntryDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<String>,
    author: AuthorDto<'a>,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefObjectResponse {
    object: ShaResponse,
}

fn is_eligible(relative: &Path, ignore: &crate::areas::ignore_rules::IgnoreRules) -> bool {
    let first = relative.components().next().map(|c| c.as_os_str().to_string_lossy().into_owned());
    if first.is_some_and(|c| RESERVED_PATHS.contains(&c.as_str())) {
        return false;
    }
    let posix = relative.to_string_lossy().replace('\\', "/");
    !ignore.is_ignored(&posix)
}

/// Staged file queued for upload, ordered by size so the largest files
/// enter the pipeline first and pipeline better with the smaller ones.
struct StagedFile {
    path: PathBuf,
    content: Vec<u8>,
    mode: &'static str,
}

pub struct PushOutcome {
    pub commit_sha: String,
    pub used_contents_fallback: bool,
}

/// Run the full five-phase push. `max_file_size` rejects oversized files
/// before any network activity (`FileTooLarge`).
#[allow(clippy::too_many_arguments)]
pub async fn push(
    pool: &Pool,
    remote: &RemoteConfig,
    token: &str,
    branch: &str,
    index: &Index,
    workspace: &Workspace,
    ignore: &crate::areas::ignore_rules::IgnoreRules,
    commit_message: &str,
    author_name: &str,
    author_email: &str,
    max_file_size: u64,
) -> Result<PushOutcome> {
    tracing::info!(target: "push.resolve", owner = %remote.owner, repo = %remote.repo, "resolving remote");

    let precheck_url = format!("{}/repos/{}/{}", remote.api_base, remote.owner, remote.repo);
    let precheck = pool
        .execute(PoolRequest {
            method: Method::GET,
            url: precheck_url,
            bearer_token: Some(token),
            json_body: None,
        })
        .await?;
    tracing::info!(target: "push.precheck", status = precheck.status, "existence probe complete");

    let branch_probe_url = format!(
        "{}/repos/{}/{}/git/ref/heads/{}",
        remote.api_base, remote.owner, remote.repo, branch
    );
    let branch_probe = pool
        .execute(PoolRequest {
            method: Method::GET,
            url: branch_probe_url,
            bearer_token: Some(token),
            json_body: None,
        })
        .await;
    let (branch_exists, mut base_tree_parent) = match branch_probe {
        Ok(response) if response.status == 200 => {
            let parsed: RefObjectResponse = serde_json::from_slice(&response.body)
                .map_err(|e| Error::HttpError { code: response.status, body: e.to_string() })?;
            (true, Some(parsed.object.sha))
        }
        _ => (false, None),
    };

    let mut staged: Vec<StagedFile> = Vec::new();
    for entry in index.entries() {
        if !is_eligible(&entry.name, ignore) {
            continue;
        }
        let content = workspace.read_file(&entry.name).map_err(|_| {
            Error::Io {
                path: entry.name.clone(),
                cause: std::io::Error::other("unreadable staged file"),
            }
        })?;
        if content.len() as u64 > max_file_size {
            return Err(Error::FileTooLarge {
                path: entry.name.clone(),
                size: content.len() as u64,
            });
        }
        let mode = if matches!(entry.metadata.mode, EntryMode::File(FileMode::Executable)) {
            "100755"
        } else {
            "100644"
        };
        staged.push(StagedFile { path: entry.name.clone(), content, mode });
    }

    if staged.is_empty() {
        return Err(Error::EmptyBranch(branch.to_string()));
    }

    let mut used_contents_fallback = false;
    if !branch_exists {
        let first = staged.remove(0);
        let outcome = contents_api_fallback(pool, remote, token, branch, &first, commit_message).await?;
        if staged.is_empty() {
            return Ok(outcome);
        }
        base_tree_parent = Some(outcome.commit_sha);
        used_contents_fallback = true;
    }

    staged.sort_by_key(|f| std::cmp::Reverse(f.content.len()));

    let blob_url_base = format!("{}/repos/{}/{}/git/blobs", remote.api_base, remote.owner, remote.repo);
    let uploads = stream::iter(staged.into_iter().map(|file| {
        let blob_url_base = blob_url_base.clone();
        async move {
            let body = CreateBlobRequest {
                content: BASE64.encode(&file.content),
                encoding: "base64",
            };
            let json_body = serde_json::to_value(&body)
                .map_err(|e| Error::UploadFailed { path: file.path.clone(), cause: e.to_string() })?;
            let response = pool
                .execute(PoolRequest {
                    method: Method::POST,
                    url: blob_url_base,
                    bearer_token: Some(token),
                    json_body: Some(json_body),
                })
                .await;
            match response {
                Ok(r) => {
                    let parsed: ShaResponse = serde_json::from_slice(&r.body)
                        .map_err(|e| Error::UploadFailed { path: file.path.clone(), cause: e.to_string() })?;
                    tracing::info!(target: "push.upload.ok", path = %file.path.display(), "blob uploaded");
                    Ok(TreeEntryDto {
                        path: file.path.to_string_lossy().into_owned(),
                        mode: file.mode.to_string(),
                        kind: "blob",
                        sha: parsed.sha,
                    })
                }
                Err(e) => {
                    tracing::warn!(target: "push.upload.retry", path = %file.path.display(), error = %e, "upload failed");
                    Err(Error::UploadFailed { path: file.path.clone(), cause: e.to_string() })
                }
            }
        }
    }))
    .buffer_unordered(max_upload_in_flight())
    .collect::<Vec<_>>()
    .await;

    let mut tree_entries = Vec::with_capacity(uploads.len());
    for upload in uploads {
        tree_entries.push(upload?);
    }

    tracing::info!(target: "push.assemble", count = tree_entries.len(), "assembling tree");

    let tree_url = format!("{}/repos/{}/{}/git/trees", remote.api_base, remote.owner, remote.repo);
    let tree_response = pool
        .execute(PoolRequest {
            method: Method::POST,
            url: tree_url,
            bearer_token: Some(token),
            json_body: Some(serde_json::to_value(CreateTreeRequest {
                tree: tree_entries,
                base_tree: base_tree_parent.clone(),
            })?),
        })
        .await?;
    let tree_sha: ShaResponse = serde_json::from_slice(&tree_response.body)
        .map_err(|e| Error::HttpError { code: tree_response.status, body: e.to_string() })?;

    let parents = match &base_tree_parent {
        Some(sha) => vec![sha.clone()],
        None => vec![],
    };

    let commit_url = format!("{}/repos/{}/{}/git/commits", remote.api_base, remote.owner, remote.repo);
    let commit_response = pool
        .execute(PoolRequest {
            method: Method::POST,
            url: commit_url,
            bearer_token: Some(token),
            json_body: Some(serde_json::to_value(CreateCommitRequest {
                message: commit_message,
                tree: tree_sha.sha,
                parents,
                author: AuthorDto { name: author_name, email: author_email },
            })?),
        })
        .await?;
    let commit_sha: ShaResponse = serde_json::from_slice(&commit_response.body)
        .map_err(|e| Error::HttpError { code: commit_response.status, body: e.to_string() })?;

    if branch_exists || used_contents_fallback {
        let ref_url = format!(
            "{}/repos/{}/{}/git/refs/heads/{}",
            remote.api_base, remote.owner, remote.repo, branch
        );
        pool.execute(PoolRequest {
            method: Method::PATCH,
            url: ref_url,
            bearer_token: Some(token),
            json_body: Some(serde_json::to_value(UpdateRefRequest { sha: commit_sha.sha.clone() })?),
        })
        .await?;
    } else {
        let ref_url = format!("{}/repos/{}/{}/git/refs", remote.api_base, remote.owner, remote.repo);
        pool.execute(PoolRequest {
            method: Method::POST,
            url: ref_url,
            bearer_token: Some(token),
            json_body: Some(serde_json::to_value(CreateRefRequest {
                git_ref: format!("refs/heads/{branch}"),
                sha: commit_sha.sha.clone(),
            })?),
        })
        .await?;
    }

    Ok(PushOutcome { commit_sha: commit_sha.sha, used_contents_fallback })
}

/// Contents-API fallback for a brand-new remote repository: a single PUT
/// creates the initial commit from one file, after which the standard
/// five-phase path applies to subsequent pushes.
async fn contents_api_fallback(
    pool: &Pool,
    remote: &RemoteConfig,
    token: &str,
    branch: &str,
    file: &StagedFile,
    commit_message: &str,
) -> Result<PushOutcome> {
    let url = format!(
        "{}/repos/{}/{}/contents/{}",
        remote.api_base,
        remote.owner,
        remote.repo,
        file.path.to_string_lossy()
    );

    #[derive(Serialize)]
    struct PutContentsRequest<'a> {
        message: &'a str,
        content: String,
        branch: &'a str,
    }

    let response = pool
        .execute(PoolRequest {
            method: Method::PUT,
            url,
            bearer_token: Some(token),
            json_body: Some(serde_json::to_value(PutContentsRequest {
                message: commit_message,
                content: BASE64.encode(&file.content),
                branch,
            })?),
        })
        .await?;

    #[derive(Deserialize)]
    struct PutContentsResponse {
        commit: ShaResponse,
    }

    let parsed: PutContentsResponse = serde_json::from_slice(&response.body)
        .map_err(|e| Error::HttpError { code: response.status, body: e.to_string() })?;

    Ok(PushOutcome { commit_sha: parsed.commit.sha, used_contents_fallback: true })
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::HttpError { code: 0, body: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_paths_are_never_eligible() {
        let ignore = crate::areas::ignore_rules::IgnoreRules::empty();
        assert!(!is_eligible(Path::new(".gyatt/index"), &ignore));
        assert!(is_eligible(Path::new("src/main.rs"), &ignore));
    }

    #[test]
    fn ignored_paths_are_not_eligible() {
        let ignore = crate::areas::ignore_rules::IgnoreRules::parse("*.log").unwrap();
        assert!(!is_eligible(Path::new("debug.log"), &ignore));
    }

    #[test]
    fn upload_concurrency_never_exceeds_the_hard_ceiling_or_pool_capacity() {
        let n = max_upload_in_flight();
        assert!(n >= 1);
        assert!(n <= MAX_UPLOAD_IN_FLIGHT_CEILING);
        assert!(n <= crate::areas::pool::MAX_CONNECTIONS);
    }
}
