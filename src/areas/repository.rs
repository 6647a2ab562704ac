//! Repository facade: coordinates the object store, index, refs, workspace,
//! config, and remote push pipeline behind a single entry point.
//!
//! Unlike the `Arc<Mutex<_>>`/`RefCell` wiring this struct once carried, every
//! method here runs a single operation to completion before returning, so
//! plain `&mut self`/`&self` borrows are enough.

use crate::areas::config::Config;
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::pool::Pool;
use crate::areas::refs::{Head, Refs};
use crate::areas::remote::{self, PushOutcome, RemoteConfig};
use crate::areas::workspace::Workspace;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::status::status_info::{self, Status};
use crate::error::Error;
use crate::hash::Hash;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const METADATA_DIR: &str = ".gyatt";
const DEFAULT_BRANCH: &str = "main";
/// GitHub's Git Data API rejects blobs over 100 MiB; reject locally before
/// spending a round trip on the upload.
const MAX_PUSH_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Upper bound on worker threads used to hash staged files in parallel,
/// regardless of how many cores are available.
const MAX_ADD_WORKERS: usize = 8;

/// Coordinates the object store, index, refs, workspace, and remote client
/// for a single repository rooted at `path`.
pub struct Repository {
    path: Box<Path>,
    database: Database,
    index: Index,
    refs: Refs,
    workspace: Workspace,
    config: Config,
    pool: Pool,
}

impl Repository {
    /// Create a new repository at `path`, failing if one already exists
    /// there.
    pub fn init(path: PathBuf) -> anyhow::Result<Self> {
        let metadata_dir = path.join(METADATA_DIR);
        if metadata_dir.exists() {
            anyhow::bail!(Error::AlreadyARepository(path));
        }

        std::fs::create_dir_all(metadata_dir.join("objects"))?;
        std::fs::create_dir_all(metadata_dir.join("refs").join("heads"))?;

        let refs = Refs::new(metadata_dir.clone().into_boxed_path());
        let branch = BranchName::try_parse(DEFAULT_BRANCH.to_string())?;
        refs.write_head_symbolic(&branch)?;

        Config::new().save(&metadata_dir.join("config"))?;

        tracing::info!(target: "repository.init", path = %path.display(), "initialized repository");

        Self::open(path)
    }

    /// Open an existing repository at `path`, eagerly validating
    /// `.gyattignore` so a malformed pattern surfaces here rather than on
    /// the first scan.
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let metadata_dir = path.join(METADATA_DIR);
        if !metadata_dir.exists() {
            anyhow::bail!(Error::NotARepository(path));
        }

        let workspace = Workspace::new(path.clone().into_boxed_path());
        workspace.validate_ignore_file()?;

        let database = Database::new(metadata_dir.join("objects").into_boxed_path());

        let mut index = Index::new(metadata_dir.join("index").into_boxed_path());
        index.rehydrate()?;

        let refs = Refs::new(metadata_dir.clone().into_boxed_path());
        let config = Config::load(&metadata_dir.join("config"))?;
        let pool = Pool::new()?;

        Ok(Repository {
            path: path.into_boxed_path(),
            database,
            index,
            refs,
            workspace,
            config,
            pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn metadata_dir(&self) -> PathBuf {
        self.path.join(METADATA_DIR)
    }

    /// Resolve a CLI-supplied path (absolute or relative to the current
    /// directory) to a path relative to the repository root.
    fn relativize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.strip_prefix(self.workspace.path())
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        }
    }

    /// Expand each requested path into the set of repo-relative files it
    /// names: a file maps to itself, a directory expands to every file
    /// under it that's trackable or already tracked (including ones
    /// removed from disk, so `add` on a removed file's directory still
    /// stages the deletion).
    fn resolve_targets(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
        let workspace_files = self.workspace.list_files()?;
        let mut targets = Vec::new();

        for requested in paths {
            let relative = self.relativize(requested);
            let absolute = self.workspace.path().join(&relative);

            if absolute.is_dir() {
                targets.extend(workspace_files.iter().filter(|f| f.starts_with(&relative)).cloned());
                targets.extend(
                    self.index
                        .entries_under_path(&relative)
                        .into_iter()
                        .filter(|p| !self.workspace.exists(p)),
                );
            } else {
                targets.push(relative);
            }
        }

        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    /// Stage the given paths: existing files are hashed, stored as blobs,
    /// and recorded in the index; paths that no longer exist on disk stage
    /// their deletion. Hashing and blob writes for existing files run
    /// across a pool of `min(hw_threads, 8)` worker threads per §9, since
    /// neither `Database::write_blob` nor `Workspace::read_file` touches
    /// the index; everything index-mutating happens back on this thread
    /// afterward so the result matches a sequential `add` byte for byte.
    pub fn add(&mut self, paths: &[PathBuf]) -> anyhow::Result<()> {
        let targets = self.resolve_targets(paths)?;

        let mut to_hash = Vec::new();
        let mut to_remove = Vec::new();
        for path in targets {
            if self.workspace.exists(&path) {
                to_hash.push(path);
            } else {
                to_remove.push(path);
            }
        }

        for entry in self.hash_files_parallel(&to_hash)? {
            self.index.add(entry)?;
        }
        for path in to_remove {
            self.index.remove(path)?;
        }

        self.index.write_updates()
    }

    /// Hash and store `paths` as blobs across a bounded worker pool,
    /// returning one [`IndexEntry`] per path in the same order they were
    /// given. Grounded on the original engine's `ParallelProcessor::hashFilesParallel`
    /// (`performance_engine.h`), minus its own thread pool: `std::thread::scope`
    /// gives the same fixed-worker-count fan-out without a long-lived pool
    /// to manage.
    fn hash_files_parallel(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<IndexEntry>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_ADD_WORKERS)
            .min(paths.len());

        let mut results: Vec<Option<anyhow::Result<IndexEntry>>> = paths.iter().map(|_| None).collect();
        let chunk_size = paths.len().div_ceil(worker_count.max(1));

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (chunk_index, chunk) in paths.chunks(chunk_size.max(1)).enumerate() {
                let workspace = &self.workspace;
                let database = &self.database;
                handles.push((
                    chunk_index,
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|path| {
                                let content = workspace.read_file(path)?;
                                let hash = database.write_blob(content)?;
                                let metadata = workspace.stat_file(path)?;
                                Ok(IndexEntry::new(path.clone(), hash, metadata))
                            })
                            .collect::<Vec<anyhow::Result<IndexEntry>>>()
                    }),
                ));
            }

            for (chunk_index, handle) in handles {
                let chunk_results = handle.join().expect("add worker thread panicked");
                let start = chunk_index * chunk_size.max(1);
                for (offset, result) in chunk_results.into_iter().enumerate() {
                    results[start + offset] = Some(result);
                }
            }
        });

        results
            .into_iter()
            .map(|slot| slot.expect("every path is covered by exactly one chunk"))
            .collect()
    }

    /// Create a commit from the current staging area. Returns `None`
    /// (rather than erroring) when the resulting tree matches HEAD's tree
    /// or nothing has ever been staged — "nothing to commit" is a no-op,
    /// not a failure.
    pub fn commit(&mut self, message: &str) -> anyhow::Result<Option<Hash>> {
        if self.index.entries().next().is_none() {
            return Ok(None);
        }

        let tree = Tree::build(self.index.entries())?;
        let database = &self.database;
        tree.traverse(&|subtree| {
            database.write_tree(subtree)?;
            Ok(())
        })?;
        let tree_hash = tree.hash()?;

        let parent = self.refs.head_hash()?;
        if let Some(parent_hash) = parent {
            let parent_commit = self
                .database
                .parse_object_as_commit(&parent_hash)?
                .ok_or(Error::CorruptObject(parent_hash))?;
            if parent_commit.tree_hash() == tree_hash {
                return Ok(None);
            }
        }

        let author = resolve_author(&self.config)?;
        let parents: Vec<Hash> = parent.into_iter().collect();
        let commit = Commit::new(parents, tree_hash, author, message.to_string());
        let commit_hash = self.database.write_commit(&commit)?;
        self.refs.advance_head(commit_hash)?;

        Ok(Some(commit_hash))
    }

    /// Create a branch pointing at HEAD's commit. Fails with
    /// [`Error::NoCommits`] if HEAD has no commit yet.
    pub fn branch(&self, name: &str) -> anyhow::Result<()> {
        let head = self.refs.head_hash()?.ok_or(Error::NoCommits)?;
        let branch = BranchName::try_parse(name.to_string())?;
        self.refs.write_ref(&branch, head)
    }

    /// Switch HEAD to an existing branch. This only repoints HEAD; it does
    /// not touch the working tree or the index.
    pub fn checkout(&self, name: &str) -> anyhow::Result<()> {
        let branch = BranchName::try_parse(name.to_string())?;
        if self.refs.read_ref(&branch)?.is_none() {
            anyhow::bail!(Error::NoSuchRef(name.to_string()));
        }
        self.refs.write_head_symbolic(&branch)
    }

    /// Classify every path touched by the working tree, the index, or
    /// HEAD's tree.
    pub fn status(&self) -> anyhow::Result<BTreeMap<PathBuf, Status>> {
        let head_tree = self.head_tree()?;
        status_info::statuses(&self.workspace, &self.index, &head_tree)
    }

    fn head_tree(&self) -> anyhow::Result<BTreeMap<PathBuf, Hash>> {
        let mut map = BTreeMap::new();
        if let Some(head) = self.refs.head_hash()? {
            let commit = self
                .database
                .parse_object_as_commit(&head)?
                .ok_or(Error::CorruptObject(head))?;
            self.collect_tree_blobs(commit.tree_hash(), PathBuf::new(), &mut map)?;
        }
        Ok(map)
    }

    fn collect_tree_blobs(&self, hash: Hash, prefix: PathBuf, map: &mut BTreeMap<PathBuf, Hash>) -> anyhow::Result<()> {
        let tree = self
            .database
            .parse_object_as_tree(&hash)?
            .ok_or(Error::CorruptObject(hash))?;

        for (name, entry) in tree.entries() {
            let path = prefix.join(name);
            if entry.is_tree() {
                self.collect_tree_blobs(entry.hash, path, map)?;
            } else {
                map.insert(path, entry.hash);
            }
        }
        Ok(())
    }

    /// Push HEAD's tracked files to `remote_name`, targeting `branch` (or
    /// HEAD's current branch if not given).
    pub async fn push(&self, remote_name: &str, branch: Option<&str>) -> anyhow::Result<PushOutcome> {
        let branch_name = self.resolve_push_branch(branch)?;
        let remote_config = RemoteConfig::from_config(&self.config, remote_name)?;
        let token = remote::load_token(&self.metadata_dir())?;
        let ignore = self.workspace.ignore_rules()?;

        let head_hash = self.refs.head_hash()?.ok_or(Error::NoCommits)?;
        let commit = self
            .database
            .parse_object_as_commit(&head_hash)?
            .ok_or(Error::CorruptObject(head_hash))?;

        let outcome = remote::push(
            &self.pool,
            &remote_config,
            &token,
            &branch_name,
            &self.index,
            &self.workspace,
            &ignore,
            commit.message(),
            commit.author().name(),
            commit.author().email(),
            MAX_PUSH_FILE_SIZE,
        )
        .await?;

        Ok(outcome)
    }

    fn resolve_push_branch(&self, branch: Option<&str>) -> anyhow::Result<String> {
        if let Some(explicit) = branch {
            return Ok(explicit.to_string());
        }
        match self.refs.read_head()? {
            Head::Symbolic(name) | Head::Uninitialized(name) => Ok(name.to_string()),
            Head::Detached(_) => anyhow::bail!("cannot push a detached HEAD without an explicit branch"),
        }
    }
}

/// Resolve commit authorship: `GYATT_AUTHOR_*`/`GIT_AUTHOR_*` env vars first,
/// falling back to `[user] name`/`email` in `.gyatt/config`.
fn resolve_author(config: &Config) -> anyhow::Result<Author> {
    if let Ok(author) = Author::load_from_env() {
        return Ok(author);
    }

    let name = config
        .user_name()
        .ok_or_else(|| anyhow::anyhow!("author identity not set: configure [user] name/email or GYATT_AUTHOR_NAME/EMAIL"))?;
    let email = config
        .user_email()
        .ok_or_else(|| anyhow::anyhow!("author identity not set: configure [user] name/email or GYATT_AUTHOR_NAME/EMAIL"))?;
    Ok(Author::new(name.to_string(), email.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) -> Repository {
        unsafe {
            std::env::set_var("GYATT_AUTHOR_NAME", "Ada Lovelace");
            std::env::set_var("GYATT_AUTHOR_EMAIL", "ada@example.com");
        }
        Repository::init(dir.to_path_buf()).unwrap()
    }

    #[test]
    fn init_rejects_existing_repository() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        assert!(Repository::init(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn open_rejects_non_repository() {
        let dir = tempdir().unwrap();
        assert!(Repository::open(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn add_then_commit_produces_known_blob_hash() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello\n").unwrap();
        let mut repo = init_repo(dir.path());

        repo.add(&[PathBuf::from("a.txt")]).unwrap();
        let commit_hash = repo.commit("initial commit").unwrap();
        assert!(commit_hash.is_some());

        let entry = repo.index.entry_by_path(Path::new("a.txt")).unwrap();
        assert_eq!(entry.hash.to_hex(), "e965047ad7c57865823c7d992b1d046ea66edf78");
    }

    #[test]
    fn committing_with_empty_index_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut repo = init_repo(dir.path());
        assert_eq!(repo.commit("nothing staged").unwrap(), None);
    }

    #[test]
    fn committing_unchanged_tree_twice_is_a_no_op_the_second_time() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello\n").unwrap();
        let mut repo = init_repo(dir.path());

        repo.add(&[PathBuf::from("a.txt")]).unwrap();
        assert!(repo.commit("first").unwrap().is_some());

        repo.add(&[PathBuf::from("a.txt")]).unwrap();
        assert_eq!(repo.commit("second, nothing changed").unwrap(), None);
    }

    #[test]
    fn branch_requires_a_commit() {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());
        assert!(repo.branch("dev").is_err());
    }

    #[test]
    fn branch_and_checkout_move_head() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello\n").unwrap();
        let mut repo = init_repo(dir.path());
        repo.add(&[PathBuf::from("a.txt")]).unwrap();
        repo.commit("initial commit").unwrap();

        repo.branch("dev").unwrap();
        repo.checkout("dev").unwrap();

        match repo.refs.read_head().unwrap() {
            Head::Symbolic(name) => assert_eq!(name.to_string(), "dev"),
            other => panic!("expected Symbolic(dev), got {other:?}"),
        }
    }

    #[test]
    fn checkout_rejects_unknown_branch() {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());
        assert!(repo.checkout("missing").is_err());
    }

    #[test]
    fn status_reports_untracked_then_clean_after_commit() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello\n").unwrap();
        let mut repo = init_repo(dir.path());

        let status = repo.status().unwrap();
        assert_eq!(status.get(&PathBuf::from("a.txt")), Some(&Status::Untracked));

        repo.add(&[PathBuf::from("a.txt")]).unwrap();
        repo.commit("initial commit").unwrap();

        let status = repo.status().unwrap();
        assert_eq!(status.get(&PathBuf::from("a.txt")), Some(&Status::Clean));
    }

    #[test]
    fn adding_many_files_at_once_hashes_every_one_correctly() {
        let dir = tempdir().unwrap();
        let mut expected_paths = Vec::new();
        for i in 0..20 {
            let name = format!("file-{i}.txt");
            std::fs::write(dir.path().join(&name), format!("contents {i}\n")).unwrap();
            expected_paths.push(PathBuf::from(name));
        }
        let mut repo = init_repo(dir.path());

        repo.add(&expected_paths).unwrap();

        for (i, path) in expected_paths.iter().enumerate() {
            let entry = repo.index.entry_by_path(path).unwrap();
            let content = format!("contents {i}\n").into_bytes();
            let expected_hash = crate::artifacts::objects::blob::Blob::new(content).hash().unwrap();
            assert_eq!(entry.hash, expected_hash);
        }
    }
}
