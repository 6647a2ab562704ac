//! Ref store: HEAD and local branch pointers
//!
//! A ref file holds either a 40-character hex hash (a direct pointer) or
//! `ref: refs/heads/<name>\n` (a symbolic pointer). HEAD is always written
//! and read through this indirection: `Symbolic` names the checked-out
//! branch, `Detached` pins HEAD straight at a commit.
//!
//! Every write goes through a temp-file-then-rename so a crash mid-write
//! never leaves a torn ref on disk.

use crate::artifacts::branch::branch_name::BranchName;
use crate::hash::Hash;
use anyhow::Context;
use std::path::Path;
use walkdir::WalkDir;

pub const HEAD_REF_NAME: &str = "HEAD";

/// What HEAD currently points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// HEAD -> refs/heads/<name>, and that branch hasn't been created yet.
    Uninitialized(BranchName),
    /// HEAD -> refs/heads/<name>, which exists.
    Symbolic(BranchName),
    /// HEAD pinned directly at a commit, detached from any branch.
    Detached(Hash),
}

enum RefTarget {
    Symbolic(String),
    Direct(Hash),
}

impl RefTarget {
    fn parse(content: &str) -> anyhow::Result<Self> {
        let content = content.trim();
        if let Some(branch_ref) = content.strip_prefix("ref: ") {
            Ok(RefTarget::Symbolic(branch_ref.trim().to_string()))
        } else {
            Ok(RefTarget::Direct(content.parse::<Hash>()?))
        }
    }
}

/// Ref store rooted at the repository's metadata directory (e.g. `.gyatt`).
#[derive(Debug)]
pub struct Refs {
    path: Box<Path>,
}

impl Refs {
    pub fn new(path: Box<Path>) -> Self {
        Refs { path }
    }

    pub fn head_path(&self) -> Box<Path> {
        self.path.join(HEAD_REF_NAME).into_boxed_path()
    }

    pub fn refs_path(&self) -> Box<Path> {
        self.path.join("refs").into_boxed_path()
    }

    pub fn heads_path(&self) -> Box<Path> {
        self.refs_path().join("heads").into_boxed_path()
    }

    fn branch_path(&self, name: &BranchName) -> Box<Path> {
        self.heads_path().join(name.as_ref()).into_boxed_path()
    }

    /// Write-temp-then-rename so the ref file is never observed half-written.
    fn write_atomic(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        let dir = path
            .parent()
            .with_context(|| format!("ref path has no parent: {}", path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("unable to create ref directory {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("unable to create temp ref file in {}", dir.display()))?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("unable to finalize ref file {}", path.display()))?;
        Ok(())
    }

    pub fn read_ref(&self, name: &BranchName) -> anyhow::Result<Option<Hash>> {
        let path = self.branch_path(name);
        self.read_hash_at(&path)
    }

    fn read_hash_at(&self, path: &Path) -> anyhow::Result<Option<Hash>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {}", path.display()))?;
        match RefTarget::parse(&content)? {
            RefTarget::Direct(hash) => Ok(Some(hash)),
            RefTarget::Symbolic(_) => Ok(None),
        }
    }

    pub fn write_ref(&self, name: &BranchName, hash: Hash) -> anyhow::Result<()> {
        self.write_atomic(&self.branch_path(name), &format!("{}\n", hash.to_hex()))
    }

    pub fn delete_branch(&self, name: &BranchName) -> anyhow::Result<Hash> {
        if let Head::Symbolic(current) | Head::Uninitialized(current) = self.read_head()?
            && &current == name
        {
            anyhow::bail!(crate::error::Error::RefInUse(name.to_string()));
        }

        let path = self.branch_path(name);
        let hash = self
            .read_hash_at(&path)?
            .ok_or_else(|| crate::error::Error::NoSuchRef(name.to_string()))?;
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to delete branch file at {}", path.display()))?;
        self.prune_empty_parents(&path)?;
        Ok(hash)
    }

    fn prune_empty_parents(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && parent != self.heads_path().as_ref()
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)
                .with_context(|| format!("failed to remove empty branch directory at {}", parent.display()))?;
            self.prune_empty_parents(parent)?;
        }
        Ok(())
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<BranchName>> {
        let heads_path = self.heads_path();
        if !heads_path.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<BranchName> = WalkDir::new(&heads_path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(heads_path.as_ref()).ok()?;
                BranchName::try_parse(relative.to_string_lossy().to_string()).ok()
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Read HEAD, resolving the branch name it names (whether or not that
    /// branch has any commits yet).
    pub fn read_head(&self) -> anyhow::Result<Head> {
        let path = self.head_path();
        if !path.exists() {
            anyhow::bail!("HEAD is missing; repository is corrupt");
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read HEAD at {}", path.display()))?;

        match RefTarget::parse(&content)? {
            RefTarget::Direct(hash) => Ok(Head::Detached(hash)),
            RefTarget::Symbolic(branch_ref) => {
                let name = branch_ref
                    .strip_prefix("refs/heads/")
                    .unwrap_or(&branch_ref)
                    .to_string();
                let name = BranchName::try_parse(name)?;
                if self.branch_path(&name).exists() {
                    Ok(Head::Symbolic(name))
                } else {
                    Ok(Head::Uninitialized(name))
                }
            }
        }
    }

    pub fn write_head_symbolic(&self, name: &BranchName) -> anyhow::Result<()> {
        self.write_atomic(&self.head_path(), &format!("ref: refs/heads/{}\n", name.as_ref()))
    }

    pub fn write_head_detached(&self, hash: Hash) -> anyhow::Result<()> {
        self.write_atomic(&self.head_path(), &format!("{}\n", hash.to_hex()))
    }

    /// Resolve HEAD all the way down to a commit hash, if one exists.
    pub fn head_hash(&self) -> anyhow::Result<Option<Hash>> {
        match self.read_head()? {
            Head::Detached(hash) => Ok(Some(hash)),
            Head::Symbolic(name) => self.read_ref(&name),
            Head::Uninitialized(_) => Ok(None),
        }
    }

    /// Advance HEAD's current branch to `hash`; a no-op on a detached HEAD
    /// (the caller creates a new commit but nothing points at it).
    pub fn advance_head(&self, hash: Hash) -> anyhow::Result<()> {
        match self.read_head()? {
            Head::Symbolic(name) | Head::Uninitialized(name) => self.write_ref(&name, hash),
            Head::Detached(_) => Ok(()),
        }
    }
}
