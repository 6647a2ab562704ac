//! Commit object: a tree snapshot plus history and authorship
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-hash>
//! parent <parent-hash>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//!
//! <commit message>
//! ```

use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_type::ObjectType;
use crate::hash::Hash;
use anyhow::Context;
use bytes::Bytes;
use std::io::{BufRead, Write};

/// Author or committer identity: name, email, and the timestamp they acted at.
///
/// The timezone offset parsed from `GIT_AUTHOR_DATE` (or supplied directly)
/// is preserved rather than normalized to UTC, matching how the value
/// round-trips through `display()`/`TryFrom<&str>`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Author {
    pub fn new(name: String, email: String) -> Self {
        Author {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Author {
            name,
            email,
            timestamp,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    /// Reads `GYATT_AUTHOR_NAME`/`GYATT_AUTHOR_EMAIL`, falling back to the
    /// widely-recognized `GIT_AUTHOR_*` variables so existing shells and CI
    /// configs keep working.
    pub fn load_from_env() -> anyhow::Result<Self> {
        let name = std::env::var("GYATT_AUTHOR_NAME")
            .or_else(|_| std::env::var("GIT_AUTHOR_NAME"))
            .context("author name not set (GYATT_AUTHOR_NAME or GIT_AUTHOR_NAME)")?;
        let email = std::env::var("GYATT_AUTHOR_EMAIL")
            .or_else(|_| std::env::var("GIT_AUTHOR_EMAIL"))
            .context("author email not set (GYATT_AUTHOR_EMAIL or GIT_AUTHOR_EMAIL)")?;
        let timestamp = std::env::var("GIT_AUTHOR_DATE").ok().and_then(|date_str| {
            chrono::DateTime::parse_from_rfc2822(&date_str)
                .or_else(|_| chrono::DateTime::parse_from_str(&date_str, "%Y-%m-%d %H:%M:%S %z"))
                .ok()
        });

        match timestamp {
            Some(ts) => Ok(Author::new_with_timestamp(name, email, ts)),
            None => Ok(Author::new(name, email)),
        }
    }

    pub fn readable_timestamp(&self) -> String {
        self.timestamp
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string()
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            return Err(anyhow::anyhow!("invalid author format"));
        }

        let timezone = parts[0];
        let timestamp = parts[1]
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("invalid author timestamp"))?;
        let name_email_part = parts[2];

        let email_start = name_email_part
            .find('<')
            .ok_or_else(|| anyhow::anyhow!("invalid author format: missing '<'"))?;
        let email_end = name_email_part
            .find('>')
            .ok_or_else(|| anyhow::anyhow!("invalid author format: missing '>'"))?;

        let name = name_email_part[..email_start].trim().to_string();
        let email = name_email_part[email_start + 1..email_end].to_string();

        // Parse the offset literal on its own (against an arbitrary epoch
        // date) rather than reformatting the UTC instant's wall-clock
        // fields and reparsing them as if they were local to `timezone` —
        // that reinterpretation would shift the instant by the offset
        // instead of just relabeling it.
        let offset = chrono::DateTime::parse_from_str(&format!("1970-01-01 00:00:00 {timezone}"), "%Y-%m-%d %H:%M:%S %z")
            .map_err(|_| anyhow::anyhow!("invalid author timezone"))?
            .timezone();
        let utc_instant = chrono::DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid author timestamp"))?;
        let datetime = utc_instant.with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp: datetime,
        })
    }
}

/// Snapshot of the repository at a point in time.
///
/// Author and committer are kept distinct in the on-disk format (matching
/// Git), but `new` sets them equal since this project has no rebase/cherry-pick
/// path that would ever make them diverge.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    parents: Vec<Hash>,
    tree_hash: Hash,
    author: Author,
    committer: Author,
    message: String,
}

impl Commit {
    pub fn new(parents: Vec<Hash>, tree_hash: Hash, author: Author, message: String) -> Self {
        Commit {
            parents,
            tree_hash,
            author: author.clone(),
            committer: author,
            message,
        }
    }

    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_hash(&self) -> Hash {
        self.tree_hash
    }

    pub fn parents(&self) -> &[Hash] {
        &self.parents
    }

    pub fn parent(&self) -> Option<Hash> {
        self.parents.first().copied()
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.author.timestamp()
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut lines = vec![];

        lines.push(format!("tree {}", self.tree_hash.to_hex()));
        for parent in &self.parents {
            lines.push(format!("parent {}", parent.to_hex()));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));
        lines.push(String::new());
        lines.push(self.message.to_string());

        let content = lines.join("\n");

        let mut commit_bytes = Vec::with_capacity(content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content.len());
        commit_bytes.write_all(header.as_bytes())?;
        commit_bytes.write_all(content.as_bytes())?;

        Ok(Bytes::from(commit_bytes))
    }
}

impl Unpackable for Commit {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        let content = String::from_utf8(content)?;
        let mut lines = content.lines();

        let tree_line = lines.next().context("missing tree line")?;
        let tree_hash = tree_line
            .strip_prefix("tree ")
            .context("invalid tree line")?
            .parse::<Hash>()?;

        let mut parents = Vec::new();
        let mut next_line = lines.next().context("missing author line")?;

        while let Some(parent_hash) = next_line.strip_prefix("parent ") {
            parents.push(parent_hash.parse::<Hash>()?);
            next_line = lines.next().context("missing author line")?;
        }

        let author = next_line.strip_prefix("author ").context("invalid author line")?;
        let author = Author::try_from(author)?;

        let committer_line = lines.next().context("missing committer line")?;
        let committer = committer_line
            .strip_prefix("committer ")
            .context("invalid committer line")?;
        let committer = Author::try_from(committer)?;

        lines.next();
        let message = lines.collect::<Vec<&str>>().join("\n");

        Ok(Commit {
            parents,
            tree_hash,
            author,
            committer,
            message,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        let mut lines = vec![];
        lines.push(format!("tree {}", self.tree_hash.to_hex()));
        for parent in &self.parents {
            lines.push(format!("parent {}", parent.to_hex()));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));
        lines.push(String::new());
        lines.push(self.message.to_string());
        lines.join("\n")
    }
}
