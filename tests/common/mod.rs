#![allow(dead_code)]

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::predicate;

/// A scratch repository directory with a `gyatt` command pre-bound to it.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Sandbox {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn cmd(&self, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("gyatt").unwrap();
        cmd.current_dir(self.dir.path()).args(args);
        cmd
    }

    pub fn init(&self) {
        self.cmd(&["init"]).assert().success();
    }

    pub fn write_file(&self, relative: &str, contents: &str) {
        self.dir.child(relative).write_str(contents).unwrap();
    }

    pub fn add(&self, paths: &[&str]) {
        let mut args = vec!["add"];
        args.extend(paths);
        self.cmd(&args).assert().success();
    }

    pub fn commit(&self, message: &str) -> assert_cmd::assert::Assert {
        self.cmd(&["commit", "-m", message]).assert()
    }

    pub fn head_commit_hash(&self) -> String {
        std::fs::read_to_string(self.dir.path().join(".gyatt/refs/heads/main"))
            .unwrap()
            .trim()
            .to_string()
    }
}

pub fn predicate_matches(pattern: &str) -> predicates::str::RegexPredicate {
    predicate::str::is_match(pattern).unwrap()
}
