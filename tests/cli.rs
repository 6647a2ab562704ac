//! End-to-end scenarios against the `gyatt` binary, covering S1-S6 and the
//! exit-code contract in the external-interfaces spec.

mod common;

use common::Sandbox;
use predicates::prelude::predicate;

#[test]
fn init_creates_metadata_layout() {
    let sandbox = Sandbox::new();
    sandbox.init();

    assert!(sandbox.dir.path().join(".gyatt/objects").is_dir());
    assert!(sandbox.dir.path().join(".gyatt/refs/heads").is_dir());
    let head = std::fs::read_to_string(sandbox.dir.path().join(".gyatt/HEAD")).unwrap();
    assert_eq!(head.trim(), "ref: refs/heads/main");
}

#[test]
fn init_twice_fails_as_a_user_error() {
    let sandbox = Sandbox::new();
    sandbox.init();

    sandbox.cmd(&["init"]).assert().failure().code(1);
}

#[test]
fn commands_outside_a_repository_fail_as_a_user_error() {
    let sandbox = Sandbox::new();

    sandbox.cmd(&["status"]).assert().failure().code(1);
}

#[test]
fn s1_init_add_commit_produces_the_known_blob_hash() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("a.txt", "hello\n");
    sandbox.add(&["a.txt"]);

    let blob_path = sandbox
        .dir
        .path()
        .join(".gyatt/objects/e9/65047ad7c57865823c7d992b1d046ea66edf78");
    assert!(blob_path.exists(), "expected blob at {blob_path:?}");

    sandbox
        .commit("first")
        .success()
        .stdout(predicate::str::starts_with("["));

    let head_hash = sandbox.head_commit_hash();
    assert_eq!(head_hash.len(), 40);

    sandbox
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn s2_modifying_a_tracked_file_reports_modified_then_staged() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("a.txt", "hello\n");
    sandbox.add(&["a.txt"]);
    sandbox.commit("first").success();

    sandbox.write_file("a.txt", "hello\nworld\n");
    sandbox
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt"));

    sandbox.add(&["a.txt"]);
    sandbox
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn s3_branch_and_checkout_leave_main_untouched() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("a.txt", "hello\n");
    sandbox.add(&["a.txt"]);
    sandbox.commit("first").success();
    let main_head = sandbox.head_commit_hash();

    sandbox.cmd(&["branch", "dev"]).assert().success();
    let dev_ref = std::fs::read_to_string(sandbox.dir.path().join(".gyatt/refs/heads/dev"))
        .unwrap()
        .trim()
        .to_string();
    assert_eq!(dev_ref, main_head);

    sandbox.cmd(&["checkout", "dev"]).assert().success();
    let head_contents = std::fs::read_to_string(sandbox.dir.path().join(".gyatt/HEAD")).unwrap();
    assert_eq!(head_contents.trim(), "ref: refs/heads/dev");

    sandbox.write_file("b.txt", "on dev\n");
    sandbox.add(&["b.txt"]);
    sandbox.commit("on dev").success();

    let main_ref = std::fs::read_to_string(sandbox.dir.path().join(".gyatt/refs/heads/main"))
        .unwrap()
        .trim()
        .to_string();
    assert_eq!(main_ref, main_head, "main must not move when committing on dev");
}

#[test]
fn checkout_rejects_a_branch_that_does_not_exist() {
    let sandbox = Sandbox::new();
    sandbox.init();

    sandbox.cmd(&["checkout", "ghost"]).assert().failure().code(1);
}

#[test]
fn branch_without_any_commits_fails() {
    let sandbox = Sandbox::new();
    sandbox.init();

    sandbox.cmd(&["branch", "dev"]).assert().failure().code(1);
}

#[test]
fn s4_committing_with_nothing_staged_is_a_noop() {
    let sandbox = Sandbox::new();
    sandbox.init();

    sandbox
        .commit("x")
        .success()
        .stdout(predicate::str::contains("nothing to commit"));

    assert!(!sandbox.dir.path().join(".gyatt/refs/heads/main").exists());
}

#[test]
fn committing_the_same_tree_twice_is_a_noop_the_second_time() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("a.txt", "hello\n");
    sandbox.add(&["a.txt"]);
    sandbox.commit("first").success();
    let first_head = sandbox.head_commit_hash();

    sandbox.add(&["a.txt"]);
    sandbox
        .commit("again, nothing changed")
        .success()
        .stdout(predicate::str::contains("nothing to commit"));

    assert_eq!(sandbox.head_commit_hash(), first_head);
}

#[test]
fn add_on_a_directory_stages_every_file_under_it() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("src/a.txt", "a\n");
    sandbox.write_file("src/nested/b.txt", "b\n");
    sandbox.add(&["src"]);
    sandbox
        .commit("tree")
        .success()
        .stdout(predicate::str::contains("["));

    sandbox
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn add_on_a_directory_stages_deletion_of_a_removed_tracked_file() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("src/a.txt", "a\n");
    sandbox.add(&["src"]);
    sandbox.commit("first").success();

    std::fs::remove_file(sandbox.dir.path().join("src/a.txt")).unwrap();
    sandbox.add(&["src"]);
    sandbox
        .commit("remove a")
        .success()
        .stdout(predicate::str::contains("["));
}

#[test]
fn push_without_a_configured_remote_fails() {
    let sandbox = Sandbox::new();
    sandbox.init();
    sandbox.write_file("a.txt", "hello\n");
    sandbox.add(&["a.txt"]);
    sandbox.commit("first").success();

    sandbox.cmd(&["push", "origin"]).assert().failure().code(1);
}
