//! Branch name validation
//!
//! Revision syntax like `HEAD^` or `main~3` is out of scope: branches are
//! addressed by their plain name or resolved hash only.

pub mod branch_name;

/// Regex pattern for invalid characters in branch names
pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";
