//! Index/tree entry modes
//!
//! Git only distinguishes a handful of modes at the index/tree level:
//! a directory (040000), a regular file (100644), and an executable file
//! (100755). Symlinks and gitlinks are out of scope here.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Regular,
    Executable,
}

impl FileMode {
    fn as_u32(self) -> u32 {
        match self {
            FileMode::Regular => 0o100644,
            FileMode::Executable => 0o100755,
        }
    }
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode::Regular
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Directory,
    File(FileMode),
}

impl EntryMode {
    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::Directory => 0o040000,
            EntryMode::File(mode) => mode.as_u32(),
        }
    }

    pub fn as_str(&self) -> String {
        format!("{:06o}", self.as_u32())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }

    pub fn from_octal_str(s: &str) -> anyhow::Result<Self> {
        let value = u32::from_str_radix(s, 8)
            .map_err(|_| anyhow::anyhow!("invalid octal mode: {s}"))?;
        Ok(Self::from(value))
    }
}

impl From<u32> for EntryMode {
    fn from(value: u32) -> Self {
        match value {
            0o040000 => EntryMode::Directory,
            0o100755 => EntryMode::File(FileMode::Executable),
            _ => EntryMode::File(FileMode::Regular),
        }
    }
}

impl Default for EntryMode {
    fn default() -> Self {
        EntryMode::File(FileMode::Regular)
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_file_mode_round_trips() {
        let mode = EntryMode::File(FileMode::Regular);
        assert_eq!(EntryMode::from(mode.as_u32()), mode);
    }

    #[test]
    fn octal_parse_round_trips_directory() {
        let mode = EntryMode::Directory;
        assert_eq!(EntryMode::from_octal_str("40000").unwrap(), mode);
    }
}
