//! `.gyatt/config` reader/writer
//!
//! INI-like format: `[section]` / `[section "subsection"]` headers followed
//! by `key = value` lines. Parsed by hand with a line scanner rather than a
//! general INI crate, matching how small, fixed-shape config files are
//! handled elsewhere in this codebase rather than reaching for a generic
//! parser dependency.

use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

fn section_key(name: &str, subsection: Option<&str>) -> String {
    match subsection {
        Some(sub) => format!("{name} \"{sub}\""),
        None => name.to_string(),
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let mut sections = BTreeMap::new();
        let mut current: Option<String> = None;

        for (line_number, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(header.to_string());
                sections.entry(header.to_string()).or_insert_with(BTreeMap::new);
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("malformed config line {}: {line}", line_number + 1))?;
            let section = current
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("config value outside of any section at line {}", line_number + 1))?;

            sections
                .entry(section.clone())
                .or_insert_with(BTreeMap::new)
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Config { sections })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("config path has no parent directory"))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, self.render().as_bytes())?;
        tmp.persist(path)?;
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (section, entries) in &self.sections {
            out.push_str(&format!("[{section}]\n"));
            for (key, value) in entries {
                out.push_str(&format!("\t{key} = {value}\n"));
            }
        }
        out
    }

    pub fn get(&self, section: &str, subsection: Option<&str>, key: &str) -> Option<&str> {
        self.sections
            .get(&section_key(section, subsection))
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, subsection: Option<&str>, key: &str, value: &str) {
        self.sections
            .entry(section_key(section, subsection))
            .or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    pub fn user_name(&self) -> Option<&str> {
        self.get("user", None, "name")
    }

    pub fn user_email(&self) -> Option<&str> {
        self.get("user", None, "email")
    }

    pub fn remote_url(&self, remote: &str) -> Option<&str> {
        self.get("remote", Some(remote), "url")
    }
}
