//! Editing of a working copy's `.hg/hgrc`
//!
//! The file is edited line by line so that comments, `%include` directives and
//! settings this tool does not own survive untouched.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MirrorError, Result};

/// Suffix hg-git appends to bookmarks that stand for named branches
pub const BOOKMARK_SUFFIX: &str = "_bookmark";

/// A sectioned Mercurial configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HgConfig {
    lines: Vec<String>,
}

impl HgConfig {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Value of `key` in `section`, if set
    ///
    /// Mercurial reads top to bottom, so the last assignment across every
    /// copy of the section wins.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section_ranges(section)
            .into_iter()
            .flat_map(|(start, end)| self.lines[start + 1..end].iter())
            .filter_map(|line| match split_entry(line) {
                Some((k, v)) if k == key => Some(v),
                _ => None,
            })
            .last()
    }

    /// Set `key` in `section`, creating the section when it is missing
    ///
    /// The value lands in the last copy of the section and any other
    /// assignment of `key` in that section is dropped.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = if value.is_empty() {
            format!("{} =", key)
        } else {
            format!("{} = {}", key, value)
        };

        let sections = self.section_ranges(section);
        let Some(&(start, end)) = sections.last() else {
            if self.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines.push(format!("[{}]", section));
            self.lines.push(entry);
            return;
        };

        let last_assignment = (start + 1..end)
            .rev()
            .find(|&index| is_assignment(&self.lines[index], key));

        match last_assignment {
            Some(index) => {
                self.lines[index] = entry;
                self.remove_key(start + 1..index, key);
            }
            None => {
                // Insert after the last non-blank line of the section
                let mut insert_at = end;
                while insert_at > start + 1 && self.lines[insert_at - 1].trim().is_empty() {
                    insert_at -= 1;
                }
                self.lines.insert(insert_at, entry);
            }
        }

        // Earlier copies sit above `start`, so their ranges are still valid
        for &(start, end) in sections.iter().rev().skip(1) {
            self.remove_key(start + 1..end, key);
        }
    }

    fn remove_key(&mut self, range: Range<usize>, key: &str) {
        for index in range.rev() {
            if is_assignment(&self.lines[index], key) {
                self.lines.remove(index);
            }
        }
    }

    /// Line ranges `[header, next_header)` of every matching section, in file order
    fn section_ranges(&self, section: &str) -> Vec<(usize, usize)> {
        let headers: Vec<(usize, &str)> = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| section_name(line).map(|name| (index, name)))
            .collect();

        headers
            .iter()
            .enumerate()
            .filter(|(_, (_, name))| *name == section)
            .map(|(position, &(start, _))| {
                let end = headers
                    .get(position + 1)
                    .map_or(self.lines.len(), |&(next, _)| next);
                (start, end)
            })
            .collect()
    }
}

impl fmt::Display for HgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    // Continuation lines start with whitespace
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn is_assignment(line: &str, key: &str) -> bool {
    matches!(split_entry(line), Some((k, _)) if k == key)
}

/// Location of the repository-local config inside a working copy
pub fn hgrc_path(working_copy: &Path) -> PathBuf {
    working_copy.join(".hg").join("hgrc")
}

/// Enable bookmarks and hg-git with deterministic bookmark naming
pub fn enable_hggit(working_copy: &Path) -> Result<()> {
    let path = hgrc_path(working_copy);
    if !path.is_file() {
        return Err(MirrorError::ConfigurationFileMissing(path));
    }

    let content = std::fs::read_to_string(&path).map_err(|e| MirrorError::io(&path, e))?;
    let mut config = HgConfig::parse(&content);

    config.set("extensions", "hgext.bookmarks", "");
    config.set("extensions", "hggit", "");
    config.set("git", "branch_bookmark_suffix", BOOKMARK_SUFFIX);

    std::fs::write(&path, config.to_string()).map_err(|e| MirrorError::io(&path, e))?;

    debug!("Enabled hg-git in {}", path.display());
    Ok(())
}
