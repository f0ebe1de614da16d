// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

fn handout_walker(handout_dir: &Path) -> ignore::Walk {
    WalkBuilder::new(handout_dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
}

/// Lists every file below `handout_dir`, relative to it. A missing
/// directory yields an empty index.
pub fn index_handouts(handout_dir: &Path) -> Result<Vec<PathBuf>, ignore::Error> {
    if !handout_dir.is_dir() {
        return Ok(vec![]);
    }
    let mut files = vec![];
    for entry in handout_walker(handout_dir) {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(handout_dir)
            .map_err(|e| ignore::Error::from(std::io::Error::other(e)))?;
        files.push(relative.to_path_buf());
    }
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagLeak {
    pub path: PathBuf,
    pub line: usize,
}

/// Searches every handout file for any of `flags`, line by line.
/// Unreadable files and invalid UTF-8 are skipped over.
pub fn find_flag_leaks<'a>(
    handout_dir: &Path,
    flags: impl Iterator<Item = &'a str> + Clone,
) -> Vec<FlagLeak> {
    let mut leaks = vec![];
    if !handout_dir.is_dir() {
        return leaks;
    }
    for entry in handout_walker(handout_dir).flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let file = match std::fs::File::open(entry.path()) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let reader = BufReader::new(file);
        for (idx, line) in reader.split(b'\n').enumerate() {
            let Ok(line) = line else {
                break;
            };
            let line = String::from_utf8_lossy(&line);
            if flags
                .clone()
                .any(|flag| !flag.is_empty() && line.contains(flag))
            {
                leaks.push(FlagLeak {
                    path: entry.path().to_path_buf(),
                    line: idx + 1,
                });
            }
        }
    }
    leaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_recursive_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let handout = dir.path().join("Handout");
        std::fs::create_dir_all(handout.join("src/nested")).unwrap();
        std::fs::write(handout.join("Dockerfile"), "FROM scratch").unwrap();
        std::fs::write(handout.join("src/nested/challenge.c"), "int main() {}").unwrap();
        std::fs::write(handout.join(".env"), "FLAG=CTF{dummy}").unwrap();

        let files = index_handouts(&handout).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from(".env"),
                PathBuf::from("Dockerfile"),
                PathBuf::from("src/nested/challenge.c"),
            ]
        );
    }

    #[test]
    fn test_missing_handout_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(index_handouts(&dir.path().join("Handout")).unwrap().is_empty());
    }

    #[test]
    fn test_find_flag_leaks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "nothing\nthe flag is CTF{real}\n").unwrap();
        std::fs::write(dir.path().join("clean.txt"), "CTF{fake}\n").unwrap();

        let flags = ["CTF{real}"];
        let leaks = find_flag_leaks(dir.path(), flags.iter().copied());
        assert_eq!(
            leaks,
            vec![FlagLeak {
                path: dir.path().join("notes.txt"),
                line: 2,
            }]
        );
    }
}
