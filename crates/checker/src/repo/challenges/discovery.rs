// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};
use thiserror::Error;

use crate::repo::challenges::config::{
    CATEGORY_FILE, CHALLENGE_FILE, load_category_config, load_challenge_config,
};
use crate::repo::challenges::defects::{Defect, error_chain};
use crate::repo::challenges::handout::index_handouts;
use crate::repo::challenges::{
    Category, Challenge, ChallengeTree, DESTROY_SCRIPT, HANDOUT_DIR, IdentityRegistry, Node,
    README_FILE, RUN_SCRIPT, SOURCE_DIR, TESTS_DIR,
};

/// Directories that belong to a challenge and are never searched for configuration
const OPAQUE_DIRS: [&str; 3] = [SOURCE_DIR, HANDOUT_DIR, TESTS_DIR];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Challenge root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Failed to walk challenge root: {0}")]
    Walk(#[from] ignore::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirKind {
    Challenge,
    Category,
    Neither,
    Malformed(String),
}

/// Outcome of loading one entity from disk
#[derive(Debug)]
pub enum Loaded<T> {
    Ok(T),
    Skipped(Defect),
    Fatal(DiscoveryError),
}

pub struct Discovery {
    pub tree: ChallengeTree,
    pub defects: Vec<Defect>,
    strict: bool,
}

impl Discovery {
    pub fn report(&mut self, defect: Defect) {
        if self.strict {
            tracing::error!("{}", defect);
        } else {
            tracing::debug!("Skipping: {}", defect);
        }
        self.defects.push(defect);
    }
}

pub fn classify_dir(dir: &Path) -> DirKind {
    let challenge = dir.join(CHALLENGE_FILE);
    let category = dir.join(CATEGORY_FILE);
    for file in [&challenge, &category] {
        if file.exists() && !file.is_file() {
            return DirKind::Malformed(format!("{} is not a file", file.display()));
        }
    }
    match (challenge.is_file(), category.is_file()) {
        (true, true) => DirKind::Malformed(format!(
            "contains both {} and {}",
            CHALLENGE_FILE, CATEGORY_FILE
        )),
        (true, false) => DirKind::Challenge,
        (false, true) => DirKind::Category,
        (false, false) => DirKind::Neither,
    }
}

fn is_opaque(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_some_and(|t| t.is_dir())
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| OPAQUE_DIRS.contains(&name))
}

fn challenge_walker(root: &Path) -> ignore::Walk {
    WalkBuilder::new(root)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| !is_opaque(entry))
        .build()
}

fn classify_entry(
    entry: Result<DirEntry, ignore::Error>,
) -> Loaded<Option<(PathBuf, DirKind)>> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) if e.depth().unwrap_or(0) == 0 => return Loaded::Fatal(e.into()),
        Err(e) => {
            return Loaded::Skipped(Defect::WalkFailed {
                reason: error_chain(&e),
            });
        }
    };
    if !entry.file_type().is_some_and(|t| t.is_dir()) {
        return Loaded::Ok(None);
    }
    match classify_dir(entry.path()) {
        DirKind::Malformed(reason) => Loaded::Skipped(Defect::Malformed {
            path: entry.into_path(),
            reason,
        }),
        kind => Loaded::Ok(Some((entry.into_path(), kind))),
    }
}

fn load_category(dir: &Path) -> Loaded<Category> {
    match load_category_config(&dir.join(CATEGORY_FILE)) {
        Ok(record) => Loaded::Ok(Category {
            id: record.id,
            name: record.name,
            banner: record.banner,
            dir: dir.to_path_buf(),
            children: vec![],
        }),
        Err(e) => load_failed(dir, &e),
    }
}

fn load_failed<T>(dir: &Path, error: &dyn std::error::Error) -> Loaded<T> {
    Loaded::Skipped(Defect::LoadFailed {
        path: dir.to_path_buf(),
        reason: error_chain(error),
    })
}

/// Heading of the README section that is shown to players
const DESCRIPTION_HEADING: &str = "## Description";

/// Text below the description heading of a README, up to the next `##`
/// heading. The rest of the README holds solution details and stays private.
fn readme_description(readme: &str) -> Option<String> {
    let mut lines = readme.lines();
    lines.find(|line| line.trim_end() == DESCRIPTION_HEADING)?;
    let section: Vec<&str> = lines.take_while(|line| !line.starts_with("##")).collect();
    Some(section.join("\n").trim().to_string())
}

fn load_challenges(dir: &Path) -> Loaded<Vec<Challenge>> {
    let records = match load_challenge_config(&dir.join(CHALLENGE_FILE)) {
        Ok(records) => records,
        Err(e) => return load_failed(dir, &e),
    };
    let handouts = match index_handouts(&dir.join(HANDOUT_DIR)) {
        Ok(handouts) => handouts,
        Err(e) => return load_failed(dir, &e),
    };
    let source = dir.join(SOURCE_DIR);
    let hosted = source.join(RUN_SCRIPT).exists() || source.join(DESTROY_SCRIPT).exists();
    let readme = std::fs::read_to_string(dir.join(README_FILE))
        .ok()
        .and_then(|readme| readme_description(&readme));

    Loaded::Ok(
        records
            .into_iter()
            .map(|record| Challenge {
                id: record.id,
                name: record.name,
                difficulty: record.difficulty,
                value: record.value,
                flags: record.flags,
                legacy: record.legacy,
                dynamic_flag: record.dynamic_flag,
                connection_strings: record.connection_strings,
                description: record
                    .description
                    .or_else(|| readme.clone())
                    .unwrap_or_default(),
                dir: dir.to_path_buf(),
                hosted,
                port: None,
                handouts: handouts.clone(),
                category: None,
            })
            .collect(),
    )
}

/// A hosted challenge needs both scripts.
fn missing_script(challenge: &Challenge) -> Option<Defect> {
    if !challenge.hosted {
        return None;
    }
    [
        (RUN_SCRIPT, challenge.run_script()),
        (DESTROY_SCRIPT, challenge.destroy_script()),
    ]
    .into_iter()
    .find(|(_, path)| !path.exists())
    .map(|(script, _)| Defect::MissingScript {
        challenge: challenge.name.clone(),
        script: script.to_string(),
    })
}

/// Builds the challenge tree below `root`.
///
/// Categories are loaded and linked before any challenge, so linking never
/// depends on the order the filesystem returns entries in. Broken
/// directories are recorded as defects and skipped; only a failure to read
/// `root` itself is returned as an error.
pub fn discover(root: &Path, strict: bool) -> Result<Discovery, DiscoveryError> {
    // Scripts run with their own working directory, so every path must be absolute
    let root = match root.canonicalize() {
        Ok(root) if root.is_dir() => root,
        _ => return Err(DiscoveryError::NotADirectory(root.to_path_buf())),
    };
    let root = root.as_path();
    let mut discovery = Discovery {
        tree: ChallengeTree::default(),
        defects: vec![],
        strict,
    };
    let mut registry = IdentityRegistry::new();

    let mut category_dirs = vec![];
    let mut challenge_dirs = vec![];
    for entry in challenge_walker(root) {
        match classify_entry(entry) {
            Loaded::Ok(Some((path, DirKind::Category))) => category_dirs.push(path),
            Loaded::Ok(Some((path, DirKind::Challenge))) => challenge_dirs.push(path),
            Loaded::Ok(_) => {}
            Loaded::Skipped(defect) => discovery.report(defect),
            Loaded::Fatal(e) => return Err(e),
        }
    }

    let mut category_by_dir: HashMap<PathBuf, usize> = HashMap::new();
    for dir in category_dirs {
        match load_category(&dir) {
            Loaded::Ok(category) => {
                let idx = discovery.tree.categories.len();
                if let Err(first) = registry.register(&category.id, Node::Category(idx), &dir) {
                    discovery.report(Defect::DuplicateIdentity {
                        id: category.id,
                        path: dir,
                        first,
                    });
                    continue;
                }
                discovery.tree.add_category(category);
                category_by_dir.insert(dir, idx);
            }
            Loaded::Skipped(defect) => discovery.report(defect),
            Loaded::Fatal(e) => return Err(e),
        }
    }
    for idx in 0..discovery.tree.categories.len() {
        let parent = discovery.tree.categories[idx]
            .dir
            .parent()
            .and_then(|p| category_by_dir.get(p))
            .copied();
        discovery.tree.link(Node::Category(idx), parent);
    }

    for dir in challenge_dirs {
        let parent_dir = dir.parent().unwrap_or(root).to_path_buf();
        let parent = category_by_dir.get(&parent_dir).copied();
        let challenges = match load_challenges(&dir) {
            Loaded::Ok(challenges) => challenges,
            Loaded::Skipped(defect) => {
                discovery.report(defect);
                continue;
            }
            Loaded::Fatal(e) => return Err(e),
        };
        for challenge in challenges {
            let idx = discovery.tree.challenges.len();
            if let Err(first) = registry.register(&challenge.id, Node::Challenge(idx), &dir) {
                discovery.report(Defect::DuplicateIdentity {
                    id: challenge.id,
                    path: dir.clone(),
                    first,
                });
                continue;
            }
            if parent.is_none() {
                discovery.report(Defect::Orphaned {
                    challenge: challenge.name.clone(),
                    path: parent_dir.clone(),
                });
            }
            if let Some(defect) = missing_script(&challenge) {
                discovery.report(defect);
            }
            let idx = discovery.tree.add_challenge(challenge);
            discovery.tree.link(Node::Challenge(idx), parent);
        }
    }

    tracing::debug!(
        "Discovered {} challenges and {} categories ({} ids)",
        discovery.tree.challenges.len(),
        discovery.tree.categories.len(),
        registry.len()
    );
    Ok(discovery)
}
