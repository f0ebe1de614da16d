// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod config;
pub mod defects;
pub mod discovery;
pub mod handout;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Deployment sources, contains the `run` and `destroy` scripts
pub const SOURCE_DIR: &str = "Source";
/// Files given to participants
pub const HANDOUT_DIR: &str = "Handout";
/// Test harness
pub const TESTS_DIR: &str = "Tests";

pub const RUN_SCRIPT: &str = "run";
pub const DESTROY_SCRIPT: &str = "destroy";
pub const HARNESS_FILE: &str = "main.py";
pub const WRITEUP_FILE: &str = "Writeup.md";
pub const README_FILE: &str = "README.md";

#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub value: u32,
    /// Flag name -> flag value, iterated in name order
    pub flags: BTreeMap<String, String>,
    pub legacy: bool,
    pub dynamic_flag: bool,
    /// Templates containing `{{PORT}}`, `{{IP}}` or `{{HOST}}`
    pub connection_strings: Vec<String>,
    pub description: String,
    /// Directory holding the challenge configuration
    pub dir: PathBuf,
    pub hosted: bool,
    pub port: Option<u16>,
    /// Paths relative to the handout directory
    pub handouts: Vec<PathBuf>,
    pub category: Option<usize>,
}

impl Challenge {
    pub fn deployment_path(&self) -> PathBuf {
        self.dir.join(SOURCE_DIR)
    }

    pub fn handout_path(&self) -> PathBuf {
        self.dir.join(HANDOUT_DIR)
    }

    pub fn harness_path(&self) -> PathBuf {
        self.dir.join(TESTS_DIR).join(HARNESS_FILE)
    }

    pub fn run_script(&self) -> PathBuf {
        self.deployment_path().join(RUN_SCRIPT)
    }

    pub fn destroy_script(&self) -> PathBuf {
        self.deployment_path().join(DESTROY_SCRIPT)
    }

    pub fn flag_values(&self) -> impl Iterator<Item = &str> + Clone {
        self.flags.values().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub banner: Option<String>,
    pub dir: PathBuf,
    pub children: Vec<Node>,
}

/// Reference to an entry of [`ChallengeTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Challenge(usize),
    Category(usize),
}

#[derive(Debug, Default)]
pub struct ChallengeTree {
    pub challenges: Vec<Challenge>,
    pub categories: Vec<Category>,
    /// Entries without a parent category, in discovery order
    pub roots: Vec<Node>,
}

impl ChallengeTree {
    pub fn add_category(&mut self, category: Category) -> usize {
        self.categories.push(category);
        self.categories.len() - 1
    }

    pub fn add_challenge(&mut self, challenge: Challenge) -> usize {
        self.challenges.push(challenge);
        self.challenges.len() - 1
    }

    /// Appends `node` to the children of `parent`, or to the roots.
    pub fn link(&mut self, node: Node, parent: Option<usize>) {
        if let Node::Challenge(idx) = node {
            self.challenges[idx].category = parent;
        }
        match parent {
            Some(parent) => self.categories[parent].children.push(node),
            None => self.roots.push(node),
        }
    }

    pub fn category_of(&self, challenge: &Challenge) -> Option<&Category> {
        challenge.category.map(|idx| &self.categories[idx])
    }

    /// Challenge indices sorted by ascending identity.
    pub fn ordered_challenges(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.challenges.len()).collect();
        indices.sort_by(|a, b| self.challenges[*a].id.cmp(&self.challenges[*b].id));
        indices
    }

    /// Visits the tree depth-first, calling `f` with each node and its depth.
    pub fn walk(&self, f: &mut dyn FnMut(Node, usize)) {
        fn visit(tree: &ChallengeTree, node: Node, depth: usize, f: &mut dyn FnMut(Node, usize)) {
            f(node, depth);
            if let Node::Category(idx) = node {
                for child in &tree.categories[idx].children {
                    visit(tree, *child, depth + 1, f);
                }
            }
        }
        for root in &self.roots {
            visit(self, *root, 0, f);
        }
    }
}

/// Maps identities to the entity that first claimed them.
///
/// Challenges and categories share one namespace. Lives for a single
/// discovery pass.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    entries: HashMap<String, (Node, PathBuf)>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for `node`. If the id is taken, returns the path of the
    /// entity that holds it and leaves the registry unchanged.
    pub fn register(&mut self, id: &str, node: Node, path: &Path) -> Result<(), PathBuf> {
        if let Some((_, first)) = self.entries.get(id) {
            return Err(first.clone());
        }
        self.entries
            .insert(id.to_string(), (node, path.to_path_buf()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
pub(crate) fn test_challenge(id: &str, dir: &Path) -> Challenge {
    Challenge {
        id: id.to_string(),
        name: id.to_string(),
        difficulty: "easy".to_string(),
        value: 100,
        flags: BTreeMap::from([("flag".to_string(), format!("CTF{{{id}}}"))]),
        legacy: true,
        dynamic_flag: false,
        connection_strings: vec![],
        description: String::new(),
        dir: dir.to_path_buf(),
        hosted: false,
        port: None,
        handouts: vec![],
        category: None,
    }
}
