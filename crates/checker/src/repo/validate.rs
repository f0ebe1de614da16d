// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashSet;

use uuid::Uuid;

use crate::repo::challenges::defects::Defect;
use crate::repo::challenges::handout::find_flag_leaks;
use crate::repo::challenges::{Challenge, ChallengeTree, WRITEUP_FILE};

fn validate_challenge(challenge: &Challenge, all_flags: &[&str], defects: &mut Vec<Defect>) {
    if Uuid::parse_str(&challenge.id).is_err() {
        defects.push(Defect::InvalidIdentity {
            id: challenge.id.clone(),
            name: challenge.name.clone(),
        });
    }
    let writeup = challenge.dir.join(WRITEUP_FILE);
    if !writeup.is_file() {
        defects.push(Defect::MissingWriteup {
            challenge: challenge.name.clone(),
            path: writeup,
        });
    }
    if challenge.hosted && !challenge.harness_path().is_file() {
        defects.push(Defect::MissingHarness {
            challenge: challenge.name.clone(),
        });
    }
    for leak in find_flag_leaks(&challenge.handout_path(), all_flags.iter().copied()) {
        defects.push(Defect::FlagInHandout {
            challenge: challenge.name.clone(),
            path: leak.path,
            line: leak.line,
        });
    }
}

/// Checks that go beyond what discovery needs to build the tree.
///
/// Every handout is searched for the flags of all challenges, not just its
/// own. Challenges sharing a directory are checked once per identity, but
/// the writeup and handout of a directory are only reported once.
pub fn validate_tree(tree: &ChallengeTree) -> Vec<Defect> {
    let mut defects = vec![];
    let mut all_flags: Vec<&str> = tree
        .challenges
        .iter()
        .flat_map(|challenge| challenge.flag_values())
        .collect();
    all_flags.sort_unstable();
    all_flags.dedup();
    for category in &tree.categories {
        if Uuid::parse_str(&category.id).is_err() {
            defects.push(Defect::InvalidIdentity {
                id: category.id.clone(),
                name: category.name.clone(),
            });
        }
    }
    let mut seen_dirs = HashSet::new();
    for idx in tree.ordered_challenges() {
        let challenge = &tree.challenges[idx];
        let mut found = vec![];
        validate_challenge(challenge, &all_flags, &mut found);
        let first_in_dir = seen_dirs.insert(challenge.dir.clone());
        defects.extend(found.into_iter().filter(|defect| {
            first_in_dir
                || !matches!(
                    defect,
                    Defect::MissingWriteup { .. } | Defect::FlagInHandout { .. }
                )
        }));
    }
    defects
}
