// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::convert::Infallible;
use std::str::FromStr;

use crate::repo::challenges::ChallengeTree;

/// Which challenges a command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Lowercase name substrings, any of which selects a challenge
    Names(Vec<String>),
}

impl FromStr for Selection {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<String> = s
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        if names.iter().any(|name| name == "*") {
            return Ok(Selection::All);
        }
        Ok(Selection::Names(names))
    }
}

impl Selection {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Names(names) => {
                let name = name.to_lowercase();
                names.iter().any(|wanted| name.contains(wanted.as_str()))
            }
        }
    }

    /// Indices of the selected challenges in ascending identity order.
    pub fn resolve(&self, tree: &ChallengeTree) -> Vec<usize> {
        tree.ordered_challenges()
            .into_iter()
            .filter(|&idx| self.matches(&tree.challenges[idx].name))
            .collect()
    }
}
