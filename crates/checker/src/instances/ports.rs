// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::repo::challenges::ChallengeTree;

pub const DEFAULT_PORTS: RangeInclusive<u16> = 4000..=4999;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Port range {start}-{end} is exhausted")]
pub struct PortsExhausted {
    pub start: u16,
    pub end: u16,
}

/// Hands out ports from a fixed range, one per deployment path.
///
/// Ports are never returned to the pool, so two different deployment paths
/// can not share a port during the lifetime of the pool.
#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    // u32 so that an `end` of u16::MAX can not overflow
    next: u32,
    assigned: HashMap<PathBuf, u16>,
}

impl PortPool {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        PortPool {
            next: u32::from(*range.start()),
            range,
            assigned: HashMap::new(),
        }
    }

    /// Returns the port of `deployment`, drawing a new one on first use.
    pub fn allocate(&mut self, deployment: &Path) -> Result<u16, PortsExhausted> {
        if let Some(port) = self.assigned.get(deployment) {
            return Ok(*port);
        }
        if self.next > u32::from(*self.range.end()) {
            return Err(PortsExhausted {
                start: *self.range.start(),
                end: *self.range.end(),
            });
        }
        let port = self.next as u16;
        self.next += 1;
        self.assigned.insert(deployment.to_path_buf(), port);
        Ok(port)
    }
}

impl Default for PortPool {
    fn default() -> Self {
        PortPool::new(DEFAULT_PORTS)
    }
}

/// Assigns ports to every hosted challenge in ascending id order.
pub fn allocate_ports(tree: &mut ChallengeTree, pool: &mut PortPool) -> Result<(), PortsExhausted> {
    for idx in tree.ordered_challenges() {
        let challenge = &mut tree.challenges[idx];
        if !challenge.hosted {
            continue;
        }
        let port = pool.allocate(&challenge.deployment_path())?;
        tracing::debug!("Assigned port {} to {}", port, challenge.name);
        challenge.port = Some(port);
    }
    Ok(())
}

/// A `START-END` port range as accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRange(pub RangeInclusive<u16>);

impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected START-END, got {s}"))?;
        let start: u16 = start
            .trim()
            .parse()
            .map_err(|e| format!("invalid start port: {e}"))?;
        let end: u16 = end
            .trim()
            .parse()
            .map_err(|e| format!("invalid end port: {e}"))?;
        if start > end {
            return Err(format!("start port {start} is above end port {end}"));
        }
        Ok(PortRange(start..=end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::challenges::test_challenge;

    #[test]
    fn test_same_path_same_port() {
        let mut pool = PortPool::default();
        let first = pool.allocate(Path::new("web/chal/Source")).unwrap();
        let second = pool.allocate(Path::new("web/chal/Source")).unwrap();
        let other = pool.allocate(Path::new("web/other/Source")).unwrap();
        assert_eq!(first, 4000);
        assert_eq!(second, 4000);
        assert_eq!(other, 4001);
        assert_eq!(pool.assigned.len(), 2);
    }

    #[test]
    fn test_exhaustion_does_not_wrap() {
        let mut pool = PortPool::new(4000..=4001);
        pool.allocate(Path::new("a")).unwrap();
        pool.allocate(Path::new("b")).unwrap();
        assert_eq!(
            pool.allocate(Path::new("c")),
            Err(PortsExhausted {
                start: 4000,
                end: 4001
            })
        );
        // Known paths still resolve after exhaustion
        assert_eq!(pool.allocate(Path::new("a")), Ok(4000));
        assert_eq!(pool.allocate(Path::new("c")).unwrap_err().end, 4001);
    }

    #[test]
    fn test_range_ending_at_max_port() {
        let mut pool = PortPool::new(u16::MAX..=u16::MAX);
        assert_eq!(pool.allocate(Path::new("a")), Ok(u16::MAX));
        assert!(pool.allocate(Path::new("b")).is_err());
    }

    #[test]
    fn test_allocation_follows_id_order() {
        let mut tree = ChallengeTree::default();
        for (id, dir) in [("b", "web/chal"), ("c", "web/solo"), ("a", "web/chal"), ("d", "misc/static")] {
            let mut challenge = test_challenge(id, Path::new(dir));
            challenge.hosted = id != "d";
            tree.add_challenge(challenge);
        }

        let mut pool = PortPool::default();
        allocate_ports(&mut tree, &mut pool).unwrap();
        let ports: Vec<_> = tree.challenges.iter().map(|c| (c.id.as_str(), c.port)).collect();
        assert_eq!(
            ports,
            vec![
                ("b", Some(4000)),
                ("c", Some(4001)),
                ("a", Some(4000)),
                ("d", None),
            ]
        );
    }

    #[test]
    fn test_allocate_ports_propagates_exhaustion() {
        let mut tree = ChallengeTree::default();
        for id in ["a", "b"] {
            let mut challenge = test_challenge(id, Path::new(id));
            challenge.hosted = true;
            tree.add_challenge(challenge);
        }
        let mut pool = PortPool::new(4000..=4000);
        assert!(allocate_ports(&mut tree, &mut pool).is_err());
        assert_eq!(tree.challenges[0].port, Some(4000));
    }

    #[test]
    fn test_parse_port_range() {
        assert_eq!("4000-4999".parse::<PortRange>(), Ok(PortRange(4000..=4999)));
        assert!("4999-4000".parse::<PortRange>().is_err());
        assert!("4000".parse::<PortRange>().is_err());
        assert!("a-b".parse::<PortRange>().is_err());
    }
}
