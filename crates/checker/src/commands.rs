// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use colored::Colorize;

use crate::instances::ports::{PortPool, PortsExhausted};
use crate::instances::results::{TestReport, Verdict};
use crate::instances::{Lifecycle, connection_strings};
use crate::platform::publish::{PartReport, Publisher};
use crate::platform::{ScoringPlatform, Visibility};
use crate::repo::challenges::defects::Defect;
use crate::repo::challenges::{Challenge, ChallengeTree, Node};
use crate::repo::validate::validate_tree;
use crate::selection::Selection;

const UNCATEGORIZED: &str = "Uncategorized";

fn challenge_details(challenge: &Challenge) -> String {
    let mut details = vec![
        challenge.difficulty.clone(),
        format!("{} points", challenge.value),
    ];
    match (challenge.hosted, challenge.port) {
        (true, Some(port)) => details.push(format!("hosted on port {}", port)),
        (true, None) => details.push("hosted".to_string()),
        (false, _) => {}
    }
    if !challenge.handouts.is_empty() {
        details.push("handout".to_string());
    }
    details.join(", ")
}

pub fn list_challenges(tree: &ChallengeTree) {
    tree.walk(&mut |node, depth| {
        let indent = "  ".repeat(depth);
        match node {
            Node::Category(idx) => {
                let category = &tree.categories[idx];
                println!(
                    "{}{} {}",
                    indent,
                    category.name.bold(),
                    format!("[{}]", category.id).dimmed()
                );
            }
            Node::Challenge(idx) => {
                let challenge = &tree.challenges[idx];
                println!(
                    "{}{} {} ({})",
                    indent,
                    challenge.name,
                    format!("[{}]", challenge.id).dimmed(),
                    challenge_details(challenge)
                );
            }
        }
    });
}

pub fn list_categories(tree: &ChallengeTree) {
    tree.walk(&mut |node, depth| {
        if let Node::Category(idx) = node {
            let category = &tree.categories[idx];
            let challenges = category
                .children
                .iter()
                .filter(|child| matches!(child, Node::Challenge(_)))
                .count();
            print!("{}{} ({} challenges)", "  ".repeat(depth), category.name.bold(), challenges);
            match &category.banner {
                Some(banner) => println!(" {}", format!("banner: {}", banner).dimmed()),
                None => println!(),
            }
        }
    });
}

struct FlagRow<'a> {
    label: String,
    flag: &'a str,
    dynamic: bool,
}

fn flag_rows(tree: &ChallengeTree) -> Vec<FlagRow<'_>> {
    let mut rows = vec![];
    for idx in tree.ordered_challenges() {
        let challenge = &tree.challenges[idx];
        for (name, flag) in &challenge.flags {
            let label = if challenge.legacy {
                challenge.name.clone()
            } else {
                format!("{} ({})", challenge.name, name)
            };
            rows.push(FlagRow {
                label,
                flag,
                dynamic: challenge.dynamic_flag,
            });
        }
    }
    rows
}

/// Width of the label column, in characters since that is what `{:width$}` pads to.
fn label_width(rows: &[FlagRow]) -> usize {
    rows.iter()
        .map(|row| row.label.chars().count())
        .max()
        .unwrap_or(0)
}

/// Prints every flag, one per line, with the challenge names aligned.
pub fn dump_flags(tree: &ChallengeTree) {
    let rows = flag_rows(tree);
    let width = label_width(&rows);
    for row in rows {
        if row.dynamic {
            println!(
                "{:width$}  {} {}",
                row.label,
                row.flag.green(),
                "(dynamic)".yellow()
            );
        } else {
            println!("{:width$}  {}", row.label, row.flag.green());
        }
    }
}

pub fn list_handouts(tree: &ChallengeTree) {
    for idx in tree.ordered_challenges() {
        let challenge = &tree.challenges[idx];
        if challenge.handouts.is_empty() {
            continue;
        }
        println!("{}", challenge.name.bold());
        for file in &challenge.handouts {
            println!("  {}", file.display());
        }
    }
}

fn selected(tree: &ChallengeTree, selection: &Selection) -> Vec<usize> {
    let indices = selection.resolve(tree);
    if indices.is_empty() {
        tracing::warn!("No challenge matches {:?}", selection);
    }
    indices
}

pub async fn run(
    tree: &mut ChallengeTree,
    pool: &mut PortPool,
    lifecycle: &Lifecycle,
    selection: &Selection,
    interface: &str,
) -> Result<(), PortsExhausted> {
    for idx in selected(tree, selection) {
        let challenge = &mut tree.challenges[idx];
        lifecycle.start(challenge, pool).await?;
        for connection_string in connection_strings(challenge, interface) {
            println!("{}: {}", challenge.name, connection_string.cyan());
        }
    }
    Ok(())
}

pub async fn stop(tree: &ChallengeTree, lifecycle: &Lifecycle, selection: &Selection) {
    for idx in selected(tree, selection) {
        lifecycle.stop(&tree.challenges[idx]).await;
    }
}

fn print_report(report: &TestReport) {
    let verdict = report.verdict();
    let label = match verdict {
        Verdict::Pass => verdict.to_string().green(),
        Verdict::Fail => verdict.to_string().red(),
        Verdict::MissingTests => verdict.to_string().yellow(),
    };
    println!("{} {}", label.bold(), report.challenge);
    for check in &report.checks {
        println!("  {}", check);
    }
    for warning in &report.warnings {
        for line in warning.lines() {
            println!("  {}", line.yellow());
        }
    }
}

/// Runs, verifies and stops every selected challenge. Returns whether all of
/// them passed.
pub async fn test(
    tree: &mut ChallengeTree,
    pool: &mut PortPool,
    lifecycle: &Lifecycle,
    selection: &Selection,
) -> Result<bool, PortsExhausted> {
    let mut passed = 0;
    let mut failed = 0;
    let mut missing = 0;
    let mut all_passed = true;
    for idx in selected(tree, selection) {
        let report = lifecycle.run_test(&mut tree.challenges[idx], pool).await?;
        print_report(&report);
        all_passed &= report.passed();
        match report.verdict() {
            Verdict::Pass => passed += 1,
            Verdict::Fail => failed += 1,
            Verdict::MissingTests => missing += 1,
        }
    }
    println!(
        "\n{} passed, {} failed, {} missing tests",
        passed.to_string().green(),
        failed.to_string().red(),
        missing.to_string().yellow()
    );
    Ok(all_passed)
}

fn print_part(report: &PartReport) {
    if report.succeeded() {
        println!("{} {}", "✓".green(), report.name);
        return;
    }
    println!("{} {}", "✗".red(), report.name);
    match &report.created {
        Ok(id) => println!("  created as {}", id),
        Err(e) => println!("  {} {}", "create failed:".red(), e),
    }
    if let Some(Err(e)) = &report.flag {
        println!("  {} {}", "flag failed:".red(), e);
    }
    for (path, result) in &report.files {
        if let Err(e) = result {
            println!("  {} {}: {}", "file failed:".red(), path.display(), e);
        }
    }
}

/// Uploads the selected challenges. Returns whether every step succeeded.
pub async fn upload(
    tree: &ChallengeTree,
    platform: &dyn ScoringPlatform,
    selection: &Selection,
    public_host: &str,
    visibility: Visibility,
) -> bool {
    let publisher = Publisher::new(platform, public_host, visibility);
    let mut ok = true;
    for idx in selected(tree, selection) {
        let challenge = &tree.challenges[idx];
        let category = tree
            .category_of(challenge)
            .map(|category| category.name.as_str())
            .unwrap_or(UNCATEGORIZED);
        for report in publisher.publish(challenge, category).await {
            print_part(&report);
            ok &= report.succeeded();
        }
    }
    ok
}

/// Validates the tree on top of the defects discovery already found.
/// Returns whether the repository is free of defects.
pub fn check(tree: &ChallengeTree, discovery_defects: &[Defect]) -> bool {
    let defects = validate_tree(tree);
    for defect in &defects {
        tracing::error!("{}", defect);
    }
    let total = discovery_defects.len() + defects.len();
    if total == 0 {
        println!(
            "{} {} challenges, {} categories, no defects",
            "✓".green(),
            tree.challenges.len(),
            tree.categories.len()
        );
        return true;
    }
    println!("{} {} defects found", "✗".red(), total);
    false
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::repo::challenges::test_challenge;

    #[test]
    fn test_challenge_details() {
        let mut challenge = test_challenge("a", Path::new("web/chal"));
        assert_eq!(challenge_details(&challenge), "easy, 100 points");

        challenge.hosted = true;
        challenge.port = Some(4002);
        challenge.handouts = vec!["app.py".into()];
        assert_eq!(
            challenge_details(&challenge),
            "easy, 100 points, hosted on port 4002, handout"
        );
    }

    #[test]
    fn test_flag_labels_align_by_characters() {
        let mut tree = ChallengeTree::default();
        let mut cafe = test_challenge("a", Path::new("web/cafe"));
        cafe.name = "Café".to_string();
        cafe.legacy = false;
        cafe.flags = [("F1".to_string(), "CTF{x}".to_string())].into();
        tree.add_challenge(cafe);
        tree.add_challenge(test_challenge("bof", Path::new("pwn/bof")));

        let rows = flag_rows(&tree);
        let labels: Vec<_> = rows.iter().map(|row| row.label.as_str()).collect();
        assert_eq!(labels, vec!["Café (F1)", "bof"]);
        let width = label_width(&rows);
        assert_eq!(width, 9);
        for row in &rows {
            assert_eq!(format!("{:width$}|", row.label).chars().count(), width + 1);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_test_command_fails_on_missing_tests() {
        use crate::instances::LifecycleConfig;

        let dir = tempfile::tempdir().unwrap();
        let passing = test_challenge("a", &dir.path().join("passing"));
        let harness = passing.harness_path();
        std::fs::create_dir_all(harness.parent().unwrap()).unwrap();
        std::fs::write(&harness, "echo '{\"FLAG_CORRECT\": \"\"}'\n").unwrap();
        let mut untested = test_challenge("b", &dir.path().join("untested"));
        untested.name = "untested".to_string();

        let mut tree = ChallengeTree::default();
        tree.add_challenge(passing);
        tree.add_challenge(untested);
        let lifecycle = Lifecycle::new(LifecycleConfig {
            interface: "0.0.0.0".to_string(),
            quiet: true,
            test_runner: vec!["sh".to_string()],
            force_reusability: false,
        });
        let mut pool = PortPool::default();

        let only_passing: Selection = "a".parse().unwrap();
        assert!(
            test(&mut tree, &mut pool, &lifecycle, &only_passing)
                .await
                .unwrap()
        );
        assert!(
            !test(&mut tree, &mut pool, &lifecycle, &Selection::All)
                .await
                .unwrap()
        );
    }

    #[test]
    fn test_check_counts_discovery_defects() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ChallengeTree::default();
        assert!(check(&tree, &[]));
        let defects = [Defect::MissingScript {
            challenge: "a".to_string(),
            script: "destroy".to_string(),
        }];
        assert!(!check(&tree, &defects));

        let mut tree = ChallengeTree::default();
        tree.add_challenge(test_challenge("not-a-uuid", dir.path()));
        assert!(!check(&tree, &[]));
    }
}
