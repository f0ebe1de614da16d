// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::ffi::OsString;
use std::process::Stdio;

use tokio::process::Command;

use crate::instances::ports::{PortPool, PortsExhausted};
use crate::instances::results::{TestReport, parse_harness_output};
use crate::repo::challenges::{Challenge, TESTS_DIR};
use crate::utils::{connect_host, substitute_placeholders};

pub mod ports;
pub mod results;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interface the deployment scripts bind to
    pub interface: String,
    /// Silence script output
    pub quiet: bool,
    /// Program (and arguments) the test harness is launched with
    pub test_runner: Vec<String>,
    pub force_reusability: bool,
}

/// Drives challenges through their run, test and stop scripts.
///
/// Every call waits for the script it launches, so start, verify and stop of
/// one challenge never overlap.
pub struct Lifecycle {
    config: LifecycleConfig,
}

fn flag_args(challenge: &Challenge) -> Vec<String> {
    challenge
        .flag_values()
        .flat_map(|flag| ["--flag".to_string(), flag.to_string()])
        .collect()
}

pub fn start_args(challenge: &Challenge, interface: &str, port: u16) -> Vec<String> {
    let mut args = vec![
        "--hostname".to_string(),
        interface.to_string(),
        "--port".to_string(),
        port.to_string(),
    ];
    args.extend(flag_args(challenge));
    args
}

/// Connection strings handed to the test harness. Empty for challenges
/// that are not hosted.
pub fn connection_strings(challenge: &Challenge, interface: &str) -> Vec<String> {
    if !challenge.hosted {
        return vec![];
    }
    let host = connect_host(interface);
    challenge
        .connection_strings
        .iter()
        .map(|template| substitute_placeholders(template, host, challenge.port))
        .collect()
}

pub fn harness_args(
    challenge: &Challenge,
    interface: &str,
    force_reusability: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = flag_args(challenge).into_iter().map(OsString::from).collect();
    args.push("--handout-path".into());
    args.push(challenge.handout_path().into_os_string());
    args.push("--deployment-path".into());
    args.push(challenge.deployment_path().into_os_string());
    for connection_string in connection_strings(challenge, interface) {
        args.push("--connection-string".into());
        args.push(connection_string.into());
    }
    if force_reusability {
        args.push("--force-reusability".into());
    }
    args
}

impl Lifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Lifecycle { config }
    }

    fn script_output(&self) -> Stdio {
        if self.config.quiet {
            Stdio::null()
        } else {
            Stdio::inherit()
        }
    }

    /// Launches the run script, allocating a port first if needed.
    ///
    /// The exit status of the script is not checked, the test harness is
    /// responsible for telling whether the deployment works.
    pub async fn start(
        &self,
        challenge: &mut Challenge,
        pool: &mut PortPool,
    ) -> Result<(), PortsExhausted> {
        if !challenge.hosted {
            tracing::debug!("{} is not hosted, nothing to start", challenge.name);
            return Ok(());
        }
        let port = match challenge.port {
            Some(port) => port,
            None => {
                let port = pool.allocate(&challenge.deployment_path())?;
                challenge.port = Some(port);
                port
            }
        };
        tracing::info!(
            "Starting {} on {}:{}",
            challenge.name,
            self.config.interface,
            port
        );
        let status = Command::new(challenge.run_script())
            .args(start_args(challenge, &self.config.interface, port))
            .current_dir(challenge.deployment_path())
            .stdin(Stdio::null())
            .stdout(self.script_output())
            .stderr(self.script_output())
            .status()
            .await;
        match status {
            Ok(status) if !status.success() => {
                tracing::debug!("Run script of {} exited with {}", challenge.name, status)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to launch run script of {}: {}", challenge.name, e),
        }
        Ok(())
    }

    /// Launches the destroy script. Errors are logged and otherwise ignored.
    pub async fn stop(&self, challenge: &Challenge) {
        if !challenge.hosted {
            tracing::debug!("{} is not hosted, nothing to stop", challenge.name);
            return;
        }
        tracing::info!("Stopping {}", challenge.name);
        let status = Command::new(challenge.destroy_script())
            .current_dir(challenge.deployment_path())
            .stdin(Stdio::null())
            .stdout(self.script_output())
            .stderr(self.script_output())
            .status()
            .await;
        if let Err(e) = status {
            tracing::warn!(
                "Failed to launch destroy script of {}: {}",
                challenge.name,
                e
            );
        }
    }

    /// Runs the test harness of `challenge` and collects its checks.
    ///
    /// Launch failures, harness stderr and unparseable output end up as
    /// warnings on the report; without checks the report counts as missing
    /// tests.
    pub async fn verify(&self, challenge: &Challenge) -> TestReport {
        let mut report = TestReport::new(&challenge.name);
        let harness = challenge.harness_path();
        if !harness.is_file() {
            report
                .warnings
                .push(format!("No test harness at {}", harness.display()));
            return report;
        }
        let Some((program, runner_args)) = self.config.test_runner.split_first() else {
            report.warnings.push("Test runner command is empty".to_string());
            return report;
        };

        tracing::info!("Testing {}", challenge.name);
        let output = Command::new(program)
            .args(runner_args)
            .arg(&harness)
            .args(harness_args(
                challenge,
                &self.config.interface,
                self.config.force_reusability,
            ))
            .current_dir(challenge.dir.join(TESTS_DIR))
            .stdin(Stdio::null())
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                report
                    .warnings
                    .push(format!("Failed to launch test harness: {}", e));
                return report;
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            report.warnings.push(stderr.trim().to_string());
        }
        if !output.status.success() {
            report
                .warnings
                .push(format!("Test harness exited with {}", output.status));
        }
        match parse_harness_output(&String::from_utf8_lossy(&output.stdout)) {
            Ok(checks) => report.checks = checks,
            Err(e) => report.warnings.push(e.to_string()),
        }
        report
    }

    /// Start, verify and stop one challenge, strictly in that order.
    pub async fn run_test(
        &self,
        challenge: &mut Challenge,
        pool: &mut PortPool,
    ) -> Result<TestReport, PortsExhausted> {
        self.start(challenge, pool).await?;
        let report = self.verify(challenge).await;
        self.stop(challenge).await;
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use crate::instances::results::Verdict;
    use crate::repo::challenges::test_challenge;

    fn write_script(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(LifecycleConfig {
            interface: "0.0.0.0".to_string(),
            quiet: true,
            test_runner: vec!["sh".to_string()],
            force_reusability: false,
        })
    }

    #[test]
    fn test_start_args_for_multiple_flags() {
        let mut challenge = test_challenge("b", Path::new("web/chal"));
        challenge.flags = BTreeMap::from([
            ("F2".to_string(), "ctf{z}".to_string()),
            ("F1".to_string(), "ctf{y}".to_string()),
        ]);
        assert_eq!(
            start_args(&challenge, "0.0.0.0", 4000),
            vec![
                "--hostname", "0.0.0.0", "--port", "4000", "--flag", "ctf{y}", "--flag", "ctf{z}"
            ]
        );
    }

    #[test]
    fn test_connection_strings() {
        let mut challenge = test_challenge("a", Path::new("web/chal"));
        challenge.connection_strings = vec![
            "nc {{IP}} {{PORT}}".to_string(),
            "http://{{HOST}}:{{PORT}}".to_string(),
        ];
        challenge.port = Some(4000);
        assert!(connection_strings(&challenge, "0.0.0.0").is_empty());

        challenge.hosted = true;
        assert_eq!(
            connection_strings(&challenge, "0.0.0.0"),
            vec!["nc 127.0.0.1 4000", "http://127.0.0.1:4000"]
        );
        assert_eq!(
            connection_strings(&challenge, "172.18.0.1"),
            vec!["nc 172.18.0.1 4000", "http://172.18.0.1:4000"]
        );
    }

    #[tokio::test]
    async fn test_unhosted_challenge_is_only_verified() {
        let dir = tempfile::tempdir().unwrap();
        let mut challenge = test_challenge("sqlinj", dir.path());
        challenge.connection_strings = vec!["nc {{IP}} {{PORT}}".to_string()];
        write_script(
            &challenge.harness_path(),
            "printf '%s\\n' \"$@\" > args.txt\necho '{\"DEPLOYMENT_WORKING\": \"\"}'\n",
        );

        let mut pool = PortPool::default();
        let report = lifecycle().run_test(&mut challenge, &mut pool).await.unwrap();
        assert_eq!(challenge.port, None);
        assert_eq!(report.verdict(), Verdict::Pass);

        let args = std::fs::read_to_string(dir.path().join("Tests/args.txt")).unwrap();
        assert!(args.contains("--handout-path"));
        assert!(!args.contains("--connection-string"));
    }

    #[tokio::test]
    async fn test_run_verify_stop_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut challenge = test_challenge("b", dir.path());
        challenge.hosted = true;
        challenge.flags = BTreeMap::from([
            ("F1".to_string(), "ctf{y}".to_string()),
            ("F2".to_string(), "ctf{z}".to_string()),
        ]);
        challenge.connection_strings = vec!["nc {{IP}} {{PORT}}".to_string()];
        write_script(&challenge.run_script(), "#!/bin/sh\necho \"$@\" > started\n");
        write_script(&challenge.destroy_script(), "#!/bin/sh\ntouch stopped\n");
        write_script(
            &challenge.harness_path(),
            r#"
started=$([ -f ../Source/started ] && echo "" || echo "not started")
stopped=$([ -f ../Source/stopped ] && echo "stopped too early" || echo "")
echo "connection: $*" >&2
echo "{\"STARTED\": \"$started\", \"RUNNING\": \"$stopped\"}"
"#,
        );

        let mut pool = PortPool::default();
        let report = lifecycle().run_test(&mut challenge, &mut pool).await.unwrap();
        assert_eq!(challenge.port, Some(4000));
        assert_eq!(report.verdict(), Verdict::Pass, "{:?}", report);
        assert!(report.warnings.iter().any(|w| w.contains("nc 127.0.0.1 4000")));

        let started = std::fs::read_to_string(dir.path().join("Source/started")).unwrap();
        assert_eq!(
            started.trim(),
            "--hostname 0.0.0.0 --port 4000 --flag ctf{y} --flag ctf{z}"
        );
        assert!(dir.path().join("Source/stopped").exists());
    }

    #[tokio::test]
    async fn test_failed_check_and_missing_harness() {
        let dir = tempfile::tempdir().unwrap();
        let challenge = test_challenge("bof", dir.path());
        let report = lifecycle().verify(&challenge).await;
        assert_eq!(report.verdict(), Verdict::MissingTests);

        write_script(
            &challenge.harness_path(),
            "echo '{\"DEPLOYMENT_WORKING\": \"\", \"FLAG_CORRECT\": \"Flag not found in output\"}'\n",
        );
        let report = lifecycle().verify(&challenge).await;
        assert_eq!(report.verdict(), Verdict::Fail);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_broken_run_script_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut challenge = test_challenge("broken", dir.path());
        challenge.hosted = true;
        write_script(&challenge.run_script(), "#!/bin/sh\nexit 3\n");

        let mut pool = PortPool::default();
        let report = lifecycle().run_test(&mut challenge, &mut pool).await.unwrap();
        assert_eq!(report.verdict(), Verdict::MissingTests);
    }
}
