//! Command execution inside the target's kernel namespaces.

use crate::logger::FaultLogger;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[cfg(test)]
use mockall::automock;

/// Execution sink: runs one shell string to completion, returns the signed
/// exit status (negative when the command died to a signal).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> i32;
}

/// Default runner: hands the string to `sh -c` and blocks the calling task
/// until it finishes.
#[derive(Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> i32 {
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
        {
            Ok(status) => exit_code(status),
            Err(err) => {
                error!("failed to spawn shell for '{}': {}", command, err);
                -1
            }
        }
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Which namespaces a command re-enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Interface work: network and PID namespaces.
    Link,
    /// Process work: network, PID and cgroup namespaces.
    Node,
}

impl NamespaceScope {
    fn prefix(self, pid: u32) -> String {
        match self {
            NamespaceScope::Link => format!("nsenter --target {pid} --net --pid"),
            NamespaceScope::Node => format!("nsenter --target {pid} --net --pid --cgroup"),
        }
    }
}

/// Runs synthesized commands in the target namespace and reports every
/// activation/deactivation to the fault logger.
pub struct NamespaceExecutor {
    ns_pid: Option<u32>,
    scope: NamespaceScope,
    logger: Arc<dyn FaultLogger>,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for NamespaceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceExecutor")
            .field("ns_pid", &self.ns_pid)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl NamespaceExecutor {
    pub fn new(
        ns_pid: Option<u32>,
        scope: NamespaceScope,
        logger: Arc<dyn FaultLogger>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            ns_pid,
            scope,
            logger,
            runner,
        }
    }

    /// Prefix a command with the namespace entry and make every later stage
    /// of a `|` pipeline or `;` sequence re-enter the same namespace.
    /// Without the stage rewrite, everything after the first `|` or `;`
    /// would run against the host's `/dev/stdin`, `/proc` and cgroup view.
    pub fn rewrite(&self, command: &str) -> String {
        let Some(pid) = self.ns_pid else {
            return command.to_string();
        };
        let prefix = self.scope.prefix(pid);
        format!("{prefix} {command}")
            .replace('|', &format!("| {prefix}"))
            .replace(';', &format!("; {prefix}"))
    }

    /// Run `command` (if any) and record the fault state change.
    ///
    /// `enable` distinguishes activation from deactivation for the logger.
    /// A `None` command performs only the logger calls; degradation steps
    /// and self-terminating stress runs use it as a teardown marker.
    /// Command failure is recorded, never raised: the timeline continues.
    pub async fn execute(
        &self,
        command: Option<&str>,
        enable: bool,
        tag: &str,
        kind: &str,
    ) -> i32 {
        let Some(command) = command else {
            if enable {
                self.logger
                    .set_fault_active(tag, kind, "dummy command, no action taken", 0);
            } else {
                self.logger.set_fault_inactive(tag);
            }
            return 0;
        };

        let full_command = self.rewrite(command);
        debug!("Fault {} executing '{}'", tag, full_command);

        let started = Instant::now();
        let return_code = self.runner.run(&full_command).await;
        let elapsed = started.elapsed();
        if self.scope == NamespaceScope::Node && elapsed > Duration::from_secs(2) {
            warn!(
                "Fault {} command took {:?}; blocking commands can delay the fault timeline",
                tag, elapsed
            );
        }

        if enable {
            self.logger
                .set_fault_active(tag, kind, &full_command, return_code);
        } else {
            self.logger.set_fault_inactive(tag);
        }

        if return_code < 0 {
            debug!(
                "Command '{}' was terminated by signal {}",
                full_command, -return_code
            );
        } else if return_code != 0 {
            debug!(
                "Command '{}' did not terminate correctly (retcode {})",
                full_command, return_code
            );
        } else {
            debug!(
                "Command '{}' terminated correctly (retcode {})",
                full_command, return_code
            );
        }
        return_code
    }
}
