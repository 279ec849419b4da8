//! Process-scoped fault injection: CPU stress and custom commands.

use crate::cgroup;
use crate::commands::{fill_intensity, placeholder_count, stress_command};
use crate::error::{InjectError, Result};
use crate::executor::{CommandRunner, NamespaceExecutor, NamespaceScope, ShellRunner};
use crate::fault::{FaultPattern, FaultType, Shape, Timing};
use crate::logger::FaultLogger;
use crate::schedule::{self, StepCtx, Surface};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Injects a fault into a process, entering its network, PID and cgroup
/// namespaces.
#[derive(Debug)]
pub struct NodeInjector {
    tag: String,
    ns_pid: u32,
    fault: FaultType,
    pattern: FaultPattern,
    timing: Timing,
    executor: NamespaceExecutor,
}

impl NodeInjector {
    pub fn builder() -> NodeInjectorBuilder {
        NodeInjectorBuilder::default()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub async fn go(&self) -> Result<()> {
        self.run(CancellationToken::new()).await
    }

    /// Run the fault's timeline.
    ///
    /// CPU stress sizes itself against the target's cgroup budget first; if
    /// that budget cannot be discovered the fault aborts before anything is
    /// activated.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let cgroup_fraction = match &self.fault {
            FaultType::StressCpu { .. } => match cgroup::cpu_fraction(self.ns_pid).await {
                Ok(fraction) => fraction,
                Err(err) => {
                    error!(
                        "Fault {} cannot size cpu stress ({}); aborting before activation",
                        self.tag, err
                    );
                    return Err(err);
                }
            },
            _ => 1.0,
        };

        if let (
            FaultType::Custom {
                start: Some(start), ..
            },
            FaultPattern::Degradation { .. },
        ) = (&self.fault, &self.pattern)
        {
            if placeholder_count(start) > 1 {
                error!(
                    "Fault {} activation command has more than one intensity placeholder; \
                     only the first will be substituted",
                    self.tag
                );
            }
        }

        let surface = NodeSurface {
            injector: self,
            cgroup_fraction,
        };
        schedule::drive(&surface, &self.pattern, &self.timing, &cancel).await;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pattern(&self) -> &FaultPattern {
        &self.pattern
    }
}

/// The scheduler-facing half of a node fault, carrying the cgroup budget
/// discovered at the start of the run.
struct NodeSurface<'a> {
    injector: &'a NodeInjector,
    cgroup_fraction: f64,
}

#[async_trait]
impl Surface for NodeSurface<'_> {
    fn tag(&self) -> &str {
        &self.injector.tag
    }

    fn supports(&self, _pattern: &FaultPattern) -> bool {
        true
    }

    async fn activate(&self, ctx: &StepCtx) {
        let injector = self.injector;
        match &injector.fault {
            FaultType::StressCpu { load } => {
                let load = match ctx.shape {
                    Shape::Persistent => *load,
                    Shape::Random(intensity) => intensity,
                };
                let command = stress_command(load, self.cgroup_fraction, ctx.active_for);
                injector
                    .executor
                    .execute(Some(&command), true, &injector.tag, injector.fault.kind())
                    .await;
            }
            FaultType::Custom { start, .. } => {
                let command = start.as_ref().map(|template| match ctx.shape {
                    Shape::Persistent => template.clone(),
                    Shape::Random(intensity) => fill_intensity(template, intensity),
                });
                injector
                    .executor
                    .execute(command.as_deref(), true, &injector.tag, injector.fault.kind())
                    .await;
            }
            // unreachable by construction: the builder refuses link faults
            other => {
                error!(
                    "Fault {} has non-node fault type {}; nothing to activate",
                    injector.tag,
                    other.kind()
                );
            }
        }
    }

    async fn deactivate(&self, _ctx: &StepCtx) {
        let injector = self.injector;
        match &injector.fault {
            // stress-ng self-terminates at -t; this only marks the teardown
            FaultType::StressCpu { .. } => {
                injector
                    .executor
                    .execute(None, false, &injector.tag, injector.fault.kind())
                    .await;
            }
            FaultType::Custom { stop, .. } => {
                injector
                    .executor
                    .execute(stop.as_deref(), false, &injector.tag, injector.fault.kind())
                    .await;
            }
            other => {
                error!(
                    "Fault {} has non-node fault type {}; nothing to deactivate",
                    injector.tag,
                    other.kind()
                );
            }
        }
    }
}

#[derive(Default)]
pub struct NodeInjectorBuilder {
    tag: Option<String>,
    ns_pid: Option<u32>,
    fault: Option<FaultType>,
    pattern: Option<FaultPattern>,
    timing: Timing,
    logger: Option<Arc<dyn FaultLogger>>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl NodeInjectorBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn ns_pid(mut self, ns_pid: u32) -> Self {
        self.ns_pid = Some(ns_pid);
        self
    }

    pub fn fault(mut self, fault: FaultType) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn pattern(mut self, pattern: FaultPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn FaultLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn build(self) -> Result<NodeInjector> {
        let tag = self
            .tag
            .ok_or_else(|| InjectError::Config("node fault needs a tag".into()))?;
        let ns_pid = self
            .ns_pid
            .ok_or_else(|| InjectError::Config("node fault needs a target process".into()))?;
        let fault = self
            .fault
            .ok_or_else(|| InjectError::Config("node fault needs a fault type".into()))?;
        let mut pattern = self
            .pattern
            .ok_or_else(|| InjectError::Config("node fault needs a pattern".into()))?;
        let logger = self
            .logger
            .ok_or_else(|| InjectError::Config("node fault needs a logger handle".into()))?;

        if fault.is_link_fault() {
            return Err(InjectError::Config(format!(
                "fault type {} targets an interface, not a process",
                fault.kind()
            )));
        }

        // stress-ng cannot run shorter than one second per burst.
        if let (FaultType::StressCpu { .. }, FaultPattern::Burst { duration, .. }) =
            (&fault, &mut pattern)
        {
            if *duration < Duration::from_secs(1) {
                *duration = Duration::from_secs(1);
            }
        }

        let executor = NamespaceExecutor::new(
            Some(ns_pid),
            NamespaceScope::Node,
            logger,
            self.runner.unwrap_or_else(|| Arc::new(ShellRunner)),
        );

        Ok(NodeInjector {
            tag,
            ns_pid,
            fault,
            pattern,
            timing: self.timing,
            executor,
        })
    }
}
