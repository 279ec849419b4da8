//! Interface-scoped fault injection.

use crate::commands::{link_commands, Verb};
use crate::error::{InjectError, Result};
use crate::executor::{CommandRunner, NamespaceExecutor, NamespaceScope, ShellRunner};
use crate::fault::{FaultPattern, FaultType, ProtocolTarget, Timing, TrafficFilter};
use crate::logger::FaultLogger;
use crate::schedule::{self, StepCtx, Surface};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Injects one fault into one interface, optionally inside the network
/// namespace of a given process and optionally restricted to a protocol
/// and ports.
#[derive(Debug)]
pub struct LinkInjector {
    tag: String,
    device: String,
    fault: FaultType,
    pattern: FaultPattern,
    filter: TrafficFilter,
    timing: Timing,
    executor: NamespaceExecutor,
}

impl LinkInjector {
    pub fn builder() -> LinkInjectorBuilder {
        LinkInjectorBuilder::default()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Run the fault's timeline to completion.
    pub async fn go(&self) -> Result<()> {
        self.run(CancellationToken::new()).await
    }

    /// Run the fault's timeline, tearing down early if `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        schedule::drive(self, &self.pattern, &self.timing, &cancel).await;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pattern(&self) -> &FaultPattern {
        &self.pattern
    }
}

#[async_trait]
impl Surface for LinkInjector {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn supports(&self, pattern: &FaultPattern) -> bool {
        // Bursts toggle the persistent form, degradations the random form.
        let shape_is_random = matches!(
            pattern,
            FaultPattern::Random { .. } | FaultPattern::Degradation { .. }
        );
        if !shape_is_random {
            return true;
        }
        match self.fault {
            FaultType::Down | FaultType::Bottleneck { .. } => false,
            // The ingress filter rewrite has no probabilistic form.
            FaultType::Redirect { .. } => self.filter.is_any(),
            _ => true,
        }
    }

    async fn activate(&self, ctx: &StepCtx) {
        for command in link_commands(&self.device, &self.fault, ctx.shape, &self.filter, Verb::Add)
        {
            self.executor
                .execute(Some(&command), true, &self.tag, self.fault.kind())
                .await;
        }
    }

    async fn deactivate(&self, ctx: &StepCtx) {
        for command in link_commands(&self.device, &self.fault, ctx.shape, &self.filter, Verb::Del)
        {
            self.executor
                .execute(Some(&command), false, &self.tag, self.fault.kind())
                .await;
        }
    }
}

#[derive(Default)]
pub struct LinkInjectorBuilder {
    tag: Option<String>,
    device: Option<String>,
    ns_pid: Option<u32>,
    fault: Option<FaultType>,
    pattern: Option<FaultPattern>,
    filter: TrafficFilter,
    timing: Timing,
    logger: Option<Arc<dyn FaultLogger>>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl LinkInjectorBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
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

    pub fn filter(mut self, filter: TrafficFilter) -> Self {
        self.filter = filter;
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

    pub fn build(self) -> Result<LinkInjector> {
        let tag = self
            .tag
            .ok_or_else(|| InjectError::Config("link fault needs a tag".into()))?;
        let device = self
            .device
            .ok_or_else(|| InjectError::Config("link fault needs a target interface".into()))?;
        let fault = self
            .fault
            .ok_or_else(|| InjectError::Config("link fault needs a fault type".into()))?;
        let mut pattern = self
            .pattern
            .ok_or_else(|| InjectError::Config("link fault needs a pattern".into()))?;
        let logger = self
            .logger
            .ok_or_else(|| InjectError::Config("link fault needs a logger handle".into()))?;

        if !fault.is_link_fault() {
            return Err(InjectError::Config(format!(
                "fault type {} targets a process, not an interface",
                fault.kind()
            )));
        }
        if matches!(fault, FaultType::Down) && !matches!(self.filter.protocol, ProtocolTarget::Any)
        {
            return Err(InjectError::Config(
                "a downed interface cannot be filtered by protocol".into(),
            ));
        }

        // Link intensities are probabilities.
        pattern.cap_end(100.0);

        let executor = NamespaceExecutor::new(
            self.ns_pid,
            NamespaceScope::Link,
            logger,
            self.runner.unwrap_or_else(|| Arc::new(ShellRunner)),
        );

        Ok(LinkInjector {
            tag,
            device,
            fault,
            pattern,
            filter: self.filter,
            timing: self.timing,
            executor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryFaultLog;

    fn log() -> Arc<MemoryFaultLog> {
        Arc::new(MemoryFaultLog::new())
    }

    #[test]
    fn test_builder_rejects_node_faults() {
        let err = LinkInjector::builder()
            .tag("f1")
            .device("eth0")
            .fault(FaultType::StressCpu { load: 50.0 })
            .pattern(FaultPattern::Persistent)
            .logger(log())
            .build()
            .unwrap_err();
        assert!(matches!(err, InjectError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_filtered_down() {
        let err = LinkInjector::builder()
            .tag("f1")
            .device("eth0")
            .fault(FaultType::Down)
            .pattern(FaultPattern::Persistent)
            .filter(TrafficFilter::protocol(crate::fault::Protocol::Tcp))
            .logger(log())
            .build()
            .unwrap_err();
        assert!(matches!(err, InjectError::Config(_)));
    }

    #[test]
    fn test_builder_caps_degradation_end() {
        let injector = LinkInjector::builder()
            .tag("f1")
            .device("eth0")
            .fault(FaultType::Loss)
            .pattern(FaultPattern::Degradation {
                step: 10.0,
                step_length: std::time::Duration::from_secs(1),
                start: 0.0,
                end: 500.0,
            })
            .logger(log())
            .build()
            .unwrap();
        assert!(matches!(
            injector.pattern(),
            FaultPattern::Degradation { end, .. } if *end == 100.0
        ));
    }

    #[test]
    fn test_supports_matrix() {
        let build = |fault: FaultType, filter: TrafficFilter| {
            LinkInjector::builder()
                .tag("f1")
                .device("eth0")
                .fault(fault)
                .pattern(FaultPattern::Persistent)
                .filter(filter)
                .logger(log())
                .build()
                .unwrap()
        };

        let loss = build(FaultType::Loss, TrafficFilter::any());
        assert!(loss.supports(&FaultPattern::Random { percent: 10.0 }));
        assert!(loss.supports(&FaultPattern::Persistent));

        let down = build(FaultType::Down, TrafficFilter::any());
        assert!(down.supports(&FaultPattern::Persistent));
        assert!(down.supports(&FaultPattern::Burst {
            duration: std::time::Duration::from_secs(1),
            period: std::time::Duration::from_secs(2),
        }));
        assert!(!down.supports(&FaultPattern::Random { percent: 10.0 }));

        let redirect = build(
            FaultType::Redirect {
                device: "eth1".into(),
                mode: crate::fault::RedirectMode::Redirect,
            },
            TrafficFilter::any(),
        );
        assert!(redirect.supports(&FaultPattern::Random { percent: 25.0 }));

        let filtered_redirect = build(
            FaultType::Redirect {
                device: "eth1".into(),
                mode: crate::fault::RedirectMode::Redirect,
            },
            TrafficFilter::protocol(crate::fault::Protocol::Tcp),
        );
        assert!(!filtered_redirect.supports(&FaultPattern::Random { percent: 25.0 }));
        assert!(filtered_redirect.supports(&FaultPattern::Persistent));
    }
}
