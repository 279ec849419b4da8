//! Bulk fault injection from a preconfigured settings document.

use crate::commands::{multi_commands, MultiCommands};
use crate::error::{InjectError, Result};
use crate::executor::{CommandRunner, NamespaceExecutor, NamespaceScope, ShellRunner};
use crate::fault::{FaultPattern, Timing};
use crate::logger::FaultLogger;
use crate::schedule::{self, StepCtx, Surface};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Applies a caller-provided per-interface traffic-control document
/// atomically, and resets every named interface on teardown.
///
/// There is no per-toggle intensity to vary, so degradation patterns are
/// refused; bursts toggle the whole document on and off.
#[derive(Debug)]
pub struct MultiInjector {
    tag: String,
    pattern: FaultPattern,
    timing: Timing,
    commands: MultiCommands,
    executor: NamespaceExecutor,
}

impl MultiInjector {
    pub fn builder() -> MultiInjectorBuilder {
        MultiInjectorBuilder::default()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub async fn go(&self) -> Result<()> {
        self.run(CancellationToken::new()).await
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        schedule::drive(self, &self.pattern, &self.timing, &cancel).await;
        Ok(())
    }
}

#[async_trait]
impl Surface for MultiInjector {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn supports(&self, pattern: &FaultPattern) -> bool {
        !matches!(pattern, FaultPattern::Degradation { .. })
    }

    async fn activate(&self, _ctx: &StepCtx) {
        self.executor
            .execute(Some(&self.commands.inject), true, &self.tag, "multi-fault")
            .await;
    }

    async fn deactivate(&self, _ctx: &StepCtx) {
        self.executor
            .execute(Some(&self.commands.eject), false, &self.tag, "multi-fault")
            .await;
    }
}

#[derive(Default)]
pub struct MultiInjectorBuilder {
    tag: Option<String>,
    ns_pid: Option<u32>,
    config: Option<String>,
    pattern: Option<FaultPattern>,
    timing: Timing,
    logger: Option<Arc<dyn FaultLogger>>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl MultiInjectorBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn ns_pid(mut self, ns_pid: u32) -> Self {
        self.ns_pid = Some(ns_pid);
        self
    }

    /// Full tcset settings document, JSON keyed by interface name.
    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
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

    pub fn build(self) -> Result<MultiInjector> {
        let tag = self
            .tag
            .ok_or_else(|| InjectError::Config("multi fault needs a tag".into()))?;
        let config = self
            .config
            .ok_or_else(|| InjectError::Config("multi fault needs a settings document".into()))?;
        let pattern = self
            .pattern
            .ok_or_else(|| InjectError::Config("multi fault needs a pattern".into()))?;
        let logger = self
            .logger
            .ok_or_else(|| InjectError::Config("multi fault needs a logger handle".into()))?;

        let commands = multi_commands(&config)?;
        let executor = NamespaceExecutor::new(
            self.ns_pid,
            NamespaceScope::Link,
            logger,
            self.runner.unwrap_or_else(|| Arc::new(ShellRunner)),
        );

        Ok(MultiInjector {
            tag,
            pattern,
            timing: self.timing,
            commands,
            executor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryFaultLog;

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = MultiInjector::builder()
            .tag("m1")
            .config("not json")
            .pattern(FaultPattern::Persistent)
            .logger(Arc::new(MemoryFaultLog::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, InjectError::Serialization(_)));
    }

    #[test]
    fn test_degradation_is_refused() {
        let injector = MultiInjector::builder()
            .tag("m1")
            .config(r#"{"eth0": {"outgoing": {}}}"#)
            .pattern(FaultPattern::Persistent)
            .logger(Arc::new(MemoryFaultLog::new()))
            .build()
            .unwrap();
        assert!(!injector.supports(&FaultPattern::Degradation {
            step: 5.0,
            step_length: std::time::Duration::from_secs(1),
            start: 0.0,
            end: 100.0,
        }));
        assert!(injector.supports(&FaultPattern::Random { percent: 10.0 }));
    }
}
