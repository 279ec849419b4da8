pub mod link;
pub mod multi;
pub mod node;

pub use link::{LinkInjector, LinkInjectorBuilder};
pub use multi::{MultiInjector, MultiInjectorBuilder};
pub use node::{NodeInjector, NodeInjectorBuilder};

use crate::error::{InjectError, Result};
use crate::fault::{FaultDescriptor, FaultTarget};
use crate::logger::FaultLogger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One declared fault, ready to run. Built from a [`FaultDescriptor`] and a
/// logger handle; the target variant picks the injector.
#[derive(Debug)]
pub enum FaultInjector {
    Link(LinkInjector),
    Multi(MultiInjector),
    Node(NodeInjector),
}

impl FaultInjector {
    pub fn from_descriptor(
        descriptor: FaultDescriptor,
        logger: Arc<dyn FaultLogger>,
    ) -> Result<Self> {
        match descriptor.target {
            FaultTarget::Interface { name, ns_pid } => {
                let fault = descriptor.fault.ok_or_else(|| {
                    InjectError::Config(format!(
                        "fault {} targets an interface but has no fault type",
                        descriptor.tag
                    ))
                })?;
                let mut builder = LinkInjector::builder()
                    .tag(descriptor.tag)
                    .device(name)
                    .fault(fault)
                    .pattern(descriptor.pattern)
                    .filter(descriptor.filter)
                    .timing(descriptor.timing)
                    .logger(logger);
                if let Some(pid) = ns_pid {
                    builder = builder.ns_pid(pid);
                }
                Ok(FaultInjector::Link(builder.build()?))
            }
            FaultTarget::Process { ns_pid } => {
                let fault = descriptor.fault.ok_or_else(|| {
                    InjectError::Config(format!(
                        "fault {} targets a process but has no fault type",
                        descriptor.tag
                    ))
                })?;
                let injector = NodeInjector::builder()
                    .tag(descriptor.tag)
                    .ns_pid(ns_pid)
                    .fault(fault)
                    .pattern(descriptor.pattern)
                    .timing(descriptor.timing)
                    .logger(logger)
                    .build()?;
                Ok(FaultInjector::Node(injector))
            }
            FaultTarget::MultiInterface { config, ns_pid } => {
                let mut builder = MultiInjector::builder()
                    .tag(descriptor.tag)
                    .config(config)
                    .pattern(descriptor.pattern)
                    .timing(descriptor.timing)
                    .logger(logger);
                if let Some(pid) = ns_pid {
                    builder = builder.ns_pid(pid);
                }
                Ok(FaultInjector::Multi(builder.build()?))
            }
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            FaultInjector::Link(injector) => injector.tag(),
            FaultInjector::Multi(injector) => injector.tag(),
            FaultInjector::Node(injector) => injector.tag(),
        }
    }

    /// Run the fault's timeline to completion.
    pub async fn go(&self) -> Result<()> {
        match self {
            FaultInjector::Link(injector) => injector.go().await,
            FaultInjector::Multi(injector) => injector.go().await,
            FaultInjector::Node(injector) => injector.go().await,
        }
    }

    /// Run the fault's timeline, tearing down early if `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        match self {
            FaultInjector::Link(injector) => injector.run(cancel).await,
            FaultInjector::Multi(injector) => injector.run(cancel).await,
            FaultInjector::Node(injector) => injector.run(cancel).await,
        }
    }
}
