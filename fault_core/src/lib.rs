//! Fault injection engine for emulated network testbeds.
//!
//! Declared faults — delays, loss, corruption, duplication, reordering,
//! bandwidth bottlenecks, traffic redirection, interface down-events, CPU
//! stress, custom commands — are compiled into timed sequences of
//! traffic-control and namespace shell invocations against interfaces and
//! processes living in Linux network/PID/cgroup namespaces. Each fault runs
//! as one cooperative task: pre-injection wait, pattern-shaped active phase,
//! post-injection wait, with every activation paired with a teardown on all
//! exit paths.
//!
//! The engine is Linux-only by nature (`nsenter`, `tc`, `cgget`) and
//! best-effort by design: failing commands are recorded through the fault
//! logger, never raised into the timeline.

pub mod cgroup;
pub mod commands;
pub mod error;
pub mod executor;
pub mod fault;
pub mod injectors;
pub mod logger;
pub mod schedule;

pub use error::{InjectError, Result};
pub use executor::{CommandRunner, NamespaceExecutor, NamespaceScope, ShellRunner};
pub use fault::{
    FaultDescriptor, FaultPattern, FaultTarget, FaultType, Protocol, ProtocolTarget,
    RedirectMode, Shape, Timing, TrafficFilter,
};
pub use injectors::{FaultInjector, LinkInjector, MultiInjector, NodeInjector};
pub use logger::{FaultEvent, FaultLogger, MemoryFaultLog, TracingFaultLog};
pub use schedule::{LiveState, Outcome, Phase};

// Re-export commonly used types
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
