use crate::error::{InjectError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

/// What a fault does to its target.
///
/// Arguments that the declaration layer supplies as positional strings are
/// validated into these variants up front, so command synthesis never has to
/// guess at index semantics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FaultType {
    /// Fixed extra latency, e.g. `"100ms"`. The value is passed to netem
    /// verbatim.
    Delay { latency: String },
    Loss,
    Corrupt,
    Duplicate,
    Reorder,
    /// Token-bucket bandwidth cap. `rate_kbit` is mandatory; `burst` and
    /// `limit` fall back to netem-friendly defaults at synthesis.
    Bottleneck {
        rate_kbit: String,
        burst: Option<String>,
        limit: Option<String>,
    },
    /// Mirror or redirect ingress traffic to another interface.
    Redirect { device: String, mode: RedirectMode },
    Down,
    /// CPU stress inside the target's cgroup, `load` percent of the cgroup's
    /// CPU budget.
    StressCpu { load: f64 },
    /// Caller-supplied activation/deactivation commands.
    Custom {
        start: Option<String>,
        stop: Option<String>,
    },
}

impl FaultType {
    /// Build a fault type from the declaration layer's positional arguments.
    pub fn parse(name: &str, args: &[String]) -> Result<Self> {
        match name {
            "delay" => {
                let latency = args.first().cloned().ok_or_else(|| {
                    InjectError::Config("delay fault needs a latency argument".into())
                })?;
                Ok(FaultType::Delay { latency })
            }
            "loss" => Ok(FaultType::Loss),
            "corrupt" => Ok(FaultType::Corrupt),
            "duplicate" => Ok(FaultType::Duplicate),
            "reorder" => Ok(FaultType::Reorder),
            "bottleneck" => {
                let rate_kbit = args.first().cloned().ok_or_else(|| {
                    InjectError::Config("bottleneck fault needs a rate argument".into())
                })?;
                Ok(FaultType::Bottleneck {
                    rate_kbit,
                    burst: args.get(1).cloned(),
                    limit: args.get(2).cloned(),
                })
            }
            "redirect" => {
                let device = args.first().cloned().ok_or_else(|| {
                    InjectError::Config("redirect fault needs a destination interface".into())
                })?;
                Ok(FaultType::Redirect {
                    device,
                    mode: RedirectMode::parse(args.get(1).map(String::as_str)),
                })
            }
            "down" => Ok(FaultType::Down),
            "stress_cpu" => {
                let load = match args.first().map(|a| a.parse::<f64>()) {
                    Some(Ok(load)) => load,
                    _ => {
                        error!("stress_cpu fault does not define an intensity, defaulting to 50%");
                        50.0
                    }
                };
                Ok(FaultType::StressCpu { load })
            }
            "custom" => {
                let start = args.first().cloned();
                if start.is_none() {
                    error!("custom fault is missing its activation command");
                }
                Ok(FaultType::Custom {
                    start,
                    stop: args.get(1).cloned(),
                })
            }
            other => Err(InjectError::Config(format!("unknown fault type '{other}'"))),
        }
    }

    /// Fault kind label handed to the fault logger.
    pub fn kind(&self) -> &'static str {
        match self {
            FaultType::Delay { .. } => "delay",
            FaultType::Loss => "loss",
            FaultType::Corrupt => "corrupt",
            FaultType::Duplicate => "duplicate",
            FaultType::Reorder => "reorder",
            FaultType::Bottleneck { .. } => "bottleneck",
            FaultType::Redirect { .. } => "redirect",
            FaultType::Down => "down",
            FaultType::StressCpu { .. } => "stress_cpu",
            FaultType::Custom { .. } => "custom",
        }
    }

    /// The netem discipline keyword, for fault types that map onto netem.
    pub(crate) fn netem_keyword(&self) -> Option<&'static str> {
        match self {
            FaultType::Delay { .. } => Some("delay"),
            FaultType::Loss => Some("loss"),
            FaultType::Corrupt => Some("corrupt"),
            FaultType::Duplicate => Some("duplicate"),
            FaultType::Reorder => Some("reorder"),
            _ => None,
        }
    }

    /// True for fault types that act on an interface rather than a process.
    pub fn is_link_fault(&self) -> bool {
        !matches!(
            self,
            FaultType::StressCpu { .. } | FaultType::Custom { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RedirectMode {
    Redirect,
    Mirror,
}

impl RedirectMode {
    /// Anything that is not literally `mirror` or `redirect` falls back to
    /// redirect.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("mirror") => RedirectMode::Mirror,
            Some("redirect") | None => RedirectMode::Redirect,
            Some(_) => RedirectMode::Redirect,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectMode::Redirect => "redirect",
            RedirectMode::Mirror => "mirror",
        }
    }
}

/// Temporal shape of a fault's active phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FaultPattern {
    Persistent,
    Random { percent: f64 },
    Burst { duration: Duration, period: Duration },
    Degradation {
        step: f64,
        step_length: Duration,
        start: f64,
        end: f64,
    },
}

impl FaultPattern {
    /// Build a pattern from the declaration layer's positional arguments,
    /// applying the documented defaults where values are missing.
    pub fn parse(name: &str, args: &[String]) -> Result<Self> {
        match name {
            "persistent" => Ok(FaultPattern::Persistent),
            "random" => {
                let percent = args
                    .first()
                    .and_then(|a| a.parse::<f64>().ok())
                    .ok_or_else(|| {
                        InjectError::Config("random pattern needs a percentage argument".into())
                    })?;
                Ok(FaultPattern::Random { percent })
            }
            "burst" => {
                let duration_ms = args.first().and_then(|a| a.parse::<u64>().ok());
                let period_ms = args.get(1).and_then(|a| a.parse::<u64>().ok());
                let (duration_ms, period_ms) = match (duration_ms, period_ms) {
                    (Some(d), Some(p)) => (d, p),
                    _ => {
                        error!("burst pattern is missing parameters, defaulting to 1 second per 2 seconds");
                        (1000, 2000)
                    }
                };
                Ok(FaultPattern::Burst {
                    duration: Duration::from_millis(duration_ms),
                    period: Duration::from_millis(period_ms),
                })
            }
            "degradation" => {
                let step = match args.first().and_then(|a| a.parse::<f64>().ok()) {
                    Some(step) => step,
                    None => {
                        error!("degradation pattern does not define a step size, defaulting to 5");
                        5.0
                    }
                };
                let step_length_ms = args
                    .get(1)
                    .and_then(|a| a.parse::<u64>().ok())
                    .unwrap_or(1000);
                let start = args.get(2).and_then(|a| a.parse::<f64>().ok()).unwrap_or(0.0);
                let end = args
                    .get(3)
                    .and_then(|a| a.parse::<f64>().ok())
                    .unwrap_or(100.0);
                Ok(FaultPattern::Degradation {
                    step,
                    step_length: Duration::from_millis(step_length_ms),
                    start,
                    end,
                })
            }
            other => Err(InjectError::Config(format!(
                "unknown fault pattern '{other}'"
            ))),
        }
    }

    /// Clamp a degradation ramp's upper bound. Link probabilities cannot
    /// exceed 100%; node CPU targets are left alone.
    pub(crate) fn cap_end(&mut self, cap: f64) {
        if let FaultPattern::Degradation { end, .. } = self {
            if *end > cap {
                *end = cap;
            }
        }
    }
}

/// The pattern flavor a single activation toggle is synthesized with.
///
/// Bursts toggle the persistent form of their fault on and off; degradation
/// steps toggle the random form at the ramp's current intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Persistent,
    Random(f64),
}

/// Textual protocol tags and their IP protocol numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Protocol {
    Icmp,
    Igmp,
    Ip,
    Tcp,
    Udp,
    Ipv6,
    Ipv6Icmp,
}

impl Protocol {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ICMP" => Some(Protocol::Icmp),
            "IGMP" => Some(Protocol::Igmp),
            "IP" => Some(Protocol::Ip),
            "TCP" => Some(Protocol::Tcp),
            "UDP" => Some(Protocol::Udp),
            "IPv6" => Some(Protocol::Ipv6),
            "IPv6-ICMP" => Some(Protocol::Ipv6Icmp),
            _ => None,
        }
    }

    pub fn ip_number(&self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Igmp => 2,
            Protocol::Ip => 4,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Ipv6 => 41,
            Protocol::Ipv6Icmp => 58,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProtocolTarget {
    Any,
    Proto(Protocol),
}

/// Restricts a link fault to a protocol and optionally to ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficFilter {
    pub protocol: ProtocolTarget,
    pub dst_ports: Vec<u16>,
    pub src_ports: Vec<u16>,
}

impl TrafficFilter {
    pub fn any() -> Self {
        Self {
            protocol: ProtocolTarget::Any,
            dst_ports: Vec::new(),
            src_ports: Vec::new(),
        }
    }

    pub fn protocol(protocol: Protocol) -> Self {
        Self {
            protocol: ProtocolTarget::Proto(protocol),
            dst_ports: Vec::new(),
            src_ports: Vec::new(),
        }
    }

    pub fn is_any(&self) -> bool {
        self.protocol == ProtocolTarget::Any
    }
}

impl Default for TrafficFilter {
    fn default() -> Self {
        Self::any()
    }
}

/// Pre-injection wait, active window, and post-injection wait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timing {
    pub pre: Duration,
    pub injection: Duration,
    pub post: Duration,
}

impl Timing {
    pub fn new(pre: Duration, injection: Duration, post: Duration) -> Self {
        Self {
            pre,
            injection,
            post,
        }
    }

    pub fn from_secs_f64(pre: f64, injection: f64, post: f64) -> Self {
        Self {
            pre: Duration::from_secs_f64(pre.max(0.0)),
            injection: Duration::from_secs_f64(injection.max(0.0)),
            post: Duration::from_secs_f64(post.max(0.0)),
        }
    }

    /// Active window only, no waits on either side.
    pub fn active(injection: Duration) -> Self {
        Self {
            pre: Duration::ZERO,
            injection,
            post: Duration::ZERO,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pre: Duration::ZERO,
            injection: Duration::from_secs(20),
            post: Duration::ZERO,
        }
    }
}

/// Where a fault lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FaultTarget {
    /// A single interface, optionally inside the network namespace of the
    /// given process.
    Interface {
        name: String,
        ns_pid: Option<u32>,
    },
    /// A process, addressed through its network, PID and cgroup namespaces.
    Process { ns_pid: u32 },
    /// A batch of preconfigured traffic-control settings, applied atomically
    /// from a JSON document keyed by interface name.
    MultiInterface {
        config: String,
        ns_pid: Option<u32>,
    },
}

/// Immutable description of one declared fault.
///
/// Built once by the declaration layer, consumed by exactly one injector
/// task. `tag` must be unique across all live faults; it is the only
/// correlation key the logging sink sees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaultDescriptor {
    pub tag: String,
    pub target: FaultTarget,
    /// `None` is only meaningful for multi-interface targets, whose fault
    /// semantics live in the config document.
    pub fault: Option<FaultType>,
    pub pattern: FaultPattern,
    #[serde(default)]
    pub filter: TrafficFilter,
    pub timing: Timing,
}
