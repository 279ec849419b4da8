//! Interface-scoped tc command synthesis.
//!
//! Two families: unfiltered faults hang a single discipline off the
//! interface root, filtered faults build a classful prio tree (handle `1:`)
//! with u32 classifiers steering matching traffic into class `1:1` where the
//! discipline sits. Redirect faults work on the ingress qdisc (handle
//! `ffff:`) instead; ingress qdiscs ignore the requested handle and always
//! come up as `ffff:`.

use super::{fmt_num, Verb};
use crate::fault::{FaultType, Protocol, ProtocolTarget, RedirectMode, Shape, TrafficFilter};
use tracing::error;

/// The kernel's `meta(random)` comparison value is truncated to 32 bits
/// while the randomness itself is 64 bits wide; without masking down to 32
/// bits the upper half always exceeds any caller threshold and the filter
/// never matches.
const RANDOM_MASK: u64 = 4_294_967_295;

/// Translate one activation or deactivation toggle into tc/ifconfig
/// commands for `device`.
///
/// The returned strings carry no namespace prefix; the executor adds it.
/// Combinations without a defined command shape produce an error log and an
/// empty list, the scheduler is expected to have refused them already.
pub fn link_commands(
    device: &str,
    fault: &FaultType,
    shape: Shape,
    filter: &TrafficFilter,
    verb: Verb,
) -> Vec<String> {
    match filter.protocol {
        ProtocolTarget::Any => unfiltered(device, fault, shape, verb),
        ProtocolTarget::Proto(protocol) => filtered(device, fault, shape, protocol, filter, verb),
    }
}

fn unsupported(device: &str, fault: &FaultType, shape: Shape) -> Vec<String> {
    error!(
        "no command shape for fault type {} with {:?} on {}",
        fault.kind(),
        shape,
        device
    );
    Vec::new()
}

fn unfiltered(device: &str, fault: &FaultType, shape: Shape, verb: Verb) -> Vec<String> {
    let netem = |body: String| vec![format!("tc qdisc {verb} dev {device} root netem {body}")];

    match (fault, shape) {
        (FaultType::Delay { latency }, Shape::Persistent) => netem(format!("delay {latency}")),
        (FaultType::Delay { latency }, Shape::Random(percent)) => netem(format!(
            "delay {latency} reorder {}%",
            fmt_num(100.0 - percent)
        )),
        (FaultType::Bottleneck { rate_kbit, burst, limit }, Shape::Persistent) => {
            let burst = burst.as_deref().unwrap_or("1600");
            let limit = limit.as_deref().unwrap_or("3000");
            vec![format!(
                "tc qdisc {verb} dev {device} root tbf rate {rate_kbit}kbit burst {burst} limit {limit}"
            )]
        }
        (FaultType::Down, Shape::Persistent) => match verb {
            Verb::Add => vec![format!("ifconfig {device} down")],
            Verb::Del => vec![format!("ifconfig {device} up")],
        },
        (FaultType::Redirect { device: dest, mode }, shape) => {
            redirect_unfiltered(device, dest, *mode, shape, verb)
        }
        (fault, Shape::Persistent) => match fault.netem_keyword() {
            Some(keyword) => netem(format!("{keyword} 100%")),
            None => unsupported(device, fault, shape),
        },
        (fault, Shape::Random(percent)) => match fault.netem_keyword() {
            Some(keyword) => netem(format!("{keyword} {}%", fmt_num(percent))),
            None => unsupported(device, fault, shape),
        },
    }
}

fn redirect_unfiltered(
    device: &str,
    dest: &str,
    mode: RedirectMode,
    shape: Shape,
    verb: Verb,
) -> Vec<String> {
    if verb == Verb::Del {
        return vec![format!("tc qdisc del dev {device} ingress")];
    }

    let ingress = format!("tc qdisc add dev {device} handle ffff: ingress");
    let match_clause = match shape {
        Shape::Persistent => "matchall".to_string(),
        Shape::Random(percent) => {
            format!(
                "basic match \"meta( random mask {RANDOM_MASK} lt {} )\"",
                random_boundary(percent)
            )
        }
    };
    vec![format!(
        "{ingress} ; tc filter add dev {device} parent ffff: {match_clause} action mirred egress {} dev {dest}",
        mode.as_str()
    )]
}

/// Threshold such that a uniformly random 32-bit value falls below it with
/// probability `percent`/100.
pub(crate) fn random_boundary(percent: f64) -> u64 {
    (RANDOM_MASK as f64 * (percent / 100.0)) as u64
}

fn filtered(
    device: &str,
    fault: &FaultType,
    shape: Shape,
    protocol: Protocol,
    filter: &TrafficFilter,
    verb: Verb,
) -> Vec<String> {
    let is_redirect = matches!(fault, FaultType::Redirect { .. });

    if verb == Verb::Del {
        return if is_redirect {
            vec![format!("tc qdisc del dev {device} ingress")]
        } else {
            vec![format!("tc qdisc del dev {device} root handle 1: prio")]
        };
    }

    let mut commands = vec![if is_redirect {
        format!("tc qdisc add dev {device} handle ffff: ingress")
    } else {
        format!("tc qdisc add dev {device} root handle 1: prio")
    }];

    let classifier_base = format!(
        "tc filter add dev {device} parent 1:0 protocol ip prio 1 u32 match ip protocol {} 0xff",
        protocol.ip_number()
    );
    for port in &filter.dst_ports {
        commands.push(format!(
            "{classifier_base} match ip dport {port} 0xffff flowid 1:1"
        ));
    }
    for port in &filter.src_ports {
        commands.push(format!(
            "{classifier_base} match ip sport {port} 0xffff flowid 1:1"
        ));
    }
    if filter.dst_ports.is_empty() && filter.src_ports.is_empty() {
        commands.push(format!("{classifier_base} flowid 1:1"));
    }

    if is_redirect {
        let FaultType::Redirect { device: dest, mode } = fault else {
            unreachable!()
        };
        if shape != Shape::Persistent {
            return unsupported(device, fault, shape);
        }
        // The classifiers were built for the prio root; re-home them on the
        // ingress qdisc and make each one a mirred action.
        return commands
            .into_iter()
            .map(|command| {
                if command.contains("match") {
                    format!(
                        "{} action mirred egress {} dev {dest}",
                        command.replace("parent 1:0", "parent ffff:"),
                        mode.as_str()
                    )
                } else {
                    command
                }
            })
            .collect();
    }

    let leaf_body = match (fault, shape) {
        (FaultType::Delay { latency }, Shape::Persistent) => format!("netem delay {latency}"),
        (FaultType::Delay { latency }, Shape::Random(percent)) => {
            format!("netem delay {latency} reorder {}%", fmt_num(100.0 - percent))
        }
        (FaultType::Bottleneck { rate_kbit, burst, limit }, Shape::Persistent) => {
            let burst = burst.as_deref().unwrap_or("1600");
            let limit = limit.as_deref().unwrap_or("3000");
            format!("tbf rate {rate_kbit}kbit burst {burst} limit {limit}")
        }
        (fault, Shape::Persistent) => match fault.netem_keyword() {
            Some(keyword) => format!("{keyword} 100%"),
            None => return unsupported(device, fault, shape),
        },
        (fault, Shape::Random(percent)) => match fault.netem_keyword() {
            Some(keyword) => format!("{keyword} {}%", fmt_num(percent)),
            None => return unsupported(device, fault, shape),
        },
    };
    commands.push(format!(
        "tc qdisc add dev {device} parent 1:1 handle 2: {leaf_body}"
    ));
    commands
}
