//! Process-scoped command synthesis: CPU stress and custom commands.

use super::fmt_num;
use std::time::Duration;

/// How a requested in-cgroup CPU load maps onto stress-ng workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressParams {
    pub cpus: u32,
    pub per_cpu_load: u32,
}

/// Size a stress run for a cgroup that owns `cgroup_fraction` of one CPU.
///
/// The caller asks for `load` percent inside the cgroup; stress-ng takes a
/// host-wide load, so the request is scaled by the fraction and spread over
/// as few CPUs as possible.
pub fn stress_parameters(load: f64, cgroup_fraction: f64) -> StressParams {
    let effective = load * cgroup_fraction;
    let cpus = (effective / 100.0).ceil() as u32;
    let per_cpu_load = if cpus > 0 {
        (effective / cpus as f64) as u32
    } else {
        0
    };
    StressParams { cpus, per_cpu_load }
}

/// The stress-ng invocation for one activation.
///
/// Runs in the background (`&`) and self-terminates after `active_for`;
/// deactivation is a logger-only marker. Durations below one second are
/// raised to it, stress-ng's minimum interval (and `-t 0` would mean
/// "run forever"). The int64longdouble method tracks the requested load
/// more closely than the default mix.
pub fn stress_command(load: f64, cgroup_fraction: f64, active_for: Duration) -> String {
    let params = stress_parameters(load, cgroup_fraction);
    let seconds = active_for.as_secs().max(1);
    format!(
        "stress-ng -l {} -t {} --cpu {} --cpu-method int64longdouble &",
        params.per_cpu_load, seconds, params.cpus
    )
}

/// Number of `{}` intensity slots in a custom command template.
pub fn placeholder_count(command: &str) -> usize {
    command.matches("{}").count()
}

/// Substitute the ramp's current intensity into a custom command template.
/// Only the first `{}` is filled; extra placeholders are a caller usage
/// error that is reported once, up front, without failing the fault.
pub fn fill_intensity(command: &str, intensity: f64) -> String {
    command.replacen("{}", &fmt_num(intensity), 1)
}
