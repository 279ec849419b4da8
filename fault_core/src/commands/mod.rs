//! Command synthesis.
//!
//! Pure, deterministic translation of a fault description into ordered lists
//! of shell command strings. Nothing here touches the system: namespace
//! prefixing and execution belong to [`crate::executor`]. Every add sequence
//! has a del sequence that undoes its effect on the interface's qdisc tree.
//!
//! Commands are assembled as shell strings because the downstream tools
//! (`tc`, `tcset`, `stress-ng`) are driven through `sh -c`, and the multi
//! injector needs a real pipeline. Escaping hazards in caller-supplied
//! values are the caller's responsibility.

pub mod link;
pub mod multi;
pub mod node;

pub use link::link_commands;
pub use multi::{multi_commands, MultiCommands};
pub use node::{fill_intensity, placeholder_count, stress_command, stress_parameters, StressParams};

/// Whether a synthesized sequence sets a fault up or tears it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Add,
    Del,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Add => "add",
            Verb::Del => "del",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a numeric argument the way tc expects: whole values without a
/// trailing `.0`, fractional values as-is.
pub(crate) fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(10.0), "10");
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(12.5), "12.5");
        assert_eq!(fmt_num(-3.0), "-3");
    }

    #[test]
    fn test_verb_display() {
        assert_eq!(Verb::Add.to_string(), "add");
        assert_eq!(Verb::Del.to_string(), "del");
    }
}
