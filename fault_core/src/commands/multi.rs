//! Bulk traffic-control command synthesis.
//!
//! The caller supplies a full per-interface settings document in `tcset`'s
//! import format. The engine treats it as opaque except for the top-level
//! keys, which name the interfaces that must be reset on teardown.

use crate::error::Result;
use serde_json::{json, Map, Value};

/// The activation/deactivation command pair for one bulk setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiCommands {
    pub inject: String,
    pub eject: String,
}

/// Build the `tcset` import pipeline and its matching reset pipeline.
///
/// Fails only when `config` is not a JSON object; the settings inside are
/// never interpreted.
pub fn multi_commands(config: &str) -> Result<MultiCommands> {
    let parsed: Value = serde_json::from_str(config)?;
    let interfaces = parsed.as_object().ok_or_else(|| {
        crate::error::InjectError::Config(
            "bulk traffic-control settings must be a JSON object keyed by interface".into(),
        )
    })?;

    let mut reset = Map::new();
    for interface in interfaces.keys() {
        reset.insert(
            interface.clone(),
            json!({ "outgoing": {}, "incoming": {} }),
        );
    }
    let reset_config = Value::Object(reset).to_string();

    Ok(MultiCommands {
        inject: format!("echo '{config}' | tcset /dev/stdin --import-setting"),
        eject: format!("echo '{reset_config}' | tcset /dev/stdin --import-setting"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_pipes_verbatim_config() {
        let config = r#"{"eth0": {"outgoing": {"delay": "10ms"}}}"#;
        let commands = multi_commands(config).unwrap();
        assert_eq!(
            commands.inject,
            format!("echo '{config}' | tcset /dev/stdin --import-setting")
        );
    }

    #[test]
    fn test_eject_resets_every_interface() {
        let config = r#"{"eth0": {"outgoing": {"delay": "10ms"}}, "eth1": {"incoming": {}}}"#;
        let commands = multi_commands(config).unwrap();

        let reset: Value = {
            let start = commands.eject.find('\'').unwrap() + 1;
            let end = commands.eject.rfind('\'').unwrap();
            serde_json::from_str(&commands.eject[start..end]).unwrap()
        };
        assert_eq!(
            reset,
            json!({
                "eth0": { "outgoing": {}, "incoming": {} },
                "eth1": { "outgoing": {}, "incoming": {} },
            })
        );
        assert!(commands.eject.ends_with("| tcset /dev/stdin --import-setting"));
    }

    #[test]
    fn test_rejects_non_object_config() {
        assert!(multi_commands("[1, 2]").is_err());
        assert!(multi_commands("not json").is_err());
    }
}
