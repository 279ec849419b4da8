use std::sync::Mutex;
use tracing::info;

/// Logging sink for fault activation state.
///
/// The engine reports every activation and deactivation here; transport and
/// persistence live behind the trait. Implementations must be internally
/// synchronized, the engine calls them from concurrently running fault
/// tasks. A handle is passed to each injector at construction; there is no
/// process-wide logger.
pub trait FaultLogger: Send + Sync {
    fn set_fault_active(&self, tag: &str, kind: &str, command: &str, return_code: i32);
    fn set_fault_inactive(&self, tag: &str);
}

/// Forwards fault state changes to `tracing`.
#[derive(Debug, Default)]
pub struct TracingFaultLog;

impl FaultLogger for TracingFaultLog {
    fn set_fault_active(&self, tag: &str, kind: &str, command: &str, return_code: i32) {
        info!(tag, kind, command, return_code, "fault active");
    }

    fn set_fault_inactive(&self, tag: &str) {
        info!(tag, "fault inactive");
    }
}

/// One recorded fault state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultEvent {
    Active {
        tag: String,
        kind: String,
        command: String,
        return_code: i32,
    },
    Inactive {
        tag: String,
    },
}

impl FaultEvent {
    pub fn tag(&self) -> &str {
        match self {
            FaultEvent::Active { tag, .. } => tag,
            FaultEvent::Inactive { tag } => tag,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FaultEvent::Active { .. })
    }
}

/// In-memory fault log. Useful for tests and for embedders that want to
/// inspect the activation history after a run.
#[derive(Debug, Default)]
pub struct MemoryFaultLog {
    events: Mutex<Vec<FaultEvent>>,
}

impl MemoryFaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FaultEvent> {
        self.events.lock().expect("fault log poisoned").clone()
    }

    pub fn events_for(&self, tag: &str) -> Vec<FaultEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.tag() == tag)
            .collect()
    }
}

impl FaultLogger for MemoryFaultLog {
    fn set_fault_active(&self, tag: &str, kind: &str, command: &str, return_code: i32) {
        self.events
            .lock()
            .expect("fault log poisoned")
            .push(FaultEvent::Active {
                tag: tag.to_string(),
                kind: kind.to_string(),
                command: command.to_string(),
                return_code,
            });
    }

    fn set_fault_inactive(&self, tag: &str) {
        self.events
            .lock()
            .expect("fault log poisoned")
            .push(FaultEvent::Inactive {
                tag: tag.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_records_in_order() {
        let log = MemoryFaultLog::new();
        log.set_fault_active("f1", "loss", "tc qdisc add", 0);
        log.set_fault_inactive("f1");

        let events = log.events_for("f1");
        assert_eq!(events.len(), 2);
        assert!(events[0].is_active());
        assert!(!events[1].is_active());
    }
}
