//! Error types shared by the update pipeline crates.

/// Invalid grouping policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Duplicate bundle key: {0}")]
    DuplicateKey(String),
    #[error("Filter group {group} assigned to both '{first}' and '{second}'")]
    GroupAssignedTwice { group: u32, first: String, second: String },
    #[error("Default bundle '{0}' is not defined")]
    UnknownDefault(String),
}

/// Failure to hand an event over to a subscriber.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Subscriber rejected event: {0}")]
    Rejected(String),
    #[error("Subscriber panicked: {0}")]
    Panicked(String),
    #[error("{failed} of {total} subscribers failed")]
    Partial { failed: usize, total: usize },
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
