//! Storage errors callers branch on.

/// Expected storage conditions, distinct from backend failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    /// A report referenced a command this store has never seen.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("enrollment not found: {0}")]
    EnrollmentNotFound(String),
    #[error("command {command_uuid} already queued for {id}")]
    AlreadyQueued { id: String, command_uuid: String },
}

impl StorageError {
    /// Find a storage error anywhere in a report's cause chain.
    pub fn find(report: &color_eyre::eyre::Report) -> Option<&StorageError> {
        report.chain().find_map(|e| e.downcast_ref::<StorageError>())
    }
}
