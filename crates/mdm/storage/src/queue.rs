//! Command queue entry states shared by all backends.

/// Where a queued command sits for one enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// Waiting for delivery.
    Active,
    /// Delivered and deferred by the device.
    NotNow,
    /// Delivered and answered with a final status.
    Done,
    /// Removed from delivery by a queue clear.
    Inactive,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::NotNow => "not_now",
            Self::Done => "done",
            Self::Inactive => "inactive",
        }
    }

    /// States a device report may move an entry out of.
    pub const PENDING: [QueueState; 2] = [QueueState::Active, QueueState::NotNow];

    /// Fetch order for the next command.
    ///
    /// Deferred commands come first so an Idle poll re-offers them; when the
    /// device has just answered NotNow only fresh commands are offered.
    pub fn fetch_order(skip_not_now: bool) -> &'static [QueueState] {
        if skip_not_now {
            &[QueueState::Active]
        } else {
            &[QueueState::NotNow, QueueState::Active]
        }
    }

    /// State an entry moves to after a report with `status`.
    pub fn after_report(status: mdm_core::CommandStatus) -> Self {
        if status == mdm_core::CommandStatus::NotNow {
            Self::NotNow
        } else {
            Self::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdm_core::CommandStatus;

    #[test]
    fn test_after_report() {
        assert_eq!(QueueState::after_report(CommandStatus::NotNow), QueueState::NotNow);
        assert_eq!(QueueState::after_report(CommandStatus::Acknowledged), QueueState::Done);
        assert_eq!(QueueState::after_report(CommandStatus::Error), QueueState::Done);
    }

    #[test]
    fn test_fetch_order() {
        assert_eq!(QueueState::fetch_order(true), &[QueueState::Active]);
        assert_eq!(
            QueueState::fetch_order(false),
            &[QueueState::NotNow, QueueState::Active]
        );
    }
}
