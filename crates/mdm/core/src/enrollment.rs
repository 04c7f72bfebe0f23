//! Enrollment types for device and user identification.

/// Static UserID reported by Shared iPad user channels.
pub const SHARED_IPAD_USER_ID: &str = "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF";

/// Type of MDM enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EnrollType {
    /// Standard device enrollment (UDID-based).
    Device,
    /// User channel on a device.
    User,
    /// User Enrollment device (EnrollmentID-based).
    UserEnrollmentDevice,
    /// User channel on a User Enrollment device.
    UserEnrollment,
    /// Shared iPad user channel.
    SharedIpad,
}

impl EnrollType {
    /// Stable string form used by storage backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "Device",
            Self::User => "User",
            Self::UserEnrollmentDevice => "User Enrollment (Device)",
            Self::UserEnrollment => "User Enrollment",
            Self::SharedIpad => "Shared iPad",
        }
    }

    /// Parse the string form produced by [`EnrollType::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Device,
            Self::User,
            Self::UserEnrollmentDevice,
            Self::UserEnrollment,
            Self::SharedIpad,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for EnrollType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw enrollment data from check-in messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Enrollment {
    /// Device UDID.
    #[serde(default, rename = "UDID", skip_serializing_if = "Option::is_none")]
    pub udid: Option<String>,

    /// User ID for user-channel enrollments.
    #[serde(default, rename = "UserID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// User short name (Managed Apple ID on Shared iPad).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_short_name: Option<String>,

    /// User long name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_long_name: Option<String>,

    /// Enrollment ID for User Enrollment devices.
    #[serde(default, rename = "EnrollmentID", skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,

    /// Enrollment User ID for User Enrollment.
    #[serde(
        default,
        rename = "EnrollmentUserID",
        skip_serializing_if = "Option::is_none"
    )]
    pub enrollment_user_id: Option<String>,
}

/// Enrollment reduced to its channel identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnrollment {
    pub enroll_type: EnrollType,
    pub device_channel_id: String,
    pub user_channel_id: Option<String>,
    pub is_user_channel: bool,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

impl Enrollment {
    /// Resolve the channel identifiers of this enrollment.
    ///
    /// A UDID selects the device family, an EnrollmentID (without UDID) the
    /// User Enrollment family. Returns `None` when neither is present.
    pub fn resolve(&self) -> Option<ResolvedEnrollment> {
        if let Some(udid) = non_empty(&self.udid) {
            let mut resolved = ResolvedEnrollment {
                enroll_type: EnrollType::Device,
                device_channel_id: udid.to_string(),
                user_channel_id: None,
                is_user_channel: false,
            };
            if let Some(user_id) = non_empty(&self.user_id) {
                resolved.is_user_channel = true;
                if user_id == SHARED_IPAD_USER_ID {
                    // the sentinel is shared by every Shared iPad user
                    resolved.enroll_type = EnrollType::SharedIpad;
                    resolved.user_channel_id = self.user_short_name.clone();
                } else {
                    resolved.enroll_type = EnrollType::User;
                    resolved.user_channel_id = Some(user_id.to_string());
                }
            }
            return Some(resolved);
        }

        if let Some(enrollment_id) = non_empty(&self.enrollment_id) {
            let mut resolved = ResolvedEnrollment {
                enroll_type: EnrollType::UserEnrollmentDevice,
                device_channel_id: enrollment_id.to_string(),
                user_channel_id: None,
                is_user_channel: false,
            };
            if let Some(user_id) = non_empty(&self.enrollment_user_id) {
                resolved.enroll_type = EnrollType::UserEnrollment;
                resolved.user_channel_id = Some(user_id.to_string());
                resolved.is_user_channel = true;
            }
            return Some(resolved);
        }

        None
    }
}

/// Errors for enrollment identifiers that fail validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnrollIdError {
    #[error("enrollment could not be resolved: no UDID or EnrollmentID")]
    Unresolved,
    #[error("empty enrollment ID")]
    EmptyId,
    #[error("user channel {0} has an empty user identifier")]
    EmptyUserChannel(String),
    #[error("enrollment ID not set on request")]
    Missing,
    #[error("{op} is only valid for a device channel, got {id}")]
    NotDeviceChannel { op: &'static str, id: String },
}

/// Normalized enrollment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EnrollId {
    /// The enrollment type.
    pub enroll_type: EnrollType,
    /// Stable primary identifier.
    pub id: String,
    /// Owning device ID (user channels only).
    pub parent_id: Option<String>,
}

impl EnrollId {
    /// Device-channel identifier.
    pub fn device(enroll_type: EnrollType, id: impl Into<String>) -> Self {
        Self {
            enroll_type,
            id: id.into(),
            parent_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), EnrollIdError> {
        if self.id.is_empty() {
            return Err(EnrollIdError::EmptyId);
        }
        if matches!(self.parent_id.as_deref(), Some("")) {
            return Err(EnrollIdError::EmptyId);
        }
        Ok(())
    }

    pub fn is_user_channel(&self) -> bool {
        self.parent_id.is_some()
    }

    /// The device this enrollment belongs to.
    pub fn device_id(&self) -> &str {
        self.parent_id.as_deref().unwrap_or(&self.id)
    }

    /// Fail unless this is a device channel.
    pub fn require_device_channel(&self, op: &'static str) -> Result<(), EnrollIdError> {
        if self.is_user_channel() {
            return Err(EnrollIdError::NotDeviceChannel {
                op,
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for EnrollId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// How resolved enrollments collapse into an [`EnrollId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// Device channel only; user channels collapse onto their device.
    ///
    /// Used for certificate binding.
    Flat,
    /// Device channel, or `device:user` with the device as parent.
    #[default]
    Composite,
}

impl IdPolicy {
    pub fn normalize(&self, resolved: &ResolvedEnrollment) -> Result<EnrollId, EnrollIdError> {
        let mut id = EnrollId::device(resolved.enroll_type, resolved.device_channel_id.clone());
        if *self == Self::Composite && resolved.is_user_channel {
            let user = resolved
                .user_channel_id
                .as_deref()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| EnrollIdError::EmptyUserChannel(id.id.clone()))?;
            id.id = format!("{}:{}", resolved.device_channel_id, user);
            id.parent_id = Some(resolved.device_channel_id.clone());
        }
        id.validate()?;
        Ok(id)
    }

    /// Resolve and normalize in one step.
    pub fn enroll_id(&self, enrollment: &Enrollment) -> Result<EnrollId, EnrollIdError> {
        let resolved = enrollment.resolve().ok_or(EnrollIdError::Unresolved)?;
        self.normalize(&resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enrollment() {
        let enrollment = Enrollment {
            udid: Some("ABC123".into()),
            ..Default::default()
        };
        let id = IdPolicy::Composite.enroll_id(&enrollment).unwrap();
        assert_eq!(id.enroll_type, EnrollType::Device);
        assert_eq!(id.id, "ABC123");
        assert!(id.parent_id.is_none());
    }

    #[test]
    fn test_user_enrollment() {
        let enrollment = Enrollment {
            udid: Some("ABC123".into()),
            user_id: Some("user-456".into()),
            ..Default::default()
        };
        let id = IdPolicy::Composite.enroll_id(&enrollment).unwrap();
        assert_eq!(id.enroll_type, EnrollType::User);
        assert_eq!(id.id, "ABC123:user-456");
        assert_eq!(id.parent_id.as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_flat_collapses_user_channel() {
        let enrollment = Enrollment {
            udid: Some("ABC123".into()),
            user_id: Some("user-456".into()),
            ..Default::default()
        };
        let id = IdPolicy::Flat.enroll_id(&enrollment).unwrap();
        assert_eq!(id.id, "ABC123");
        assert_eq!(id.enroll_type, EnrollType::User);
        assert!(id.parent_id.is_none());
    }

    #[test]
    fn test_shared_ipad_uses_short_name() {
        let enrollment = Enrollment {
            udid: Some("IPAD1".into()),
            user_id: Some(SHARED_IPAD_USER_ID.into()),
            user_short_name: Some("appleid@example.com".into()),
            ..Default::default()
        };
        let resolved = enrollment.resolve().unwrap();
        assert_eq!(resolved.enroll_type, EnrollType::SharedIpad);
        assert_eq!(resolved.user_channel_id.as_deref(), Some("appleid@example.com"));

        let id = IdPolicy::Composite.normalize(&resolved).unwrap();
        assert_eq!(id.id, "IPAD1:appleid@example.com");
    }

    #[test]
    fn test_user_enrollment_family() {
        let device = Enrollment {
            enrollment_id: Some("E1".into()),
            ..Default::default()
        };
        assert_eq!(
            device.resolve().unwrap().enroll_type,
            EnrollType::UserEnrollmentDevice
        );

        let user = Enrollment {
            enrollment_id: Some("E1".into()),
            enrollment_user_id: Some("U1".into()),
            ..Default::default()
        };
        let id = IdPolicy::Composite.enroll_id(&user).unwrap();
        assert_eq!(id.enroll_type, EnrollType::UserEnrollment);
        assert_eq!(id.id, "E1:U1");
        assert_eq!(id.device_id(), "E1");
    }

    #[test]
    fn test_udid_takes_precedence() {
        let enrollment = Enrollment {
            udid: Some("UDID".into()),
            enrollment_id: Some("E1".into()),
            ..Default::default()
        };
        assert_eq!(enrollment.resolve().unwrap().device_channel_id, "UDID");
    }

    #[test]
    fn test_unresolvable() {
        assert!(Enrollment::default().resolve().is_none());
        assert_eq!(
            IdPolicy::Composite.enroll_id(&Enrollment::default()),
            Err(EnrollIdError::Unresolved)
        );
    }

    #[test]
    fn test_require_device_channel() {
        let user = EnrollId {
            enroll_type: EnrollType::User,
            id: "D:U".into(),
            parent_id: Some("D".into()),
        };
        assert!(user.require_device_channel("clear queue").is_err());
        assert!(
            EnrollId::device(EnrollType::Device, "D")
                .require_device_channel("clear queue")
                .is_ok()
        );
    }

    #[test]
    fn test_enroll_type_string_roundtrip() {
        for t in [EnrollType::Device, EnrollType::SharedIpad, EnrollType::UserEnrollment] {
            assert_eq!(EnrollType::parse(t.as_str()), Some(t));
        }
    }
}
