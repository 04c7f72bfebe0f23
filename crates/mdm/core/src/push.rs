//! Push notification types.

/// Push notification info for an enrollment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PushInfo {
    /// APNs push token (raw bytes).
    pub token: Vec<u8>,
    /// Push magic string.
    pub push_magic: String,
    /// APNs topic (from push certificate).
    pub topic: String,
}

impl PushInfo {
    /// Get push token as hex string.
    pub fn token_hex(&self) -> String {
        hex::encode(&self.token)
    }
}

/// APNs credentials for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCert {
    pub topic: String,
    pub cert_pem: String,
    pub key_pem: String,
    /// Changes every time the certificate is replaced.
    pub stale_token: String,
}

/// Outcome of one push notification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PushResponse {
    /// APNs response ID (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns_id: Option<String>,
    /// Error (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResponse {
    pub fn success(apns_id: impl Into<String>) -> Self {
        Self {
            apns_id: Some(apns_id.into()),
            error: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            apns_id: None,
            error: Some(error.to_string()),
        }
    }

    /// Check if push was successful.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
