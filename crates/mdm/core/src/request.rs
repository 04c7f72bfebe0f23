//! MDM request context.

use crate::{EnrollId, EnrollIdError, Enrollment, IdPolicy};

/// Read consistency required by a storage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Any replica will do.
    #[default]
    Eventual,
    /// Reads must observe every write made earlier in this request chain.
    Primary,
}

/// Device identity certificate presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCertificate {
    /// DER-encoded certificate.
    pub der: Vec<u8>,
    /// End of the validity period, when known.
    pub not_after: Option<chrono::DateTime<chrono::Utc>>,
}

/// MDM request context.
///
/// Carries enrollment identification, the client certificate, the read
/// consistency directive and log fields through the service and storage
/// layers.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Normalized enrollment ID, set by the layer handling the message.
    pub enroll_id: Option<EnrollId>,

    /// Device identity certificate.
    pub certificate: Option<DeviceCertificate>,

    /// URL query parameters.
    pub params: std::collections::HashMap<String, String>,

    pub consistency: Consistency,

    /// Correlation ID for log lines of this request.
    pub trace_id: Option<String>,
}

impl Request {
    /// Create a new empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enrollment ID.
    pub fn with_enroll_id(mut self, id: EnrollId) -> Self {
        self.enroll_id = Some(id);
        self
    }

    /// Set the certificate.
    pub fn with_certificate(mut self, cert: DeviceCertificate) -> Self {
        self.certificate = Some(cert);
        self
    }

    /// Add a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Copy of this request identified by `enrollment` under `policy`.
    pub fn for_enrollment(
        &self,
        enrollment: &Enrollment,
        policy: IdPolicy,
    ) -> Result<Self, EnrollIdError> {
        let id = policy.enroll_id(enrollment)?;
        Ok(self.clone().with_enroll_id(id))
    }

    /// Get the enrollment ID, returning an error if not set.
    pub fn require_enroll_id(&self) -> Result<&EnrollId, EnrollIdError> {
        self.enroll_id.as_ref().ok_or(EnrollIdError::Missing)
    }

    /// Whether reads must go to the primary data source.
    pub fn requires_primary(&self) -> bool {
        self.consistency == Consistency::Primary
    }

    /// Trace ID for log fields, empty when unset.
    pub fn trace_id(&self) -> &str {
        self.trace_id.as_deref().unwrap_or_default()
    }
}
