//! MDM command types.

use crate::{Enrollment, ProtocolError};

/// MDM command queued for delivery.
///
/// The command UUID is chosen by whoever enqueues it; the server never
/// generates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Unique command identifier.
    pub command_uuid: String,
    /// Request type (e.g., "DeviceInformation", "InstallProfile").
    pub request_type: String,
    /// Full command plist as delivered to the device.
    pub raw: Vec<u8>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommandEnvelope {
    #[serde(rename = "CommandUUID", default)]
    command_uuid: String,
    command: Option<CommandPayload>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommandPayload {
    #[serde(default)]
    request_type: String,
}

impl Command {
    /// Decode a command plist, keeping the raw bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: CommandEnvelope =
            plist::from_bytes(raw).map_err(|e| ProtocolError::InvalidCommand(e.to_string()))?;

        if envelope.command_uuid.is_empty() {
            return Err(ProtocolError::InvalidCommand("empty CommandUUID".into()));
        }
        let request_type = envelope
            .command
            .map(|c| c.request_type)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProtocolError::InvalidCommand("empty RequestType".into()))?;

        Ok(Self {
            command_uuid: envelope.command_uuid,
            request_type,
            raw: raw.to_vec(),
        })
    }

    /// Build a command with a fresh UUID and the given extra payload keys.
    pub fn build(
        request_type: &str,
        fields: plist::Dictionary,
    ) -> color_eyre::eyre::Result<Self> {
        use color_eyre::eyre::WrapErr as _;

        let command_uuid = uuid::Uuid::new_v4().to_string();
        let mut payload = fields;
        payload.insert("RequestType".into(), request_type.into());

        let mut envelope = plist::Dictionary::new();
        envelope.insert("CommandUUID".into(), command_uuid.clone().into());
        envelope.insert("Command".into(), plist::Value::Dictionary(payload));

        let mut raw = Vec::new();
        plist::Value::Dictionary(envelope)
            .to_writer_xml(&mut raw)
            .wrap_err("failed to serialize command")?;

        Ok(Self {
            command_uuid,
            request_type: request_type.to_string(),
            raw,
        })
    }
}

/// Command execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CommandStatus {
    /// Command executed successfully.
    Acknowledged,
    /// Command failed.
    Error,
    /// Command format error.
    CommandFormatError,
    /// Device is busy, try later.
    NotNow,
    /// Idle (polling for the next command).
    Idle,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledged => "Acknowledged",
            Self::Error => "Error",
            Self::CommandFormatError => "CommandFormatError",
            Self::NotNow => "NotNow",
            Self::Idle => "Idle",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command results reported by device.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResults {
    pub enrollment: Enrollment,
    /// Command UUID being reported (empty on Idle).
    pub command_uuid: String,
    pub status: CommandStatus,
    pub error_chain: Vec<ErrorChainItem>,
    /// Raw message for storage.
    pub raw: Vec<u8>,
}

/// Error chain item from device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorChainItem {
    pub error_code: i64,
    pub error_domain: String,
    #[serde(default)]
    pub localized_description: Option<String>,
    #[serde(default, rename = "USEnglishDescription")]
    pub us_english_description: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportFields {
    #[serde(rename = "CommandUUID", default)]
    command_uuid: String,
    status: CommandStatus,
    #[serde(default)]
    error_chain: Vec<ErrorChainItem>,
}

impl CommandResults {
    /// Decode command results from plist bytes.
    ///
    /// The enrollment and report fields are read in separate passes so the
    /// arbitrary response payload never needs to be buffered.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let enrollment: Enrollment = plist::from_bytes(data)
            .map_err(|e| ProtocolError::InvalidCommandResult(e.to_string()))?;
        let fields: ReportFields = plist::from_bytes(data)
            .map_err(|e| ProtocolError::InvalidCommandResult(e.to_string()))?;

        if fields.status != CommandStatus::Idle && fields.command_uuid.is_empty() {
            return Err(ProtocolError::InvalidCommandResult(format!(
                "status {} without CommandUUID",
                fields.status
            )));
        }

        Ok(Self {
            enrollment,
            command_uuid: fields.command_uuid,
            status: fields.status,
            error_chain: fields.error_chain,
            raw: data.to_vec(),
        })
    }

    /// An Idle report carries no result to store.
    pub fn is_idle(&self) -> bool {
        self.status == CommandStatus::Idle
    }
}
