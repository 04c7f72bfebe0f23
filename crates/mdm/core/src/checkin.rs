//! MDM check-in message types.

use crate::{Enrollment, ProtocolError};

/// Check-in message types from devices.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "MessageType")]
pub enum CheckinMessage {
    /// Initial device authentication.
    Authenticate(Authenticate),
    /// Push token update (enrollment complete).
    TokenUpdate(TokenUpdate),
    /// Device unenrollment.
    CheckOut(CheckOut),
    /// User authentication challenge.
    UserAuthenticate(UserAuthenticate),
    /// Set bootstrap token.
    SetBootstrapToken(SetBootstrapToken),
    /// Get bootstrap token.
    GetBootstrapToken(GetBootstrapToken),
    /// Declarative Management.
    DeclarativeManagement(DeclarativeManagement),
    /// Get token for services.
    GetToken(GetToken),
}

/// Authenticate message - initial device identity.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authenticate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Device topic for push notifications.
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_version: Option<String>,

    #[serde(default, rename = "OSVersion", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Raw message for storage.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// TokenUpdate message - push token registration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenUpdate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Device topic for push notifications.
    pub topic: String,

    /// APNs push token.
    #[serde(with = "crate::data")]
    pub token: Vec<u8>,

    pub push_magic: String,

    #[serde(
        default,
        with = "crate::data::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub unlock_token: Option<Vec<u8>>,

    /// Awaiting configuration (DEP).
    #[serde(default)]
    pub awaiting_configuration: bool,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// CheckOut message - device unenrollment.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckOut {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    pub topic: String,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// UserAuthenticate message - user identity challenge.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAuthenticate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Digest response; absent on the first of the two exchanges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_response: Option<String>,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// SetBootstrapToken message.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetBootstrapToken {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    #[serde(with = "crate::data")]
    pub bootstrap_token: Vec<u8>,

    #[serde(default)]
    pub awaiting_configuration: bool,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetBootstrapToken message.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetBootstrapToken {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    #[serde(default)]
    pub awaiting_configuration: bool,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Bootstrap token response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BootstrapTokenResponse {
    #[serde(with = "crate::data")]
    pub bootstrap_token: Vec<u8>,
}

/// DeclarativeManagement message.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeclarativeManagement {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// DDM endpoint being accessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// DDM data payload.
    #[serde(
        default,
        with = "crate::data::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Vec<u8>>,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetToken message - token exchange for services.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetToken {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    pub token_service_type: String,

    #[serde(
        default,
        with = "crate::data::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_parameters: Option<Vec<u8>>,

    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// GetToken response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetTokenResponse {
    #[serde(with = "crate::data")]
    pub token_data: Vec<u8>,
}

#[derive(serde::Deserialize)]
struct MessageTypeField {
    #[serde(rename = "MessageType", default)]
    message_type: String,
}

fn decode_as<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    plist::from_bytes(data).map_err(ProtocolError::InvalidCheckin)
}

impl CheckinMessage {
    /// Decode a check-in message from plist bytes, keeping the raw bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let header: MessageTypeField = decode_as(data)?;
        let raw = data.to_vec();

        let msg = match header.message_type.as_str() {
            "Authenticate" => Self::Authenticate(Authenticate {
                raw,
                ..decode_as(data)?
            }),
            "TokenUpdate" => Self::TokenUpdate(TokenUpdate {
                raw,
                ..decode_as(data)?
            }),
            "CheckOut" => Self::CheckOut(CheckOut {
                raw,
                ..decode_as(data)?
            }),
            "UserAuthenticate" => Self::UserAuthenticate(UserAuthenticate {
                raw,
                ..decode_as(data)?
            }),
            "SetBootstrapToken" => Self::SetBootstrapToken(SetBootstrapToken {
                raw,
                ..decode_as(data)?
            }),
            "GetBootstrapToken" => Self::GetBootstrapToken(GetBootstrapToken {
                raw,
                ..decode_as(data)?
            }),
            "DeclarativeManagement" => Self::DeclarativeManagement(DeclarativeManagement {
                raw,
                ..decode_as(data)?
            }),
            "GetToken" => Self::GetToken(GetToken {
                raw,
                ..decode_as(data)?
            }),
            other => return Err(ProtocolError::UnrecognizedMessageType(other.to_string())),
        };

        Ok(msg)
    }

    /// Encode this message as an XML plist.
    pub fn encode(&self) -> color_eyre::eyre::Result<Vec<u8>> {
        use color_eyre::eyre::WrapErr as _;

        let mut buf = Vec::new();
        plist::to_writer_xml(&mut buf, self).wrap_err("failed to encode check-in message")?;
        Ok(buf)
    }

    /// Protocol name of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "Authenticate",
            Self::TokenUpdate(_) => "TokenUpdate",
            Self::CheckOut(_) => "CheckOut",
            Self::UserAuthenticate(_) => "UserAuthenticate",
            Self::SetBootstrapToken(_) => "SetBootstrapToken",
            Self::GetBootstrapToken(_) => "GetBootstrapToken",
            Self::DeclarativeManagement(_) => "DeclarativeManagement",
            Self::GetToken(_) => "GetToken",
        }
    }

    pub fn enrollment(&self) -> &Enrollment {
        match self {
            Self::Authenticate(m) => &m.enrollment,
            Self::TokenUpdate(m) => &m.enrollment,
            Self::CheckOut(m) => &m.enrollment,
            Self::UserAuthenticate(m) => &m.enrollment,
            Self::SetBootstrapToken(m) => &m.enrollment,
            Self::GetBootstrapToken(m) => &m.enrollment,
            Self::DeclarativeManagement(m) => &m.enrollment,
            Self::GetToken(m) => &m.enrollment,
        }
    }

    /// Raw bytes the message was decoded from (empty if built in code).
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::Authenticate(m) => &m.raw,
            Self::TokenUpdate(m) => &m.raw,
            Self::CheckOut(m) => &m.raw,
            Self::UserAuthenticate(m) => &m.raw,
            Self::SetBootstrapToken(m) => &m.raw,
            Self::GetBootstrapToken(m) => &m.raw,
            Self::DeclarativeManagement(m) => &m.raw,
            Self::GetToken(m) => &m.raw,
        }
    }
}

/// Serialize a response value to XML plist bytes.
pub fn to_plist_xml<T: serde::Serialize>(value: &T) -> color_eyre::eyre::Result<Vec<u8>> {
    use color_eyre::eyre::WrapErr as _;

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, value).wrap_err("failed to serialize plist")?;
    Ok(buf)
}
