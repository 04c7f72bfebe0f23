//! Secret placeholder expansion for delivered commands.

use std::collections::HashMap;

use crate::SecretError;

/// Placeholder prefix; the name is the run of `[A-Z0-9_]` that follows.
pub const SECRET_PREFIX: &str = "$MDM_SECRET_";

/// Replaces secret placeholders in a command payload.
pub trait SecretExpander: Send + Sync {
    fn expand(&self, payload: &[u8]) -> color_eyre::eyre::Result<Vec<u8>>;
}

/// Expands placeholders from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

impl SecretExpander for StaticSecrets {
    fn expand(&self, payload: &[u8]) -> color_eyre::eyre::Result<Vec<u8>> {
        // Binary plists carry no textual placeholders.
        let Ok(text) = std::str::from_utf8(payload) else {
            return Ok(payload.to_vec());
        };
        if !text.contains(SECRET_PREFIX) {
            return Ok(payload.to_vec());
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(SECRET_PREFIX) {
            out.push_str(&rest[..start]);
            let after = &rest[start + SECRET_PREFIX.len()..];
            let name_len = after
                .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..name_len];

            let value = self
                .values
                .get(name)
                .ok_or_else(|| SecretError::Unknown(name.to_string()))?;
            out.push_str(&xml_escape(value));
            rest = &after[name_len..];
        }
        out.push_str(rest);

        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> StaticSecrets {
        StaticSecrets::new(HashMap::from([
            ("WIFI_PSK".to_string(), "p&ss<word>".to_string()),
            ("ORG".to_string(), "Acme".to_string()),
        ]))
    }

    #[test]
    fn test_expands_every_placeholder() {
        let payload: &[u8] = concat!(
            "<string>$MDM_SECRET_WIFI_PSK</string>",
            "<string>$MDM_SECRET_ORG-$MDM_SECRET_ORG</string>"
        )
        .as_bytes();
        let expanded = secrets().expand(payload).unwrap();
        assert_eq!(
            String::from_utf8(expanded).unwrap(),
            "<string>p&amp;ss&lt;word&gt;</string><string>Acme-Acme</string>"
        );
    }

    #[test]
    fn test_unknown_secret_fails() {
        let err = secrets().expand(b"<string>$MDM_SECRET_NOPE</string>").unwrap_err();
        assert_eq!(
            crate::find_error::<SecretError>(&err),
            Some(&SecretError::Unknown("NOPE".into()))
        );
    }

    #[test]
    fn test_payload_without_placeholders_is_unchanged() {
        let payload = b"<string>$HOME</string>";
        assert_eq!(secrets().expand(payload).unwrap(), payload);
        let binary = [0x62, 0x70, 0xff, 0xfe];
        assert_eq!(secrets().expand(&binary).unwrap(), binary);
    }
}
