//! GetToken handling.

use std::collections::HashMap;

use mdm_core::{GetToken, GetTokenResponse, Request};

use crate::{GetTokenHandler, ServiceError};

/// Serves fixed token data per `TokenServiceType`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Vec<u8>>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, Vec<u8>>) -> Self {
        Self { tokens }
    }
}

impl GetTokenHandler for StaticTokens {
    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<GetTokenResponse> {
        if msg.token_service_type.is_empty() {
            return Err(ServiceError::InvalidGetToken("empty TokenServiceType".into()).into());
        }

        let Some(token) = self.tokens.get(&msg.token_service_type) else {
            tracing::warn!(
                trace_id = req.trace_id(),
                service_type = %msg.token_service_type,
                "no token for service type"
            );
            return Err(ServiceError::InvalidGetToken(format!(
                "unknown TokenServiceType {}",
                msg.token_service_type
            ))
            .into());
        };

        Ok(GetTokenResponse {
            token_data: token.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_error;

    fn tokens() -> StaticTokens {
        StaticTokens::new(HashMap::from([(
            "com.apple.maid".to_string(),
            b"maid-token".to_vec(),
        )]))
    }

    fn get_token(service_type: &str) -> GetToken {
        GetToken {
            token_service_type: service_type.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_routes_by_service_type() {
        let resp = tokens()
            .get_token(&Request::new(), &get_token("com.apple.maid"))
            .await
            .unwrap();
        assert_eq!(resp.token_data, b"maid-token");
    }

    #[tokio::test]
    async fn test_rejects_empty_and_unknown_types() {
        for service_type in ["", "com.example.nope"] {
            let err = tokens()
                .get_token(&Request::new(), &get_token(service_type))
                .await
                .unwrap_err();
            assert!(matches!(
                find_error::<ServiceError>(&err),
                Some(ServiceError::InvalidGetToken(_))
            ));
        }
    }
}
