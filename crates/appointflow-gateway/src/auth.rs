use appointflow_core::config::GatewayConfig;

/// Who a request was accepted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// No token is configured.
    Anonymous,
    /// The request carried the configured token.
    Token,
}

impl Principal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Token => "token",
        }
    }
}

/// Bearer header first, then `?token=`. With no token configured every
/// request is anonymous.
///
/// Returns `None` on auth failure.
pub fn validate_auth(
    config: &GatewayConfig,
    bearer: Option<&str>,
    query_token: Option<&str>,
) -> Option<Principal> {
    let Some(expected) = config.token.as_deref().filter(|t| !t.is_empty()) else {
        return Some(Principal::Anonymous);
    };

    // A bearer that does not match fails even if the query carries the token.
    let offered = match bearer {
        Some(b) => Some(b),
        None => query_token,
    };

    (offered == Some(expected)).then_some(Principal::Token)
}

/// Extract token from the query string (?token=...).
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("token="))
}
