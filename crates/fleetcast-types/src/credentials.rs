//! Per-backend authentication: HTTP Basic, Bearer, or a verbatim
//! user-supplied header map.

use std::collections::HashMap;

use base64::Engine;

/// The three authentication kinds a [`crate::workflow`]-submitting backend
/// client may be configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    Headers(HashMap<String, String>),
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials::None
    }
}

impl Credentials {
    /// Apply this credential kind to an outgoing HTTP request.
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credentials::None => builder,
            Credentials::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                builder.header("Authorization", format!("Basic {encoded}"))
            }
            Credentials::Bearer { token } => {
                builder.header("Authorization", format!("Bearer {token}"))
            }
            Credentials::Headers(headers) => {
                let mut builder = builder;
                for (name, value) in headers {
                    builder = builder.header(name, value);
                }
                builder
            }
        }
    }

    /// Whether this credential kind can be applied to a WebSocket upgrade
    /// request. All three kinds here are plain HTTP headers, so they can —
    /// this distinction only matters for transports that can't set request
    /// headers on the upgrade handshake (e.g. a browser `WebSocket`
    /// constructor); `tokio-tungstenite` always can.
    pub fn supports_header_transport(&self) -> bool {
        true
    }

    /// Render this credential kind as a header list, for transports (like
    /// the WebSocket upgrade) that take headers directly rather than a
    /// `reqwest::RequestBuilder`.
    pub fn as_headers(&self) -> Vec<(String, String)> {
        match self {
            Credentials::None => Vec::new(),
            Credentials::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                vec![("Authorization".to_string(), format!("Basic {encoded}"))]
            }
            Credentials::Bearer { token } => {
                vec![("Authorization".to_string(), format!("Bearer {token}"))]
            }
            Credentials::Headers(headers) => headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_encodes_username_password() {
        let creds = Credentials::Basic {
            username: "alice".into(),
            password: "secret".into(),
        };
        let headers = creds.as_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Authorization");
        assert!(headers[0].1.starts_with("Basic "));
    }

    #[test]
    fn bearer_passes_token_through() {
        let creds = Credentials::Bearer { token: "tok123".into() };
        let headers = creds.as_headers();
        assert_eq!(headers[0].1, "Bearer tok123");
    }

    #[test]
    fn headers_pass_through_verbatim() {
        let mut map = HashMap::new();
        map.insert("X-Api-Key".to_string(), "zzz".to_string());
        let creds = Credentials::Headers(map);
        let headers = creds.as_headers();
        assert_eq!(headers, vec![("X-Api-Key".to_string(), "zzz".to_string())]);
    }
}
