use std::{fmt::Display, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use turnip_core::config::Config;

use crate::events::Event;

/// Verify and extract GitHub Event Payload.
#[derive(Clone)]
#[must_use]
pub struct GitHubEvent {
    pub delivery: Option<String>,
    pub event: Event,
}

/// Check an `X-Hub-Signature-256` header value against the body.
pub fn verify_signature(secret: &str, header: &str, body: &[u8]) -> Result<(), &'static str> {
    let signature = header
        .strip_prefix("sha256=")
        .ok_or("X-Hub-Signature-256 sha256= prefix missing")?;
    let signature = hex::decode(signature).map_err(|_| "X-Hub-Signature-256 malformed")?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid webhook secret")?;
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| "signature mismatch")
}

/// Compare a shared secret in constant time by checking the HMAC tag of
/// `given` against the tag of `expected`.
pub fn verify_token(expected: &str, given: &str) -> bool {
    let tag = |value: &str| {
        Hmac::<Sha256>::new_from_slice(expected.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (tag(expected), tag(given)) {
        (Ok(expected), Ok(given)) => given.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}

impl<S> FromRequest<S> for GitHubEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync + Clone,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        fn err(m: impl Display) -> Response {
            tracing::error!("{m}");
            (StatusCode::BAD_REQUEST, m.to_string()).into_response()
        }
        let (kind, delivery, signature) = {
            let header = |name: &str| {
                req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
            };
            let kind = header("X-GitHub-Event").ok_or_else(|| err("X-GitHub-Event header missing"))?;
            (kind, header("X-GitHub-Delivery"), header("X-Hub-Signature-256"))
        };
        let config = <Arc<Config>>::from_ref(state);
        let body = Bytes::from_request(req, state).await.map_err(|_| err("error reading body"))?;
        if let Some(secret) = &config.github.webhook_secret {
            let signature = signature.ok_or_else(|| err("X-Hub-Signature-256 missing"))?;
            verify_signature(secret, &signature, &body).map_err(err)?;
        }
        let event = Event::parse(&kind, &body).map_err(|e| err(format!("error parsing body: {e:#}")))?;
        Ok(GitHubEvent { delivery, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_verify_signature() {
        let body = br#"{"zen":"Keep it logically awesome."}"#;
        let header = sign("secret", body);
        assert_eq!(verify_signature("secret", &header, body), Ok(()));
        assert_eq!(verify_signature("other", &header, body), Err("signature mismatch"));
        assert_eq!(
            verify_signature("secret", header.trim_start_matches("sha256="), body),
            Err("X-Hub-Signature-256 sha256= prefix missing")
        );
        assert_eq!(
            verify_signature("secret", "sha256=zz", body),
            Err("X-Hub-Signature-256 malformed")
        );
    }

    #[test]
    fn test_verify_token() {
        assert!(verify_token("api-token", "api-token"));
        assert!(!verify_token("api-token", "api-tokem"));
        assert!(!verify_token("api-token", "api"));
        assert!(!verify_token("api-token", ""));
        assert!(!verify_token("", "api-token"));
    }
}
