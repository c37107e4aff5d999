// Upstream credentials extractor for the relay
//
// This module resolves the upstream endpoint and API key of a request.
// Values sent in the `x-api-endpoint` / `x-api-key` headers take precedence
// over the relay's configured defaults. A request for which neither source
// provides both values is rejected before any upstream call is made.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use log::{debug, warn};

use crate::client::{API_ENDPOINT_HEADER, API_KEY_HEADER};
use crate::config::{ApiCredentials, RelayConfig};
use crate::error::HandlerError;

/// Credentials of the upstream service for the current request
#[derive(Debug, Clone)]
pub struct UpstreamCredentials(pub ApiCredentials);

impl UpstreamCredentials {
    pub fn into_inner(self) -> ApiCredentials {
        self.0
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    let value = req.headers().get(name)?;
    match value.to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            warn!("Header {} contains invalid characters, ignoring it", name);
            None
        }
    }
}

/// Resolve the credentials of a request against the relay defaults
pub fn resolve_credentials(
    req: &HttpRequest,
    config: &RelayConfig,
) -> Result<ApiCredentials, HandlerError> {
    let endpoint = header(req, API_ENDPOINT_HEADER);
    let api_key = header(req, API_KEY_HEADER);

    config.credentials(endpoint, api_key).map_err(|e| {
        debug!("Rejecting request to {}: {}", req.path(), e);
        HandlerError::MissingConfiguration
    })
}

impl FromRequest for UpstreamCredentials {
    type Error = HandlerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<RelayConfig>>() {
            Some(config) => resolve_credentials(req, config).map(UpstreamCredentials),
            None => {
                warn!("Relay configuration not registered, rejecting request");
                Err(HandlerError::MissingConfiguration)
            }
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn config(endpoint: Option<&str>, api_key: Option<&str>) -> RelayConfig {
        RelayConfig {
            api_endpoint: endpoint.map(str::to_string),
            api_key: api_key.map(str::to_string),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_headers_override_defaults() {
        let req = TestRequest::default()
            .insert_header((API_ENDPOINT_HEADER, "https://caller.example"))
            .insert_header((API_KEY_HEADER, "caller"))
            .to_http_request();

        let creds =
            resolve_credentials(&req, &config(Some("https://default"), Some("default"))).unwrap();
        assert_eq!(creds.endpoint, "https://caller.example");
        assert_eq!(creds.api_key, "caller");
    }

    #[test]
    fn test_defaults_used_without_headers() {
        let req = TestRequest::default().to_http_request();
        let creds =
            resolve_credentials(&req, &config(Some("https://default"), Some("default"))).unwrap();
        assert_eq!(creds.endpoint, "https://default");
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let req = TestRequest::default()
            .insert_header((API_ENDPOINT_HEADER, "https://caller.example"))
            .to_http_request();
        let err = resolve_credentials(&req, &config(None, None)).unwrap_err();
        assert!(matches!(err, HandlerError::MissingConfiguration));
    }
}
