//! CORS layer built from the `[cors]` configuration section.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::{is_wildcard, CorsSettings};

/// Build the CORS layer for the task API.
///
/// With credentials enabled a wildcard entry echoes the request value
/// back, since browsers reject a literal `*` alongside credentials.
/// Entries that fail to parse are skipped; configuration validation
/// rejects them at load time.
#[must_use]
pub fn build_cors_layer(settings: &CorsSettings) -> CorsLayer {
    let credentials = settings.allow_credentials;

    let origin = if settings.origins.iter().any(|o| is_wildcard(o)) {
        if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        let parsed: Vec<HeaderValue> = settings
            .origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    let methods = if settings.allow_methods.iter().any(|m| is_wildcard(m)) {
        if credentials {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::any()
        }
    } else {
        let parsed: Vec<Method> = settings
            .allow_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
            .collect();
        AllowMethods::list(parsed)
    };

    let headers = if settings.allow_headers.iter().any(|h| is_wildcard(h)) {
        if credentials {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::any()
        }
    } else {
        let parsed: Vec<HeaderName> = settings
            .allow_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect();
        AllowHeaders::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(credentials)
}
