use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS policy for a browser-facing API.
///
/// With no origins configured, development allows any origin and production
/// allows none. Configured origins may send credentials.
pub fn cors_layer(origins: &[String], production: bool) -> CorsLayer {
    if origins.is_empty() {
        if production {
            tracing::warn!("ALLOWED_ORIGINS is empty; cross-origin requests will be refused");
            return CorsLayer::new();
        }
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}
