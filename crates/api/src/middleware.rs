use axum::http::{header, HeaderValue, Method};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use printquota_infra::AllowedOrigins;

/// CORS for browser front-ends: JSON bodies over GET/POST, preflight handled
/// here. Origins that fail to parse as header values are skipped.
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let allow_origin = match origins {
        AllowedOrigins::Any => AllowOrigin::from(Any),
        AllowedOrigins::List(list) => {
            let values = list
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect::<Vec<_>>();
            AllowOrigin::list(values)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_layers_for_every_origin_setting() {
        let _ = cors_layer(&AllowedOrigins::Any);
        let _ = cors_layer(&AllowedOrigins::List(vec![
            "https://print.example".to_string(),
            "bad\norigin".to_string(),
        ]));
        let _ = trace_layer();
    }
}
