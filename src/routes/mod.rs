pub mod api;

use std::path::Path;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeFile,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{docs::ApiDoc, handlers::live, AppState};
pub use api::create_api_routes;

/// Build the complete application router
pub fn create_app(state: AppState) -> Router {
    let front = Path::new(&state.config.front_dir).to_path_buf();

    Router::new()
        // Browser assets
        .route_service("/", ServeFile::new(front.join("index.html")))
        .route_service("/r/:id", ServeFile::new(front.join("room.html")))
        .route_service("/i.js", ServeFile::new(front.join("inject.js")))
        .route_service("/wsproxy", ServeFile::new(front.join("wsproxy.html")))
        // Mount API routes
        .nest("/api", create_api_routes(state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        // Added after the trace layer so liveness checks stay out of the request log
        .route("/live", get(live))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET]),
        )
}
