mod handlers;
pub mod middleware;

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::Catalog;

pub use handlers::ACTOR_HEADER;
pub use middleware::{RateLimiter, SecurityConfig};

/// Router with security settings taken from the environment.
pub fn create_router(catalog: Catalog) -> Router {
    create_router_with_config(catalog, SecurityConfig::from_env())
}

pub fn create_router_with_config(catalog: Catalog, config: SecurityConfig) -> Router {
    let mut protected = Router::new()
        // Components
        .route(
            "/components",
            get(handlers::list_components).post(handlers::create_component),
        )
        .route("/components/search", get(handlers::search_components))
        .route("/components/tree", get(handlers::component_tree))
        .route(
            "/components/{id}",
            get(handlers::get_component)
                .put(handlers::update_component)
                .delete(handlers::delete_component),
        )
        .route("/components/{id}/history", get(handlers::component_history))
        // Subcomponents
        .route(
            "/components/{id}/subcomponents",
            post(handlers::add_subcomponent),
        )
        .route(
            "/components/{id}/subcomponents/{child_id}",
            put(handlers::associate_subcomponent).delete(handlers::disassociate_subcomponent),
        )
        // Descriptions
        .route(
            "/components/{id}/descriptions",
            post(handlers::add_description),
        )
        .route(
            "/components/{id}/descriptions/{description_id}",
            put(handlers::edit_description).delete(handlers::remove_description),
        )
        .route("/descriptions", get(handlers::list_descriptions))
        .route("/descriptions/{id}", get(handlers::get_description))
        // History
        .route("/histories", get(handlers::list_histories))
        .route(
            "/histories/{id}",
            get(handlers::get_history)
                .put(handlers::update_history)
                .delete(handlers::delete_history),
        )
        .route("/integrity", get(handlers::integrity))
        .route_layer(axum::middleware::from_fn_with_state(
            config.clone(),
            middleware::auth_middleware,
        ));

    if let Some(limiter) = config.rate_limiter.clone() {
        protected = protected.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    let api = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config)),
        )
        .with_state(catalog)
}

fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
