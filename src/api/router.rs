use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware, Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::handlers;
use super::types::SharedState;
use crate::auth;
use crate::ratelimit::{self, RateLimiter};

/// Throttle only the routes registered on `router` so far.
fn limited(router: Router<SharedState>, limiter: &Arc<RateLimiter>) -> Router<SharedState> {
    router.route_layer(middleware::from_fn_with_state(
        limiter.clone(),
        ratelimit::enforce,
    ))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));
    if origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin.trim()) {
        Ok(v) => layer.allow_origin(AllowOrigin::exact(v)),
        Err(_) => {
            warn!(origin, "invalid CORS origin; cross-origin requests will be refused");
            layer
        }
    }
}

pub fn build_router(state: SharedState) -> Router {
    let limiters = &state.limiters;
    let server = &state.config.server;

    let api = Router::new()
        .nest(
            "/auth",
            limited(handlers::auth::credential_routes(), &limiters.auth)
                .merge(handlers::auth::session_routes()),
        )
        .nest("/academic", handlers::academic::routes())
        .nest("/finance", handlers::finance::routes())
        .nest("/hr", handlers::hr::routes())
        .nest("/notifications", handlers::notifications::routes())
        .nest("/admin", limited(handlers::admin::routes(), &limiters.admin))
        .nest(
            "/uploads",
            limited(
                handlers::uploads::upload_routes(server.max_upload_bytes),
                &limiters.upload,
            )
            .merge(handlers::uploads::read_routes()),
        )
        .nest("/search", limited(handlers::search::routes(), &limiters.search))
        .layer(middleware::from_fn_with_state(
            limiters.general.clone(),
            ratelimit::enforce,
        ));

    Router::new()
        .nest("/api", api)
        .merge(handlers::core::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::attach_user,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.cors_origin))
        .with_state(state.clone())
}
