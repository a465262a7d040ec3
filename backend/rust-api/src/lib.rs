use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// Adds a Content-Security-Policy header to every response
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/progress", progress_routes(app_state.clone()))
        .merge(user_routes(app_state.clone()))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn progress_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Reads answer anonymous callers with zeroed projections
    let read_routes = Router::new()
        .route("/parts/{part_id}", get(handlers::progress::get_part_progress))
        .route("/dashboard", get(handlers::progress::get_dashboard))
        .route(
            "/exercises/{exercise_id}",
            get(handlers::progress::get_exercise_status),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::optional_auth_middleware,
        ));

    let submit_routes = Router::new()
        .route("/exercises", post(handlers::progress::submit_exercise))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    read_routes.merge(submit_routes)
}

fn user_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public_routes =
        Router::new().route("/api/v1/leaderboard", get(handlers::users::get_leaderboard));

    let protected_routes = Router::new()
        .route("/api/v1/users/me/stats", get(handlers::users::get_my_stats))
        .route("/api/v1/users/me/tree", get(handlers::users::get_my_tree))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}
