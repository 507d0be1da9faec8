use axum::{http::Method, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod agents;
pub mod bookings;
pub mod error;
pub mod flights;
pub mod middleware;
pub mod state;
pub mod tickets;

pub use error::AppError;
pub use state::{AppState, AuthConfig};

/// Back-office router: `/health` is open, everything under `/v1` needs a staff token.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let protected = Router::new()
        .merge(flights::routes())
        .merge(bookings::routes())
        .merge(tickets::routes())
        .merge(agents::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::staff_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
