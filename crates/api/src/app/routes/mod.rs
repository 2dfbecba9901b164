use axum::{Router, routing::get};

pub mod appointments;
pub mod checklogs;
pub mod passes;
pub mod system;
pub mod users;
pub mod visitors;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/passes", passes::router())
        .nest("/checklogs", checklogs::router())
        .nest("/visitors", visitors::router())
        .nest("/appointments", appointments::router())
        .nest("/users", users::router())
}
