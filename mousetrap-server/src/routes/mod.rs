use axum::{
    Router,
    routing::get,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    health::{health_handler, root_handler},
    tasks::{create_task_handler, get_task_handler, list_tasks_handler},
};
use crate::infra::app_state::AppState;

pub mod v1 {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const TASKS: &str = "/api/tasks";
    pub const TASK: &str = "/api/tasks/{*file_path}";
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(v1::ROOT, get(root_handler))
        .route(v1::HEALTH, get(health_handler))
        .route(v1::TASKS, get(list_tasks_handler).post(create_task_handler))
        .route(v1::TASK, get(get_task_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
