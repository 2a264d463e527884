//! skylift-api — REST surface of the Skylift engine.
//!
//! A thin axum layer over [`DeploymentService`]: requests are validated
//! and accepted synchronously, the pipeline itself runs in the background
//! and is observed by polling the deployment record.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/apps` | List deployable applications, optionally `?category=` |
//! | GET | `/api/v1/apps/{id}` | Get one application |
//! | GET | `/api/v1/categories` | List catalog categories |
//! | POST | `/api/v1/deployments` | Start a deployment (202 + id) |
//! | GET | `/api/v1/deployments` | List deployments, optionally `?owner=` |
//! | GET | `/api/v1/deployments/{id}` | Get a deployment record |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use skylift_orchestrator::DeploymentService;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: DeploymentService,
}

/// Build the API router.
pub fn build_router(service: DeploymentService) -> Router {
    let api_routes = Router::new()
        .route("/apps", get(handlers::list_apps))
        .route("/apps/{id}", get(handlers::get_app))
        .route("/categories", get(handlers::list_categories))
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route("/deployments/{id}", get(handlers::get_deployment))
        .with_state(ApiState { service });

    Router::new().nest("/api/v1", api_routes)
}
