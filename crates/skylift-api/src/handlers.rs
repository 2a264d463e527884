//! REST API handlers.
//!
//! Each handler calls into `DeploymentService` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::warn;

use skylift_core::{AppTemplate, ResourceProfile};
use skylift_orchestrator::ServiceError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn service_error(e: ServiceError) -> axum::response::Response {
    let status = match &e {
        ServiceError::UnknownApp(_) | ServiceError::InvalidUserKey(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Credential(_) | ServiceError::State(_) => {
            warn!(error = %e, "request failed on the server side");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&e.to_string(), status).into_response()
}

// ── Catalog ────────────────────────────────────────────────────

/// Catalog entry as listed to clients; the compose text stays server-side.
#[derive(Debug, Serialize)]
pub struct AppSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub requirements: ResourceProfile,
    pub port: u16,
    pub estimated_daily_cost: f64,
}

impl From<AppTemplate> for AppSummary {
    fn from(t: AppTemplate) -> Self {
        Self {
            id: t.id,
            name: t.name,
            description: t.description,
            category: t.category,
            requirements: t.requirements,
            port: t.port,
            estimated_daily_cost: t.estimated_daily_cost,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppsQuery {
    pub category: Option<String>,
}

/// GET /api/v1/apps
pub async fn list_apps(
    State(state): State<ApiState>,
    Query(query): Query<AppsQuery>,
) -> impl IntoResponse {
    let apps: Vec<AppSummary> = state
        .service
        .catalog()
        .list()
        .into_iter()
        .filter(|t| query.category.as_deref().is_none_or(|c| t.category == c))
        .map(AppSummary::from)
        .collect();
    ApiResponse::ok(apps)
}

/// GET /api/v1/apps/:id
pub async fn get_app(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.service.catalog().get(&id) {
        Some(template) => ApiResponse::ok(AppSummary::from(template)).into_response(),
        None => error_response(&format!("app not found: {id}"), StatusCode::NOT_FOUND).into_response(),
    }
}

/// GET /api/v1/categories
pub async fn list_categories(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.service.catalog().categories())
}

// ── Deployments ────────────────────────────────────────────────

/// Deploy request body.
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub app_id: String,
    /// Wallet address or account name of the requester.
    pub owner: String,
    /// OpenSSH public key granted access to the instance.
    pub ssh_public_key: String,
}

#[derive(Debug, Serialize)]
struct Accepted {
    id: String,
    status: &'static str,
}

/// POST /api/v1/deployments
pub async fn create_deployment(
    State(state): State<ApiState>,
    Json(req): Json<DeployRequest>,
) -> impl IntoResponse {
    match state
        .service
        .start_deployment(&req.app_id, &req.owner, &req.ssh_public_key)
    {
        Ok(started) => (
            StatusCode::ACCEPTED,
            ApiResponse::ok(Accepted {
                id: started.id,
                status: "PENDING",
            }),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner: Option<String>,
}

/// GET /api/v1/deployments
pub async fn list_deployments(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.service.list_deployments(query.owner.as_deref()) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => service_error(e),
    }
}

/// GET /api/v1/deployments/:id
pub async fn get_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.service.get_deployment_status(&id) {
        Ok(record) => ApiResponse::ok(record).into_response(),
        Err(e) => service_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use skylift_core::config::{NetworkConfig, SkyliftConfig, SshConfig};
    use skylift_core::{
        AutomationCredential, CredentialError, CredentialSource, PublicKey, StaticCatalog,
    };
    use skylift_network::NetworkResolver;
    use skylift_orchestrator::{DeploymentService, Orchestrator};
    use skylift_provision::ManualProvisioner;
    use skylift_remote::SshExecutor;
    use skylift_state::{DeploymentRepository, StateStore};

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGJhc2U2NGtleWJvZHlmb3J0ZXN0aW5nb25seTAwMDA= skylift-automation";

    const CATALOG: &str = r#"{
        "apps": [{
            "id": "uptime-kuma",
            "name": "Uptime Kuma",
            "category": "monitoring",
            "requirements": { "vcpus": 1, "memory_mb": 2048, "disk_gb": 20 },
            "docker_compose": "services:\n  kuma:\n    image: louislam/uptime-kuma:1\n",
            "port": 3001,
            "estimated_daily_cost": 0.35
        }]
    }"#;

    struct FixedCredential;

    impl CredentialSource for FixedCredential {
        fn automation_credential(&self) -> Result<AutomationCredential, CredentialError> {
            Ok(AutomationCredential {
                public_key: PublicKey::parse(KEY)?,
                identity_file: "/keys/automation".into(),
                user: "root".to_string(),
            })
        }
    }

    // Manual provisioning fails before anything touches the network.
    fn test_state() -> ApiState {
        let repo: Arc<dyn DeploymentRepository> = Arc::new(StateStore::open_in_memory().unwrap());
        let orchestrator = Orchestrator::new(
            repo.clone(),
            Arc::new(ManualProvisioner::default()),
            Arc::new(NetworkResolver::from_config(&NetworkConfig::default())),
            Arc::new(SshExecutor::from_config(&SshConfig::default())),
            &SkyliftConfig::default(),
        );
        let service = DeploymentService::new(
            repo,
            Arc::new(StaticCatalog::from_json_str(CATALOG).unwrap()),
            Arc::new(FixedCredential),
            Arc::new(orchestrator),
        );
        ApiState { service }
    }

    fn deploy_request(app_id: &str, key: &str) -> DeployRequest {
        DeployRequest {
            app_id: app_id.to_string(),
            owner: "0xabc".to_string(),
            ssh_public_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn list_apps_returns_catalog() {
        let resp = list_apps(State(test_state()), Query(AppsQuery { category: None }))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_app_found_and_missing() {
        let resp = get_app(State(test_state()), Path("uptime-kuma".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_app(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_is_accepted() {
        let state = test_state();
        let resp = create_deployment(State(state.clone()), Json(deploy_request("uptime-kuma", KEY)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(state.service.list_deployments(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_unknown_app_is_bad_request() {
        let resp = create_deployment(State(test_state()), Json(deploy_request("nope", KEY)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_bad_key_is_bad_request() {
        let resp = create_deployment(
            State(test_state()),
            Json(deploy_request("uptime-kuma", "hunter2")),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_nonexistent_deployment() {
        let resp = get_deployment(State(test_state()), Path("dep-nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_deployments_empty() {
        let resp = list_deployments(State(test_state()), Query(ListQuery { owner: None }))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn app_summary_hides_compose() {
        let catalog = StaticCatalog::from_json_str(CATALOG).unwrap();
        let summary = AppSummary::from(skylift_core::TemplateCatalog::get(&catalog, "uptime-kuma").unwrap());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["port"], 3001);
        assert!(json.get("docker_compose").is_none());
    }
}
