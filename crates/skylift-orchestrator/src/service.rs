//! Request-facing entry points: start, inspect and list deployments.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use skylift_core::{
    CredentialSource, DeploymentId, DeploymentRecord, PublicKey, TemplateCatalog,
    new_deployment_id,
};
use skylift_state::DeploymentRepository;

use crate::error::{ServiceError, ServiceResult};
use crate::orchestrator::{DeploymentJob, Orchestrator};

/// A deployment accepted for processing.
#[derive(Debug)]
pub struct StartedDeployment {
    pub id: DeploymentId,
    /// Resolves to the terminal record. Dropping it does not stop the task.
    pub task: JoinHandle<DeploymentRecord>,
}

#[derive(Clone)]
pub struct DeploymentService {
    repo: Arc<dyn DeploymentRepository>,
    catalog: Arc<dyn TemplateCatalog>,
    credentials: Arc<dyn CredentialSource>,
    orchestrator: Arc<Orchestrator>,
}

impl DeploymentService {
    pub fn new(
        repo: Arc<dyn DeploymentRepository>,
        catalog: Arc<dyn TemplateCatalog>,
        credentials: Arc<dyn CredentialSource>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            repo,
            catalog,
            credentials,
            orchestrator,
        }
    }

    pub fn catalog(&self) -> &dyn TemplateCatalog {
        self.catalog.as_ref()
    }

    /// Validate the request, persist a `Pending` record and spawn its
    /// orchestration task. Returns as soon as the record is visible.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_deployment(
        &self,
        app_id: &str,
        owner: &str,
        user_public_key: &str,
    ) -> ServiceResult<StartedDeployment> {
        let template = self
            .catalog
            .get(app_id)
            .ok_or_else(|| ServiceError::UnknownApp(app_id.to_string()))?;
        let user_key = PublicKey::parse(user_public_key)
            .map_err(|e| ServiceError::InvalidUserKey(e.to_string()))?;
        let credential = self.credentials.automation_credential()?;

        let record = DeploymentRecord::new(new_deployment_id(), owner, app_id);
        self.repo.put(&record)?;
        let id = record.id.clone();
        info!(
            deployment_id = %id,
            app_id,
            owner,
            profile = %template.requirements,
            "deployment accepted"
        );

        let job = DeploymentJob {
            stack: template.render_stack(),
            template,
            user_public_key: user_key.to_string(),
            credential,
        };
        let orchestrator = self.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.run(record, job).await });

        Ok(StartedDeployment { id, task })
    }

    pub fn get_deployment_status(&self, id: &str) -> ServiceResult<DeploymentRecord> {
        self.repo
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Newest first; restricted to `owner` when given.
    pub fn list_deployments(&self, owner: Option<&str>) -> ServiceResult<Vec<DeploymentRecord>> {
        let mut records = match owner {
            Some(owner) => self.repo.list_by_owner(owner)?,
            None => self.repo.list()?,
        };
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}
