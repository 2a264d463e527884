//! Application template catalog.
//!
//! Templates are immutable once loaded. The engine only reads the
//! resource requirements and the compose descriptor; everything else is
//! display metadata for the catalog listing.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ResourceProfile, StackDescriptor};

/// Placeholder tokens replaced with fresh secrets at deploy time.
const SECRET_PLACEHOLDERS: [&str; 2] = ["__GENERATED_PASSWORD__", "__GENERATED_ROOT_PASSWORD__"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate app id in catalog: {0}")]
    DuplicateApp(String),
}

/// A deployable application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub requirements: ResourceProfile,
    pub docker_compose: String,
    /// Local port the tunnel exposes.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Supporting files written next to the compose file.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub estimated_daily_cost: f64,
}

fn default_port() -> u16 {
    80
}

impl AppTemplate {
    /// Render the stack descriptor for one deployment, filling secret
    /// placeholders with fresh random tokens.
    pub fn render_stack(&self) -> StackDescriptor {
        let mut compose = self.docker_compose.clone();
        for placeholder in SECRET_PLACEHOLDERS {
            if compose.contains(placeholder) {
                compose = compose.replace(placeholder, &random_token());
            }
        }
        StackDescriptor {
            project: self.id.clone(),
            compose,
            files: self.files.clone(),
        }
    }
}

/// Catalog category shown next to the app listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Read access to application templates.
pub trait TemplateCatalog: Send + Sync {
    fn get(&self, app_id: &str) -> Option<AppTemplate>;
    fn list(&self) -> Vec<AppTemplate>;
    fn categories(&self) -> Vec<Category>;
}

#[derive(Deserialize)]
struct CatalogFile {
    apps: Vec<AppTemplate>,
    #[serde(default)]
    categories: Vec<Category>,
}

/// Catalog loaded once from an `apps.json` file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    apps: BTreeMap<String, AppTemplate>,
    categories: Vec<Category>,
}

impl StaticCatalog {
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::from_templates(file.apps, file.categories)
    }

    pub fn from_templates(
        templates: Vec<AppTemplate>,
        categories: Vec<Category>,
    ) -> Result<Self, CatalogError> {
        let mut apps = BTreeMap::new();
        for template in templates {
            if apps.contains_key(&template.id) {
                return Err(CatalogError::DuplicateApp(template.id));
            }
            apps.insert(template.id.clone(), template);
        }
        Ok(Self { apps, categories })
    }
}

impl TemplateCatalog for StaticCatalog {
    fn get(&self, app_id: &str) -> Option<AppTemplate> {
        self.apps.get(app_id).cloned()
    }

    fn list(&self) -> Vec<AppTemplate> {
        self.apps.values().cloned().collect()
    }

    fn categories(&self) -> Vec<Category> {
        self.categories.clone()
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    if getrandom::getrandom(&mut bytes).is_err() {
        // Unreachable on supported targets; never hand out a constant secret.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        bytes = nanos.to_le_bytes();
    }
    URL_SAFE_NO_PAD.encode(bytes)
}
