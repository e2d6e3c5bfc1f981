//! Registry catalog collaborator.
//!
//! [`RegistryCatalog`] is the engine's only view of the registry: repository
//! enumeration, tag listing with push/creation times and labels, and tag
//! deletion. [`InMemoryCatalog`] backs tests and the preview binary.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use retention_core::{Candidate, Repository, ResourceType, Result, RetentionError, Time};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[async_trait]
pub trait RegistryCatalog: Send + Sync {
    /// Whether the project exists.
    async fn project_exists(&self, project_id: i64) -> Result<bool>;

    /// Repositories of one project, or of every project when `None`.
    async fn list_repositories(&self, project_id: Option<i64>) -> Result<Vec<Repository>>;

    async fn get_repository(&self, repository_id: i64) -> Result<Option<Repository>>;

    /// Every tag of the repository with its timestamps and labels.
    async fn list_candidates(&self, repository: &Repository) -> Result<Vec<Candidate>>;

    async fn delete_tag(&self, repository: &Repository, tag: &str) -> Result<()>;
}

// ── Snapshot format ─────────────────────────────────────────────────

/// Serializable catalog contents, as read by the preview binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub projects: Vec<ProjectSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: i64,
    #[serde(default)]
    pub repositories: Vec<RepositorySnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub tags: Vec<TagSnapshot>,
}

fn default_resource_type() -> ResourceType {
    ResourceType::Image
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSnapshot {
    pub tag: String,
    pub pushed_at: Time,
    /// Defaults to `pushed_at`.
    #[serde(default)]
    pub created_at: Option<Time>,
    #[serde(default)]
    pub labels: Vec<String>,
}

// ── In-memory catalog ───────────────────────────────────────────────

#[derive(Debug, Default)]
struct CatalogState {
    projects: BTreeSet<i64>,
    repositories: BTreeMap<i64, Repository>,
    /// Repository name → tags.
    tags: BTreeMap<String, Vec<Candidate>>,
    deleted: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &CatalogSnapshot) -> Self {
        let mut state = CatalogState::default();
        for project in &snapshot.projects {
            state.projects.insert(project.id);
            for repo in &project.repositories {
                state.repositories.insert(
                    repo.id,
                    Repository {
                        id: repo.id,
                        project_id: project.id,
                        name: repo.name.clone(),
                        resource_type: repo.resource_type,
                    },
                );
                let tags = repo
                    .tags
                    .iter()
                    .map(|t| Candidate {
                        repository: repo.name.clone(),
                        tag: t.tag.clone(),
                        pushed_at: t.pushed_at,
                        created_at: t.created_at.unwrap_or(t.pushed_at),
                        labels: t.labels.clone(),
                    })
                    .collect();
                state.tags.insert(repo.name.clone(), tags);
            }
        }
        Self { state: RwLock::new(state) }
    }

    pub async fn add_project(&self, project_id: i64) {
        self.state.write().await.projects.insert(project_id);
    }

    /// Register a repository (and its project) and return it.
    pub async fn add_repository(&self, id: i64, project_id: i64, name: &str) -> Repository {
        let repo = Repository {
            id,
            project_id,
            name: name.to_string(),
            resource_type: ResourceType::Image,
        };
        let mut state = self.state.write().await;
        state.projects.insert(project_id);
        state.repositories.insert(id, repo.clone());
        state.tags.entry(name.to_string()).or_default();
        repo
    }

    pub async fn add_tag(&self, repository: &str, tag: &str, pushed_at: Time, labels: &[&str]) {
        let candidate = Candidate {
            repository: repository.to_string(),
            tag: tag.to_string(),
            pushed_at,
            created_at: pushed_at,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        };
        self.state
            .write()
            .await
            .tags
            .entry(repository.to_string())
            .or_default()
            .push(candidate);
    }

    /// Remaining tag names of a repository.
    pub async fn tags(&self, repository: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .tags
            .get(repository)
            .map(|tags| tags.iter().map(|c| c.tag.clone()).collect())
            .unwrap_or_default()
    }

    /// Every `(repository, tag)` deleted so far, in call order.
    pub async fn deleted(&self) -> Vec<(String, String)> {
        self.state.read().await.deleted.clone()
    }
}

#[async_trait]
impl RegistryCatalog for InMemoryCatalog {
    async fn project_exists(&self, project_id: i64) -> Result<bool> {
        Ok(self.state.read().await.projects.contains(&project_id))
    }

    async fn list_repositories(&self, project_id: Option<i64>) -> Result<Vec<Repository>> {
        let state = self.state.read().await;
        Ok(state
            .repositories
            .values()
            .filter(|r| project_id.map_or(true, |p| r.project_id == p))
            .cloned()
            .collect())
    }

    async fn get_repository(&self, repository_id: i64) -> Result<Option<Repository>> {
        Ok(self.state.read().await.repositories.get(&repository_id).cloned())
    }

    async fn list_candidates(&self, repository: &Repository) -> Result<Vec<Candidate>> {
        let state = self.state.read().await;
        state.tags.get(&repository.name).cloned().ok_or_else(|| {
            RetentionError::ExternalIo(format!("repository {} not found", repository.name))
        })
    }

    async fn delete_tag(&self, repository: &Repository, tag: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let tags = state.tags.get_mut(&repository.name).ok_or_else(|| {
            RetentionError::ExternalIo(format!("repository {} not found", repository.name))
        })?;
        let before = tags.len();
        tags.retain(|c| c.tag != tag);
        if tags.len() == before {
            return Err(RetentionError::ExternalIo(format!(
                "tag {}:{} not found",
                repository.name, tag
            )));
        }
        state.deleted.push((repository.name.clone(), tag.to_string()));
        Ok(())
    }
}
