//! Scope resolution: `(level, reference)` → concrete repositories.

use std::sync::Arc;

use retention_core::{Repository, Result, RetentionError, Scope, ScopeLevel};
use tracing::debug;

use crate::catalog::RegistryCatalog;

pub struct ScopeResolver {
    catalog: Arc<dyn RegistryCatalog>,
}

impl ScopeResolver {
    pub fn new(catalog: Arc<dyn RegistryCatalog>) -> Self {
        Self { catalog }
    }

    /// Expand a scope into the repositories an execution runs over.
    ///
    /// A dangling project or repository reference is `ScopeNotFound`. An
    /// existing project with no repositories resolves to an empty set.
    pub async fn resolve(&self, scope: &Scope) -> Result<Vec<Repository>> {
        let repositories = match scope.level {
            ScopeLevel::System => self.catalog.list_repositories(None).await?,
            ScopeLevel::Project => {
                if !self.catalog.project_exists(scope.reference).await? {
                    return Err(RetentionError::ScopeNotFound(format!(
                        "project {} does not exist",
                        scope.reference
                    )));
                }
                self.catalog.list_repositories(Some(scope.reference)).await?
            }
            ScopeLevel::Repository => match self.catalog.get_repository(scope.reference).await? {
                Some(repository) => vec![repository],
                None => {
                    return Err(RetentionError::ScopeNotFound(format!(
                        "repository {} does not exist",
                        scope.reference
                    )))
                }
            },
        };

        debug!(scope = %scope, repositories = repositories.len(), "scope resolved");
        Ok(repositories)
    }
}
