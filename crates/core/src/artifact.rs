use serde::{Deserialize, Serialize};

use crate::{ResourceType, Time};

/// A repository as exposed by the registry catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub project_id: i64,
    /// Full repository name, e.g. `library/nginx`.
    pub name: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: ResourceType,
}

fn default_resource_type() -> ResourceType {
    ResourceType::Image
}

/// One tag of a repository, the unit retention decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub repository: String,
    pub tag: String,
    pub pushed_at: Time,
    pub created_at: Time,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Candidate {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}
