use serde::{Deserialize, Serialize};

/// 1-based pagination. `page_size == 0` returns everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

impl Default for Query {
    fn default() -> Self {
        Self { page: 1, page_size: 0 }
    }
}

impl Query {
    pub fn page(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    /// Slice an already-ordered list down to the requested page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.page_size == 0 {
            return items;
        }
        let skip = self.page.saturating_sub(1).saturating_mul(self.page_size);
        items.into_iter().skip(skip).take(self.page_size).collect()
    }
}
