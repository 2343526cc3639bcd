//! List responses come back either as a bare JSON array or as a page object
//! (`{"count", "next", "previous", "results"}`). Both are flattened into one
//! ordered `Vec`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ApiError, Gateway};

/// Upper bound on pages followed for one listing.
/// Protects against a server that keeps returning a `next` link.
const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Flat(Vec<T>),
    Page(Page<T>),
}

#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> ListResponse<T> {
    /// Records on this page and the link to the next one
    pub fn into_parts(self) -> (Vec<T>, Option<String>) {
        match self {
            ListResponse::Flat(records) => (records, None),
            ListResponse::Page(page) => (page.results, page.next.filter(|n| !n.is_empty())),
        }
    }

    pub fn into_records(self) -> Vec<T> {
        self.into_parts().0
    }
}

/// Fetch `endpoint` and every following page, in server order.
pub async fn fetch_all<T: DeserializeOwned>(gateway: &Gateway, endpoint: &str) -> Result<Vec<T>, ApiError> {
    let mut records = Vec::new();
    let mut next = Some(endpoint.to_string());
    let mut pages = 0;

    while let Some(url) = next.take() {
        if pages == MAX_PAGES {
            warn!(endpoint, pages, "Page limit reached; listing is incomplete");
            break;
        }
        let page: ListResponse<T> = gateway.get_json(&url).await?;
        let (mut page_records, following) = page.into_parts();
        records.append(&mut page_records);
        next = following;
        pages += 1;
    }

    debug!(endpoint, pages, records = records.len(), "Listing fetched");
    Ok(records)
}
