use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{html_to_text, ChildPage, CorpusClient, RemoteError, RemoteErrorKind};
use crate::config::RemoteConfig;
use crate::error::{DocgraphError, Result};
use crate::models::{parse_timestamp, Document};

const EXPAND: &str = "body.storage,version,history,space,ancestors";

#[derive(Deserialize)]
struct ChildListing {
    #[serde(default)]
    results: Vec<PageJson>,
    #[serde(default, rename = "_links")]
    links: Option<ListingLinks>,
}

#[derive(Deserialize)]
struct ListingLinks {
    next: Option<String>,
}

#[derive(Deserialize)]
struct PageJson {
    id: String,
    #[serde(default)]
    title: String,
    space: Option<SpaceJson>,
    version: Option<VersionJson>,
    history: Option<HistoryJson>,
    body: Option<BodyJson>,
    #[serde(default)]
    ancestors: Vec<AncestorJson>,
}

#[derive(Deserialize)]
struct SpaceJson {
    key: String,
}

#[derive(Deserialize)]
struct VersionJson {
    when: Option<String>,
    by: Option<UserJson>,
}

#[derive(Deserialize)]
struct HistoryJson {
    #[serde(rename = "createdDate")]
    created_date: Option<String>,
    #[serde(rename = "createdBy")]
    created_by: Option<UserJson>,
    #[serde(rename = "lastUpdated")]
    last_updated: Option<VersionJson>,
}

#[derive(Deserialize)]
struct UserJson {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct BodyJson {
    storage: Option<StorageJson>,
}

#[derive(Deserialize)]
struct StorageJson {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct AncestorJson {
    id: String,
}

/// Confluence REST client (v1 content API, basic auth).
pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    page_size: usize,
}

impl ConfluenceClient {
    pub fn new(
        base_url: &str,
        credentials: Option<(String, String)>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocgraphError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            page_size: page_size.max(1),
        })
    }

    /// Build from config; credentials come from the configured env vars when both are set.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let credentials = match (
            std::env::var(&config.username_env),
            std::env::var(&config.token_env),
        ) {
            (Ok(user), Ok(token)) => Some((user, token)),
            _ => {
                log::warn!(
                    "{} / {} not set; calling {} anonymously",
                    config.username_env,
                    config.token_env,
                    config.base_url
                );
                None
            }
        };
        Self::new(
            &config.base_url,
            credentials,
            config.page_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Browser URL of a page.
    pub fn page_url(&self, page_id: &str, space_key: &str) -> String {
        if space_key.is_empty() {
            format!("{}/pages/viewpage.action?pageId={}", self.base_url, page_id)
        } else {
            format!("{}/spaces/{}/pages/{}", self.base_url, space_key, page_id)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        node_id: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, RemoteError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json");
        if let Some((user, token)) = &self.credentials {
            request = request.basic_auth(user, Some(token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(node_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::new(
                RemoteError::kind_for_status(status.as_u16()),
                node_id,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::from_reqwest(node_id, e))
    }

    fn to_document(
        &self,
        page: PageJson,
        parent_id: Option<String>,
    ) -> std::result::Result<Document, String> {
        let version = page.version.ok_or("missing version")?;
        let modified_raw = version.when.ok_or("missing version.when")?;
        let modified_at = parse_timestamp(&modified_raw).map_err(|e| e.to_string())?;

        let history = page.history;
        let created_at =
            parse_created(history.as_ref().and_then(|h| h.created_date.as_deref()))
                .unwrap_or(modified_at);
        let created_by = history
            .as_ref()
            .and_then(|h| h.created_by.as_ref())
            .and_then(|u| u.display_name.clone())
            .filter(|n| !n.trim().is_empty());
        let modified_by = version
            .by
            .and_then(|u| u.display_name)
            .or_else(|| {
                history
                    .as_ref()
                    .and_then(|h| h.last_updated.as_ref())
                    .and_then(|v| v.by.as_ref())
                    .and_then(|u| u.display_name.clone())
            })
            .filter(|n| !n.trim().is_empty());

        let space_key = page.space.map(|s| s.key).unwrap_or_default();
        let raw_content = page
            .body
            .and_then(|b| b.storage)
            .map(|s| html_to_text(&s.value))
            .unwrap_or_default();
        let parent_id = parent_id.or_else(|| page.ancestors.last().map(|a| a.id.clone()));

        Ok(Document {
            url: self.page_url(&page.id, &space_key),
            id: page.id,
            title: page.title,
            raw_content,
            space_key,
            parent_id,
            created_at,
            modified_at,
            created_by,
            modified_by,
        })
    }
}

fn parse_created(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|r| parse_timestamp(r).ok())
}

#[async_trait]
impl CorpusClient for ConfluenceClient {
    async fn list_children(
        &self,
        parent_id: &str,
        page: usize,
    ) -> std::result::Result<ChildPage, RemoteError> {
        let url = format!("{}/rest/api/content/{}/child/page", self.base_url, parent_id);
        let query = [
            ("start", (page * self.page_size).to_string()),
            ("limit", self.page_size.to_string()),
            ("expand", EXPAND.to_string()),
        ];
        let listing: ChildListing = self.get_json(parent_id, &url, &query).await?;

        let has_more = listing
            .links
            .as_ref()
            .map(|l| l.next.is_some())
            .unwrap_or(false);

        let mut out = ChildPage {
            has_more,
            ..ChildPage::default()
        };
        for child in listing.results {
            let id = child.id.clone();
            match self.to_document(child, Some(parent_id.to_string())) {
                Ok(doc) => out.documents.push(doc),
                Err(reason) => {
                    log::warn!("Skipping malformed child {} of {}: {}", id, parent_id, reason);
                    out.malformed.push(id);
                }
            }
        }
        Ok(out)
    }

    async fn get_content(&self, id: &str) -> std::result::Result<Document, RemoteError> {
        let url = format!("{}/rest/api/content/{}", self.base_url, id);
        let page: PageJson = self
            .get_json(id, &url, &[("expand", EXPAND.to_string())])
            .await?;
        self.to_document(page, None)
            .map_err(|reason| RemoteError::new(RemoteErrorKind::Malformed, id, reason))
    }
}
