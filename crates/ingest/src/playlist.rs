use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::YouTubeConfig;
use common::retry::Permanent;
use common::{ArtifactStore, ItemRecord, RetryPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One page of a collection listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistPage {
    pub item_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Source of item ids and their metadata.
#[async_trait]
pub trait CollectionProvider: Send + Sync {
    async fn list_page(&self, collection_id: &str, page_token: Option<&str>) -> Result<PlaylistPage>;

    /// `None` when the provider knows nothing about the item.
    async fn item_details(&self, item_id: &str) -> Result<Option<ItemRecord>>;
}

/// YouTube Data API v3 client.
#[derive(Clone)]
pub struct YouTubeClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: ContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    video_id: String,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    snippet: Snippet,
}

#[derive(Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl YouTubeClient {
    pub fn new(config: &YouTubeConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
            retry,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.retry.retry(path, || self.get_json_once(path, query)).await
    }

    async fn get_json_once<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to send request to YouTube Data API")?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Permanent(format!("YouTube request failed: {} {}", status, body)).into());
        }
        if !status.is_success() {
            anyhow::bail!("YouTube request failed: {}", status);
        }

        response
            .json::<T>()
            .await
            .context("Failed to parse YouTube response")
    }
}

#[async_trait]
impl CollectionProvider for YouTubeClient {
    async fn list_page(&self, collection_id: &str, page_token: Option<&str>) -> Result<PlaylistPage> {
        let mut query = vec![
            ("part", "contentDetails"),
            ("playlistId", collection_id),
            ("maxResults", "50"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: PlaylistItemsResponse = self.get_json("playlistItems", &query).await?;
        Ok(PlaylistPage {
            item_ids: response
                .items
                .into_iter()
                .map(|item| item.content_details.video_id)
                .collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn item_details(&self, item_id: &str) -> Result<Option<ItemRecord>> {
        let response: VideosResponse = self
            .get_json("videos", &[("part", "snippet"), ("id", item_id)])
            .await?;

        Ok(response
            .items
            .into_iter()
            .next()
            .map(|video| ItemRecord::new(video.id, video.snippet.title, video.snippet.description)))
    }
}

/// Enumerates a collection and writes one `metadata.json` per item.
pub struct SourceLister {
    provider: Arc<dyn CollectionProvider>,
    store: ArtifactStore,
}

impl SourceLister {
    pub fn new(provider: Arc<dyn CollectionProvider>, store: ArtifactStore) -> Self {
        Self { provider, store }
    }

    /// All item ids in listing order. A failing page aborts the listing; a
    /// failing detail lookup only loses that item's metadata.
    pub async fn list(&self, collection_id: &str) -> Result<Vec<String>> {
        let mut item_ids = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self
                .provider
                .list_page(collection_id, page_token.as_deref())
                .await
                .map_err(|e| {
                    error!(collection_id, error = %e, "Failed to list collection page");
                    e
                })
                .context(format!("Failed to list collection {}", collection_id))?;

            debug!(collection_id, items = page.item_ids.len(), "Listed collection page");
            item_ids.extend(page.item_ids);

            match page.next_page_token {
                Some(token) if token.is_empty() => break,
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    warn!(collection_id, page_token = %token, "Provider repeated a page token, stopping listing");
                    break;
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        for item_id in &item_ids {
            match self.provider.item_details(item_id).await {
                Ok(Some(record)) => {
                    self.store.write_metadata(&record).await?;
                }
                Ok(None) => {
                    warn!(item_id = %item_id, "No details found for item");
                }
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Failed to fetch item details, skipping metadata");
                }
            }
        }

        info!(collection_id, items = item_ids.len(), "Collection listed");
        Ok(item_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProvider {
        pages: Mutex<Vec<Result<PlaylistPage>>>,
        details: HashMap<String, Result<Option<ItemRecord>, String>>,
        page_tokens_seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl CollectionProvider for FakeProvider {
        async fn list_page(&self, _collection_id: &str, page_token: Option<&str>) -> Result<PlaylistPage> {
            self.page_tokens_seen
                .lock()
                .unwrap()
                .push(page_token.map(str::to_string));
            self.pages.lock().unwrap().remove(0)
        }

        async fn item_details(&self, item_id: &str) -> Result<Option<ItemRecord>> {
            match self.details.get(item_id) {
                Some(Ok(record)) => Ok(record.clone()),
                Some(Err(msg)) => anyhow::bail!("{}", msg),
                None => Ok(None),
            }
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Result<PlaylistPage> {
        Ok(PlaylistPage {
            item_ids: ids.iter().map(|s| s.to_string()).collect(),
            next_page_token: next.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_pages_are_followed_and_metadata_saved() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let mut provider = FakeProvider::default();
        provider.pages = Mutex::new(vec![page(&["a", "b"], Some("p2")), page(&["c"], None)]);
        for id in ["a", "b", "c"] {
            provider.details.insert(
                id.to_string(),
                Ok(Some(ItemRecord::new(id, format!("title {id}"), "desc"))),
            );
        }
        let provider = Arc::new(provider);

        let lister = SourceLister::new(provider.clone(), store.clone());
        let ids = lister.list("playlist").await.unwrap();

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            *provider.page_tokens_seen.lock().unwrap(),
            vec![None, Some("p2".to_string())]
        );
        let meta = store.read_metadata("c").await.unwrap().unwrap();
        assert_eq!(meta.title, "title c");
    }

    #[tokio::test]
    async fn test_repeated_page_token_ends_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut provider = FakeProvider::default();
        provider.pages = Mutex::new(vec![
            page(&["a"], Some("p2")),
            page(&["b"], Some("p3")),
            page(&["c"], Some("p2")),
            page(&["never"], None),
        ]);
        let provider = Arc::new(provider);

        let lister = SourceLister::new(provider.clone(), ArtifactStore::new(tmp.path()));
        let ids = lister.list("playlist").await.unwrap();

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(provider.page_tokens_seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_detail_failure_skips_only_that_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let mut provider = FakeProvider::default();
        provider.pages = Mutex::new(vec![page(&["a", "b", "x1"], None)]);
        provider
            .details
            .insert("a".into(), Ok(Some(ItemRecord::new("a", "ta", "da"))));
        provider.details.insert("b".into(), Err("500 ERR".into()));

        let lister = SourceLister::new(Arc::new(provider), store.clone());
        let ids = lister.list("playlist").await.unwrap();

        assert_eq!(ids, vec!["a", "b", "x1"]);
        assert!(store.metadata_path("a").exists());
        assert!(!store.metadata_path("b").exists());
        assert!(!store.metadata_path("x1").exists());
    }

    #[tokio::test]
    async fn test_page_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut provider = FakeProvider::default();
        provider.pages = Mutex::new(vec![Err(anyhow::anyhow!("403 FORBIDDEN"))]);

        let lister = SourceLister::new(Arc::new(provider), ArtifactStore::new(tmp.path()));
        let err = lister.list("playlist").await.unwrap_err();
        assert!(format!("{err:#}").contains("403 FORBIDDEN"));
    }

    #[test]
    fn test_parse_api_payloads() {
        let playlist: PlaylistItemsResponse = serde_json::from_str(
            r#"{"items":[{"contentDetails":{"videoId":"video1"}}],"nextPageToken":"abc"}"#,
        )
        .unwrap();
        assert_eq!(playlist.items[0].content_details.video_id, "video1");
        assert_eq!(playlist.next_page_token.as_deref(), Some("abc"));

        let videos: VideosResponse = serde_json::from_str(
            r#"{"items":[{"id":"video1","snippet":{"title":"Test Video","description":"Test Desc"}}]}"#,
        )
        .unwrap();
        assert_eq!(videos.items[0].snippet.title, "Test Video");

        let empty: VideosResponse = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert!(empty.items.is_empty());
    }
}
