//! REST client for the remote API.

use crate::config::{ApiConfig, RetryConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;
use crate::types::{
    ArtifactDetails, ArtifactId, ArtifactReference, FileDescriptor, FileDescriptorSet,
    ImageDescriptor, Watermark,
};
use crate::utils::{sanitise_address, slugify};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::{ArtifactSource, Grouping, ListingStrategy, RemoteCatalog};

#[derive(Debug, Deserialize)]
struct ThingRecord {
    name: Option<String>,
    license: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRecord {
    name: Option<String>,
    date: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageRecord {
    name: Option<String>,
    #[serde(default)]
    sizes: Vec<ImageSize>,
}

#[derive(Debug, Deserialize)]
struct ImageSize {
    #[serde(rename = "type")]
    kind: Option<String>,
    size: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingRecord {
    id: serde_json::Value,
    name: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionRecord {
    id: serde_json::Value,
    name: String,
}

/// HTTP client for the remote API
///
/// One instance is built at startup and shared by `Arc` for the whole run;
/// every request goes through the same connection pool.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a client for `api.base_url` authenticating with `api_key`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be created
    pub fn new(api: &ApiConfig, api_key: String, retry: RetryConfig) -> Result<Self> {
        let base_url = Url::parse(&api.base_url).map_err(|e| Error::Config {
            message: format!("invalid API base URL '{}': {}", api.base_url, e),
            key: Some("base_url".to_string()),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("API base URL '{}' cannot hold a path", api.base_url),
                key: Some("base_url".to_string()),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(api.timeout)
            .user_agent(api.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retry,
        })
    }

    /// Address of an API resource below the base URL
    ///
    /// Every segment is percent-encoded on its own, so user names and ids
    /// cannot change the shape of the path. A trailing `""` segment yields a
    /// trailing slash.
    fn endpoint(
        &self,
        segments: &[&str],
        page: Option<u32>,
    ) -> std::result::Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidResponse {
                address: self.base_url.to_string(),
                reason: "base address cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("access_token", &self.api_key);
            if let Some(page) = page {
                query.append_pair("page", &page.to_string());
            }
        }
        Ok(url)
    }

    fn authorized(&self, address: &str) -> std::result::Result<Url, FetchError> {
        let mut url = Url::parse(address).map_err(|e| FetchError::InvalidResponse {
            address: sanitise_address(address),
            reason: format!("invalid fetch address: {}", e),
        })?;
        url.query_pairs_mut()
            .append_pair("access_token", &self.api_key);
        Ok(url)
    }

    async fn send(&self, url: &Url) -> std::result::Result<reqwest::Response, FetchError> {
        let address = sanitise_address(url.as_str());
        debug!(%address, "requesting");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Connection(sanitise_address(&e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status.as_u16() {
            403 => FetchError::Forbidden { address },
            404 => FetchError::NotFound { address },
            code if status.is_server_error() => FetchError::ServerError {
                address,
                status: code,
            },
            code => FetchError::Status {
                address,
                status: code,
            },
        })
    }

    async fn get_bytes(&self, url: Url) -> std::result::Result<Vec<u8>, FetchError> {
        let url = &url;
        with_retry(&self.retry, || async move {
            let response = self.send(url).await?;
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Connection(sanitise_address(&e.to_string())))?;
            Ok(body.to_vec())
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<T, FetchError> {
        let address = sanitise_address(url.as_str());
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::InvalidResponse {
            address,
            reason: e.to_string(),
        })
    }

    async fn resolve_collection(
        &self,
        user: &str,
        name: &str,
    ) -> std::result::Result<String, FetchError> {
        let url = self.endpoint(&["users", user, "collections", "all"], None)?;
        let address = sanitise_address(url.as_str());
        let collections: Vec<CollectionRecord> = self.get_json(url).await?;

        let wanted = name.to_lowercase();
        collections
            .into_iter()
            .find(|c| c.name.to_lowercase() == wanted)
            .map(|c| json_id(&c.id))
            .ok_or_else(|| {
                warn!(user, collection = name, "unable to find collection");
                FetchError::NotFound { address }
            })
    }
}

#[async_trait::async_trait]
impl ArtifactSource for ApiClient {
    async fn fetch_details(&self, id: &ArtifactId) -> std::result::Result<ArtifactDetails, FetchError> {
        let thing: ThingRecord = self
            .get_json(self.endpoint(&["things", id.as_str(), ""], None)?)
            .await?;
        if thing.name.is_none() {
            warn!(artifact_id = %id, "no name found for thing");
        }
        if thing.license.is_none() {
            warn!(artifact_id = %id, "no license found for thing");
        }
        if thing.details.is_none() {
            warn!(artifact_id = %id, "no description found for thing");
        }

        let file_records: Vec<FileRecord> = self
            .get_json(self.endpoint(&["things", id.as_str(), "files", ""], None)?)
            .await?;
        let files = file_records
            .into_iter()
            .filter_map(|record| file_descriptor(id, record))
            .collect::<FileDescriptorSet>();

        let image_records: Vec<ImageRecord> = self
            .get_json(self.endpoint(&["things", id.as_str(), "images", ""], None)?)
            .await?;
        if image_records.is_empty() {
            warn!(artifact_id = %id, "no images found for thing");
        }
        let images = image_records
            .into_iter()
            .filter_map(|record| image_descriptor(id, record))
            .collect();

        Ok(ArtifactDetails {
            title: thing.name,
            license: thing.license,
            description: thing.details,
            files,
            images,
        })
    }

    async fn fetch_file(&self, file: &FileDescriptor) -> std::result::Result<Vec<u8>, FetchError> {
        self.get_bytes(self.authorized(&file.fetch_address)?).await
    }

    async fn fetch_image(&self, image: &ImageDescriptor) -> std::result::Result<Vec<u8>, FetchError> {
        let url = Url::parse(&image.fetch_address).map_err(|e| FetchError::InvalidResponse {
            address: sanitise_address(&image.fetch_address),
            reason: format!("invalid image address: {}", e),
        })?;
        self.get_bytes(url).await
    }
}

#[async_trait::async_trait]
impl RemoteCatalog for ApiClient {
    async fn list_page(
        &self,
        grouping: &Grouping,
        page: u32,
    ) -> std::result::Result<Vec<ArtifactReference>, FetchError> {
        let url = match &grouping.strategy {
            ListingStrategy::Collection { name } => {
                if page > 1 {
                    return Ok(Vec::new());
                }
                let collection_id = self.resolve_collection(&grouping.user, name).await?;
                self.endpoint(&["collections", collection_id.as_str(), "things", ""], None)?
            }
            ListingStrategy::Designs => {
                self.endpoint(&["users", grouping.user.as_str(), "things", ""], Some(page))?
            }
            ListingStrategy::Likes => {
                self.endpoint(&["users", grouping.user.as_str(), "likes", ""], Some(page))?
            }
        };

        let records: Vec<ListingRecord> = self.get_json(url).await?;
        Ok(records
            .into_iter()
            .map(|record| ArtifactReference {
                id: ArtifactId::new(json_id(&record.id)),
                display_name: record.name.unwrap_or_default(),
                detail_address: record.url.unwrap_or_default(),
            })
            .collect())
    }
}

fn json_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn file_descriptor(id: &ArtifactId, record: FileRecord) -> Option<FileDescriptor> {
    let (Some(name), Some(url)) = (record.name, record.url) else {
        warn!(artifact_id = %id, "file entry without name or url, skipping");
        return None;
    };
    let last_modified = match record.date.as_deref().map(Watermark::parse_marker) {
        Some(Some(ts)) => Some(ts),
        _ => {
            warn!(artifact_id = %id, file = %name, date = ?record.date, "unreadable file date");
            None
        }
    };
    Some(FileDescriptor {
        name,
        last_modified,
        fetch_address: url,
    })
}

fn image_descriptor(id: &ArtifactId, record: ImageRecord) -> Option<ImageDescriptor> {
    let name = slugify(record.name.as_deref().unwrap_or(""));
    let preferred = record
        .sizes
        .iter()
        .find(|s| s.kind.as_deref() == Some("display") && s.size.as_deref() == Some("large"))
        .and_then(|s| s.url.clone());
    let url = preferred.or_else(|| record.sizes.iter().find_map(|s| s.url.clone()));

    match url {
        Some(url) if !name.is_empty() => Some(ImageDescriptor {
            name,
            fetch_address: url,
        }),
        _ => {
            warn!(artifact_id = %id, image = %name, "missing image, skipping");
            None
        }
    }
}
