//! In-memory remote used by engine and mirror tests

use crate::error::FetchError;
use crate::remote::{ArtifactSource, Grouping, RemoteCatalog};
use crate::types::{
    ArtifactDetails, ArtifactId, ArtifactReference, FileDescriptor, ImageDescriptor, Watermark,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Remote whose things can be edited between runs; records every fetch
#[derive(Default)]
pub(crate) struct FakeSource {
    things: Mutex<HashMap<ArtifactId, ArtifactDetails>>,
    detail_errors: Mutex<HashMap<ArtifactId, FetchError>>,
    broken_files: Mutex<HashSet<String>>,
    detail_calls: Mutex<Vec<ArtifactId>>,
    file_fetches: Mutex<Vec<String>>,
    image_fetches: Mutex<Vec<String>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_thing(&self, id: &str, details: ArtifactDetails) {
        self.things
            .lock()
            .unwrap()
            .insert(ArtifactId::from(id), details);
    }

    pub(crate) fn fail_details(&self, id: &str, error: FetchError) {
        self.detail_errors
            .lock()
            .unwrap()
            .insert(ArtifactId::from(id), error);
    }

    pub(crate) fn break_file(&self, name: &str) {
        self.broken_files.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn detail_calls(&self) -> Vec<ArtifactId> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub(crate) fn file_fetches(&self) -> Vec<String> {
        self.file_fetches.lock().unwrap().clone()
    }

    pub(crate) fn image_fetches(&self) -> Vec<String> {
        self.image_fetches.lock().unwrap().clone()
    }

    pub(crate) fn reset_counts(&self) {
        self.detail_calls.lock().unwrap().clear();
        self.file_fetches.lock().unwrap().clear();
        self.image_fetches.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl ArtifactSource for FakeSource {
    async fn fetch_details(&self, id: &ArtifactId) -> Result<ArtifactDetails, FetchError> {
        self.detail_calls.lock().unwrap().push(id.clone());
        if let Some(error) = self.detail_errors.lock().unwrap().get(id) {
            return Err(error.clone());
        }
        self.things
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                address: format!("fake://things/{}", id),
            })
    }

    async fn fetch_file(&self, file: &FileDescriptor) -> Result<Vec<u8>, FetchError> {
        self.file_fetches.lock().unwrap().push(file.name.clone());
        if self.broken_files.lock().unwrap().contains(&file.name) {
            return Err(FetchError::Connection("connection reset".to_string()));
        }
        Ok(content_for(&file.fetch_address))
    }

    async fn fetch_image(&self, image: &ImageDescriptor) -> Result<Vec<u8>, FetchError> {
        self.image_fetches.lock().unwrap().push(image.name.clone());
        Ok(content_for(&image.fetch_address))
    }
}

/// Catalog serving a fixed list on page 1
pub(crate) struct FakeCatalog {
    pub(crate) references: Vec<ArtifactReference>,
}

#[async_trait::async_trait]
impl RemoteCatalog for FakeCatalog {
    async fn list_page(
        &self,
        _grouping: &Grouping,
        page: u32,
    ) -> Result<Vec<ArtifactReference>, FetchError> {
        if page == 1 {
            Ok(self.references.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Bytes the fake remote serves for `address`
pub(crate) fn content_for(address: &str) -> Vec<u8> {
    format!("content of {}", address).into_bytes()
}

pub(crate) fn wm(text: &str) -> Watermark {
    Watermark::parse_marker(text).unwrap()
}

pub(crate) fn file(name: &str, at: &str) -> FileDescriptor {
    FileDescriptor {
        name: name.to_string(),
        last_modified: Some(wm(at)),
        fetch_address: format!("https://files.example.com/{}/{}", name, at.replace(' ', "_")),
    }
}

pub(crate) fn details(title: &str, files: Vec<FileDescriptor>) -> ArtifactDetails {
    ArtifactDetails {
        title: Some(title.to_string()),
        license: Some("CC-BY".to_string()),
        description: Some(format!("All about {}", title)),
        files: files.into_iter().collect(),
        images: vec![ImageDescriptor {
            name: "front.jpg".to_string(),
            fetch_address: "https://img.example.com/front.jpg".to_string(),
        }],
    }
}

pub(crate) fn reference(id: &str, name: &str) -> ArtifactReference {
    ArtifactReference {
        id: ArtifactId::from(id),
        display_name: name.to_string(),
        detail_address: format!("https://api.example.com/things/{}", id),
    }
}
