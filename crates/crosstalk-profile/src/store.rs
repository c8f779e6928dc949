//! Backing stores the cache fetches from on a miss.

use crate::snapshot::ProfileSnapshot;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileStoreError {
    #[error("profile store unreachable: {0}")]
    Unreachable(String),

    #[error("profile store returned {status}")]
    BadStatus { status: u16 },

    #[error("profile record malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile for an identity; `Ok(None)` means no record exists
    /// (the caller substitutes a default profile).
    async fn fetch(&self, identity: &str) -> Result<Option<ProfileSnapshot>, ProfileStoreError>;
}

/// Profile CRUD service client (`GET {base}/profiles/{identity}`).
pub struct HttpProfileStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProfileStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch(&self, identity: &str) -> Result<Option<ProfileSnapshot>, ProfileStoreError> {
        let url = format!("{}/profiles/{}", self.base_url, identity);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileStoreError::Unreachable(e.to_string()))?;

        match response.status().as_u16() {
            200 => {
                let snapshot: ProfileSnapshot = response
                    .json()
                    .await
                    .map_err(|e| ProfileStoreError::Malformed(e.to_string()))?;
                Ok(Some(snapshot))
            }
            404 => Ok(None),
            status => Err(ProfileStoreError::BadStatus { status }),
        }
    }
}

/// In-memory store for tests and seed metadata.
#[derive(Default)]
pub struct StaticProfileStore {
    profiles: RwLock<HashMap<String, ProfileSnapshot>>,
}

impl StaticProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: ProfileSnapshot) {
        self.profiles
            .write()
            .insert(snapshot.identity.clone(), snapshot);
    }

    pub fn remove(&self, identity: &str) {
        self.profiles.write().remove(identity);
    }
}

#[async_trait]
impl ProfileStore for StaticProfileStore {
    async fn fetch(&self, identity: &str) -> Result<Option<ProfileSnapshot>, ProfileStoreError> {
        Ok(self.profiles.read().get(identity).cloned())
    }
}
