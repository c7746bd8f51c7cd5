//! S3-compatible object storage (Cloudflare R2, MinIO) behind the [`ObjectStore`] port.

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::Path;

use release_relay_core::config::ObjectStoreConfig;
use release_relay_core::contract::ObjectStore;
use release_relay_core::HostError;

use crate::load_config::StoreCredentials;

pub struct S3Store {
    name: String,
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(config: &ObjectStoreConfig, creds: &StoreCredentials) -> Result<Self, HostError> {
        let credentials = Credentials::new(
            Some(&creds.access_key),
            Some(&creds.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| HostError::Transport(format!("{}: credentials: {e}", config.name)))?;
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: creds.endpoint.clone(),
        };
        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| HostError::Transport(format!("{}: {e}", config.name)))?
            .with_path_style();
        tracing::info!(store = %config.name, bucket = %config.bucket, endpoint = %creds.endpoint, "Initialized object store");
        Ok(Self {
            name: config.name.clone(),
            bucket,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<(), HostError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| HostError::Transport(format!("{}: {e}", path.display())))?;
        let response = self
            .bucket
            .put_object_with_content_type(key, &content, "application/octet-stream")
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(HostError::Rejected {
                status,
                body: String::from_utf8_lossy(response.as_slice()).into_owned(),
            });
        }
        Ok(())
    }
}
