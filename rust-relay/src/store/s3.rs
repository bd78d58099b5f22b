//! S3 backed mail store.

use async_trait::async_trait;
use ::s3::{creds::Credentials, Bucket, Region};
use tracing::{debug, info};

use super::{MailStore, StoreError, StoredMail};
use crate::Config;

/// Bucket written by the SES receipt rule.
pub struct S3Store {
    bucket: Box<Bucket>,
    prefix: String,
}

impl S3Store {
    /// Open the bucket described by the configuration.
    ///
    /// Static keys are used when configured; otherwise the AWS credential
    /// chain (environment, profile, instance metadata) is consulted.
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        let region = match &config.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .s3_region
                .parse()
                .map_err(|e| StoreError::Config(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            config.s3_access_key.as_deref(),
            config.s3_secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StoreError::Config(format!("failed to create credentials: {e}")))?;

        let bucket = Bucket::new(&config.s3_bucket, region, credentials)
            .map_err(|e| StoreError::Config(format!("failed to create bucket: {e}")))?;

        let bucket = if config.s3_endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        info!(
            bucket = %config.s3_bucket,
            region = %config.s3_region,
            custom_endpoint = config.s3_endpoint.is_some(),
            key_prefix = %config.s3_key_prefix,
            "s3_store_opened"
        );

        Ok(Self {
            bucket,
            prefix: config.s3_key_prefix.clone(),
        })
    }
}

#[async_trait]
impl MailStore for S3Store {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let pages = self
            .bucket
            .list(self.prefix.clone(), None)
            .await
            .map_err(|e| StoreError::List(e.to_string()))?;

        let keys: Vec<String> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .filter(|key| !key.ends_with('/'))
            .collect();

        debug!(count = keys.len(), "s3_listed");
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<StoredMail, StoreError> {
        match self.bucket.get_object(key).await {
            Ok(response) if (200..300).contains(&response.status_code()) => Ok(StoredMail {
                key: key.to_string(),
                raw: response.to_vec(),
            }),
            Ok(response) => Err(StoreError::Fetch {
                key: key.to_string(),
                reason: format!(
                    "S3 error code {}: {}",
                    response.status_code(),
                    String::from_utf8_lossy(response.as_slice())
                ),
            }),
            Err(e) => Err(StoreError::Fetch {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.bucket.delete_object(key).await {
            Ok(response) if (200..300).contains(&response.status_code()) => Ok(()),
            Ok(response) => Err(StoreError::Delete {
                key: key.to_string(),
                reason: format!("S3 error code {}", response.status_code()),
            }),
            Err(e) => Err(StoreError::Delete {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
