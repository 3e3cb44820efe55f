//! [`ObjectStore`] backed by the AWS SDK, for S3 and S3-compatible endpoints.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::Client;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::{ByteStream, ListPage, ObjectEntry, ObjectStore, PutBody, PutOutcome, StoreError};

/// Static access key pair; when absent the SDK's default credential chain is used.
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

fn default_region() -> String {
    "us-east-2".to_string()
}

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack, ...).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Injected from the environment, never read from the config file.
    #[serde(skip)]
    pub credentials: Option<StaticCredentials>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            credentials: None,
        }
    }
}

pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(settings: &StoreSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let Some(creds) = &settings.credentials {
            info!(access_key_id = %creds.access_key_id, "[S3] Using static credentials from environment");
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                None,
                None,
                "po-ingest-env",
            ));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared = loader.load().await;

        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.force_path_style)
            .build();
        info!(region = %settings.region, endpoint = ?settings.endpoint_url, "[S3] Client configured");
        Self::from_client(Client::from_conf(conf))
    }
}

fn into_stream(body: SdkByteStream) -> ByteStream {
    futures::stream::try_unfold(body, |mut body| async move {
        match body.try_next().await {
            Ok(Some(chunk)) => Ok(Some((chunk, body))),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Transport(format!("reading object body: {e}"))),
        }
    })
    .boxed()
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("list {bucket}: {}", e.into_service_error())))?;

        let entries = out
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectEntry {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    size: obj.size(),
                })
            })
            .collect::<Vec<_>>();
        debug!(bucket, entries = entries.len(), "[S3] Listed page");

        Ok(ListPage {
            entries,
            next_token: out.next_continuation_token().map(str::to_string),
            is_truncated: out.is_truncated().unwrap_or(false),
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError> {
        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(out) => Ok(into_stream(out.body)),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    Err(StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                } else {
                    Err(StoreError::Transport(format!("get s3://{bucket}/{key}: {service}")))
                }
            }
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: PutBody,
        content_type: &str,
    ) -> Result<PutOutcome, StoreError> {
        let body = match body {
            PutBody::Bytes(bytes) => SdkByteStream::from(bytes),
            PutBody::File(path) => {
                let opened = SdkByteStream::from_path(&path).await;
                opened.map_err(|e| StoreError::Body {
                    path,
                    source: std::io::Error::other(e),
                })?
            }
        };

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("put s3://{bucket}/{key}: {}", e.into_service_error())))?;

        // The SDK turns every non-2xx response into an error, so reaching here means 200.
        Ok(PutOutcome::ok())
    }
}
