use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

use super::{ObjectStore, StorageError};
use crate::infra::profiles::S3Profile;

/// [`ObjectStore`] backed by an S3-compatible service.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    endpoint: String,
}

impl S3Store {
    /// Builds a client from a named connection profile.
    ///
    /// A custom `endpoint_url` (MinIO) is honoured, and static credentials are
    /// used when both halves of the key pair are present; otherwise the default
    /// AWS credential chain applies.
    pub async fn connect(profile: &S3Profile) -> Result<Self, StorageError> {
        if profile.region.is_empty() {
            return Err(StorageError::Configuration("region cannot be empty".into()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(profile.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&profile.access_key_id, &profile.secret_access_key)
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "profile");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let Some(endpoint) = &profile.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if profile.force_path_style {
            builder = builder.force_path_style(true);
        }

        let endpoint = profile
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", profile.region));

        Ok(Self {
            client: Client::from_conf(builder.build()),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(service_err) if service_err.is_not_found() => Ok(false),
                _ => Err(StorageError::from_sdk(DisplayErrorContext(&err))),
            },
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        if !overwrite && self.exists(bucket, key).await? {
            return Err(StorageError::AlreadyExists(format!("{bucket}/{key}")));
        }

        debug!(bucket, key, bytes = bytes.len(), "Uploading object");
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| StorageError::from_sdk(DisplayErrorContext(&err)))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service_err) if service_err.is_no_such_key() => {
                    StorageError::NotFound(format!("{bucket}/{key}"))
                }
                _ => StorageError::from_sdk(DisplayErrorContext(&err)),
            })?;

        let data = output.body.collect().await.map_err(StorageError::from_sdk)?;
        Ok(data.into_bytes())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| StorageError::from_sdk(DisplayErrorContext(&err)))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
