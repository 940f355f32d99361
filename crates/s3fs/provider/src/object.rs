use std::path::{Path, PathBuf};

use async_trait::async_trait;
use minio::s3::{
    args::{BucketExistsArgs, MakeBucketArgs, RemoveBucketArgs, SetBucketVersioningArgs},
    client::Client,
    creds::{Provider, StaticProvider},
    http::BaseUrl,
    types::S3Api,
    utils::Multimap,
};
use s3fs_api::credentials::{CaBundle, CredentialKind, Credentials};
use tokio::fs;
use tracing::{debug, info, instrument, warn, Level};

use crate::{
    error::{codes, ProviderError, Result},
    iam::IamTokenIssuer,
};

/// Options applied when a bucket is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateBucketOptions {
    /// Key Protect root key used for server side encryption.
    pub kp_root_key_crn: Option<String>,
}

#[async_trait]
pub trait ObjectStorageSessionFactory: Send + Sync {
    async fn new_session(
        &self,
        endpoint: &str,
        region: Option<&str>,
        credentials: &Credentials,
        ca_bundle: Option<&CaBundle>,
    ) -> Result<Box<dyn ObjectStorageSession>>;
}

#[async_trait]
pub trait ObjectStorageSession: Send + Sync {
    async fn check_bucket_access(&self, bucket: &str) -> Result<()>;

    async fn check_object_path_existence(&self, bucket: &str, object_path: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str, options: &CreateBucketOptions) -> Result<()>;

    /// Removes every object and then the bucket itself.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn set_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()>;
}

/// Opens S3 sessions signed with HMAC keys, or authorized by an IAM bearer
/// token when the secret carries an API key.
#[derive(Clone, Debug)]
pub struct MinioSessionFactory {
    ca_bundle_dir: PathBuf,
    tokens: IamTokenIssuer,
}

impl MinioSessionFactory {
    pub fn new(ca_bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            ca_bundle_dir: ca_bundle_dir.into(),
            tokens: IamTokenIssuer::default(),
        }
    }

    /// Stores the bundle as `<dir>/<service>` and returns its path.
    async fn write_ca_bundle(&self, bundle: &CaBundle) -> Result<PathBuf> {
        let path = ca_bundle_path(&self.ca_bundle_dir, &bundle.service)?;
        fs::create_dir_all(&self.ca_bundle_dir)
            .await
            .map_err(|error| ProviderError::new(format!("cannot create CA bundle directory: {error}")))?;
        fs::write(&path, &bundle.pem)
            .await
            .map_err(|error| ProviderError::new(format!("cannot write CA bundle: {error}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            fs::set_permissions(&path, ::std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|error| {
                    ProviderError::new(format!("cannot restrict CA bundle permissions: {error}"))
                })?;
        }

        debug!("wrote CA bundle: {}", path.display());
        Ok(path)
    }
}

#[async_trait]
impl ObjectStorageSessionFactory for MinioSessionFactory {
    #[instrument(level = Level::INFO, skip(self, credentials, ca_bundle), err(Display))]
    async fn new_session(
        &self,
        endpoint: &str,
        region: Option<&str>,
        credentials: &Credentials,
        ca_bundle: Option<&CaBundle>,
    ) -> Result<Box<dyn ObjectStorageSession>> {
        let mut base_url: BaseUrl = endpoint.parse().map_err(|error| {
            ProviderError::new(format!("failed to parse object storage endpoint: {error}"))
        })?;
        if let Some(region) = region {
            base_url.region = region.into();
        }

        let (provider, bearer, service_instance_id) = match &credentials.kind {
            CredentialKind::Hmac {
                access_key,
                secret_key,
            } => {
                let provider: Box<dyn Provider + Send + Sync> =
                    Box::new(StaticProvider::new(access_key, secret_key, None));
                (Some(provider), None, None)
            }
            CredentialKind::Iam {
                api_key,
                service_instance_id,
            } => {
                if credentials.iam_endpoint.is_empty() {
                    return Err(ProviderError::new(
                        "cannot authorize object storage session: IAM endpoint is empty",
                    ));
                }
                let token = self
                    .tokens
                    .issue_token(&credentials.iam_endpoint, api_key)
                    .await?;
                (None, Some(token), Some(service_instance_id.clone()))
            }
        };

        let ssl_cert_file = match ca_bundle {
            Some(bundle) => Some(self.write_ca_bundle(bundle).await?),
            None => None,
        };
        let ignore_cert_check = Some(!base_url.https);

        let client = Client::new(
            base_url,
            provider,
            ssl_cert_file.as_deref(),
            ignore_cert_check,
        )
        .map_err(from_minio_error)?;
        Ok(Box::new(MinioSession {
            client,
            bearer,
            service_instance_id: service_instance_id.filter(|id| !id.is_empty()),
        }))
    }
}

fn ca_bundle_path(dir: &Path, service: &str) -> Result<PathBuf> {
    if service.is_empty() || service.contains(['/', '\\']) || service.starts_with('.') {
        return Err(ProviderError::new(format!(
            "invalid object storage service name for CA bundle: {service:?}"
        )));
    }
    Ok(dir.join(service))
}

pub struct MinioSession {
    client: Client,
    /// Set for API key sessions, which are not signed.
    bearer: Option<String>,
    service_instance_id: Option<String>,
}

impl MinioSession {
    fn headers(&self) -> Option<Multimap> {
        auth_headers(self.bearer.as_deref())
    }
}

fn auth_headers(bearer: Option<&str>) -> Option<Multimap> {
    bearer.map(|token| {
        let mut headers = Multimap::default();
        headers.insert("Authorization".into(), format!("Bearer {token}"));
        headers
    })
}

#[async_trait]
impl ObjectStorageSession for MinioSession {
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn check_bucket_access(&self, bucket: &str) -> Result<()> {
        let headers = self.headers();
        let mut args = BucketExistsArgs::new(bucket).map_err(from_minio_error)?;
        args.extra_headers = headers.as_ref();
        if self
            .client
            .bucket_exists(&args)
            .await
            .map_err(from_minio_error)?
        {
            Ok(())
        } else {
            Err(ProviderError::new(format!("bucket not found: {bucket}"))
                .with_code(codes::NO_SUCH_BUCKET))
        }
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn check_object_path_existence(&self, bucket: &str, object_path: &str) -> Result<bool> {
        let object_path = object_path.trim_start_matches('/');
        let response = self
            .client
            .list_objects_v2(bucket)
            .extra_headers(self.headers())
            .prefix(Some(object_path.into()))
            .max_keys(Some(1))
            .send()
            .await
            .map_err(|error| {
                let error = from_minio_error(error);
                ProviderError {
                    message: format!("cannot list bucket '{bucket}': {}", error.message),
                    ..error
                }
            })?;

        Ok(response.contents.first().is_some_and(|item| {
            item.name == object_path || item.name.trim_end_matches('/') == object_path
        }))
    }

    #[instrument(level = Level::INFO, skip(self, options), err(Display))]
    async fn create_bucket(&self, bucket: &str, options: &CreateBucketOptions) -> Result<()> {
        let mut headers = self.headers().unwrap_or_default();
        if let Some(id) = self.service_instance_id.as_deref() {
            headers.insert("ibm-service-instance-id".into(), id.into());
        }
        if let Some(crn) = options.kp_root_key_crn.as_deref() {
            headers.insert("ibm-sse-kp-encryption-algorithm".into(), "AES256".into());
            headers.insert("ibm-sse-kp-customer-root-key-crn".into(), crn.into());
        }

        let mut args = MakeBucketArgs::new(bucket).map_err(from_minio_error)?;
        if !headers.is_empty() {
            args.extra_headers = Some(&headers);
        }
        self.client
            .make_bucket(&args)
            .await
            .map(|_| info!("created bucket: {bucket}"))
            .map_err(from_minio_error)
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        loop {
            let response = self
                .client
                .list_objects_v2(bucket)
                .extra_headers(self.headers())
                .send()
                .await
                .map_err(from_minio_error)?;
            if response.contents.is_empty() {
                break;
            }

            for item in response.contents {
                self.client
                    .remove_object(bucket, item.name.as_str())
                    .extra_headers(self.headers())
                    .send()
                    .await
                    .map_err(|error| {
                        let error = from_minio_error(error);
                        ProviderError {
                            message: format!(
                                "cannot delete object {bucket}/{name}: {message}",
                                name = &item.name,
                                message = &error.message,
                            ),
                            ..error
                        }
                    })?;
            }
        }

        let headers = self.headers();
        let mut args = RemoveBucketArgs::new(bucket).map_err(from_minio_error)?;
        args.extra_headers = headers.as_ref();
        self.client
            .remove_bucket(&args)
            .await
            .map(|_| info!("deleted bucket: {bucket}"))
            .map_err(from_minio_error)
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn set_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        let headers = self.headers();
        let mut args = SetBucketVersioningArgs::new(bucket, enabled).map_err(from_minio_error)?;
        args.extra_headers = headers.as_ref();
        self.client
            .set_bucket_versioning(&args)
            .await
            .map(|_| ())
            .map_err(from_minio_error)
    }
}

fn from_minio_error(error: ::minio::s3::error::Error) -> ProviderError {
    if matches!(error, ::minio::s3::error::Error::HttpError(_)) {
        return ProviderError::transient(error).with_code(codes::UNAVAILABLE);
    }

    let code = match &error {
        ::minio::s3::error::Error::S3Error(response) => Some(response.code.clone()),
        _ => None,
    };

    match code {
        Some(code)
            if code.starts_with("Internal") || code == "SlowDown" || code == "ServiceUnavailable" =>
        {
            warn!("object storage is unstable: {code}");
            ProviderError::transient(error).with_code(code)
        }
        Some(code) => ProviderError::new(error).with_code(code),
        None => ProviderError::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_api_key_sessions_carry_a_bearer() {
        assert!(auth_headers(None).is_none());

        let headers = auth_headers(Some("tok")).unwrap();
        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Bearer tok"),
        );
    }

    #[test]
    fn ca_bundle_stays_inside_its_directory() {
        let dir = Path::new("/tmp/s3fs");
        assert_eq!(
            ca_bundle_path(dir, "standard-cos").unwrap(),
            dir.join("standard-cos"),
        );
        assert!(ca_bundle_path(dir, "../etc").is_err());
        assert!(ca_bundle_path(dir, "a/b").is_err());
        assert!(ca_bundle_path(dir, "").is_err());
    }

    #[tokio::test]
    async fn ca_bundle_is_written_per_service() {
        let dir = ::std::env::temp_dir().join(format!("s3fs-ca-{}", ::uuid::Uuid::new_v4()));
        let factory = MinioSessionFactory::new(&dir);
        let bundle = CaBundle {
            service: "minio".into(),
            pem: "-----BEGIN CERTIFICATE-----\n".into(),
        };

        let path = factory.write_ca_bundle(&bundle).await.unwrap();
        assert_eq!(path, dir.join("minio"));
        assert_eq!(fs::read_to_string(&path).await.unwrap(), bundle.pem);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn api_key_session_requires_iam_endpoint() {
        let factory = MinioSessionFactory::new(::std::env::temp_dir());
        let credentials = Credentials {
            kind: CredentialKind::Iam {
                api_key: "key".into(),
                service_instance_id: "instance".into(),
            },
            iam_endpoint: String::new(),
        };

        let error = factory
            .new_session("https://s3.example.com", None, &credentials, None)
            .await
            .err()
            .unwrap();
        assert!(error.message.contains("IAM endpoint is empty"), "{error}");
    }
}
