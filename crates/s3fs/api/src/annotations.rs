use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::map::{from_string_map, to_string_map, StringMap};

/// Annotation and parameter keys.
///
/// The claim annotation keys double as the persisted volume annotations, so
/// they are a versioned contract between provisioning and deletion.
pub mod keys {
    pub const AUTO_CACHE: &str = "s3fs.ulagbulag.io/auto-cache";
    pub const AUTO_CREATE_BUCKET: &str = "s3fs.ulagbulag.io/auto-create-bucket";
    pub const AUTO_DELETE_BUCKET: &str = "s3fs.ulagbulag.io/auto-delete-bucket";
    pub const ALLOWED_IPS: &str = "s3fs.ulagbulag.io/allowed-ips";
    pub const BUCKET: &str = "s3fs.ulagbulag.io/bucket";
    pub const BUCKET_VERSIONING: &str = "s3fs.ulagbulag.io/bucket-versioning";
    pub const CHUNK_SIZE_MB: &str = "s3fs.ulagbulag.io/chunk-size-mb";
    pub const CONFIGURE_FIREWALL: &str = "s3fs.ulagbulag.io/configure-firewall";
    pub const CONNECT_TIMEOUT: &str = "s3fs.ulagbulag.io/connect-timeout";
    pub const COS_SERVICE: &str = "s3fs.ulagbulag.io/cos-service";
    pub const COS_SERVICE_NAMESPACE: &str = "s3fs.ulagbulag.io/cos-service-ns";
    pub const CURL_DEBUG: &str = "s3fs.ulagbulag.io/curl-debug";
    pub const DEBUG_LEVEL: &str = "s3fs.ulagbulag.io/debug-level";
    pub const ENDPOINT: &str = "s3fs.ulagbulag.io/endpoint";
    pub const IAM_ENDPOINT: &str = "s3fs.ulagbulag.io/iam-endpoint";
    pub const KERNEL_CACHE: &str = "s3fs.ulagbulag.io/kernel-cache";
    pub const MULTIREQ_MAX: &str = "s3fs.ulagbulag.io/multireq-max";
    pub const OBJECT_PATH: &str = "s3fs.ulagbulag.io/object-path";
    pub const OBJECT_STORE_ENDPOINT: &str = "s3fs.ulagbulag.io/object-store-endpoint";
    pub const OBJECT_STORE_STORAGE_CLASS: &str = "s3fs.ulagbulag.io/object-store-storage-class";
    pub const PARALLEL_COUNT: &str = "s3fs.ulagbulag.io/parallel-count";
    pub const QUOTA_LIMIT: &str = "s3fs.ulagbulag.io/quota-limit";
    pub const READWRITE_TIMEOUT: &str = "s3fs.ulagbulag.io/readwrite-timeout";
    pub const REGION: &str = "s3fs.ulagbulag.io/region";
    pub const S3FS_FUSE_RETRY_COUNT: &str = "s3fs.ulagbulag.io/s3fs-fuse-retry-count";
    pub const SECRET_NAME: &str = "s3fs.ulagbulag.io/secret-name";
    pub const SECRET_NAMESPACE: &str = "s3fs.ulagbulag.io/secret-namespace";
    pub const STAT_CACHE_EXPIRE_SECONDS: &str = "s3fs.ulagbulag.io/stat-cache-expire-seconds";
    pub const STAT_CACHE_SIZE: &str = "s3fs.ulagbulag.io/stat-cache-size";
    pub const TLS_CIPHER_SUITE: &str = "s3fs.ulagbulag.io/tls-cipher-suite";
    pub const USE_XATTR: &str = "s3fs.ulagbulag.io/use-xattr";
    pub const VALIDATE_BUCKET: &str = "s3fs.ulagbulag.io/validate-bucket";
}

/// Raw claim annotations.
///
/// Values are kept verbatim; parsing and cross-field validation belong to the
/// merger so that every failure can name the offending key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAnnotations {
    #[serde(rename = "s3fs.ulagbulag.io/auto-cache", default, skip_serializing_if = "Option::is_none")]
    pub auto_cache: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/auto-create-bucket", default, skip_serializing_if = "Option::is_none")]
    pub auto_create_bucket: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/auto-delete-bucket", default, skip_serializing_if = "Option::is_none")]
    pub auto_delete_bucket: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/allowed-ips", default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/bucket", default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/bucket-versioning", default, skip_serializing_if = "Option::is_none")]
    pub bucket_versioning: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/chunk-size-mb", default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_mb: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/configure-firewall", default, skip_serializing_if = "Option::is_none")]
    pub configure_firewall: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/connect-timeout", default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/cos-service", default, skip_serializing_if = "Option::is_none")]
    pub cos_service: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/cos-service-ns", default, skip_serializing_if = "Option::is_none")]
    pub cos_service_namespace: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/curl-debug", default, skip_serializing_if = "Option::is_none")]
    pub curl_debug: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/debug-level", default, skip_serializing_if = "Option::is_none")]
    pub debug_level: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/iam-endpoint", default, skip_serializing_if = "Option::is_none")]
    pub iam_endpoint: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/multireq-max", default, skip_serializing_if = "Option::is_none")]
    pub multireq_max: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/object-path", default, skip_serializing_if = "Option::is_none")]
    pub object_path: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/parallel-count", default, skip_serializing_if = "Option::is_none")]
    pub parallel_count: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/quota-limit", default, skip_serializing_if = "Option::is_none")]
    pub quota_limit: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/readwrite-timeout", default, skip_serializing_if = "Option::is_none")]
    pub readwrite_timeout: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/region", default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/s3fs-fuse-retry-count", default, skip_serializing_if = "Option::is_none")]
    pub s3fs_fuse_retry_count: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/secret-name", default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/secret-namespace", default, skip_serializing_if = "Option::is_none")]
    pub secret_namespace: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/stat-cache-expire-seconds", default, skip_serializing_if = "Option::is_none")]
    pub stat_cache_expire_seconds: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/stat-cache-size", default, skip_serializing_if = "Option::is_none")]
    pub stat_cache_size: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/tls-cipher-suite", default, skip_serializing_if = "Option::is_none")]
    pub tls_cipher_suite: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/use-xattr", default, skip_serializing_if = "Option::is_none")]
    pub use_xattr: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/validate-bucket", default, skip_serializing_if = "Option::is_none")]
    pub validate_bucket: Option<String>,
}

impl ClaimAnnotations {
    pub fn from_map(map: &StringMap) -> Result<Self> {
        from_string_map(map).map(Self::normalized)
    }

    pub fn to_map(&self) -> Result<StringMap> {
        to_string_map(self)
    }

    /// Empty values behave exactly like missing ones.
    fn normalized(mut self) -> Self {
        for field in [
            &mut self.auto_cache,
            &mut self.auto_create_bucket,
            &mut self.auto_delete_bucket,
            &mut self.allowed_ips,
            &mut self.bucket,
            &mut self.bucket_versioning,
            &mut self.chunk_size_mb,
            &mut self.configure_firewall,
            &mut self.connect_timeout,
            &mut self.cos_service,
            &mut self.cos_service_namespace,
            &mut self.curl_debug,
            &mut self.debug_level,
            &mut self.endpoint,
            &mut self.iam_endpoint,
            &mut self.multireq_max,
            &mut self.object_path,
            &mut self.parallel_count,
            &mut self.quota_limit,
            &mut self.readwrite_timeout,
            &mut self.region,
            &mut self.s3fs_fuse_retry_count,
            &mut self.secret_name,
            &mut self.secret_namespace,
            &mut self.stat_cache_expire_seconds,
            &mut self.stat_cache_size,
            &mut self.tls_cipher_suite,
            &mut self.use_xattr,
            &mut self.validate_bucket,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        self
    }
}

/// Raw storage class parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassParameters {
    #[serde(rename = "s3fs.ulagbulag.io/chunk-size-mb", default)]
    pub chunk_size_mb: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/connect-timeout", default)]
    pub connect_timeout: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/curl-debug", default)]
    pub curl_debug: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/debug-level", default)]
    pub debug_level: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/iam-endpoint", default)]
    pub iam_endpoint: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/kernel-cache", default)]
    pub kernel_cache: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/multireq-max", default)]
    pub multireq_max: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/object-store-endpoint", default)]
    pub object_store_endpoint: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/object-store-storage-class", default)]
    pub object_store_storage_class: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/parallel-count", default)]
    pub parallel_count: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/readwrite-timeout", default)]
    pub readwrite_timeout: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/s3fs-fuse-retry-count", default)]
    pub s3fs_fuse_retry_count: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/secret-name", default)]
    pub secret_name: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/stat-cache-expire-seconds", default)]
    pub stat_cache_expire_seconds: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/stat-cache-size", default)]
    pub stat_cache_size: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/tls-cipher-suite", default)]
    pub tls_cipher_suite: Option<String>,
    #[serde(rename = "s3fs.ulagbulag.io/use-xattr", default)]
    pub use_xattr: Option<String>,
}

impl ClassParameters {
    pub fn from_map(map: &StringMap) -> Result<Self> {
        from_string_map(map).map(Self::normalized)
    }

    fn normalized(mut self) -> Self {
        for field in [
            &mut self.chunk_size_mb,
            &mut self.connect_timeout,
            &mut self.curl_debug,
            &mut self.debug_level,
            &mut self.iam_endpoint,
            &mut self.kernel_cache,
            &mut self.multireq_max,
            &mut self.object_store_endpoint,
            &mut self.object_store_storage_class,
            &mut self.parallel_count,
            &mut self.readwrite_timeout,
            &mut self.s3fs_fuse_retry_count,
            &mut self.secret_name,
            &mut self.stat_cache_expire_seconds,
            &mut self.stat_cache_size,
            &mut self.tls_cipher_suite,
            &mut self.use_xattr,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        self
    }
}
