use anyhow::Result;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::map::{as_string, from_string_map, to_string_map, StringMap};

/// Driver option keys read back when a volume is deleted.
pub mod keys {
    pub const ENDPOINT: &str = "object-store-endpoint";
    pub const IAM_ENDPOINT: &str = "iam-endpoint";
    pub const STORAGE_CLASS: &str = "object-store-storage-class";
}

/// The authoritative option set after claim annotations and class parameters
/// are merged and validated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// Empty until a name is given or generated.
    pub bucket: String,
    pub object_path: Option<String>,
    pub auto_create_bucket: bool,
    pub auto_delete_bucket: bool,
    pub bucket_versioning: bool,

    pub endpoint: String,
    pub storage_class: Option<String>,
    pub iam_endpoint: String,

    pub chunk_size_mb: i64,
    pub parallel_count: i64,
    pub multireq_max: i64,
    pub stat_cache_size: i64,
    pub stat_cache_expire_seconds: Option<i64>,
    pub s3fs_fuse_retry_count: Option<i64>,
    pub connect_timeout: Option<i64>,
    pub readwrite_timeout: Option<i64>,

    pub debug_level: String,
    pub curl_debug: bool,
    pub kernel_cache: bool,
    pub auto_cache: bool,
    pub use_xattr: bool,
    pub tls_cipher_suite: Option<String>,

    /// `None` defers to the process-wide toggle.
    pub configure_firewall: Option<bool>,
    /// `None` defers to the process-wide toggle.
    pub quota_limit: Option<bool>,
    pub allowed_ips: Vec<IpNet>,

    pub secret_name: String,
    pub secret_namespace: String,
    pub validate_bucket: bool,
    pub cos_service: Option<CosService>,
}

impl ResolvedOptions {
    pub fn to_driver_options(&self, access_mode: Option<String>) -> DriverOptions {
        DriverOptions {
            bucket: self.bucket.clone(),
            object_path: self.object_path.clone(),
            endpoint: self.endpoint.clone(),
            storage_class: self.storage_class.clone(),
            iam_endpoint: self.iam_endpoint.clone(),
            chunk_size_mb: self.chunk_size_mb,
            parallel_count: self.parallel_count,
            multireq_max: self.multireq_max,
            stat_cache_size: self.stat_cache_size,
            stat_cache_expire_seconds: self.stat_cache_expire_seconds,
            s3fs_fuse_retry_count: self.s3fs_fuse_retry_count,
            connect_timeout: self.connect_timeout,
            readwrite_timeout: self.readwrite_timeout,
            debug_level: self.debug_level.clone(),
            curl_debug: self.curl_debug,
            kernel_cache: self.kernel_cache && !self.auto_cache,
            auto_cache: self.auto_cache,
            use_xattr: self.use_xattr,
            tls_cipher_suite: self.tls_cipher_suite.clone(),
            access_mode,
            service_ip: self
                .cos_service
                .as_ref()
                .map(|service| service.cluster_ip.clone()),
        }
    }
}

/// A TLS-enabled in-cluster object storage service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CosService {
    pub name: String,
    pub namespace: String,
    pub cluster_ip: String,
    pub port: i32,
}

/// FlexVolume options consumed by the mount plugin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    #[serde(rename = "bucket")]
    pub bucket: String,
    #[serde(rename = "object-path", default, skip_serializing_if = "Option::is_none")]
    pub object_path: Option<String>,

    #[serde(rename = "object-store-endpoint")]
    pub endpoint: String,
    #[serde(
        rename = "object-store-storage-class",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub storage_class: Option<String>,
    #[serde(rename = "iam-endpoint", default)]
    pub iam_endpoint: String,

    #[serde(rename = "chunk-size-mb", with = "as_string")]
    pub chunk_size_mb: i64,
    #[serde(rename = "parallel-count", with = "as_string")]
    pub parallel_count: i64,
    #[serde(rename = "multireq-max", with = "as_string")]
    pub multireq_max: i64,
    #[serde(rename = "stat-cache-size", with = "as_string")]
    pub stat_cache_size: i64,
    #[serde(
        rename = "stat-cache-expire-seconds",
        default,
        skip_serializing_if = "Option::is_none",
        with = "as_string::option"
    )]
    pub stat_cache_expire_seconds: Option<i64>,
    #[serde(
        rename = "s3fs-fuse-retry-count",
        default,
        skip_serializing_if = "Option::is_none",
        with = "as_string::option"
    )]
    pub s3fs_fuse_retry_count: Option<i64>,
    #[serde(
        rename = "connect-timeout",
        default,
        skip_serializing_if = "Option::is_none",
        with = "as_string::option"
    )]
    pub connect_timeout: Option<i64>,
    #[serde(
        rename = "readwrite-timeout",
        default,
        skip_serializing_if = "Option::is_none",
        with = "as_string::option"
    )]
    pub readwrite_timeout: Option<i64>,

    #[serde(rename = "debug-level", default)]
    pub debug_level: String,
    #[serde(rename = "curl-debug", default, with = "as_string")]
    pub curl_debug: bool,
    #[serde(
        rename = "kernel-cache",
        default,
        skip_serializing_if = "is_false",
        with = "as_string"
    )]
    pub kernel_cache: bool,
    #[serde(
        rename = "auto_cache",
        default,
        skip_serializing_if = "is_false",
        with = "as_string"
    )]
    pub auto_cache: bool,
    #[serde(
        rename = "use-xattr",
        default,
        skip_serializing_if = "is_false",
        with = "as_string"
    )]
    pub use_xattr: bool,
    #[serde(rename = "tls-cipher-suite", default, skip_serializing_if = "Option::is_none")]
    pub tls_cipher_suite: Option<String>,

    #[serde(rename = "access-mode", default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(rename = "service-ip", default, skip_serializing_if = "Option::is_none")]
    pub service_ip: Option<String>,
}

impl DriverOptions {
    pub fn from_map(map: &StringMap) -> Result<Self> {
        from_string_map(map)
    }

    pub fn to_map(&self) -> Result<StringMap> {
        to_string_map(self)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_cache_disables_kernel_cache() {
        let options = ResolvedOptions {
            kernel_cache: true,
            auto_cache: true,
            ..Default::default()
        };
        let driver = options.to_driver_options(Some("ReadWriteOnce".into()));
        assert!(!driver.kernel_cache);
        assert!(driver.auto_cache);
    }

    #[test]
    fn driver_map_carries_tunables_as_strings() {
        let options = ResolvedOptions {
            bucket: "b".into(),
            endpoint: "https://s3.example.com".into(),
            iam_endpoint: "https://iam.example.com".into(),
            chunk_size_mb: 16,
            s3fs_fuse_retry_count: Some(3),
            cos_service: Some(CosService {
                name: "cos".into(),
                namespace: "storage".into(),
                cluster_ip: "10.0.0.7".into(),
                port: 443,
            }),
            ..Default::default()
        };
        let map = options.to_driver_options(None).to_map().unwrap();

        assert_eq!(map["bucket"], "b");
        assert_eq!(map["chunk-size-mb"], "16");
        assert_eq!(map["s3fs-fuse-retry-count"], "3");
        assert_eq!(map["curl-debug"], "false");
        assert_eq!(map["service-ip"], "10.0.0.7");
        assert!(!map.contains_key("kernel-cache"));
        assert!(!map.contains_key("access-mode"));

        let parsed = DriverOptions::from_map(&map).unwrap();
        assert_eq!(parsed.endpoint, "https://s3.example.com");
        assert_eq!(parsed.iam_endpoint, "https://iam.example.com");
    }
}
