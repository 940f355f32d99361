//! Merges claim annotations over storage class parameters into one validated
//! option set.

use std::{net::IpAddr, str::FromStr};

use ipnet::IpNet;
use s3fs_api::{
    annotations::{ClaimAnnotations, ClassParameters},
    options::{CosService, ResolvedOptions},
};
use s3fs_provider::ServiceResolver;
use tracing::{info, instrument, Level};

use crate::error::ErrorKind;

type Result<T> = ::std::result::Result<T, ErrorKind>;

#[instrument(level = Level::INFO, skip_all, err(Display))]
pub async fn merge(
    claim: &ClaimAnnotations,
    class: &ClassParameters,
    claim_namespace: &str,
    services: &dyn ServiceResolver,
) -> Result<ResolvedOptions> {
    let auto_create_bucket = parse_flag("auto-create-bucket", claim.auto_create_bucket.as_deref())?
        .unwrap_or(true);
    let auto_delete_bucket = parse_flag("auto-delete-bucket", claim.auto_delete_bucket.as_deref())?
        .unwrap_or(false);
    let configure_firewall = parse_flag("configure-firewall", claim.configure_firewall.as_deref())?;
    let quota_limit = parse_flag("quota-limit", claim.quota_limit.as_deref())?;
    let bucket_versioning = parse_flag("bucket-versioning", claim.bucket_versioning.as_deref())?
        .unwrap_or(false);
    let curl_debug = parse_flag("curl-debug", override_with(&claim.curl_debug, &class.curl_debug))?;
    let use_xattr = parse_flag("use-xattr", override_with(&claim.use_xattr, &class.use_xattr))?;
    let kernel_cache = parse_flag("kernel-cache", class.kernel_cache.as_deref())?;
    let auto_cache = parse_flag("auto-cache", claim.auto_cache.as_deref())?;

    let secret_name = claim
        .secret_name
        .clone()
        .or_else(|| class.secret_name.clone())
        .ok_or_else(|| ErrorKind::configuration("secret-name not specified"))?;
    let secret_namespace = claim
        .secret_namespace
        .clone()
        .unwrap_or_else(|| claim_namespace.into());

    let object_path = claim.object_path.clone();
    if auto_create_bucket {
        if let Some(object_path) = &object_path {
            return Err(ErrorKind::configuration(format!(
                "object-path cannot be set when auto-create is enabled, got: {object_path}"
            )));
        }
    }

    let bucket = claim.bucket.clone().unwrap_or_default();
    if auto_delete_bucket {
        if !auto_create_bucket {
            return Err(ErrorKind::configuration(
                "bucket auto-create must be enabled when bucket auto-delete is enabled",
            ));
        }
        if !bucket.is_empty() {
            return Err(ErrorKind::configuration(format!(
                "bucket cannot be set when auto-delete is enabled, got: {bucket}"
            )));
        }
    }

    let cos_service = match (&claim.cos_service, &claim.cos_service_namespace) {
        (Some(name), Some(namespace)) => {
            let service = services.resolve(name, namespace).await.map_err(|error| {
                ErrorKind::external("cannot retrieve service details", error)
            })?;
            info!("using TLS enabled object storage service: {namespace}/{name}");
            Some((
                service.https_endpoint(),
                CosService {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    cluster_ip: service.cluster_ip,
                    port: service.port,
                },
            ))
        }
        _ => None,
    };
    let (endpoint, cos_service) = match cos_service {
        Some((endpoint, service)) => (endpoint, Some(service)),
        None => (
            claim
                .endpoint
                .clone()
                .or_else(|| class.object_store_endpoint.clone())
                .unwrap_or_default(),
            None,
        ),
    };
    if !has_scheme(&endpoint) {
        return Err(ErrorKind::configuration(format!(
            "Bad value for s3fs.ulagbulag.io/object-store-endpoint \"{endpoint}\": scheme is missing. \
             Must be of the form http://<hostname> or https://<hostname>"
        )));
    }

    let iam_endpoint = claim
        .iam_endpoint
        .clone()
        .or_else(|| class.iam_endpoint.clone())
        .unwrap_or_default();
    if !has_scheme(&iam_endpoint) {
        return Err(ErrorKind::configuration(format!(
            "Bad value for s3fs.ulagbulag.io/iam-endpoint \"{iam_endpoint}\": \
             Must be of the form https://<hostname> or http://<hostname>"
        )));
    }

    let s3fs_fuse_retry_count = parse_int(
        "s3fs-fuse-retry-count",
        override_with(&claim.s3fs_fuse_retry_count, &class.s3fs_fuse_retry_count),
    )?;
    if s3fs_fuse_retry_count.is_some_and(|count| count < 1) {
        return Err(ErrorKind::configuration(
            "value of s3fs-fuse-retry-count should be >= 1",
        ));
    }

    let stat_cache_expire_seconds = parse_int(
        "stat-cache-expire-seconds",
        override_with(&claim.stat_cache_expire_seconds, &class.stat_cache_expire_seconds),
    )?;
    if stat_cache_expire_seconds.is_some_and(|seconds| seconds < 0) {
        return Err(ErrorKind::configuration(
            "value of stat-cache-expire-seconds should be >= 0",
        ));
    }

    let chunk_size_mb = parse_int(
        "chunk-size-mb",
        override_with(&claim.chunk_size_mb, &class.chunk_size_mb),
    )?;
    let parallel_count = parse_int(
        "parallel-count",
        override_with(&claim.parallel_count, &class.parallel_count),
    )?;
    let multireq_max = parse_int(
        "multireq-max",
        override_with(&claim.multireq_max, &class.multireq_max),
    )?;
    let stat_cache_size = parse_int(
        "stat-cache-size",
        override_with(&claim.stat_cache_size, &class.stat_cache_size),
    )?;
    let connect_timeout = parse_int(
        "connect-timeout",
        override_with(&claim.connect_timeout, &class.connect_timeout),
    )?;
    let readwrite_timeout = parse_int(
        "readwrite-timeout",
        override_with(&claim.readwrite_timeout, &class.readwrite_timeout),
    )?;

    let allowed_ips = claim
        .allowed_ips
        .as_deref()
        .map(parse_allowed_ips)
        .transpose()?
        .unwrap_or_default();

    Ok(ResolvedOptions {
        bucket,
        object_path,
        auto_create_bucket,
        auto_delete_bucket,
        bucket_versioning,
        endpoint,
        storage_class: claim
            .region
            .clone()
            .or_else(|| class.object_store_storage_class.clone()),
        iam_endpoint,
        chunk_size_mb: chunk_size_mb.unwrap_or_default(),
        parallel_count: parallel_count.unwrap_or_default(),
        multireq_max: multireq_max.unwrap_or_default(),
        stat_cache_size: stat_cache_size.unwrap_or_default(),
        stat_cache_expire_seconds,
        s3fs_fuse_retry_count,
        connect_timeout,
        readwrite_timeout,
        debug_level: override_with(&claim.debug_level, &class.debug_level)
            .unwrap_or_default()
            .into(),
        curl_debug: curl_debug.unwrap_or_default(),
        kernel_cache: kernel_cache.unwrap_or_default(),
        auto_cache: auto_cache.unwrap_or_default(),
        use_xattr: use_xattr.unwrap_or_default(),
        tls_cipher_suite: override_with(&claim.tls_cipher_suite, &class.tls_cipher_suite)
            .map(Into::into),
        configure_firewall,
        quota_limit,
        allowed_ips,
        secret_name,
        secret_namespace,
        validate_bucket: claim.validate_bucket.as_deref() != Some("no"),
        cos_service,
    })
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
pub fn parse_bool(value: &str) -> ::std::result::Result<bool, String> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        value => Err(format!("invalid syntax: {value:?}")),
    }
}

fn parse_flag(key: &str, value: Option<&str>) -> Result<Option<bool>> {
    value
        .map(|value| {
            parse_bool(value).map_err(|error| {
                ErrorKind::configuration(format!(
                    "invalid value for {key}, expects true/false: {error}"
                ))
            })
        })
        .transpose()
}

fn parse_int(key: &str, value: Option<&str>) -> Result<Option<i64>> {
    value
        .map(|value| {
            i64::from_str(value.trim()).map_err(|error| {
                ErrorKind::configuration(format!("cannot convert field {key}: {error}"))
            })
        })
        .transpose()
}

fn parse_allowed_ips(value: &str) -> Result<Vec<IpNet>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| {
                    ErrorKind::configuration(format!(
                        "cannot convert field allowed-ips: invalid IP address or CIDR: {entry}"
                    ))
                })
        })
        .collect()
}

fn override_with<'a>(claim: &'a Option<String>, class: &'a Option<String>) -> Option<&'a str> {
    claim.as_deref().or(class.as_deref())
}

fn has_scheme(endpoint: &str) -> bool {
    endpoint.starts_with("https://") || endpoint.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use s3fs_provider::{ProviderError, ResolvedService};
    use test_case::test_case;

    use super::*;

    struct NoServices;

    #[async_trait]
    impl ServiceResolver for NoServices {
        async fn resolve(
            &self,
            name: &str,
            namespace: &str,
        ) -> s3fs_provider::Result<ResolvedService> {
            Err(ProviderError::new(format!("not found: {namespace}/{name}")))
        }
    }

    struct OneService;

    #[async_trait]
    impl ServiceResolver for OneService {
        async fn resolve(
            &self,
            name: &str,
            namespace: &str,
        ) -> s3fs_provider::Result<ResolvedService> {
            Ok(ResolvedService {
                host: format!("{name}.{namespace}.svc.cluster.local"),
                cluster_ip: "10.0.0.7".into(),
                port: 8443,
            })
        }
    }

    fn claim() -> ClaimAnnotations {
        ClaimAnnotations {
            secret_name: Some("creds".into()),
            ..Default::default()
        }
    }

    fn class() -> ClassParameters {
        ClassParameters {
            object_store_endpoint: Some("https://s3.example.com".into()),
            object_store_storage_class: Some("us-standard".into()),
            iam_endpoint: Some("https://iam.example.com".into()),
            chunk_size_mb: Some("16".into()),
            parallel_count: Some("2".into()),
            ..Default::default()
        }
    }

    async fn try_merge(claim: ClaimAnnotations, class: ClassParameters) -> Result<ResolvedOptions> {
        merge(&claim, &class, "team-a", &NoServices).await
    }

    fn message(kind: ErrorKind) -> String {
        kind.to_string()
    }

    #[tokio::test]
    async fn defaults_apply_when_nothing_is_set() {
        let options = try_merge(claim(), class()).await.unwrap();
        assert!(options.auto_create_bucket);
        assert!(!options.auto_delete_bucket);
        assert_eq!(options.configure_firewall, None);
        assert_eq!(options.quota_limit, None);
        assert_eq!(options.secret_namespace, "team-a");
        assert_eq!(options.endpoint, "https://s3.example.com");
        assert_eq!(options.storage_class.as_deref(), Some("us-standard"));
        assert_eq!(options.chunk_size_mb, 16);
        assert!(options.validate_bucket);
        assert!(options.bucket.is_empty());
    }

    #[tokio::test]
    async fn claim_values_override_class_values() {
        let claim = ClaimAnnotations {
            endpoint: Some("http://minio.local".into()),
            region: Some("eu-smart".into()),
            chunk_size_mb: Some("64".into()),
            debug_level: Some("debug".into()),
            ..claim()
        };
        let class = ClassParameters {
            debug_level: Some("warn".into()),
            ..class()
        };
        let options = try_merge(claim, class).await.unwrap();
        assert_eq!(options.endpoint, "http://minio.local");
        assert_eq!(options.storage_class.as_deref(), Some("eu-smart"));
        assert_eq!(options.chunk_size_mb, 64);
        assert_eq!(options.parallel_count, 2);
        assert_eq!(options.debug_level, "debug");
    }

    #[tokio::test]
    async fn secret_name_falls_back_to_class() {
        let claim = ClaimAnnotations::default();
        let class = ClassParameters {
            secret_name: Some("class-creds".into()),
            ..class()
        };
        let options = try_merge(claim, class).await.unwrap();
        assert_eq!(options.secret_name, "class-creds");
    }

    #[tokio::test]
    async fn missing_secret_name_is_rejected() {
        let error = try_merge(ClaimAnnotations::default(), class()).await.unwrap_err();
        assert_eq!(message(error), "secret-name not specified");
    }

    #[test_case("auto-create-bucket", ClaimAnnotations { auto_create_bucket: Some("yes".into()), ..claim() })]
    #[test_case("auto-delete-bucket", ClaimAnnotations { auto_delete_bucket: Some("maybe".into()), ..claim() })]
    #[test_case("configure-firewall", ClaimAnnotations { configure_firewall: Some("on".into()), ..claim() })]
    #[test_case("quota-limit", ClaimAnnotations { quota_limit: Some("2".into()), ..claim() })]
    #[test_case("curl-debug", ClaimAnnotations { curl_debug: Some("loud".into()), ..claim() })]
    #[test_case("use-xattr", ClaimAnnotations { use_xattr: Some("y".into()), ..claim() })]
    #[test_case("auto-cache", ClaimAnnotations { auto_cache: Some("sometimes".into()), ..claim() })]
    #[tokio::test]
    async fn malformed_flags_name_the_key(key: &str, claim: ClaimAnnotations) {
        let error = message(try_merge(claim, class()).await.unwrap_err());
        assert!(
            error.starts_with(&format!("invalid value for {key}, expects true/false")),
            "{error}",
        );
    }

    #[tokio::test]
    async fn flags_are_checked_before_numbers() {
        let claim = ClaimAnnotations {
            chunk_size_mb: Some("big".into()),
            curl_debug: Some("loud".into()),
            ..claim()
        };
        let error = message(try_merge(claim, class()).await.unwrap_err());
        assert!(
            error.starts_with("invalid value for curl-debug, expects true/false"),
            "{error}",
        );

        let class = ClassParameters {
            kernel_cache: Some("fast".into()),
            ..class()
        };
        let error = message(try_merge(claim(), class).await.unwrap_err());
        assert!(
            error.starts_with("invalid value for kernel-cache, expects true/false"),
            "{error}",
        );
    }

    #[tokio::test]
    async fn object_path_requires_manual_bucket() {
        let claim = ClaimAnnotations {
            object_path: Some("/data".into()),
            ..claim()
        };
        let error = try_merge(claim, class()).await.unwrap_err();
        assert_eq!(
            message(error),
            "object-path cannot be set when auto-create is enabled, got: /data",
        );
    }

    #[tokio::test]
    async fn auto_delete_requires_auto_create() {
        let claim = ClaimAnnotations {
            auto_create_bucket: Some("false".into()),
            auto_delete_bucket: Some("true".into()),
            bucket: Some("explicit".into()),
            ..claim()
        };
        let error = try_merge(claim, class()).await.unwrap_err();
        assert_eq!(
            message(error),
            "bucket auto-create must be enabled when bucket auto-delete is enabled",
        );
    }

    #[tokio::test]
    async fn auto_delete_forbids_explicit_bucket() {
        let claim = ClaimAnnotations {
            auto_delete_bucket: Some("true".into()),
            bucket: Some("explicit".into()),
            ..claim()
        };
        let error = try_merge(claim, class()).await.unwrap_err();
        assert_eq!(
            message(error),
            "bucket cannot be set when auto-delete is enabled, got: explicit",
        );
    }

    #[test_case(Some("s3.example.com"), Some("https://iam.example.com"), "object-store-endpoint" ; "object store endpoint without scheme")]
    #[test_case(None, Some("https://iam.example.com"), "object-store-endpoint" ; "object store endpoint missing")]
    #[test_case(Some("https://s3.example.com"), Some("iam.example.com"), "iam-endpoint" ; "iam endpoint without scheme")]
    #[test_case(Some("https://s3.example.com"), None, "iam-endpoint" ; "iam endpoint missing")]
    #[tokio::test]
    async fn endpoints_require_scheme(endpoint: Option<&str>, iam_endpoint: Option<&str>, key: &str) {
        let class = ClassParameters {
            object_store_endpoint: endpoint.map(Into::into),
            iam_endpoint: iam_endpoint.map(Into::into),
            ..class()
        };
        let error = message(try_merge(claim(), class).await.unwrap_err());
        assert!(
            error.starts_with(&format!("Bad value for s3fs.ulagbulag.io/{key}")),
            "{error}",
        );
    }

    #[test_case("s3fs-fuse-retry-count", "0", "value of s3fs-fuse-retry-count should be >= 1")]
    #[test_case("stat-cache-expire-seconds", "-1", "value of stat-cache-expire-seconds should be >= 0")]
    #[test_case("chunk-size-mb", "big", "cannot convert field chunk-size-mb: invalid digit found in string")]
    #[test_case("connect-timeout", "1.5", "cannot convert field connect-timeout: invalid digit found in string")]
    #[tokio::test]
    async fn numeric_ranges_are_checked(key: &str, value: &str, expected: &str) {
        let mut claim = claim();
        let field = match key {
            "s3fs-fuse-retry-count" => &mut claim.s3fs_fuse_retry_count,
            "stat-cache-expire-seconds" => &mut claim.stat_cache_expire_seconds,
            "chunk-size-mb" => &mut claim.chunk_size_mb,
            "connect-timeout" => &mut claim.connect_timeout,
            _ => unreachable!(),
        };
        *field = Some(value.into());

        let error = try_merge(claim, class()).await.unwrap_err();
        assert_eq!(message(error), expected);
    }

    #[tokio::test]
    async fn allowed_ips_accept_addresses_and_networks() {
        let claim = ClaimAnnotations {
            allowed_ips: Some("10.0.0.1, 192.168.0.0/16,".into()),
            ..claim()
        };
        let options = try_merge(claim, class()).await.unwrap();
        assert_eq!(
            options.allowed_ips,
            vec![
                "10.0.0.1/32".parse::<IpNet>().unwrap(),
                "192.168.0.0/16".parse::<IpNet>().unwrap(),
            ],
        );
    }

    #[tokio::test]
    async fn malformed_allowed_ip_is_rejected() {
        let claim = ClaimAnnotations {
            allowed_ips: Some("10.0.0.1,not-an-ip".into()),
            ..claim()
        };
        let error = try_merge(claim, class()).await.unwrap_err();
        assert_eq!(
            message(error),
            "cannot convert field allowed-ips: invalid IP address or CIDR: not-an-ip",
        );
    }

    #[tokio::test]
    async fn cos_service_replaces_endpoint() {
        let claim = ClaimAnnotations {
            cos_service: Some("cos".into()),
            cos_service_namespace: Some("storage".into()),
            ..claim()
        };
        let class = ClassParameters {
            object_store_endpoint: None,
            ..class()
        };
        let options = merge(&claim, &class, "team-a", &OneService).await.unwrap();
        assert_eq!(options.endpoint, "https://cos.storage.svc.cluster.local:8443");
        assert_eq!(
            options.cos_service.map(|service| service.cluster_ip),
            Some("10.0.0.7".into()),
        );
    }

    #[tokio::test]
    async fn validate_bucket_is_disabled_only_by_no() {
        let claim = ClaimAnnotations {
            validate_bucket: Some("no".into()),
            ..claim()
        };
        assert!(!try_merge(claim, class()).await.unwrap().validate_bucket);

        let claim = ClaimAnnotations {
            validate_bucket: Some("false".into()),
            ..self::claim()
        };
        assert!(try_merge(claim, class()).await.unwrap().validate_bucket);
    }

    #[test]
    fn go_style_booleans() {
        for value in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(value), Ok(true));
        }
        for value in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(value), Ok(false));
        }
        assert!(parse_bool("yes").is_err());
        assert!(parse_bool("").is_err());
    }
}
