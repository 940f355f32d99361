use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use url::Url;

/// Process-wide toggles, fixed for the lifetime of a provisioner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Parser)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerArgs {
    /// Restrict every bucket to the cluster's service endpoints unless the
    /// claim says otherwise
    #[arg(
        long,
        env = "S3FS_BUCKET_ACCESS_POLICY",
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value_t = ProvisionerArgs::default_bucket_access_policy(),
    )]
    #[serde(default = "ProvisionerArgs::default_bucket_access_policy")]
    pub bucket_access_policy: bool,

    /// Enforce the requested capacity as a hard bucket quota unless the claim
    /// says otherwise
    #[arg(
        long,
        env = "S3FS_QUOTA_LIMIT",
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value_t = ProvisionerArgs::default_quota_limit(),
    )]
    #[serde(default = "ProvisionerArgs::default_quota_limit")]
    pub quota_limit: bool,

    /// Allow claims to reference secrets in other namespaces
    #[arg(
        long,
        env = "S3FS_ALLOW_CROSS_NS_SECRET",
        value_name = "BOOL",
        action = ArgAction::Set,
        default_value_t = ProvisionerArgs::default_allow_cross_ns_secret(),
    )]
    #[serde(default = "ProvisionerArgs::default_allow_cross_ns_secret")]
    pub allow_cross_ns_secret: bool,

    #[arg(long, env = "CLUSTER_ID", value_name = "ID", default_value_t = String::new())]
    #[serde(default)]
    pub cluster_id: String,

    /// Unix socket of the provider sidecar
    #[arg(
        long,
        env = "S3FS_PROVIDER_ENDPOINT",
        value_name = "PATH",
        default_value = ProvisionerArgs::default_provider_endpoint_str(),
    )]
    #[serde(default = "ProvisionerArgs::default_provider_endpoint")]
    pub provider_endpoint: PathBuf,

    /// Identifier sent along every provider sidecar request
    #[arg(
        long,
        env = "S3FS_PROVIDER_NAME",
        value_name = "NAME",
        default_value_t = ProvisionerArgs::default_provider_name(),
    )]
    #[serde(default = "ProvisionerArgs::default_provider_name")]
    pub provider_name: String,

    #[arg(
        long,
        env = "S3FS_RESOURCE_CONFIG_ENDPOINT",
        value_name = "URL",
        default_value = ProvisionerArgs::default_resource_config_endpoint_str(),
    )]
    #[serde(default = "ProvisionerArgs::default_resource_config_endpoint")]
    pub resource_config_endpoint: Url,

    #[arg(
        long,
        env = "S3FS_RESOURCE_CONFIG_IAM_ENDPOINT",
        value_name = "URL",
        default_value = ProvisionerArgs::default_resource_config_iam_endpoint_str(),
    )]
    #[serde(default = "ProvisionerArgs::default_resource_config_iam_endpoint")]
    pub resource_config_iam_endpoint: Url,

    /// Directory the CA bundles of object storage services are written to
    #[arg(
        long,
        env = "S3FS_CA_BUNDLE_DIR",
        value_name = "PATH",
        default_value = ProvisionerArgs::default_ca_bundle_dir_str(),
    )]
    #[serde(default = "ProvisionerArgs::default_ca_bundle_dir")]
    pub ca_bundle_dir: PathBuf,

    /// Deadline of a single provision or delete call
    #[arg(
        long,
        env = "S3FS_TIMEOUT_SECS",
        value_name = "SECONDS",
        default_value_t = ProvisionerArgs::default_timeout_secs(),
    )]
    #[serde(default = "ProvisionerArgs::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProvisionerArgs {
    fn default() -> Self {
        Self {
            bucket_access_policy: Self::default_bucket_access_policy(),
            quota_limit: Self::default_quota_limit(),
            allow_cross_ns_secret: Self::default_allow_cross_ns_secret(),
            cluster_id: String::new(),
            provider_endpoint: Self::default_provider_endpoint(),
            provider_name: Self::default_provider_name(),
            resource_config_endpoint: Self::default_resource_config_endpoint(),
            resource_config_iam_endpoint: Self::default_resource_config_iam_endpoint(),
            ca_bundle_dir: Self::default_ca_bundle_dir(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl ProvisionerArgs {
    pub const fn default_bucket_access_policy() -> bool {
        false
    }

    pub const fn default_quota_limit() -> bool {
        false
    }

    pub const fn default_allow_cross_ns_secret() -> bool {
        true
    }

    const fn default_provider_endpoint_str() -> &'static str {
        "/s3fsprovider/provider.sock"
    }

    pub fn default_provider_endpoint() -> PathBuf {
        Self::default_provider_endpoint_str().into()
    }

    const fn default_ca_bundle_dir_str() -> &'static str {
        "/tmp"
    }

    pub fn default_ca_bundle_dir() -> PathBuf {
        Self::default_ca_bundle_dir_str().into()
    }

    pub fn default_provider_name() -> String {
        "S3fsProviderClient".into()
    }

    const fn default_resource_config_endpoint_str() -> &'static str {
        "https://config.private.cloud-object-storage.cloud.ibm.com/v1"
    }

    pub fn default_resource_config_endpoint() -> Url {
        Self::default_resource_config_endpoint_str().parse().unwrap()
    }

    const fn default_resource_config_iam_endpoint_str() -> &'static str {
        "https://private.iam.cloud.ibm.com"
    }

    pub fn default_resource_config_iam_endpoint() -> Url {
        Self::default_resource_config_iam_endpoint_str()
            .parse()
            .unwrap()
    }

    pub const fn default_timeout_secs() -> u64 {
        60
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
