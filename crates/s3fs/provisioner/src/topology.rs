use std::sync::Arc;

use ipnet::IpNet;
use s3fs_api::cluster::ClusterType;
use s3fs_provider::{error::codes, ProviderError, TopologyService};
use tracing::{info, instrument, Level};

use crate::error::ErrorKind;

/// Answers which source addresses a bucket firewall should admit.
#[derive(Clone)]
pub struct ClusterTopologyClient {
    service: Arc<dyn TopologyService>,
    /// Sent as the request identifier to the provider sidecar.
    provider_name: String,
}

impl ClusterTopologyClient {
    pub fn new(service: Arc<dyn TopologyService>, provider_name: impl Into<String>) -> Self {
        Self {
            service,
            provider_name: provider_name.into(),
        }
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn get_cluster_type(&self) -> Result<ClusterType, ErrorKind> {
        let cluster_type = self
            .service
            .get_cluster_type(&self.provider_name)
            .await
            .map_err(|error| from_provider_error("cannot get cluster type", error))?;
        info!("cluster type: {cluster_type}");
        Ok(ClusterType::from_provider_type(&cluster_type))
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn get_service_endpoints(&self) -> Result<Vec<String>, ErrorKind> {
        let endpoints = self
            .service
            .get_service_endpoints(&self.provider_name)
            .await
            .map_err(|error| from_provider_error("cannot get service endpoints", error))?;
        Ok(endpoints
            .split(',')
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map(Into::into)
            .collect())
    }

    /// Explicit addresses win; otherwise the cluster's service endpoints are
    /// used, which only VPC gen2 clusters expose.
    #[instrument(level = Level::INFO, skip_all, err(Display))]
    pub async fn firewall_allowed_ips(&self, explicit: &[IpNet]) -> Result<Vec<String>, ErrorKind> {
        if !explicit.is_empty() {
            return Ok(explicit.iter().map(ToString::to_string).collect());
        }

        let cluster_type = self.get_cluster_type().await?;
        if !cluster_type.supports_firewall() {
            return Err(ErrorKind::configuration(match cluster_type {
                ClusterType::Classic => format!(
                    "UpdateBucketFirewallConfig not supported for classic clusters: {cluster_type}"
                ),
                _ => format!("invalid ClusterType or ClusterType not supported: {cluster_type}"),
            }));
        }

        let endpoints = self.get_service_endpoints().await?;
        if endpoints.is_empty() {
            Err(ErrorKind::configuration(
                "cannot configure firewall for bucket. service endpoints not found",
            ))
        } else {
            Ok(endpoints)
        }
    }
}

/// A sidecar that cannot be reached is not retried.
fn from_provider_error(context: &str, error: ProviderError) -> ErrorKind {
    let unavailable = error.has_code(codes::UNAVAILABLE);
    match ErrorKind::external(context, error) {
        ErrorKind::ExternalService { message, code, .. } if unavailable => {
            ErrorKind::ExternalService {
                message,
                code,
                retryable: false,
            }
        }
        kind => kind,
    }
}
