use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use tracing::{instrument, Level};

use crate::{
    error::{ProviderError, Result},
    secret::from_kube_error,
};

/// An in-cluster service reachable by its DNS name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedService {
    pub host: String,
    pub cluster_ip: String,
    pub port: i32,
}

impl ResolvedService {
    pub fn https_endpoint(&self) -> String {
        format!("https://{host}:{port}", host = &self.host, port = self.port)
    }
}

#[async_trait]
pub trait ServiceResolver: Send + Sync {
    async fn resolve(&self, name: &str, namespace: &str) -> Result<ResolvedService>;
}

pub struct KubeServiceResolver {
    cluster_domain: String,
    kube: Client,
}

impl KubeServiceResolver {
    pub async fn try_new(kube: Client) -> ::anyhow::Result<Self> {
        Ok(Self {
            cluster_domain: get_cluster_domain().await?,
            kube,
        })
    }
}

#[async_trait]
impl ServiceResolver for KubeServiceResolver {
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn resolve(&self, name: &str, namespace: &str) -> Result<ResolvedService> {
        let api = Api::<Service>::namespaced(self.kube.clone(), namespace);
        let service = api.get(name).await.map_err(from_kube_error)?;
        let spec = service.spec.unwrap_or_default();

        let port = spec
            .ports
            .as_ref()
            .and_then(|ports| ports.first())
            .map(|port| port.port)
            .ok_or_else(|| ProviderError::new(format!("service has no ports: {namespace}/{name}")))?;

        Ok(ResolvedService {
            host: format!(
                "{name}.{namespace}.svc.{domain}",
                domain = &self.cluster_domain,
            ),
            cluster_ip: spec.cluster_ip.unwrap_or_default(),
            port,
        })
    }
}

#[cfg(unix)]
#[instrument(level = Level::INFO, skip_all, err(Display))]
pub async fn get_cluster_domain() -> ::anyhow::Result<String> {
    use tokio::{fs::File, io::AsyncReadExt};

    let mut buf = Default::default();
    let mut f = File::open("/etc/resolv.conf")
        .await
        .map_err(|error| anyhow!("failed to open resolv.conf: {error}"))?;
    f.read_to_end(&mut buf).await?;

    let cfg = ::resolv_conf::Config::parse(&buf)?;
    Ok(find_cluster_domain(&cfg))
}

#[cfg(not(unix))]
pub async fn get_cluster_domain() -> ::anyhow::Result<String> {
    Ok(DEFAULT_CLUSTER_DOMAIN.into())
}

const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Pods search `<ns>.svc.<domain>`, `svc.<domain>` and `<domain>`; the
/// shortest entry is the bare cluster domain.
fn find_cluster_domain(cfg: &::resolv_conf::Config) -> String {
    cfg.get_search()
        .and_then(|list| list.iter().min_by_key(|search| search.len()))
        .map(AsRef::as_ref)
        .unwrap_or(DEFAULT_CLUSTER_DOMAIN)
        .into()
}
