use anyhow::{anyhow, Result};
use clap::Parser;
use k8s_openapi::api::{
    core::v1::{PersistentVolume, PersistentVolumeClaim},
    storage::v1::StorageClass,
};
use kube::{api::PostParams, Api, Client, ResourceExt};
use s3fs_api::request::ProvisionRequest;
use s3fs_provisioner::Provisioner;
use tracing::{info, instrument, Level};

#[derive(Clone, Debug, Parser)]
pub(crate) struct ProvisionArgs {
    /// Name of the pending claim
    #[arg(value_name = "CLAIM")]
    claim: String,

    /// Namespace of the claim; defaults to the current context's namespace
    #[arg(short, long, value_name = "NAMESPACE")]
    namespace: Option<String>,

    /// Name of the volume to create; defaults to `pvc-<claim uid>`
    #[arg(long, value_name = "NAME")]
    volume_name: Option<String>,

    /// Create the volume in the cluster instead of printing it
    #[arg(long)]
    apply: bool,
}

impl ProvisionArgs {
    #[instrument(level = Level::INFO, skip(kube, provisioner), err(Display))]
    pub(super) async fn run(self, kube: Client, provisioner: Provisioner) -> Result<()> {
        let namespace = self
            .namespace
            .unwrap_or_else(|| kube.default_namespace().into());

        let claim = Api::<PersistentVolumeClaim>::namespaced(kube.clone(), &namespace)
            .get(&self.claim)
            .await?;
        let class_name = claim
            .spec
            .as_ref()
            .and_then(|spec| spec.storage_class_name.as_deref())
            .ok_or_else(|| anyhow!("claim has no storage class: {namespace}/{}", &self.claim))?;
        let class = Api::<StorageClass>::all(kube.clone())
            .get(class_name)
            .await?;

        let volume_name = match self.volume_name {
            Some(name) => name,
            None => format!(
                "pvc-{}",
                claim
                    .uid()
                    .ok_or_else(|| anyhow!("claim has no uid: {namespace}/{}", &self.claim))?,
            ),
        };
        let request = ProvisionRequest::from_claim(&claim, &class, volume_name)?;
        let volume = provisioner
            .provision(&request)
            .await?
            .to_persistent_volume();

        if self.apply {
            let api = Api::<PersistentVolume>::all(kube);
            let volume = api.create(&PostParams::default(), &volume).await?;
            info!("created volume: {}", volume.name_any());
            Ok(())
        } else {
            println!("{}", ::serde_json::to_string_pretty(&volume)?);
            Ok(())
        }
    }
}
