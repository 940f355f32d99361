use anyhow::Result;
use clap::Parser;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::{api::DeleteParams, Api, Client};
use s3fs_api::volume::ProvisionedVolume;
use s3fs_provisioner::Provisioner;
use tracing::{info, instrument, Level};

#[derive(Clone, Debug, Parser)]
pub(crate) struct DeleteArgs {
    /// Name of the persistent volume
    #[arg(value_name = "VOLUME")]
    volume: String,

    /// Also remove the volume object once its bucket is released
    #[arg(long)]
    purge: bool,
}

impl DeleteArgs {
    #[instrument(level = Level::INFO, skip(kube, provisioner), err(Display))]
    pub(super) async fn run(self, kube: Client, provisioner: Provisioner) -> Result<()> {
        let api = Api::<PersistentVolume>::all(kube);
        let volume = api.get(&self.volume).await?;

        provisioner
            .delete(&ProvisionedVolume::from_persistent_volume(&volume)?)
            .await?;

        if self.purge {
            api.delete(&self.volume, &DeleteParams::default()).await?;
            info!("deleted volume: {}", &self.volume);
        }
        Ok(())
    }
}
