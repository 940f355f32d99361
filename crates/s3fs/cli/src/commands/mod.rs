mod delete;
mod provision;

use anyhow::Result;
use clap::Subcommand;
use kube::Client;
use s3fs_provisioner::Provisioner;

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Provision a bucket backed volume for a pending claim
    Provision(self::provision::ProvisionArgs),
    /// Release the bucket of a persistent volume
    Delete(self::delete::DeleteArgs),
}

impl Command {
    pub(crate) async fn run(self, kube: Client, provisioner: Provisioner) -> Result<()> {
        match self {
            Self::Provision(args) => args.run(kube, provisioner).await,
            Self::Delete(args) => args.run(kube, provisioner).await,
        }
    }
}
