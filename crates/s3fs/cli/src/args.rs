use std::sync::Arc;

use anyhow::Result;
use clap::{value_parser, ArgAction, Parser};
use kube::Client;
use s3fs_provider::{
    object::MinioSessionFactory, policy::ResourceConfigurationClient, secret::KubeSecretStore,
    service::KubeServiceResolver, topology::GrpcTopologyService, uuid::OsUuidGenerator,
};
use s3fs_provisioner::{Provisioner, ProvisionerArgs, ProvisionerPorts};
use tracing::{debug, instrument, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    #[command(flatten)]
    common: ArgsCommon,

    #[command(subcommand)]
    command: crate::commands::Command,
}

impl Args {
    pub(crate) async fn run(self) -> Result<()> {
        let (kube, provisioner) = self.common.run().await?;
        self.command.run(kube, provisioner).await
    }
}

#[derive(Parser)]
pub(crate) struct ArgsCommon {
    /// Turn debugging information on
    #[arg(short, long, global = true, env = "S3FS_DEBUG", action = ArgAction::Count)]
    #[arg(value_parser = value_parser!(u8).range(..=3))]
    debug: u8,

    #[command(flatten)]
    provisioner: ProvisionerArgs,
}

impl ArgsCommon {
    async fn run(self) -> Result<(Client, Provisioner)> {
        self.init_logger();

        let kube = Client::try_default().await?;
        let provisioner = init_provisioner(self.provisioner, kube.clone()).await?;
        Ok((kube, provisioner))
    }

    fn init_logger(&self) {
        // DEBUG_TRACE raises the level to at least DEBUG
        let debug_trace = ::s3fs_core::env::infer("DEBUG_TRACE").unwrap_or(false);
        let level = if debug_trace {
            self.debug.max(2)
        } else {
            self.debug
        };
        ::s3fs_core::tracer::init_once_with_level_int(level, true);
    }
}

#[instrument(level = Level::INFO, skip_all, err(Display))]
async fn init_provisioner(args: ProvisionerArgs, kube: Client) -> Result<Provisioner> {
    debug!("provisioner args: {args:?}");

    let ports = ProvisionerPorts {
        secrets: Arc::new(KubeSecretStore::new(kube.clone())),
        services: Arc::new(KubeServiceResolver::try_new(kube).await?),
        objects: Arc::new(MinioSessionFactory::new(args.ca_bundle_dir.clone())),
        policy: Arc::new(ResourceConfigurationClient::new(
            args.resource_config_endpoint.clone(),
            args.resource_config_iam_endpoint.clone(),
        )),
        topology: Arc::new(GrpcTopologyService::new(args.provider_endpoint.clone())),
        uuid: Arc::new(OsUuidGenerator),
    };
    Ok(Provisioner::new(args, ports))
}
