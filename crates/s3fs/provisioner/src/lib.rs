pub mod args;
pub mod credentials;
pub mod decision;
pub mod error;
pub mod merge;
pub mod namer;
pub mod policy;
pub mod provisioner;
pub mod topology;

pub use self::{
    args::ProvisionerArgs,
    error::{ErrorContext, ErrorKind, ProvisionError, ProvisionState},
    provisioner::{Provisioner, ProvisionerPorts},
};
