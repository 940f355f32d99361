pub mod error;
pub mod iam;
pub mod object;
pub mod policy;
pub mod secret;
pub mod service;
pub mod topology;
pub mod uuid;

pub use self::{
    error::{ProviderError, Result},
    object::{CreateBucketOptions, ObjectStorageSession, ObjectStorageSessionFactory},
    policy::{BucketConfigPatch, PolicyService},
    secret::{SecretData, SecretStore},
    service::{ResolvedService, ServiceResolver},
    topology::TopologyService,
    uuid::UuidGenerator,
};
