use anyhow::{anyhow, bail, Result};
use k8s_openapi::{
    api::core::v1::{
        FlexPersistentVolumeSource, PersistentVolume, PersistentVolumeSpec, SecretReference,
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};
use kube::ResourceExt;
use maplit::btreemap;

use crate::{consts::DRIVER_NAME, map::StringMap};

/// The result of a successful provisioning call.
///
/// `annotations` is everything `delete` needs later; it must survive a
/// round trip through the persisted volume unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionedVolume {
    pub name: String,
    pub annotations: StringMap,
    pub driver_options: StringMap,
    pub secret_name: String,
    pub secret_namespace: String,
    pub capacity: Option<String>,
    pub access_modes: Vec<String>,
    pub reclaim_policy: Option<String>,
}

impl ProvisionedVolume {
    pub fn to_persistent_volume(&self) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                annotations: Some(self.annotations.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                access_modes: Some(self.access_modes.clone()),
                capacity: self.capacity.as_ref().map(|capacity| {
                    btreemap! {
                        "storage".into() => Quantity(capacity.clone()),
                    }
                }),
                flex_volume: Some(FlexPersistentVolumeSource {
                    driver: DRIVER_NAME.into(),
                    fs_type: None,
                    options: Some(self.driver_options.clone()),
                    read_only: Some(false),
                    secret_ref: Some(SecretReference {
                        name: Some(self.secret_name.clone()),
                        namespace: Some(self.secret_namespace.clone()),
                    }),
                }),
                persistent_volume_reclaim_policy: self.reclaim_policy.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn from_persistent_volume(volume: &PersistentVolume) -> Result<Self> {
        let name = volume.name_any();
        let spec = volume
            .spec
            .as_ref()
            .ok_or_else(|| anyhow!("volume has no spec: {name}"))?;
        let source = spec
            .flex_volume
            .as_ref()
            .ok_or_else(|| anyhow!("volume is not a flex volume: {name}"))?;
        if source.driver != DRIVER_NAME {
            bail!(
                "volume is managed by another driver: {name} ({driver})",
                driver = source.driver,
            );
        }
        let secret_ref = source.secret_ref.as_ref();

        Ok(Self {
            annotations: volume.annotations().clone(),
            driver_options: source.options.clone().unwrap_or_default(),
            secret_name: secret_ref
                .and_then(|secret| secret.name.clone())
                .unwrap_or_default(),
            secret_namespace: secret_ref
                .and_then(|secret| secret.namespace.clone())
                .unwrap_or_default(),
            capacity: spec
                .capacity
                .as_ref()
                .and_then(|capacity| capacity.get("storage"))
                .map(|quantity| quantity.0.clone()),
            access_modes: spec.access_modes.clone().unwrap_or_default(),
            reclaim_policy: spec.persistent_volume_reclaim_policy.clone(),
            name,
        })
    }
}
