use anyhow::{anyhow, Result};
use k8s_openapi::api::{core::v1::PersistentVolumeClaim, storage::v1::StorageClass};
use kube::ResourceExt;

use crate::map::StringMap;

/// A claim waiting for a volume, as handed over by the controller loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub claim_name: String,
    pub namespace: String,
    /// Requested `storage` quantity, verbatim.
    pub capacity: Option<String>,
    pub access_modes: Vec<String>,
    pub annotations: StringMap,
    pub parameters: StringMap,
    pub reclaim_policy: Option<String>,
    pub volume_name: String,
}

impl ProvisionRequest {
    pub fn from_claim(
        claim: &PersistentVolumeClaim,
        class: &StorageClass,
        volume_name: String,
    ) -> Result<Self> {
        let claim_name = claim.name_any();
        let namespace = claim
            .namespace()
            .ok_or_else(|| anyhow!("claim has no namespace: {claim_name}"))?;
        let spec = claim.spec.as_ref();

        Ok(Self {
            capacity: spec
                .and_then(|spec| spec.resources.as_ref())
                .and_then(|resources| resources.requests.as_ref())
                .and_then(|requests| requests.get("storage"))
                .map(|quantity| quantity.0.clone()),
            access_modes: spec
                .and_then(|spec| spec.access_modes.clone())
                .unwrap_or_default(),
            annotations: claim.annotations().clone(),
            parameters: class.parameters.clone().unwrap_or_default(),
            reclaim_policy: class.reclaim_policy.clone(),
            claim_name,
            namespace,
            volume_name,
        })
    }
}
