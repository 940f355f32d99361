use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::{instrument, Level};

use crate::error::{codes, ProviderError, Result};

/// A secret with its payload decoded as UTF-8.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretData {
    pub type_: Option<String>,
    pub data: BTreeMap<String, String>,
}

impl ::std::fmt::Debug for SecretData {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        f.debug_struct("SecretData")
            .field("type_", &self.type_)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str, namespace: &str) -> Result<SecretData>;
}

pub struct KubeSecretStore {
    kube: Client,
}

impl KubeSecretStore {
    pub fn new(kube: Client) -> Self {
        Self { kube }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn get(&self, name: &str, namespace: &str) -> Result<SecretData> {
        let api = Api::<Secret>::namespaced(self.kube.clone(), namespace);
        let secret = api.get(name).await.map_err(from_kube_error)?;

        let mut data: BTreeMap<_, _> = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| {
                String::from_utf8(value.0)
                    .map(|value| (key.clone(), value))
                    .map_err(|_| ProviderError::new(format!("secret key is not UTF-8: {key}")))
            })
            .collect::<Result<_>>()?;
        // stringData only shows up on objects that were never persisted
        data.extend(secret.string_data.unwrap_or_default());

        Ok(SecretData {
            type_: secret.type_,
            data,
        })
    }
}

pub(crate) fn from_kube_error(error: ::kube::Error) -> ProviderError {
    let status = match &error {
        ::kube::Error::Api(response) => Some(response.code),
        _ => None,
    };
    match status {
        Some(404) => ProviderError::new(error).with_code(codes::NOT_FOUND),
        Some(403) => ProviderError::new(error).with_code(codes::FORBIDDEN),
        Some(status) if status < 500 => ProviderError::new(error),
        _ => ProviderError::transient(error),
    }
}
