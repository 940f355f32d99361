use std::sync::Arc;

use s3fs_api::{
    consts::DRIVER_NAME,
    credentials::{keys, CredentialKind, Credentials, ResolvedSecret},
};
use s3fs_provider::{SecretData, SecretStore};
use tracing::{instrument, Level};

use crate::error::ErrorKind;

/// Turns a credential secret into [`ResolvedSecret`].
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    #[instrument(level = Level::INFO, skip(self, iam_endpoint), err(Display))]
    pub async fn resolve(
        &self,
        name: &str,
        namespace: &str,
        iam_endpoint: &str,
    ) -> Result<ResolvedSecret, ErrorKind> {
        let secret = self.store.get(name, namespace).await.map_err(|error| {
            if error.transient {
                ErrorKind::external(format!("cannot retrieve secret {name}"), error)
            } else {
                ErrorKind::credential(format!("cannot retrieve secret {name}: {error}"))
            }
        })?;
        parse_secret(&secret, iam_endpoint)
    }
}

fn parse_secret(secret: &SecretData, iam_endpoint: &str) -> Result<ResolvedSecret, ErrorKind> {
    let provided = secret.type_.as_deref().unwrap_or_default().trim();
    if provided != DRIVER_NAME {
        return Err(ErrorKind::credential(format!(
            "wrong secret type: provided {provided}, expected {DRIVER_NAME}"
        )));
    }

    let field = |key: &str| secret.data.get(key).filter(|value| !value.is_empty());
    let required = |key: &str| {
        field(key)
            .cloned()
            .ok_or_else(|| ErrorKind::credential(format!("{key} secret missing")))
    };

    let kind = match field(keys::API_KEY) {
        Some(api_key) => CredentialKind::Iam {
            api_key: api_key.clone(),
            service_instance_id: field(keys::SERVICE_INSTANCE_ID)
                .cloned()
                .unwrap_or_default(),
        },
        None => CredentialKind::Hmac {
            access_key: required(keys::ACCESS_KEY)?,
            secret_key: required(keys::SECRET_KEY)?,
        },
    };

    Ok(ResolvedSecret {
        credentials: Credentials {
            kind,
            iam_endpoint: iam_endpoint.into(),
        },
        allowed_namespaces: field(keys::ALLOWED_NAMESPACES)
            .map(|value| value.split_whitespace().map(Into::into).collect())
            .unwrap_or_default(),
        res_conf_api_key: field(keys::RES_CONF_API_KEY).cloned(),
        kp_root_key_crn: field(keys::KP_ROOT_KEY_CRN).cloned(),
        ca_bundle: field(keys::CA_BUNDLE).cloned(),
    })
}
