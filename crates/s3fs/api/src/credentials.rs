use std::fmt;

/// Keys looked up in a credential secret.
pub mod keys {
    pub const ACCESS_KEY: &str = "access-key";
    pub const ALLOWED_NAMESPACES: &str = "allowed_ns";
    pub const API_KEY: &str = "api-key";
    pub const CA_BUNDLE: &str = "ca-bundle-crt";
    pub const KP_ROOT_KEY_CRN: &str = "kp-root-key-crn";
    pub const RES_CONF_API_KEY: &str = "res-conf-apikey";
    pub const SECRET_KEY: &str = "secret-key";
    pub const SERVICE_INSTANCE_ID: &str = "service-instance-id";
}

#[derive(Clone, PartialEq, Eq)]
pub enum CredentialKind {
    Hmac {
        access_key: String,
        secret_key: String,
    },
    Iam {
        api_key: String,
        /// May be empty; bucket creation refuses it.
        service_instance_id: String,
    },
}

impl fmt::Debug for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmac { .. } => f
                .debug_struct("Hmac")
                .field("access_key", &"<redacted>")
                .field("secret_key", &"<redacted>")
                .finish(),
            Self::Iam {
                service_instance_id,
                ..
            } => f
                .debug_struct("Iam")
                .field("api_key", &"<redacted>")
                .field("service_instance_id", service_instance_id)
                .finish(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub kind: CredentialKind,
    pub iam_endpoint: String,
}

impl Credentials {
    pub fn api_key(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Hmac { .. } => None,
            CredentialKind::Iam { api_key, .. } => Some(api_key),
        }
    }

    pub fn service_instance_id(&self) -> Option<&str> {
        match &self.kind {
            CredentialKind::Hmac { .. } => None,
            CredentialKind::Iam {
                service_instance_id,
                ..
            } => Some(service_instance_id),
        }
    }
}

/// Everything a credential secret contributes to a claim.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub credentials: Credentials,
    pub allowed_namespaces: Vec<String>,
    pub res_conf_api_key: Option<String>,
    pub kp_root_key_crn: Option<String>,
    pub ca_bundle: Option<String>,
}

impl fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("credentials", &self.credentials)
            .field("allowed_namespaces", &self.allowed_namespaces)
            .field(
                "res_conf_api_key",
                &self.res_conf_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("kp_root_key_crn", &self.kp_root_key_crn)
            .field("ca_bundle", &self.ca_bundle.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResolvedSecret {
    /// The CA bundle to trust, named after the object storage service it
    /// belongs to.
    pub fn ca_bundle_for(&self, service: Option<&str>) -> Option<CaBundle> {
        self.ca_bundle.as_ref().map(|pem| CaBundle {
            service: service
                .filter(|service| !service.is_empty())
                .unwrap_or(CaBundle::DEFAULT_SERVICE)
                .into(),
            pem: pem.clone(),
        })
    }

    /// An empty allow-list admits every namespace.
    pub fn is_namespace_allowed(&self, namespace: &str) -> bool {
        self.allowed_namespaces.is_empty()
            || self
                .allowed_namespaces
                .iter()
                .any(|allowed| allowed == namespace)
    }
}

/// PEM encoded certificates trusted when talking to an object storage
/// service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaBundle {
    pub service: String,
    pub pem: String,
}

impl CaBundle {
    pub const DEFAULT_SERVICE: &'static str = "standard-cos";
}
