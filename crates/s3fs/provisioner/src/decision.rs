use s3fs_api::{credentials::ResolvedSecret, options::ResolvedOptions};

use crate::{args::ProvisionerArgs, error::ErrorKind};

/// What a single provisioning call is going to do.
///
/// Fixed once the options are merged, except for the two facts learned on
/// the way: the namespace authorization and whether the bucket was created
/// by this call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketLifecycleDecision {
    /// Open an object storage session and check bucket access.
    pub validate_bucket: bool,
    pub create_bucket: bool,
    /// Set only after this call created the bucket.
    pub delete_on_failure: bool,
    pub configure_firewall: bool,
    pub configure_quota: bool,
    pub namespace_authorized: bool,
}

impl BucketLifecycleDecision {
    pub fn new(args: &ProvisionerArgs, options: &ResolvedOptions) -> Self {
        Self {
            // bucket validation can only be skipped for pre-created buckets
            validate_bucket: options.validate_bucket || options.auto_create_bucket,
            create_bucket: options.auto_create_bucket,
            delete_on_failure: false,
            configure_firewall: options
                .configure_firewall
                .unwrap_or(args.bucket_access_policy),
            configure_quota: options.quota_limit.unwrap_or(args.quota_limit),
            namespace_authorized: false,
        }
    }

    pub const fn needs_policy(&self) -> bool {
        self.configure_firewall || self.configure_quota
    }

    pub const fn needs_credentials(&self) -> bool {
        self.validate_bucket || self.needs_policy()
    }

    /// Checks the claim namespace against the secret's allow-list. Without a
    /// secret there is nothing to restrict.
    pub fn authorize(
        &mut self,
        secret: Option<&ResolvedSecret>,
        namespace: &str,
    ) -> Result<(), ErrorKind> {
        self.namespace_authorized =
            secret.map_or(true, |secret| secret.is_namespace_allowed(namespace));
        if self.namespace_authorized {
            Ok(())
        } else {
            Err(ErrorKind::Authorization(format!(
                "PVC creation in {namespace} namespace is not allowed"
            )))
        }
    }
}
