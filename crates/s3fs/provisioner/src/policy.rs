use std::sync::Arc;

use byte_unit::Byte;
use s3fs_api::{credentials::ResolvedSecret, options::ResolvedOptions};
use s3fs_provider::{error::codes, BucketConfigPatch, ObjectStorageSession, PolicyService};
use tracing::{info, instrument, warn, Level};

use crate::{decision::BucketLifecycleDecision, error::ErrorKind, topology::ClusterTopologyClient};

/// Policy work resolved before the bucket is touched.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PolicyPlan {
    /// Source addresses admitted by the bucket firewall.
    pub firewall: Option<Vec<String>>,
    /// Hard quota in bytes.
    pub quota: Option<u64>,
    api_key: String,
}

impl ::std::fmt::Debug for PolicyPlan {
    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        f.debug_struct("PolicyPlan")
            .field("firewall", &self.firewall)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl PolicyPlan {
    pub const fn is_empty(&self) -> bool {
        self.firewall.is_none() && self.quota.is_none()
    }
}

#[derive(Clone)]
pub struct AccessPolicyCoordinator {
    policy: Arc<dyn PolicyService>,
    topology: ClusterTopologyClient,
}

impl AccessPolicyCoordinator {
    pub fn new(policy: Arc<dyn PolicyService>, topology: ClusterTopologyClient) -> Self {
        Self { policy, topology }
    }

    /// Checks the preconditions of every requested policy and resolves the
    /// firewall addresses and the quota.
    #[instrument(level = Level::INFO, skip_all, err(Display))]
    pub async fn prepare(
        &self,
        decision: &BucketLifecycleDecision,
        options: &ResolvedOptions,
        secret: Option<&ResolvedSecret>,
        capacity: Option<&str>,
    ) -> Result<PolicyPlan, ErrorKind> {
        if !decision.needs_policy() {
            return Ok(PolicyPlan::default());
        }

        let api_key = secret
            .and_then(|secret| secret.res_conf_api_key.as_deref())
            .unwrap_or_default();

        let firewall = if decision.configure_firewall {
            if api_key.is_empty() {
                return Err(ErrorKind::configuration(
                    "cannot configure firewall for bucket. res-conf-apikey is empty",
                ));
            }
            Some(self.topology.firewall_allowed_ips(&options.allowed_ips).await?)
        } else {
            None
        };

        let quota = if decision.configure_quota {
            if api_key.is_empty() {
                return Err(ErrorKind::configuration(
                    "cannot configure quota for bucket. res-conf-apikey is empty",
                ));
            }
            Some(parse_quota(capacity)?)
        } else {
            None
        };

        Ok(PolicyPlan {
            firewall,
            quota,
            api_key: api_key.into(),
        })
    }

    /// Pushes every planned patch, then deletes the bucket if a patch failed
    /// and this call created it.
    #[instrument(level = Level::INFO, skip(self, plan, session), err(Display))]
    pub async fn apply(
        &self,
        plan: &PolicyPlan,
        bucket: &str,
        created_fresh: bool,
        session: Option<&dyn ObjectStorageSession>,
    ) -> Result<(), ErrorKind> {
        let firewall = async {
            match &plan.firewall {
                Some(allowed_ip) => {
                    let patch = BucketConfigPatch::firewall(allowed_ip.clone());
                    self.policy
                        .update_bucket_config(bucket, &patch, &plan.api_key)
                        .await
                        .map_err(|error| {
                            ErrorKind::external(
                                format!("cannot configure firewall for bucket {bucket}"),
                                error,
                            )
                        })
                }
                None => Ok(()),
            }
        };
        let quota = async {
            match plan.quota {
                Some(bytes) => {
                    let patch = BucketConfigPatch::hard_quota(bytes);
                    self.policy
                        .update_bucket_config(bucket, &patch, &plan.api_key)
                        .await
                        .map_err(|error| {
                            ErrorKind::external(
                                format!("cannot configure quota for bucket {bucket}"),
                                error,
                            )
                        })
                }
                None => Ok(()),
            }
        };

        let (firewall, quota) = ::tokio::join!(firewall, quota);
        if firewall.is_ok() && plan.firewall.is_some() {
            info!("configured firewall for bucket {bucket}");
        }
        if quota.is_ok() && plan.quota.is_some() {
            info!("configured quota for bucket {bucket}");
        }

        let cause = match (firewall, quota) {
            (Ok(()), Ok(())) => return Ok(()),
            (Err(cause), Ok(())) | (Ok(()), Err(cause)) => cause,
            (Err(firewall), Err(quota)) => firewall.combine(quota),
        };
        match session {
            Some(session) if created_fresh => Err(compensate(session, bucket, cause).await),
            _ => Err(cause),
        }
    }
}

/// Deletes a bucket this call created, folding a failed rollback into the
/// returned error.
pub async fn compensate(
    session: &dyn ObjectStorageSession,
    bucket: &str,
    cause: ErrorKind,
) -> ErrorKind {
    warn!("deleting bucket {bucket}: {cause}");
    match session.delete_bucket(bucket).await {
        Ok(()) => cause,
        Err(rollback) if rollback.has_code(codes::NO_SUCH_BUCKET) => cause,
        Err(rollback) => ErrorKind::Compensation {
            bucket: bucket.into(),
            cause: Box::new(cause),
            rollback,
        },
    }
}

/// Reads a Kubernetes quantity as a whole number of bytes.
fn parse_quota(capacity: Option<&str>) -> Result<u64, ErrorKind> {
    let capacity = capacity
        .map(str::trim)
        .filter(|capacity| !capacity.is_empty())
        .ok_or_else(|| {
            ErrorKind::configuration("cannot configure quota for bucket. storage capacity is empty")
        })?;
    let invalid = |reason: &dyn ::std::fmt::Display| {
        ErrorKind::configuration(format!("cannot parse storage capacity {capacity:?}: {reason}"))
    };

    // sub-byte suffixes: milli, micro, nano
    if capacity.ends_with(['m', 'u', 'n']) {
        return Err(invalid(&"not a whole number of bytes"));
    }

    if let Some((mantissa, exponent)) = split_decimal_exponent(capacity) {
        let mantissa: f64 = mantissa.parse().map_err(|error| invalid(&error))?;
        let exponent: i32 = exponent.parse().map_err(|error| invalid(&error))?;
        let bytes = mantissa * 10f64.powi(exponent);
        return if bytes.is_finite() && bytes >= 0.0 && bytes < u64::MAX as f64 && bytes.fract() == 0.0 {
            Ok(bytes as u64)
        } else {
            Err(invalid(&"not a whole number of bytes"))
        };
    }

    capacity
        .parse::<Byte>()
        .map(|bytes| bytes.as_u64())
        .map_err(|error| invalid(&error))
}

/// Splits `<mantissa>e<exponent>`; a trailing `E` alone is the exa suffix.
fn split_decimal_exponent(quantity: &str) -> Option<(&str, &str)> {
    let index = quantity.find(['e', 'E'])?;
    let (mantissa, exponent) = (&quantity[..index], &quantity[index + 1..]);
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    if !mantissa.is_empty() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some((mantissa, exponent.trim_start_matches('+')))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("1Gi", 1 << 30 ; "binary suffix")]
    #[test_case("500M", 500_000_000 ; "decimal suffix")]
    #[test_case("1e9", 1_000_000_000 ; "decimal exponent")]
    #[test_case("2E+3", 2_000 ; "signed exponent")]
    #[test_case("1048576", 1 << 20 ; "plain bytes")]
    fn quota_accepts_kubernetes_quantities(capacity: &str, expected: u64) {
        assert_eq!(parse_quota(Some(capacity)).unwrap(), expected);
    }

    #[test_case(Some("500m") ; "milli")]
    #[test_case(Some("3u") ; "micro")]
    #[test_case(Some("1e-3") ; "negative exponent")]
    #[test_case(Some("lots") ; "garbage")]
    #[test_case(Some("") ; "empty")]
    #[test_case(None ; "missing")]
    fn quota_rejects_partial_bytes(capacity: Option<&str>) {
        assert!(parse_quota(capacity).is_err());
    }

    #[test]
    fn plan_debug_hides_api_key() {
        let plan = PolicyPlan {
            quota: Some(1),
            api_key: "rc-secret".into(),
            ..Default::default()
        };
        assert!(!format!("{plan:?}").contains("rc-secret"));
        assert!(!plan.is_empty());
    }
}
