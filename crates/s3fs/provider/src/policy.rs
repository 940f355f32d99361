use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, Level};
use url::Url;

use crate::{
    error::{ProviderError, Result},
    iam::{check_status, IamTokenIssuer},
};

/// A partial bucket configuration; absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall: Option<Firewall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_quota: Option<u64>,
}

impl BucketConfigPatch {
    pub fn firewall(allowed_ip: Vec<String>) -> Self {
        Self {
            firewall: Some(Firewall { allowed_ip }),
            ..Default::default()
        }
    }

    pub fn hard_quota(bytes: u64) -> Self {
        Self {
            hard_quota: Some(bytes),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firewall {
    pub allowed_ip: Vec<String>,
}

#[async_trait]
pub trait PolicyService: Send + Sync {
    async fn update_bucket_config(
        &self,
        bucket: &str,
        patch: &BucketConfigPatch,
        api_key: &str,
    ) -> Result<()>;
}

/// Talks to the resource configuration API after exchanging the API key for
/// an IAM bearer token.
pub struct ResourceConfigurationClient {
    client: Client,
    config_endpoint: Url,
    iam_endpoint: Url,
    tokens: IamTokenIssuer,
}

impl ResourceConfigurationClient {
    pub fn new(config_endpoint: Url, iam_endpoint: Url) -> Self {
        let client = Client::new();
        Self {
            tokens: IamTokenIssuer::new(client.clone()),
            client,
            config_endpoint,
            iam_endpoint,
        }
    }
}

#[async_trait]
impl PolicyService for ResourceConfigurationClient {
    #[instrument(level = Level::INFO, skip(self, api_key), err(Display))]
    async fn update_bucket_config(
        &self,
        bucket: &str,
        patch: &BucketConfigPatch,
        api_key: &str,
    ) -> Result<()> {
        let token = self
            .tokens
            .issue_token(self.iam_endpoint.as_str(), api_key)
            .await?;

        let url = format!(
            "{base}/b/{bucket}",
            base = self.config_endpoint.as_str().trim_end_matches('/'),
        );
        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(patch)
            .send()
            .await
            .map_err(|error| {
                ProviderError::transient(format!(
                    "failed to reach resource configuration API: {error}"
                ))
            })?;

        check_status(response, "failed to update bucket configuration")
            .await
            .map(|response| debug!("updated bucket configuration: {}", response.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_only_carry_their_own_field() {
        assert_eq!(
            ::serde_json::to_value(BucketConfigPatch::firewall(vec!["10.0.0.0/8".into()]))
                .unwrap(),
            ::serde_json::json!({
                "firewall": {
                    "allowed_ip": ["10.0.0.0/8"],
                },
            }),
        );
        assert_eq!(
            ::serde_json::to_value(BucketConfigPatch::hard_quota(1_048_576)).unwrap(),
            ::serde_json::json!({
                "hard_quota": 1_048_576,
            }),
        );
    }
}
