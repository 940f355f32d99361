use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{instrument, Level};

use crate::error::{ProviderError, Result};

const GRANT_TYPE_API_KEY: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Exchanges IAM API keys for short-lived bearer tokens.
#[derive(Clone, Debug, Default)]
pub struct IamTokenIssuer {
    client: Client,
}

impl IamTokenIssuer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(level = Level::INFO, skip(self, api_key), err(Display))]
    pub async fn issue_token(&self, iam_endpoint: &str, api_key: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Token {
            access_token: String,
        }

        let response = self
            .client
            .post(token_url(iam_endpoint))
            .header("Accept", "application/json")
            .form(&[("grant_type", GRANT_TYPE_API_KEY), ("apikey", api_key)])
            .send()
            .await
            .map_err(|error| ProviderError::transient(format!("failed to reach IAM: {error}")))?;

        let token: Token = check_status(response, "failed to issue IAM token")
            .await?
            .json()
            .await
            .map_err(|error| ProviderError::new(format!("failed to parse IAM token: {error}")))?;
        Ok(token.access_token)
    }
}

fn token_url(iam_endpoint: &str) -> String {
    format!(
        "{base}/identity/token",
        base = iam_endpoint.trim_end_matches('/'),
    )
}

/// Turns a non-success response into an error; 5xx and 429 are transient.
pub(crate) async fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = ProviderError::new(format!("{context} ({status}): {body}"))
        .with_code(status.as_str());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ProviderError {
            transient: true,
            ..error
        })
    } else {
        Err(error)
    }
}
