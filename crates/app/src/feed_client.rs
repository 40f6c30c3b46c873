//! HTTP session against the smart-banking feed API.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::Credentials;

/// Client id and secret of the bank's own web app, sent as basic auth with
/// the password grant.
const WEB_CLIENT_AUTHORIZATION: &str = "Basic bXktdHJ1c3RlZC13ZHBDbGllbnQ6c2VjcmV0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FeedClientError {
    #[error("Authentication failed with status {status}: {body}")]
    Auth { status: u16, body: String },
    #[error("Fetching transactions failed with status {status}: {body}")]
    Fetch { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct FeedClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: &str) -> Result<Self, FeedClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tallyfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    pub fn transactions_url(&self, limit: u32) -> String {
        format!("{}/api/smrt/transactions?limit={limit}", self.base_url)
    }

    /// Exchanges the login for a bearer token. The credentials are consumed.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<String, FeedClientError> {
        let Credentials { email, password } = credentials;
        let response = self
            .http
            .post(self.token_url())
            .header(reqwest::header::AUTHORIZATION, WEB_CLIENT_AUTHORIZATION)
            .form(&[
                ("username", email.as_str()),
                ("password", password.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedClientError::Auth { status: status.as_u16(), body });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!("feed session authenticated");
        Ok(token.access_token)
    }

    /// Raw JSON body of the most recent `limit` transactions.
    pub async fn fetch_transactions(&self, token: &str, limit: u32) -> Result<String, FeedClientError> {
        let response = self
            .http
            .get(self.transactions_url(limit))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FeedClientError::Fetch { status: status.as_u16(), body });
        }
        Ok(body)
    }
}
