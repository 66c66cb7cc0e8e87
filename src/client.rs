//! mail.tm async client implementation.
//!
//! This module provides an async [`Client`] and [`ClientBuilder`] for the
//! mail.tm REST API.
//!
//! Typical flow:
//! 1) Build a client (`Client::new` or `Client::builder().build()`)
//! 2) List domains via [`Client::get_domains`]
//! 3) Register an address via [`Client::create_account`]
//! 4) Obtain a bearer token via [`Client::create_token`]
//! 5) Poll the inbox via [`Client::get_messages`]
//! 6) Fetch full message content via [`Client::get_message`]
//! 7) Optionally delete the account via [`Client::delete_account`]
//!
//! The [`MailboxSession`](crate::MailboxSession) controller drives this flow
//! for you; use `Client` directly when you need finer control.

use crate::models::{ApiProblem, Credentials, HydraCollection};
use crate::{Account, Domain, Error, MessageDetail, MessageSummary, Result};
use std::time::Duration;

const API_BASE: &str = "https://api.mail.tm";

/// Async client for the mail.tm REST API.
///
/// A `Client` is cheap to clone at the `reqwest` level (internally shared
/// connection pool), and this type is `Clone`. Create it once and clone as
/// needed.
///
/// The client itself is stateless: bearer tokens are passed per call, so a
/// single client can serve any number of accounts.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Create a [`ClientBuilder`] for configuring a new client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a new mail.tm client using default settings.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    ///
    /// # Examples
    /// ```no_run
    /// # use mailtm_client::Client;
    /// # fn main() -> Result<(), mailtm_client::Error> {
    /// let client = Client::new()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// The API base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the list of domains available for new addresses.
    ///
    /// A response without a `hydra:member` array yields an empty list rather
    /// than an error; callers are expected to fall back to a default domain.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body is not valid JSON.
    pub async fn get_domains(&self) -> Result<Vec<Domain>> {
        let body = self
            .http
            .get(self.endpoint("/domains"))
            .send()
            .await?
            .bytes()
            .await?;
        let collection: HydraCollection<Domain> = serde_json::from_slice(&body)?;
        Ok(collection.member)
    }

    /// Register a new account with the provider.
    ///
    /// # Arguments
    /// * `address` - Full address to register, e.g. `abc123@mail.tm`.
    /// * `password` - Password for the new account.
    ///
    /// # Errors
    /// A status of 400 or above surfaces as [`Error::Api`] carrying the
    /// provider's `hydra:description` text (or a generic fallback).
    pub async fn create_account(&self, address: &str, password: &str) -> Result<Account> {
        let response = self
            .http
            .post(self.endpoint("/accounts"))
            .json(&Credentials { address, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.as_u16() >= 400 {
            let problem: ApiProblem = serde_json::from_slice(&body).unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: problem.into_message("Failed to create account"),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Exchange account credentials for a bearer token.
    ///
    /// # Errors
    /// A status of 400 or above surfaces as [`Error::Api`] carrying the
    /// payload's `message` text (or a generic fallback).
    pub async fn create_token(&self, address: &str, password: &str) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint("/token"))
            .json(&Credentials { address, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.as_u16() >= 400 {
            let problem: ApiProblem = serde_json::from_slice(&body).unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: problem.into_message("Auth error"),
            });
        }

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)?;
        Ok(parsed.token)
    }

    /// Retrieve the current inbox listing for the authenticated account.
    ///
    /// A response without a `hydra:member` array yields an empty list, so an
    /// error payload with a 2xx status reads as an empty inbox rather than a
    /// parse failure.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body is not valid JSON.
    pub async fn get_messages(&self, token: &str) -> Result<Vec<MessageSummary>> {
        let body = self
            .http
            .get(self.endpoint("/messages"))
            .bearer_auth(token)
            .send()
            .await?
            .bytes()
            .await?;
        let collection: HydraCollection<MessageSummary> = serde_json::from_slice(&body)?;
        Ok(collection.member)
    }

    /// Fetch the full content of a single message.
    ///
    /// # Arguments
    /// * `token` - Bearer token for the owning account.
    /// * `id` - Message id from the inbox listing.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body cannot be
    /// deserialized into a [`MessageDetail`].
    pub async fn get_message(&self, token: &str, id: &str) -> Result<MessageDetail> {
        let body = self
            .http
            .get(self.endpoint(&format!("/messages/{id}")))
            .bearer_auth(token)
            .send()
            .await?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Delete an account on the provider side.
    ///
    /// The response is ignored: deletion is best-effort and the provider's
    /// status code carries no actionable information for the caller.
    ///
    /// # Errors
    /// Only transport-level failures surface as errors.
    pub async fn delete_account(&self, token: &str, id: &str) -> Result<()> {
        self.http
            .delete(self.endpoint(&format!("/accounts/{id}")))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Builder for configuring a mail.tm [`Client`].
///
/// # Defaults
/// - The public `https://api.mail.tm` base URL
/// - Reqwest default timeout
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    base_url: String,
    timeout: Option<Duration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: API_BASE.to_owned(),
            timeout: None,
        }
    }

    /// Override the API base URL.
    ///
    /// This is primarily useful for testing against a local mock server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set a request timeout applied to all operations.
    ///
    /// Defaults to reqwest's built-in timeout when not specified.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`Client`].
    ///
    /// # Errors
    /// Returns an error if the underlying `reqwest::Client` cannot be
    /// constructed.
    pub fn build(self) -> Result<Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Client {
            http,
            base_url: self.base_url,
        })
    }
}
