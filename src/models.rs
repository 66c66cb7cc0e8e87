//! Wire models for the mail.tm REST API.

use serde::{Deserialize, Deserializer, Serialize};

/// An email domain offered by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Domain {
    /// Domain name, e.g. `mail.tm`.
    pub domain: String,
}

/// A mailbox account as returned by `POST /accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// Provider-assigned account id.
    pub id: String,
    /// Full address echoed back by the provider. Absent on some responses;
    /// callers fall back to the address they submitted.
    #[serde(default)]
    pub address: Option<String>,
}

/// Sender information attached to a message.
#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    /// Sender email address.
    pub address: String,
    /// Sender display name.
    #[serde(default)]
    pub name: String,
}

/// A lightweight inbox listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSummary {
    /// Unique message id.
    pub id: String,
    /// Sender, when the provider includes one.
    #[serde(default)]
    pub from: Option<Sender>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
}

impl MessageSummary {
    /// Sender address, if present.
    pub fn from_address(&self) -> Option<&str> {
        self.from.as_ref().map(|s| s.address.as_str())
    }
}

/// Full message content as returned by `GET /messages/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDetail {
    /// Unique message id.
    #[serde(default)]
    pub id: String,
    /// Sender, when the provider includes one.
    #[serde(default)]
    pub from: Option<Sender>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// HTML body. The provider returns either a string or an array of
    /// HTML fragments; fragments are concatenated.
    #[serde(default, deserialize_with = "string_or_fragments")]
    pub html: Option<String>,
    /// Plain-text body.
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageDetail {
    /// Sender address, if present.
    pub fn from_address(&self) -> Option<&str> {
        self.from.as_ref().map(|s| s.address.as_str())
    }

    /// The renderable body: HTML when available, otherwise plain text.
    pub fn body(&self) -> Option<&str> {
        self.html.as_deref().or(self.text.as_deref())
    }
}

fn string_or_fragments<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::One(s) => s,
        Raw::Many(parts) => parts.concat(),
    }))
}

/// Credentials payload for `POST /accounts` and `POST /token`.
#[derive(Debug, Serialize)]
pub(crate) struct Credentials<'a> {
    pub address: &'a str,
    pub password: &'a str,
}

/// Hydra collection wrapper used by the provider's list endpoints.
///
/// A response without a `hydra:member` array deserializes as an empty list.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct HydraCollection<T> {
    #[serde(rename = "hydra:member", default)]
    pub member: Vec<T>,
}

/// Error payload shapes used by the provider.
///
/// `POST /accounts` errors carry `hydra:description`; `POST /token` errors
/// carry `message`. Non-JSON bodies fall back to the caller's default text.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiProblem {
    #[serde(rename = "hydra:description")]
    pub description: Option<String>,
    #[serde(rename = "hydra:title")]
    pub title: Option<String>,
    pub message: Option<String>,
}

impl ApiProblem {
    pub fn into_message(self, fallback: &str) -> String {
        self.description
            .or(self.message)
            .or(self.title)
            .unwrap_or_else(|| fallback.to_owned())
    }
}
