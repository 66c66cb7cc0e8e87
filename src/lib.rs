//! mail.tm Rust Client
//!
//! An async Rust client for the mail.tm disposable email service, plus a
//! [`MailboxSession`] controller that owns the full mailbox lifecycle:
//! address generation, authentication, inbox polling, and teardown.
//!
//! # Example
//! ```no_run
//! use mailtm_client::{Client, MailboxSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mailtm_client::Error> {
//!     let client = Client::new()?;
//!     let session = MailboxSession::new(client);
//!
//!     let address = session.create_address().await?;
//!     println!("Mailbox ready: {address}");
//!
//!     session.refresh_messages().await;
//!     for msg in session.snapshot().messages {
//!         println!("From: {:?}, Subject: {}", msg.from_address(), msg.subject);
//!     }
//!
//!     session.delete_address().await;
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod models;
mod session;

pub use client::{Client, ClientBuilder};
pub use error::Error;
pub use models::{Account, Domain, MessageDetail, MessageSummary, Sender};
pub use session::{AccountView, MailboxSession, SessionSnapshot};

/// Result type alias for mail.tm operations.
///
/// This is equivalent to `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
