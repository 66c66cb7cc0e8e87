//! End-to-end demo of the mail.tm session controller.
//!
//! Features demonstrated:
//! - Creating a client and a mailbox session
//! - Generating a temporary address
//! - Waiting for incoming messages via the poll timer
//! - Loading full message content
//! - Deleting the mailbox

use mailtm_client::{Client, MailboxSession};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("mail.tm Rust Client - Demo");
    println!("{}", "=".repeat(50));

    let client = Client::new()?;
    let session = MailboxSession::new(client);
    let mut updates = session.subscribe();

    println!("\nCreating temporary mailbox...");
    let address = session.create_address().await?;
    println!("   Created: {address}");

    println!("\nWaiting for messages...");
    println!("   Send an email to: {address}");
    println!("   (Polling for up to 2 minutes)");

    let start = Instant::now();
    let timeout = Duration::from_secs(120);

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            println!("\nTimeout: no messages received");
            break;
        }

        if tokio::time::timeout(remaining, updates.changed()).await.is_err() {
            println!("\nTimeout: no messages received");
            break;
        }

        let snapshot = updates.borrow_and_update().clone();
        if let Some(error) = &snapshot.last_error {
            eprintln!("   Error: {error}");
        }
        if snapshot.messages.is_empty() {
            continue;
        }

        println!("\nReceived {} message(s)!", snapshot.messages.len());
        for msg in &snapshot.messages {
            println!("\n{}", "-".repeat(50));
            println!("Message ID:  {}", msg.id);
            println!("From:        {}", msg.from_address().unwrap_or("<unknown>"));
            println!("Subject:     {}", msg.subject);

            session.load_message(&msg.id).await;
            if let Some(detail) = session.snapshot().selected {
                let body = detail.body().unwrap_or("<empty>");
                println!("Body preview (first 500 chars):");
                let preview: String = body.chars().take(500).collect();
                for line in preview.lines().take(10) {
                    println!("   {line}");
                }
            }
        }
        break;
    }

    println!("\nCleaning up mailbox...");
    session.delete_address().await;
    println!("   Done");

    Ok(())
}
