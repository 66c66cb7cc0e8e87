//! Mailbox session controller.
//!
//! A [`MailboxSession`] owns the lifecycle of a single disposable mailbox:
//! it generates an address, registers and authenticates the account, polls
//! the inbox on a fixed interval, loads message details on demand, and tears
//! everything down on deletion.
//!
//! State is held in one place and exposed through read-only
//! [`SessionSnapshot`]s plus a `tokio::sync::watch` channel, so a UI layer
//! can either pull the current state or subscribe to changes.
//!
//! At most one account and one poll timer exist at a time. The timer is an
//! owned resource: replacing or dropping it aborts the underlying task, and
//! the task itself only holds a weak reference to the session, so abandoning
//! every session handle stops polling as well.

use crate::models::{MessageDetail, MessageSummary};
use crate::{Client, Result};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);
const DEFAULT_DOMAIN: &str = "mail.tm";
const LOCAL_PART_LEN: usize = 10;
const PASSWORD_LEN: usize = 12;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Read-only view of the current account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountView {
    /// Provider-assigned account id.
    pub id: String,
    /// Full mailbox address.
    pub address: String,
}

/// Read-only snapshot of the session state.
///
/// Produced by [`MailboxSession::snapshot`] and published on the
/// [`MailboxSession::subscribe`] channel after every state change. The
/// account password is never included.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// The active account, if any.
    pub account: Option<AccountView>,
    /// Whether a bearer token is held. `false` with an account present means
    /// authentication failed and message operations are no-ops until a new
    /// address is created.
    pub authenticated: bool,
    /// Current inbox listing, replaced wholesale on each refresh.
    pub messages: Vec<MessageSummary>,
    /// The currently selected message detail, if any.
    pub selected: Option<MessageDetail>,
    /// The most recent user-visible error, if any.
    pub last_error: Option<String>,
}

struct ActiveAccount {
    id: String,
    address: String,
    password: String,
}

#[derive(Default)]
struct SessionState {
    account: Option<ActiveAccount>,
    token: Option<String>,
    messages: Vec<MessageSummary>,
    selected: Option<MessageDetail>,
    last_error: Option<String>,
}

/// Owned handle to the poll task. Dropping it aborts the task, so storing it
/// in an `Option` guarantees at most one live timer and cancellation on
/// replacement and teardown.
struct PollGuard {
    handle: JoinHandle<()>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Inner {
    client: Client,
    poll_interval: Duration,
    state: Mutex<SessionState>,
    poll: Mutex<Option<PollGuard>>,
    // Bumped whenever the account changes. In-flight responses stamped with
    // an older generation are discarded instead of clobbering newer state.
    generation: AtomicU64,
    updates: watch::Sender<SessionSnapshot>,
}

/// Controller for one disposable mailbox session.
///
/// Cloning is cheap and all clones share the same session. See the
/// [module docs](self) for the lifecycle.
///
/// # Examples
/// ```no_run
/// # use mailtm_client::{Client, MailboxSession};
/// # #[tokio::main]
/// # async fn main() -> Result<(), mailtm_client::Error> {
/// let session = MailboxSession::new(Client::new()?);
/// let address = session.create_address().await?;
/// println!("{address}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MailboxSession {
    inner: Arc<Inner>,
}

impl MailboxSession {
    /// Create a session with the default 4-second poll interval.
    pub fn new(client: Client) -> Self {
        Self::with_poll_interval(client, DEFAULT_POLL_INTERVAL)
    }

    /// Create a session with a custom poll interval.
    pub fn with_poll_interval(client: Client, poll_interval: Duration) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                client,
                poll_interval,
                state: Mutex::new(SessionState::default()),
                poll: Mutex::new(None),
                generation: AtomicU64::new(0),
                updates,
            }),
        }
    }

    /// The current session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        Inner::snapshot_of(&self.inner.lock_state())
    }

    /// Subscribe to state changes.
    ///
    /// The receiver yields a fresh [`SessionSnapshot`] after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Whether the inbox poll timer is currently running.
    pub fn is_polling(&self) -> bool {
        self.inner.lock_poll().is_some()
    }

    /// Generate and register a fresh mailbox address, then start polling.
    ///
    /// Picks the provider's first available domain (falling back to
    /// `mail.tm`), composes `{random}@{domain}` with a random password,
    /// registers the account, authenticates, and (re)starts the poll timer.
    /// Any previous account, token, and timer are replaced.
    ///
    /// Authentication failure is not fatal: the account is kept in a
    /// degraded state where message operations no-op, and the failure is
    /// recorded in [`SessionSnapshot::last_error`].
    ///
    /// # Errors
    /// Domain or account-creation failures are returned and also recorded in
    /// `last_error`; in that case no token request is made and the previous
    /// poll timer, if any, keeps running.
    pub async fn create_address(&self) -> Result<String> {
        self.inner.set_error(None);
        match self.inner.create_address().await {
            Ok(address) => {
                Inner::restart_polling(&self.inner);
                Ok(address)
            }
            Err(err) => {
                self.inner.set_error(Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Re-fetch the inbox listing, replacing the current list wholesale.
    ///
    /// No-op when no token is held. Failures are logged and leave the
    /// previous (possibly stale) list in place.
    pub async fn refresh_messages(&self) {
        self.inner.refresh_messages().await;
    }

    /// Load the full content of one message and select it.
    ///
    /// No-op when no token is held. Failures are logged and leave the
    /// previous selection in place.
    pub async fn load_message(&self, id: &str) {
        self.inner.load_message(id).await;
    }

    /// Tear the session down.
    ///
    /// Requests remote deletion when both an account and a token are held
    /// (failures are logged and otherwise ignored), then unconditionally
    /// clears the account, token, message list, and selection, and cancels
    /// the poll timer. Responses still in flight for the old account are
    /// discarded.
    pub async fn delete_address(&self) {
        self.inner.delete_address().await;
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poll(&self) -> MutexGuard<'_, Option<PollGuard>> {
        self.poll.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(state: &SessionState) -> SessionSnapshot {
        SessionSnapshot {
            account: state.account.as_ref().map(|a| AccountView {
                id: a.id.clone(),
                address: a.address.clone(),
            }),
            authenticated: state.token.is_some(),
            messages: state.messages.clone(),
            selected: state.selected.clone(),
            last_error: state.last_error.clone(),
        }
    }

    fn publish(&self, state: &SessionState) {
        self.updates.send_replace(Self::snapshot_of(state));
    }

    fn set_error(&self, error: Option<String>) {
        let mut state = self.lock_state();
        state.last_error = error;
        self.publish(&state);
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn create_address(&self) -> Result<String> {
        let domains = self.client.get_domains().await?;
        let domain = domains
            .first()
            .map(|d| d.domain.clone())
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_owned());

        let composed = format!("{}@{}", random_string(LOCAL_PART_LEN), domain);
        let password = random_string(PASSWORD_LEN);

        let created = self.client.create_account(&composed, &password).await?;

        let (address, password, generation) = {
            let mut state = self.lock_state();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let account = ActiveAccount {
                id: created.id,
                address: created.address.unwrap_or(composed),
                password,
            };
            let credentials = (account.address.clone(), account.password.clone());
            state.account = Some(account);
            state.token = None;
            self.publish(&state);
            (credentials.0, credentials.1, generation)
        };

        self.authenticate(&address, &password, generation).await;
        Ok(address)
    }

    async fn authenticate(&self, address: &str, password: &str, generation: u64) {
        match self.client.create_token(address, password).await {
            Ok(token) => {
                let mut state = self.lock_state();
                if generation == self.current_generation() {
                    state.token = Some(token);
                    self.publish(&state);
                }
            }
            Err(err) => {
                warn!(%address, error = %err, "authentication failed");
                self.set_error(Some(err.to_string()));
            }
        }
    }

    async fn refresh_messages(&self) {
        let (token, generation) = {
            let state = self.lock_state();
            (state.token.clone(), self.current_generation())
        };
        let Some(token) = token else { return };

        match self.client.get_messages(&token).await {
            Ok(messages) => {
                let mut state = self.lock_state();
                if generation == self.current_generation() {
                    state.messages = messages;
                    self.publish(&state);
                }
            }
            Err(err) => warn!(error = %err, "inbox refresh failed"),
        }
    }

    async fn load_message(&self, id: &str) {
        let (token, generation) = {
            let state = self.lock_state();
            (state.token.clone(), self.current_generation())
        };
        let Some(token) = token else { return };

        match self.client.get_message(&token, id).await {
            Ok(detail) => {
                let mut state = self.lock_state();
                if generation == self.current_generation() {
                    state.selected = Some(detail);
                    self.publish(&state);
                }
            }
            Err(err) => warn!(%id, error = %err, "message load failed"),
        }
    }

    async fn delete_address(&self) {
        let (account_id, token) = {
            let state = self.lock_state();
            (
                state.account.as_ref().map(|a| a.id.clone()),
                state.token.clone(),
            )
        };

        if let (Some(id), Some(token)) = (account_id, token) {
            match self.client.delete_account(&token, &id).await {
                Ok(()) => debug!(%id, "remote account deleted"),
                Err(err) => warn!(%id, error = %err, "remote account deletion failed"),
            }
        }

        // Local teardown happens regardless of the remote outcome.
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.lock_poll() = None;

        let mut state = self.lock_state();
        state.account = None;
        state.token = None;
        state.messages.clear();
        state.selected = None;
        self.publish(&state);
    }

    fn restart_polling(inner: &Arc<Self>) {
        let weak = Arc::downgrade(inner);
        let poll_interval = inner.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the poll cadence starts
            // one full interval after session start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.refresh_messages().await;
            }
        });

        // Replacing the old guard aborts the previous poll task.
        *inner.lock_poll() = Some(PollGuard { handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{DELETE, GET, POST};
    use httpmock::{Mock, MockServer};
    use regex::Regex;
    use serde_json::json;

    fn test_client(server: &MockServer) -> Client {
        Client::builder()
            .base_url(server.base_url())
            .build()
            .expect("test client build failed")
    }

    fn mock_domains(server: &MockServer) -> Mock<'_> {
        server.mock(|when, then| {
            when.method(GET).path("/domains");
            then.status(200).json_body(json!({
                "hydra:member": [{ "id": "d1", "domain": "example.test" }]
            }));
        })
    }

    fn mock_account(server: &MockServer) -> Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/accounts");
            then.status(201).json_body(json!({ "id": "acc-1" }));
        })
    }

    fn mock_token(server: &MockServer) -> Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body(json!({ "token": "tok-1" }));
        })
    }

    #[test]
    fn generated_parts_are_lowercase_alphanumeric() {
        let local = random_string(LOCAL_PART_LEN);
        let password = random_string(PASSWORD_LEN);

        assert_eq!(local.len(), 10);
        assert_eq!(password.len(), 12);
        assert!(local
            .chars()
            .chain(password.chars())
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn create_address_composes_address_from_first_domain() {
        let server = MockServer::start();
        let domains_mock = mock_domains(&server);
        let account_mock = mock_account(&server);
        let token_mock = mock_token(&server);

        let session = MailboxSession::new(test_client(&server));
        let address = session.create_address().await.unwrap();

        let pattern = Regex::new(r"^[a-z0-9]{10}@example\.test$").unwrap();
        assert!(pattern.is_match(&address), "unexpected address: {address}");

        let snapshot = session.snapshot();
        let account = snapshot.account.expect("account should be set");
        assert_eq!(account.id, "acc-1");
        assert_eq!(account.address, address);
        assert!(snapshot.authenticated);
        assert!(snapshot.last_error.is_none());
        assert!(session.is_polling());

        domains_mock.assert();
        account_mock.assert();
        token_mock.assert();
    }

    #[tokio::test]
    async fn create_address_falls_back_to_default_domain() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/domains");
            then.status(200).json_body(json!({ "hydra:member": [] }));
        });
        mock_account(&server);
        mock_token(&server);

        let session = MailboxSession::new(test_client(&server));
        let address = session.create_address().await.unwrap();

        assert!(address.ends_with("@mail.tm"), "unexpected address: {address}");
    }

    #[tokio::test]
    async fn create_address_surfaces_provider_error_and_skips_token() {
        let server = MockServer::start();
        mock_domains(&server);
        server.mock(|when, then| {
            when.method(POST).path("/accounts");
            then.status(422).json_body(json!({
                "hydra:description": "address: This value is already used."
            }));
        });
        let token_mock = mock_token(&server);

        let session = MailboxSession::new(test_client(&server));
        let err = session.create_address().await.unwrap_err();

        assert_eq!(err.to_string(), "address: This value is already used.");

        let snapshot = session.snapshot();
        assert!(snapshot.account.is_none());
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("address: This value is already used.")
        );
        assert!(!session.is_polling());
        assert_eq!(token_mock.hits(), 0, "no token request after failed creation");
    }

    #[tokio::test]
    async fn auth_failure_leaves_degraded_account_without_token() {
        let server = MockServer::start();
        mock_domains(&server);
        mock_account(&server);
        server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(401).json_body(json!({ "message": "Invalid credentials." }));
        });
        let messages_mock = server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200).json_body(json!({ "hydra:member": [] }));
        });

        let session = MailboxSession::new(test_client(&server));
        let address = session.create_address().await.unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.account.unwrap().address, address);
        assert!(!snapshot.authenticated);
        assert_eq!(snapshot.last_error.as_deref(), Some("Invalid credentials."));
        // The timer still starts, matching the creation flow, but without a
        // token each tick is a no-op.
        assert!(session.is_polling());

        session.refresh_messages().await;
        assert_eq!(messages_mock.hits(), 0);
    }

    #[tokio::test]
    async fn refresh_without_token_sends_no_request() {
        let server = MockServer::start();
        let messages_mock = server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200).json_body(json!({
                "hydra:member": [{ "id": "m1", "subject": "hi" }]
            }));
        });

        let session = MailboxSession::new(test_client(&server));
        session.refresh_messages().await;

        assert_eq!(messages_mock.hits(), 0);
        assert!(session.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn refresh_replaces_message_list_wholesale() {
        let server = MockServer::start();
        mock_domains(&server);
        mock_account(&server);
        mock_token(&server);

        let mut two_messages = server.mock(|when, then| {
            when.method(GET)
                .path("/messages")
                .header("authorization", "Bearer tok-1");
            then.status(200).json_body(json!({
                "hydra:member": [
                    { "id": "m1", "from": { "address": "alice@example.test" }, "subject": "one" },
                    { "id": "m2", "from": { "address": "bob@example.test" }, "subject": "two" }
                ]
            }));
        });

        let session = MailboxSession::new(test_client(&server));
        session.create_address().await.unwrap();

        session.refresh_messages().await;
        let messages = session.snapshot().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[1].id, "m2");

        two_messages.delete();
        server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200).json_body(json!({
                "hydra:member": [{ "id": "m3", "subject": "three" }]
            }));
        });

        session.refresh_messages().await;
        let messages = session.snapshot().messages;
        assert_eq!(messages.len(), 1, "prior list is fully replaced");
        assert_eq!(messages[0].id, "m3");
    }

    #[tokio::test]
    async fn load_message_failure_keeps_previous_selection() {
        let server = MockServer::start();
        mock_domains(&server);
        mock_account(&server);
        mock_token(&server);
        server.mock(|when, then| {
            when.method(GET).path("/messages/m1");
            then.status(200).json_body(json!({
                "id": "m1",
                "from": { "address": "alice@example.test" },
                "subject": "hello",
                "html": "<p>Hello</p>"
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/messages/m2");
            then.status(200).body("not json");
        });

        let session = MailboxSession::new(test_client(&server));
        session.create_address().await.unwrap();

        session.load_message("m1").await;
        let selected = session.snapshot().selected.expect("selection after load");
        assert_eq!(selected.id, "m1");
        assert_eq!(selected.body(), Some("<p>Hello</p>"));

        session.load_message("m2").await;
        let selected = session.snapshot().selected.expect("selection survives failure");
        assert_eq!(selected.id, "m1");
    }

    #[tokio::test]
    async fn delete_clears_state_even_when_remote_delete_fails() {
        let server = MockServer::start();
        mock_domains(&server);
        mock_account(&server);
        mock_token(&server);
        server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200).json_body(json!({
                "hydra:member": [{ "id": "m1", "subject": "one" }]
            }));
        });
        let delete_mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/accounts/acc-1")
                .header("authorization", "Bearer tok-1");
            then.status(500).body("boom");
        });

        let session = MailboxSession::new(test_client(&server));
        session.create_address().await.unwrap();
        session.refresh_messages().await;
        session.load_message("m1").await;

        session.delete_address().await;

        let snapshot = session.snapshot();
        assert!(snapshot.account.is_none());
        assert!(!snapshot.authenticated);
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.selected.is_none());
        assert!(!session.is_polling());
        delete_mock.assert();
    }

    #[tokio::test]
    async fn delete_without_account_skips_remote_call() {
        let server = MockServer::start();
        let delete_mock = server.mock(|when, then| {
            when.method(DELETE).path_contains("/accounts/");
            then.status(204);
        });

        let session = MailboxSession::new(test_client(&server));
        session.delete_address().await;

        assert_eq!(delete_mock.hits(), 0);
        assert!(session.snapshot().account.is_none());
    }

    #[tokio::test]
    async fn repeated_create_replaces_account_and_keeps_single_timer() {
        let server = MockServer::start();
        mock_domains(&server);
        let account_mock = mock_account(&server);
        mock_token(&server);

        let session = MailboxSession::new(test_client(&server));
        let first = session.create_address().await.unwrap();
        let second = session.create_address().await.unwrap();

        assert_ne!(first, second, "a fresh address is generated each time");
        let snapshot = session.snapshot();
        assert_eq!(snapshot.account.unwrap().address, second);
        assert!(snapshot.authenticated);
        assert!(session.is_polling());
        assert_eq!(account_mock.hits(), 2);
    }

    #[tokio::test]
    async fn polling_refreshes_messages_on_interval() {
        let server = MockServer::start();
        mock_domains(&server);
        mock_account(&server);
        mock_token(&server);
        let messages_mock = server.mock(|when, then| {
            when.method(GET).path("/messages");
            then.status(200).json_body(json!({
                "hydra:member": [{ "id": "m1", "subject": "one" }]
            }));
        });

        let session =
            MailboxSession::with_poll_interval(test_client(&server), Duration::from_millis(25));
        session.create_address().await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(messages_mock.hits() >= 2, "poll timer should keep firing");
        assert_eq!(session.snapshot().messages.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_observe_state_changes() {
        let server = MockServer::start();
        mock_domains(&server);
        mock_account(&server);
        mock_token(&server);

        let session = MailboxSession::new(test_client(&server));
        let mut updates = session.subscribe();
        assert!(updates.borrow().account.is_none());

        let address = session.create_address().await.unwrap();
        updates.changed().await.unwrap();

        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.account.map(|a| a.address), Some(address));
    }
}
