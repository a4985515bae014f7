// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request dispatcher: the single entry point for every remote call.
//
// Protected operations pass three guards, strictly in this order, and the
// first failure is the reply:
//
//   1. authentication: does the token belong to a live session?
//   2. authorization: does the session's cached role permit the operation?
//   3. lifecycle: is the server ON? (`start` and `status` are exempt)
//
// The lifecycle check and the operation itself run under the lifecycle lock,
// so a request that passed guard 3 cannot interleave with a concurrent stop.
// Session issue takes the same lock, and stop revokes sessions while holding
// it exclusively.
//
// Sessions die on stop, so while the server is OFF no token can resolve.  An
// unresolved token while OFF is therefore answered with "server offline"
// rather than "not logged in": it is the state, not the caller, at fault.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use spoolwerk_core::config::ServerConfig;
use spoolwerk_core::error::SpoolError;
use spoolwerk_core::messages;
use spoolwerk_core::types::{Operation, PrintJob, Reply, ServerState, SessionToken, UserRecord};
use spoolwerk_security::{
    AccessControl, AccessDecision, AuditLog, CredentialStore, InsertOutcome, PasswordHasher,
    SessionRegistry,
};
use tracing::{debug, error, info, instrument, warn};

use crate::lifecycle::{ServerLifecycle, Transition};
use crate::protocol::Request;

/// Policy knobs taken from [`ServerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Role given to self-registered users.
    pub default_role: String,
    /// Whether `start` may be called without a live session.
    pub allow_anonymous_start: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for DispatchPolicy {
    fn from(config: &ServerConfig) -> Self {
        Self {
            default_role: config.default_role.clone(),
            allow_anonymous_start: config.allow_anonymous_start,
        }
    }
}

/// The spooler service object.
///
/// Owns every piece of shared state; constructed once per process and
/// shared behind an `Arc`.
pub struct Dispatcher {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    sessions: Arc<SessionRegistry>,
    access: AccessControl,
    lifecycle: ServerLifecycle,
    audit: Option<Mutex<AuditLog>>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn CredentialStore>, policy: DispatchPolicy) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        Self {
            store,
            hasher: PasswordHasher::new(),
            access: AccessControl::new(Arc::clone(&sessions)),
            sessions,
            lifecycle: ServerLifecycle::new(),
            audit: None,
            policy,
        }
    }

    /// Replace the password hasher (tests use a low iteration count).
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Record identity and lifecycle events to `log`.
    pub fn with_audit(mut self, log: AuditLog) -> Self {
        self.audit = Some(Mutex::new(log));
        self
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    /// Number of live sessions.
    pub fn live_sessions(&self) -> usize {
        self.sessions.live_count()
    }

    /// Route a decoded wire request.
    pub fn handle(&self, request: Request) -> Reply {
        match request {
            Request::Register { username, password } => self.register(&username, &password),
            Request::Authenticate { username, password } => {
                self.authenticate(&username, &password)
            }
            Request::Logout { token } => self.logout(&token),
            Request::Print {
                filename,
                printer,
                token,
            } => self.print(&filename, &printer, &token),
            Request::Queue { token } => self.queue(&token),
            Request::TopQueue { job, token } => self.top_queue(job, &token),
            Request::Start { token } => self.start(token.as_ref()),
            Request::Stop { token } => self.stop(&token),
            Request::Restart { token } => self.restart(&token),
            Request::Status { .. } => self.status(),
            Request::ReadConfig { key, token } => self.read_config(&key, &token),
            Request::SetConfig { key, value, token } => self.set_config(&key, &value, &token),
        }
    }

    // -- Identity ------------------------------------------------------------

    /// Create a user with the default role and log them in.
    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str) -> Reply {
        if !self.lifecycle.state().is_on() {
            return messages::server_offline();
        }
        if username.trim().is_empty() || password.is_empty() {
            return messages::blank_credentials();
        }

        let role = self.policy.default_role.as_str();
        let result = self.enrol(username, password, role);

        match result {
            Ok((InsertOutcome::AlreadyExists, _)) => {
                debug!("username taken");
                self.audit("register", username, false, Some("username taken"));
                messages::username_taken(username)
            }
            Ok((InsertOutcome::Inserted, operations)) => {
                self.audit("register", username, true, Some(role));
                self.open_session(username, role, operations)
            }
            Err(e) => self.collaborator_fault("register", &e),
        }
    }

    fn enrol(
        &self,
        username: &str,
        password: &str,
        role: &str,
    ) -> spoolwerk_core::error::Result<(InsertOutcome, HashSet<Operation>)> {
        let salt = self.hasher.generate_salt()?;
        let password_hash = self.hasher.derive(password, &salt).to_vec();
        // Grants are fetched before the write so a store failure leaves no user behind.
        let operations = self.store.permissions_for_role(role)?;
        let user = UserRecord {
            username: username.to_owned(),
            password_hash,
            salt: salt.to_vec(),
            role: role.to_owned(),
        };
        let outcome = self.store.insert(&user)?;
        Ok((outcome, operations))
    }

    /// Log in with username and password.
    ///
    /// A user who already holds a live session gets that same token back.
    #[instrument(skip(self, password))]
    pub fn authenticate(&self, username: &str, password: &str) -> Reply {
        if !self.lifecycle.state().is_on() {
            return messages::server_offline();
        }

        let user = match self.store.lookup(username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!("unknown username");
                self.audit("authenticate", username, false, Some("unknown user"));
                return messages::bad_credentials(username);
            }
            Err(e) => return self.collaborator_fault("authenticate", &e),
        };

        if !self.hasher.verify(password, &user.salt, &user.password_hash) {
            debug!("password mismatch");
            self.audit("authenticate", username, false, Some("bad password"));
            return messages::bad_credentials(username);
        }

        match self.store.permissions_for_role(&user.role) {
            Ok(operations) => {
                self.audit("authenticate", username, true, Some(&user.role));
                self.open_session(username, &user.role, operations)
            }
            Err(e) => self.collaborator_fault("authenticate", &e),
        }
    }

    /// Bind permissions and issue the token under the lifecycle lock, so a
    /// concurrent stop either revokes the new session or refuses it.
    fn open_session(
        &self,
        username: &str,
        role: &str,
        operations: HashSet<Operation>,
    ) -> Reply {
        let issued = self.lifecycle.read_if_on(|_| {
            self.access.load(username, role, operations);
            self.sessions.issue(username)
        });
        match issued {
            Some(Ok(token)) => Reply::session(token, messages::LOGGED_IN),
            Some(Err(e)) => self.collaborator_fault("issue session", &e),
            None => {
                debug!("server stopped during login");
                messages::server_offline()
            }
        }
    }

    /// End the caller's session.
    #[instrument(skip_all)]
    pub fn logout(&self, token: &SessionToken) -> Reply {
        match self.sessions.revoke(token) {
            Some(username) => {
                self.access.forget(&username);
                Reply::ok(messages::LOGGED_OUT)
            }
            None => messages::not_authenticated(),
        }
    }

    // -- Guards --------------------------------------------------------------

    /// Guards 1 and 2.  Returns the username on success.
    fn admit(&self, token: &SessionToken, operation: Operation) -> Result<String, Reply> {
        match self.access.authorize(token, operation) {
            AccessDecision::Granted { username } => Ok(username),
            AccessDecision::Unauthenticated => {
                if !operation.allowed_while_off() && !self.lifecycle.state().is_on() {
                    Err(messages::server_offline())
                } else {
                    Err(messages::not_authenticated())
                }
            }
            AccessDecision::Denied { username } => {
                warn!(%username, %operation, "operation denied");
                self.audit("authorize", &username, false, Some(operation.as_str()));
                Err(messages::not_authorized(operation))
            }
        }
    }

    // -- Queue and config ----------------------------------------------------

    #[instrument(skip(self, token))]
    pub fn print(&self, filename: &str, printer: &str, token: &SessionToken) -> Reply {
        let username = match self.admit(token, Operation::Print) {
            Ok(username) => username,
            Err(reply) => return reply,
        };
        self.lifecycle
            .write_if_on(|spool| {
                let position = spool
                    .queue
                    .enqueue(PrintJob::new(filename, printer, username));
                Reply::ok(messages::job_queued(position, filename, printer))
            })
            .unwrap_or_else(messages::server_offline)
    }

    #[instrument(skip_all)]
    pub fn queue(&self, token: &SessionToken) -> Reply {
        if let Err(reply) = self.admit(token, Operation::Queue) {
            return reply;
        }
        self.lifecycle
            .read_if_on(|spool| Reply::ok(spool.queue.render()))
            .unwrap_or_else(messages::server_offline)
    }

    /// Move the job at position `job` to the front of the queue.
    #[instrument(skip(self, token))]
    pub fn top_queue(&self, job: i64, token: &SessionToken) -> Reply {
        if let Err(reply) = self.admit(token, Operation::TopQueue) {
            return reply;
        }
        self.lifecycle
            .write_if_on(|spool| {
                if spool.queue.promote(job) {
                    Reply::ok(spool.queue.render())
                } else {
                    messages::job_not_found(job)
                }
            })
            .unwrap_or_else(messages::server_offline)
    }

    #[instrument(skip(self, token))]
    pub fn read_config(&self, key: &str, token: &SessionToken) -> Reply {
        if let Err(reply) = self.admit(token, Operation::ReadConfig) {
            return reply;
        }
        self.lifecycle
            .read_if_on(|spool| match spool.config.get(key) {
                Some(value) => Reply::ok(messages::config_value(key, value)),
                None => messages::config_not_found(key),
            })
            .unwrap_or_else(messages::server_offline)
    }

    #[instrument(skip(self, value, token))]
    pub fn set_config(&self, key: &str, value: &str, token: &SessionToken) -> Reply {
        if let Err(reply) = self.admit(token, Operation::SetConfig) {
            return reply;
        }
        self.lifecycle
            .write_if_on(|spool| {
                spool.config.set(key, value);
                Reply::ok(messages::config_set(key, value))
            })
            .unwrap_or_else(messages::server_offline)
    }

    // -- Lifecycle -----------------------------------------------------------

    /// `status` is never guarded.
    pub fn status(&self) -> Reply {
        messages::status(self.lifecycle.state())
    }

    /// Turn the server ON.
    ///
    /// With a live token the caller must hold the `start` permission.
    /// Without one (or with a token that died at the last stop) the request
    /// is an anonymous bootstrap, allowed only if the policy says so.
    #[instrument(skip_all)]
    pub fn start(&self, token: Option<&SessionToken>) -> Reply {
        let resolved = token.and_then(|token| self.sessions.resolve(token).map(|_| token));

        let actor = match resolved {
            Some(token) => match self.admit(token, Operation::Start) {
                Ok(username) => username,
                Err(reply) => return reply,
            },
            None if token.is_some() && self.lifecycle.state().is_on() => {
                return messages::not_authenticated();
            }
            None if self.policy.allow_anonymous_start => "-".to_owned(),
            None => return messages::not_authenticated(),
        };

        let transition = self.lifecycle.start();
        if transition.changed_state() {
            self.audit("start", &actor, true, None);
        }
        Reply::ok(transition.message())
    }

    /// Turn the server OFF, discarding queue, config, and every session.
    #[instrument(skip_all)]
    pub fn stop(&self, token: &SessionToken) -> Reply {
        let username = match self.admit(token, Operation::Stop) {
            Ok(username) => username,
            Err(reply) => return reply,
        };
        let mut revoked = 0;
        match self.lifecycle.stop_with(|| revoked = self.revoke_all_sessions()) {
            Transition::AlreadyOff => messages::server_offline(),
            transition => {
                self.record_transition("stop", &username, revoked, transition);
                Reply::ok(transition.message())
            }
        }
    }

    /// Stop then start.  Every session, including the caller's, ends.
    #[instrument(skip_all)]
    pub fn restart(&self, token: &SessionToken) -> Reply {
        let username = match self.admit(token, Operation::Restart) {
            Ok(username) => username,
            Err(reply) => return reply,
        };
        let mut revoked = 0;
        match self.lifecycle.restart_with(|| revoked = self.revoke_all_sessions()) {
            Transition::NotRunning => messages::server_offline(),
            transition => {
                self.record_transition("restart", &username, revoked, transition);
                Reply::ok(transition.message())
            }
        }
    }

    /// Runs inside the lifecycle write lock.
    fn revoke_all_sessions(&self) -> usize {
        let revoked = self.sessions.revoke_all();
        self.access.clear();
        revoked
    }

    fn record_transition(
        &self,
        action: &str,
        username: &str,
        revoked: usize,
        transition: Transition,
    ) {
        info!(%action, %username, revoked, ?transition, "lifecycle transition");
        self.audit(
            action,
            username,
            true,
            Some(&format!("{revoked} sessions revoked")),
        );
    }

    // -- Helpers -------------------------------------------------------------

    fn collaborator_fault(&self, action: &str, err: &SpoolError) -> Reply {
        error!(%action, error = %err, "operation aborted");
        messages::unavailable(err)
    }

    fn audit(&self, action: &str, username: &str, success: bool, details: Option<&str>) {
        let Some(log) = &self.audit else {
            return;
        };
        let log = log.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = log.record(action, username, success, details) {
            warn!(error = %e, %action, "failed to write audit entry");
        }
    }

    #[cfg(test)]
    fn audit_count(&self) -> u64 {
        self.audit
            .as_ref()
            .map(|log| log.lock().unwrap().count().unwrap())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolwerk_core::types::Outcome;
    use spoolwerk_security::MemoryCredentialStore;
    use spoolwerk_security::SqliteCredentialStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;

    fn hasher() -> PasswordHasher {
        PasswordHasher::with_iterations(16).unwrap()
    }

    fn dispatcher_with(store: Arc<dyn CredentialStore>, policy: DispatchPolicy) -> Dispatcher {
        Dispatcher::new(store, policy).with_hasher(hasher())
    }

    fn dispatcher() -> Dispatcher {
        dispatcher_with(
            Arc::new(MemoryCredentialStore::new()),
            DispatchPolicy::default(),
        )
    }

    fn started() -> Dispatcher {
        let d = dispatcher();
        assert!(d.start(None).is_ok());
        d
    }

    fn login(d: &Dispatcher, username: &str, password: &str) -> SessionToken {
        let reply = d.register(username, password);
        assert!(reply.is_ok(), "register failed: {}", reply.message);
        reply.token.expect("token on register")
    }

    /// A store whose backing database is gone.
    struct UnreachableStore;

    impl CredentialStore for UnreachableStore {
        fn lookup(&self, _: &str) -> spoolwerk_core::error::Result<Option<UserRecord>> {
            Err(SpoolError::CredentialStore("connection refused".into()))
        }
        fn insert(&self, _: &UserRecord) -> spoolwerk_core::error::Result<InsertOutcome> {
            Err(SpoolError::CredentialStore("connection refused".into()))
        }
        fn permissions_for_role(
            &self,
            _: &str,
        ) -> spoolwerk_core::error::Result<HashSet<Operation>> {
            Err(SpoolError::CredentialStore("connection refused".into()))
        }
    }

    /// Parks one `permissions_for_role` call, once armed, until released.
    struct GatedStore {
        inner: MemoryCredentialStore,
        armed: AtomicBool,
        reached: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl CredentialStore for GatedStore {
        fn lookup(&self, username: &str) -> spoolwerk_core::error::Result<Option<UserRecord>> {
            self.inner.lookup(username)
        }
        fn insert(&self, user: &UserRecord) -> spoolwerk_core::error::Result<InsertOutcome> {
            self.inner.insert(user)
        }
        fn permissions_for_role(
            &self,
            role: &str,
        ) -> spoolwerk_core::error::Result<HashSet<Operation>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.lock().unwrap().send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            self.inner.permissions_for_role(role)
        }
    }

    // -- Identity ------------------------------------------------------------

    #[test]
    fn register_yields_working_token() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        assert!(d.queue(&token).is_ok());
    }

    #[test]
    fn duplicate_register_fails_and_keeps_original_credentials() {
        let d = started();
        login(&d, "alice", "pw1");

        let second = d.register("alice", "other");
        assert_eq!(second.outcome, Outcome::AuthenticationFailure);
        assert!(second.token.is_none());

        assert!(d.authenticate("alice", "pw1").is_ok());
        assert!(!d.authenticate("alice", "other").is_ok());
    }

    #[test]
    fn register_rejects_blank_input() {
        let d = started();
        for (username, password) in [("", "pw"), ("  ", "pw"), ("bob", "")] {
            let reply = d.register(username, password);
            assert_eq!(reply.outcome, Outcome::AuthenticationFailure);
            assert!(reply.token.is_none());
        }
    }

    #[test]
    fn wrong_password_issues_no_token() {
        let d = started();
        login(&d, "alice", "pw1");
        d.sessions.revoke_all();

        let reply = d.authenticate("alice", "wrong");
        assert_eq!(reply.outcome, Outcome::AuthenticationFailure);
        assert!(reply.token.is_none());
        assert_eq!(d.live_sessions(), 0);

        let reply = d.authenticate("alice", "pw1");
        assert!(reply.is_ok());
        assert!(d.queue(reply.token.as_ref().unwrap()).is_ok());
    }

    #[test]
    fn unknown_user_cannot_authenticate() {
        let d = started();
        let reply = d.authenticate("ghost", "pw");
        assert_eq!(reply.outcome, Outcome::AuthenticationFailure);
        assert!(reply.token.is_none());
    }

    #[test]
    fn relogin_returns_same_token() {
        let d = started();
        let first = login(&d, "alice", "pw1");
        let again = d.authenticate("alice", "pw1").token.unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn identity_calls_require_server_on() {
        let d = dispatcher();
        assert_eq!(d.register("alice", "pw1").outcome, Outcome::ServerOffline);
        assert_eq!(d.register("", "pw1").outcome, Outcome::ServerOffline);
        assert_eq!(d.register("alice", "").outcome, Outcome::ServerOffline);
        assert_eq!(d.authenticate("alice", "pw1").outcome, Outcome::ServerOffline);
    }

    #[test]
    fn logout_ends_session() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        assert!(d.logout(&token).is_ok());
        assert_eq!(d.queue(&token).outcome, Outcome::AuthenticationFailure);
        assert_eq!(d.logout(&token).outcome, Outcome::AuthenticationFailure);
    }

    // -- Guards --------------------------------------------------------------

    #[test]
    fn unrecognized_token_never_mutates() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        d.print("a.pdf", "hp1", &token);

        let forged = SessionToken::new("forged");
        assert_eq!(
            d.print("b.pdf", "hp1", &forged).outcome,
            Outcome::AuthenticationFailure
        );
        assert_eq!(
            d.set_config("paper", "A4", &forged).outcome,
            Outcome::AuthenticationFailure
        );
        assert_eq!(d.stop(&forged).outcome, Outcome::AuthenticationFailure);

        assert_eq!(d.queue(&token).message, "0 a.pdf");
        assert_eq!(d.state(), ServerState::On);
    }

    #[test]
    fn role_without_permission_is_denied() {
        let d = dispatcher_with(
            Arc::new(MemoryCredentialStore::new()),
            DispatchPolicy {
                default_role: "user".into(),
                ..DispatchPolicy::default()
            },
        );
        d.start(None);
        let token = login(&d, "bob", "pw");

        assert!(d.print("a.pdf", "hp1", &token).is_ok());
        let reply = d.stop(&token);
        assert_eq!(reply.outcome, Outcome::AuthorizationFailure);
        assert!(reply.message.contains("stop"));
        assert_eq!(d.top_queue(0, &token).outcome, Outcome::AuthorizationFailure);
        assert_eq!(d.state(), ServerState::On);
    }

    #[test]
    fn role_change_applies_on_next_authentication() {
        let store = Arc::new(MemoryCredentialStore::new());
        let d = dispatcher_with(
            store.clone(),
            DispatchPolicy {
                default_role: "user".into(),
                ..DispatchPolicy::default()
            },
        );
        d.start(None);
        let token = login(&d, "bob", "pw");
        assert_eq!(d.read_config("k", &token).outcome, Outcome::AuthorizationFailure);

        assert!(store.set_user_role("bob", "technician"));
        // Cached permissions still apply.
        assert_eq!(d.read_config("k", &token).outcome, Outcome::AuthorizationFailure);

        let same = d.authenticate("bob", "pw").token.unwrap();
        assert_eq!(same, token);
        assert_eq!(d.read_config("k", &token).outcome, Outcome::NotFound);
    }

    #[test]
    fn offline_operations_report_server_offline() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        d.print("a.pdf", "hp1", &token);
        assert!(d.stop(&token).is_ok());

        for reply in [
            d.print("b.pdf", "hp1", &token),
            d.queue(&token),
            d.top_queue(0, &token),
            d.stop(&token),
            d.restart(&token),
            d.read_config("paper", &token),
            d.set_config("paper", "A4", &token),
        ] {
            assert_eq!(reply.outcome, Outcome::ServerOffline, "{}", reply.message);
        }
        assert_eq!(d.status().message, "OFF");
    }

    #[test]
    fn start_resets_stores() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        d.print("a.pdf", "hp1", &token);
        d.set_config("paper", "A4", &token);
        d.stop(&token);

        assert_eq!(d.start(Some(&token)).message, messages::SERVER_STARTED);
        let token = login_again(&d, "alice", "pw1");
        assert_eq!(d.queue(&token).message, messages::QUEUE_EMPTY);
        assert_eq!(d.read_config("paper", &token).outcome, Outcome::NotFound);
    }

    fn login_again(d: &Dispatcher, username: &str, password: &str) -> SessionToken {
        d.authenticate(username, password).token.expect("token")
    }

    // -- Lifecycle -----------------------------------------------------------

    #[test]
    fn status_is_unguarded() {
        let d = dispatcher();
        assert_eq!(d.status().message, "OFF");
        d.start(None);
        assert_eq!(d.status().message, "ON");
    }

    #[test]
    fn start_when_on_reports_already_on() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        assert_eq!(d.start(Some(&token)).message, messages::ALREADY_ON);
    }

    #[test]
    fn start_with_dead_token_while_on_is_unauthenticated() {
        let d = started();
        assert_eq!(
            d.start(Some(&SessionToken::new("stale"))).outcome,
            Outcome::AuthenticationFailure
        );
    }

    #[test]
    fn anonymous_start_can_be_disabled() {
        let d = dispatcher_with(
            Arc::new(MemoryCredentialStore::new()),
            DispatchPolicy {
                allow_anonymous_start: false,
                ..DispatchPolicy::default()
            },
        );
        assert_eq!(d.start(None).outcome, Outcome::AuthenticationFailure);
        assert_eq!(d.state(), ServerState::Off);
    }

    #[test]
    fn start_with_token_requires_permission() {
        let d = dispatcher_with(
            Arc::new(MemoryCredentialStore::new()),
            DispatchPolicy {
                default_role: "user".into(),
                ..DispatchPolicy::default()
            },
        );
        d.start(None);
        let token = login(&d, "bob", "pw");
        assert_eq!(d.start(Some(&token)).outcome, Outcome::AuthorizationFailure);
    }

    #[test]
    fn stop_revokes_every_session() {
        let d = started();
        let alice = login(&d, "alice", "pw1");
        login(&d, "bob", "pw2");
        assert_eq!(d.live_sessions(), 2);

        assert_eq!(d.stop(&alice).message, messages::SERVER_STOPPED);
        assert_eq!(d.live_sessions(), 0);
    }

    #[test]
    fn login_interrupted_by_stop_gets_no_session() {
        let (reached_tx, reached_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryCredentialStore::new(),
            armed: AtomicBool::new(false),
            reached: Mutex::new(reached_tx),
            release: Mutex::new(release_rx),
        });
        let d = Arc::new(dispatcher_with(store.clone(), DispatchPolicy::default()));
        d.start(None);
        let admin = login(&d, "root", "pw0");
        login(&d, "alice", "pw1");

        store.armed.store(true, Ordering::SeqCst);
        let login_thread = {
            let d = Arc::clone(&d);
            thread::spawn(move || d.authenticate("alice", "pw1"))
        };

        // The login has verified the password and is fetching grants.
        reached_rx.recv().unwrap();
        assert!(d.stop(&admin).is_ok());
        release_tx.send(()).unwrap();

        let reply = login_thread.join().unwrap();
        assert_eq!(reply.outcome, Outcome::ServerOffline);
        assert!(reply.token.is_none());
        assert_eq!(d.live_sessions(), 0);

        d.start(None);
        assert_eq!(d.live_sessions(), 0);
    }

    #[test]
    fn no_session_outlives_a_concurrent_stop() {
        for _ in 0..20 {
            let d = Arc::new(started());
            let admin = login(&d, "root", "pw0");
            login(&d, "alice", "pw1");

            let login_thread = {
                let d = Arc::clone(&d);
                thread::spawn(move || d.authenticate("alice", "pw1"))
            };
            assert!(d.stop(&admin).is_ok());
            let reply = login_thread.join().unwrap();

            assert_eq!(d.state(), ServerState::Off);
            assert_eq!(d.live_sessions(), 0, "reply: {}", reply.message);
        }
    }

    #[test]
    fn restart_clears_queue_and_sessions() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        d.print("a.pdf", "hp1", &token);

        let reply = d.restart(&token);
        assert!(reply.is_ok());
        assert!(reply.message.contains(messages::SERVER_STOPPED));
        assert!(reply.message.contains(messages::SERVER_STARTED));
        assert_eq!(d.state(), ServerState::On);
        assert_eq!(d.queue(&token).outcome, Outcome::AuthenticationFailure);

        let token = login_again(&d, "alice", "pw1");
        assert_eq!(d.queue(&token).message, messages::QUEUE_EMPTY);
    }

    // -- Queue and config ----------------------------------------------------

    #[test]
    fn print_queue_top_queue_scenario() {
        let d = started();
        let t1 = login(&d, "alice", "pw1");

        let printed = d.print("report.pdf", "hp1", &t1);
        assert!(printed.is_ok());
        assert!(printed.message.contains("report.pdf"));

        assert_eq!(d.queue(&t1).message, "0 report.pdf");
        assert_eq!(d.top_queue(0, &t1).message, "0 report.pdf");

        assert!(d.stop(&t1).is_ok());
        assert_eq!(d.queue(&t1).outcome, Outcome::ServerOffline);
    }

    #[test]
    fn top_queue_reorders_and_rejects_bad_positions() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            d.print(name, "hp1", &token);
        }

        let reply = d.top_queue(2, &token);
        assert_eq!(reply.message, "0 c.pdf\n1 a.pdf\n2 b.pdf");

        for bad in [3, 100, -1] {
            assert_eq!(d.top_queue(bad, &token).outcome, Outcome::NotFound);
        }
        assert_eq!(d.queue(&token).message, "0 c.pdf\n1 a.pdf\n2 b.pdf");
    }

    #[test]
    fn config_set_then_read() {
        let d = started();
        let t1 = login(&d, "alice", "pw1");

        assert!(d.set_config("paper", "A4", &t1).is_ok());
        let read = d.read_config("paper", &t1);
        assert!(read.is_ok());
        assert!(read.message.contains("A4"));

        let missing = d.read_config("missing", &t1);
        assert_eq!(missing.outcome, Outcome::NotFound);
    }

    #[test]
    fn empty_queue_lists_marker() {
        let d = started();
        let token = login(&d, "alice", "pw1");
        assert_eq!(d.queue(&token).message, messages::QUEUE_EMPTY);
    }

    // -- Collaborator faults -------------------------------------------------

    #[test]
    fn unreachable_store_yields_unavailable() {
        let d = dispatcher_with(Arc::new(UnreachableStore), DispatchPolicy::default());
        d.start(None);

        let reply = d.register("alice", "pw1");
        assert_eq!(reply.outcome, Outcome::Unavailable);
        assert!(reply.token.is_none());
        assert!(!reply.message.contains("connection refused"));

        assert_eq!(d.authenticate("alice", "pw1").outcome, Outcome::Unavailable);
        assert_eq!(d.live_sessions(), 0);
        assert_eq!(d.status().message, "ON");
    }

    #[test]
    fn sqlite_store_backs_full_flow() {
        let store = Arc::new(SqliteCredentialStore::open_in_memory().unwrap());
        let d = dispatcher_with(store.clone(), DispatchPolicy::default())
            .with_audit(AuditLog::open_in_memory().unwrap());
        d.start(None);

        let token = login(&d, "alice", "pw1");
        assert!(d.print("report.pdf", "hp1", &token).is_ok());
        assert_eq!(store.user_count().unwrap(), 1);

        d.authenticate("alice", "nope");
        d.stop(&token);
        // start, register, failed authenticate, stop
        assert_eq!(d.audit_count(), 4);
    }

    #[test]
    fn handle_routes_wire_requests() {
        let d = dispatcher();
        assert!(d.handle(Request::Start { token: None }).is_ok());
        let reply = d.handle(Request::Register {
            username: "alice".into(),
            password: "pw1".into(),
        });
        let token = reply.token.unwrap();

        let reply = d.handle(Request::Print {
            filename: "report.pdf".into(),
            printer: "hp1".into(),
            token: token.clone(),
        });
        assert!(reply.is_ok());
        assert_eq!(
            d.handle(Request::TopQueue {
                job: 0,
                token: token.clone()
            })
            .message,
            "0 report.pdf"
        );
        assert_eq!(d.handle(Request::Status { token: None }).message, "ON");
    }

    #[test]
    fn concurrent_prints_are_all_admitted() {
        let d = Arc::new(started());
        let token = login(&d, "alice", "pw1");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let d = Arc::clone(&d);
                let token = token.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        assert!(d.print(&format!("doc-{i}-{j}.pdf"), "hp1", &token).is_ok());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let listing = d.queue(&token).message;
        assert_eq!(listing.lines().count(), 200);
    }
}
