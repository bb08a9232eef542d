//! Tracks connected clients, their privilege class, and idle timeout.
//! A session exists only once its connection authenticated; the sweep
//! removes sessions whose last valid request is older than the timeout,
//! and the transport closes the underlying connections.

use std::collections::HashMap;

use thiserror::Error;

use crate::model::{ClientType, ConnectionId, Session, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication failed, check your credentials")]
    BadCredentials,
}

/// Shared secrets and idle policy, read from configuration at startup.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub admin_secret: String,
    pub customer_secret: String,
    pub session_timeout_ms: u64,
}

pub struct SessionRegistry {
    cfg: RegistryConfig,
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    pub fn new(cfg: RegistryConfig) -> Self {
        Self {
            cfg,
            sessions: HashMap::new(),
        }
    }

    /// Compare the supplied password against the configured secret for
    /// the declared client type and, on success, create an AUTHENTICATED
    /// session for the connection.
    pub fn authenticate(
        &mut self,
        conn: ConnectionId,
        client_type: ClientType,
        password: &str,
        now_ms: u64,
    ) -> Result<Session, AuthError> {
        let expected = match client_type {
            ClientType::Admin => &self.cfg.admin_secret,
            ClientType::Customer => &self.cfg.customer_secret,
        };

        if password.is_empty() || password != expected {
            return Err(AuthError::BadCredentials);
        }

        let session = Session {
            id: conn,
            client_type,
            authenticated_at_ms: now_ms,
            last_activity_ms: now_ms,
            state: SessionState::Authenticated,
        };

        self.sessions.insert(conn, session.clone());
        Ok(session)
    }

    /// Record activity for an authenticated connection; called on every
    /// successfully processed request.
    pub fn touch(&mut self, conn: ConnectionId, now_ms: u64) {
        if let Some(s) = self.sessions.get_mut(&conn) {
            s.last_activity_ms = now_ms;
        }
    }

    pub fn get(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    /// Remove the session on disconnect. The returned record is marked
    /// CLOSED.
    pub fn remove(&mut self, conn: ConnectionId) -> Option<Session> {
        self.sessions.remove(&conn).map(|mut s| {
            s.state = SessionState::Closed;
            s
        })
    }

    /// Remove and return every session idle past the configured timeout.
    /// The transport is responsible for closing the returned connections.
    pub fn sweep_idle(&mut self, now_ms: u64) -> Vec<ConnectionId> {
        let timeout = self.cfg.session_timeout_ms;

        let idle: Vec<ConnectionId> = self
            .sessions
            .values()
            .filter(|s| s.is_idle(now_ms, timeout))
            .map(|s| s.id)
            .collect();

        for id in &idle {
            self.sessions.remove(id);
        }

        idle
    }

    /// Authenticated sessions of the given type, for fan-out.
    pub fn authenticated_of_type(
        &self,
        client_type: ClientType,
    ) -> impl Iterator<Item = &Session> {
        self.sessions
            .values()
            .filter(move |s| s.is_authenticated() && s.client_type == client_type)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
