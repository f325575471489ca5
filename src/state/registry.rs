//! Connection registry: user identity to the single live session.
//!
//! The registry never owns a session. It stores a `Weak` reference so a
//! session's lifetime is decided by its connection task alone, and
//! identity checks compare allocation addresses rather than user ids.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::Session;
use crate::protocol::UserId;

/// Authoritative `UserId -> Session` map. At most one entry per user.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<UserId, Weak<Session>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session` as the current session for its user.
    ///
    /// Returns the live session it replaced, if any. The caller is expected
    /// to close the returned session; the registry does not wait for it.
    pub fn register(&self, session: &Arc<Session>) -> Option<Arc<Session>> {
        let prior = self
            .sessions
            .write()
            .insert(session.user_id().clone(), Arc::downgrade(session));
        prior
            .and_then(|weak| weak.upgrade())
            .filter(|prior| !Arc::ptr_eq(prior, session))
    }

    /// Remove the entry for `user` only if it still points at `session`.
    ///
    /// A superseded session tearing down late cannot evict its replacement.
    pub fn unregister(&self, user: &UserId, session: &Session) -> bool {
        let mut sessions = self.sessions.write();
        let installed = sessions
            .get(user)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), session));
        if installed {
            sessions.remove(user);
        }
        installed
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn lookup(&self, user: &UserId) -> Option<Arc<Session>> {
        self.sessions.read().get(user).and_then(Weak::upgrade)
    }

    /// Resolve many users at once under one read lock. Offline users are omitted.
    pub fn lookup_many<'a, I>(&self, users: I) -> HashMap<UserId, Arc<Session>>
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let sessions = self.sessions.read();
        users
            .into_iter()
            .filter_map(|user| {
                sessions
                    .get(user)
                    .and_then(Weak::upgrade)
                    .map(|session| (user.clone(), session))
            })
            .collect()
    }

    /// Every live session.
    pub fn snapshot_all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Number of live sessions.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
