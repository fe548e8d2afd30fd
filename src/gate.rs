use std::sync::Arc;

use crate::session::SessionStore;

pub const LOGIN_PATH: &str = "/login";

/// Outcome of a protected-view check. The redirect carries the originally
/// requested location so a successful login can navigate back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectToLogin { return_to: String },
}

/// Optimistic per-view authentication check: only the presence of a stored
/// access credential is tested. An expired credential is discovered later,
/// through the 401 refresh path in the transport.
pub struct SessionGate {
    store: Arc<SessionStore>,
}

impl SessionGate {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn check(&self, requested: &str) -> GateDecision {
        if self.store.access_token().is_some() {
            GateDecision::Allow
        } else {
            GateDecision::RedirectToLogin {
                return_to: requested.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{GateDecision, SessionGate};
    use crate::session::SessionStore;
    use crate::types::TokenPair;

    #[test]
    fn unauthenticated_visit_is_redirected_with_its_origin() {
        let store = Arc::new(SessionStore::in_memory());
        let gate = SessionGate::new(store);

        assert_eq!(
            gate.check("/profile"),
            GateDecision::RedirectToLogin {
                return_to: "/profile".to_string()
            }
        );
    }

    #[test]
    fn stored_credential_allows_the_view() {
        let store = Arc::new(SessionStore::in_memory());
        store.set_tokens(&TokenPair {
            access: "acc".into(),
            refresh: "ref".into(),
        });
        let gate = SessionGate::new(store);

        assert_eq!(gate.check("/profile"), GateDecision::Allow);
    }

    #[test]
    fn login_returns_the_user_to_the_original_destination() {
        let store = Arc::new(SessionStore::in_memory());
        let gate = SessionGate::new(store.clone());

        let decision = gate.check("/profile");
        let GateDecision::RedirectToLogin { return_to } = decision else {
            panic!("expected a redirect");
        };

        // login succeeds and persists tokens
        store.set_tokens(&TokenPair {
            access: "acc".into(),
            refresh: "ref".into(),
        });

        assert_eq!(gate.check(&return_to), GateDecision::Allow);
        assert_eq!(return_to, "/profile");
    }
}
