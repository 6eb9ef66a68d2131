//! Access control: the demo-session quota counter and per-session
//! runtime key storage.

use common::store::RuntimeStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKeyAction {
    Set(String),
    Clear,
    Status,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKeyResult {
    Set,
    Cleared,
    Status(bool),
    Help(&'static str),
}

pub struct AccessControl<'a> {
    store: &'a RuntimeStore,
    demo_quota: u32,
}

impl<'a> AccessControl<'a> {
    pub fn new(store: &'a RuntimeStore, demo_quota: u32) -> Self {
        Self { store, demo_quota }
    }

    /// Returns `false` without mutating state when the session is already
    /// at quota.
    pub fn consume_demo_quota(&self, session_id: &str) -> bool {
        self.store.consume_demo_quota(session_id, self.demo_quota)
    }

    pub fn remaining_quota(&self, session_id: &str) -> u32 {
        self.demo_quota.saturating_sub(self.store.demo_usage(session_id))
    }

    pub fn handle_runtime_key(&self, session_id: &str, action: RuntimeKeyAction) -> RuntimeKeyResult {
        match action {
            RuntimeKeyAction::Set(key) => {
                self.store.set_runtime_key(session_id, key);
                RuntimeKeyResult::Set
            }
            RuntimeKeyAction::Clear => {
                self.store.clear_runtime_key(session_id);
                RuntimeKeyResult::Cleared
            }
            RuntimeKeyAction::Status => {
                RuntimeKeyResult::Status(self.store.runtime_key(session_id).is_some())
            }
            RuntimeKeyAction::Help => RuntimeKeyResult::Help(
                "actions: set <key> | clear | status | help. A runtime key is an \
                 ephemeral per-session secret used as a fallback credential for \
                 embedding/critic/rerank providers.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_blocks_without_mutating_once_exhausted() {
        let store = RuntimeStore::memory();
        let ac = AccessControl::new(&store, 1);
        assert!(ac.consume_demo_quota("s1"));
        assert!(!ac.consume_demo_quota("s1"));
        assert_eq!(ac.remaining_quota("s1"), 0);
    }

    #[test]
    fn runtime_key_lifecycle() {
        let store = RuntimeStore::memory();
        let ac = AccessControl::new(&store, 3);
        assert_eq!(
            ac.handle_runtime_key("s1", RuntimeKeyAction::Status),
            RuntimeKeyResult::Status(false)
        );
        ac.handle_runtime_key("s1", RuntimeKeyAction::Set("secret".into()));
        assert_eq!(
            ac.handle_runtime_key("s1", RuntimeKeyAction::Status),
            RuntimeKeyResult::Status(true)
        );
        ac.handle_runtime_key("s1", RuntimeKeyAction::Clear);
        assert_eq!(
            ac.handle_runtime_key("s1", RuntimeKeyAction::Status),
            RuntimeKeyResult::Status(false)
        );
    }
}
