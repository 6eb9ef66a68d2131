//! The conversation memory service.

use common::cues;
use common::model::{ConversationTurn, TurnRole};
use common::store::RuntimeStore;

pub struct MemoryService<'a> {
    store: &'a RuntimeStore,
}

impl<'a> MemoryService<'a> {
    pub fn new(store: &'a RuntimeStore) -> Self {
        Self { store }
    }

    pub fn append_turn(&self, thread_id: &str, role: TurnRole, content: impl Into<String>) {
        self.store.append_turn(thread_id, role, content.into());
    }

    pub fn recent_turns(&self, thread_id: &str, limit: usize) -> Vec<ConversationTurn> {
        self.store.recent_turns(thread_id, limit)
    }

    /// Resolves a follow-up question. When the question matches a
    /// follow-up hint, appends a synthetic note to the question and returns
    /// an explanatory note the orchestrator surfaces as a `memory_resolver`
    /// `ToolDecision`.
    pub fn resolve_follow_up_question(
        &self,
        thread_id: &str,
        question: &str,
    ) -> (String, Option<String>) {
        let lowered = question.to_lowercase();
        if !cues::any_follow_up_hint(&lowered) {
            return (question.to_string(), None);
        }

        match self.store.last_user_turn(thread_id) {
            Some(turn) => {
                let resolved = format!(
                    "{question}\n\nFollow-up context from prior user turn: {}",
                    turn.content
                );
                (resolved, Some("resolved follow-up reference using previous user turn".to_string()))
            }
            None => (question.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_preserve_append_order() {
        let store = RuntimeStore::memory();
        let memory = MemoryService::new(&store);
        memory.append_turn("t1", TurnRole::User, "first");
        memory.append_turn("t1", TurnRole::Assistant, "second");
        let recent = memory.recent_turns("t1", 6);
        assert_eq!(recent[0].content, "first");
        assert_eq!(recent[1].content, "second");
    }

    #[test]
    fn follow_up_resolved_against_last_user_turn() {
        let store = RuntimeStore::memory();
        let memory = MemoryService::new(&store);
        memory.append_turn("t1", TurnRole::User, "Tell me about Inception");
        memory.append_turn("t1", TurnRole::Assistant, "Inception is a film by Nolan");

        let (resolved, note) = memory.resolve_follow_up_question("t1", "Who directed that movie?");
        assert!(note.is_some());
        assert!(resolved.contains("Tell me about Inception"));
    }

    #[test]
    fn non_follow_up_question_is_unchanged() {
        let store = RuntimeStore::memory();
        let memory = MemoryService::new(&store);
        let (resolved, note) = memory.resolve_follow_up_question("t1", "What is Rust?");
        assert_eq!(resolved, "What is Rust?");
        assert!(note.is_none());
    }
}
