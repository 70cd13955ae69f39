//! The `prepare_ctx` step.
//!
//! Sticky knowledge is always policy-tier and retrieved knowledge is always
//! fact-tier. Both are folded into the existing buckets with set semantics, so
//! running the step again with the same sticky set, corpus, and latest message
//! changes nothing.

use ctxweave_core::error::TurnError;
use ctxweave_core::retrieval::RetrievedDocument;
use ctxweave_core::state::{ContextBuckets, ConversationState};
use ctxweave_store::KnowledgeStore;
use std::sync::Arc;
use tracing::debug;

/// Default number of documents retrieved per turn.
pub const DEFAULT_TOP_K: usize = 3;

/// The state fields written by one assembly pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUpdate {
    pub buckets: ContextBuckets,
    pub context: Vec<String>,
}

impl ContextUpdate {
    /// Write the update into `state`. Every other field passes through.
    pub fn apply(self, state: &mut ConversationState) {
        state.buckets = self.buckets;
        state.context = self.context;
    }
}

/// Render a retrieved match as a fact.
///
/// Matches with origin metadata become `Source: <origin>\nContent: <body>`;
/// matches without any metadata are used verbatim.
pub fn format_retrieved(doc: &RetrievedDocument) -> String {
    match doc.origin() {
        Some(origin) => format!("Source: {origin}\nContent: {}", doc.content),
        None => doc.content.clone(),
    }
}

pub struct ContextAssembler {
    knowledge: Arc<KnowledgeStore>,
    top_k: usize,
}

impl ContextAssembler {
    pub fn new(knowledge: Arc<KnowledgeStore>) -> Self {
        Self {
            knowledge,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set how many documents are retrieved per turn.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Compute the bucket update for `state`.
    ///
    /// The latest message (of any role) is the retrieval query. Retrieval
    /// failures have already been absorbed by the store; only an empty history
    /// is an error.
    pub async fn prepare(&self, state: &ConversationState) -> Result<ContextUpdate, TurnError> {
        let query = state
            .last_message()
            .map(|m| m.content.as_str())
            .ok_or(TurnError::EmptyHistory)?;

        let mut buckets = state.buckets.clone();

        let mut sticky_added = 0;
        for item in self.knowledge.sticky() {
            if buckets.policies.insert(item.as_str()) {
                sticky_added += 1;
            }
        }

        let retrieved = self.knowledge.retrieve(query, self.top_k).await;
        let mut facts_added = 0;
        for doc in &retrieved {
            if buckets.facts.insert(format_retrieved(doc)) {
                facts_added += 1;
            }
        }

        let context = buckets.merged(&state.context_priority);
        debug!(
            sticky_added,
            retrieved = retrieved.len(),
            facts_added,
            context_items = context.len(),
            "Context prepared"
        );

        Ok(ContextUpdate { buckets, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxweave_core::message::Message;
    use ctxweave_core::retrieval::{Document, META_FILE_PATH, Retriever};
    use ctxweave_store::KeywordIndex;
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn store_with(sticky: &[&str], docs: Vec<Document>) -> Arc<KnowledgeStore> {
        let index = Arc::new(KeywordIndex::new());
        if !docs.is_empty() {
            index.ingest(docs).await.unwrap();
        }
        let mut store = KnowledgeStore::new(index);
        for s in sticky {
            store.add_sticky(*s);
        }
        Arc::new(store)
    }

    fn state_with_message(text: &str) -> ConversationState {
        let mut state = ConversationState::new();
        state.push(Message::user(text));
        state
    }

    #[test]
    fn format_with_and_without_origin() {
        let with_origin = RetrievedDocument {
            content: "body".into(),
            metadata: BTreeMap::from([(META_FILE_PATH.to_string(), "/kb/a.md".to_string())]),
            score: 1.0,
        };
        assert_eq!(format_retrieved(&with_origin), "Source: /kb/a.md\nContent: body");

        let bare = RetrievedDocument {
            content: "body".into(),
            metadata: BTreeMap::new(),
            score: 1.0,
        };
        assert_eq!(format_retrieved(&bare), "body");
    }

    #[tokio::test]
    async fn sticky_lands_in_policies() {
        let assembler = ContextAssembler::new(store_with(&["always-on rule"], vec![]).await);
        let mut state = state_with_message("hello");

        let update = assembler.prepare(&state).await.unwrap();
        assert_eq!(update.buckets.policies.as_slice(), &strings(&["always-on rule"])[..]);
        update.apply(&mut state);
        assert_eq!(state.context, strings(&["always-on rule"]));
    }

    #[tokio::test]
    async fn retrieved_lands_in_facts_with_origin() {
        let doc = Document::new("Refunds take seven days.").with_metadata(META_FILE_PATH, "kb/refunds.md");
        let assembler = ContextAssembler::new(store_with(&[], vec![doc]).await);
        let state = state_with_message("how long do refunds take");

        let update = assembler.prepare(&state).await.unwrap();
        assert_eq!(
            update.buckets.facts.as_slice(),
            &strings(&["Source: kb/refunds.md\nContent: Refunds take seven days."])[..]
        );
        assert!(update.buckets.policies.is_empty());
    }

    #[tokio::test]
    async fn repeated_assembly_is_idempotent() {
        let doc = Document::new("Refunds take seven days.");
        let assembler = ContextAssembler::new(store_with(&["rule"], vec![doc]).await);
        let mut state = state_with_message("refunds");

        assembler.prepare(&state).await.unwrap().apply(&mut state);
        let first = state.clone();
        assembler.prepare(&state).await.unwrap().apply(&mut state);

        assert_eq!(state, first);
        assert_eq!(state.buckets.policies.len(), 1);
        assert_eq!(state.buckets.facts.len(), 1);
    }

    #[tokio::test]
    async fn merged_view_follows_priority() {
        let assembler = ContextAssembler::new(store_with(&[], vec![]).await);
        let mut state = state_with_message("anything");
        state.buckets.policies.insert("P1");
        state.buckets.facts.insert("F1");
        state.context_priority = strings(&["facts", "policies"]);

        let update = assembler.prepare(&state).await.unwrap();
        assert_eq!(update.context, strings(&["F1", "P1"]));
    }

    #[tokio::test]
    async fn other_fields_pass_through() {
        let assembler = ContextAssembler::new(store_with(&["rule"], vec![]).await);
        let mut state = state_with_message("hi");
        state.system = Some("Be brief.".into());
        state.procedure_enabled = true;
        state.procedure_steps = strings(&["a", "b"]);
        state.procedure_step = 1;
        let before = state.clone();

        assembler.prepare(&state).await.unwrap().apply(&mut state);
        assert_eq!(state.messages, before.messages);
        assert_eq!(state.system, before.system);
        assert_eq!(state.procedure_step, 1);
        assert_eq!(state.context_priority, before.context_priority);
    }

    #[tokio::test]
    async fn empty_history_is_an_error() {
        let assembler = ContextAssembler::new(store_with(&[], vec![]).await);
        let err = assembler.prepare(&ConversationState::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::EmptyHistory));
    }
}
