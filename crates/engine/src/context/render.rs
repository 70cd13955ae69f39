//! Effective-message rendering.
//!
//! The provider always sees, in order: the directive, one aggregated context
//! message, the procedure guide, and then the full history.

use ctxweave_core::message::Message;
use ctxweave_core::state::ConversationState;

/// First line of the aggregated context message.
pub const CONTEXT_HEADER: &str = "Context:";

/// The aggregated context message body, or `None` when every bucket is empty.
///
/// ```text
/// Context:
/// - Policies:
/// <policy>
/// - Facts:
/// <fact>
/// ```
pub fn render_context_block(state: &ConversationState) -> Option<String> {
    if state.buckets.is_empty() {
        return None;
    }

    let mut lines = vec![CONTEXT_HEADER.to_string()];
    for kind in state.bucket_order() {
        let items = state.buckets.get(kind);
        if items.is_empty() {
            continue;
        }
        lines.push(format!("- {}:", kind.title()));
        lines.extend(items.iter().cloned());
    }
    Some(lines.join("\n"))
}

/// The procedure guide, or `None` when no procedure is active.
pub fn render_procedure_guide(state: &ConversationState) -> Option<String> {
    if !state.procedure_active() {
        return None;
    }
    let total = state.procedure_steps.len();
    let current = state.current_step().unwrap_or("(no such step)");
    Some(format!(
        "Procedure ({total} steps): current step {} -> {current}. Follow the steps in order.",
        state.procedure_step + 1
    ))
}

/// Build the message list passed to the provider for `state`.
pub fn effective_messages(state: &ConversationState) -> Vec<Message> {
    let mut messages = Vec::with_capacity(state.messages.len() + 3);

    if let Some(system) = state.system.as_deref().filter(|s| !s.is_empty()) {
        messages.push(Message::system(system));
    }
    if let Some(block) = render_context_block(state) {
        messages.push(Message::system(block));
    }
    if let Some(guide) = render_procedure_guide(state) {
        messages.push(Message::system(guide));
    }
    messages.extend(state.messages.iter().cloned());
    messages
}
