//! Conversation state: the record threaded through every turn.
//!
//! Besides the message history, a thread carries four knowledge buckets
//! (policies, facts, instructions, examples), a priority permutation over them,
//! and a merged `context` view that is always recomputed from the buckets.
//!
//! # Merge order
//!
//! Buckets are ordered by their index in `context_priority`. A bucket whose
//! name is missing from the list ranks after every listed one, and ties keep
//! the default order (policies, facts, instructions, examples). The merged
//! view concatenates the buckets in that order, skipping any value already
//! taken from an earlier bucket. Equality is exact string equality.

use crate::error::TurnError;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rank given to bucket names absent from the priority list.
const UNRANKED: usize = 999;

/// One of the four knowledge categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    Policies,
    Facts,
    Instructions,
    Examples,
}

impl BucketKind {
    /// Every bucket, in default priority order.
    pub const ALL: [BucketKind; 4] = [
        BucketKind::Policies,
        BucketKind::Facts,
        BucketKind::Instructions,
        BucketKind::Examples,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policies => "policies",
            Self::Facts => "facts",
            Self::Instructions => "instructions",
            Self::Examples => "examples",
        }
    }

    /// Heading used when rendering the bucket.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Policies => "Policies",
            Self::Facts => "Facts",
            Self::Instructions => "Instructions",
            Self::Examples => "Examples",
        }
    }
}

impl FromStr for BucketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown context bucket '{s}'"))
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The default priority list, as stored on a fresh thread.
pub fn default_priority() -> Vec<String> {
    BucketKind::ALL.iter().map(|k| k.as_str().to_string()).collect()
}

/// Order the four buckets by a priority list.
pub fn priority_order(priority: &[String]) -> [BucketKind; 4] {
    let rank = |kind: &BucketKind| {
        priority
            .iter()
            .position(|name| name == kind.as_str())
            .unwrap_or(UNRANKED)
    };
    let mut kinds = BucketKind::ALL;
    // slice::sort_by_key is stable
    kinds.sort_by_key(rank);
    kinds
}

/// An insertion-ordered set of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct OrderedSet(Vec<String>);

impl OrderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item` unless an equal string is already present.
    ///
    /// Returns `true` if the set grew.
    pub fn insert(&mut self, item: impl Into<String>) -> bool {
        let item = item.into();
        if self.contains(&item) {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn contains(&self, item: &str) -> bool {
        self.0.iter().any(|existing| existing == item)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for OrderedSet {
    fn from(items: Vec<String>) -> Self {
        items.into_iter().collect()
    }
}

impl From<OrderedSet> for Vec<String> {
    fn from(set: OrderedSet) -> Self {
        set.0
    }
}

impl FromIterator<String> for OrderedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = OrderedSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'a> IntoIterator for &'a OrderedSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The four knowledge buckets of a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBuckets {
    #[serde(rename = "context_policies", default)]
    pub policies: OrderedSet,
    #[serde(rename = "context_facts", default)]
    pub facts: OrderedSet,
    #[serde(rename = "context_instructions", default)]
    pub instructions: OrderedSet,
    #[serde(rename = "context_examples", default)]
    pub examples: OrderedSet,
}

impl ContextBuckets {
    pub fn get(&self, kind: BucketKind) -> &OrderedSet {
        match kind {
            BucketKind::Policies => &self.policies,
            BucketKind::Facts => &self.facts,
            BucketKind::Instructions => &self.instructions,
            BucketKind::Examples => &self.examples,
        }
    }

    pub fn get_mut(&mut self, kind: BucketKind) -> &mut OrderedSet {
        match kind {
            BucketKind::Policies => &mut self.policies,
            BucketKind::Facts => &mut self.facts,
            BucketKind::Instructions => &mut self.instructions,
            BucketKind::Examples => &mut self.examples,
        }
    }

    /// True when all four buckets are empty.
    pub fn is_empty(&self) -> bool {
        BucketKind::ALL.iter().all(|k| self.get(*k).is_empty())
    }

    /// Duplicate-free concatenation of the buckets in priority order.
    pub fn merged(&self, priority: &[String]) -> Vec<String> {
        let mut merged = OrderedSet::new();
        for kind in priority_order(priority) {
            for item in self.get(kind) {
                merged.insert(item.as_str());
            }
        }
        merged.into()
    }
}

/// The versioned record for one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only history
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Directive set at seed time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(flatten)]
    pub buckets: ContextBuckets,

    /// Bucket names in render/merge order
    #[serde(default = "default_priority")]
    pub context_priority: Vec<String>,

    /// Merged view, derived from `buckets` and `context_priority`
    #[serde(default)]
    pub context: Vec<String>,

    #[serde(default)]
    pub procedure_enabled: bool,

    #[serde(default)]
    pub procedure_steps: Vec<String>,

    /// Zero-based cursor into `procedure_steps`
    #[serde(default)]
    pub procedure_step: usize,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            system: None,
            buckets: ContextBuckets::default(),
            context_priority: default_priority(),
            context: Vec::new(),
            procedure_enabled: false,
            procedure_steps: Vec::new(),
            procedure_step: 0,
        }
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The four buckets in this thread's priority order.
    pub fn bucket_order(&self) -> [BucketKind; 4] {
        priority_order(&self.context_priority)
    }

    /// Rebuild the merged `context` from the buckets.
    pub fn recompute_context(&mut self) {
        self.context = self.buckets.merged(&self.context_priority);
    }

    /// Whether procedure guidance should be rendered.
    pub fn procedure_active(&self) -> bool {
        self.procedure_enabled && !self.procedure_steps.is_empty()
    }

    /// Text of the step under the cursor, if the cursor is in range.
    pub fn current_step(&self) -> Option<&str> {
        self.procedure_steps
            .get(self.procedure_step)
            .map(String::as_str)
    }

    /// Move the cursor forward one step, stopping at the last step.
    pub fn advance_procedure(&mut self) -> usize {
        if self.procedure_step + 1 < self.procedure_steps.len() {
            self.procedure_step += 1;
        }
        self.procedure_step
    }

    /// Move the cursor back one step, stopping at the first step.
    pub fn rewind_procedure(&mut self) -> usize {
        self.procedure_step = self.procedure_step.saturating_sub(1);
        self.procedure_step
    }

    /// Put the cursor on a specific zero-based step.
    pub fn set_procedure_step(&mut self, step: usize) -> Result<(), TurnError> {
        if step >= self.procedure_steps.len() {
            return Err(TurnError::StepOutOfRange {
                requested: step,
                total: self.procedure_steps.len(),
            });
        }
        self.procedure_step = step;
        Ok(())
    }

    /// Overwrite the fields a seed provides, leaving history alone.
    pub fn apply_seed(&mut self, seed: &SeedState) {
        if let Some(system) = &seed.system {
            self.system = Some(system.clone());
        }
        for kind in BucketKind::ALL {
            let items = seed.bucket(kind);
            if !items.is_empty() {
                *self.buckets.get_mut(kind) = items.iter().cloned().collect();
            }
        }
        if !seed.priority.is_empty() {
            self.context_priority = seed.priority.clone();
        }
        if seed.procedure_enabled {
            self.procedure_enabled = true;
            if !seed.procedure_steps.is_empty() {
                self.procedure_steps = seed.procedure_steps.clone();
                self.procedure_step = 0;
            }
        }
        self.recompute_context();
    }
}

/// Initial values applied to a thread before its first turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedState {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub priority: Vec<String>,
    #[serde(default)]
    pub procedure_enabled: bool,
    #[serde(default)]
    pub procedure_steps: Vec<String>,
}

impl SeedState {
    pub fn bucket(&self, kind: BucketKind) -> &[String] {
        match kind {
            BucketKind::Policies => &self.policies,
            BucketKind::Facts => &self.facts,
            BucketKind::Instructions => &self.instructions,
            BucketKind::Examples => &self.examples,
        }
    }

    /// True when applying this seed would change nothing.
    pub fn is_empty(&self) -> bool {
        self.system.is_none()
            && BucketKind::ALL.iter().all(|k| self.bucket(*k).is_empty())
            && self.priority.is_empty()
            && !self.procedure_enabled
    }
}
