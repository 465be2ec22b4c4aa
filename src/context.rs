//! Per-call serialization context
// (c) 2025 Ross Younger
//!
//! A [`Context`] is created fresh for every top-level serialize or
//! deserialize call and threaded through every converter invocation. It
//! carries the nesting depth and its cap, the cancellation signal, a keyed
//! user-state map with copy-on-write semantics, and the declared-type stack
//! used to suppress redundant union framing. Converters keep no state of
//! their own; anything per-call lives here.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SerializerConfig;
use crate::error::{Error, Result};

type UserState = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Scratch tables for reference preservation, allocated lazily on first
/// shared-reference encounter.
#[derive(Clone, Default)]
pub(crate) struct ReferenceTables {
    /// Serialize side: pointer identity -> assigned dense id
    pub(crate) assigned: HashMap<usize, u32>,
    /// Serialize side: pointers currently being written (cycle detection)
    pub(crate) writing: Vec<usize>,
    /// Deserialize side: dense id -> resolved shared value
    pub(crate) resolved: HashMap<u32, Arc<dyn Any + Send + Sync>>,
    /// Next dense identity to assign
    pub(crate) next_id: u32,
}

/// Per-call state bag passed by reference into every converter call.
#[derive(Clone)]
pub struct Context {
    depth: usize,
    max_depth: usize,
    cancel: CancellationToken,
    state: Arc<UserState>,
    declared: Vec<TypeId>,
    pub(crate) references: Option<Box<ReferenceTables>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("state_entries", &self.state.len())
            .finish()
    }
}

impl Context {
    /// Creates a context for one top-level call
    #[must_use]
    pub(crate) fn for_call(config: &SerializerConfig, cancel: CancellationToken) -> Self {
        Self {
            depth: 0,
            max_depth: config.max_depth,
            cancel,
            state: Arc::clone(&config.starting_state),
            declared: Vec::new(),
            references: None,
        }
    }

    /// Creates a standalone context, mainly useful for driving converters
    /// directly in tests or custom integrations
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            cancel: CancellationToken::new(),
            state: Arc::new(HashMap::new()),
            declared: Vec::new(),
            references: None,
        }
    }

    /// Current nesting depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The configured nesting limit
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Steps into a nested structure.
    ///
    /// Every composite converter calls this on entry. It enforces the depth
    /// cap and probes the cancellation signal, the two per-step checks the
    /// resource model requires.
    pub fn enter(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Error::depth_exceeded(self.max_depth));
        }
        Ok(())
    }

    /// Steps back out of a nested structure
    pub fn leave(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
    }

    /// Probes the cancellation signal without changing depth
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        Ok(())
    }

    /// The cancellation token for this call
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetches a typed entry from the user-state map
    #[must_use]
    pub fn state<S: Any + Send + Sync>(&self, key: &str) -> Option<Arc<S>> {
        self.state
            .get(key)
            .cloned()
            .and_then(|any| any.downcast::<S>().ok())
    }

    /// Inserts a typed entry into the user-state map.
    ///
    /// The map is copy-on-write: if the underlying storage is shared with
    /// an outer frame's fork, it is cloned before mutation, so mutations
    /// made by callees through a [fork](Self::fork) never leak upward.
    pub fn set_state<S: Any + Send + Sync>(&mut self, key: impl Into<String>, value: Arc<S>) {
        let map = Arc::make_mut(&mut self.state);
        let _ = map.insert(key.into(), value as Arc<dyn Any + Send + Sync>);
    }

    /// A copy of this context sharing the user-state storage until either
    /// side writes to it
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Reports a non-fatal condition through the diagnostic channel
    pub fn report_warning(&self, message: &str) {
        tracing::warn!(depth = self.depth, "{message}");
    }

    /// Pushes a declared type onto the polymorphism stack. Returns false if
    /// the type is already the innermost frame, meaning framing for it
    /// would be redundant at this site.
    pub(crate) fn push_declared(&mut self, id: TypeId) -> bool {
        if self.declared.last() == Some(&id) {
            return false;
        }
        self.declared.push(id);
        true
    }

    /// Pops the innermost declared-type frame
    pub(crate) fn pop_declared(&mut self) {
        let _ = self.declared.pop();
    }

    /// The reference tables, allocated on first use
    pub(crate) fn references(&mut self) -> &mut ReferenceTables {
        self.references.get_or_insert_with(Box::default)
    }
}
