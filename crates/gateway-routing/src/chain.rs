//! Priority chains.

use gateway_config::ModelTarget;

/// The ordered, per-session sequence of models to attempt.
///
/// The entries never change after construction; only the position moves,
/// and only forward, when a step fails over.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityChain {
    entries: Vec<ModelTarget>,
    main_len: usize,
    offset: usize,
    position: usize,
}

impl PriorityChain {
    /// Build a chain from resolved main and fallback segments, rotating main left by `offset`
    #[must_use]
    pub fn new(mut main: Vec<ModelTarget>, fallbacks: Vec<ModelTarget>, offset: usize) -> Self {
        let main_len = main.len();
        let offset = if main_len == 0 { 0 } else { offset % main_len };
        main.rotate_left(offset);
        main.extend(fallbacks);
        Self {
            entries: main,
            main_len,
            offset,
            position: 0,
        }
    }

    /// All entries in attempt order
    #[must_use]
    pub fn entries(&self) -> &[ModelTarget] {
        &self.entries
    }

    /// Length of the rotated main segment
    #[must_use]
    pub fn main_len(&self) -> usize {
        self.main_len
    }

    /// Rotation applied to the main segment
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Current position
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Entry at the current position, `None` once exhausted
    #[must_use]
    pub fn current(&self) -> Option<&ModelTarget> {
        self.entries.get(self.position)
    }

    /// Move to the next entry; returns the new current entry
    pub fn advance(&mut self) -> Option<&ModelTarget> {
        if self.position < self.entries.len() {
            self.position += 1;
        }
        self.current()
    }

    /// Whether every entry has been given up on
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.entries.len()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain has no entries at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
