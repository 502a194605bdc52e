//! Name-to-index lookup for I/O slots.
//!
//! The core addresses slots by integer index everywhere; a scheme is an
//! optional collaborator consulted once, before dispatch, to turn a
//! name into an index.

/// Ordered slot names for one side of a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoScheme {
    names: Vec<String>,
}

impl IoScheme {
    /// Scheme from an ordered list of names; position is the slot
    /// index.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        IoScheme {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of named slots.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a named slot, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Name of a slot index, if within range.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}
