//! Scratchpad store
//!
//! The mutable task draft the user builds up before queuing it.

use serde::Serialize;

use super::CoordinatorError;
use crate::events::ScratchpadEdit;

/// Whether the scratchpad holds anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScratchpadState {
    Empty,
    Buffered,
}

/// Current draft and its revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scratchpad {
    content: String,
    revision: u64,
}

impl Scratchpad {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn state(&self) -> ScratchpadState {
        if self.content.trim().is_empty() {
            ScratchpadState::Empty
        } else {
            ScratchpadState::Buffered
        }
    }

    /// Replace the draft
    pub fn set(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.revision += 1;
    }

    /// Append to the draft, on a new line when it already has content
    pub fn append(&mut self, content: &str) {
        let content = content.trim();
        if !self.content.is_empty() && !content.is_empty() {
            self.content.push('\n');
        }
        self.content.push_str(content);
        self.revision += 1;
    }

    /// Replace the first occurrence of `find` with `replace`
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::PatchConflict`] when the anchor is empty or
    /// not present; the draft and revision are left untouched.
    pub fn patch(&mut self, find: &str, replace: &str) -> Result<(), CoordinatorError> {
        if find.is_empty() {
            return Err(CoordinatorError::PatchConflict {
                anchor: String::new(),
            });
        }
        let Some(start) = self.content.find(find) else {
            return Err(CoordinatorError::PatchConflict {
                anchor: find.to_string(),
            });
        };
        self.content.replace_range(start..start + find.len(), replace);
        self.revision += 1;
        Ok(())
    }

    /// Apply any edit
    ///
    /// # Errors
    ///
    /// Propagates [`CoordinatorError::PatchConflict`] from [`Self::patch`]
    pub fn apply(&mut self, edit: &ScratchpadEdit) -> Result<(), CoordinatorError> {
        match edit {
            ScratchpadEdit::Set { content } => {
                self.set(content.clone());
                Ok(())
            }
            ScratchpadEdit::Append { content } => {
                self.append(content);
                Ok(())
            }
            ScratchpadEdit::Patch { find, replace } => self.patch(find, replace),
        }
    }

    /// Empty the draft
    pub fn clear(&mut self) {
        self.content.clear();
        self.revision += 1;
    }

    /// Move the draft out, leaving the scratchpad empty
    pub fn take(&mut self) -> String {
        self.revision += 1;
        std::mem::take(&mut self.content)
    }

    /// Put `restored` back in front of whatever is currently drafted
    pub fn restore(&mut self, restored: &str) {
        let current = std::mem::take(&mut self.content);
        self.content.push_str(restored);
        if !current.is_empty() {
            self.content.push('\n');
            self.content.push_str(&current);
        }
        self.revision += 1;
    }
}
