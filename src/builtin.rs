//! The patch set shipped inside the binary.
//!
//! Running `aura-patcher` with no arguments applies this set: it hides the
//! message button and the messages panel of `MainForm.jsx` from teachers.

use crate::config::{load_from_str, ConfigError, PatchSet};

/// Name of the embedded patch set.
pub const HIDE_TEACHER_MESSAGES: &str = "hide-teacher-messages";

const HIDE_TEACHER_MESSAGES_TOML: &str = include_str!("../patches/hide-teacher-messages.toml");

/// Parse the embedded "hide teacher messages" patch set.
pub fn hide_teacher_messages() -> Result<PatchSet, ConfigError> {
    load_from_str(HIDE_TEACHER_MESSAGES_TOML)
}
