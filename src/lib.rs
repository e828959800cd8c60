//! Aura Patcher: literal snippet patching for the Project Aura client
//!
//! Reads one target file, runs an ordered list of exact substring
//! replacements against it, and writes the result back. The built-in patch
//! set gates the message button and messages panel of `MainForm.jsx` on
//! `role !== 'teacher'`.
//!
//! # Architecture
//!
//! Every patch set compiles down to a single primitive: [`Substitution`], an
//! exact literal replacement of every non-overlapping occurrence. The
//! [`Patcher`] threads an immutable [`Document`] through the substitutions in
//! order and writes the final value once.
//!
//! # Safety
//!
//! - Atomic file writes (tempfile + fsync + rename), permissions preserved
//! - Concurrent modification detection before write
//! - Workspace boundary enforcement for workspace-relative targets
//! - Idempotent: a second run finds nothing left to replace
//!
//! # Example
//!
//! ```no_run
//! use aura_patcher::{Patcher, Substitution};
//!
//! let patcher = Patcher::new(
//!     "client/src/App.jsx",
//!     vec![Substitution::new("gate", "<Panel />", "{ok && <Panel />}")],
//! );
//!
//! match patcher.apply() {
//!     Ok(report) => println!("{}", report.confirmation()),
//!     Err(e) => eprintln!("Patch failed: {}", e),
//! }
//! ```

pub mod builtin;
pub mod config;
pub mod document;
pub mod edit;
pub mod patcher;
pub mod safety;

// Re-exports
pub use config::{load_all, load_from_path, load_from_str, ConfigError, Metadata, PatchSet};
pub use document::Document;
pub use edit::{atomic_write, EditError, Substitution};
pub use patcher::{PatchError, PatchReport, PatchStatus, Patcher, StepReport, Transformation};
pub use safety::{SafetyError, WorkspaceGuard};
