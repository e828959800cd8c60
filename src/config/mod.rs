pub mod loader;
pub mod schema;

pub use loader::{discover, load_all, load_from_path, load_from_str, ConfigError};
pub use schema::{Metadata, PatchSet, ValidationError, ValidationIssue};
