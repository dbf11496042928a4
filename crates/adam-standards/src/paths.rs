use std::path::PathBuf;

/// Environment variable overriding the specification directory.
pub const SPEC_DIR_ENV_VAR: &str = "ADAM_SPEC_DIR";

/// Default specification directory.
///
/// Checks `ADAM_SPEC_DIR` first, then falls back to the pilot specification
/// shipped in the workspace.
pub fn default_spec_dir() -> PathBuf {
    if let Ok(root) = std::env::var(SPEC_DIR_ENV_VAR) {
        return PathBuf::from(root);
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../specs/adam-pilot")
}
