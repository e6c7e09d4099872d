//! Configuration.
//!
//! Two files, both JSON:
//! 1. **Registry** - `~/.task-store/config.json`: known projects and the default one
//! 2. **Project settings** - `project.json` under the `config` resource location
//!    (central per-project directory, with the legacy `<checkout>/.tasks/` as fallback)
//!
//! ## Environment Variables
//! - `TASK_STORE_ROOT` - Project root used when the caller passes none

mod loader;
mod types;

pub use loader::{CONFIG_FILE, SETTINGS_FILE};
pub use types::*;
