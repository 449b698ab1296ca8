//! Output files written after a successful cycle.
//!
//! # Submodules
//!
//! - [`json`]: the published working set and per-cycle reports as JSON
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! ├── published.json             # current published set, newest first
//! └── 2025-05-06/
//!     ├── us-software-091500.json
//!     └── us-ai-ml-engineer-093000.json
//! ```

pub mod json;
