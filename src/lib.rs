//! Workspace root. Re-exports the [`relaygraph`] facade so the integration
//! and property tests under `tests/` exercise the same surface users see.

pub use relaygraph::*;
