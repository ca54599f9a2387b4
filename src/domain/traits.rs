// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer asks for data through this trait and
// never cares where the arrays came from:
//   - IdxLoader       → MNIST IDX files on disk
//   - SyntheticSource → seeded random images (smoke runs, tests)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::image_set::RawSplits;

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Any component that can produce raw train/test image arrays.
pub trait ImageSource {
    /// Load both splits. Missing or malformed data is an error.
    fn load_splits(&self) -> Result<RawSplits>;
}
