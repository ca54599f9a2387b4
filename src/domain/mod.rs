// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe the training problem.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Everything here can be unit tested without a GPU and
// without touching the filesystem.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Raw u8 image arrays as they come out of a dataset source
pub mod image_set;

// The monotonic training step counter
pub mod step;

// Core abstractions (traits) that other layers implement
pub mod traits;
