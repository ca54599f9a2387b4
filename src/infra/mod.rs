// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence concerns shared by several layers:
//
//   checkpoint.rs — Saving and restoring model weights
//                   Named MessagePack (gzip) weights plus a JSON
//                   manifest, written atomically. Also saves and
//                   loads TrainConfig so `evaluate` can rebuild
//                   the model.
//
//   summary.rs    — Scalar summary streams
//                   Appends (step, name, value) rows to CSV for
//                   the train and test curves.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and restoring
pub mod checkpoint;

/// Append-only scalar summary writer
pub mod summary;
