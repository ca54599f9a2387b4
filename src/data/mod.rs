// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw u8 arrays to tensor batches.
//
//   IDX files / synthetic generator
//       │
//       ▼
//   IdxLoader / SyntheticSource → RawSplits (u8 pixels, u8 labels)
//       │
//       ▼
//   Preprocessor   → validate, reshape NHWC, normalise, one-hot
//       │
//       ▼
//   ImageDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher   → stacks samples into [B,H,W,C] / [B,K] tensors
//       │
//       ▼
//   DataLoader     → shuffled batches, reshuffled every traversal
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads MNIST IDX files from a directory
pub mod loader;

/// Seeded random images for smoke runs
pub mod synthetic;

/// Shape validation, normalisation and one-hot encoding
pub mod preprocessor;

/// Implements Burn's Dataset trait for image samples
pub mod dataset;

/// Implements Burn's Batcher trait and builds shuffled loaders
pub mod batcher;
