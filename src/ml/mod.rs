// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Network definitions, loss/metrics and the training loop.
//
//   efficientnet.rs — EfficientNet-B0 topology scaled by width
//                     and depth coefficients
//                     • stem conv + batch norm
//                     • MBConv blocks with squeeze-excite
//                     • 1x1 head conv, global pooling
//                     • dropout + linear classifier
//
//   classifier.rs   — ImageClassifier trait and the
//                     transfer-learning variant
//
//   params.rs       — Parameter count report
//
//   metrics.rs      — Cross-entropy, accuracy, evaluation pass
//
//   trainer.rs      — Training context and epoch loop
//                     forward, loss, backward, Adam step,
//                     per-epoch evaluation and checkpoints
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Tan & Le (2019) EfficientNet

/// EfficientNet architecture
pub mod efficientnet;

/// Classifier capability trait and transfer-learning head
pub mod classifier;

/// Parameter reporter
pub mod params;

/// Loss, accuracy and evaluation
pub mod metrics;

/// Training loop
pub mod trainer;
