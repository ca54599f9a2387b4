// ============================================================
// Layer 5 — Parameter Reporter
// ============================================================
// Counts every parameter scalar in a module tree and prints
//
//   Total parameters of the net: 4019850 == 4.02M
//
// Burn's Module::num_params walks each Param once, so shared
// submodules are not double counted. Frozen parameters are
// still parameters and are included.

use burn::{
    backend::{ndarray::NdArrayDevice, NdArray},
    prelude::*,
};

use crate::application::train_use_case::{ModelChoice, TrainConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterReport {
    pub total:    usize,
    /// total / 1e6, rounded to two decimals
    pub millions: f64,
}

pub fn count_parameters<B: Backend, M: Module<B>>(model: &M) -> ParameterReport {
    let total    = model.num_params();
    let millions = (total as f64 / 1e6 * 100.0).round() / 100.0;
    ParameterReport { total, millions }
}

/// Count and print. Returns the report for callers that want it.
pub fn report_parameters<B: Backend, M: Module<B>>(model: &M) -> ParameterReport {
    let report = count_parameters::<B, M>(model);
    println!(
        "Total parameters of the net: {} == {:.2}M",
        report.total, report.millions
    );
    tracing::debug!("Parameter count: {}", report.total);
    report
}

/// Build the configured network on the CPU and report its size.
/// The transfer variant is built without loading pretrained weights.
pub fn report_configured(cfg: &TrainConfig) -> ParameterReport {
    let device = NdArrayDevice::Cpu;
    match cfg.model_choice() {
        ModelChoice::Scratch(model_cfg) => {
            report_parameters::<NdArray, _>(&model_cfg.init::<NdArray>(&device))
        }
        ModelChoice::Transfer { config, .. } => {
            report_parameters::<NdArray, _>(&config.init_untrained::<NdArray>(&device))
        }
    }
}
