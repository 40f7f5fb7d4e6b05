//! Global ONNX Runtime initialization.
//!
//! Call [`initialize_ort`] once at startup, before the backbone session is
//! built. Accelerators enabled through the `cuda`, `coreml` or `directml`
//! features are registered when present; CPU is always the final fallback.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[allow(unused_imports)]
use ort::execution_providers::{ExecutionProvider, ExecutionProviderDispatch};

static ORT_INITIALIZED: AtomicBool = AtomicBool::new(false);
static EP_INFO: RwLock<Option<ExecutionProviderInfo>> = RwLock::new(None);

/// Execution providers registered by [`initialize_ort`]
#[derive(Debug, Clone, Default)]
pub struct ExecutionProviderInfo {
    /// In priority order, always ending with `CPU`
    pub active_providers: Vec<String>,
    pub accelerated: bool,
    pub warnings: Vec<String>,
}

/// Initialize ONNX Runtime. Later calls return the cached result.
pub fn initialize_ort() -> ExecutionProviderInfo {
    if ORT_INITIALIZED.swap(true, Ordering::SeqCst) {
        return get_ep_info().unwrap_or_default();
    }

    let info = do_initialize_ort();
    if let Ok(mut guard) = EP_INFO.write() {
        *guard = Some(info.clone());
    }
    info
}

pub fn is_initialized() -> bool {
    ORT_INITIALIZED.load(Ordering::SeqCst)
}

pub fn get_ep_info() -> Option<ExecutionProviderInfo> {
    if !is_initialized() {
        return None;
    }
    EP_INFO.read().ok().and_then(|guard| guard.clone())
}

#[allow(unused_mut)]
fn do_initialize_ort() -> ExecutionProviderInfo {
    let mut active_providers: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut eps: Vec<ExecutionProviderDispatch> = Vec::new();

    #[cfg(feature = "cuda")]
    {
        let ep = ort::execution_providers::CUDAExecutionProvider::default();
        if ep.is_available().unwrap_or(false) {
            tracing::info!("CUDA execution provider available");
            eps.push(ep.build());
            active_providers.push("CUDA".to_string());
        } else {
            let msg = "CUDA feature enabled but runtime not available";
            tracing::warn!("{}", msg);
            warnings.push(msg.to_string());
        }
    }

    #[cfg(feature = "coreml")]
    {
        let ep = ort::execution_providers::CoreMLExecutionProvider::default();
        if ep.is_available().unwrap_or(false) {
            tracing::info!("CoreML execution provider available");
            eps.push(ep.build());
            active_providers.push("CoreML".to_string());
        } else {
            let msg = "CoreML feature enabled but not on Apple platform";
            tracing::warn!("{}", msg);
            warnings.push(msg.to_string());
        }
    }

    #[cfg(feature = "directml")]
    {
        let ep = ort::execution_providers::DirectMLExecutionProvider::default();
        if ep.is_available().unwrap_or(false) {
            tracing::info!("DirectML execution provider available");
            eps.push(ep.build());
            active_providers.push("DirectML".to_string());
        } else {
            let msg = "DirectML feature enabled but not on Windows";
            tracing::warn!("{}", msg);
            warnings.push(msg.to_string());
        }
    }

    active_providers.push("CPU".to_string());
    let accelerated = !eps.is_empty();

    if eps.is_empty() {
        tracing::info!("No GPU/NPU acceleration available, using CPU");
        let _ = ort::init().commit();
    } else {
        tracing::info!(
            "Initializing ORT with execution providers: {:?}",
            active_providers
        );
        let _ = ort::init().with_execution_providers(eps).commit();
    }

    ExecutionProviderInfo {
        active_providers,
        accelerated,
        warnings,
    }
}
