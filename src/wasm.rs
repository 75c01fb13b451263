//! WASM bindings for browser hosts.

use wasm_bindgen::prelude::*;

use crate::conflict::{ConflictDetector, DetectInput, Detection};
use crate::merge::{resolve_conflict, ResolveInput, ResolveOutput};

/// Initialize panic hook for better error messages.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conflict Detection WASM Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// Compare a local and a remote record.
///
/// Takes a JsValue (DetectInput) and returns a JsValue (Detection).
#[wasm_bindgen(js_name = detectConflicts)]
pub fn detect_conflicts_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: DetectInput = serde_wasm_bindgen::from_value(input)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse input: {}", e)))?;

    let detection: Detection =
        ConflictDetector::new(input.policy).detect(&input.local, &input.remote);

    serde_wasm_bindgen::to_value(&detection)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize output: {}", e)))
}

/// Detect conflicts using JSON strings (alternative API).
#[wasm_bindgen(js_name = detectConflictsJson)]
pub fn detect_conflicts_json_js(input_json: &str) -> Result<String, JsValue> {
    crate::conflict::detect_conflicts_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Detection failed: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conflict Resolution WASM Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve a conflict with `local`, `remote` (or `cloud`) or `merge`.
///
/// Takes a JsValue (ResolveInput) and returns a JsValue (ResolveOutput).
#[wasm_bindgen(js_name = resolveConflict)]
pub fn resolve_conflict_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: ResolveInput = serde_wasm_bindgen::from_value(input)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse input: {}", e)))?;

    let output: ResolveOutput = resolve_conflict(input);

    serde_wasm_bindgen::to_value(&output)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize output: {}", e)))
}

/// Resolve a conflict using JSON strings (alternative API).
#[wasm_bindgen(js_name = resolveConflictJson)]
pub fn resolve_conflict_json_js(input_json: &str) -> Result<String, JsValue> {
    crate::merge::resolve_conflict_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Resolution failed: {}", e)))
}
