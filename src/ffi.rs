//! C FFI exports for native hosts.
//!
//! These functions provide a C-compatible interface to the pure detection and
//! resolution logic. All functions use JSON strings for input/output to
//! simplify marshalling.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use crate::conflict::{ConflictDetector, DetectInput};
use crate::merge::{resolve_conflict, ResolveInput};

/// Compare a local and a remote record.
///
/// # Safety
///
/// - `input_json` must be a valid null-terminated C string
/// - The returned pointer must be freed by calling `free_string`
///
/// # Returns
///
/// A null-terminated C string containing the JSON result (Detection).
/// Returns null if the input is null or not UTF-8.
#[no_mangle]
pub unsafe extern "C" fn detect_conflicts_ffi(input_json: *const c_char) -> *mut c_char {
    let Some(input) = read_input(input_json) else {
        return ptr::null_mut();
    };

    let input: DetectInput = match serde_json::from_str(input) {
        Ok(i) => i,
        Err(e) => {
            return create_error_response(&format!("Failed to parse input: {}", e));
        }
    };

    let detection = ConflictDetector::new(input.policy).detect(&input.local, &input.remote);

    match serde_json::to_string(&detection) {
        Ok(json) => string_to_c_char(json),
        Err(e) => create_error_response(&format!("Failed to serialize output: {}", e)),
    }
}

/// Resolve a conflict with the given strategy.
///
/// # Safety
///
/// - `input_json` must be a valid null-terminated C string
/// - The returned pointer must be freed by calling `free_string`
///
/// # Returns
///
/// A null-terminated C string containing the JSON result (ResolveOutput).
/// Returns null if the input is null or not UTF-8.
#[no_mangle]
pub unsafe extern "C" fn resolve_conflict_ffi(input_json: *const c_char) -> *mut c_char {
    let Some(input) = read_input(input_json) else {
        return ptr::null_mut();
    };

    let input: ResolveInput = match serde_json::from_str(input) {
        Ok(i) => i,
        Err(e) => {
            return create_error_response(&format!("Failed to parse input: {}", e));
        }
    };

    match serde_json::to_string(&resolve_conflict(input)) {
        Ok(json) => string_to_c_char(json),
        Err(e) => create_error_response(&format!("Failed to serialize output: {}", e)),
    }
}

/// Free a string that was allocated by Rust.
///
/// # Safety
///
/// - `s` must be a pointer that was returned by one of the FFI functions
/// - This function must only be called once per pointer
/// - After calling this function, the pointer is invalid
#[no_mangle]
pub unsafe extern "C" fn free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Borrow a C string as UTF-8, `None` for null or invalid input.
///
/// # Safety
///
/// `input` must be null or a valid null-terminated C string.
unsafe fn read_input<'a>(input: *const c_char) -> Option<&'a str> {
    if input.is_null() {
        return None;
    }
    CStr::from_ptr(input).to_str().ok()
}

fn string_to_c_char(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn create_error_response(message: &str) -> *mut c_char {
    let body = serde_json::json!({ "success": false, "error": message });
    string_to_c_char(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    unsafe fn take_json(result: *mut c_char) -> Value {
        assert!(!result.is_null());
        let json = CStr::from_ptr(result).to_str().unwrap().to_string();
        free_string(result);
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_null_input() {
        unsafe {
            assert!(detect_conflicts_ffi(ptr::null()).is_null());
            assert!(resolve_conflict_ffi(ptr::null()).is_null());
        }
    }

    #[test]
    fn test_invalid_json_input() {
        let invalid_json = CString::new("not valid json").unwrap();
        unsafe {
            let output = take_json(detect_conflicts_ffi(invalid_json.as_ptr()));
            assert_eq!(output["success"], false);
            assert!(output["error"].as_str().unwrap().starts_with("Failed to parse input"));
        }
    }

    #[test]
    fn test_detect_progression_gap() {
        let input = CString::new(
            r#"{
                "local": {"progression": {"level": 5, "xp": 800}},
                "remote": {"progression": {"level": 3, "xp": 100}}
            }"#,
        )
        .unwrap();
        unsafe {
            let output = take_json(detect_conflicts_ffi(input.as_ptr()));
            assert_eq!(output["auto_mergeable"], false);
            assert_eq!(output["divergences"][0]["kind"], "progression");
        }
    }

    #[test]
    fn test_resolve_merge_unions_achievements() {
        let input = CString::new(
            r#"{
                "local": {"achievements": [{"id": "a1"}]},
                "remote": {"achievements": [{"id": "a2"}]},
                "strategy": "merge"
            }"#,
        )
        .unwrap();
        unsafe {
            let output = take_json(resolve_conflict_ffi(input.as_ptr()));
            assert_eq!(output["success"], true);
            assert_eq!(output["record"]["achievements"].as_array().unwrap().len(), 2);
        }
    }
}
