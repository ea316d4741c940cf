//! C FFI bindings for dm-core
//!
//! This crate provides a C-compatible API for use with Qt or other C/C++
//! applications. The front end hands over mod script paths, gets back an
//! opaque merge handle, and reads the merged text plus the JSON report
//! through accessor functions.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

/// Opaque handle to a completed merge
pub struct FfiMergeResult {
    inner: dm_core::MergeOutput,
}

/// Merge a set of mod script paths into one script
///
/// # Safety
/// - `paths` must be a valid pointer to an array of C strings
/// - `count` must be the correct length of the array
/// - `name` may be null for a derived merged-mod name
/// - Returns null on error
#[no_mangle]
pub unsafe extern "C" fn dm_merge_paths(
    paths: *const *const c_char,
    count: usize,
    name: *const c_char,
) -> *mut FfiMergeResult {
    if paths.is_null() || count == 0 {
        return ptr::null_mut();
    }

    let mut sources = Vec::with_capacity(count);
    for i in 0..count {
        let ptr = *paths.add(i);
        if ptr.is_null() {
            return ptr::null_mut();
        }
        let path = match CStr::from_ptr(ptr).to_str() {
            Ok(s) => PathBuf::from(s),
            Err(_) => return ptr::null_mut(),
        };
        let mod_name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => return ptr::null_mut(),
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => return ptr::null_mut(),
        };
        sources.push(dm_core::ModSource::new(mod_name, text));
    }

    let merged_name = if name.is_null() {
        None
    } else {
        CStr::from_ptr(name).to_str().ok().map(|s| s.to_string())
    };

    let options = dm_core::MergeOptions {
        name: merged_name,
        ..Default::default()
    };

    match dm_core::merge(sources, &options) {
        Ok(output) => Box::into_raw(Box::new(FfiMergeResult { inner: output })),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a merge result
///
/// # Safety
/// - `result` must be a valid pointer returned by `dm_merge_paths` or null
#[no_mangle]
pub unsafe extern "C" fn dm_free_merge_result(result: *mut FfiMergeResult) {
    if !result.is_null() {
        drop(Box::from_raw(result));
    }
}

/// Get the merged script text
///
/// # Safety
/// - `result` must be a valid pointer returned by `dm_merge_paths`
/// - Caller must free the returned string with `dm_free_string`
#[no_mangle]
pub unsafe extern "C" fn dm_merge_text(result: *const FfiMergeResult) -> *mut c_char {
    if result.is_null() {
        return ptr::null_mut();
    }

    CString::new((*result).inner.text.as_str())
        .ok()
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

/// Get the merge report as a JSON string
///
/// # Safety
/// - `result` must be a valid pointer returned by `dm_merge_paths`
/// - Caller must free the returned string with `dm_free_string`
#[no_mangle]
pub unsafe extern "C" fn dm_merge_report_json(result: *const FfiMergeResult) -> *mut c_char {
    if result.is_null() {
        return ptr::null_mut();
    }

    serde_json::to_string(&(*result).inner.report)
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

/// Get the number of warnings attached to a merge
///
/// # Safety
/// - `result` must be a valid pointer returned by `dm_merge_paths`
#[no_mangle]
pub unsafe extern "C" fn dm_merge_warning_count(result: *const FfiMergeResult) -> usize {
    if result.is_null() {
        return 0;
    }
    (*result).inner.report.warnings.len()
}

/// Get a warning message by index
///
/// # Safety
/// - `result` must be a valid pointer returned by `dm_merge_paths`
/// - Returns null if index is out of bounds
/// - Caller must free the returned string with `dm_free_string`
#[no_mangle]
pub unsafe extern "C" fn dm_merge_warning(
    result: *const FfiMergeResult,
    index: usize,
) -> *mut c_char {
    if result.is_null() {
        return ptr::null_mut();
    }

    let result = &*result;
    result
        .inner
        .report
        .warnings
        .get(index)
        .and_then(|w| CString::new(w.as_str()).ok())
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

/// Free a string returned by other FFI functions
///
/// # Safety
/// - `s` must be a valid pointer returned by a dm_* function or null
#[no_mangle]
pub unsafe extern "C" fn dm_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
