//! FFI bindings for handframe
//!
//! This module provides C-compatible functions for driving capture sessions and
//! classify windows from a host application. Landmarks cross the boundary as
//! flat `[x, y, z, x, y, z, ...]` float arrays. Strings returned to the caller
//! are allocated here and must be freed with `handframe_free_string`.
//!
//! Classify mode is exposed as a window handle: the host runs its own model on
//! the flattened window written to its buffer.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use crate::accumulator::DataframeAccumulator;
use crate::config::CaptureSessionConfig;
use crate::encoder::FrameEncoder;
use crate::schema::LandmarkEvent;
use crate::session::{CaptureSession, FrameOutcome};

/// Push status: error, see `handframe_last_error`
pub const HANDFRAME_ERROR: i32 = -1;
/// Push status: landmarks rejected, nothing collected
pub const HANDFRAME_REJECTED: i32 = 0;
/// Push status: frame buffered
pub const HANDFRAME_BUFFERED: i32 = 1;
/// Push status: a dataframe (or window) was completed
pub const HANDFRAME_DATAFRAME: i32 = 2;
/// Push status: the capture session reached its target
pub const HANDFRAME_COMPLETE: i32 = 3;
/// Push status: the capture session was already complete
pub const HANDFRAME_ALREADY_COMPLETE: i32 = 4;
/// Push status: collection is paused, the landmarks were ignored
pub const HANDFRAME_PAUSED: i32 = 5;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Borrow the landmark array and wrap it in an event
unsafe fn landmark_event(values: *const f32, len: usize, image_width: f32) -> Option<LandmarkEvent> {
    let values: &[f32] = if len == 0 {
        &[]
    } else if values.is_null() {
        return None;
    } else {
        slice::from_raw_parts(values, len)
    };

    let image_width = (image_width > 0.0).then_some(image_width);
    Some(LandmarkEvent::from_flat(values, image_width))
}

unsafe fn parse_config(config_json: *const c_char) -> Option<CaptureSessionConfig> {
    let json = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return None;
        }
    };

    match CaptureSessionConfig::from_json(&json) {
        Ok(config) => Some(config),
        Err(e) => {
            set_last_error(&e.to_string());
            None
        }
    }
}

// ============================================================================
// Capture Session API
// ============================================================================

/// Opaque handle to a CaptureSession
pub struct CaptureSessionHandle {
    session: CaptureSession,
}

/// Create a capture session from a JSON configuration.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `handframe_capture_free`.
/// - Returns NULL on error; call `handframe_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_new(
    config_json: *const c_char,
) -> *mut CaptureSessionHandle {
    clear_last_error();

    let Some(config) = parse_config(config_json) else {
        return ptr::null_mut();
    };

    match CaptureSession::new(config) {
        Ok(session) => Box::into_raw(Box::new(CaptureSessionHandle { session })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Feed one landmark set to a capture session.
///
/// `image_width` <= 0 means the width is unknown.
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`.
/// - `values` must point to `len` floats (may be NULL when `len` is 0).
/// - Returns one of the `HANDFRAME_*` status codes.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_push(
    session: *mut CaptureSessionHandle,
    values: *const f32,
    len: usize,
    image_width: f32,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return HANDFRAME_ERROR;
    }
    let handle = &mut *session;

    let Some(event) = landmark_event(values, len, image_width) else {
        set_last_error("Null landmark pointer");
        return HANDFRAME_ERROR;
    };

    match handle.session.ingest(&event.landmarks, event.image_width) {
        FrameOutcome::Rejected(_) => HANDFRAME_REJECTED,
        FrameOutcome::Paused => HANDFRAME_PAUSED,
        FrameOutcome::Buffered { .. } => HANDFRAME_BUFFERED,
        FrameOutcome::DataframeCompleted { .. } => HANDFRAME_DATAFRAME,
        FrameOutcome::SessionCompleted { .. } => HANDFRAME_COMPLETE,
        FrameOutcome::AlreadyComplete => HANDFRAME_ALREADY_COMPLETE,
    }
}

/// Number of completed dataframes, or -1 for a NULL session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_dataframe_count(
    session: *const CaptureSessionHandle,
) -> i64 {
    if session.is_null() {
        return -1;
    }
    (*session).session.dataframes().len() as i64
}

/// Returns 1 if the session reached its target, 0 otherwise.
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_is_complete(
    session: *const CaptureSessionHandle,
) -> i32 {
    if session.is_null() {
        return 0;
    }
    i32::from((*session).session.is_complete())
}

/// Stop collecting frames until `handframe_capture_resume` is called.
///
/// The host drives warmup and cooldown timing through these two calls.
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_pause(session: *mut CaptureSessionHandle) {
    if !session.is_null() {
        (*session).session.gate().close();
    }
}

/// Resume collecting frames. Has no effect on a completed session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_resume(session: *mut CaptureSessionHandle) {
    if !session.is_null() {
        (*session).session.gate().open();
    }
}

/// Export the collected data as upload JSON (`{"<label>": [...]}`).
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`.
/// - Returns a newly allocated string that must be freed with `handframe_free_string`.
/// - Returns NULL on error; call `handframe_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_payload_json(
    session: *const CaptureSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    match (*session).session.payload().to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a capture session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `handframe_capture_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn handframe_capture_free(session: *mut CaptureSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

// ============================================================================
// Classify Window API
// ============================================================================

/// Opaque handle to a sliding classify window
pub struct ClassifyWindowHandle {
    config: CaptureSessionConfig,
    window: DataframeAccumulator,
}

/// Create a sliding window from a JSON configuration.
///
/// Only the layout fields matter; label and target may be omitted as
/// `""` and `0`.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `handframe_window_free`.
/// - Returns NULL on error; call `handframe_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn handframe_window_new(
    config_json: *const c_char,
) -> *mut ClassifyWindowHandle {
    clear_last_error();

    let Some(config) = parse_config(config_json) else {
        return ptr::null_mut();
    };

    if let Err(e) = config.validate_layout() {
        set_last_error(&e.to_string());
        return ptr::null_mut();
    }

    let window = DataframeAccumulator::sliding(config.dataframe_size);
    Box::into_raw(Box::new(ClassifyWindowHandle { config, window }))
}

/// Number of floats in a full window (`dataframe_size * frame_width`).
///
/// # Safety
/// - `window` must be a valid pointer returned by `handframe_window_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn handframe_window_len(window: *const ClassifyWindowHandle) -> usize {
    if window.is_null() {
        return 0;
    }
    let config = &(*window).config;
    config.dataframe_size * config.frame_width()
}

/// Feed one landmark set to a sliding window.
///
/// When the window is full it is written, oldest frame first, to `out` and
/// `HANDFRAME_DATAFRAME` is returned.
///
/// # Safety
/// - `window` must be a valid pointer returned by `handframe_window_new`.
/// - `values` must point to `len` floats (may be NULL when `len` is 0).
/// - `out` must point to `out_len` writable floats, at least `handframe_window_len`.
#[no_mangle]
pub unsafe extern "C" fn handframe_window_push(
    window: *mut ClassifyWindowHandle,
    values: *const f32,
    len: usize,
    image_width: f32,
    out: *mut f32,
    out_len: usize,
) -> i32 {
    clear_last_error();

    if window.is_null() {
        set_last_error("Null window pointer");
        return HANDFRAME_ERROR;
    }
    let handle = &mut *window;

    let required = handle.config.dataframe_size * handle.config.frame_width();
    if out.is_null() || out_len < required {
        set_last_error(&format!("Output buffer must hold {} floats", required));
        return HANDFRAME_ERROR;
    }

    let Some(event) = landmark_event(values, len, image_width) else {
        set_last_error("Null landmark pointer");
        return HANDFRAME_ERROR;
    };

    let frame = match FrameEncoder::prepare(&event.landmarks, &handle.config, event.image_width) {
        Ok(frame) => frame,
        Err(_) => return HANDFRAME_REJECTED,
    };

    match handle.window.push(frame) {
        None => HANDFRAME_BUFFERED,
        Some(full) => {
            let flat = FrameEncoder::flatten(&full);
            slice::from_raw_parts_mut(out, flat.len()).copy_from_slice(&flat);
            HANDFRAME_DATAFRAME
        }
    }
}

/// Free a sliding window.
///
/// # Safety
/// - `window` must be a valid pointer returned by `handframe_window_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn handframe_window_free(window: *mut ClassifyWindowHandle) {
    if !window.is_null() {
        drop(Box::from_raw(window));
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by handframe functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a handframe function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn handframe_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next handframe call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn handframe_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the handframe library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn handframe_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapturePayload;
    use pretty_assertions::assert_eq;

    fn config_json(target: usize, dataframe_size: usize) -> CString {
        CString::new(format!(
            r#"{{"label": "A", "target_sample_count": {}, "dataframe_size": {}, "mode": "default"}}"#,
            target, dataframe_size
        ))
        .unwrap()
    }

    fn hand(value: f32) -> Vec<f32> {
        vec![value; 63]
    }

    fn last_error() -> String {
        unsafe {
            let ptr = handframe_last_error();
            assert!(!ptr.is_null());
            CStr::from_ptr(ptr).to_str().unwrap().to_string()
        }
    }

    #[test]
    fn test_capture_session_lifecycle() {
        unsafe {
            let config = config_json(2, 2);
            let session = handframe_capture_new(config.as_ptr());
            assert!(!session.is_null());

            let values = hand(0.5);
            let statuses: Vec<i32> = (0..5)
                .map(|_| handframe_capture_push(session, values.as_ptr(), values.len(), 0.0))
                .collect();
            assert_eq!(
                statuses,
                vec![
                    HANDFRAME_BUFFERED,
                    HANDFRAME_DATAFRAME,
                    HANDFRAME_BUFFERED,
                    HANDFRAME_COMPLETE,
                    HANDFRAME_ALREADY_COMPLETE
                ]
            );
            assert_eq!(handframe_capture_dataframe_count(session), 2);
            assert_eq!(handframe_capture_is_complete(session), 1);

            let json_ptr = handframe_capture_payload_json(session);
            assert!(!json_ptr.is_null());
            let json = CStr::from_ptr(json_ptr).to_str().unwrap().to_string();
            handframe_free_string(json_ptr);

            let payload = CapturePayload::from_json(&json).unwrap();
            assert_eq!(payload.label, "A");
            assert_eq!(payload.dataframes.len(), 2);
            assert_eq!(payload.dataframes[0][0].len(), 126);

            handframe_capture_free(session);
        }
    }

    #[test]
    fn test_capture_pause_and_resume() {
        unsafe {
            let config = config_json(1, 1);
            let session = handframe_capture_new(config.as_ptr());
            let values = hand(0.5);

            handframe_capture_pause(session);
            assert_eq!(
                handframe_capture_push(session, values.as_ptr(), values.len(), 0.0),
                HANDFRAME_PAUSED
            );
            assert_eq!(handframe_capture_dataframe_count(session), 0);

            handframe_capture_resume(session);
            assert_eq!(
                handframe_capture_push(session, values.as_ptr(), values.len(), 0.0),
                HANDFRAME_COMPLETE
            );

            handframe_capture_free(session);
        }
    }

    #[test]
    fn test_capture_rejects_without_width() {
        unsafe {
            let config = CString::new(r#"{"label": "A", "target_sample_count": 1}"#).unwrap();
            let session = handframe_capture_new(config.as_ptr());
            let values = hand(0.5);

            assert_eq!(
                handframe_capture_push(session, values.as_ptr(), values.len(), 0.0),
                HANDFRAME_REJECTED
            );
            handframe_capture_free(session);
        }
    }

    #[test]
    fn test_invalid_config_sets_error() {
        unsafe {
            let config = CString::new(r#"{"label": "", "target_sample_count": 1}"#).unwrap();
            let session = handframe_capture_new(config.as_ptr());
            assert!(session.is_null());
            assert!(last_error().contains("label"));

            assert_eq!(
                handframe_capture_push(ptr::null_mut(), ptr::null(), 0, 0.0),
                HANDFRAME_ERROR
            );
            assert!(last_error().contains("Null session"));
        }
    }

    #[test]
    fn test_window_push_writes_flattened_window() {
        unsafe {
            let config = CString::new(
                r#"{"label": "", "target_sample_count": 0, "dataframe_size": 2, "mode": "default"}"#,
            )
            .unwrap();
            let window = handframe_window_new(config.as_ptr());
            assert!(!window.is_null());

            let len = handframe_window_len(window);
            assert_eq!(len, 252);
            let mut out = vec![-1.0f32; len];

            let first = hand(0.1);
            let second = hand(0.2);
            assert_eq!(
                handframe_window_push(window, first.as_ptr(), first.len(), 0.0, out.as_mut_ptr(), len),
                HANDFRAME_BUFFERED
            );
            assert_eq!(
                handframe_window_push(window, second.as_ptr(), second.len(), 0.0, out.as_mut_ptr(), len),
                HANDFRAME_DATAFRAME
            );

            assert_eq!(out[0], 0.1);
            assert_eq!(out[63], 0.0);
            assert_eq!(out[126], 0.2);

            assert_eq!(
                handframe_window_push(window, first.as_ptr(), first.len(), 0.0, out.as_mut_ptr(), 10),
                HANDFRAME_ERROR
            );

            handframe_window_free(window);
        }
    }

    #[test]
    fn test_version() {
        unsafe {
            let version = CStr::from_ptr(handframe_version()).to_str().unwrap();
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
        }
    }
}
