//! C ABI for embedding hosts (JS engines, C/C++ runtimes).
//! Everything crosses as C strings: op names in, JSON envelopes out.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;

use apphost_core::dispatch::{call_json, envelope};
use apphost_core::{client_js, AppHostAdapter, AppHostError, Keypair};

use crate::config;
use crate::node::TcpStack;
use crate::protocol::PROTOCOL_VERSION;

type Host = AppHostAdapter<TcpStack>;

fn into_c_string(s: String) -> *mut c_char {
    CString::new(s)
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Returns the node protocol version.
#[no_mangle]
pub extern "C" fn apphost_protocol_version() -> u8 {
    PROTOCOL_VERSION
}

/// Start a node and wrap it in an adapter. `config_path` may be null to use the default
/// config search. Returns opaque handle or null on failure.
#[no_mangle]
pub extern "C" fn apphost_create(config_path: *const c_char) -> *mut c_void {
    let config = if config_path.is_null() {
        config::load()
    } else {
        let path = match unsafe { CStr::from_ptr(config_path) }.to_str() {
            Ok(p) => p,
            Err(_) => return ptr::null_mut(),
        };
        match config::load_from(Path::new(path)) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "apphost_create: config rejected");
                return ptr::null_mut();
            }
        }
    };
    match TcpStack::start(&config, Keypair::generate()) {
        Ok(stack) => Box::into_raw(Box::new(Host::new(stack))) as *mut c_void,
        Err(e) => {
            tracing::warn!(error = %e, "apphost_create: node failed to start");
            ptr::null_mut()
        }
    }
}

/// Shut the adapter down (closing every listener and stream) and free it. No-op if h is null.
#[no_mangle]
pub extern "C" fn apphost_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let host = unsafe { Box::from_raw(h as *mut Host) };
    host.shutdown();
}

/// Run one flat operation. `args_json` is a JSON array (null means no arguments).
/// Returns `{"ok": ...}` or `{"error": {"kind", "message"}}`; free with `apphost_string_free`.
/// Returns null only if h or op is null. Safe to call from several threads at once.
#[no_mangle]
pub extern "C" fn apphost_call(
    h: *mut c_void,
    op: *const c_char,
    args_json: *const c_char,
) -> *mut c_char {
    if h.is_null() || op.is_null() {
        return ptr::null_mut();
    }
    let host = unsafe { &*(h as *const Host) };
    let result = match unsafe { CStr::from_ptr(op) }.to_str() {
        Ok(op) => {
            let args = if args_json.is_null() {
                Ok("")
            } else {
                unsafe { CStr::from_ptr(args_json) }.to_str()
            };
            match args {
                Ok(args) => call_json(host, op, args),
                Err(_) => Err(AppHostError::MalformedInput(
                    "arguments are not UTF-8".to_string(),
                )),
            }
        }
        Err(_) => Err(AppHostError::MalformedInput(
            "operation name is not UTF-8".to_string(),
        )),
    };
    into_c_string(envelope(result).to_string())
}

/// JS client glue. Free with `apphost_string_free`.
#[no_mangle]
pub extern "C" fn apphost_client_js() -> *mut c_char {
    into_c_string(client_js().to_string())
}

/// Free a string returned by this library. No-op if s is null.
#[no_mangle]
pub extern "C" fn apphost_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(s) });
}
