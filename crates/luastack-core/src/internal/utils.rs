use crate::ffi;
use std::any::Any;
use std::os::raw::c_int;
use std::slice;

/// Copies the bytes of the string at `index`.
///
/// The value must already be a string; numbers are converted in place by
/// `lua_tolstring`, so callers coerce them on a copy first.
pub(crate) unsafe fn read_bytes(state: *mut ffi::lua_State, index: c_int) -> Vec<u8> {
    let mut len = 0usize;
    let ptr = unsafe { ffi::lua_tolstring(state, index, &mut len) };
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    unsafe { slice::from_raw_parts(ptr as *const u8, len) }.to_vec()
}

pub(crate) unsafe fn push_bytes(state: *mut ffi::lua_State, bytes: &[u8]) {
    unsafe { ffi::lua_pushlstring(state, bytes.as_ptr() as *const _, bytes.len()) };
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "native function panicked".to_string()
    }
}
