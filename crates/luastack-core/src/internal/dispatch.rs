use crate::core::error::{BridgeError, BridgeResult};
use crate::core::state::Vm;
use crate::ffi;
use crate::internal::boxed::{self, CALLBACK_METATABLE};
use crate::internal::utils::{panic_message, push_bytes};
use crate::types::callable::{IntoReturn, NativeFunction};
use crate::types::signature::{Frame, Kind};
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use tracing::trace;

/// A native function together with how many of its parameters were
/// captured at creation. Stored boxed in upvalue 1.
pub(crate) struct Bound<K, A, F> {
    pub(crate) function: F,
    pub(crate) captured: usize,
    _marker: PhantomData<fn(K, A)>,
}

impl<K, A, F> Bound<K, A, F> {
    pub(crate) fn new(function: F, captured: usize) -> Self {
        Bound {
            function,
            captured,
            _marker: PhantomData,
        }
    }
}

/// The single entry point Lua calls for every exposed native function.
///
/// Nothing with a destructor is alive in this frame when `lua_error`
/// long-jumps out of it.
pub(crate) unsafe extern "C-unwind" fn dispatch<K, A, F>(state: *mut ffi::lua_State) -> c_int
where
    K: Kind,
    A: 'static,
    F: NativeFunction<K, A>,
{
    match unsafe { enter::<K, A, F>(state) } {
        Some(results) => results,
        None => unsafe { ffi::lua_error(state) },
    }
}

/// Runs the call, catching both errors and panics. On failure the message
/// is left on the stack and `None` is returned.
unsafe fn enter<K, A, F>(state: *mut ffi::lua_State) -> Option<c_int>
where
    K: Kind,
    A: 'static,
    F: NativeFunction<K, A>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let vm = unsafe { Vm::from_callback(state) };
        invoke::<K, A, F>(&vm)
    }));

    let message = match outcome {
        Ok(Ok(results)) => return Some(results),
        Ok(Err(err)) => err.message(),
        Err(payload) => panic_message(payload),
    };
    trace!(%message, "native call failed");
    unsafe {
        // the frame may be full; nothing on it is needed once the call failed
        ffi::lua_settop(state, 0);
        push_bytes(state, message.as_bytes());
    }
    None
}

fn invoke<K, A, F>(vm: &Vm) -> BridgeResult<c_int>
where
    K: Kind,
    A: 'static,
    F: NativeFunction<K, A>,
{
    #[cfg(feature = "profiling")]
    profiling::scope!("dispatch");

    let bound = unsafe {
        boxed::downcast::<Bound<K, A, F>>(vm.as_raw(), ffi::lua_upvalueindex(1), CALLBACK_METATABLE)
    }
    .ok_or_else(|| BridgeError::Runtime("native function storage was released".to_string()))?;

    let frame = Frame::new(F::ARITY, bound.captured, K::TAG.has_receiver());
    trace!(kind = ?K::TAG, arity = F::ARITY, captured = bound.captured, "dispatching native call");

    let output = bound.function.invoke(vm, &frame)?;
    output.push_return(vm)
}
