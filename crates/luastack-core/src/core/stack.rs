use crate::core::error::{BridgeError, BridgeResult};
use crate::core::state::Vm;
use crate::ffi;
use crate::internal::utils::read_bytes;
use crate::types::convert::{FromStack, IntoStack};
use crate::types::enums::ValueType;
use std::os::raw::c_int;
use std::thread;
use tracing::warn;

/// Stateless entry points for the per-type marshaling units.
pub struct Stack;

impl Stack {
    /// Appends exactly one value, growing the stack first if needed.
    pub fn push<T: IntoStack + ?Sized>(vm: &Vm, value: &T) -> BridgeResult<()> {
        Self::reserve(vm, 1)?;
        value.push_to_stack(vm);
        Ok(())
    }

    /// Makes room for `extra` more values above the current top.
    ///
    /// Lua only promises `LUA_MINSTACK` free slots; everything in this
    /// crate that pushes reserves first.
    pub fn reserve(vm: &Vm, extra: c_int) -> BridgeResult<()> {
        if unsafe { ffi::lua_checkstack(vm.as_raw(), extra) } == 0 {
            return Err(BridgeError::StackOverflow {
                extra,
                depth: vm.stack_depth(),
            });
        }
        Ok(())
    }

    /// [`Stack::reserve`] for operations that cannot report an error.
    ///
    /// # Panics
    /// If the stack cannot grow, which only happens past `LUAI_MAXSTACK`
    /// slots or when the allocator fails.
    pub(crate) fn ensure(vm: &Vm, extra: c_int) {
        if let Err(err) = Self::reserve(vm, extra) {
            panic!("{err}");
        }
    }

    /// Reads the value at `index` without touching the stack.
    pub fn get<T: FromStack>(vm: &Vm, index: c_int) -> BridgeResult<T> {
        T::from_stack(vm, index)
    }

    /// Reads the top value and removes it, whether or not the conversion
    /// succeeded.
    pub fn pop<T: FromStack>(vm: &Vm) -> BridgeResult<T> {
        T::pop_from_stack(vm)
    }

    /// Pops `captured` values and pushes a C closure holding them as upvalues.
    pub fn push_closure(vm: &Vm, function: ffi::lua_CFunction, captured: c_int) {
        debug_assert!(vm.stack_depth() >= captured);
        // the closure takes the place of its upvalues; one slot when there are none
        Self::ensure(vm, 1);
        unsafe { ffi::lua_pushcclosure(vm.as_raw(), function, captured) };
    }

    /// The C function at `index`, if the value is one.
    pub fn get_cfunction(vm: &Vm, index: c_int) -> Option<ffi::lua_CFunction> {
        let function: Option<ffi::lua_CFunction> =
            Option::from(unsafe { ffi::lua_tocfunction(vm.as_raw(), index) });
        function
    }

    pub fn depth(vm: &Vm) -> c_int {
        vm.stack_depth()
    }

    pub fn type_at(vm: &Vm, index: c_int) -> ValueType {
        ValueType::from_raw(unsafe { ffi::lua_type(vm.as_raw(), index) })
    }

    /// Renders an error object the way `lua.c` does for uncaught errors.
    pub(crate) fn error_message_at(vm: &Vm, index: c_int) -> String {
        let state = vm.as_raw();
        match Self::type_at(vm, index) {
            ValueType::String | ValueType::Number => unsafe {
                Self::ensure(vm, 1);
                ffi::lua_pushvalue(state, index);
                let bytes = read_bytes(state, -1);
                ffi::lua_pop(state, 1);
                String::from_utf8_lossy(&bytes).into_owned()
            },
            other => format!("(error object is a {} value)", other.name()),
        }
    }

    pub(crate) fn pop_error_message(vm: &Vm) -> String {
        let message = Self::error_message_at(vm, -1);
        unsafe { ffi::lua_pop(vm.as_raw(), 1) };
        message
    }
}

/// Restores the stack to a promised depth when dropped.
///
/// `delta` is the net change the guarded operation is allowed to make.
/// Extra values left behind are truncated with a warning; a frame that
/// ended up *below* the promise is a bug in this crate.
pub struct StackGuard<'vm> {
    vm: &'vm Vm,
    expected: c_int,
}

impl<'vm> StackGuard<'vm> {
    pub fn new(vm: &'vm Vm, delta: c_int) -> Self {
        StackGuard {
            vm,
            expected: vm.stack_depth() + delta,
        }
    }

    pub fn expected(&self) -> c_int {
        self.expected
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let depth = self.vm.stack_depth();
        if depth > self.expected {
            warn!(
                depth,
                expected = self.expected,
                "stack frame leaked values, truncating"
            );
            unsafe { ffi::lua_settop(self.vm.as_raw(), self.expected) };
        } else if !thread::panicking() {
            debug_assert_eq!(depth, self.expected, "stack frame underflowed");
        }
    }
}
