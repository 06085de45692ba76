use crate::core::error::{BridgeError, BridgeResult};
use crate::core::stack::Stack;
use crate::core::state::Vm;
use crate::ffi;
use crate::types::enums::ValueType;
use std::fmt;
use std::os::raw::c_int;
use tracing::trace;

/// A registry slot keeping one Lua value alive from Rust.
///
/// The slot is either [`ffi::LUA_NOREF`] or a live registry entry owned by
/// this handle. Cloning registers the value again under a new slot, moving
/// transfers the slot, and dropping releases it.
///
/// Registry entries are strong roots for Lua's collector. Two values that
/// reach each other through handles stored on the Rust side form a cycle
/// the collector cannot see; breaking it is up to the owner.
pub struct Ref {
    vm: Vm,
    slot: c_int,
}

impl Ref {
    /// A handle with no live reference. Pushing it yields `nil`.
    pub fn empty(vm: &Vm) -> Self {
        Ref {
            vm: vm.main_thread(),
            slot: ffi::LUA_NOREF,
        }
    }

    /// Takes ownership of the value on top of the stack if `accepts` holds
    /// for its type. On rejection the value is popped anyway.
    pub fn from_top(
        vm: &Vm,
        expected: &'static str,
        accepts: impl FnOnce(ValueType) -> bool,
    ) -> BridgeResult<Self> {
        let actual = ValueType::from_raw(unsafe { ffi::lua_type(vm.as_raw(), -1) });
        if !accepts(actual) {
            unsafe { ffi::lua_pop(vm.as_raw(), 1) };
            return Err(BridgeError::TypeMismatch {
                expected,
                actual: actual.name().to_string(),
            });
        }
        Ok(Self::from_top_unchecked(vm))
    }

    /// Takes ownership of whatever is on top of the stack.
    ///
    /// The handle keeps the main thread even when `vm` is a coroutine, so it
    /// stays usable after the coroutine is collected.
    pub(crate) fn from_top_unchecked(vm: &Vm) -> Self {
        // luaL_ref reads the free list through one extra slot
        Stack::ensure(vm, 1);
        let slot = unsafe { ffi::luaL_ref(vm.as_raw(), ffi::LUA_REGISTRYINDEX) };
        Ref {
            vm: vm.main_thread(),
            slot,
        }
    }

    /// Registers a copy of the value at `index`, leaving the stack as it was.
    pub(crate) fn from_index(vm: &Vm, index: c_int) -> Self {
        Stack::ensure(vm, 1);
        unsafe { ffi::lua_pushvalue(vm.as_raw(), index) };
        Self::from_top_unchecked(vm)
    }

    /// Pushes the referenced value onto the owning instance's stack.
    pub fn push(&self) {
        self.push_to(&self.vm);
    }

    /// Pushes the referenced value onto `vm`, which must share this handle's
    /// registry (the same state, or a thread of it).
    pub fn push_to(&self, vm: &Vm) {
        Stack::ensure(vm, 1);
        unsafe {
            ffi::lua_rawgeti(
                vm.as_raw(),
                ffi::LUA_REGISTRYINDEX,
                self.slot as ffi::lua_Integer,
            )
        };
    }

    /// Moves the slot out, leaving this handle empty.
    pub fn take(&mut self) -> Ref {
        let slot = std::mem::replace(&mut self.slot, ffi::LUA_NOREF);
        Ref {
            vm: self.vm.clone(),
            slot,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.slot != ffi::LUA_NOREF && self.slot != ffi::LUA_REFNIL
    }

    pub fn slot(&self) -> c_int {
        self.slot
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn value_type(&self) -> ValueType {
        if self.slot == ffi::LUA_NOREF {
            return ValueType::Nil;
        }
        self.push();
        let tag = unsafe { ffi::lua_type(self.vm.as_raw(), -1) };
        unsafe { ffi::lua_pop(self.vm.as_raw(), 1) };
        ValueType::from_raw(tag)
    }
}

impl Clone for Ref {
    fn clone(&self) -> Self {
        if !self.is_valid() {
            return Ref {
                vm: self.vm.clone(),
                slot: self.slot,
            };
        }
        self.push();
        Self::from_top_unchecked(&self.vm)
    }
}

impl Drop for Ref {
    fn drop(&mut self) {
        if self.is_valid() {
            trace!(slot = self.slot, "releasing registry slot");
            unsafe { ffi::luaL_unref(self.vm.as_raw(), ffi::LUA_REGISTRYINDEX, self.slot) };
        }
    }
}

/// Raw equality of the referenced values.
///
/// Unlike Lua's `==`, this never runs an `__eq` metamethod: two distinct
/// tables or userdata are unequal even when their metatable says otherwise,
/// and comparing never raises a Lua error.
impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        let state = self.vm.as_raw();
        self.push();
        other.push_to(&self.vm);
        let equal = unsafe { ffi::lua_rawequal(state, -1, -2) } != 0;
        unsafe { ffi::lua_pop(state, 2) };
        equal
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref").field("slot", &self.slot).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_global(vm: &Vm, name: &str) {
        let value: crate::core::value::Value = vm.globals().get(name).unwrap();
        Stack::push(vm, &value).unwrap();
    }

    #[test]
    fn empty_handle_pushes_nil() {
        let vm = Vm::new().unwrap();
        let handle = Ref::empty(&vm);
        assert!(!handle.is_valid());
        assert_eq!(handle.value_type(), ValueType::Nil);

        handle.push();
        assert_eq!(Stack::type_at(&vm, -1), ValueType::Nil);
        unsafe { ffi::lua_pop(vm.as_raw(), 1) };
    }

    #[test]
    fn rejected_value_is_popped() {
        let vm = Vm::new().unwrap();
        Stack::push(&vm, &7i64).unwrap();
        let err = Ref::from_top(&vm, "function", |t| t == ValueType::Function).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::TypeMismatch { expected: "function", ref actual } if actual == "number"
        ));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn clone_registers_new_slot_for_same_value() {
        let vm = Vm::new().unwrap();
        Stack::push(&vm, "shared").unwrap();
        let original = Ref::from_top(&vm, "string", |t| t == ValueType::String).unwrap();
        let copy = original.clone();

        assert_ne!(original.slot(), copy.slot());
        assert_eq!(original, copy);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn take_leaves_source_empty() {
        let vm = Vm::new().unwrap();
        Stack::push(&vm, &1.5f64).unwrap();
        let mut source = Ref::from_top_unchecked(&vm);
        let slot = source.slot();

        let moved = source.take();
        assert_eq!(moved.slot(), slot);
        assert_eq!(source.slot(), ffi::LUA_NOREF);
        assert!(!source.is_valid());
        assert_eq!(moved.value_type(), ValueType::Number);
    }

    #[test]
    fn equality_follows_values_not_slots() {
        let vm = Vm::new().unwrap();
        push_global(&vm, "print");
        let first = Ref::from_top_unchecked(&vm);
        push_global(&vm, "print");
        let second = Ref::from_top_unchecked(&vm);
        push_global(&vm, "pairs");
        let other = Ref::from_top_unchecked(&vm);

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn dropped_slot_is_reused() {
        let vm = Vm::new().unwrap();
        Stack::push(&vm, &1i64).unwrap();
        let first = Ref::from_top_unchecked(&vm);
        let slot = first.slot();
        drop(first);

        Stack::push(&vm, &2i64).unwrap();
        let second = Ref::from_top_unchecked(&vm);
        assert_eq!(second.slot(), slot);
    }
}
