//! Per-type marshaling units between Rust values and Lua stack slots.
//!
//! - [`IntoStack`]: push a Rust value as exactly one Lua value.
//! - [`FromStack`]: read (`get`) or consume (`pop`) one Lua value.
//!
//! ## Supported types
//!
//! - `bool`: any Lua value, following Lua truthiness.
//! - `i8`..`i64`, `isize`, `u8`..`u32`: Lua integers, range-checked.
//! - `u64`, `usize`: bit-reinterpreted through `i64` so the full range survives.
//! - `f32`, `f64`: any Lua number.
//! - `String`, `str`, `Vec<u8>`, `[u8]`: length-bounded; numbers are accepted
//!   and rendered the way Lua would, without touching the original slot.
//! - [`Nil`] and `Option<T>`.
//! - Engine-backed handles: [`Function`](crate::core::function::Function),
//!   [`Table`](crate::core::table::Table), [`UserData`](crate::core::userdata::UserData),
//!   [`Value`](crate::core::value::Value), and raw `lua_CFunction` pointers.

use crate::core::error::{BridgeError, BridgeResult};
use crate::core::stack::Stack;
use crate::core::state::Vm;
use crate::ffi;
use crate::internal::utils::{push_bytes, read_bytes};
use crate::types::enums::ValueType;
use std::os::raw::c_int;

/// Appends exactly one value to the stack.
///
/// Implementations assume a free slot; [`Stack::push`] reserves one first.
pub trait IntoStack {
    fn push_to_stack(&self, vm: &Vm);
}

/// Converts the value at a stack index.
pub trait FromStack: Sized {
    /// Reads the value at `index`. Never changes the stack.
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self>;

    /// Reads the top value and removes it, on success and failure alike.
    fn pop_from_stack(vm: &Vm) -> BridgeResult<Self> {
        let value = Self::from_stack(vm, -1);
        unsafe { ffi::lua_pop(vm.as_raw(), 1) };
        value
    }
}

impl<T: IntoStack + ?Sized> IntoStack for &T {
    fn push_to_stack(&self, vm: &Vm) {
        (**self).push_to_stack(vm)
    }
}

pub(crate) fn type_at(vm: &Vm, index: c_int) -> ValueType {
    ValueType::from_raw(unsafe { ffi::lua_type(vm.as_raw(), index) })
}

pub(crate) fn mismatch(expected: &'static str, actual: ValueType) -> BridgeError {
    BridgeError::TypeMismatch {
        expected,
        actual: actual.name().to_string(),
    }
}

// ============================================================================
// Boolean
// ============================================================================

impl IntoStack for bool {
    fn push_to_stack(&self, vm: &Vm) {
        unsafe { ffi::lua_pushboolean(vm.as_raw(), *self as c_int) };
    }
}

impl FromStack for bool {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        Ok(unsafe { ffi::lua_toboolean(vm.as_raw(), index) } != 0)
    }
}

// ============================================================================
// Integers
// ============================================================================

fn get_integer(vm: &Vm, index: c_int) -> BridgeResult<i64> {
    let actual = type_at(vm, index);
    if actual != ValueType::Number {
        return Err(mismatch("integer", actual));
    }
    let mut is_integer: c_int = 0;
    let value = unsafe { ffi::lua_tointegerx(vm.as_raw(), index, &mut is_integer) };
    if is_integer == 0 {
        // a float with a fractional part or outside the integer range
        return Err(BridgeError::TypeMismatch {
            expected: "integer",
            actual: "number".to_string(),
        });
    }
    Ok(value)
}

macro_rules! impl_stack_int {
    ($($ty:ty),*) => {
        $(
            impl IntoStack for $ty {
                fn push_to_stack(&self, vm: &Vm) {
                    unsafe { ffi::lua_pushinteger(vm.as_raw(), *self as ffi::lua_Integer) };
                }
            }

            impl FromStack for $ty {
                fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
                    let value = get_integer(vm, index)?;
                    <$ty>::try_from(value).map_err(|_| BridgeError::IntegerOverflow {
                        value,
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

impl_stack_int!(i8, i16, i32, i64, isize, u8, u16, u32);

// Full unsigned range is carried by reinterpreting the bits.
macro_rules! impl_stack_wide_uint {
    ($($ty:ty),*) => {
        $(
            impl IntoStack for $ty {
                fn push_to_stack(&self, vm: &Vm) {
                    unsafe { ffi::lua_pushinteger(vm.as_raw(), *self as u64 as ffi::lua_Integer) };
                }
            }

            impl FromStack for $ty {
                fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
                    Ok(get_integer(vm, index)? as u64 as $ty)
                }
            }
        )*
    };
}

impl_stack_wide_uint!(u64, usize);

// ============================================================================
// Floats
// ============================================================================

fn get_number(vm: &Vm, index: c_int) -> BridgeResult<f64> {
    let actual = type_at(vm, index);
    if actual != ValueType::Number {
        return Err(mismatch("number", actual));
    }
    Ok(unsafe { ffi::lua_tonumberx(vm.as_raw(), index, std::ptr::null_mut()) })
}

impl IntoStack for f64 {
    fn push_to_stack(&self, vm: &Vm) {
        unsafe { ffi::lua_pushnumber(vm.as_raw(), *self) };
    }
}

impl FromStack for f64 {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        get_number(vm, index)
    }
}

impl IntoStack for f32 {
    fn push_to_stack(&self, vm: &Vm) {
        unsafe { ffi::lua_pushnumber(vm.as_raw(), *self as ffi::lua_Number) };
    }
}

impl FromStack for f32 {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        Ok(get_number(vm, index)? as f32)
    }
}

// ============================================================================
// Strings
// ============================================================================

fn get_bytes(vm: &Vm, index: c_int) -> BridgeResult<Vec<u8>> {
    let state = vm.as_raw();
    match type_at(vm, index) {
        ValueType::String => Ok(unsafe { read_bytes(state, index) }),
        ValueType::Number => unsafe {
            // lua_tolstring rewrites numbers in place; convert a copy
            Stack::reserve(vm, 1)?;
            ffi::lua_pushvalue(state, index);
            let bytes = read_bytes(state, -1);
            ffi::lua_pop(state, 1);
            Ok(bytes)
        },
        other => Err(mismatch("string", other)),
    }
}

impl IntoStack for [u8] {
    fn push_to_stack(&self, vm: &Vm) {
        unsafe { push_bytes(vm.as_raw(), self) };
    }
}

impl IntoStack for Vec<u8> {
    fn push_to_stack(&self, vm: &Vm) {
        self.as_slice().push_to_stack(vm)
    }
}

impl FromStack for Vec<u8> {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        get_bytes(vm, index)
    }
}

impl IntoStack for str {
    fn push_to_stack(&self, vm: &Vm) {
        self.as_bytes().push_to_stack(vm)
    }
}

impl IntoStack for String {
    fn push_to_stack(&self, vm: &Vm) {
        self.as_bytes().push_to_stack(vm)
    }
}

impl FromStack for String {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        Ok(String::from_utf8(get_bytes(vm, index)?)?)
    }
}

// ============================================================================
// Nil and Option
// ============================================================================

/// The Lua `nil` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nil;

impl IntoStack for Nil {
    fn push_to_stack(&self, vm: &Vm) {
        unsafe { ffi::lua_pushnil(vm.as_raw()) };
    }
}

impl FromStack for Nil {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        match type_at(vm, index) {
            ValueType::Nil | ValueType::None => Ok(Nil),
            other => Err(mismatch("nil", other)),
        }
    }
}

impl<T: IntoStack> IntoStack for Option<T> {
    fn push_to_stack(&self, vm: &Vm) {
        match self {
            Some(value) => value.push_to_stack(vm),
            None => Nil.push_to_stack(vm),
        }
    }
}

impl<T: FromStack> FromStack for Option<T> {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        match type_at(vm, index) {
            ValueType::Nil | ValueType::None => Ok(None),
            _ => T::from_stack(vm, index).map(Some),
        }
    }
}

// ============================================================================
// Raw C functions
// ============================================================================

impl IntoStack for ffi::lua_CFunction {
    fn push_to_stack(&self, vm: &Vm) {
        unsafe { ffi::lua_pushcclosure(vm.as_raw(), *self, 0) };
    }
}

impl FromStack for ffi::lua_CFunction {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        let function: Option<ffi::lua_CFunction> =
            Option::from(unsafe { ffi::lua_tocfunction(vm.as_raw(), index) });
        function.ok_or_else(|| mismatch("C function", type_at(vm, index)))
    }
}
