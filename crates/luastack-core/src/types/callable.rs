use crate::core::error::{BridgeError, BridgeResult};
use crate::core::stack::Stack;
use crate::core::state::Vm;
use crate::ffi;
use crate::internal::boxed::{self, OBJECT_METATABLE};
use crate::types::args::FromArgs;
use crate::types::convert::{FromStack, IntoStack};
use crate::types::enums::ValueType;
use crate::types::signature::{ConstMethod, Contextual, Frame, Free, Kind, Method, Signature};
use std::any::type_name;
use std::cell::RefCell;
use std::fmt::Display;
use std::os::raw::c_int;

/// What a native function hands back to Lua.
pub trait IntoReturn {
    /// Pushes the results and returns how many were pushed.
    fn push_return(self, vm: &Vm) -> BridgeResult<c_int>;
}

impl<T: IntoStack> IntoReturn for T {
    fn push_return(self, vm: &Vm) -> BridgeResult<c_int> {
        Stack::reserve(vm, 1)?;
        self.push_to_stack(vm);
        Ok(1)
    }
}

impl IntoReturn for () {
    fn push_return(self, _vm: &Vm) -> BridgeResult<c_int> {
        Ok(0)
    }
}

/// `Err` becomes a Lua error carrying the error's `Display` text.
impl<T: IntoReturn, E: Display> IntoReturn for Result<T, E> {
    fn push_return(self, vm: &Vm) -> BridgeResult<c_int> {
        match self {
            Ok(value) => value.push_return(vm),
            Err(err) => Err(BridgeError::Runtime(err.to_string())),
        }
    }
}

/// What Rust expects back from a Lua call.
pub trait FromReturn: Sized {
    /// Result count requested from `lua_pcall`.
    const RESULTS: c_int;

    /// Consumes exactly `RESULTS` values from the top of the stack.
    fn from_return(vm: &Vm) -> BridgeResult<Self>;
}

impl FromReturn for () {
    const RESULTS: c_int = 0;

    fn from_return(_vm: &Vm) -> BridgeResult<Self> {
        Ok(())
    }
}

impl<T: FromStack> FromReturn for T {
    const RESULTS: c_int = 1;

    fn from_return(vm: &Vm) -> BridgeResult<Self> {
        T::pop_from_stack(vm)
    }
}

/// A Rust callable that can be exposed to Lua.
///
/// `K` is one of the [`Kind`] markers and `A` the tuple of declared
/// parameters. Implemented for every `Fn` of up to twelve parameters whose
/// parameters are [`FromStack`] and whose output is [`IntoReturn`].
pub trait NativeFunction<K: Kind, A>: 'static {
    type Output: IntoReturn;

    /// Declared parameters, excluding the receiver or the `&Vm` context.
    const ARITY: usize;

    fn signature() -> Signature;

    fn invoke(&self, vm: &Vm, frame: &Frame) -> BridgeResult<Self::Output>;
}

fn receiver<'a, T: 'static>(vm: &Vm, frame: &Frame) -> BridgeResult<&'a RefCell<T>> {
    let slot = frame.receiver();
    unsafe { boxed::downcast::<RefCell<T>>(vm.as_raw(), slot, OBJECT_METATABLE) }.ok_or_else(
        || {
            let actual = ValueType::from_raw(unsafe { ffi::lua_type(vm.as_raw(), slot) });
            let actual = unsafe { boxed::boxed_type_name(vm.as_raw(), slot, OBJECT_METATABLE) }
                .map(str::to_string)
                .unwrap_or_else(|| actual.name().to_string());
            BridgeError::bad_argument(
                1,
                BridgeError::TypeMismatch {
                    expected: type_name::<T>(),
                    actual,
                },
            )
        },
    )
}

fn signature_of<K: Kind, R>(owner: Option<&'static str>, params: Vec<&'static str>) -> Signature {
    Signature {
        kind: K::TAG,
        owner,
        output: type_name::<R>(),
        params,
    }
}

macro_rules! impl_native_function {
    ($len:expr; $($A:ident),*) => {
        impl<Func, R, $($A,)*> NativeFunction<Free, ($($A,)*)> for Func
        where
            Func: Fn($($A),*) -> R + 'static,
            R: IntoReturn,
            $($A: FromStack,)*
        {
            type Output = R;
            const ARITY: usize = $len;

            fn signature() -> Signature {
                signature_of::<Free, R>(None, <($($A,)*) as FromArgs>::type_names())
            }

            fn invoke(&self, vm: &Vm, frame: &Frame) -> BridgeResult<R> {
                #[allow(non_snake_case)]
                let ($($A,)*) = <($($A,)*) as FromArgs>::read(vm, frame)?;
                Ok(self($($A),*))
            }
        }

        impl<Func, R, $($A,)*> NativeFunction<Contextual, ($($A,)*)> for Func
        where
            Func: Fn(&Vm, $($A),*) -> R + 'static,
            R: IntoReturn,
            $($A: FromStack,)*
        {
            type Output = R;
            const ARITY: usize = $len;

            fn signature() -> Signature {
                signature_of::<Contextual, R>(None, <($($A,)*) as FromArgs>::type_names())
            }

            fn invoke(&self, vm: &Vm, frame: &Frame) -> BridgeResult<R> {
                #[allow(non_snake_case)]
                let ($($A,)*) = <($($A,)*) as FromArgs>::read(vm, frame)?;
                Ok(self(vm, $($A),*))
            }
        }

        impl<Func, T, R, $($A,)*> NativeFunction<Method<T>, ($($A,)*)> for Func
        where
            Func: Fn(&mut T, $($A),*) -> R + 'static,
            T: 'static,
            R: IntoReturn,
            $($A: FromStack,)*
        {
            type Output = R;
            const ARITY: usize = $len;

            fn signature() -> Signature {
                signature_of::<Method<T>, R>(
                    Some(type_name::<T>()),
                    <($($A,)*) as FromArgs>::type_names(),
                )
            }

            fn invoke(&self, vm: &Vm, frame: &Frame) -> BridgeResult<R> {
                #[allow(non_snake_case)]
                let ($($A,)*) = <($($A,)*) as FromArgs>::read(vm, frame)?;
                let cell = receiver::<T>(vm, frame)?;
                let mut this = cell.try_borrow_mut().map_err(|_| BridgeError::BorrowConflict {
                    type_name: type_name::<T>(),
                })?;
                Ok(self(&mut *this, $($A),*))
            }
        }

        impl<Func, T, R, $($A,)*> NativeFunction<ConstMethod<T>, ($($A,)*)> for Func
        where
            Func: Fn(&T, $($A),*) -> R + 'static,
            T: 'static,
            R: IntoReturn,
            $($A: FromStack,)*
        {
            type Output = R;
            const ARITY: usize = $len;

            fn signature() -> Signature {
                signature_of::<ConstMethod<T>, R>(
                    Some(type_name::<T>()),
                    <($($A,)*) as FromArgs>::type_names(),
                )
            }

            fn invoke(&self, vm: &Vm, frame: &Frame) -> BridgeResult<R> {
                #[allow(non_snake_case)]
                let ($($A,)*) = <($($A,)*) as FromArgs>::read(vm, frame)?;
                let cell = receiver::<T>(vm, frame)?;
                let this = cell.try_borrow().map_err(|_| BridgeError::BorrowConflict {
                    type_name: type_name::<T>(),
                })?;
                Ok(self(&*this, $($A),*))
            }
        }
    };
}

impl_native_function!(0;);
impl_native_function!(1; A);
impl_native_function!(2; A, B);
impl_native_function!(3; A, B, C);
impl_native_function!(4; A, B, C, D);
impl_native_function!(5; A, B, C, D, E);
impl_native_function!(6; A, B, C, D, E, F);
impl_native_function!(7; A, B, C, D, E, F, G);
impl_native_function!(8; A, B, C, D, E, F, G, H);
impl_native_function!(9; A, B, C, D, E, F, G, H, I);
impl_native_function!(10; A, B, C, D, E, F, G, H, I, J);
impl_native_function!(11; A, B, C, D, E, F, G, H, I, J, K);
impl_native_function!(12; A, B, C, D, E, F, G, H, I, J, K, L);
