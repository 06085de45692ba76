use crate::core::error::{BridgeError, BridgeResult};
use crate::core::reference::Ref;
use crate::core::stack::{Stack, StackGuard};
use crate::core::state::Vm;
use crate::ffi;
use crate::internal::boxed::{self, CALLBACK_METATABLE};
use crate::internal::dispatch::{Bound, dispatch};
use crate::types::args::IntoArgs;
use crate::types::callable::{FromReturn, NativeFunction};
use crate::types::convert::{FromStack, IntoStack, mismatch, type_at};
use crate::types::enums::{Status, ValueType};
use crate::types::signature::{ConstMethod, Contextual, Free, Kind, Method};
use std::any::type_name;
use std::os::raw::c_int;
use tracing::{debug, trace};

/// A callable Lua value: a Lua function or a C function, with or without
/// upvalues.
#[derive(Clone, PartialEq, Debug)]
pub struct Function {
    reference: Ref,
}

impl Function {
    /// Takes the function on top of the stack, popping it either way.
    pub fn from_top(vm: &Vm) -> BridgeResult<Self> {
        Ref::from_top(vm, "function", |t| t == ValueType::Function)
            .map(|reference| Function { reference })
    }

    /// Exposes a plain Rust function.
    ///
    /// `captured` values fill the leading parameters on every call; the
    /// remaining ones are read from the call-time arguments.
    pub fn create<A, F, C>(vm: &Vm, function: F, captured: C) -> BridgeResult<Self>
    where
        A: 'static,
        F: NativeFunction<Free, A>,
        C: IntoArgs,
    {
        Self::bind::<Free, A, F, C>(vm, function, captured)
    }

    /// Exposes a function of `&mut T`, called as `object:name(...)`.
    pub fn create_method<T, A, F, C>(vm: &Vm, function: F, captured: C) -> BridgeResult<Self>
    where
        T: 'static,
        A: 'static,
        F: NativeFunction<Method<T>, A>,
        C: IntoArgs,
    {
        Self::bind::<Method<T>, A, F, C>(vm, function, captured)
    }

    /// Exposes a function of `&T`, called as `object:name(...)`.
    pub fn create_const_method<T, A, F, C>(vm: &Vm, function: F, captured: C) -> BridgeResult<Self>
    where
        T: 'static,
        A: 'static,
        F: NativeFunction<ConstMethod<T>, A>,
        C: IntoArgs,
    {
        Self::bind::<ConstMethod<T>, A, F, C>(vm, function, captured)
    }

    /// Exposes a function that also receives the calling [`Vm`].
    pub fn create_contextual<A, F, C>(vm: &Vm, function: F, captured: C) -> BridgeResult<Self>
    where
        A: 'static,
        F: NativeFunction<Contextual, A>,
        C: IntoArgs,
    {
        Self::bind::<Contextual, A, F, C>(vm, function, captured)
    }

    fn bind<K, A, F, C>(vm: &Vm, function: F, captured: C) -> BridgeResult<Self>
    where
        K: Kind,
        A: 'static,
        F: NativeFunction<K, A>,
        C: IntoArgs,
    {
        if C::LEN > F::ARITY {
            return Err(BridgeError::ArityMismatch {
                arity: F::ARITY,
                captured: C::LEN,
            });
        }

        // the callback box with its metatable under construction, then the captures
        Stack::reserve(vm, C::LEN as c_int + 3)?;
        let _guard = StackGuard::new(vm, 0);
        unsafe {
            boxed::push(
                vm.as_raw(),
                Bound::<K, A, F>::new(function, C::LEN),
                type_name::<F>(),
                CALLBACK_METATABLE,
                0,
            )
        };
        captured.push_all(vm)?;
        Stack::push_closure(vm, dispatch::<K, A, F>, C::LEN as c_int + 1);

        debug!(signature = %F::signature(), captured = C::LEN, "created native function");
        Function::from_top(vm)
    }

    /// Calls the function in protected mode.
    ///
    /// `R = ()` requests no results; any other `R` requests exactly one.
    /// A Lua error comes back as [`BridgeError::Runtime`] with the error
    /// message, and the stack is restored to its depth before the call.
    pub fn call<R, C>(&self, args: C) -> BridgeResult<R>
    where
        R: FromReturn,
        C: IntoArgs,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("Function::call");

        let vm = self.reference.vm();
        let state = vm.as_raw();
        let base = vm.stack_depth();

        Stack::reserve(vm, C::LEN as c_int + 1)?;
        self.reference.push();
        if let Err(err) = args.push_all(vm) {
            unsafe { ffi::lua_settop(state, base) };
            return Err(err);
        }
        trace!(args = C::LEN, results = R::RESULTS, "calling Lua function");

        let status = unsafe { ffi::lua_pcall(state, C::LEN as c_int, R::RESULTS, 0) };
        if Status::from_raw(status) != Status::Ok {
            let message = Stack::error_message_at(vm, -1);
            unsafe { ffi::lua_settop(state, base) };
            return Err(BridgeError::Runtime(message));
        }

        let result = R::from_return(vm);
        debug_assert_eq!(vm.stack_depth(), base);
        result
    }

    pub fn reference(&self) -> &Ref {
        &self.reference
    }

    pub fn into_ref(self) -> Ref {
        self.reference
    }

    pub fn vm(&self) -> &Vm {
        self.reference.vm()
    }
}

impl IntoStack for Function {
    fn push_to_stack(&self, vm: &Vm) {
        self.reference.push_to(vm);
    }
}

impl FromStack for Function {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        match type_at(vm, index) {
            ValueType::Function => Ok(Function {
                reference: Ref::from_index(vm, index),
            }),
            other => Err(mismatch("function", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::userdata::UserData;

    fn add(a: i64, b: i64) -> i64 {
        a + b
    }

    fn script(vm: &Vm, source: &str) -> Function {
        vm.load_buffer(source, None).unwrap()
    }

    #[test]
    fn native_function_is_callable_from_rust() {
        let vm = Vm::new().unwrap();
        let function = Function::create(&vm, add, ()).unwrap();
        assert_eq!(function.call::<i64, _>((2i64, 3i64)).unwrap(), 5);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn captured_values_fill_leading_parameters() {
        let vm = Vm::new().unwrap();
        let bound = Function::create(&vm, add, (40i64, 2i64)).unwrap();
        assert_eq!(bound.call::<i64, _>(()).unwrap(), add(40, 2));

        let partial = Function::create(&vm, add, (40i64,)).unwrap();
        assert_eq!(partial.call::<i64, _>((5i64,)).unwrap(), 45);

        // excess call-time arguments are ignored
        assert_eq!(bound.call::<i64, _>((100i64, 200i64)).unwrap(), 42);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn too_many_captures_is_rejected() {
        let vm = Vm::new().unwrap();
        let err = Function::create(&vm, add, (1i64, 2i64, 3i64)).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ArityMismatch {
                arity: 2,
                captured: 3
            }
        ));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn void_function_reports_no_results() {
        let vm = Vm::new().unwrap();
        let noop = Function::create(&vm, || {}, ()).unwrap();
        vm.globals().set("noop", &noop).unwrap();

        let count: i64 = script(&vm, "return select('#', noop())").call(()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn native_errors_become_lua_errors() {
        let vm = Vm::new().unwrap();
        let fail = Function::create(
            &vm,
            || -> Result<(), String> { Err("native failure".to_string()) },
            (),
        )
        .unwrap();
        vm.globals().set("fail", &fail).unwrap();

        let message: String = script(
            &vm,
            "local ok, err = pcall(fail) assert(not ok) return err",
        )
        .call(())
        .unwrap();
        assert!(message.contains("native failure"));

        let err = fail.call::<(), _>(()).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m.contains("native failure")));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn panics_do_not_cross_into_lua() {
        let vm = Vm::new().unwrap();
        let boom = Function::create(&vm, || -> i64 { panic!("kaboom") }, ()).unwrap();
        let err = boom.call::<i64, _>(()).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m == "kaboom"));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn wrong_argument_type_names_position() {
        let vm = Vm::new().unwrap();
        let function = Function::create(&vm, add, ()).unwrap();
        let err = function.call::<i64, _>((1i64, "x")).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m.starts_with("bad argument #2")));
    }

    #[test]
    fn lua_errors_restore_stack() {
        let vm = Vm::new().unwrap();
        let raise = script(&vm, "error('script failure', 0)");
        let err = raise.call::<(), _>(()).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m == "script failure"));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn non_function_top_is_rejected() {
        let vm = Vm::new().unwrap();
        Stack::push(&vm, &5i64).unwrap();
        let err = Function::from_top(&vm).unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { ref actual, .. } if actual == "number"));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn contextual_function_builds_on_calling_vm() {
        let vm = Vm::new().unwrap();
        let make = Function::create_contextual(
            &vm,
            |vm: &Vm, name: String| -> BridgeResult<crate::core::table::Table> {
                let table = vm.create_table();
                table.set("name", name)?;
                Ok(table)
            },
            (),
        )
        .unwrap();
        vm.globals().set("make", &make).unwrap();

        let name: String = script(&vm, "return make('widget').name").call(()).unwrap();
        assert_eq!(name, "widget");
        assert_eq!(vm.stack_depth(), 0);
    }

    #[derive(Default)]
    struct Counter {
        total: i64,
    }

    #[test]
    fn methods_receive_their_object() {
        let vm = Vm::new().unwrap();
        let methods = vm.create_table();
        methods
            .set(
                "add",
                Function::create_method(
                    &vm,
                    |c: &mut Counter, n: i64| {
                        c.total += n;
                        c.total
                    },
                    (),
                )
                .unwrap(),
            )
            .unwrap();
        methods
            .set(
                "total",
                Function::create_const_method(&vm, |c: &Counter| c.total, ()).unwrap(),
            )
            .unwrap();

        let counter = UserData::with_methods(&vm, Counter::default(), &methods);
        vm.globals().set("counter", &counter).unwrap();

        let total: i64 = script(&vm, "counter:add(2) counter:add(3) return counter:total()")
            .call(())
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(counter.borrow().unwrap().total, 5);
    }

    #[test]
    fn method_rejects_foreign_receiver() {
        let vm = Vm::new().unwrap();
        let total = Function::create_const_method(&vm, |c: &Counter| c.total, ()).unwrap();
        let err = total.call::<i64, _>((1i64,)).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m.starts_with("bad argument #1")));
    }
}
