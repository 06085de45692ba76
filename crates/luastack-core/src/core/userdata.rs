use crate::core::error::{BridgeError, BridgeResult};
use crate::core::reference::Ref;
use crate::core::stack::Stack;
use crate::core::state::Vm;
use crate::core::table::Table;
use crate::ffi;
use crate::internal::boxed::{self, OBJECT_METATABLE};
use crate::types::convert::{FromStack, IntoStack, type_at};
use std::any::type_name;
use std::cell::{Ref as CellRef, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::ptr::NonNull;

/// A Rust value owned by a Lua full userdata.
///
/// The value is dropped by the userdata's `__gc`. Its methods come from an
/// optional table stored as the userdata's user value and are found through
/// `__index`, so `object:method(...)` works in scripts.
pub struct UserData<T: 'static> {
    reference: Ref,
    cell: NonNull<RefCell<T>>,
    _marker: PhantomData<T>,
}

impl<T: 'static> UserData<T> {
    pub fn new(vm: &Vm, value: T) -> Self {
        Stack::ensure(vm, 3);
        let cell = unsafe {
            boxed::push(
                vm.as_raw(),
                RefCell::new(value),
                type_name::<T>(),
                OBJECT_METATABLE,
                1,
            )
        };
        UserData {
            reference: Ref::from_top_unchecked(vm),
            cell: unsafe { NonNull::new_unchecked(cell) },
            _marker: PhantomData,
        }
    }

    pub fn with_methods(vm: &Vm, value: T, methods: &Table) -> Self {
        let object = Self::new(vm, value);
        object.set_methods(methods);
        object
    }

    /// Replaces the table `__index` looks methods up in.
    pub fn set_methods(&self, methods: &Table) {
        let vm = self.reference.vm();
        let state = vm.as_raw();
        Stack::ensure(vm, 2);
        self.reference.push();
        methods.push_to_stack(vm);
        unsafe {
            ffi::lua_setiuservalue(state, -2, 1);
            ffi::lua_pop(state, 1);
        }
    }

    pub fn methods(&self) -> Option<Table> {
        let vm = self.reference.vm();
        let state = vm.as_raw();
        Stack::ensure(vm, 2);
        self.reference.push();
        unsafe { ffi::lua_getiuservalue(state, -1, 1) };
        let methods = Table::from_stack(vm, -1).ok();
        unsafe { ffi::lua_pop(state, 2) };
        methods
    }

    fn cell(&self) -> &RefCell<T> {
        // the registry slot keeps the userdata, and so the box, alive
        unsafe { self.cell.as_ref() }
    }

    pub fn borrow(&self) -> BridgeResult<CellRef<'_, T>> {
        self.cell()
            .try_borrow()
            .map_err(|_| BridgeError::BorrowConflict {
                type_name: type_name::<T>(),
            })
    }

    pub fn borrow_mut(&self) -> BridgeResult<RefMut<'_, T>> {
        self.cell()
            .try_borrow_mut()
            .map_err(|_| BridgeError::BorrowConflict {
                type_name: type_name::<T>(),
            })
    }

    pub fn reference(&self) -> &Ref {
        &self.reference
    }
}

impl<T: 'static> Clone for UserData<T> {
    fn clone(&self) -> Self {
        UserData {
            reference: self.reference.clone(),
            cell: self.cell,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> PartialEq for UserData<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl<T: 'static> fmt::Debug for UserData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("type", &type_name::<T>())
            .field("reference", &self.reference)
            .finish()
    }
}

impl<T: 'static> IntoStack for UserData<T> {
    fn push_to_stack(&self, vm: &Vm) {
        self.reference.push_to(vm);
    }
}

impl<T: 'static> FromStack for UserData<T> {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        let state = vm.as_raw();
        let cell = unsafe { boxed::downcast::<RefCell<T>>(state, index, OBJECT_METATABLE) };
        match cell {
            Some(cell) => Ok(UserData {
                reference: Ref::from_index(vm, index),
                cell: NonNull::from(cell),
                _marker: PhantomData,
            }),
            None => {
                let actual = unsafe { boxed::boxed_type_name(state, index, OBJECT_METATABLE) }
                    .map(str::to_string)
                    .unwrap_or_else(|| type_at(vm, index).name().to_string());
                Err(BridgeError::TypeMismatch {
                    expected: type_name::<T>(),
                    actual,
                })
            }
        }
    }
}
