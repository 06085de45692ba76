use crate::ffi;
use crate::internal::utils::push_bytes;
use std::any::TypeId;
use std::ffi::{CStr, c_void};
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Metatable for boxed native callbacks (upvalue 1 of every exposed function).
pub(crate) const CALLBACK_METATABLE: &CStr = c"luastack.callback";
/// Metatable for native objects handed to scripts.
pub(crate) const OBJECT_METATABLE: &CStr = c"luastack.object";

/// Layout stored inside every full userdata this crate creates.
///
/// The Rust value lives in its own heap allocation so its address stays
/// stable and its alignment does not depend on what Lua's allocator gives.
#[repr(C)]
struct ErasedBox {
    ptr: *mut c_void,
    type_id: TypeId,
    type_name: &'static str,
    drop: unsafe fn(*mut c_void),
}

unsafe fn drop_boxed<T>(ptr: *mut c_void) {
    drop(unsafe { Box::from_raw(ptr as *mut T) });
}

/// Pushes a full userdata owning `value`, tagged with `metatable`.
///
/// The metatable is created on first use and always carries `__gc`.
/// `name` is what `__tostring` and type mismatch errors report.
pub(crate) unsafe fn push<T: 'static>(
    state: *mut ffi::lua_State,
    value: T,
    name: &'static str,
    metatable: &'static CStr,
    user_values: c_int,
) -> *mut T {
    let ptr = Box::into_raw(Box::new(value));
    unsafe {
        let slot = ffi::lua_newuserdatauv(state, size_of::<ErasedBox>(), user_values)
            as *mut ErasedBox;
        ptr::write(
            slot,
            ErasedBox {
                ptr: ptr as *mut c_void,
                type_id: TypeId::of::<T>(),
                type_name: name,
                drop: drop_boxed::<T>,
            },
        );
        push_metatable(state, metatable);
        ffi::lua_setmetatable(state, -2);
    }
    ptr
}

unsafe fn push_metatable(state: *mut ffi::lua_State, name: &'static CStr) {
    unsafe {
        if ffi::luaL_newmetatable(state, name.as_ptr()) == 0 {
            return;
        }
        ffi::lua_pushcclosure(state, collect, 0);
        ffi::lua_setfield(state, -2, c"__gc".as_ptr());
        if name == OBJECT_METATABLE {
            ffi::lua_pushcclosure(state, describe, 0);
            ffi::lua_setfield(state, -2, c"__tostring".as_ptr());
            ffi::lua_pushcclosure(state, index_methods, 0);
            ffi::lua_setfield(state, -2, c"__index".as_ptr());
        }
    }
}

unsafe fn erased<'a>(
    state: *mut ffi::lua_State,
    index: c_int,
    metatable: &'static CStr,
) -> Option<&'a ErasedBox> {
    let raw = unsafe { ffi::luaL_testudata(state, index, metatable.as_ptr()) } as *const ErasedBox;
    if raw.is_null() {
        return None;
    }
    let erased = unsafe { &*raw };
    if erased.ptr.is_null() { None } else { Some(erased) }
}

/// The boxed value at `index` if it was pushed with `metatable` and holds a `T`.
pub(crate) unsafe fn downcast<'a, T: 'static>(
    state: *mut ffi::lua_State,
    index: c_int,
    metatable: &'static CStr,
) -> Option<&'a T> {
    let erased = unsafe { erased(state, index, metatable) }?;
    if erased.type_id != TypeId::of::<T>() {
        return None;
    }
    Some(unsafe { &*(erased.ptr as *const T) })
}

/// Rust type name of the boxed value at `index`, for diagnostics.
pub(crate) unsafe fn boxed_type_name(
    state: *mut ffi::lua_State,
    index: c_int,
    metatable: &'static CStr,
) -> Option<&'static str> {
    unsafe { erased(state, index, metatable) }.map(|erased| erased.type_name)
}

unsafe extern "C-unwind" fn collect(state: *mut ffi::lua_State) -> c_int {
    unsafe {
        let raw = ffi::lua_touserdata(state, 1) as *mut ErasedBox;
        if raw.is_null() {
            return 0;
        }
        let ptr = ptr::replace(&mut (*raw).ptr, ptr::null_mut());
        if !ptr.is_null() {
            let drop = (*raw).drop;
            // a panicking destructor must not unwind into the collector
            let _ = panic::catch_unwind(AssertUnwindSafe(|| drop(ptr)));
        }
    }
    0
}

unsafe extern "C-unwind" fn describe(state: *mut ffi::lua_State) -> c_int {
    unsafe {
        let name = boxed_type_name(state, 1, OBJECT_METATABLE).unwrap_or("released object");
        let text = format!("userdata: {name}");
        push_bytes(state, text.as_bytes());
    }
    1
}

unsafe extern "C-unwind" fn index_methods(state: *mut ffi::lua_State) -> c_int {
    unsafe {
        if ffi::lua_getiuservalue(state, 1, 1) == ffi::LUA_TTABLE {
            ffi::lua_pushvalue(state, 2);
            ffi::lua_rawget(state, -2);
        } else {
            ffi::lua_pushnil(state);
        }
    }
    1
}
