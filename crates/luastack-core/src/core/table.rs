use crate::core::error::{BridgeError, BridgeResult};
use crate::core::function::Function;
use crate::core::reference::Ref;
use crate::core::stack::Stack;
use crate::core::state::Vm;
use crate::core::value::Value;
use crate::ffi;
use crate::types::args::IntoArgs;
use crate::types::callable::FromReturn;
use crate::types::convert::{FromStack, IntoStack, mismatch, type_at};
use crate::types::enums::{Status, ValueType};
use std::os::raw::c_int;

/// A Lua table.
///
/// Reads and writes are raw: metamethods are never consulted. Member
/// lookups for [`Table::call`] and [`Table::function`] index the way Lua's
/// `table.name` does, so `__index` chains are followed.
#[derive(Clone, PartialEq, Debug)]
pub struct Table {
    reference: Ref,
}

impl Table {
    pub fn new(vm: &Vm) -> Self {
        Stack::ensure(vm, 1);
        unsafe { ffi::lua_createtable(vm.as_raw(), 0, 0) };
        Table::from_ref(Ref::from_top_unchecked(vm))
    }

    /// Takes the table on top of the stack, popping it either way.
    pub fn from_top(vm: &Vm) -> BridgeResult<Self> {
        Ref::from_top(vm, "table", |t| t == ValueType::Table).map(Table::from_ref)
    }

    pub(crate) fn from_ref(reference: Ref) -> Self {
        Table { reference }
    }

    pub fn vm(&self) -> &Vm {
        self.reference.vm()
    }

    pub fn get<K, V>(&self, key: K) -> BridgeResult<V>
    where
        K: IntoStack,
        V: FromStack,
    {
        let vm = self.vm();
        let state = vm.as_raw();
        Stack::reserve(vm, 2)?;
        self.reference.push();
        key.push_to_stack(vm);
        unsafe { ffi::lua_rawget(state, -2) };
        let value = V::from_stack(vm, -1);
        unsafe { ffi::lua_pop(state, 2) };
        value
    }

    /// Fails without touching the table when `key` is `nil` or NaN.
    pub fn set<K, V>(&self, key: K, value: V) -> BridgeResult<()>
    where
        K: IntoStack,
        V: IntoStack,
    {
        let vm = self.vm();
        let state = vm.as_raw();
        Stack::reserve(vm, 3)?;
        self.reference.push();
        key.push_to_stack(vm);
        if let Err(err) = check_key(vm) {
            unsafe { ffi::lua_pop(state, 2) };
            return Err(err);
        }
        value.push_to_stack(vm);
        unsafe {
            ffi::lua_rawset(state, -3);
            ffi::lua_pop(state, 1);
        }
        Ok(())
    }

    pub fn contains_key<K: IntoStack>(&self, key: K) -> BridgeResult<bool> {
        let vm = self.vm();
        let state = vm.as_raw();
        Stack::reserve(vm, 2)?;
        self.reference.push();
        key.push_to_stack(vm);
        let present = unsafe { ffi::lua_rawget(state, -2) } != ffi::LUA_TNIL;
        unsafe { ffi::lua_pop(state, 2) };
        Ok(present)
    }

    /// Raw length (the `#` border, without `__len`).
    pub fn len(&self) -> usize {
        let state = self.vm().as_raw();
        self.reference.push();
        let len = unsafe { ffi::lua_rawlen(state, -1) };
        unsafe { ffi::lua_pop(state, 1) };
        len as usize
    }

    pub fn is_empty(&self) -> bool {
        let state = self.vm().as_raw();
        Stack::ensure(self.vm(), 3);
        self.reference.push();
        unsafe { ffi::lua_pushnil(state) };
        let has_entry = unsafe { ffi::lua_next(state, -2) } != 0;
        let leftover = if has_entry { 3 } else { 1 };
        unsafe { ffi::lua_pop(state, leftover) };
        !has_entry
    }

    /// Every key/value pair, in `next` order.
    pub fn pairs<K, V>(&self) -> BridgeResult<Vec<(K, V)>>
    where
        K: FromStack,
        V: FromStack,
    {
        let vm = self.vm();
        let state = vm.as_raw();
        let mut entries: Vec<(K, V)> = Vec::new();
        Stack::reserve(vm, 3)?;
        self.reference.push();
        unsafe { ffi::lua_pushnil(state) };
        while unsafe { ffi::lua_next(state, -2) } != 0 {
            let entry = K::from_stack(vm, -2).and_then(|k| Ok((k, V::from_stack(vm, -1)?)));
            match entry {
                Ok(entry) => {
                    entries.push(entry);
                    unsafe { ffi::lua_pop(state, 1) };
                }
                Err(err) => {
                    unsafe { ffi::lua_pop(state, 3) };
                    return Err(err);
                }
            }
        }
        unsafe { ffi::lua_pop(state, 1) };
        Ok(entries)
    }

    /// Calls member `name` with this table as the first argument, the way
    /// `table:name(...)` does in Lua.
    pub fn call<R, C>(&self, name: &str, args: C) -> BridgeResult<R>
    where
        R: FromReturn,
        C: IntoArgs,
    {
        match self.lookup(name)? {
            Value::Function(function) => function.call(WithReceiver(self, args)),
            other => Err(BridgeError::NotCallable {
                name: name.to_string(),
                actual: other.type_name(),
            }),
        }
    }

    /// Member `name` as a function.
    pub fn function(&self, name: &str) -> BridgeResult<Function> {
        match self.lookup(name)? {
            Value::Function(function) => Ok(function),
            other => Err(BridgeError::TypeMismatch {
                expected: "function",
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// `self[name]` with metamethods, run under `lua_pcall` so a failing
    /// `__index` comes back as an error.
    fn lookup(&self, name: &str) -> BridgeResult<Value> {
        let vm = self.vm();
        let state = vm.as_raw();
        Stack::reserve(vm, 3)?;
        unsafe { ffi::lua_pushcfunction(state, index_member) };
        self.reference.push();
        name.push_to_stack(vm);
        let status = unsafe { ffi::lua_pcall(state, 2, 1, 0) };
        if Status::from_raw(status) != Status::Ok {
            return Err(BridgeError::Runtime(Stack::pop_error_message(vm)));
        }
        Value::pop_from_stack(vm)
    }

    pub fn reference(&self) -> &Ref {
        &self.reference
    }

    pub fn into_ref(self) -> Ref {
        self.reference
    }
}

unsafe extern "C-unwind" fn index_member(state: *mut ffi::lua_State) -> c_int {
    unsafe { ffi::lua_gettable(state, 1) };
    1
}

fn check_key(vm: &Vm) -> BridgeResult<()> {
    match type_at(vm, -1) {
        ValueType::Nil => Err(mismatch("table key", ValueType::Nil)),
        ValueType::Number if unsafe { ffi::lua_isinteger(vm.as_raw(), -1) } == 0 => {
            let number = unsafe { ffi::lua_tonumberx(vm.as_raw(), -1, std::ptr::null_mut()) };
            if number.is_nan() {
                Err(BridgeError::TypeMismatch {
                    expected: "table key",
                    actual: "NaN".to_string(),
                })
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

struct WithReceiver<'a, C>(&'a Table, C);

impl<C: IntoArgs> IntoArgs for WithReceiver<'_, C> {
    const LEN: usize = C::LEN + 1;

    fn push_all(self, vm: &Vm) -> BridgeResult<()> {
        Stack::reserve(vm, Self::LEN as c_int)?;
        self.0.push_to_stack(vm);
        self.1.push_all(vm)
    }
}

impl IntoStack for Table {
    fn push_to_stack(&self, vm: &Vm) {
        self.reference.push_to(vm);
    }
}

impl FromStack for Table {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        match type_at(vm, index) {
            ValueType::Table => Ok(Table::from_ref(Ref::from_index(vm, index))),
            other => Err(mismatch("table", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::convert::Nil;

    #[test]
    fn set_then_get() {
        let vm = Vm::new().unwrap();
        let table = Table::new(&vm);
        table.set("name", "lua").unwrap();
        table.set(1, 10.5f64).unwrap();

        assert_eq!(table.get::<_, String>("name").unwrap(), "lua");
        assert_eq!(table.get::<_, f64>(1).unwrap(), 10.5);
        assert_eq!(table.get::<_, Option<i64>>("missing").unwrap(), None);
        assert!(table.contains_key("name").unwrap());
        assert!(!table.contains_key("missing").unwrap());
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let vm = Vm::new().unwrap();
        let table = Table::new(&vm);
        assert!(table.set(Nil, 1).is_err());
        assert!(table.set(f64::NAN, 1).is_err());
        assert!(table.is_empty());
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn length_and_pairs() {
        let vm = Vm::new().unwrap();
        let table = Table::new(&vm);
        for (i, word) in ["a", "b", "c"].iter().enumerate() {
            table.set(i as i64 + 1, *word).unwrap();
        }
        assert_eq!(table.len(), 3);

        let mut pairs: Vec<(i64, String)> = table.pairs().unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]
        );

        assert!(table.pairs::<i64, i64>().is_err());
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn call_passes_table_as_self() {
        let vm = Vm::new().unwrap();
        let object: Table = vm
            .load_buffer(
                "return { base = 10, add = function(self, n) return self.base + n end }",
                None,
            )
            .unwrap()
            .call(())
            .unwrap();

        assert_eq!(object.call::<i64, _>("add", (5i64,)).unwrap(), 15);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn call_on_non_function_member() {
        let vm = Vm::new().unwrap();
        let table = Table::new(&vm);
        table.set("value", 3).unwrap();

        let err = table.call::<(), _>("value", ()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NotCallable { ref name, actual: "number" } if name == "value"
        ));
        let err = table.call::<(), _>("absent", ()).unwrap_err();
        assert!(matches!(err, BridgeError::NotCallable { actual: "nil", .. }));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn call_follows_index_metamethod() {
        let vm = Vm::new().unwrap();
        let object: Table = vm
            .load_buffer(
                r#"
                local Class = {}
                Class.__index = Class
                function Class:describe(suffix) return self.name .. suffix end
                return setmetatable({ name = "instance" }, Class)
                "#,
                None,
            )
            .unwrap()
            .call(())
            .unwrap();

        assert!(!object.contains_key("describe").unwrap());
        assert_eq!(object.call::<String, _>("describe", ("!",)).unwrap(), "instance!");
        let describe = object.function("describe").unwrap();
        assert_eq!(describe.call::<String, _>((&object, "?")).unwrap(), "instance?");
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn failing_index_metamethod_is_reported() {
        let vm = Vm::new().unwrap();
        let object: Table = vm
            .load_buffer(
                "return setmetatable({}, { __index = function(_, key) error('no member ' .. key, 0) end })",
                None,
            )
            .unwrap()
            .call(())
            .unwrap();

        let err = object.call::<(), _>("run", ()).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(ref m) if m == "no member run"));
        assert!(matches!(
            object.function("run").unwrap_err(),
            BridgeError::Runtime(_)
        ));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn operations_grow_a_deep_stack() {
        let vm = Vm::new().unwrap();
        let table = Table::new(&vm);
        for i in 0..4_000i64 {
            Stack::push(&vm, &i).unwrap();
        }
        table.set("deep", true).unwrap();
        assert!(table.get::<_, bool>("deep").unwrap());
        assert!(table.contains_key("deep").unwrap());
        assert_eq!(table.pairs::<String, bool>().unwrap().len(), 1);
        assert!(!table.is_empty());
        assert_eq!(vm.stack_depth(), 4_000);
        assert_eq!(Stack::get::<i64>(&vm, -1).unwrap(), 3_999);
        unsafe { ffi::lua_settop(vm.as_raw(), 0) };
    }

    #[test]
    fn equality_is_identity() {
        let vm = Vm::new().unwrap();
        let first = Table::new(&vm);
        let second = Table::new(&vm);
        assert_eq!(first, first.clone());
        assert_ne!(first, second);
    }
}
