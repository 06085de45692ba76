use crate::core::error::BridgeResult;
use crate::core::function::Function;
use crate::core::reference::Ref;
use crate::core::state::Vm;
use crate::core::table::Table;
use crate::ffi;
use crate::internal::utils::{push_bytes, read_bytes};
use crate::types::convert::{FromStack, IntoStack, type_at};
use crate::types::enums::ValueType;
use std::os::raw::c_int;

/// Any Lua value, converted by its dynamic type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    /// Raw bytes; Lua strings need not be UTF-8.
    String(Vec<u8>),
    Function(Function),
    Table(Table),
    /// Userdata, light userdata or a coroutine, kept alive by reference.
    Other(Ref),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) | Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Function(_) => ValueType::Function,
            Value::Table(_) => ValueType::Table,
            Value::Other(reference) => reference.value_type(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl IntoStack for Value {
    fn push_to_stack(&self, vm: &Vm) {
        let state = vm.as_raw();
        match self {
            Value::Nil => unsafe { ffi::lua_pushnil(state) },
            Value::Boolean(value) => value.push_to_stack(vm),
            Value::Integer(value) => value.push_to_stack(vm),
            Value::Number(value) => value.push_to_stack(vm),
            Value::String(bytes) => unsafe { push_bytes(state, bytes) },
            Value::Function(function) => function.push_to_stack(vm),
            Value::Table(table) => table.push_to_stack(vm),
            Value::Other(reference) => reference.push_to(vm),
        }
    }
}

impl FromStack for Value {
    fn from_stack(vm: &Vm, index: c_int) -> BridgeResult<Self> {
        let state = vm.as_raw();
        let value = match type_at(vm, index) {
            ValueType::None | ValueType::Nil => Value::Nil,
            ValueType::Boolean => Value::Boolean(bool::from_stack(vm, index)?),
            ValueType::Number => {
                if unsafe { ffi::lua_isinteger(state, index) } != 0 {
                    Value::Integer(unsafe { ffi::lua_tointegerx(state, index, std::ptr::null_mut()) })
                } else {
                    Value::Number(f64::from_stack(vm, index)?)
                }
            }
            ValueType::String => Value::String(unsafe { read_bytes(state, index) }),
            ValueType::Function => Value::Function(Function::from_stack(vm, index)?),
            ValueType::Table => Value::Table(Table::from_stack(vm, index)?),
            ValueType::LightUserData | ValueType::UserData | ValueType::Thread => {
                Value::Other(Ref::from_index(vm, index))
            }
        };
        Ok(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into_bytes())
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Value::Table(value)
    }
}
