use crate::ffi;
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_int;

/// Dynamic type tag of a stack slot, as reported by `lua_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ValueType {
    /// Index outside the current frame.
    None = ffi::LUA_TNONE,
    Nil = ffi::LUA_TNIL,
    Boolean = ffi::LUA_TBOOLEAN,
    LightUserData = ffi::LUA_TLIGHTUSERDATA,
    Number = ffi::LUA_TNUMBER,
    String = ffi::LUA_TSTRING,
    Table = ffi::LUA_TTABLE,
    Function = ffi::LUA_TFUNCTION,
    UserData = ffi::LUA_TUSERDATA,
    Thread = ffi::LUA_TTHREAD,
}

impl ValueType {
    pub(crate) fn from_raw(tag: c_int) -> Self {
        ValueType::try_from(tag).unwrap_or(ValueType::None)
    }

    /// The name Lua itself uses for this type (`type(v)` in scripts).
    pub fn name(self) -> &'static str {
        match self {
            ValueType::None => "no value",
            ValueType::Nil => "nil",
            ValueType::Boolean => "boolean",
            ValueType::LightUserData | ValueType::UserData => "userdata",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Table => "table",
            ValueType::Function => "function",
            ValueType::Thread => "thread",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status codes returned by `lua_pcall` and the chunk loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Status {
    Ok = ffi::LUA_OK,
    Yield = ffi::LUA_YIELD,
    RuntimeError = ffi::LUA_ERRRUN,
    SyntaxError = ffi::LUA_ERRSYNTAX,
    MemoryError = ffi::LUA_ERRMEM,
    HandlerError = ffi::LUA_ERRERR,
    FileError = ffi::LUA_ERRERR + 1,
}

impl Status {
    pub(crate) fn from_raw(code: c_int) -> Self {
        Status::try_from(code).unwrap_or(Status::RuntimeError)
    }
}

/// Why a chunk failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    Syntax,
    Memory,
    File,
}

impl LoadErrorKind {
    pub fn from_status(status: Status) -> Option<Self> {
        match status {
            Status::SyntaxError => Some(LoadErrorKind::Syntax),
            Status::MemoryError => Some(LoadErrorKind::Memory),
            Status::FileError => Some(LoadErrorKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadErrorKind::Syntax => "syntax error",
            LoadErrorKind::Memory => "memory error",
            LoadErrorKind::File => "file error",
        })
    }
}

/// Which chunk encodings the loaders accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkMode {
    #[default]
    Text,
    Binary,
    Any,
}

impl ChunkMode {
    pub(crate) fn as_cstr(self) -> &'static CStr {
        match self {
            ChunkMode::Text => c"t",
            ChunkMode::Binary => c"b",
            ChunkMode::Any => c"bt",
        }
    }
}

bitflags! {
    /// Standard libraries opened when a [`Vm`](crate::core::state::Vm) is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StdLib: u32 {
        const BASE = 1 << 0;
        const COROUTINE = 1 << 1;
        const TABLE = 1 << 2;
        const IO = 1 << 3;
        const OS = 1 << 4;
        const STRING = 1 << 5;
        const UTF8 = 1 << 6;
        const MATH = 1 << 7;
        const DEBUG = 1 << 8;
        const PACKAGE = 1 << 9;

        const NONE = 0;
        const ALL = Self::BASE.bits()
            | Self::COROUTINE.bits()
            | Self::TABLE.bits()
            | Self::IO.bits()
            | Self::OS.bits()
            | Self::STRING.bits()
            | Self::UTF8.bits()
            | Self::MATH.bits()
            | Self::DEBUG.bits()
            | Self::PACKAGE.bits();
    }
}

impl Default for StdLib {
    fn default() -> Self {
        StdLib::ALL
    }
}

impl StdLib {
    /// Module name and opener for every library in the set, in load order.
    pub(crate) fn openers(self) -> Vec<(&'static CStr, ffi::lua_CFunction)> {
        let table: [(StdLib, &'static CStr, ffi::lua_CFunction); 10] = [
            (StdLib::BASE, c"_G", ffi::luaopen_base),
            (StdLib::PACKAGE, c"package", ffi::luaopen_package),
            (StdLib::COROUTINE, c"coroutine", ffi::luaopen_coroutine),
            (StdLib::TABLE, c"table", ffi::luaopen_table),
            (StdLib::IO, c"io", ffi::luaopen_io),
            (StdLib::OS, c"os", ffi::luaopen_os),
            (StdLib::STRING, c"string", ffi::luaopen_string),
            (StdLib::UTF8, c"utf8", ffi::luaopen_utf8),
            (StdLib::MATH, c"math", ffi::luaopen_math),
            (StdLib::DEBUG, c"debug", ffi::luaopen_debug),
        ];

        table
            .into_iter()
            .filter(|(flag, _, _)| self.contains(*flag))
            .map(|(_, name, open)| (name, open))
            .collect()
    }
}
