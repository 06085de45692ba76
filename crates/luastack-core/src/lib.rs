//! Value marshaling and invocation engine between Rust and an embedded Lua 5.4 state.
//!
//! The crate talks to Lua only through its C stack API. Everything that
//! crosses the boundary goes through one of three pieces:
//!
//! - [`core::reference::Ref`]: a registry slot keeping a Lua value alive from Rust.
//! - [`types::convert`]: per-type push/get/pop units ([`IntoStack`], [`FromStack`]).
//! - [`core::function::Function`]: native functions exposed to Lua, and Lua
//!   callables invoked from Rust.

pub mod core;
mod internal;
pub mod types;

pub use mlua_sys as ffi;

pub use crate::core::error::{BridgeError, BridgeResult};
pub use crate::core::function::Function;
pub use crate::core::reference::Ref;
pub use crate::core::stack::{Stack, StackGuard};
pub use crate::core::state::{Vm, VmOptions};
pub use crate::core::table::Table;
pub use crate::core::userdata::UserData;
pub use crate::core::value::Value;
pub use crate::types::args::{FromArgs, IntoArgs};
pub use crate::types::callable::{FromReturn, IntoReturn, NativeFunction};
pub use crate::types::convert::{FromStack, IntoStack, Nil};
pub use crate::types::enums::{ChunkMode, LoadErrorKind, Status, StdLib, ValueType};
pub use crate::types::signature::{
    CallableKind, ConstMethod, Contextual, Frame, Free, IndexSeq, Kind, Method, Signature,
};

pub mod prelude {
    pub use crate::core::error::{BridgeError, BridgeResult};
    pub use crate::core::function::Function;
    pub use crate::core::state::{Vm, VmOptions};
    pub use crate::core::table::Table;
    pub use crate::core::userdata::UserData;
    pub use crate::core::value::Value;
    pub use crate::types::convert::{FromStack, IntoStack, Nil};
    pub use crate::types::enums::{ChunkMode, StdLib, ValueType};
}
