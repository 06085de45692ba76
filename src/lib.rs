//! Calling between Rust and an embedded Lua 5.4 state through the raw stack API.
//!
//! ```no_run
//! use luastack::prelude::*;
//!
//! # fn main() -> BridgeResult<()> {
//! let vm = Vm::new()?;
//! let add = Function::create(&vm, |a: i64, b: i64| a + b, ())?;
//! vm.globals().set("add", &add)?;
//!
//! let sum: i64 = vm.load_buffer("return add(40, 2)", None)?.call(())?;
//! assert_eq!(sum, 42);
//! # Ok(())
//! # }
//! ```
//!
//! Native functions come in four shapes, each with its own constructor on
//! [`Function`]: plain functions, methods taking `&mut T` or `&T` from a
//! [`UserData<T>`] receiver, and contextual functions that also receive the
//! calling [`Vm`].

pub use luastack_core::*;

pub mod prelude {
    pub use luastack_core::prelude::*;
    pub use luastack_core::{FromReturn, IntoArgs, NativeFunction};
}
