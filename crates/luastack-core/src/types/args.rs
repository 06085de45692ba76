use crate::core::error::{BridgeError, BridgeResult};
use crate::core::stack::Stack;
use crate::core::state::Vm;
use crate::types::convert::{FromStack, IntoStack};
use crate::types::signature::Frame;
use std::any::type_name;
use std::os::raw::c_int;

/// Parameter tuple of a native function, read positionally through a [`Frame`].
pub trait FromArgs: Sized {
    const LEN: usize;

    fn type_names() -> Vec<&'static str>;

    fn read(vm: &Vm, frame: &Frame) -> BridgeResult<Self>;
}

/// Values pushed in order, as call arguments or as captured upvalues.
pub trait IntoArgs {
    const LEN: usize;

    /// Pushes all `LEN` values, or nothing when the stack cannot grow.
    fn push_all(self, vm: &Vm) -> BridgeResult<()>;
}

fn read_one<T: FromStack>(vm: &Vm, frame: &Frame, position: usize) -> BridgeResult<T> {
    T::from_stack(vm, frame.slot(position))
        .map_err(|err| BridgeError::bad_argument(frame.argument_number(position), err))
}

macro_rules! impl_args {
    ($len:expr; $($A:ident $idx:tt),*) => {
        impl<$($A: FromStack,)*> FromArgs for ($($A,)*) {
            const LEN: usize = $len;

            fn type_names() -> Vec<&'static str> {
                vec![$(type_name::<$A>()),*]
            }

            #[allow(unused_variables)]
            fn read(vm: &Vm, frame: &Frame) -> BridgeResult<Self> {
                Ok(($(read_one::<$A>(vm, frame, $idx)?,)*))
            }
        }

        impl<$($A: IntoStack,)*> IntoArgs for ($($A,)*) {
            const LEN: usize = $len;

            #[allow(unused_variables)]
            fn push_all(self, vm: &Vm) -> BridgeResult<()> {
                Stack::reserve(vm, $len as c_int)?;
                $(self.$idx.push_to_stack(vm);)*
                Ok(())
            }
        }
    };
}

impl_args!(0;);
impl_args!(1; A 0);
impl_args!(2; A 0, B 1);
impl_args!(3; A 0, B 1, C 2);
impl_args!(4; A 0, B 1, C 2, D 3);
impl_args!(5; A 0, B 1, C 2, D 3, E 4);
impl_args!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_args!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_args!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
impl_args!(9; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
impl_args!(10; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
impl_args!(11; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10);
impl_args!(12; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11);
