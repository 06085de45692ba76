pub mod error;
pub mod function;
pub mod reference;
pub mod stack;
pub mod state;
pub mod table;
pub mod userdata;
pub mod value;
