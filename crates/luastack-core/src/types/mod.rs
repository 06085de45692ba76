pub mod args;
pub mod callable;
pub mod convert;
pub mod enums;
pub mod signature;
