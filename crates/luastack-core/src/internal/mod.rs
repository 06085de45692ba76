pub(crate) mod boxed;
pub(crate) mod dispatch;
pub(crate) mod utils;
