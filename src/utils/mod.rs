pub mod decimal;
pub mod keyed_lock;
pub mod sanitize;
