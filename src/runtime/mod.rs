//! 结果交接原语

pub mod future;

pub use future::Future;
