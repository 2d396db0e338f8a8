//! 内核：协程、任务与执行器

pub mod coroutine;
pub mod scheduler;
pub mod task;
