pub mod mutex;

// 重新导出常用类型
pub use mutex::{TaskMutex, TaskMutexGuard};
