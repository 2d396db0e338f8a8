//! 任务标识

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// 任务 ID 计数器，从 1 开始
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// 任务 ID
///
/// 进程内单调递增，不会复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// 分配一个新的 ID
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 任务名称和 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident {
    name: &'static str,
    id: TaskId,
}

impl Ident {
    pub const fn new(name: &'static str, id: TaskId) -> Self {
        Self { name, id }
    }

    /// 以新分配的 ID 构造
    pub fn named(name: &'static str) -> Self {
        Self::new(name, TaskId::next())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
