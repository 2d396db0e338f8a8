use super::{FlagSet, Ident, TaskId, TaskKind, TaskRef};
use crate::error::{FiberError, Result, TaskResult};
use crate::runtime::Future;
use std::sync::Arc;

/// 任务结果的 Future
pub type TaskFuture<R> = Arc<Future<TaskResult<R>>>;

/// 调用者持有的任务句柄
///
/// 由执行器的 `create_task` 返回。调用 [`TaskHandle::queue_start`] 之前任务不会运行。
pub struct TaskHandle<R> {
    task: TaskRef,
    future: TaskFuture<R>,
}

impl<R: Send> TaskHandle<R> {
    pub(crate) fn new(task: TaskRef, future: TaskFuture<R>) -> Self {
        Self { task, future }
    }

    pub fn ident(&self) -> Ident {
        self.task.ident()
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// 当前状态位快照
    pub fn flags(&self) -> FlagSet {
        self.task.flags().load()
    }

    pub fn is_finished(&self) -> bool {
        self.flags().is_finished()
    }

    /// 把任务放进就绪队列，返回结果的 Future
    ///
    /// 每个任务只能启动一次，重复调用返回 [`FiberError::AlreadyQueued`]。
    pub fn queue_start(&self) -> Result<TaskFuture<R>> {
        self.task
            .flags()
            .update_with(|cur| cur.is_empty().then_some(FlagSet::QUEUED))
            .map_err(|_| FiberError::AlreadyQueued(self.task.ident()))?;
        self.task.schedule();
        Ok(self.future.clone())
    }

    /// 结果的 Future，不启动任务
    pub fn future(&self) -> TaskFuture<R> {
        self.future.clone()
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }
}
