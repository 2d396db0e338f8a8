//! 任务间通信

pub mod channel;
pub mod ring;
pub mod sync_channel;

// 重新导出常用类型
pub use channel::Channel;
pub use ring::Ring;
pub use sync_channel::SyncChannel;
