//! 本地持久化：研究会话的工具调用轨迹。

pub mod scratchpad_log;

pub use scratchpad_log::write_scratchpad_log;
