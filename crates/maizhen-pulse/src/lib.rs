//! # 脉象九宫格模块
//!
//! 维护18个格子与整体描述的录入状态，并在用户编辑停顿后
//! 触发相似病历搜索。加载已有病历不会触发搜索。

pub mod debounce;
pub mod grid;

pub use debounce::{DebounceState, Debouncer};
pub use grid::{PulseGridModel, SimilarityQuery, DEFAULT_DEBOUNCE};
