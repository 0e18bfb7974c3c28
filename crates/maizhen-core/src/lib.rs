//! # Maizhen Core
//!
//! 脉诊病历系统的核心模块，提供基础数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod pulse;
pub mod utils;

pub use error::{MaizhenError, Result};
pub use models::*;
pub use pulse::{Depth, Hand, PulseGrid, PulsePosition, Segment};
pub use utils::EntryId;
