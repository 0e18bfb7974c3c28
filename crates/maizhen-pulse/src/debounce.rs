//! 防抖状态机
//!
//! Clean --编辑--> Pending(截止时间) --编辑--> Pending(新截止时间)
//! Pending --到期--> Clean
//!
//! 时间由调用方传入，便于驱动与测试。

use std::time::Duration;
use tokio::time::Instant;

/// 防抖状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Clean,
    Pending { deadline: Instant },
}

/// 单次触发的防抖定时器
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Clean,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// 启动或重新开始计时
    pub fn trigger(&mut self, now: Instant) {
        self.state = DebounceState::Pending {
            deadline: now + self.delay,
        };
    }

    /// 取消待触发的计时
    pub fn cancel(&mut self) {
        self.state = DebounceState::Clean;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Clean => None,
            DebounceState::Pending { deadline } => Some(deadline),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    /// 到期则回到 Clean 并返回 true
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Pending { deadline } if now >= deadline => {
                self.state = DebounceState::Clean;
                true
            }
            _ => false,
        }
    }
}
