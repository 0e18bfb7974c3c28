//! 加载请求的取消
//!
//! 同一类加载（患者或病历）同时只有一个是当前的。发起新加载时取消上一个，
//! 被取消的请求即使之后返回了结果也不会写入状态。

use maizhen_core::{MaizhenError, Result};
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 加载类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadFamily {
    Patient,
    Record,
}

/// 一次加载请求的凭据
#[derive(Debug, Clone)]
pub struct LoadTicket {
    family: LoadFamily,
    target: i64,
    seq: u64,
    token: CancellationToken,
}

impl LoadTicket {
    pub fn family(&self) -> LoadFamily {
        self.family
    }

    /// 要加载的患者或病历ID
    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 运行请求，被取消时立即返回 `Cancelled`
    pub async fn run<F, T>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            _ = self.token.cancelled() => Err(MaizhenError::Cancelled),
            result = request => result,
        }
    }
}

/// 加载闸门
#[derive(Debug, Default)]
pub struct LoadGate {
    next_seq: u64,
    in_flight: HashMap<LoadFamily, (u64, CancellationToken)>,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发起新加载，取消同类的上一个请求
    pub fn begin(&mut self, family: LoadFamily, target: i64) -> LoadTicket {
        if let Some((seq, previous)) = self.in_flight.remove(&family) {
            debug!("Cancelling {:?} load #{}", family, seq);
            previous.cancel();
        }

        self.next_seq += 1;
        let token = CancellationToken::new();
        self.in_flight.insert(family, (self.next_seq, token.clone()));

        LoadTicket {
            family,
            target,
            seq: self.next_seq,
            token,
        }
    }

    /// 是否仍是该类别的当前请求
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        !ticket.is_cancelled()
            && matches!(self.in_flight.get(&ticket.family), Some((seq, _)) if *seq == ticket.seq)
    }

    /// 结束请求；只有当前请求返回 true，调用方随后才能写入状态
    pub fn complete(&mut self, ticket: &LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.in_flight.remove(&ticket.family);
        true
    }

    /// 取消所有在途加载
    pub fn cancel_all(&mut self) {
        for (_, (_, token)) in self.in_flight.drain() {
            token.cancel();
        }
    }
}
