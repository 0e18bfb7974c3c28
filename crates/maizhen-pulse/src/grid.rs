//! 九宫格录入模型
//!
//! 用户编辑格子或整体描述时标记为已编辑并重新开始防抖计时；计时到期后，
//! 九宫格非空则发起相似病历搜索，否则直接清空结果。整体替换（加载病历）
//! 不标记编辑，也不会触发搜索。
//!
//! 每次搜索带一个递增的令牌，只接受最新令牌的响应，先发后至的旧响应被丢弃。

use maizhen_client::RecordApi;
use maizhen_core::{PulseGrid, PulsePosition, Result, SimilarRecord};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;

/// 默认防抖时长
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// 一次待发出的相似病历搜索
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    pub token: u64,
    pub grid: PulseGrid,
}

/// 九宫格录入模型
#[derive(Debug, Clone)]
pub struct PulseGridModel {
    grid: PulseGrid,
    user_edited: bool,
    debouncer: Debouncer,
    similar: Vec<SimilarRecord>,
    loading: bool,
    latest_token: u64,
}

impl Default for PulseGridModel {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl PulseGridModel {
    pub fn new(debounce: Duration) -> Self {
        Self {
            grid: PulseGrid::default(),
            user_edited: false,
            debouncer: Debouncer::new(debounce),
            similar: Vec::new(),
            loading: false,
            latest_token: 0,
        }
    }

    pub fn grid(&self) -> &PulseGrid {
        &self.grid
    }

    /// 用户编辑单个格子
    pub fn set_cell(&mut self, position: PulsePosition, value: impl Into<String>, now: Instant) {
        self.grid.set_cell(position, value);
        self.mark_edited(now);
    }

    /// 用户编辑整体描述
    pub fn set_overall(&mut self, value: impl Into<String>, now: Instant) {
        self.grid.set_overall_description(value);
        self.mark_edited(now);
    }

    fn mark_edited(&mut self, now: Instant) {
        self.user_edited = true;
        self.debouncer.trigger(now);
    }

    /// 整体替换为外部加载的内容，不标记编辑并取消待触发的搜索
    pub fn load(&mut self, grid: PulseGrid) {
        self.grid = grid;
        self.user_edited = false;
        self.debouncer.cancel();
    }

    pub fn is_user_edited(&self) -> bool {
        self.user_edited
    }

    /// 下一次需要调用 [`poll`](Self::poll) 的时间
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// 推进防抖计时
    ///
    /// 到期且九宫格非空时返回需要发出的搜索；九宫格为空时清空结果。
    /// 无论哪种情况，到期后都会清除已编辑标记。
    pub fn poll(&mut self, now: Instant) -> Option<SimilarityQuery> {
        if !self.debouncer.fire_if_due(now) {
            return None;
        }
        self.user_edited = false;
        // 旧的在途请求一律作废
        self.latest_token += 1;

        if self.grid.is_empty() {
            debug!("Pulse grid is empty, clearing similar records");
            self.similar.clear();
            self.loading = false;
            return None;
        }

        self.loading = true;
        Some(SimilarityQuery {
            token: self.latest_token,
            grid: self.grid.clone(),
        })
    }

    /// 应用搜索结果，旧令牌的响应被丢弃并返回 false
    ///
    /// 搜索失败只记录日志，保留之前的结果。
    pub fn apply_results(&mut self, token: u64, outcome: Result<Vec<SimilarRecord>>) -> bool {
        if token != self.latest_token {
            debug!("Discarding similar records for stale query {} (latest {})", token, self.latest_token);
            return false;
        }
        self.loading = false;
        match outcome {
            Ok(records) => {
                info!("Found {} similar records", records.len());
                self.similar = records;
            }
            Err(e) => warn!("Search similar failed: {}", e),
        }
        true
    }

    /// 到期时发起搜索并应用结果，返回是否调用了搜索服务
    pub async fn search_if_due(&mut self, now: Instant, api: &dyn RecordApi) -> bool {
        let Some(query) = self.poll(now) else {
            return false;
        };
        let outcome = api.search_similar(&query.grid).await;
        self.apply_results(query.token, outcome);
        true
    }

    /// 等待防抖计时结束并完成搜索
    pub async fn settle(&mut self, api: &dyn RecordApi) {
        while let Some(deadline) = self.next_deadline() {
            tokio::time::sleep_until(deadline).await;
            self.search_if_due(Instant::now(), api).await;
        }
    }

    pub fn similar_records(&self) -> &[SimilarRecord] {
        &self.similar
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// 相似病历中与当前录入命中的格子
    pub fn is_match(record: &SimilarRecord, position: PulsePosition) -> bool {
        let key = position.key();
        record.matches.iter().any(|m| *m == key)
    }
}
