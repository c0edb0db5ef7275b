// ==========================================
// 保护定值同步系统 - 定值源接口
// ==========================================
// 职责: 按区域 / 设备范围批量查询定值记录
// 重试: 由 RetryPolicy 注入，RetryingSource 包装任意定值源
// ==========================================

use crate::domain::setting::SettingRecord;
use crate::domain::types::Region;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// 定值源错误
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("定值库连接失败: {0}")]
    Connection(String),

    #[error("定值库查询失败: {0}")]
    Query(String),

    #[error("定值数据格式错误 (记录 {record_id}): {message}")]
    InvalidRow { record_id: String, message: String },

    #[error("定值库查询重试 {attempts} 次后仍失败: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl SourceError {
    /// 可重试的瞬时故障
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connection(_))
    }
}

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                SourceError::Connection(err.to_string())
            }
            _ => SourceError::Query(err.to_string()),
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// 查询范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsQuery {
    pub region: Region,
    pub plant_scope: Option<Vec<String>>, // 限定设备标识键；None 表示全区域
}

impl SettingsQuery {
    pub fn region(region: Region) -> Self {
        Self {
            region,
            plant_scope: None,
        }
    }

    pub fn with_plant_scope(mut self, keys: Vec<String>) -> Self {
        self.plant_scope = Some(keys);
        self
    }

    /// 记录是否落在查询范围内
    pub fn includes(&self, record: &SettingRecord) -> bool {
        match &self.plant_scope {
            None => true,
            Some(keys) => keys.iter().any(|k| k == &record.device_key),
        }
    }
}

// ==========================================
// SettingsSource Trait
// ==========================================
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// 批量查询定值记录（按定值源顺序）
    async fn fetch(&self, query: &SettingsQuery) -> SourceResult<Vec<SettingRecord>>;
}

// ==========================================
// RetryPolicy - 重试策略
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,         // 最大尝试次数（含首次）
    pub initial_backoff: Duration, // 首次重试前等待
    pub multiplier: f64,           // 退避倍数
    pub max_backoff: Duration,     // 单次等待上限
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1_000),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// 不重试
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 第 n 次重试前的等待时间（n 从 1 起）
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

// ==========================================
// RetryingSource - 带重试的定值源
// ==========================================
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: SettingsSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: SettingsSource> SettingsSource for RetryingSource<S> {
    async fn fetch(&self, query: &SettingsQuery) -> SourceResult<Vec<SettingRecord>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.inner.fetch(query).await {
                Ok(records) => {
                    if attempt > 1 {
                        info!(attempt, records = records.len(), "定值库查询重试成功");
                    }
                    return Ok(records);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let wait = self.policy.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "定值库查询失败，等待后重试"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(SourceError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 N 次返回连接错误的定值源
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
        permanent: bool,
    }

    #[async_trait]
    impl SettingsSource for FlakySource {
        async fn fetch(&self, _query: &SettingsQuery) -> SourceResult<Vec<SettingRecord>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(SourceError::Query("syntax error".into()));
            }
            if n < self.failures {
                return Err(SourceError::Connection("timeout".into()));
            }
            Ok(vec![SettingRecord::new("1", "RC-1", "T1")])
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(5),
        }
    }

    fn flaky(failures: u32, permanent: bool) -> FlakySource {
        FlakySource {
            failures,
            calls: AtomicU32::new(0),
            permanent,
        }
    }

    #[test]
    fn test_backoff_curve() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(4_000));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let source = RetryingSource::new(flaky(2, false), fast_policy(3));
        let records = source.fetch(&SettingsQuery::region(Region::Ergon)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let source = RetryingSource::new(flaky(5, false), fast_policy(3));
        let err = source.fetch(&SettingsQuery::region(Region::Ergon)).await.unwrap_err();
        assert!(matches!(err, SourceError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let source = RetryingSource::new(flaky(0, true), fast_policy(5));
        let err = source.fetch(&SettingsQuery::region(Region::Energex)).await.unwrap_err();
        assert!(matches!(err, SourceError::Query(_)));
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_plant_scope() {
        let query = SettingsQuery::region(Region::Ergon).with_plant_scope(vec!["RC-1".into()]);
        assert!(query.includes(&SettingRecord::new("1", "RC-1", "T1")));
        assert!(!query.includes(&SettingRecord::new("2", "RC-2", "T1")));
    }
}
