// ==========================================
// 定额匹配系统 - 学习定时任务
// ==========================================
// 每个周期依次执行: 关键词权重分析 → 同义词挖掘
// 单次失败只记录日志，循环继续
// ==========================================

use crate::config::MatchingConfig;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::learning::{LearningEngine, LearningPassSummary};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

pub struct LearningScheduler {
    engine: Arc<LearningEngine>,
    period: Duration,
}

impl LearningScheduler {
    pub fn new(engine: Arc<LearningEngine>, period: Duration) -> Self {
        Self {
            engine,
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub fn from_config(engine: Arc<LearningEngine>, config: &MatchingConfig) -> Self {
        Self::new(engine, config.learning_interval())
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 执行一次学习分析（在阻塞线程池中运行）
    pub async fn run_once(&self) -> EngineResult<LearningPassSummary> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.run_analysis())
            .await
            .map_err(|e| EngineError::LearningFailure(e.to_string()))?
    }

    /// 按周期执行直到 shutdown 完成，返回执行的轮数
    ///
    /// 首轮在一个周期之后执行
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = time::interval_at(time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut passes = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("学习定时任务停止: passes={}", passes);
                    return passes;
                }
                _ = ticker.tick() => {
                    passes += 1;
                    tracing::info!("开始执行学习分析任务: pass={}", passes);
                    match self.run_once().await {
                        Ok(summary) => tracing::info!(
                            "学习分析任务完成: weights_updated={}, rules_created={}",
                            summary.weights.keywords_updated,
                            summary.synonyms.rules_created
                        ),
                        Err(e) => tracing::error!("学习分析任务失败: {}", e),
                    }
                }
            }
        }
    }

    /// 在后台运行，直到返回的句柄被 abort
    pub fn spawn(self) -> JoinHandle<usize> {
        tokio::spawn(async move { self.run_until(std::future::pending::<()>()).await })
    }
}
