// ==========================================
// 定额匹配系统 - 引擎层学习事件发布
// ==========================================
// 职责: 定义学习事件发布 trait，实现依赖倒置
// 说明: 匹配路径只负责发布，学习引擎负责消费
// 约束: 事件不丢弃，发布失败不影响匹配结果
// ==========================================

use crate::domain::project_item::ProjectLineItem;
use crate::domain::quota::EnterpriseQuota;
use crate::domain::types::MatchType;
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 学习事件
// ==========================================

/// 学习事件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningEventSource {
    /// 批量自动匹配
    BatchMatch,
    /// 人工设置单定额
    ManualMatch,
    /// 人工添加多定额
    MultiQuota,
}

impl LearningEventSource {
    pub fn as_str(&self) -> &str {
        match self {
            LearningEventSource::BatchMatch => "BatchMatch",
            LearningEventSource::ManualMatch => "ManualMatch",
            LearningEventSource::MultiQuota => "MultiQuota",
        }
    }
}

/// 一次匹配结果（条目与定额均为快照）
#[derive(Debug, Clone)]
pub struct LearningEvent {
    pub item: ProjectLineItem,
    pub quota: EnterpriseQuota,
    pub score: f64,
    pub match_type: MatchType,
    pub source: LearningEventSource,
}

impl LearningEvent {
    pub fn new(
        item: ProjectLineItem,
        quota: EnterpriseQuota,
        score: f64,
        match_type: MatchType,
        source: LearningEventSource,
    ) -> Self {
        Self {
            item,
            quota,
            score,
            match_type,
            source,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 学习事件发布者
///
/// # 实现说明
/// - `PooledLearningPublisher` 经有界通道交给学习线程记录，通道满时在调用线程记录
/// - 实现不得丢弃事件
pub trait LearningEventPublisher: Send + Sync {
    fn publish(&self, event: LearningEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作发布者（单元测试或关闭学习时使用）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl LearningEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: LearningEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过学习事件 - item_id={}, quota_id={}, source={}",
            event.item.id,
            event.quota.id,
            event.source.as_str()
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn LearningEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn LearningEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件；失败只记录告警
    pub fn publish(&self, event: LearningEvent) {
        let Some(publisher) = &self.inner else {
            tracing::debug!(
                "OptionalEventPublisher: 未配置发布者，跳过事件 - item_id={}, source={}",
                event.item.id,
                event.source.as_str()
            );
            return;
        };

        let item_id = event.item.id;
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(item_id, "学习事件发布失败: {}", e);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

impl Clone for OptionalEventPublisher {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingPublisher {
        events: Mutex<Vec<i64>>,
    }

    impl LearningEventPublisher for RecordingPublisher {
        fn publish(&self, event: LearningEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event.item.id);
            Ok(())
        }
    }

    struct FailingPublisher;

    impl LearningEventPublisher for FailingPublisher {
        fn publish(&self, _event: LearningEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("queue closed".into())
        }
    }

    fn event(item_id: i64) -> LearningEvent {
        LearningEvent::new(
            ProjectLineItem {
                id: item_id,
                ..Default::default()
            },
            EnterpriseQuota::default(),
            0.9,
            MatchType::Auto,
            LearningEventSource::BatchMatch,
        )
    }

    #[test]
    fn test_optional_publisher_forwards_events() {
        let recorder = Arc::new(RecordingPublisher {
            events: Mutex::new(Vec::new()),
        });
        let publisher = OptionalEventPublisher::with_publisher(recorder.clone());
        assert!(publisher.is_configured());

        publisher.publish(event(1));
        publisher.publish(event(2));
        assert_eq!(*recorder.events.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_optional_publisher_swallows_failures() {
        let publisher = OptionalEventPublisher::with_publisher(Arc::new(FailingPublisher));
        publisher.publish(event(1));

        let none = OptionalEventPublisher::default();
        assert!(!none.is_configured());
        none.publish(event(2));
    }

    #[test]
    fn test_noop_publisher() {
        assert!(NoOpEventPublisher.publish(event(1)).is_ok());
    }
}
