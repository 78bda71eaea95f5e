// ==========================================
// 定额匹配系统 - 匹配线程池
// ==========================================
// rayon 固定线程池 + 信号量限制在途任务数
// 在途任务达到 线程数 + 队列容量 时由提交方线程直接执行（不丢任务）
// ==========================================

use crate::config::MatchingConfig;
use crate::engine::error::{EngineError, EngineResult};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// 任务的执行位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Pooled,
    RanOnCaller,
}

pub struct WorkerPool {
    name: String,
    pool: ThreadPool,
    admission: Arc<Semaphore>,
    capacity: usize,
    caller_runs: AtomicU64,
}

impl WorkerPool {
    /// 创建线程池
    ///
    /// # 参数
    /// - threads: 工作线程数
    /// - queue_capacity: 线程全忙时还可排队的任务数
    pub fn new(name: &str, threads: usize, queue_capacity: usize) -> EngineResult<Self> {
        let threads = threads.max(1);
        let capacity = threads + queue_capacity.max(1);
        let thread_prefix = name.to_string();
        let panic_pool = name.to_string();

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{}-{}", thread_prefix, i))
            .panic_handler(move |_| error!(pool = %panic_pool, "任务执行 panic"))
            .build()
            .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;

        debug!(pool = name, threads, capacity, "线程池已启动");
        Ok(Self {
            name: name.to_string(),
            pool,
            admission: Arc::new(Semaphore::new(capacity)),
            capacity,
            caller_runs: AtomicU64::new(0),
        })
    }

    /// 批量匹配池
    pub fn for_matching(config: &MatchingConfig) -> EngineResult<Self> {
        Self::new("quota-match", config.pool_size, config.pool_queue_capacity)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// 同时在途（执行中 + 排队）任务上限
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 因饱和而在提交方线程执行的任务数
    pub fn caller_runs(&self) -> u64 {
        self.caller_runs.load(Ordering::Relaxed)
    }

    /// 提交任务；在途任务已满时在当前线程执行
    pub fn dispatch<F>(&self, job: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        match self.admission.clone().try_acquire_owned() {
            Ok(permit) => {
                self.pool.spawn(move || {
                    let _permit = permit;
                    job();
                });
                Dispatch::Pooled
            }
            Err(_) => {
                self.caller_runs.fetch_add(1, Ordering::Relaxed);
                debug!(pool = %self.name, "线程池已满，由提交方线程执行");
                job();
                Dispatch::RanOnCaller
            }
        }
    }
}
