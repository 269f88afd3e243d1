use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mediagen_config::WorkerConfig;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 后台生成任务的有界执行池
///
/// 提交立即返回; 任务在拿到信号量许可后才开始执行, 同时执行的任务数
/// 不超过 `max_concurrent_jobs`。关闭时通过 [`JobRunner::drain`] 等待在途任务。
#[derive(Clone)]
pub struct JobRunner {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    max_concurrent: usize,
}

struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl JobRunner {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            max_concurrent,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.max_concurrent_jobs)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 已提交但尚未结束的任务数 (包括排队等待许可的)
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn spawn<F>(&self, job_id: Uuid, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "执行池已关闭, 任务未执行");
                    return;
                }
            };
            debug!(job_id = %job_id, "开始执行生成任务");
            task.await;
        });
    }

    /// 等待在途任务结束, 最多等待 `grace`; 返回是否全部结束
    pub async fn drain(&self, grace: Duration) -> bool {
        let pending = self.in_flight();
        if pending == 0 {
            return true;
        }
        info!(pending, grace_seconds = grace.as_secs(), "等待在途生成任务结束");

        let wait_idle = async {
            loop {
                let notified = self.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(grace, wait_idle).await {
            Ok(()) => {
                info!("在途生成任务已全部结束");
                true
            }
            Err(_) => {
                warn!(remaining = self.in_flight(), "等待超时, 仍有任务未结束");
                false
            }
        }
    }
}
