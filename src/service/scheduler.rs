//! 定时循环调度: 固定间隔执行, 受总时长与最大次数双重约束, 可通过令牌取消

use futures::future::BoxFuture;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// 循环结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// tick 返回 Break
    Finished,
    /// 达到总时长或最大次数
    Expired,
    /// 令牌被取消
    Cancelled,
}

/// 循环参数
#[derive(Debug, Clone, Copy)]
pub struct LoopBudget {
    pub interval: Duration,
    pub budget: Duration,
    pub max_ticks: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    pub fn schedule<T, E>(&self, budget: LoopBudget, tick: T, on_exit: E) -> CancellationToken
    where
        T: FnMut(u32) -> BoxFuture<'static, ControlFlow<()>> + Send + 'static,
        E: FnOnce(LoopExit) + Send + 'static,
    {
        let token = CancellationToken::new();
        self.schedule_with_token(budget, token.clone(), tick, on_exit);
        token
    }

    /// 使用调用方持有的令牌; 首次 tick 在一个间隔之后,
    /// 被取消时正在执行的 tick 会被直接丢弃
    pub fn schedule_with_token<T, E>(
        &self,
        budget: LoopBudget,
        token: CancellationToken,
        mut tick: T,
        on_exit: E,
    ) where
        T: FnMut(u32) -> BoxFuture<'static, ControlFlow<()>> + Send + 'static,
        E: FnOnce(LoopExit) + Send + 'static,
    {
        tokio::spawn(async move {
            let deadline = time::sleep(budget.budget);
            tokio::pin!(deadline);
            // tokio 的 interval 不接受零周期
            let period = budget.interval.max(MIN_INTERVAL);
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut ticks = 0u32;
            let exit = loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break LoopExit::Cancelled,
                    // 与截止时间同时到达的 tick 仍然执行
                    _ = ticker.tick() => {}
                    _ = &mut deadline => break LoopExit::Expired,
                }

                ticks += 1;
                let flow = tokio::select! {
                    biased;
                    _ = token.cancelled() => break LoopExit::Cancelled,
                    flow = tick(ticks) => flow,
                };
                if flow.is_break() {
                    break LoopExit::Finished;
                }
                if ticks >= budget.max_ticks {
                    break LoopExit::Expired;
                }
            };
            on_exit(exit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn budget(max_ticks: u32) -> LoopBudget {
        LoopBudget {
            interval: Duration::from_secs(3),
            budget: Duration::from_secs(30),
            max_ticks,
        }
    }

    fn recorder() -> (Arc<Mutex<Option<LoopExit>>>, impl FnOnce(LoopExit) + Send + 'static) {
        let slot = Arc::new(Mutex::new(None));
        let writer = slot.clone();
        (slot, move |exit| *writer.lock().unwrap() = Some(exit))
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_ticks() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let (exit, on_exit) = recorder();

        Scheduler::new().schedule(
            budget(6),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ControlFlow::Continue(()) }.boxed()
            },
            on_exit,
        );

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 6);
        assert_eq!(*exit.lock().unwrap(), Some(LoopExit::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_budget_caps_ticks() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let (exit, on_exit) = recorder();

        Scheduler::new().schedule(
            LoopBudget {
                interval: Duration::from_secs(5),
                budget: Duration::from_secs(12),
                max_ticks: 100,
            },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ControlFlow::Continue(()) }.boxed()
            },
            on_exit,
        );

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(*exit.lock().unwrap(), Some(LoopExit::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_runs_and_reports_exit() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let (exit, on_exit) = recorder();

        Scheduler::new().schedule(
            LoopBudget {
                interval: Duration::ZERO,
                budget: Duration::from_secs(30),
                max_ticks: 3,
            },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ControlFlow::Continue(()) }.boxed()
            },
            on_exit,
        );

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(*exit.lock().unwrap(), Some(LoopExit::Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn break_finishes_and_cancel_stops() {
        let (exit, on_exit) = recorder();
        Scheduler::new().schedule(
            budget(6),
            |n| async move { if n == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) } }.boxed(),
            on_exit,
        );
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*exit.lock().unwrap(), Some(LoopExit::Finished));

        let (exit, on_exit) = recorder();
        let token = Scheduler::new().schedule(budget(6), |_| async { ControlFlow::Continue(()) }.boxed(), on_exit);
        time::sleep(Duration::from_secs(4)).await;
        token.cancel();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*exit.lock().unwrap(), Some(LoopExit::Cancelled));
    }
}
