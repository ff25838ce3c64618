use crate::config::RefreshConfig;
use crate::pac::InvoiceQuery;
use crate::service::ledger::CancellationLedger;
use crate::service::retriever::InvoiceRetriever;
use crate::service::scheduler::{LoopBudget, LoopExit, Scheduler};
use crate::service::store::InvoiceStore;
use futures::FutureExt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// 列表自动刷新: 取消弹窗关闭后定时重跑同一查询, 到达上限后自动停止
#[derive(Clone)]
pub struct AutoRefresh {
    retriever: Arc<InvoiceRetriever>,
    store: InvoiceStore,
    ledger: Arc<CancellationLedger>,
    scheduler: Scheduler,
    settings: RefreshConfig,
    /// 单实例: 新循环启动前取消旧循环
    current: Arc<Mutex<Option<(u64, CancellationToken)>>>,
    generation: Arc<AtomicU64>,
}

impl AutoRefresh {
    pub fn new(
        retriever: Arc<InvoiceRetriever>,
        store: InvoiceStore,
        ledger: Arc<CancellationLedger>,
        scheduler: Scheduler,
        settings: RefreshConfig,
    ) -> Self {
        Self {
            retriever,
            store,
            ledger,
            scheduler,
            settings,
            current: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn start(&self, query: InvoiceQuery) {
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut current = match self.current.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some((_, previous)) = current.replace((generation, token.clone())) {
                tracing::info!("[Refresh] 取消正在运行的自动刷新");
                previous.cancel();
            }
        }

        let tick = {
            let this = self.clone();
            move |cycle: u32| {
                let this = this.clone();
                let query = query.clone();
                async move {
                    this.refresh_once(&query, cycle).await;
                    ControlFlow::Continue(())
                }
                .boxed()
            }
        };
        let on_exit = {
            let current = self.current.clone();
            move |exit: LoopExit| {
                if let Ok(mut guard) = current.lock() {
                    if matches!(guard.as_ref(), Some((g, _)) if *g == generation) {
                        *guard = None;
                    }
                }
                tracing::info!("[Refresh] 自动刷新结束: {:?}", exit);
            }
        };

        let budget = LoopBudget {
            interval: self.settings.interval(),
            budget: self.settings.budget(),
            max_ticks: self.settings.max_cycles,
        };
        self.scheduler.schedule_with_token(budget, token, tick, on_exit);
        tracing::info!(
            "[Refresh] 开始自动刷新 (间隔 {:?}, 上限 {:?} / {} 次)",
            budget.interval, budget.budget, budget.max_ticks
        );
    }

    pub fn stop(&self) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some((_, token)) = guard.take() {
                token.cancel();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    async fn refresh_once(&self, query: &InvoiceQuery, cycle: u32) {
        match self.retriever.search(query).await {
            Ok(records) => {
                let pending = self.ledger.active_keys();
                let count = records.len();
                self.store.merge_refreshed(records, &pending);
                tracing::debug!("[Refresh] 第 {} 次刷新, {} 张发票", cycle, count);
            }
            Err(e) => tracing::warn!("[Refresh] 第 {} 次刷新失败: {}", cycle, e),
        }
    }
}
