use crate::config::AppConfig;
use crate::error::{CancellationError, RetrievalError};
use crate::models::{CancellationCommand, CancellationOutcome, CancellationRequest, InvoiceRecord};
use crate::pac::{InvoiceQuery, PacGateway};
use crate::service::ledger::CancellationLedger;
use crate::service::poller::ResolutionPoller;
use crate::service::refresh::AutoRefresh;
use crate::service::retriever::InvoiceRetriever;
use crate::service::scheduler::Scheduler;
use crate::service::store::InvoiceStore;
use crate::service::submitter::CancellationSubmitter;
use std::sync::{Arc, Mutex};

/// 发票查询页的服务组合: 一个页面/会话一个实例
///
/// 轮询器与自动刷新循环都是有界的, 会自行结束; 实例销毁时不会主动取消它们。
pub struct InvoiceConsole {
    store: InvoiceStore,
    ledger: Arc<CancellationLedger>,
    retriever: Arc<InvoiceRetriever>,
    submitter: CancellationSubmitter,
    poller: ResolutionPoller,
    refresh: AutoRefresh,
    last_query: Mutex<Option<InvoiceQuery>>,
}

impl InvoiceConsole {
    pub fn new(gateway: Arc<dyn PacGateway>, config: &AppConfig) -> Self {
        let store = InvoiceStore::new();
        let ledger = Arc::new(CancellationLedger::new());
        let scheduler = Scheduler::new();
        let retriever = Arc::new(InvoiceRetriever::new(
            gateway.clone(),
            config.retrieval.batch_concurrency,
        ));
        let poller = ResolutionPoller::new(
            gateway.clone(),
            store.clone(),
            ledger.clone(),
            scheduler,
            config.polling.clone(),
        );
        let submitter = CancellationSubmitter::new(
            gateway,
            retriever.clone(),
            store.clone(),
            ledger.clone(),
            poller.clone(),
        );
        let refresh = AutoRefresh::new(
            retriever.clone(),
            store.clone(),
            ledger.clone(),
            scheduler,
            config.refresh.clone(),
        );

        Self {
            store,
            ledger,
            retriever,
            submitter,
            poller,
            refresh,
            last_query: Mutex::new(None),
        }
    }

    /// 执行列表查询并替换当前列表
    pub async fn search(&self, query: InvoiceQuery) -> Result<Vec<InvoiceRecord>, RetrievalError> {
        let records = self.retriever.search(&query).await?;
        self.store.merge_refreshed(records, &self.ledger.active_keys());
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some(query);
        }
        Ok(self.store.get())
    }

    /// 提交取消; 请求结束后 (相当于取消弹窗关闭) 启动列表自动刷新
    pub async fn cancel(
        &self,
        command: CancellationCommand,
    ) -> Result<CancellationOutcome, CancellationError> {
        let result = self.submitter.submit(command).await;
        if result.is_ok() {
            let query = self.last_query.lock().ok().and_then(|q| q.clone());
            if let Some(query) = query {
                self.refresh.start(query);
            }
        }
        result
    }

    pub async fn fetch_invoice(&self, uuid: &str) -> Result<InvoiceRecord, RetrievalError> {
        self.retriever.fetch_invoice(uuid).await
    }

    pub async fn fetch_many(
        &self,
        uuids: &[String],
    ) -> Vec<(String, Result<InvoiceRecord, RetrievalError>)> {
        self.retriever.fetch_many(uuids).await
    }

    pub fn invoices(&self) -> Vec<InvoiceRecord> {
        self.store.get()
    }

    pub fn invoice(&self, uuid: &str) -> Option<InvoiceRecord> {
        self.store.find(uuid)
    }

    pub fn cancellation(&self, uuid: &str) -> Option<CancellationRequest> {
        self.ledger.get(uuid)
    }

    pub fn is_polling(&self, uuid: &str) -> bool {
        self.poller.is_active(uuid)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_running()
    }

    /// 清理已结束的取消请求
    pub fn purge_finished(&self) -> usize {
        self.ledger.purge_terminal()
    }
}
