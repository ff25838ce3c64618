#![allow(dead_code)]

use async_trait::async_trait;
use cfdi_cancel_sync::config::{PollingConfig, RefreshConfig};
use cfdi_cancel_sync::models::{InvoiceRecord, RecordSource};
use cfdi_cancel_sync::pac::{
    BackendAck, CancelRequestBody, InvoiceQuery, PacGateway, RawDocument, SearchResponse,
};
use cfdi_cancel_sync::service::{
    CancellationLedger, CancellationSubmitter, InvoiceRetriever, InvoiceStore, ResolutionPoller,
    Scheduler,
};
use cfdi_cancel_sync::PacError;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const UUID: &str = "6f1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";

/// 脚本化的内存网关
pub struct FakeGateway {
    pub ack: Mutex<BackendAck>,
    /// 依次弹出; 用完后返回 `fallback_resolution`
    pub resolutions: Mutex<VecDeque<Option<String>>>,
    pub fallback_resolution: Mutex<Option<String>>,
    pub facturas: Mutex<Vec<Value>>,
    pub structured: Mutex<Option<RawDocument>>,
    pub raw_xml: Mutex<Option<RawDocument>>,
    pub submitted: Mutex<Vec<CancelRequestBody>>,
    /// 调用顺序
    pub calls: Mutex<Vec<&'static str>>,
    pub submit_calls: AtomicUsize,
    pub resolution_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            ack: Mutex::new(BackendAck {
                exitoso: true,
                mensaje: Some("Solicitud enviada".to_string()),
            }),
            resolutions: Mutex::new(VecDeque::new()),
            fallback_resolution: Mutex::new(None),
            facturas: Mutex::new(Vec::new()),
            structured: Mutex::new(None),
            raw_xml: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            resolution_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_resolutions(self, script: &[Option<&str>], fallback: Option<&str>) -> Self {
        *self.resolutions.lock().unwrap() = script.iter().map(|s| s.map(str::to_string)).collect();
        *self.fallback_resolution.lock().unwrap() = fallback.map(str::to_string);
        self
    }

    pub fn rejecting(self, message: &str) -> Self {
        *self.ack.lock().unwrap() = BackendAck {
            exitoso: false,
            mensaje: Some(message.to_string()),
        };
        self
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn resolution_calls(&self) -> usize {
        self.resolution_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacGateway for FakeGateway {
    async fn search_invoices(&self, _query: &InvoiceQuery) -> Result<SearchResponse, PacError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("search");
        Ok(SearchResponse {
            exitoso: true,
            mensaje: None,
            facturas: self.facturas.lock().unwrap().clone(),
        })
    }

    async fn submit_cancellation(&self, body: &CancelRequestBody) -> Result<BackendAck, PacError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("submit");
        self.submitted.lock().unwrap().push(body.clone());
        Ok(self.ack.lock().unwrap().clone())
    }

    async fn query_resolution(&self, _uuid: &str) -> Result<Option<String>, PacError> {
        self.resolution_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("resolution");
        let next = self.resolutions.lock().unwrap().pop_front();
        Ok(match next {
            Some(scripted) => scripted,
            None => self.fallback_resolution.lock().unwrap().clone(),
        })
    }

    async fn fetch_structured(&self, _uuid: &str) -> Result<RawDocument, PacError> {
        self.calls.lock().unwrap().push("structured");
        self.structured
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PacError::Transport("connection refused".to_string()))
    }

    async fn fetch_raw_xml(&self, _uuid: &str) -> Result<RawDocument, PacError> {
        self.calls.lock().unwrap().push("raw_xml");
        self.raw_xml
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PacError::Transport("connection refused".to_string()))
    }
}

pub fn issued_invoice(uuid: &str) -> InvoiceRecord {
    let mut record = InvoiceRecord::empty(uuid, RecordSource::Structured);
    record.issuer_rfc = "AAA010101AAA".to_string();
    record.receiver_rfc = "XAXX010101000".to_string();
    record.invoicing_status_raw = "Emitida".to_string();
    record.sat_status_raw = "Vigente".to_string();
    record.cancel_allowed = true;
    record
}

/// 取消流程所需的组件 (不含自动刷新)
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub store: InvoiceStore,
    pub ledger: Arc<CancellationLedger>,
    pub retriever: Arc<InvoiceRetriever>,
    pub poller: ResolutionPoller,
    pub submitter: CancellationSubmitter,
}

impl Harness {
    pub fn new(gateway: FakeGateway) -> Self {
        let gateway = Arc::new(gateway);
        let store = InvoiceStore::new();
        let ledger = Arc::new(CancellationLedger::new());
        let retriever = Arc::new(InvoiceRetriever::new(gateway.clone(), 2));
        let poller = ResolutionPoller::new(
            gateway.clone(),
            store.clone(),
            ledger.clone(),
            Scheduler::new(),
            PollingConfig::default(),
        );
        let submitter = CancellationSubmitter::new(
            gateway.clone(),
            retriever.clone(),
            store.clone(),
            ledger.clone(),
            poller.clone(),
        );
        store.upsert(issued_invoice(UUID));
        Self {
            gateway,
            store,
            ledger,
            retriever,
            poller,
            submitter,
        }
    }
}

pub fn refresh_config() -> RefreshConfig {
    RefreshConfig::default()
}
