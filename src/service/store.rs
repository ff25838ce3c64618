use crate::models::InvoiceRecord;
use crate::pac::format_fiscal_uuid;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// 内存中的发票列表 (唯一的共享可变状态)
///
/// 所有修改都通过 `apply` 以同步闭包执行, 闭包内没有 await,
/// 每次调用在一把锁内原子完成。
#[derive(Clone, Default)]
pub struct InvoiceStore {
    inner: Arc<RwLock<IndexMap<String, InvoiceRecord>>>,
}

impl InvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前列表快照 (保持查询顺序)
    pub fn get(&self) -> Vec<InvoiceRecord> {
        match self.inner.read() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn find(&self, uuid: &str) -> Option<InvoiceRecord> {
        let key = format_fiscal_uuid(uuid);
        match self.inner.read() {
            Ok(guard) => guard.get(&key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&key).cloned(),
        }
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.find(uuid).is_some()
    }

    pub fn apply<R>(&self, transform: impl FnOnce(&mut IndexMap<String, InvoiceRecord>) -> R) -> R {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        transform(&mut guard)
    }

    /// 修改单张发票, 不存在时返回 false
    pub fn update(&self, uuid: &str, transform: impl FnOnce(&mut InvoiceRecord)) -> bool {
        let key = format_fiscal_uuid(uuid);
        self.apply(|list| match list.get_mut(&key) {
            Some(record) => {
                transform(record);
                true
            }
            None => false,
        })
    }

    pub fn upsert(&self, record: InvoiceRecord) {
        let key = format_fiscal_uuid(&record.uuid);
        self.apply(|list| {
            list.insert(key, record);
        });
    }

    pub fn replace_all(&self, records: Vec<InvoiceRecord>) {
        self.apply(|list| {
            *list = index_records(records);
        });
    }

    /// 自动刷新合并: 用后台结果替换列表, 但正在等待 PAC 结果的发票
    /// 若后台仍报告为可取消, 保留本地 "取消中" 标记
    pub fn merge_refreshed(&self, records: Vec<InvoiceRecord>, pending: &HashSet<String>) {
        self.apply(|list| {
            let mut fresh = index_records(records);
            for (key, record) in fresh.iter_mut() {
                if !pending.contains(key) || !record.cancel_allowed {
                    continue;
                }
                if let Some(local) = list.get(key) {
                    record.invoicing_status_raw = local.invoicing_status_raw.clone();
                    record.cancel_allowed = local.cancel_allowed;
                    record.cancel_block_reason = local.cancel_block_reason.clone();
                }
            }
            *list = fresh;
        });
    }

    pub fn len(&self) -> usize {
        self.apply(|list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn index_records(records: Vec<InvoiceRecord>) -> IndexMap<String, InvoiceRecord> {
    records
        .into_iter()
        .map(|r| (format_fiscal_uuid(&r.uuid), r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalStatus, RecordSource};

    fn issued(uuid: &str) -> InvoiceRecord {
        let mut record = InvoiceRecord::empty(uuid, RecordSource::Structured);
        record.invoicing_status_raw = "Emitida".to_string();
        record.sat_status_raw = "Vigente".to_string();
        record.cancel_allowed = true;
        record
    }

    #[test]
    fn keys_are_case_and_hyphen_insensitive() {
        let store = InvoiceStore::new();
        store.upsert(issued("6F1B2C3D4E5F60718293A4B5C6D7E8F9"));
        assert!(store.contains("6f1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9"));
        assert!(store.update("6F1B2C3D-4E5F-6071-8293-A4B5C6D7E8F9", |r| r.mark_cancellation_in_progress()));
        assert!(!store.update("missing", |r| r.mark_cancellation_in_progress()));
    }

    #[test]
    fn refresh_keeps_local_in_progress_marking_for_pending_uuids() {
        let store = InvoiceStore::new();
        store.replace_all(vec![issued("a"), issued("b")]);
        store.update("a", |r| r.mark_cancellation_in_progress());

        let pending: HashSet<String> = [format_fiscal_uuid("a")].into_iter().collect();
        store.merge_refreshed(vec![issued("a"), issued("b"), issued("c")], &pending);

        let a = store.find("a").unwrap();
        assert_eq!(a.canonical_status(), CanonicalStatus::CancellationInProgress);
        assert!(!a.cancel_allowed);
        assert!(store.find("b").unwrap().cancel_allowed);
        assert_eq!(store.len(), 3);
    }
}
