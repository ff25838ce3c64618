use serde::{Serialize, Serializer};
use std::fmt;

/// 发票规范状态 (由原始状态码/描述推导, 不做持久化)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalStatus {
    ToBeStamped,
    Issued,
    CancellationInProgress,
    CancelledAtAuthority,
    PassThrough,
    IssuanceInProgress,
    TemporaryInvoice,
    AwaitingCancellationOfSubstitutedReceipt,
    /// 无法识别, 保留原始文本用于展示
    Unknown(String),
}

/// 状态目录: (状态码, 状态, 描述)
pub const STATUS_CATALOG: [(&str, CanonicalStatus, &str); 8] = [
    ("66", CanonicalStatus::ToBeStamped, "POR TIMBRAR"),
    ("0", CanonicalStatus::Issued, "EMITIDA"),
    ("1", CanonicalStatus::CancellationInProgress, "EN PROCESO DE CANCELACIÓN"),
    ("2", CanonicalStatus::CancelledAtAuthority, "CANCELADA EN EL SAT"),
    ("3", CanonicalStatus::PassThrough, "PASA DIRECTO"),
    ("4", CanonicalStatus::IssuanceInProgress, "EN PROCESO DE EMISIÓN"),
    ("99", CanonicalStatus::TemporaryInvoice, "FACTURA TEMPORAL"),
    (
        "67",
        CanonicalStatus::AwaitingCancellationOfSubstitutedReceipt,
        "EN ESPERA DE CANCELACIÓN DEL COMPROBANTE SUSTITUIDO",
    ),
];

impl CanonicalStatus {
    /// 目录状态码, Unknown 没有状态码
    pub fn code(&self) -> Option<&'static str> {
        STATUS_CATALOG
            .iter()
            .find(|(_, status, _)| status == self)
            .map(|(code, _, _)| *code)
    }

    /// 展示用描述
    pub fn description(&self) -> &str {
        match self {
            CanonicalStatus::Unknown(raw) => raw,
            known => STATUS_CATALOG
                .iter()
                .find(|(_, status, _)| status == known)
                .map(|(_, _, desc)| *desc)
                .unwrap_or_default(),
        }
    }

    pub fn from_code(code: &str) -> Option<CanonicalStatus> {
        STATUS_CATALOG
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, status, _)| status.clone())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CanonicalStatus::Unknown(_))
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl Serialize for CanonicalStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("CanonicalStatus", 2)?;
        s.serialize_field("code", &self.code())?;
        s.serialize_field("description", self.description())?;
        s.end()
    }
}

/// PAC 对取消请求的答复分类
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// 空答复或仍在处理中
    Pending,
    Cancelled,
    /// 其他终态 (例如 RECHAZADA)
    Rejected(String),
}
