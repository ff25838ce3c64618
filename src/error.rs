use thiserror::Error;

/// PAC / 发票后台网关错误
#[derive(Debug, Error)]
pub enum PacError {
    #[error("connection failure: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl From<reqwest::Error> for PacError {
    fn from(err: reqwest::Error) -> Self {
        PacError::Transport(err.to_string())
    }
}

/// CFDI XML 解码错误
#[derive(Debug, Error)]
pub enum ComprobanteError {
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing cfdi:Comprobante root element")]
    MissingRoot,
    #[error("invalid amount {value:?} in attribute {attribute}")]
    InvalidAmount { attribute: String, value: String },
}

/// 取消流程错误
#[derive(Debug, Error)]
pub enum CancellationError {
    /// 本地校验失败, 不会发起网络请求
    #[error("{0}")]
    Validation(String),
    /// 后台/PAC 拒绝, 原样透传消息
    #[error("{0}")]
    Rejected(String),
    #[error("Error de conexión: {0}")]
    Connectivity(String),
    #[error("cancellation already in progress for {0}")]
    AlreadyPending(String),
}

/// 发票检索错误
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invoice {uuid} unavailable from both sources")]
    Unavailable { uuid: String },
    #[error("unable to parse invoice document: {0}")]
    Parse(String),
    #[error("Error de conexión: {0}")]
    Connectivity(String),
}

impl From<ComprobanteError> for RetrievalError {
    fn from(err: ComprobanteError) -> Self {
        RetrievalError::Parse(err.to_string())
    }
}
