use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SAT 取消原因代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotiveCode {
    /// 01 有错误的发票, 有关联 (需要替代UUID)
    #[serde(rename = "01")]
    ErrorsWithRelation,
    /// 02 有错误的发票, 无关联
    #[serde(rename = "02")]
    ErrorsWithoutRelation,
    /// 03 交易未实际发生
    #[serde(rename = "03")]
    OperationNotCarriedOut,
    /// 04 全局发票中的记名交易
    #[serde(rename = "04")]
    NominativeInGlobalInvoice,
}

impl MotiveCode {
    /// 接受 "01".."04", 单个数字自动补零
    pub fn parse(raw: &str) -> Option<MotiveCode> {
        let trimmed = raw.trim();
        let padded = if trimmed.len() == 1 {
            format!("0{}", trimmed)
        } else {
            trimmed.to_string()
        };
        match padded.as_str() {
            "01" => Some(MotiveCode::ErrorsWithRelation),
            "02" => Some(MotiveCode::ErrorsWithoutRelation),
            "03" => Some(MotiveCode::OperationNotCarriedOut),
            "04" => Some(MotiveCode::NominativeInGlobalInvoice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotiveCode::ErrorsWithRelation => "01",
            MotiveCode::ErrorsWithoutRelation => "02",
            MotiveCode::OperationNotCarriedOut => "03",
            MotiveCode::NominativeInGlobalInvoice => "04",
        }
    }

    pub fn requires_substitute(&self) -> bool {
        matches!(self, MotiveCode::ErrorsWithRelation)
    }
}

impl fmt::Display for MotiveCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 取消请求生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Draft,
    Submitted,
    AwaitingResolution,
    ResolvedCancelled,
    ResolvedRejected,
    Expired,
}

impl LifecycleState {
    /// Submitted / AwaitingResolution 视为进行中
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Submitted | LifecycleState::AwaitingResolution)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::ResolvedCancelled
                | LifecycleState::ResolvedRejected
                | LifecycleState::Expired
        )
    }
}

/// 一次进行中的取消尝试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub invoice_uuid: String,
    pub motive: MotiveCode,
    pub substitute_uuid: Option<String>,
    pub requested_by: String,
    pub profile: String,
    pub lifecycle_state: LifecycleState,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub poll_attempts: u32,
}

impl CancellationRequest {
    pub fn draft(
        invoice_uuid: String,
        motive: MotiveCode,
        substitute_uuid: Option<String>,
        requested_by: String,
        profile: String,
    ) -> Self {
        Self {
            invoice_uuid,
            motive,
            substitute_uuid,
            requested_by,
            profile,
            lifecycle_state: LifecycleState::Draft,
            submitted_at: None,
            last_polled_at: None,
            poll_attempts: 0,
        }
    }
}

/// 取消命令 (来自控制台)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancellationCommand {
    pub uuid: String,
    #[serde(rename = "motivo")]
    pub motive: Option<String>,
    #[serde(rename = "usuario")]
    pub requesting_user: String,
    #[serde(rename = "perfilUsuario")]
    pub profile: String,
    #[serde(rename = "uuidSustituto")]
    pub substitute_uuid: Option<String>,
}

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationOutcome {
    /// PAC 即时确认已取消, 无需轮询
    ImmediatelyCancelled,
    /// 已交给轮询器
    PendingResolution,
}
