//! 状态归一化: 把各数据源的状态码/描述统一映射到 `CanonicalStatus`

use crate::models::{CanonicalStatus, ResolutionStatus, STATUS_CATALOG};

/// 描述 -> 状态码 词典 (键已归一化)
const DESCRIPTION_DICTIONARY: &[(&str, &str)] = &[
    ("POR TIMBRAR", "66"),
    ("PENDIENTE DE TIMBRAR", "66"),
    ("PENDIENTE DE TIMBRADO", "66"),
    ("EMITIDA", "0"),
    ("EMITIDO", "0"),
    ("ACTIVA", "0"),
    ("ACTIVO", "0"),
    ("VIGENTE", "0"),
    ("TIMBRADA", "0"),
    ("TIMBRADO", "0"),
    ("EN PROCESO DE CANCELACION", "1"),
    ("CANCELACION EN PROCESO", "1"),
    ("EN PROCESO CANCELACION", "1"),
    ("EN CANCELACION", "1"),
    ("CANCELADA EN EL SAT", "2"),
    ("CANCELADA SAT", "2"),
    ("CANCELADA", "2"),
    ("CANCELADO", "2"),
    ("PASA DIRECTO", "3"),
    ("PASO DIRECTO", "3"),
    ("EN PROCESO DE EMISION", "4"),
    ("EMISION EN PROCESO", "4"),
    ("EN PROCESO DE TIMBRADO", "4"),
    ("FACTURA TEMPORAL", "99"),
    ("TEMPORAL", "99"),
    ("EN ESPERA DE CANCELACION DEL COMPROBANTE SUSTITUIDO", "67"),
    ("EN ESPERA DE CANCELACION DE RECIBO SUSTITUIDO", "67"),
];

const IN_PROGRESS_MARKER: &str = "EN PROCESO DE CANCELACION";
const ISSUED_KEYWORDS: [&str; 3] = ["EMITIDA", "ACTIVA", "VIGENTE"];

/// 归一化单个原始状态
pub fn normalize(raw: &str) -> CanonicalStatus {
    resolve(raw).unwrap_or_else(|| CanonicalStatus::Unknown(raw.trim().to_string()))
}

/// 主字段为空或无法识别时使用备用字段 (例如 SAT 端描述)
pub fn normalize_with_fallback(primary: &str, secondary: &str) -> CanonicalStatus {
    if let Some(status) = resolve(primary) {
        return status;
    }
    if let Some(status) = resolve(secondary) {
        return status;
    }
    let label = [primary.trim(), secondary.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" / ");
    CanonicalStatus::Unknown(label)
}

fn resolve(raw: &str) -> Option<CanonicalStatus> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // 1. 完全匹配状态码
    if let Some(status) = CanonicalStatus::from_code(trimmed) {
        return Some(status);
    }

    // 2. 数字形式 ("04", "4.0")
    if let Some(code) = numeric_code(trimmed) {
        if let Some(status) = CanonicalStatus::from_code(&code) {
            return Some(status);
        }
    }

    // 3. 自由文本词典
    let text = normalize_text(trimmed);
    if let Some((_, code)) = DESCRIPTION_DICTIONARY.iter().find(|(desc, _)| *desc == text) {
        return CanonicalStatus::from_code(code);
    }

    // 4. 反向匹配目录描述
    STATUS_CATALOG
        .iter()
        .find(|(_, _, desc)| normalize_text(desc) == text)
        .map(|(_, status, _)| status.clone())
}

/// 数字形式: 整数值 ("4.0"), 否则去掉所有非数字字符 ("04", "66 - POR TIMBRAR")
fn numeric_code(trimmed: &str) -> Option<String> {
    if let Ok(value) = trimmed.parse::<f64>() {
        if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
            return Some(format!("{}", value as u64));
        }
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let stripped = digits.trim_start_matches('0');
    Some(if stripped.is_empty() { "0".to_string() } else { stripped.to_string() })
}

/// 大写, 去掉重音, 空白/下划线/连字符折叠为单个空格
pub fn normalize_text(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .flat_map(|c| c.to_uppercase())
        .map(strip_diacritic)
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_diacritic(c: char) -> char {
    match c {
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        other => other,
    }
}

/// 是否允许发起取消
///
/// `local_flag` 为主数据源显式给出的允许标记, 为真时直接放行。
/// 否则两个原始字段都必须表示"已开具", 且都不能处于取消中。
pub fn is_cancelable(invoicing_raw: &str, sat_raw: &str, local_flag: bool) -> bool {
    if local_flag {
        return true;
    }
    let invoicing = normalize_text(invoicing_raw);
    let sat = normalize_text(sat_raw);

    if is_cancellation_in_progress(&invoicing) || is_cancellation_in_progress(&sat) {
        return false;
    }
    is_issued_text(&invoicing) && is_issued_text(&sat)
}

fn is_cancellation_in_progress(text: &str) -> bool {
    text == "1" || text.contains(IN_PROGRESS_MARKER)
}

fn is_issued_text(text: &str) -> bool {
    if text.is_empty() || text.contains("NO VIGENTE") {
        return false;
    }
    text == "0" || ISSUED_KEYWORDS.iter().any(|k| text.contains(k))
}

/// PAC 取消结果字段分类 (EN_PROCESO / CANCELADA / RECHAZADA / null)
pub fn classify_resolution(raw: Option<&str>) -> ResolutionStatus {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ResolutionStatus::Pending;
    };
    let text = normalize_text(raw);
    if text.contains("PROCESO") || text.contains("PENDIENTE") {
        return ResolutionStatus::Pending;
    }
    match normalize(raw) {
        CanonicalStatus::CancelledAtAuthority => ResolutionStatus::Cancelled,
        CanonicalStatus::CancellationInProgress => ResolutionStatus::Pending,
        _ => ResolutionStatus::Rejected(raw.to_string()),
    }
}
