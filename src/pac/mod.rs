pub mod client;
pub mod payload;
pub mod xml;

pub use client::{
    BackendAck, CancelRequestBody, HttpPacClient, InvoiceQuery, PacGateway, RawDocument,
    SearchResponse,
};
pub use xml::decode_comprobante;

/// PAC 要求小写, 8-4-4-4-12 分组的 UUID
pub fn format_fiscal_uuid(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.len() == 32 && lower.chars().all(|c| c.is_ascii_hexdigit()) {
        format!(
            "{}-{}-{}-{}-{}",
            &lower[0..8],
            &lower[8..12],
            &lower[12..16],
            &lower[16..20],
            &lower[20..32]
        )
    } else {
        lower
    }
}
