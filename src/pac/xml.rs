//! CFDI XML 解码器 (cfdi:Comprobante -> ComprobanteModel)
//!
//! 以事件流方式遍历, 只按本地名匹配元素, 不依赖命名空间前缀
//! (cfdi:/tfd:/cartaporte31: 等前缀在不同 PAC 之间并不统一)。

use crate::error::ComprobanteError;
use crate::models::{ComprobanteModel, ConceptLine, Party, RelatedCfdi, TaxTotals};
use bigdecimal::{BigDecimal, Zero};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::str::FromStr;

pub fn decode_comprobante(xml: &str) -> Result<ComprobanteModel, ComprobanteError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut decoder = Decoder::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                decoder.element(&e)?;
                decoder.stack.push(local_name(&e));
            }
            Event::Empty(e) => decoder.element(&e)?,
            Event::End(_) => {
                decoder.stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    decoder.finish()
}

#[derive(Default)]
struct Decoder {
    model: ComprobanteModel,
    seen_root: bool,
    /// 当前元素的祖先链 (本地名)
    stack: Vec<String>,
    document_taxes: TaxTotals,
    concept_taxes: TaxTotals,
    relation_type: String,
}

impl Decoder {
    fn element(&mut self, e: &BytesStart<'_>) -> Result<(), ComprobanteError> {
        let name = local_name(e);
        if name.starts_with("CartaPorte") {
            self.model.has_carta_porte = true;
            return Ok(());
        }

        match name.as_str() {
            "Comprobante" if self.stack.is_empty() => {
                let mut a = attributes(e)?;
                self.seen_root = true;
                self.model.version = a.remove("Version");
                self.model.series = a.remove("Serie");
                self.model.folio = a.remove("Folio");
                self.model.date = a.remove("Fecha");
                self.model.currency = a.remove("Moneda");
                self.model.document_type = a.remove("TipoDeComprobante");
                self.model.subtotal = optional_amount(&mut a, "SubTotal")?;
                self.model.total = optional_amount(&mut a, "Total")?;
            }
            "Emisor" if self.parent_is("Comprobante") => {
                let mut a = attributes(e)?;
                self.model.issuer = Party {
                    rfc: a.remove("Rfc").unwrap_or_default(),
                    name: a.remove("Nombre"),
                    usage_code: a.remove("RegimenFiscal"),
                };
            }
            "Receptor" if self.parent_is("Comprobante") => {
                let mut a = attributes(e)?;
                self.model.receiver = Party {
                    rfc: a.remove("Rfc").unwrap_or_default(),
                    name: a.remove("Nombre"),
                    usage_code: a.remove("UsoCFDI"),
                };
            }
            "Concepto" => {
                let mut a = attributes(e)?;
                self.model.concepts.push(ConceptLine {
                    product_key: a.remove("ClaveProdServ"),
                    description: a.remove("Descripcion").unwrap_or_default(),
                    quantity: optional_amount(&mut a, "Cantidad")?.unwrap_or_else(BigDecimal::zero),
                    unit: a.remove("Unidad").or_else(|| a.remove("ClaveUnidad")),
                    unit_price: optional_amount(&mut a, "ValorUnitario")?
                        .unwrap_or_else(BigDecimal::zero),
                    amount: optional_amount(&mut a, "Importe")?.unwrap_or_else(BigDecimal::zero),
                });
            }
            "Traslado" | "Retencion" if !self.inside("Complemento") => {
                let mut a = attributes(e)?;
                let Some(tax_code) = a.remove("Impuesto") else {
                    return Ok(());
                };
                // 免税 (Exento) 行没有 Importe
                let Some(amount) = optional_amount(&mut a, "Importe")? else {
                    return Ok(());
                };
                let totals = if self.inside("Concepto") {
                    &mut self.concept_taxes
                } else {
                    &mut self.document_taxes
                };
                let bucket = if name == "Traslado" {
                    &mut totals.transferred
                } else {
                    &mut totals.withheld
                };
                *bucket.entry(tax_code).or_insert_with(BigDecimal::zero) += amount;
            }
            "CfdiRelacionados" => {
                let mut a = attributes(e)?;
                self.relation_type = a.remove("TipoRelacion").unwrap_or_default();
            }
            "CfdiRelacionado" => {
                let mut a = attributes(e)?;
                if let Some(uuid) = a.remove("UUID") {
                    self.model.related.push(RelatedCfdi {
                        relation_type: self.relation_type.clone(),
                        uuid,
                    });
                }
            }
            "TimbreFiscalDigital" => {
                let mut a = attributes(e)?;
                self.model.stamp_uuid = a.remove("UUID");
                self.model.stamped_at = a.remove("FechaTimbrado");
            }
            _ => {}
        }
        Ok(())
    }

    fn parent_is(&self, name: &str) -> bool {
        self.stack.last().map(String::as_str) == Some(name)
    }

    fn inside(&self, name: &str) -> bool {
        self.stack.iter().any(|n| n == name)
    }

    fn finish(mut self) -> Result<ComprobanteModel, ComprobanteError> {
        if !self.seen_root {
            return Err(ComprobanteError::MissingRoot);
        }
        // 文档级 Impuestos 已是明细汇总, 仅在缺失时才用明细级税额
        self.model.taxes = if self.document_taxes.is_empty() {
            self.concept_taxes
        } else {
            self.document_taxes
        };
        Ok(self.model)
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, ComprobanteError> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn optional_amount(
    attrs: &mut HashMap<String, String>,
    attribute: &str,
) -> Result<Option<BigDecimal>, ComprobanteError> {
    match attrs.remove(attribute) {
        None => Ok(None),
        Some(value) => BigDecimal::from_str(value.trim())
            .map(Some)
            .map_err(|_| ComprobanteError::InvalidAmount {
                attribute: attribute.to_string(),
                value,
            }),
    }
}
