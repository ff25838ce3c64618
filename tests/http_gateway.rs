use bigdecimal::BigDecimal;
use cfdi_cancel_sync::config::BackendConfig;
use cfdi_cancel_sync::models::{CanonicalStatus, RecordSource};
use cfdi_cancel_sync::pac::{CancelRequestBody, InvoiceQuery, PacGateway};
use cfdi_cancel_sync::service::InvoiceRetriever;
use cfdi_cancel_sync::{HttpPacClient, RetrievalError};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RAW_UUID: &str = "6F1B2C3D4E5F60718293A4B5C6D7E8F9";
const FORMATTED_UUID: &str = "6f1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";

const CFDI_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="4.0" Serie="A" Folio="1024"
    Fecha="2024-03-15T10:30:00" SubTotal="1000.00" Total="1160.00" Moneda="MXN" TipoDeComprobante="I">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="ACME SA DE CV" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="XAXX010101000" Nombre="PUBLICO EN GENERAL" UsoCFDI="G03"/>
  <cfdi:Conceptos>
    <cfdi:Concepto ClaveProdServ="01010101" Cantidad="1" ClaveUnidad="H87" Descripcion="Servicio"
        ValorUnitario="1000.00" Importe="1000.00">
      <cfdi:Impuestos>
        <cfdi:Traslados>
          <cfdi:Traslado Base="1000.00" Impuesto="002" TipoFactor="Tasa" TasaOCuota="0.160000" Importe="160.00"/>
        </cfdi:Traslados>
      </cfdi:Impuestos>
    </cfdi:Concepto>
  </cfdi:Conceptos>
  <cfdi:Impuestos TotalImpuestosTrasladados="160.00">
    <cfdi:Traslados>
      <cfdi:Traslado Base="1000.00" Impuesto="002" TipoFactor="Tasa" TasaOCuota="0.160000" Importe="160.00"/>
    </cfdi:Traslados>
  </cfdi:Impuestos>
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital" Version="1.1"
        UUID="6F1B2C3D-4E5F-6071-8293-A4B5C6D7E8F9" FechaTimbrado="2024-03-15T10:31:00"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#;

async fn client_for(server: &MockServer) -> HttpPacClient {
    HttpPacClient::new(&BackendConfig {
        api_base: server.uri(),
        pac_base: format!("{}/pac", server.uri()),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn falls_back_to_pac_xml_when_primary_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/factura/timbrado/status/{}", RAW_UUID)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/pac/descargar-xml/{}", FORMATTED_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(CFDI_XML, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let retriever = InvoiceRetriever::new(Arc::new(client_for(&server).await), 2);
    let record = retriever.fetch_invoice(RAW_UUID).await.unwrap();

    assert_eq!(record.source, RecordSource::RawXml);
    assert_eq!(record.uuid, "6F1B2C3D-4E5F-6071-8293-A4B5C6D7E8F9");
    assert_eq!(record.issuer_rfc, "AAA010101AAA");
    assert_eq!(record.receiver_rfc, "XAXX010101000");
    assert_eq!(record.cfdi_use.as_deref(), Some("G03"));
    assert_eq!(record.amount, BigDecimal::from_str("1160.00").unwrap());
    assert_eq!(record.total_vat, BigDecimal::from_str("160.00").unwrap());
    assert_eq!(record.concepts.len(), 1);
    assert!(!record.cancel_allowed);
    assert!(matches!(record.canonical_status(), CanonicalStatus::Unknown(_)));
}

#[tokio::test]
async fn json_wrapped_xml_from_pac_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/pac/descargar-xml/{}", FORMATTED_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "xml": CFDI_XML })))
        .mount(&server)
        .await;

    // 主数据源未挂载 -> 404
    let retriever = InvoiceRetriever::new(Arc::new(client_for(&server).await), 2);
    let record = retriever.fetch_invoice(RAW_UUID).await.unwrap();
    assert_eq!(record.total_vat, BigDecimal::from_str("160.00").unwrap());
}

#[tokio::test]
async fn structured_primary_wins_when_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/factura/timbrado/status/{}", FORMATTED_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "exitoso": true,
            "datosFactura": {
                "UUID": FORMATTED_UUID,
                "RFC_EMISOR": "AAA010101AAA",
                "rfc_receptor": "XAXX010101000",
                "total": "1,160.00",
                "totalIva": 160,
                "estatusFacturacion": "0",
                "estatusSat": "Vigente",
                "numTickets": 3,
                "cartaPorte": "S"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/pac/descargar-xml/{}", FORMATTED_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(CFDI_XML, "application/xml"))
        .expect(0)
        .mount(&server)
        .await;

    let retriever = InvoiceRetriever::new(Arc::new(client_for(&server).await), 2);
    let record = retriever.fetch_invoice(FORMATTED_UUID).await.unwrap();

    assert_eq!(record.source, RecordSource::Structured);
    assert_eq!(record.amount, BigDecimal::from_str("1160.00").unwrap());
    assert_eq!(record.canonical_status(), CanonicalStatus::Issued);
    assert!(record.cancel_allowed);

    let relations = retriever.relations(FORMATTED_UUID).await.unwrap();
    assert_eq!(relations.ticket_count, 3);
    assert!(relations.has_bill_of_lading);
}

#[tokio::test]
async fn both_sources_down_reports_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let retriever = InvoiceRetriever::new(Arc::new(client_for(&server).await), 2);
    let err = retriever.fetch_invoice(RAW_UUID).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Unavailable { .. }));
}

#[tokio::test]
async fn cancel_body_omits_substitute_and_rejection_message_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/consulta-facturas/cancelar"))
        .and(body_json(json!({
            "uuid": FORMATTED_UUID,
            "motivo": "02",
            "usuario": "cajero01",
            "perfilUsuario": "ADMINISTRADOR"
        })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "exitoso": false,
            "mensaje": "El CFDI no puede cancelarse"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let ack = client
        .submit_cancellation(&CancelRequestBody {
            uuid: FORMATTED_UUID.to_string(),
            motivo: "02".to_string(),
            usuario: "cajero01".to_string(),
            perfil_usuario: "ADMINISTRADOR".to_string(),
            uuid_sustituto: None,
        })
        .await
        .unwrap();

    assert!(!ack.exitoso);
    assert_eq!(ack.mensaje.as_deref(), Some("El CFDI no puede cancelarse"));
}

#[tokio::test]
async fn resolution_status_and_search_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/pac/status/{}", FORMATTED_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": null })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/consulta-facturas/buscar"))
        .and(body_json(json!({ "uuid": "", "perfilUsuario": "ADMINISTRADOR" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "exitoso": true,
            "facturas": [
                { "uuid": FORMATTED_UUID, "estatusFacturacion": "EN PROCESO DE CANCELACIÓN" },
                "registro inválido"
            ]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server).await);
    assert_eq!(client.query_resolution(FORMATTED_UUID).await.unwrap(), None);

    let retriever = InvoiceRetriever::new(client, 2);
    let records = retriever
        .search(&InvoiceQuery {
            uuid: String::new(),
            profile: "ADMINISTRADOR".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].canonical_status(), CanonicalStatus::CancellationInProgress);
    assert!(!records[0].cancel_allowed);
}

#[tokio::test]
async fn batch_fetch_returns_one_result_per_uuid() {
    let structured_uuid = "11111111-2222-3333-4444-555555555555";
    let missing_uuid = "99999999-8888-7777-6666-555555555555";

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/factura/timbrado/status/{}", structured_uuid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "exitoso": true,
            "datosFactura": {
                "uuid": structured_uuid,
                "rfcEmisor": "AAA010101AAA",
                "estatusFacturacion": "Emitida",
                "estatusSat": "Vigente"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/factura/timbrado/status/{}", RAW_UUID)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/pac/descargar-xml/{}", FORMATTED_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(CFDI_XML, "application/xml"))
        .mount(&server)
        .await;

    let retriever = InvoiceRetriever::new(Arc::new(client_for(&server).await), 2);
    let uuids = vec![
        structured_uuid.to_string(),
        RAW_UUID.to_string(),
        missing_uuid.to_string(),
    ];
    let mut results = retriever.fetch_many(&uuids).await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let keys: Vec<&str> = results.iter().map(|(uuid, _)| uuid.as_str()).collect();
    assert_eq!(keys, vec![structured_uuid, RAW_UUID, missing_uuid]);

    let structured = results[0].1.as_ref().unwrap();
    assert_eq!(structured.source, RecordSource::Structured);
    assert_eq!(structured.canonical_status(), CanonicalStatus::Issued);

    let fallback = results[1].1.as_ref().unwrap();
    assert_eq!(fallback.source, RecordSource::RawXml);
    assert_eq!(fallback.total_vat, BigDecimal::from_str("160.00").unwrap());

    assert!(matches!(results[2].1, Err(RetrievalError::Unavailable { .. })));
}
