use cfdi_cancel_sync::{api, AppConfig, HttpPacClient, InvoiceConsole};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);

    // 发票后台 / PAC 客户端
    let gateway = Arc::new(HttpPacClient::new(&config.backend)?);
    info!(
        "Backend: {}, PAC: {}",
        config.backend.api_base, config.backend.pac_base
    );

    let console = Arc::new(InvoiceConsole::new(gateway, &config));

    let app = api::router(console).layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/facturas/buscar      - 查询发票列表");
    info!("  POST /api/facturas/cancelar    - 提交取消");
    info!("  GET  /api/facturas/:uuid       - 检索单张发票 (JSON / PAC XML)");
    info!("  GET  /api/cancelaciones/:uuid  - 取消请求状态");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
