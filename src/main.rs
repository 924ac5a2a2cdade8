//! gridcache demo driver
//!
//! Seeds an in-memory store with a synthetic block, then exercises the
//! engine the way a scrolling grid would and prints the resulting stats.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          gridcache                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Warm      │───▶│   Scroll     │───▶│    Stats     │       │
//! │  │  (pages 1-N) │    │ pages/window │    │  (+/metrics) │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::TryStreamExt;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridcache::adapters::{sample_rows, InMemorySharedCache, InMemoryStore};
use gridcache::{
    BlockId, Column, ColumnType, DatasetBlock, EngineConfig, Error, Filter, PaginationEngine,
    QueryParams, Result, Sort, StatsExporter,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// gridcache - tiered cache and windowed pagination for virtualized grids
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "GRIDCACHE_CONFIG")]
    config: Option<String>,

    /// Rows in the synthetic block
    #[arg(long, env = "GRIDCACHE_ROWS", default_value = "10000")]
    rows: usize,

    /// Block id of the synthetic block
    #[arg(long, env = "GRIDCACHE_BLOCK", default_value = "orders")]
    block: String,

    /// Rows per page
    #[arg(long, env = "GRIDCACHE_PAGE_SIZE", default_value = "100")]
    page_size: u64,

    /// Pages to scroll through after warming
    #[arg(long, env = "GRIDCACHE_PAGES", default_value = "10")]
    pages: u64,

    /// Pages loaded at startup
    #[arg(long, env = "GRIDCACHE_WARM_PAGES", default_value = "3")]
    warm_pages: u64,

    /// Override cache.ttl_secs
    #[arg(long, env = "GRIDCACHE_TTL_SECS")]
    ttl_secs: Option<u64>,

    /// Simulated store latency in milliseconds
    #[arg(long, env = "GRIDCACHE_STORE_LATENCY_MS", default_value = "20")]
    store_latency_ms: u64,

    /// Put an in-process shared tier behind L1
    #[arg(long, env = "GRIDCACHE_SHARED_TIER")]
    shared_tier: bool,

    /// Serve /metrics on this address after the run, until Ctrl-C
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ttl) = args.ttl_secs {
        config.cache.ttl_secs = ttl;
        config.cache.ttl_ms = None;
    }
    config.validate()?;

    info!("Starting gridcache");
    info!("  Block: {} ({} rows)", args.block, args.rows);
    info!("  TTL: {:?}", config.cache.ttl());
    info!("  L1 capacity: {} bytes", config.cache.l1.capacity);
    info!("  Shared tier: {}", args.shared_tier);

    let block = BlockId::new(args.block.clone());
    let store = Arc::new(InMemoryStore::new().with_block(block.clone(), sample_rows(args.rows)));
    store.set_latency(Duration::from_millis(args.store_latency_ms));

    let engine = if args.shared_tier {
        PaginationEngine::with_shared(store.clone(), Arc::new(InMemorySharedCache::new()), config)
    } else {
        PaginationEngine::new(store.clone(), config)
    };
    engine.register_block(&demo_schema(&block, args.rows as u64));

    run_demo(&engine, &block, &args).await?;
    engine.drain().await;

    let stats = engine.stats();
    let calls = store.calls();
    info!(
        "Store calls: {} count, {} page, {} window, {} stream",
        calls.count, calls.fetch_page, calls.ranked_window, calls.stream_cursor
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if let Some(addr) = &args.metrics_addr {
        let exporter = Arc::new(StatsExporter::new()?);
        tokio::select! {
            result = run_metrics_server(addr, engine.clone(), exporter) => {
                if let Err(e) = result {
                    error!("Metrics server error: {}", e);
                    return Err(e);
                }
            }
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        }
    }

    info!("gridcache shutdown complete");
    Ok(())
}

fn demo_schema(block: &BlockId, rows: u64) -> DatasetBlock {
    let mut schema = DatasetBlock::new(
        block.clone(),
        vec![
            Column::new("customer", "Customer", ColumnType::Text),
            Column::new("amount", "Amount", ColumnType::Number),
            Column::new("status", "Status", ColumnType::Text),
            Column::new("priority", "Priority", ColumnType::Boolean),
            Column::new("ordered_at", "Ordered At", ColumnType::Date),
        ],
    );
    schema.approx_row_count = rows;
    schema
}

async fn run_demo(engine: &PaginationEngine, block: &BlockId, args: &Args) -> Result<()> {
    let params = QueryParams::default();
    let page_size = args.page_size.max(1);

    let warmed = engine.warm_cache(block, args.warm_pages).await;
    info!("Warmed {} pages", warmed);

    // Scroll forward, prefetching the next screen each time
    for page in 1..=args.pages.max(1) {
        let result = engine.get_page(block, page, page_size, &params).await?;
        info!(
            "Page {}/{}: {} rows (has_more={})",
            result.page,
            result.total_pages,
            result.rows.len(),
            result.has_more
        );
        let next_start = page * page_size;
        engine.prefetch_batch(block, next_start, next_start + page_size - 1, page_size)?;
        if !result.has_more {
            break;
        }
    }

    // Scroll back: every page should now come from memory
    for page in (1..=args.pages.max(1)).rev() {
        engine.get_page(block, page, page_size, &params).await?;
    }

    let window = engine.get_virtual_window(block, 250, 299, &params).await?;
    info!(
        "Window {}..={}: {} rows of {}",
        window.start_index,
        window.end_index,
        window.rows.len(),
        window.total
    );

    let paid = QueryParams::new()
        .filter(Filter::equals("status", "paid"))
        .sort(Sort::desc("amount"));
    let first = engine.get_page(block, 1, page_size, &paid).await?;
    info!("Paid orders: {} ({} pages)", first.total, first.total_pages);

    let streamed = engine
        .stream_rows(block, 1_000, &params)?
        .try_fold(0usize, |n, batch| async move { Ok(n + batch.len()) })
        .await?;
    info!("Streamed {} rows", streamed);

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let hyper_directive = "hyper=warn"
        .parse()
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(hyper_directive);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    engine: PaginationEngine,
    exporter: Arc<StatsExporter>,
) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
    }

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid metrics server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let engine = engine.clone();
        let exporter = Arc::clone(&exporter);

        tokio::spawn(async move {
            let handler = move |req: Request<hyper::body::Incoming>| {
                let engine = engine.clone();
                let exporter = Arc::clone(&exporter);
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            exporter.update(&engine.stats());
                            match exporter.encode() {
                                Ok(text) => {
                                    let mut response = respond(StatusCode::OK, text);
                                    response.headers_mut().insert(
                                        CONTENT_TYPE,
                                        HeaderValue::from_static(exporter.content_type()),
                                    );
                                    response
                                }
                                Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                            }
                        }
                        "/healthz" => respond(StatusCode::OK, "ok"),
                        _ => respond(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            };

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handler))
                .await
            {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
