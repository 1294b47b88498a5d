use std::sync::Arc;

use mcp_record_server::config::{Backend, ServerConfig};
use mcp_record_server::dispatcher::Dispatcher;
use mcp_record_server::logging::init_tracing;
use mcp_record_server::seed;
use mcp_record_server::server::McpServer;
use mcp_record_server::store::{DataService, MemoryStore, RemoteStore, TableApiClient};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("mcp-record-server: configuration error: {e}");
            std::process::exit(1);
        }
    };

    let dispatcher = match build_dispatcher(&config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("mcp-record-server: startup error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        tools = dispatcher.registry().len(),
        "{} v{} ready",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let mut server = McpServer::new(dispatcher);
    if let Err(e) = server.run().await {
        eprintln!("mcp-record-server: fatal error: {e}");
        std::process::exit(1);
    }
}

fn build_dispatcher(config: &ServerConfig) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let store: Arc<dyn DataService> = match &config.backend {
        Backend::Memory => {
            let memory = MemoryStore::new(&config.uri_scheme);
            if config.seed_demo {
                seed::apply(&memory, seed::demo_resources())?;
            }
            if let Some(path) = &config.seed_file {
                seed::load_file(&memory, path)?;
            }
            Arc::new(memory)
        }
        Backend::Remote { base_url, token } => {
            info!(base_url = %base_url, "using remote table backend");
            Arc::new(RemoteStore::new(
                &config.uri_scheme,
                TableApiClient::new(base_url, token),
            ))
        }
    };

    let dispatcher = Dispatcher::new(Arc::clone(&store))?;
    if config.seed_demo && config.backend == Backend::Memory {
        seed::register_demo_tools(dispatcher.registry(), store, &config.uri_scheme)?;
    }
    Ok(dispatcher)
}
