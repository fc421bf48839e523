//! wsDock gateway binary.
//!
//! Usage: `wsdock-gateway [config.yaml]` (defaults to `wsdock.yaml`).

use wsdock_gateway::{config, dispatch, obs, services, Server};

#[tokio::main]
async fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "wsdock.yaml".to_string());

    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config load failed: {e}");
            std::process::exit(1);
        }
    };
    obs::init_tracing(&cfg.log);

    let listen = cfg.gateway.listen.clone();
    let mut server = Server::new(cfg);
    server.use_middleware(dispatch::trace_actions());
    if let Err(e) = services::register_builtin(&mut server) {
        tracing::error!(error = %e, "service registration failed");
        std::process::exit(1);
    }

    tracing::info!(%listen, config = %path, "wsdock-gateway starting");
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "wsdock-gateway failed");
        std::process::exit(1);
    }
}
