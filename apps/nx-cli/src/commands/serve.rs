// serve.rs - Run the runtime in the foreground.
//
// Same startup as nexxon-daemon, so users can run `nexxon serve`
// without knowing the daemon binary's name.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use nx_runtime::{serve, shutdown_signal, RuntimeConfig, RuntimeContext};

pub fn execute(project_root: &Path, port: Option<u16>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nx_runtime=info".parse()?))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = RuntimeConfig::load(project_root)?;
    if let Some(port) = port {
        config.port = port;
    }
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let ctx = Arc::new(RuntimeContext::open(config)?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let session = ctx.start()?;
        tracing::info!(session = %session, addr = %addr, "runtime listening");
        let result = serve(ctx.clone(), addr, shutdown_signal()).await;
        if let Err(e) = ctx.shutdown() {
            tracing::warn!(error = %e, "failed to end session");
        }
        result?;
        Ok::<(), anyhow::Error>(())
    })
}
