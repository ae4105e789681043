//! Development server command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use stencil_server::{ConfigLoader, DevServer, DevServerConfig};

use crate::config::ConfigFile;

/// Run the dev server.
pub async fn run(
    file_config: &ConfigFile,
    config_path: &Path,
    port: Option<u16>,
    open: bool,
) -> Result<()> {
    tracing::info!("🚀 Starting development server...");

    let config = DevServerConfig {
        build: file_config.build_config(None),
        config_file: Some(config_path.to_path_buf()),
        port: port.unwrap_or(file_config.server.port),
        host: file_config.server.host.clone(),
        open: open && file_config.server.open,
    };

    DevServer::new(config)
        .with_config_loader(config_loader(config_path))
        .start()
        .await?;

    Ok(())
}

/// Re-read `site.toml` on every config change.
fn config_loader(config_path: &Path) -> ConfigLoader {
    let path = config_path.to_path_buf();
    Arc::new(move || {
        ConfigFile::load(&path)
            .map(|config| config.build_config(None))
            .map_err(|e| format!("{:#}", e))
    })
}
