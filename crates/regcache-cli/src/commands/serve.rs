use anyhow::Result;
use regcache_config::Config;

use crate::cli::ServeArgs;

pub async fn handle(mut config: Config, args: ServeArgs) -> Result<()> {
    apply_overrides(&mut config, args);
    config.validate()?;

    println!(
        "Serving {} on http://{}:{} (origin {})",
        config.storage.base_directory.display(),
        config.server.host,
        config.server.port,
        config.origin.url
    );
    regcache_server::serve(&config).await
}

/// Command-line flags take precedence over the config file
fn apply_overrides(config: &mut Config, args: ServeArgs) {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(base_dir) = args.base_dir {
        config.storage.base_directory = base_dir;
    }
    if let Some(origin) = args.origin {
        config.origin.url = origin;
    }
}
