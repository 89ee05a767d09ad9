use std::path::PathBuf;

use anyhow::{anyhow, Context};
use tracing::info;

use erpd::{backup, config::AppConfig};

const USAGE: &str = "usage: erpd [serve | restore <bundle.zip>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    erpd::init_tracing();
    let config = AppConfig::load_with_dotenv().context("invalid configuration")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["serve"] => erpd::start_server(config).await,
        ["restore", bundle] => {
            let restored =
                backup::restore_bundle(&PathBuf::from(*bundle), &config.server.data_dir)?;
            info!(path = %restored.display(), "database restored");
            Ok(())
        }
        _ => Err(anyhow!(USAGE)),
    }
}
