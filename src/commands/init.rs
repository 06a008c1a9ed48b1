//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub config_path: PathBuf,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub products: Vec<String>,
}

/// Write a default configuration (with the built-in product catalog) and
/// create the data directory
pub fn cmd_init(options: InitOptions) -> Result<InitOutcome> {
    let InitOptions { config_path, force } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_base_dir);
    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path.clone();
    config.validate()?;

    config.save()?;
    std::fs::create_dir_all(&config.paths.data_dir)?;
    info!("Initialized vdb-docs at {:?}", config.paths.base_dir);

    Ok(InitOutcome {
        config_path,
        data_dir: config.paths.data_dir.clone(),
        products: config.products.iter().map(|p| p.product.clone()).collect(),
    })
}

pub fn print_init(outcome: &InitOutcome) {
    println!("\n✓ vdb-docs initialized\n");
    println!("Configuration: {}", outcome.config_path.display());
    println!("Data directory: {}", outcome.data_dir.display());
    println!("Products: {}", outcome.products.join(", "));
    println!("\nNext: vdb-docs crawl && vdb-docs qc && vdb-docs index");
}
