pub mod clock;
pub mod config;
pub mod controller;
pub mod data;
pub mod events;
pub mod icon;
pub mod map;
pub mod server;
pub mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load area data and render one marker glyph per barangay
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve map data and chart data for the dashboard panels
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config } => {
            println!("Rendering markers with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let areas = data::load_areas(&app_config).await;

            let bus = events::EventBus::new();
            let mut map_controller = controller::MapController::new(
                &app_config,
                &bus,
                Arc::new(clock::SystemClock),
            );
            map_controller.populate(&areas);

            write_glyphs(&app_config, &map_controller)?;
            println!(
                "Rendered {} marker glyphs to {:?}",
                map_controller.visible_marker_count(),
                app_config.icons.output_dir
            );
        }
        Commands::Serve { config } => {
            println!("Serving dashboard data with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let areas = data::load_areas(&app_config).await;

            server::start_server(app_config, areas).await?;
        }
    }

    Ok(())
}

/// Writes every marker's glyph PNG into the configured output directory,
/// named after its area.
fn write_glyphs(
    config: &config::AppConfig,
    map_controller: &controller::MapController,
) -> Result<()> {
    fs::create_dir_all(&config.icons.output_dir)
        .context("Failed to create glyph output directory")?;

    for record in map_controller.markers() {
        let path = config
            .icons
            .output_dir
            .join(format!("{}.png", slug(&record.area.name)));
        record
            .icon
            .save(&path)
            .with_context(|| format!("Failed to save glyph {:?}", path))?;
    }

    Ok(())
}

/// Filesystem-safe name for a glyph file.
fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
