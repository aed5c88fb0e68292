//! Point d'entrée CLI pour catastro-tool

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use catastro_tool::cli::{self, Commands};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant, puis à côté du binaire
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Analyser les affectations urbanistiques et environnementales de parcelles du Catastro
#[derive(Parser)]
#[command(name = "catastro-tool")]
#[command(author, version)]
#[command(about = "Analyse des affectations de parcelles cadastrales espagnoles")]
#[command(long_about = "Croise la géométrie d'une parcelle du Catastro avec un catalogue de couches (WFS, WMS, GeoJSON local) et classe l'impact.\n\nLes résultats sont écrits sous <output>/<ref>/ (imagenes, geometrias, informes, datos).")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Analizar { referencia, run } => {
            info!(reference = %referencia, catalog = %run.catalog, "Analyzing reference");
            if !cli::cmd_analizar(&referencia, &run).await? {
                std::process::exit(1);
            }
        }
        Commands::Lote {
            referencias,
            file,
            pause_ms,
            report,
            run,
        } => {
            info!(references = referencias.len(), file = ?file, "Batch analysis");
            let report = cli::cmd_lote(
                &referencias,
                file.as_deref(),
                Duration::from_millis(pause_ms),
                report.as_deref(),
                &run,
            )
            .await?;
            println!("{}", report.summary());
        }
        Commands::Capas { catalog, capas_dir } => {
            cli::cmd_capas(&catalog, capas_dir.as_deref())?;
        }
        Commands::Listar { output } => {
            cli::cmd_listar(output.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
