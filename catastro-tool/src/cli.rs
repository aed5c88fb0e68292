//! Définition et implémentation des commandes CLI
//!
//! - `analizar`: une référence → réponse JSON + fichiers
//! - `lote`: liste de références, traitées séquentiellement
//! - `capas`: inventaire du catalogue et des couches locales
//! - `listar`: références déjà analysées dans le répertoire de sortie

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use afecciones::{
    parse_reference_list, AfeccionError, Analyzer, IntersectionEngine, LayerCatalog, LayerSource,
    ParcelAnalysis,
};

use crate::config::{load_catalog, ServiceConfig};
use crate::export::{self, FileSink, OutputLayout};
use crate::presenter::ApiResponse;
use crate::report::BatchReport;
use crate::upstream::{
    build_http_client, CatastroClient, LayerDispatcher, LocalLayerStore, RetryPolicy, WfsClient,
    WmsClient,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze the affectations of one cadastral reference
    Analizar {
        /// Cadastral reference (14 or 20 characters)
        referencia: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Analyze a list of references sequentially
    Lote {
        /// References (comma or whitespace separated)
        referencias: Vec<String>,

        /// File containing references
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Pause between two references, in milliseconds
        #[arg(long, default_value_t = 1000)]
        pause_ms: u64,

        /// Batch report path (default: <output>/informe_lote.json); a CSV summary is written alongside
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List catalog layers and local layer files
    Capas {
        /// Catalog preset name (espana/local) or path to a JSON catalog
        #[arg(long, default_value = "espana")]
        catalog: String,

        /// Local layers directory (default: env CAPAS_DIR / capas)
        #[arg(long)]
        capas_dir: Option<PathBuf>,
    },

    /// List references already analyzed in the output directory
    Listar {
        /// Output directory (default: env OUTPUT_DIR / outputs)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options communes aux commandes d'analyse
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Catalog preset name (espana/local) or path to a JSON catalog
    #[arg(long, default_value = "espana")]
    pub catalog: String,

    /// Output directory (default: env OUTPUT_DIR / outputs)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Local layers directory (default: env CAPAS_DIR / capas)
    #[arg(long)]
    pub capas_dir: Option<PathBuf>,

    /// Layers analyzed concurrently (default: env LAYER_CONCURRENCY / 4)
    #[arg(long, alias = "jobs")]
    pub concurrency: Option<usize>,

    /// Per-layer timeout in seconds (default: env LAYER_TIMEOUT_SECS / 60)
    #[arg(long)]
    pub layer_timeout: Option<u64>,

    /// Catastro base URL (default: env CATASTRO_BASE_URL)
    #[arg(long)]
    pub catastro_url: Option<String>,

    /// Write <output>/<ref>_completo.tar.bz2
    #[arg(long)]
    pub bundle: bool,

    /// Print the JSON response on stdout
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Surcharge la configuration issue de l'environnement
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(dir) = &self.capas_dir {
            config.capas_dir = dir.clone();
        }
        if let Some(n) = self.concurrency.filter(|n| *n > 0) {
            config.layer_concurrency = n;
        }
        if let Some(secs) = self.layer_timeout {
            config.layer_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = &self.catastro_url {
            config.catastro_base_url = url.trim_end_matches('/').to_string();
        }
    }
}

/// Services assemblés pour une série d'analyses
pub struct Runtime {
    analyzer: Analyzer,
    layout: OutputLayout,
}

impl Runtime {
    pub fn new(config: &ServiceConfig, catalog: LayerCatalog) -> Result<Self> {
        let retry = RetryPolicy::with_max_retries(config.http_max_retries);
        let layout = OutputLayout::new(&config.output_dir);

        let catastro_http = build_http_client(config.catastro_timeout)?;
        let layer_http = build_http_client(config.layer_timeout)?;

        let source = CatastroClient::new(catastro_http, &config.catastro_base_url, retry);
        let dispatcher = LayerDispatcher::new(
            WfsClient::new(layer_http.clone(), retry),
            WmsClient::new(layer_http, retry, layout.clone()),
            LocalLayerStore::new(&config.capas_dir),
        );
        let engine = IntersectionEngine::new(Arc::new(dispatcher), config.engine_options())
            .with_sink(Arc::new(FileSink::new(layout.clone())));

        Ok(Self::with_analyzer(
            Analyzer::new(Arc::new(source), engine, Arc::new(catalog)),
            layout,
        ))
    }

    pub fn with_analyzer(analyzer: Analyzer, layout: OutputLayout) -> Self {
        Self { analyzer, layout }
    }

    pub fn catalog(&self) -> &LayerCatalog {
        self.analyzer.catalog()
    }

    /// Analyse une référence et écrit les fichiers de la parcelle
    ///
    /// Les échecs d'écriture sont journalisés sans invalider l'analyse.
    pub async fn run(&self, raw_reference: &str, bundle: bool) -> Result<ParcelAnalysis, AfeccionError> {
        let analysis = self.analyzer.analyze(raw_reference).await?;
        let reference = analysis.reference.as_str();

        if let Err(e) = self.layout.create_dirs(reference) {
            warn!(reference, error = %e, "Output directories not created");
        }
        if let Err(e) = export::write_parcel_kml(&self.layout, reference, &analysis.geometry).await {
            warn!(reference, error = %e, "Parcel KML not written");
        }
        let response = ApiResponse::from_analysis(&analysis);
        if let Err(e) = export::write_analysis_json(&self.layout, reference, &response).await {
            warn!(reference, error = %e, "Analysis JSON not written");
        }

        if bundle {
            let layout = self.layout.clone();
            let owned = reference.to_string();
            match tokio::task::spawn_blocking(move || export::bundle_reference(&layout, &owned)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(reference, error = %e, "Bundle not written"),
                Err(e) => warn!(reference, error = %e, "Bundle task failed"),
            }
        }

        Ok(analysis)
    }

    /// Analyse et réponse API (succès ou erreur fatale)
    pub async fn respond(&self, raw_reference: &str, bundle: bool) -> ApiResponse {
        match self.run(raw_reference, bundle).await {
            Ok(analysis) => ApiResponse::from_analysis(&analysis),
            Err(e) => ApiResponse::from_error(raw_reference, &e),
        }
    }
}

fn load_config(run: &RunArgs) -> ServiceConfig {
    let mut config = ServiceConfig::from_env();
    run.apply(&mut config);
    config
}

/// Exécute la commande analizar; retourne `false` en cas d'erreur fatale
pub async fn cmd_analizar(referencia: &str, run: &RunArgs) -> Result<bool> {
    let config = load_config(run);
    let catalog = load_catalog(&run.catalog)?;
    println!("=== Análisis {} ===", referencia.trim());
    println!("Catalog: {} (v{}, {} layers)", run.catalog, catalog.version, catalog.len());
    println!("Output: {}", config.output_dir.display());

    let runtime = Runtime::new(&config, catalog)?;
    let response = runtime.respond(referencia, run.bundle).await;

    if run.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(response.is_success())
}

fn print_response(response: &ApiResponse) {
    if let Some(error) = &response.error {
        println!("\nError: {}", error);
        return;
    }
    if let Some(c) = &response.coordenadas {
        println!("Coordinates: {:.6}, {:.6}", c.lat, c.lon);
    }
    let Some(analisis) = &response.analisis else {
        return;
    };
    let resumen = &analisis.resumen;
    println!(
        "\nLayers: {} affecting / {} total, affected area {}",
        resumen.capas_afectan, resumen.total_capas, resumen.superficie_total_afectada
    );
    for capa in &analisis.capas_procesadas {
        println!(
            "  {:<40} {:<12} {:>16} {:>8} {}",
            capa.nombre,
            capa.estado.as_str(),
            capa.superficie,
            capa.porcentaje.as_deref().unwrap_or("-"),
            capa.impacto.map_or("", |t| t.as_str())
        );
    }
}

/// Références d'un lot: arguments puis fichier, doublons retirés
fn collect_references(inline: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut references: Vec<String> = inline
        .iter()
        .flat_map(|arg| parse_reference_list(arg))
        .collect();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference file: {}", path.display()))?;
        references.extend(parse_reference_list(&content));
    }

    let mut seen = std::collections::HashSet::new();
    references.retain(|r| seen.insert(r.to_uppercase()));
    Ok(references)
}

/// Exécute la commande lote
pub async fn cmd_lote(
    referencias: &[String],
    file: Option<&Path>,
    pause: Duration,
    report_path: Option<&Path>,
    run: &RunArgs,
) -> Result<BatchReport> {
    let references = collect_references(referencias, file)?;
    if references.is_empty() {
        anyhow::bail!("No cadastral references given (arguments or --file)");
    }

    let config = load_config(run);
    let catalog = load_catalog(&run.catalog)?;
    let mut report = BatchReport::new(&catalog.version, &catalog.fingerprint());
    let runtime = Runtime::new(&config, catalog)?;

    println!("=== Lote ===");
    println!("References: {}", references.len());
    println!("Catalog: {} (v{})", run.catalog, runtime.catalog().version);
    println!("Pause: {:?}", pause);

    let start = Instant::now();
    for (i, reference) in references.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        info!(reference = %reference, index = i + 1, total = references.len(), "Batch item");

        let item_start = Instant::now();
        match runtime.run(reference, run.bundle).await {
            Ok(analysis) => report.record_analysis(&analysis, item_start.elapsed()),
            Err(e) => {
                warn!(reference = %reference, error = %e, "Reference failed");
                report.record_failure(reference, &e, item_start.elapsed());
            }
        }
    }
    report.set_duration(start.elapsed());
    report.finalize();

    report.display();
    let default_path = config.output_dir.join("informe_lote.json");
    let path = report_path.unwrap_or(&default_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    report
        .save_to_file(path)
        .with_context(|| format!("Failed to save batch report: {}", path.display()))?;
    println!("Report: {}", path.display());
    let csv_path = path.with_extension("csv");
    report
        .save_csv(&csv_path)
        .with_context(|| format!("Failed to save batch CSV: {}", csv_path.display()))?;
    println!("CSV: {}", csv_path.display());

    Ok(report)
}

/// Exécute la commande capas
pub fn cmd_capas(catalog_spec: &str, capas_dir: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog_spec)?;
    let mut config = ServiceConfig::from_env();
    if let Some(dir) = capas_dir {
        config.capas_dir = dir.to_path_buf();
    }
    let store = LocalLayerStore::new(&config.capas_dir);

    println!("=== Catalog {} ===", catalog_spec);
    println!("Version: {}", catalog.version);
    println!("Fingerprint: {}", catalog.fingerprint());
    println!(
        "Policy: high > {}%, medium > {}%, escalation > {} / > {} layers",
        catalog.policy.high_percentage,
        catalog.policy.medium_percentage,
        catalog.policy.high_count,
        catalog.policy.medium_count
    );
    println!("Local layers directory: {}", store.root().display());

    println!("\n{:<24} {:<6} {:<16} {:<6} Name", "Id", "Type", "Category", "Sev.");
    for layer in catalog.iter() {
        println!(
            "{:<24} {:<6} {:<16} {:<6} {}",
            layer.id,
            layer.source.kind(),
            layer.category.as_str(),
            layer.severity.as_str(),
            layer.name
        );
        if let LayerSource::Local { path } = &layer.source {
            match store.describe(path) {
                Ok(info) => println!(
                    "    {} files, {} polygons, SRS {}{}",
                    info.files,
                    info.polygons,
                    info.srs
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    if info.unreadable > 0 {
                        format!(", {} unreadable", info.unreadable)
                    } else {
                        String::new()
                    }
                ),
                Err(e) => println!("    unavailable: {}", e),
            }
        }
    }

    Ok(())
}

/// Exécute la commande listar
pub fn cmd_listar(output: Option<&Path>) -> Result<Vec<String>> {
    let mut config = ServiceConfig::from_env();
    if let Some(dir) = output {
        config.output_dir = dir.to_path_buf();
    }
    let layout = OutputLayout::new(&config.output_dir);
    let references = layout
        .analysed_references()
        .with_context(|| format!("Failed to list {}", layout.root().display()))?;

    println!("=== {} ({} references) ===", layout.root().display(), references.len());
    for reference in &references {
        println!("  {}", reference);
    }
    Ok(references)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_references_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.txt");
        std::fs::write(&path, "9872023VH5797S\n0000000XX0000X, short\n").unwrap();

        let refs = collect_references(
            &["9872023vh5797s,1111111YY1111Y".to_string()],
            Some(&path),
        )
        .unwrap();
        assert_eq!(refs, vec!["9872023vh5797s", "1111111YY1111Y", "0000000XX0000X"]);
    }

    #[test]
    fn test_run_args_override_config() {
        let run = RunArgs {
            catalog: "local".into(),
            output: Some("/tmp/out".into()),
            capas_dir: None,
            concurrency: Some(0),
            layer_timeout: Some(5),
            catastro_url: Some("http://localhost:9000/".into()),
            bundle: false,
            json: false,
        };
        let mut config = ServiceConfig::default();
        run.apply(&mut config);

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.layer_concurrency, 4);
        assert_eq!(config.layer_timeout, Duration::from_secs(5));
        assert_eq!(config.catastro_base_url, "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_invalid_reference_response() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            output_dir: dir.path().join("out"),
            capas_dir: dir.path().join("capas"),
            ..Default::default()
        };
        let runtime = Runtime::new(&config, load_catalog("local").unwrap()).unwrap();

        // Rejetée avant tout appel réseau
        let response = runtime.respond("abc", false).await;
        assert!(!response.is_success());
        assert!(response.analisis.is_none());
    }
}
