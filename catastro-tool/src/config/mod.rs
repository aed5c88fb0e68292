//! Configuration du service et chargement du catalogue de couches

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use afecciones::{EngineOptions, LayerCatalog};

/// Paramètres d'exécution (variables d'environnement, surchargées par la CLI)
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Racine des services du Catastro
    pub catastro_base_url: String,
    /// Délai des requêtes au Catastro
    pub catastro_timeout: Duration,
    /// Délai maximal par couche
    pub layer_timeout: Duration,
    /// Couches analysées en parallèle
    pub layer_concurrency: usize,
    /// Nouvelles tentatives HTTP après un échec transitoire
    pub http_max_retries: u32,
    /// Répertoire des résultats (`<output>/<ref>/...`)
    pub output_dir: PathBuf,
    /// Répertoire des couches GeoJSON locales
    pub capas_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            catastro_base_url: "https://ovc.catastro.meh.es".into(),
            catastro_timeout: Duration::from_secs(20),
            layer_timeout: Duration::from_secs(60),
            layer_concurrency: 4,
            http_max_retries: 2,
            output_dir: PathBuf::from("outputs"),
            capas_dir: PathBuf::from("capas"),
        }
    }
}

impl ServiceConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Charge la configuration depuis une source de variables quelconque
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            catastro_base_url: lookup("CATASTRO_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.catastro_base_url),
            catastro_timeout: parse_secs("CATASTRO_TIMEOUT_SECS", defaults.catastro_timeout),
            layer_timeout: parse_secs("LAYER_TIMEOUT_SECS", defaults.layer_timeout),
            layer_concurrency: lookup("LAYER_CONCURRENCY")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.layer_concurrency),
            http_max_retries: lookup("HTTP_MAX_RETRIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.http_max_retries),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            capas_dir: lookup("CAPAS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.capas_dir),
        }
    }

    /// Options du moteur d'intersection
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            concurrency: self.layer_concurrency,
            layer_timeout: self.layer_timeout,
        }
    }
}

/// Charge un catalogue: preset embarqué (`espana`, `local`) ou fichier JSON
pub fn load_catalog(spec: &str) -> Result<LayerCatalog> {
    match spec {
        "espana" => load_embedded(include_str!("presets/espana.json")),
        "local" => load_embedded(include_str!("presets/local.json")),
        path => load_catalog_file(Path::new(path)),
    }
}

/// Charge un catalogue depuis un fichier
pub fn load_catalog_file(path: &Path) -> Result<LayerCatalog> {
    if !path.exists() {
        anyhow::bail!(
            "Unknown catalog: {}. Use a preset (espana, local) or a JSON file",
            path.display()
        );
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

    LayerCatalog::from_json(&content)
        .with_context(|| format!("Invalid catalog file: {}", path.display()))
}

fn load_embedded(json: &str) -> Result<LayerCatalog> {
    LayerCatalog::from_json(json).context("Failed to parse embedded catalog")
}
