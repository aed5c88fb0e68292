//! # catastro-tool
//!
//! Analyse des affectations d'une parcelle du Catastro espagnol.
//!
//! ## Features
//!
//! - Géométrie de la parcelle via INSPIRE WFS, repli sur les services JSON/XML
//! - Couches WFS, WMS et GeoJSON locales, catalogue injectable
//! - Exports KML/GeoJSON par couche affectée, archive tar.bz2
//! - Réponse JSON compatible avec l'API historique
//! - Traitement par lot avec rapport JSON et résumé CSV
//!
//! ## Usage CLI
//!
//! ```bash
//! # Une référence, catalogue des services publics
//! catastro-tool analizar 9872023VH5797S --json
//!
//! # Lot depuis un fichier, couches locales, archive par référence
//! catastro-tool lote --file referencias.txt --catalog local --bundle
//!
//! # Inventaire des couches
//! catastro-tool capas --catalog local
//!
//! # Références déjà analysées
//! catastro-tool listar --output outputs
//! ```

pub mod cli;
pub mod config;
pub mod export;
pub mod presenter;
pub mod report;
pub mod upstream;

pub use config::{load_catalog, ServiceConfig};
pub use export::{FileSink, OutputLayout};
pub use presenter::ApiResponse;
pub use report::{BatchReport, BatchStatus};
