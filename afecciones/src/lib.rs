//! # afecciones
//!
//! Analyse des affectations d'une parcelle cadastrale espagnole: intersection
//! de la géométrie de la parcelle avec un catalogue de couches réglementaires,
//! environnementales et d'infrastructures, puis classification de l'impact.
//!
//! ## Features
//!
//! - Catalogue de couches versionné et injectable (WFS, WMS, GeoJSON local)
//! - Parsing GML optimisé avec `memchr`, `simdutf8` et `fast-float`
//! - Intersection polygonale `geo`, surfaces en m² via une reprojection UTM légère
//! - Analyse concurrente bornée des couches, échecs isolés par couche
//! - Règle unique et configurable de niveau d'impact (`ImpactPolicy`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use afecciones::{Analyzer, EngineOptions, IntersectionEngine, LayerCatalog};
//! use std::sync::Arc;
//!
//! let catalog = Arc::new(LayerCatalog::from_json(&json)?);
//! let engine = IntersectionEngine::new(fetcher, EngineOptions::default());
//! let analyzer = Analyzer::new(source, engine, catalog);
//!
//! let analysis = analyzer.analyze("9872023VH5797S").await?;
//! println!("{} couches affectées", analysis.summary.affected_layers);
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod gml;
pub mod policy;
pub mod projection;
pub mod run;
pub mod source;
pub mod summary;
pub mod types;

pub use catalog::{Layer, LayerCatalog, LayerSource};
pub use engine::{evaluate_layer, EngineOptions, IntersectionEngine};
pub use error::AfeccionError;
pub use policy::ImpactPolicy;
pub use run::{Analyzer, ParcelAnalysis, RunOutcome, RunPhase};
pub use source::{ArtifactSink, GeometrySource, LayerData, LayerFetcher, LayerRequest, NullSink};
pub use summary::summarize;
pub use types::{
    parse_reference_list, AnalysisSummary, Artifacts, Coordinates, ImpactTier, LayerCategory,
    LayerResult, LayerState, ParcelGeometry, ParcelReference, Shape, Srs,
};
