//! Moteur d'intersection parcelle × couches
//!
//! Chaque couche est récupérée puis découpée indépendamment: un échec (erreur,
//! délai dépassé, panique du découpage) ne produit qu'un résultat
//! `Unavailable` pour cette couche. Les résultats sont rendus dans l'ordre du
//! catalogue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use geo::{Area, BooleanOps, BoundingRect, Contains, Intersects, MultiPolygon, Polygon};
use tracing::{debug, info, warn};

use crate::catalog::{Layer, LayerCatalog};
use crate::policy::ImpactPolicy;
use crate::projection;
use crate::source::{ArtifactSink, LayerData, LayerFetcher, LayerRequest, NullSink};
use crate::types::{Artifacts, LayerResult, LayerState, ParcelGeometry, ParcelReference, Shape};
use crate::AfeccionError;

/// Options d'exécution du moteur
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Nombre maximal de couches récupérées en parallèle
    pub concurrency: usize,
    /// Délai maximal de récupération d'une couche
    pub layer_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            layer_timeout: Duration::from_secs(60),
        }
    }
}

impl LayerResult {
    fn for_layer(layer: &Layer, state: LayerState) -> Self {
        Self {
            layer_id: layer.id.clone(),
            name: layer.name.clone(),
            category: layer.category,
            state,
            area_m2: 0.0,
            percentage: None,
            impact: None,
            artifacts: Artifacts::default(),
            feature_count: 0,
            feature_names: Vec::new(),
            reason: None,
            intersection: None,
        }
    }

    /// Résultat d'une couche dont la récupération a échoué
    pub fn unavailable(layer: &Layer, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::for_layer(layer, LayerState::Unavailable)
        }
    }
}

/// Moteur d'intersection
#[derive(Clone)]
pub struct IntersectionEngine {
    fetcher: Arc<dyn LayerFetcher>,
    sink: Arc<dyn ArtifactSink>,
    options: EngineOptions,
}

impl IntersectionEngine {
    pub fn new(fetcher: Arc<dyn LayerFetcher>, options: EngineOptions) -> Self {
        Self {
            fetcher,
            sink: Arc::new(NullSink),
            options,
        }
    }

    /// Fichiers produits pour les couches solapadas
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Analyse toutes les couches du catalogue pour une parcelle
    ///
    /// Retourne exactement un résultat par couche, dans l'ordre du catalogue.
    pub async fn analyze(
        &self,
        reference: &ParcelReference,
        parcel: &ParcelGeometry,
        catalog: &LayerCatalog,
    ) -> Vec<LayerResult> {
        let Some(bbox) = parcel.bounding_rect() else {
            warn!(reference = %reference, "Parcel geometry is empty");
            return catalog
                .iter()
                .map(|layer| LayerResult::unavailable(layer, "empty parcel geometry"))
                .collect();
        };

        let parcel_area = match &parcel.shape {
            Shape::Area(polygons) => match projection::area_m2(polygons, parcel.srs) {
                Ok(area) => Some(area),
                Err(e) => {
                    warn!(reference = %reference, error = %e, "Parcel area not computable");
                    None
                }
            },
            Shape::Point(_) => None,
        };

        let request = LayerRequest {
            reference: reference.clone(),
            bbox,
            srs: parcel.srs,
        };

        info!(
            reference = %reference,
            layers = catalog.len(),
            concurrency = self.options.concurrency,
            "Analyzing layers"
        );

        stream::iter(catalog.iter())
            .map(|layer| self.run_layer(layer, parcel, parcel_area, &request, &catalog.policy))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    async fn run_layer(
        &self,
        layer: &Layer,
        parcel: &ParcelGeometry,
        parcel_area: Option<f64>,
        request: &LayerRequest,
        policy: &ImpactPolicy,
    ) -> LayerResult {
        let start = Instant::now();

        let fetched =
            tokio::time::timeout(self.options.layer_timeout, self.fetcher.fetch(layer, request))
                .await;
        let data = match fetched {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(layer = %layer.id, error = %e, "Layer unavailable");
                return LayerResult::unavailable(layer, e.to_string());
            }
            Err(_) => {
                let e = AfeccionError::Timeout {
                    layer_id: layer.id.clone(),
                    elapsed: start.elapsed(),
                };
                warn!(layer = %layer.id, error = %e, "Layer fetch timed out");
                return LayerResult::unavailable(layer, e.to_string());
            }
        };

        // Découpage CPU sur le pool bloquant (une panique reste locale)
        let clip_layer = layer.clone();
        let clip_parcel = parcel.clone();
        let clip_policy = *policy;
        let clipped = tokio::task::spawn_blocking(move || {
            evaluate_layer(&clip_layer, &clip_parcel, parcel_area, data, &clip_policy)
        })
        .await;

        let mut result = match clipped {
            Ok(result) => result,
            Err(e) => {
                warn!(layer = %layer.id, error = %e, "Clipping failed");
                return LayerResult::unavailable(layer, format!("clipping failed: {}", e));
            }
        };

        if result.is_overlapped() {
            match self.sink.layer_artifacts(&request.reference, parcel, &result).await {
                Ok(artifacts) => result.artifacts = artifacts.merge(result.artifacts),
                Err(e) => warn!(layer = %layer.id, error = %e, "Artifacts not written"),
            }
        }

        debug!(
            layer = %layer.id,
            state = result.state.as_str(),
            area_m2 = result.area_m2,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Layer evaluated"
        );

        result
    }
}

/// Intersection d'une parcelle avec les données d'une couche
///
/// `parcel_area_m2` est la surface de la parcelle (absente pour un point).
pub fn evaluate_layer(
    layer: &Layer,
    parcel: &ParcelGeometry,
    parcel_area_m2: Option<f64>,
    data: LayerData,
    policy: &ImpactPolicy,
) -> LayerResult {
    let (polygons, names, artifacts) = match data {
        LayerData::Raster { artifacts } => {
            return LayerResult {
                artifacts,
                ..LayerResult::for_layer(layer, LayerState::Generated)
            };
        }
        LayerData::Vector {
            polygons,
            names,
            artifacts,
        } => (polygons, names, artifacts),
    };

    let downloaded = LayerResult {
        artifacts: artifacts.clone(),
        ..LayerResult::for_layer(layer, LayerState::Downloaded)
    };

    match &parcel.shape {
        // Un point n'a pas de surface: jamais `Overlapped`, seule la présence
        // dans les entités est rapportée
        Shape::Point(point) => {
            let hits: Vec<usize> = polygons
                .iter()
                .enumerate()
                .filter(|(_, polygon)| polygon.contains(point))
                .map(|(i, _)| i)
                .collect();
            LayerResult {
                feature_count: hits.len(),
                feature_names: feature_names(&names, &hits),
                ..downloaded
            }
        }
        Shape::Area(parcel_polygons) => {
            let Clipped { intersection, hits } = clip(parcel_polygons, &polygons);
            let area = match projection::area_m2(&intersection, parcel.srs) {
                Ok(area) => area,
                Err(e) => return LayerResult::unavailable(layer, e.to_string()),
            };

            if area <= 0.0 {
                return downloaded;
            }

            let percentage = parcel_area_m2
                .filter(|total| *total > 0.0)
                .map(|total| (area / total * 100.0).clamp(0.0, 100.0));

            LayerResult {
                area_m2: area,
                percentage,
                impact: Some(policy.tier_for(percentage.unwrap_or(0.0), layer.severity)),
                artifacts,
                feature_count: hits.len(),
                feature_names: feature_names(&names, &hits),
                intersection: Some(intersection),
                ..LayerResult::for_layer(layer, LayerState::Overlapped)
            }
        }
    }
}

/// Résultat du découpage: géométrie et indices des entités touchées
struct Clipped {
    intersection: MultiPolygon<f64>,
    hits: Vec<usize>,
}

/// Intersection polygone par polygone, puis union des morceaux
///
/// Les entités d'une couche peuvent se chevaucher entre elles: un seul
/// `intersection` sur le multipolygone compterait deux fois les recouvrements.
fn clip(parcel: &MultiPolygon<f64>, layer: &MultiPolygon<f64>) -> Clipped {
    let mut clipped = Clipped {
        intersection: MultiPolygon::new(Vec::new()),
        hits: Vec::new(),
    };
    let Some(parcel_rect) = parcel.bounding_rect() else {
        return clipped;
    };

    for (index, polygon) in layer.iter().enumerate() {
        let near = polygon
            .bounding_rect()
            .is_some_and(|r| r.intersects(&parcel_rect));
        if !near {
            continue;
        }
        let piece = parcel.intersection(&single(polygon));
        if piece.unsigned_area() <= 0.0 {
            continue;
        }
        clipped.hits.push(index);
        clipped.intersection = if clipped.intersection.0.is_empty() {
            piece
        } else {
            clipped.intersection.union(&piece)
        };
    }
    clipped
}

fn single(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon.clone()])
}

/// Noms des entités touchées, sans doublons, dans l'ordre de la couche
fn feature_names(names: &[Option<String>], hits: &[usize]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in hits.iter().filter_map(|&i| names.get(i)?.as_deref()) {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}
