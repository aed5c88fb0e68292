//! Contrats d'accès aux données externes
//!
//! Les implémentations (clients HTTP, stockage local) vivent dans l'outil;
//! le cœur ne dépend que de ces traits.

use async_trait::async_trait;
use geo::{MultiPolygon, Rect};

use crate::catalog::Layer;
use crate::types::{Artifacts, LayerResult, ParcelGeometry, ParcelReference, Srs};
use crate::AfeccionError;

/// Résolution d'une référence cadastrale en géométrie
#[async_trait]
pub trait GeometrySource: Send + Sync {
    /// Erreurs: `NotFound`, `UpstreamUnavailable`, `InvalidReference`
    async fn resolve(&self, reference: &ParcelReference) -> Result<ParcelGeometry, AfeccionError>;
}

/// Requête de récupération d'une couche autour d'une parcelle
#[derive(Debug, Clone)]
pub struct LayerRequest {
    pub reference: ParcelReference,
    /// Emprise de la parcelle, dans `srs`
    pub bbox: Rect<f64>,
    /// Système de la parcelle; les données retournées doivent l'utiliser
    pub srs: Srs,
}

/// Données d'une couche
#[derive(Debug, Clone)]
pub enum LayerData {
    /// Géométries vectorielles, dans le système de la requête
    Vector {
        polygons: MultiPolygon<f64>,
        /// Nom de chaque polygone (même ordre), vide si la source n'en fournit pas
        names: Vec<Option<String>>,
        artifacts: Artifacts,
    },
    /// Image seule (WMS)
    Raster { artifacts: Artifacts },
}

impl LayerData {
    pub fn artifacts(&self) -> &Artifacts {
        match self {
            Self::Vector { artifacts, .. } | Self::Raster { artifacts } => artifacts,
        }
    }
}

/// Récupération des données d'une couche
#[async_trait]
pub trait LayerFetcher: Send + Sync {
    /// Erreurs attendues: `LayerUnavailable`, `Timeout`
    async fn fetch(&self, layer: &Layer, request: &LayerRequest) -> Result<LayerData, AfeccionError>;
}

/// Production des fichiers associés à une couche analysée (KML, GeoJSON)
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn layer_artifacts(
        &self,
        reference: &ParcelReference,
        parcel: &ParcelGeometry,
        result: &LayerResult,
    ) -> Result<Artifacts, AfeccionError>;
}

/// Aucun fichier produit
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl ArtifactSink for NullSink {
    async fn layer_artifacts(
        &self,
        _reference: &ParcelReference,
        _parcel: &ParcelGeometry,
        _result: &LayerResult,
    ) -> Result<Artifacts, AfeccionError> {
        Ok(Artifacts::default())
    }
}
