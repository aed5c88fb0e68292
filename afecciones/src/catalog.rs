//! Catalogue versionné des couches à analyser
//!
//! Le catalogue est immuable pendant une analyse et partagé entre les runs.
//! Son empreinte (blake3 du JSON canonique) identifie l'instantané utilisé.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::policy::ImpactPolicy;
use crate::types::{ImpactTier, LayerCategory};
use crate::AfeccionError;

/// Origine des données d'une couche
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSource {
    /// Service WFS (GetFeature, sortie GML)
    Wfs { url: String, type_name: String },
    /// Service WMS (GetMap PNG), aucune géométrie vectorielle
    Wms { url: String, layers: String },
    /// Fichier ou répertoire GeoJSON local
    Local { path: PathBuf },
}

impl LayerSource {
    /// Couche purement raster: l'intersection n'est pas quantifiable
    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Wms { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Wfs { .. } => "wfs",
            Self::Wms { .. } => "wms",
            Self::Local { .. } => "local",
        }
    }
}

/// Couche candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub category: LayerCategory,
    pub severity: ImpactTier,
    pub source: LayerSource,
}

/// Catalogue de couches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerCatalog {
    pub version: String,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub policy: ImpactPolicy,
}

impl LayerCatalog {
    /// Charge et valide un catalogue JSON
    pub fn from_json(json: &str) -> Result<Self, AfeccionError> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| AfeccionError::InvalidCatalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Vérifie la cohérence du catalogue
    pub fn validate(&self) -> Result<(), AfeccionError> {
        if self.version.trim().is_empty() {
            return Err(AfeccionError::InvalidCatalog("empty version".into()));
        }
        if self.layers.is_empty() {
            return Err(AfeccionError::InvalidCatalog("no layers".into()));
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.id.trim().is_empty() {
                return Err(AfeccionError::InvalidCatalog("layer with empty id".into()));
            }
            if layer.name.trim().is_empty() {
                return Err(AfeccionError::InvalidCatalog(format!(
                    "layer '{}' has an empty name",
                    layer.id
                )));
            }
            if !seen.insert(layer.id.as_str()) {
                return Err(AfeccionError::InvalidCatalog(format!(
                    "duplicate layer id '{}'",
                    layer.id
                )));
            }
        }

        self.policy.validate()
    }

    /// Empreinte hexadécimale de l'instantané du catalogue
    pub fn fingerprint(&self) -> String {
        // Sérialisation d'une structure sans map: ordre des champs stable
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(&blake3::hash(&bytes).as_bytes()[..16])
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }
}
