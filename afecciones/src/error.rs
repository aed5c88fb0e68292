//! Types d'erreurs pour le crate afecciones

use std::time::Duration;

use thiserror::Error;

/// Erreurs pouvant survenir lors d'une analyse d'affectations
#[derive(Debug, Error)]
pub enum AfeccionError {
    /// Référence cadastrale vide ou mal formée
    #[error("Invalid cadastral reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Référence inconnue du service cadastral
    #[error("Cadastral reference not found: {0}")]
    NotFound(String),

    /// Service amont injoignable ou en erreur
    #[error("Upstream service unavailable ({service}): {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// Couche indisponible (non fatal pour l'analyse)
    #[error("Layer {layer_id} unavailable: {reason}")]
    LayerUnavailable { layer_id: String, reason: String },

    /// Délai dépassé lors de la récupération d'une couche
    #[error("Layer {layer_id} timed out after {elapsed:?}")]
    Timeout { layer_id: String, elapsed: Duration },

    /// Document GML illisible
    #[error("GML error: {0}")]
    Gml(String),

    /// Reprojection impossible
    #[error("Projection error: {0}")]
    Projection(String),

    /// Catalogue de couches incohérent
    #[error("Invalid layer catalog: {0}")]
    InvalidCatalog(String),

    /// Erreur d'I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AfeccionError {
    /// Crée une erreur de référence invalide
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de service amont
    pub fn upstream(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de couche indisponible
    pub fn layer_unavailable(layer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LayerUnavailable {
            layer_id: layer_id.into(),
            reason: reason.into(),
        }
    }

    /// Indique si l'erreur interrompt l'analyse complète (aucun résumé produit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference { .. } | Self::NotFound(_) | Self::UpstreamUnavailable { .. }
        )
    }
}
