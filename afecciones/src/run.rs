//! Déroulement d'une analyse de parcelle
//!
//! ```text
//! Pending → Resolving → Analyzing → Summarized → Complete
//!                                              ↘ PartiallyFailed
//! ```
//!
//! Seul un échec de la résolution de géométrie est fatal: aucun résumé n'est
//! produit et l'erreur typée remonte à l'appelant.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::LayerCatalog;
use crate::engine::IntersectionEngine;
use crate::source::GeometrySource;
use crate::summary::summarize;
use crate::types::{AnalysisSummary, LayerResult, LayerState, ParcelGeometry, ParcelReference};
use crate::AfeccionError;

/// Phase d'un run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Pending,
    Resolving,
    Analyzing,
    Summarized,
    Complete,
    PartiallyFailed,
}

impl RunPhase {
    /// Transitions autorisées
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Resolving, Analyzing)
                | (Analyzing, Summarized)
                | (Summarized, Complete)
                | (Summarized, PartiallyFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::PartiallyFailed)
    }
}

/// Issue d'un run ayant produit un résumé
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Complete,
    /// Au moins une couche `Unavailable`
    PartiallyFailed,
}

impl From<RunOutcome> for RunPhase {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Complete => RunPhase::Complete,
            RunOutcome::PartiallyFailed => RunPhase::PartiallyFailed,
        }
    }
}

/// Résultat immuable d'une analyse
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelAnalysis {
    pub reference: ParcelReference,
    pub geometry: ParcelGeometry,
    pub summary: AnalysisSummary,
    /// Un résultat par couche, dans l'ordre du catalogue
    pub layers: Vec<LayerResult>,
    pub outcome: RunOutcome,
    pub catalog_version: String,
    pub catalog_fingerprint: String,
}

impl ParcelAnalysis {
    pub fn unavailable_layers(&self) -> impl Iterator<Item = &LayerResult> {
        self.layers
            .iter()
            .filter(|r| r.state == LayerState::Unavailable)
    }
}

/// Suivi des phases d'un run
struct RunTracker<'a> {
    reference: &'a str,
    phase: RunPhase,
}

impl<'a> RunTracker<'a> {
    fn new(reference: &'a str) -> Self {
        Self {
            reference,
            phase: RunPhase::Pending,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(reference = self.reference, from = ?self.phase, to = ?next, "Run phase");
        self.phase = next;
    }
}

/// Orchestration: résolution de géométrie, analyse des couches, résumé
#[derive(Clone)]
pub struct Analyzer {
    source: Arc<dyn GeometrySource>,
    engine: IntersectionEngine,
    catalog: Arc<LayerCatalog>,
}

impl Analyzer {
    pub fn new(
        source: Arc<dyn GeometrySource>,
        engine: IntersectionEngine,
        catalog: Arc<LayerCatalog>,
    ) -> Self {
        Self {
            source,
            engine,
            catalog,
        }
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    /// Analyse une référence saisie par l'utilisateur
    ///
    /// # Errors
    ///
    /// `InvalidReference`, `NotFound` ou `UpstreamUnavailable`; toute autre
    /// erreur de la source de géométrie est rapportée comme `UpstreamUnavailable`.
    pub async fn analyze(&self, raw_reference: &str) -> Result<ParcelAnalysis, AfeccionError> {
        let start = Instant::now();
        let mut tracker = RunTracker::new(raw_reference);

        tracker.advance(RunPhase::Resolving);
        let reference = ParcelReference::parse(raw_reference)?;
        let geometry = self.source.resolve(&reference).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                AfeccionError::upstream("geometry source", e.to_string())
            }
        })?;
        if geometry.bounding_rect().is_none() {
            warn!(reference = %reference, "Parcel geometry is empty");
            return Err(AfeccionError::NotFound(reference.to_string()));
        }
        info!(reference = %reference, srs = %geometry.srs, "Parcel geometry resolved");

        tracker.advance(RunPhase::Analyzing);
        let layers = self
            .engine
            .analyze(&reference, &geometry, &self.catalog)
            .await;

        tracker.advance(RunPhase::Summarized);
        let summary = summarize(&reference, &geometry, &layers, &self.catalog.policy);

        let unavailable = layers
            .iter()
            .filter(|r| r.state == LayerState::Unavailable)
            .count();
        let outcome = if unavailable > 0 {
            warn!(reference = %reference, unavailable, "Some layers are unavailable");
            RunOutcome::PartiallyFailed
        } else {
            RunOutcome::Complete
        };
        tracker.advance(outcome.into());

        info!(
            reference = %reference,
            total = summary.total_layers,
            affected = summary.affected_layers,
            area_m2 = summary.total_affected_area_m2,
            impact = summary.dominant_impact.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis finished"
        );

        Ok(ParcelAnalysis {
            reference,
            geometry,
            summary,
            layers,
            outcome,
            catalog_version: self.catalog.version.clone(),
            catalog_fingerprint: self.catalog.fingerprint(),
        })
    }
}
