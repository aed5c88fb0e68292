//! Politique de classification de l'impact
//!
//! Une seule règle fait autorité:
//! - par couche: `Alto` si le pourcentage dépasse `high_percentage` ou si la
//!   couche est configurée `Alto`, `Medio` si le pourcentage dépasse
//!   `medium_percentage`, `Bajo` sinon;
//! - pour la parcelle: le niveau le plus élevé des couches solapadas, relevé
//!   par le nombre de couches solapadas (`> high_count` ⇒ `Alto`,
//!   `> medium_count` ⇒ au moins `Medio`).

use serde::{Deserialize, Serialize};

use crate::types::{ImpactTier, LayerResult};
use crate::AfeccionError;

/// Seuils de classification (pourcentages et nombres de couches)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactPolicy {
    pub high_percentage: f64,
    pub medium_percentage: f64,
    pub high_count: usize,
    pub medium_count: usize,
}

impl Default for ImpactPolicy {
    fn default() -> Self {
        Self {
            high_percentage: 50.0,
            medium_percentage: 10.0,
            high_count: 3,
            medium_count: 1,
        }
    }
}

impl ImpactPolicy {
    /// Vérifie `0 <= medium <= high <= 100` et `medium_count <= high_count`
    pub fn validate(&self) -> Result<(), AfeccionError> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.high_percentage) || !in_range(self.medium_percentage) {
            return Err(AfeccionError::InvalidCatalog(format!(
                "impact thresholds must be within [0, 100] (medium={}, high={})",
                self.medium_percentage, self.high_percentage
            )));
        }
        if self.medium_percentage > self.high_percentage {
            return Err(AfeccionError::InvalidCatalog(format!(
                "medium threshold {} exceeds high threshold {}",
                self.medium_percentage, self.high_percentage
            )));
        }
        if self.medium_count > self.high_count {
            return Err(AfeccionError::InvalidCatalog(format!(
                "medium_count {} exceeds high_count {}",
                self.medium_count, self.high_count
            )));
        }
        Ok(())
    }

    /// Niveau d'impact d'une couche solapada
    pub fn tier_for(&self, percentage: f64, severity: ImpactTier) -> ImpactTier {
        if percentage > self.high_percentage || severity == ImpactTier::High {
            ImpactTier::High
        } else if percentage > self.medium_percentage {
            ImpactTier::Medium
        } else {
            ImpactTier::Low
        }
    }

    /// Niveau dominant de la parcelle
    pub fn dominant(&self, results: &[LayerResult]) -> ImpactTier {
        let overlapped: Vec<&LayerResult> = results.iter().filter(|r| r.is_overlapped()).collect();

        let highest = overlapped
            .iter()
            .filter_map(|r| r.impact)
            .max()
            .unwrap_or(ImpactTier::Low);

        let by_count = if overlapped.len() > self.high_count {
            ImpactTier::High
        } else if overlapped.len() > self.medium_count {
            ImpactTier::Medium
        } else {
            ImpactTier::Low
        };

        highest.max(by_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Artifacts, LayerCategory, LayerState};

    fn result(state: LayerState, impact: Option<ImpactTier>) -> LayerResult {
        LayerResult {
            layer_id: "l".into(),
            name: "Capa".into(),
            category: LayerCategory::Environmental,
            state,
            area_m2: 0.0,
            percentage: None,
            impact,
            artifacts: Artifacts::default(),
            feature_count: 0,
            feature_names: Vec::new(),
            reason: None,
            intersection: None,
        }
    }

    #[test]
    fn test_tier_boundaries() {
        let p = ImpactPolicy::default();
        assert_eq!(p.tier_for(50.01, ImpactTier::Low), ImpactTier::High);
        assert_eq!(p.tier_for(50.0, ImpactTier::Low), ImpactTier::Medium);
        assert_eq!(p.tier_for(10.01, ImpactTier::Low), ImpactTier::Medium);
        assert_eq!(p.tier_for(10.0, ImpactTier::Medium), ImpactTier::Low);
        assert_eq!(p.tier_for(0.5, ImpactTier::High), ImpactTier::High);
    }

    #[test]
    fn test_dominant_ignores_non_overlapped() {
        let p = ImpactPolicy::default();
        let results = vec![
            result(LayerState::Downloaded, None),
            result(LayerState::Generated, None),
            result(LayerState::Unavailable, None),
        ];
        assert_eq!(p.dominant(&results), ImpactTier::Low);
        assert_eq!(p.dominant(&[]), ImpactTier::Low);
    }

    #[test]
    fn test_dominant_count_escalation() {
        let p = ImpactPolicy::default();
        let two = vec![
            result(LayerState::Overlapped, Some(ImpactTier::Low)),
            result(LayerState::Overlapped, Some(ImpactTier::Low)),
        ];
        assert_eq!(p.dominant(&two), ImpactTier::Medium);

        let four = vec![result(LayerState::Overlapped, Some(ImpactTier::Medium)); 4];
        assert_eq!(p.dominant(&four), ImpactTier::High);
    }

    #[test]
    fn test_dominant_highest_tier_wins() {
        let p = ImpactPolicy::default();
        let results = vec![result(LayerState::Overlapped, Some(ImpactTier::High))];
        assert_eq!(p.dominant(&results), ImpactTier::High);
    }

    #[test]
    fn test_validate() {
        assert!(ImpactPolicy::default().validate().is_ok());
        let inverted = ImpactPolicy {
            high_percentage: 5.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
        let out_of_range = ImpactPolicy {
            high_percentage: 150.0,
            ..Default::default()
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let p: ImpactPolicy = serde_json::from_str(r#"{"high_percentage": 60}"#).unwrap();
        assert_eq!(p.high_percentage, 60.0);
        assert_eq!(p.medium_percentage, 10.0);
        assert_eq!(p.high_count, 3);
    }
}
