//! Rapport d'un traitement par lot
//!
//! Une entrée par référence, dans l'ordre de traitement. Les échecs d'une
//! référence n'interrompent pas le lot.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use afecciones::{AfeccionError, ImpactTier, ParcelAnalysis, RunOutcome};

/// Statut global du lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    /// Toutes les références analysées sans couche indisponible
    Success,
    /// Au moins une référence en erreur ou partielle, au moins une analysée
    PartialSuccess,
    /// Aucune référence analysée
    Failed,
}

/// Issue d'une référence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceStatus {
    Complete,
    PartiallyFailed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceRecord {
    pub reference: String,
    pub status: ReferenceStatus,
    pub total_layers: usize,
    pub affected_layers: usize,
    pub unavailable_layers: usize,
    pub total_affected_area_m2: f64,
    pub dominant_impact: Option<ImpactTier>,
    pub error: Option<String>,
    pub duration_secs: f64,
}

/// Rapport complet d'un lot
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub catalog_version: String,
    pub catalog_fingerprint: String,
    pub duration_secs: f64,
    pub status: BatchStatus,

    pub references_processed: usize,
    pub references_failed: usize,
    pub references_partial: usize,

    pub records: Vec<ReferenceRecord>,
}

impl BatchReport {
    pub fn new(catalog_version: &str, catalog_fingerprint: &str) -> Self {
        Self {
            catalog_version: catalog_version.to_string(),
            catalog_fingerprint: catalog_fingerprint.to_string(),
            duration_secs: 0.0,
            status: BatchStatus::Success,
            references_processed: 0,
            references_failed: 0,
            references_partial: 0,
            records: Vec::new(),
        }
    }

    /// Enregistre une analyse aboutie
    pub fn record_analysis(&mut self, analysis: &ParcelAnalysis, elapsed: Duration) {
        self.references_processed += 1;
        let status = match analysis.outcome {
            RunOutcome::Complete => ReferenceStatus::Complete,
            RunOutcome::PartiallyFailed => {
                self.references_partial += 1;
                ReferenceStatus::PartiallyFailed
            }
        };
        let summary = &analysis.summary;
        self.records.push(ReferenceRecord {
            reference: analysis.reference.to_string(),
            status,
            total_layers: summary.total_layers,
            affected_layers: summary.affected_layers,
            unavailable_layers: analysis.unavailable_layers().count(),
            total_affected_area_m2: summary.total_affected_area_m2,
            dominant_impact: Some(summary.dominant_impact),
            error: None,
            duration_secs: elapsed.as_secs_f64(),
        });
    }

    /// Enregistre une référence en erreur fatale
    pub fn record_failure(&mut self, reference: &str, error: &AfeccionError, elapsed: Duration) {
        self.references_processed += 1;
        self.references_failed += 1;
        self.records.push(ReferenceRecord {
            reference: reference.to_string(),
            status: ReferenceStatus::Error,
            total_layers: 0,
            affected_layers: 0,
            unavailable_layers: 0,
            total_affected_area_m2: 0.0,
            dominant_impact: None,
            error: Some(error.to_string()),
            duration_secs: elapsed.as_secs_f64(),
        });
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let analyzed = self.references_processed - self.references_failed;
        self.status = if analyzed == 0 && self.references_processed > 0 {
            BatchStatus::Failed
        } else if self.references_failed > 0 || self.references_partial > 0 {
            BatchStatus::PartialSuccess
        } else {
            BatchStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("BATCH REPORT - Catalog {} ({})", self.catalog_version, self.catalog_fingerprint);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "References: {} processed, {} failed, {} partial",
            self.references_processed, self.references_failed, self.references_partial
        );

        println!("\n--- REFERENCES ---");
        for r in &self.records {
            match &r.error {
                Some(error) => println!("  {} ERROR {}", r.reference, error),
                None => println!(
                    "  {} {:?}: {}/{} layers, {:.2} m², impact {}",
                    r.reference,
                    r.status,
                    r.affected_layers,
                    r.total_layers,
                    r.total_affected_area_m2,
                    r.dominant_impact.map_or("-", |t| t.as_str())
                ),
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Résumé tabulaire, une ligne par référence
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Affichage compact
    pub fn summary(&self) -> String {
        format!(
            "{} references: {} analyzed, {} partial, {} errors",
            self.references_processed,
            self.references_processed - self.references_failed,
            self.references_partial,
            self.references_failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_default_status() {
        let mut report = BatchReport::new("2024.1", "abcd");
        report.finalize();
        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.references_processed, 0);
    }

    #[test]
    fn test_all_failed() {
        let mut report = BatchReport::new("2024.1", "abcd");
        report.record_failure(
            "0000000XX0000X",
            &AfeccionError::NotFound("0000000XX0000X".into()),
            Duration::from_millis(20),
        );
        report.finalize();

        assert_eq!(report.status, BatchStatus::Failed);
        assert_eq!(report.records[0].status, ReferenceStatus::Error);
        assert!(report.summary().contains("1 errors"));
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lote.json");
        let mut report = BatchReport::new("2024.1", "abcd");
        report.record_failure(
            "X",
            &AfeccionError::upstream("catastro", "HTTP 503"),
            Duration::ZERO,
        );
        report.finalize();
        report.save_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["references_failed"], 1);
        assert_eq!(value["records"][0]["status"], "Error");
    }

    #[test]
    fn test_save_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lote.csv");
        let mut report = BatchReport::new("2024.1", "abcd");
        report.record_failure(
            "0000000XX0000X",
            &AfeccionError::NotFound("0000000XX0000X".into()),
            Duration::ZERO,
        );
        report.record_failure(
            "1111111YY1111Y",
            &AfeccionError::upstream("catastro", "HTTP 503"),
            Duration::ZERO,
        );
        report.save_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("reference,status,total_layers,affected_layers"));
        assert!(lines[1].starts_with("0000000XX0000X,Error,0,0,0,0.0,,"));
        assert!(lines[2].contains("HTTP 503"));
    }
}
