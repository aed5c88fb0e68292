//! Réponse JSON d'une analyse (format de l'API historique)
//!
//! Les valeurs d'affichage (`"N/A"`, surfaces `"{:.2} m²"`, pourcentages
//! `"{:.2}%"`) ne sont appliquées qu'ici.

use serde::{Deserialize, Serialize};

use afecciones::{
    AfeccionError, ImpactTier, LayerCategory, LayerResult, LayerState, ParcelAnalysis,
};

/// Valeur affichée quand une surface n'est pas calculable
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordenadas {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resumen {
    pub total_capas: usize,
    pub capas_afectan: usize,
    pub superficie_total_afectada: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archivos_generados: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapaProcesada {
    pub nombre: String,
    pub estado: LayerState,
    pub superficie: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub porcentaje: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoria: Option<LayerCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impacto: Option<ImpactTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub png_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kml_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analisis {
    pub resumen: Resumen,
    pub capas_procesadas: Vec<CapaProcesada>,
}

/// Réponse complète, succès ou erreur fatale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: Status,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordenadas: Option<Coordenadas>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analisis: Option<Analisis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn from_analysis(analysis: &ParcelAnalysis) -> Self {
        let summary = &analysis.summary;
        Self {
            status: Status::Success,
            reference: analysis.reference.to_string(),
            coordenadas: summary.coordinates.map(|c| Coordenadas {
                lat: c.lat,
                lon: c.lon,
                srs: Some(c.srs.to_string()),
            }),
            analisis: Some(Analisis {
                resumen: Resumen {
                    total_capas: summary.total_layers,
                    capas_afectan: summary.affected_layers,
                    superficie_total_afectada: format_area(summary.total_affected_area_m2),
                    archivos_generados: Some(summary.generated_files),
                },
                capas_procesadas: analysis.layers.iter().map(capa_procesada).collect(),
            }),
            error: None,
        }
    }

    /// Erreur fatale: ni `analisis` ni `coordenadas`
    pub fn from_error(reference: &str, error: &AfeccionError) -> Self {
        Self {
            status: Status::Error,
            reference: reference.trim().to_string(),
            coordenadas: None,
            analisis: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

fn capa_procesada(result: &LayerResult) -> CapaProcesada {
    let superficie = match result.state {
        LayerState::Overlapped | LayerState::Downloaded => format_area(result.area_m2),
        LayerState::Generated | LayerState::Unavailable => NOT_AVAILABLE.to_string(),
    };
    CapaProcesada {
        nombre: result.name.clone(),
        estado: result.state,
        superficie,
        porcentaje: result.percentage.map(format_percentage),
        categoria: Some(result.category),
        impacto: result.impact,
        png_url: result.artifacts.png_url.clone(),
        kml_url: result.artifacts.kml_url.clone(),
        json_url: result.artifacts.json_url.clone(),
    }
}

pub fn format_area(m2: f64) -> String {
    format!("{:.2} m²", m2)
}

pub fn format_percentage(pct: f64) -> String {
    format!("{:.2}%", pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting() {
        assert_eq!(format_area(1234.5678), "1234.57 m²");
        assert_eq!(format_area(0.0), "0.00 m²");
        assert_eq!(format_percentage(100.0), "100.00%");
    }

    #[test]
    fn test_error_shape() {
        let err = AfeccionError::NotFound("9872023VH5797S".into());
        let value = serde_json::to_value(ApiResponse::from_error(" 9872023VH5797S ", &err)).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["status"], "error");
        assert_eq!(object["ref"], "9872023VH5797S");
        assert!(object["error"].as_str().unwrap().contains("not found"));
        assert!(!object.contains_key("analisis"));
        assert!(!object.contains_key("coordenadas"));
    }
}
