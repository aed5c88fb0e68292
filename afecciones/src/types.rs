//! Types de données pour le crate afecciones

use std::fmt;
use std::sync::LazyLock;

use geo::{BoundingRect, Centroid, MultiPolygon, Point, Rect};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::AfeccionError;

/// Référence catastrale: 14 caractères (parcelle) ou 20 (bien immobilier)
static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Z]{14}(?:[0-9A-Z]{6})?$").expect("valid regex"));

/// Référence cadastrale normalisée (sans espaces, en majuscules)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParcelReference(String);

impl ParcelReference {
    /// Valide et normalise une référence saisie par l'utilisateur
    pub fn parse(raw: &str) -> Result<Self, AfeccionError> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        if normalized.is_empty() {
            return Err(AfeccionError::invalid_reference(raw, "empty reference"));
        }

        if !REFERENCE_PATTERN.is_match(&normalized) {
            return Err(AfeccionError::invalid_reference(
                raw,
                "expected 14 or 20 alphanumeric characters",
            ));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Référence de la parcelle (14 premiers caractères)
    pub fn parcel_part(&self) -> &str {
        &self.0[..14]
    }
}

impl fmt::Display for ParcelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Découpe une liste de références (fichier de lot)
///
/// Les références peuvent être séparées par des virgules, des espaces ou des
/// retours à la ligne. Les fragments de 10 caractères ou moins sont ignorés.
pub fn parse_reference_list(content: &str) -> Vec<String> {
    content
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| s.len() > 10)
        .map(str::to_string)
        .collect()
}

/// Système de référence spatial (code EPSG)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Srs(pub u32);

impl Srs {
    pub const WGS84: Srs = Srs(4326);
    pub const ETRS89: Srs = Srs(4258);
    pub const WEB_MERCATOR: Srs = Srs(3857);
    /// ETRS89 / UTM 30N, projection native du Catastro en péninsule
    pub const ETRS89_UTM30N: Srs = Srs(25830);

    pub fn epsg(self) -> u32 {
        self.0
    }

    /// Coordonnées en degrés (longitude, latitude)
    pub fn is_geographic(self) -> bool {
        matches!(self.0, 4326 | 4258)
    }

    /// Zone UTM `(zone, hémisphère sud)` pour les projections ETRS89 et WGS84
    pub fn utm_zone(self) -> Option<(u32, bool)> {
        match self.0 {
            25828..=25838 => Some((self.0 - 25800, false)),
            32601..=32660 => Some((self.0 - 32600, false)),
            32701..=32760 => Some((self.0 - 32700, true)),
            _ => None,
        }
    }

    /// Coordonnées métriques planes (UTM ou Web Mercator)
    pub fn is_projected(self) -> bool {
        self.utm_zone().is_some() || self == Self::WEB_MERCATOR
    }

    /// Identifiant EPSG depuis les différentes formes de `srsName`
    ///
    /// Formes acceptées: `EPSG:25830`, `urn:ogc:def:crs:EPSG::25830`,
    /// `http://www.opengis.net/def/crs/EPSG/0/25830`, `25830`.
    pub fn from_name(name: &str) -> Option<Srs> {
        let digits: String = name
            .trim()
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if digits.is_empty() {
            return None;
        }
        let upper = name.to_uppercase();
        if digits.len() != name.trim().len() && !upper.contains("EPSG") {
            return None;
        }
        digits.parse().ok().map(Srs)
    }
}

impl Default for Srs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Forme de la parcelle telle que résolue par le service cadastral
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Emprise surfacique (un ou plusieurs polygones)
    Area(MultiPolygon<f64>),
    /// Point seul (centroïde fourni par le service)
    Point(Point<f64>),
}

/// Géométrie d'une parcelle avec son système de référence
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelGeometry {
    pub shape: Shape,
    pub srs: Srs,
}

impl ParcelGeometry {
    pub fn area(polygons: MultiPolygon<f64>, srs: Srs) -> Self {
        Self {
            shape: Shape::Area(polygons),
            srs,
        }
    }

    pub fn point(point: Point<f64>, srs: Srs) -> Self {
        Self {
            shape: Shape::Point(point),
            srs,
        }
    }

    /// Emprise dans le système de la parcelle
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match &self.shape {
            Shape::Area(mp) => mp.bounding_rect(),
            Shape::Point(p) => Some(p.bounding_rect()),
        }
    }

    /// Centroïde dans le système de la parcelle
    pub fn centroid(&self) -> Option<Point<f64>> {
        match &self.shape {
            Shape::Area(mp) => mp.centroid(),
            Shape::Point(p) => Some(*p),
        }
    }
}

/// Catégorie d'une couche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerCategory {
    #[serde(rename = "urbanismo")]
    Urban,
    #[serde(rename = "ambiental")]
    Environmental,
    #[serde(rename = "infraestructuras")]
    Infrastructure,
    #[serde(rename = "otros")]
    Other,
}

impl LayerCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urban => "urbanismo",
            Self::Environmental => "ambiental",
            Self::Infrastructure => "infraestructuras",
            Self::Other => "otros",
        }
    }
}

/// Niveau d'impact d'une affectation
///
/// L'ordre des variantes est significatif (`Low < Medium < High`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImpactTier {
    #[serde(rename = "Bajo")]
    Low,
    #[serde(rename = "Medio")]
    Medium,
    #[serde(rename = "Alto")]
    High,
}

impl ImpactTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Bajo",
            Self::Medium => "Medio",
            Self::High => "Alto",
        }
    }
}

/// État d'une couche à l'issue de l'analyse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerState {
    /// Intersection de surface non nulle avec la parcelle
    #[serde(rename = "Solapado")]
    Overlapped,
    /// Données récupérées, aucune intersection
    #[serde(rename = "Descargada")]
    Downloaded,
    /// Couche raster produite, intersection non quantifiable
    #[serde(rename = "Generada")]
    Generated,
    /// Récupération impossible (erreur ou délai dépassé)
    #[serde(rename = "Unavailable")]
    Unavailable,
}

impl LayerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overlapped => "Solapado",
            Self::Downloaded => "Descargada",
            Self::Generated => "Generada",
            Self::Unavailable => "Unavailable",
        }
    }
}

/// Fichiers produits pour une couche (URLs relatives servies par l'API)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub png_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kml_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_url: Option<String>,
}

impl Artifacts {
    pub fn count(&self) -> usize {
        [&self.png_url, &self.kml_url, &self.json_url]
            .iter()
            .filter(|u| u.is_some())
            .count()
    }

    /// Complète les champs absents avec ceux de `other`
    pub fn merge(mut self, other: Artifacts) -> Artifacts {
        self.png_url = self.png_url.or(other.png_url);
        self.kml_url = self.kml_url.or(other.kml_url);
        self.json_url = self.json_url.or(other.json_url);
        self
    }
}

/// Résultat de l'analyse d'une couche pour une parcelle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerResult {
    pub layer_id: String,
    pub name: String,
    pub category: LayerCategory,
    pub state: LayerState,
    /// Surface affectée en m² (0 hors `Overlapped`)
    pub area_m2: f64,
    /// Pourcentage de la parcelle affecté, dans [0, 100]
    pub percentage: Option<f64>,
    /// Niveau d'impact (uniquement pour `Overlapped`)
    pub impact: Option<ImpactTier>,
    pub artifacts: Artifacts,
    /// Nombre d'entités de la couche qui touchent la parcelle
    pub feature_count: usize,
    /// Noms de ces entités (propriétés `nombre`/`name`), sans doublons
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feature_names: Vec<String>,
    /// Cause de l'indisponibilité
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Géométrie de l'intersection, dans le système de la parcelle
    #[serde(skip)]
    pub intersection: Option<MultiPolygon<f64>>,
}

impl LayerResult {
    pub fn is_overlapped(&self) -> bool {
        self.state == LayerState::Overlapped
    }
}

/// Coordonnées du centroïde de la parcelle
///
/// En WGS84 quand le système de la parcelle est projetable, sinon dans ce
/// système (`lon` = x, `lat` = y). `srs` indique toujours le système des valeurs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
    pub srs: Srs,
}

/// Résumé des affectations d'une parcelle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub reference: ParcelReference,
    pub total_layers: usize,
    pub affected_layers: usize,
    pub total_affected_area_m2: f64,
    /// Surface de la parcelle (absente pour une géométrie ponctuelle)
    pub parcel_area_m2: Option<f64>,
    /// Absentes seulement pour une géométrie vide
    pub coordinates: Option<Coordinates>,
    pub dominant_impact: ImpactTier,
    pub generated_files: usize,
}
