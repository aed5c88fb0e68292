//! Couches GeoJSON locales (`CAPAS_DIR`)
//!
//! Une couche pointe vers un fichier ou un répertoire; un répertoire est
//! parcouru récursivement (`*.geojson`, `*.json`). Le système de chaque fichier
//! est lu dans le membre `crs` (WGS84 par défaut). Le nom d'une entité vient
//! de la première propriété `nombre`, `name`, `NOMBRE` ou `NAME` renseignée.

use std::path::{Path, PathBuf};

use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Polygon, Rect};
use geojson::GeoJson;
use rayon::prelude::*;
use tracing::{debug, warn};

use afecciones::{AfeccionError, LayerRequest, Srs};

use crate::export::reproject::SmartReprojector;

/// Propriétés portant le nom d'une entité, par ordre de préférence
const NAME_PROPERTIES: [&str; 4] = ["nombre", "name", "NOMBRE", "NAME"];

/// Contenu d'un fichier GeoJSON
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub srs: Srs,
    pub features: LocalFeatures,
}

/// Polygones et nom de l'entité dont chacun provient (même ordre)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalFeatures {
    pub polygons: Vec<Polygon<f64>>,
    pub names: Vec<Option<String>>,
}

impl LocalFeatures {
    fn push(&mut self, polygon: Polygon<f64>, name: Option<&str>) {
        self.polygons.push(polygon);
        self.names.push(name.map(str::to_string));
    }

    fn extend(&mut self, other: LocalFeatures) {
        self.polygons.extend(other.polygons);
        self.names.extend(other.names);
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

/// Description d'une couche locale (commande `capas`)
#[derive(Debug, Clone)]
pub struct LocalLayerInfo {
    pub files: usize,
    pub polygons: usize,
    pub srs: Vec<Srs>,
    pub unreadable: usize,
}

#[derive(Debug, Clone)]
pub struct LocalLayerStore {
    root: PathBuf,
}

impl LocalLayerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fichiers GeoJSON d'une couche, triés
    pub fn files(&self, path: &Path) -> Result<Vec<PathBuf>, AfeccionError> {
        let full = self.root.join(path);
        if full.is_file() {
            return Ok(vec![full]);
        }
        if !full.is_dir() {
            return Err(AfeccionError::layer_unavailable(
                path.display().to_string(),
                format!("{} not found", full.display()),
            ));
        }

        let mut files = Vec::new();
        for ext in ["geojson", "json"] {
            let pattern = format!("{}/**/*.{}", full.display(), ext);
            let entries = glob::glob(&pattern).map_err(|e| {
                AfeccionError::layer_unavailable(path.display().to_string(), e.to_string())
            })?;
            files.extend(entries.filter_map(|entry| entry.ok()));
        }
        files.sort();
        Ok(files)
    }

    /// Polygones d'une couche qui recoupent l'emprise de la requête, dans son système
    pub fn query_blocking(
        &self,
        layer_id: &str,
        path: &Path,
        request: &LayerRequest,
    ) -> Result<LocalFeatures, AfeccionError> {
        let files = self.files(path).map_err(|e| relabel(layer_id, e))?;
        if files.is_empty() {
            return Err(AfeccionError::layer_unavailable(
                layer_id,
                format!("no GeoJSON files in {}", self.root.join(path).display()),
            ));
        }

        let loaded: Vec<Result<LocalFeatures, AfeccionError>> = files
            .par_iter()
            .map(|file| {
                let local = load_file(file)?;
                select_polygons(local, request)
            })
            .collect();

        let mut features = LocalFeatures::default();
        let mut failures = 0usize;
        for (file, result) in files.iter().zip(loaded) {
            match result {
                Ok(selected) => features.extend(selected),
                Err(e) => {
                    warn!(layer = layer_id, file = %file.display(), error = %e, "Skipping unreadable file");
                    failures += 1;
                }
            }
        }
        if failures == files.len() {
            return Err(AfeccionError::layer_unavailable(
                layer_id,
                "no readable GeoJSON file",
            ));
        }

        debug!(layer = layer_id, files = files.len(), polygons = features.len(), "Local layer loaded");
        Ok(features)
    }

    /// Version asynchrone (lecture et parsing sur le pool bloquant)
    pub async fn query(
        &self,
        layer_id: &str,
        path: &Path,
        request: &LayerRequest,
    ) -> Result<LocalFeatures, AfeccionError> {
        let store = self.clone();
        let layer_id_owned = layer_id.to_string();
        let path = path.to_path_buf();
        let request = request.clone();
        tokio::task::spawn_blocking(move || store.query_blocking(&layer_id_owned, &path, &request))
            .await
            .map_err(|e| AfeccionError::layer_unavailable(layer_id, e.to_string()))?
    }

    /// Inventaire d'une couche
    pub fn describe(&self, path: &Path) -> Result<LocalLayerInfo, AfeccionError> {
        let files = self.files(path)?;
        let loaded: Vec<_> = files.par_iter().map(|f| load_file(f)).collect();

        let mut info = LocalLayerInfo {
            files: files.len(),
            polygons: 0,
            srs: Vec::new(),
            unreadable: 0,
        };
        for result in loaded {
            match result {
                Ok(local) => {
                    info.polygons += local.features.len();
                    if !info.srs.contains(&local.srs) {
                        info.srs.push(local.srs);
                    }
                }
                Err(_) => info.unreadable += 1,
            }
        }
        Ok(info)
    }
}

fn relabel(layer_id: &str, e: AfeccionError) -> AfeccionError {
    match e {
        AfeccionError::LayerUnavailable { reason, .. } => {
            AfeccionError::layer_unavailable(layer_id, reason)
        }
        other => other,
    }
}

/// Lit un fichier GeoJSON (FeatureCollection, Feature ou Geometry)
pub fn load_file(path: &Path) -> Result<LocalFile, AfeccionError> {
    let text = std::fs::read_to_string(path)?;
    let document: GeoJson = text.parse().map_err(|e: geojson::Error| {
        AfeccionError::layer_unavailable(path.display().to_string(), e.to_string())
    })?;

    let srs = declared_srs(&document).unwrap_or(Srs::WGS84);
    let mut features = LocalFeatures::default();
    let mut push = |geometry: geojson::Geometry, name: Option<&str>| {
        if let Ok(g) = Geometry::<f64>::try_from(geometry.value) {
            let mut polygons = Vec::new();
            collect_polygons(g, &mut polygons);
            for polygon in polygons {
                features.push(polygon, name);
            }
        }
    };
    match document {
        GeoJson::FeatureCollection(fc) => {
            for feature in fc.features {
                let name = feature_name(&feature);
                if let Some(geometry) = feature.geometry {
                    push(geometry, name.as_deref());
                }
            }
        }
        GeoJson::Feature(feature) => {
            let name = feature_name(&feature);
            if let Some(geometry) = feature.geometry {
                push(geometry, name.as_deref());
            }
        }
        GeoJson::Geometry(g) => push(g, None),
    }

    Ok(LocalFile {
        path: path.to_path_buf(),
        srs,
        features,
    })
}

fn feature_name(feature: &geojson::Feature) -> Option<String> {
    NAME_PROPERTIES.iter().find_map(|key| {
        let value = feature.property(*key)?;
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// `crs.properties.name` (membre hérité de GeoJSON 2008)
fn declared_srs(geojson: &GeoJson) -> Option<Srs> {
    let members = match geojson {
        GeoJson::FeatureCollection(fc) => fc.foreign_members.as_ref(),
        GeoJson::Feature(f) => f.foreign_members.as_ref(),
        GeoJson::Geometry(g) => g.foreign_members.as_ref(),
    }?;
    let name = members.get("crs")?.get("properties")?.get("name")?.as_str()?;
    Srs::from_name(name)
}

fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p),
        Geometry::MultiPolygon(mp) => out.extend(mp.0),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// Filtre sur l'emprise dans le système du fichier, puis reprojette
fn select_polygons(
    local: LocalFile,
    request: &LayerRequest,
) -> Result<LocalFeatures, AfeccionError> {
    let window = SmartReprojector::new(request.srs, local.srs)?.transform_rect(request.bbox)?;
    let window = expand(window, 0.01);

    let (kept, names): (Vec<Polygon<f64>>, Vec<Option<String>>) = local
        .features
        .polygons
        .into_iter()
        .zip(local.features.names)
        .filter(|(p, _)| p.bounding_rect().map_or(false, |r| r.intersects(&window)))
        .unzip();

    let reprojector = SmartReprojector::new(local.srs, request.srs)?;
    Ok(LocalFeatures {
        polygons: reprojector.transform_multi_polygon(&MultiPolygon::new(kept))?.0,
        names,
    })
}

/// Élargit une emprise d'une fraction de sa taille
fn expand(rect: Rect<f64>, ratio: f64) -> Rect<f64> {
    let dx = rect.width() * ratio;
    let dy = rect.height() * ratio;
    Rect::new(
        (rect.min().x - dx, rect.min().y - dy),
        (rect.max().x + dx, rect.max().y + dy),
    )
}
