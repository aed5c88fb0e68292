//! Fichiers produits par une analyse
//!
//! Arborescence: `<output>/<ref>/{imagenes,geometrias,informes,datos}`, servie
//! sous `/outputs/<ref>/...`.

pub mod archive;
pub mod geojson;
pub mod kml;
pub mod reproject;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use afecciones::{AfeccionError, ArtifactSink, Artifacts, LayerResult, ParcelGeometry, ParcelReference};

pub use archive::bundle_reference;
pub use reproject::SmartReprojector;

/// Sous-répertoire d'une référence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDir {
    Images,
    Geometries,
    Reports,
    Data,
}

impl ArtifactDir {
    pub const ALL: [ArtifactDir; 4] = [Self::Images, Self::Geometries, Self::Reports, Self::Data];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Images => "imagenes",
            Self::Geometries => "geometrias",
            Self::Reports => "informes",
            Self::Data => "datos",
        }
    }
}

/// Emplacements et URLs des fichiers d'une analyse
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    url_prefix: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url_prefix: "/outputs".into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference_dir(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    pub fn path(&self, reference: &str, dir: ArtifactDir, file_name: &str) -> PathBuf {
        self.reference_dir(reference).join(dir.as_str()).join(file_name)
    }

    pub fn url(&self, reference: &str, dir: ArtifactDir, file_name: &str) -> String {
        format!("{}/{}/{}/{}", self.url_prefix, reference, dir.as_str(), file_name)
    }

    /// `<ref>_<couche>.<ext>`, caractères hors `[A-Za-z0-9_-]` remplacés par `_`
    pub fn file_name(reference: &str, layer_id: &str, ext: &str) -> String {
        let layer: String = layer_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}_{}.{}", reference, layer, ext)
    }

    /// Références déjà analysées (sous-répertoires de la racine), triées
    ///
    /// Une racine absente donne une liste vide.
    pub fn analysed_references(&self) -> std::io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut references = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                references.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        references.sort();
        Ok(references)
    }

    /// Crée l'arborescence d'une référence
    pub fn create_dirs(&self, reference: &str) -> std::io::Result<()> {
        for dir in ArtifactDir::ALL {
            std::fs::create_dir_all(self.reference_dir(reference).join(dir.as_str()))?;
        }
        Ok(())
    }
}

async fn write_file(path: &Path, content: &[u8]) -> Result<(), AfeccionError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    debug!(path = %path.display(), bytes = content.len(), "File written");
    Ok(())
}

/// KML et GeoJSON de chaque intersection
#[derive(Debug, Clone)]
pub struct FileSink {
    layout: OutputLayout,
}

impl FileSink {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn layer_artifacts(
        &self,
        reference: &ParcelReference,
        parcel: &ParcelGeometry,
        result: &LayerResult,
    ) -> Result<Artifacts, AfeccionError> {
        let Some(intersection) = result.intersection.as_ref().filter(|mp| !mp.0.is_empty()) else {
            return Ok(Artifacts::default());
        };
        let reference = reference.as_str();

        let kml = kml::affection_kml(reference, &result.name, parcel, intersection)?;
        let kml_name = OutputLayout::file_name(reference, &result.layer_id, "kml");
        write_file(
            &self.layout.path(reference, ArtifactDir::Geometries, &kml_name),
            kml.as_bytes(),
        )
        .await?;

        let json = geojson::intersection_geojson(reference, result, intersection, parcel.srs)?;
        let json_name = OutputLayout::file_name(reference, &result.layer_id, "json");
        write_file(
            &self.layout.path(reference, ArtifactDir::Data, &json_name),
            &json,
        )
        .await?;

        Ok(Artifacts {
            png_url: None,
            kml_url: Some(self.layout.url(reference, ArtifactDir::Geometries, &kml_name)),
            json_url: Some(self.layout.url(reference, ArtifactDir::Data, &json_name)),
        })
    }
}

/// `geometrias/<ref>_parcela.kml`
pub async fn write_parcel_kml(
    layout: &OutputLayout,
    reference: &str,
    parcel: &ParcelGeometry,
) -> Result<PathBuf, AfeccionError> {
    let content = kml::parcel_kml(reference, parcel)?;
    let path = layout.path(reference, ArtifactDir::Geometries, &format!("{}_parcela.kml", reference));
    write_file(&path, content.as_bytes()).await?;
    Ok(path)
}

/// `datos/<ref>_analisis.json`
pub async fn write_analysis_json<T: Serialize>(
    layout: &OutputLayout,
    reference: &str,
    response: &T,
) -> Result<PathBuf, AfeccionError> {
    let content = serde_json::to_vec_pretty(response)
        .map_err(|e| AfeccionError::Io(std::io::Error::other(e)))?;
    let path = layout.path(reference, ArtifactDir::Data, &format!("{}_analisis.json", reference));
    write_file(&path, &content).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use afecciones::{ImpactTier, LayerCategory, LayerState, Srs};
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_layout_paths_and_urls() {
        let layout = OutputLayout::new("/srv/outputs");
        assert_eq!(
            layout.path("REF", ArtifactDir::Images, "REF_catastro.png"),
            PathBuf::from("/srv/outputs/REF/imagenes/REF_catastro.png")
        );
        assert_eq!(
            layout.url("REF", ArtifactDir::Data, "REF_rn.json"),
            "/outputs/REF/datos/REF_rn.json"
        );
        assert_eq!(OutputLayout::file_name("REF", "red natura/2000", "kml"), "REF_red_natura_2000.kml");
    }

    #[test]
    fn test_analysed_references() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("outputs"));
        assert!(layout.analysed_references().unwrap().is_empty());

        layout.create_dirs("9872023VH5797S").unwrap();
        layout.create_dirs("0000000XX0000X").unwrap();
        std::fs::write(dir.path().join("outputs/informe_lote.json"), "{}").unwrap();
        assert_eq!(
            layout.analysed_references().unwrap(),
            vec!["0000000XX0000X", "9872023VH5797S"]
        );
    }

    #[tokio::test]
    async fn test_file_sink_writes_kml_and_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(OutputLayout::new(dir.path()));
        let square = MultiPolygon::new(vec![polygon![
            (x: 440000.0, y: 4474000.0),
            (x: 440050.0, y: 4474000.0),
            (x: 440050.0, y: 4474050.0),
            (x: 440000.0, y: 4474050.0),
        ]]);
        let parcel = ParcelGeometry::area(square.clone(), Srs::ETRS89_UTM30N);
        let reference = ParcelReference::parse("9872023VH5797S").unwrap();
        let result = LayerResult {
            layer_id: "dph".into(),
            name: "Dominio Público Hidráulico".into(),
            category: LayerCategory::Environmental,
            state: LayerState::Overlapped,
            area_m2: 2500.0,
            percentage: Some(100.0),
            impact: Some(ImpactTier::High),
            artifacts: Artifacts::default(),
            feature_count: 0,
            feature_names: Vec::new(),
            reason: None,
            intersection: Some(square),
        };

        let artifacts = sink.layer_artifacts(&reference, &parcel, &result).await.unwrap();
        assert_eq!(artifacts.kml_url.as_deref(), Some("/outputs/9872023VH5797S/geometrias/9872023VH5797S_dph.kml"));
        assert_eq!(artifacts.json_url.as_deref(), Some("/outputs/9872023VH5797S/datos/9872023VH5797S_dph.json"));
        assert!(dir.path().join("9872023VH5797S/geometrias/9872023VH5797S_dph.kml").is_file());
        assert!(dir.path().join("9872023VH5797S/datos/9872023VH5797S_dph.json").is_file());
    }

    #[tokio::test]
    async fn test_file_sink_skips_without_intersection() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(OutputLayout::new(dir.path()));
        let parcel = ParcelGeometry::point(geo::Point::new(-3.7, 40.4), Srs::WGS84);
        let reference = ParcelReference::parse("9872023VH5797S").unwrap();
        let result = LayerResult {
            layer_id: "dph".into(),
            name: "DPH".into(),
            category: LayerCategory::Environmental,
            state: LayerState::Overlapped,
            area_m2: 0.0,
            percentage: Some(100.0),
            impact: Some(ImpactTier::High),
            artifacts: Artifacts::default(),
            feature_count: 0,
            feature_names: Vec::new(),
            reason: None,
            intersection: None,
        };
        let artifacts = sink.layer_artifacts(&reference, &parcel, &result).await.unwrap();
        assert_eq!(artifacts.count(), 0);
    }
}
