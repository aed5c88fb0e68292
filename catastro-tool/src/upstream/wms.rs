//! Couches raster servies en WMS: image PNG autour de la parcelle
//!
//! Une image WMS ne permet pas de calcul d'intersection; la couche est
//! rapportée comme `Generada` avec l'URL de l'image.

use geo::Rect;
use tracing::debug;

use afecciones::{AfeccionError, Artifacts, LayerRequest, Srs};

use super::retry::{send_bytes, RetryPolicy};
use crate::export::reproject::SmartReprojector;
use crate::export::{ArtifactDir, OutputLayout};

/// En dessous, l'image est considérée vide ou en erreur
const MIN_IMAGE_BYTES: usize = 1000;
/// Taille de l'image demandée, en pixels
const IMAGE_SIZE: u32 = 1600;
/// Marge autour de la parcelle, en mètres
pub const DEFAULT_BUFFER_M: f64 = 200.0;

#[derive(Clone)]
pub struct WmsClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    layout: OutputLayout,
    buffer_m: f64,
}

impl WmsClient {
    pub fn new(client: reqwest::Client, retry: RetryPolicy, layout: OutputLayout) -> Self {
        Self {
            client,
            retry,
            layout,
            buffer_m: DEFAULT_BUFFER_M,
        }
    }

    pub fn with_buffer(mut self, buffer_m: f64) -> Self {
        self.buffer_m = buffer_m;
        self
    }

    /// `GetMap` puis enregistrement dans `imagenes/<ref>_<couche>.png`
    pub async fn fetch_image(
        &self,
        layer_id: &str,
        url: &str,
        layers: &str,
        request: &LayerRequest,
    ) -> Result<Artifacts, AfeccionError> {
        let wgs84 = SmartReprojector::new(request.srs, Srs::WGS84)?.transform_rect(request.bbox)?;
        let bbox = buffered_bbox(wgs84, self.buffer_m);
        let bbox_param = format!(
            "{},{},{},{}",
            bbox.min().x,
            bbox.min().y,
            bbox.max().x,
            bbox.max().y
        );
        let fetched = send_bytes(layer_id, &self.retry, || {
            self.client.get(url).query(&get_map_params(layers, &bbox_param))
        })
        .await
        .map_err(|e| AfeccionError::layer_unavailable(layer_id, e.to_string()))?;

        if !fetched.status.is_success() {
            return Err(AfeccionError::layer_unavailable(
                layer_id,
                format!("HTTP {}", fetched.status),
            ));
        }
        if fetched.body.len() <= MIN_IMAGE_BYTES {
            return Err(AfeccionError::layer_unavailable(
                layer_id,
                format!("image too small ({} bytes)", fetched.body.len()),
            ));
        }

        let reference = request.reference.as_str();
        let file_name = OutputLayout::file_name(reference, layer_id, "png");
        let path = self.layout.path(reference, ArtifactDir::Images, &file_name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &fetched.body).await?;
        debug!(layer = layer_id, path = %path.display(), bytes = fetched.body.len(), "WMS image saved");

        Ok(Artifacts {
            png_url: Some(self.layout.url(reference, ArtifactDir::Images, &file_name)),
            ..Default::default()
        })
    }
}

/// Paramètres `GetMap` (image carrée de `IMAGE_SIZE` pixels)
fn get_map_params(layers: &str, bbox: &str) -> Vec<(&'static str, String)> {
    let size = IMAGE_SIZE.to_string();
    vec![
        ("SERVICE", "WMS".into()),
        ("VERSION", "1.1.1".into()),
        ("REQUEST", "GetMap".into()),
        ("LAYERS", layers.into()),
        ("STYLES", String::new()),
        ("SRS", "EPSG:4326".into()),
        ("BBOX", bbox.into()),
        ("WIDTH", size.clone()),
        ("HEIGHT", size),
        ("FORMAT", "image/png".into()),
        ("TRANSPARENT", "TRUE".into()),
    ]
}

/// Élargit une emprise WGS84 d'une marge en mètres (approximation espagnole:
/// 85 km par degré de longitude, 111 km par degré de latitude)
fn buffered_bbox(rect: Rect<f64>, buffer_m: f64) -> Rect<f64> {
    let dx = buffer_m / 85_000.0;
    let dy = buffer_m / 111_000.0;
    Rect::new(
        (rect.min().x - dx, rect.min().y - dy),
        (rect.max().x + dx, rect.max().y + dy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_map_image_size() {
        let params = get_map_params("Catastro", "-3.71,40.41,-3.70,40.42");
        let value = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(value("WIDTH"), Some("1600"));
        assert_eq!(value("HEIGHT"), Some("1600"));
        assert_eq!(value("BBOX"), Some("-3.71,40.41,-3.70,40.42"));
        assert_eq!(value("LAYERS"), Some("Catastro"));
    }

    #[test]
    fn test_buffered_bbox_around_point() {
        let rect = Rect::new((-3.7, 40.4), (-3.7, 40.4));
        let b = buffered_bbox(rect, DEFAULT_BUFFER_M);
        assert!((b.width() - 2.0 * 200.0 / 85_000.0).abs() < 1e-12);
        assert!((b.height() - 2.0 * 200.0 / 111_000.0).abs() < 1e-12);
        assert!((b.center().x + 3.7).abs() < 1e-12);
    }
}
