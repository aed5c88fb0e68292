//! Couches vectorielles servies en WFS
//!
//! L'emprise est envoyée en WGS84 (`EPSG:4326`, ordre lon/lat), la réponse GML3
//! est reprojetée dans le système de la parcelle.

use geo::MultiPolygon;
use tracing::debug;

use afecciones::{gml, AfeccionError, LayerRequest, Srs};

use super::retry::{send_bytes, RetryPolicy};
use crate::export::reproject::SmartReprojector;

/// Une réponse exploitable dépasse strictement cette taille
const MIN_RESPONSE_BYTES: usize = 500;

#[derive(Clone)]
pub struct WfsClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl WfsClient {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// `GetFeature` sur l'emprise de la requête
    pub async fn fetch_polygons(
        &self,
        layer_id: &str,
        url: &str,
        type_name: &str,
        request: &LayerRequest,
    ) -> Result<MultiPolygon<f64>, AfeccionError> {
        let bbox = SmartReprojector::new(request.srs, Srs::WGS84)?.transform_rect(request.bbox)?;
        let bbox_param = format!(
            "{},{},{},{},EPSG:4326",
            bbox.min().x,
            bbox.min().y,
            bbox.max().x,
            bbox.max().y
        );

        let fetched = send_bytes(layer_id, &self.retry, || {
            self.client.get(url).query(&[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("typeName", type_name),
                ("bbox", bbox_param.as_str()),
                ("srsName", "EPSG:4326"),
                ("outputFormat", "GML3"),
            ])
        })
        .await
        .map_err(|e| AfeccionError::layer_unavailable(layer_id, e.to_string()))?;

        if !fetched.status.is_success() {
            return Err(AfeccionError::layer_unavailable(
                layer_id,
                format!("HTTP {}", fetched.status),
            ));
        }
        debug!(layer = layer_id, bytes = fetched.body.len(), "WFS response");

        let doc = accept_response(layer_id, &fetched.body)?;
        let source_srs = doc.srs.unwrap_or(Srs::WGS84);
        SmartReprojector::new(source_srs, request.srs)?.transform_multi_polygon(&doc.multi_polygon())
    }
}

/// Rejette les réponses trop courtes et les rapports d'exception
fn accept_response(layer_id: &str, body: &[u8]) -> Result<gml::GmlDocument, AfeccionError> {
    if body.len() <= MIN_RESPONSE_BYTES {
        return Err(AfeccionError::layer_unavailable(
            layer_id,
            format!("response too short ({} bytes)", body.len()),
        ));
    }
    let doc = gml::parse(body)
        .map_err(|e| AfeccionError::layer_unavailable(layer_id, e.to_string()))?;
    if let Some(message) = doc.exception.as_deref() {
        return Err(AfeccionError::layer_unavailable(
            layer_id,
            format!("service exception: {}", message),
        ));
    }
    Ok(doc)
}
