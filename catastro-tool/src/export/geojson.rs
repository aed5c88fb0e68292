//! Export GeoJSON des intersections avec geozero

use std::io::Write;

use geo::{Geometry, MultiPolygon};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use serde_json::json;

use afecciones::{AfeccionError, LayerResult, Srs};

use super::reproject::SmartReprojector;

/// FeatureCollection d'une intersection, en WGS84
///
/// Une seule feature: l'union des zones affectées, avec les attributs du
/// résultat de la couche.
pub fn intersection_geojson(
    reference: &str,
    result: &LayerResult,
    intersection: &MultiPolygon<f64>,
    srs: Srs,
) -> Result<Vec<u8>, AfeccionError> {
    let wgs84 = SmartReprojector::new(srs, Srs::WGS84)?.transform_multi_polygon(intersection)?;

    let properties = json!({
        "ref": reference,
        "capa": result.layer_id,
        "nombre": result.name,
        "categoria": result.category,
        "superficie_m2": round2(result.area_m2),
        "porcentaje": result.percentage.map(round2),
        "impacto": result.impact,
        "numero_elementos": result.feature_count,
        "nombres": result.feature_names,
    });

    let mut out = Vec::with_capacity(1024);
    write!(
        out,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        Srs::WGS84.epsg()
    )?;
    let id = serde_json::Value::from(format!("{}_{}", reference, result.layer_id));
    write!(out, r#"{{"type":"Feature","id":{},"geometry":"#, id)?;
    Geometry::MultiPolygon(wgs84)
        .process_geom(&mut GeoJsonWriter::new(&mut out))
        .map_err(|e| AfeccionError::Io(std::io::Error::other(e.to_string())))?;
    write!(out, r#","properties":"#)?;
    serde_json::to_writer(&mut out, &properties)
        .map_err(|e| AfeccionError::Io(std::io::Error::other(e)))?;
    write!(out, "}}]}}")?;

    Ok(out)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
