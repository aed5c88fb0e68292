//! Agrégation des résultats par couche en résumé de parcelle

use crate::policy::ImpactPolicy;
use crate::projection;
use crate::types::{
    AnalysisSummary, Coordinates, LayerResult, ParcelGeometry, ParcelReference, Shape, Srs,
};

/// Construit le résumé d'une parcelle
///
/// Fonction pure: même entrée, même résumé. `affected_layers` compte les
/// couches `Overlapped` et `total_affected_area_m2` somme leurs surfaces;
/// les couches `Generated` (raster) n'y contribuent pas.
pub fn summarize(
    reference: &ParcelReference,
    geometry: &ParcelGeometry,
    results: &[LayerResult],
    policy: &ImpactPolicy,
) -> AnalysisSummary {
    let overlapped = results.iter().filter(|r| r.is_overlapped());

    let (affected_layers, total_affected_area_m2) = overlapped
        .fold((0usize, 0.0f64), |(count, area), r| (count + 1, area + r.area_m2));

    let parcel_area_m2 = match &geometry.shape {
        Shape::Area(polygons) => projection::area_m2(polygons, geometry.srs).ok(),
        Shape::Point(_) => None,
    };

    let coordinates = geometry.centroid().map(|centroid| {
        match projection::to_wgs84(centroid, geometry.srs) {
            Ok((lon, lat)) => Coordinates {
                lat,
                lon,
                srs: Srs::WGS84,
            },
            Err(_) => Coordinates {
                lat: centroid.y(),
                lon: centroid.x(),
                srs: geometry.srs,
            },
        }
    });

    AnalysisSummary {
        reference: reference.clone(),
        total_layers: results.len(),
        affected_layers,
        total_affected_area_m2,
        parcel_area_m2,
        coordinates,
        dominant_impact: policy.dominant(results),
        generated_files: results.iter().map(|r| r.artifacts.count()).sum(),
    }
}
