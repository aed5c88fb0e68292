//! Reprojection légère en Rust pur (sans dépendances externes)
//!
//! Supporte les systèmes utilisés par le Catastro et les services IDE espagnols :
//! - Géographiques : WGS84 (EPSG:4326), ETRS89 (EPSG:4258)
//! - UTM ETRS89 (EPSG:25828 à 25838) et UTM WGS84 (EPSG:326xx / 327xx)
//! - Web Mercator (EPSG:3857)
//!
//! La précision (formules en série, GRS80 ≈ WGS84) suffit au calcul de surfaces
//! de parcelles et à l'affichage, pas à un usage géodésique.

mod ellipsoid;
mod mercator;
mod utm;

pub use ellipsoid::{Ellipsoid, GRS80, WGS84};
pub use utm::zone_for_longitude;

use geo::{Area, Centroid, Coord, MapCoords, MultiPolygon, Point};

use crate::types::Srs;
use crate::AfeccionError;

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Reprojection légère entre les systèmes supportés
#[derive(Debug, Clone, Copy)]
pub struct ReprojectorLite {
    source: Srs,
    target: Srs,
}

impl ReprojectorLite {
    /// Crée un nouveau reprojector
    pub fn new(source: Srs, target: Srs) -> Result<Self, AfeccionError> {
        for srs in [source, target] {
            if !Self::is_supported(srs) {
                return Err(AfeccionError::Projection(format!(
                    "{} non supporté. Supportés: 4326, 4258, 3857, 25828-25838, 326xx, 327xx",
                    srs
                )));
            }
        }

        Ok(Self { source, target })
    }

    /// Vérifie si le système est supporté
    pub fn is_supported(srs: Srs) -> bool {
        srs.is_geographic() || srs.is_projected()
    }

    pub fn source(&self) -> Srs {
        self.source
    }

    pub fn target(&self) -> Srs {
        self.target
    }

    /// Transforme un point (x, y) de la source vers la cible
    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        if self.source == self.target {
            return (x, y);
        }
        // Étape 1: Source → Géographique
        let geo = to_geographic(self.source, x, y);
        // Étape 2: Géographique → Cible
        from_geographic(self.target, geo)
    }

    /// Transforme n'importe quelle géométrie `geo`
    pub fn transform<G>(&self, geom: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geom.map_coords(|c: Coord<f64>| {
            let (x, y) = self.transform_point(c.x, c.y);
            Coord { x, y }
        })
    }
}

/// Ellipsoïde associé à une projection UTM
fn utm_ellipsoid(srs: Srs) -> &'static Ellipsoid {
    if (25828..=25838).contains(&srs.epsg()) {
        &GRS80
    } else {
        &WGS84
    }
}

fn to_geographic(srs: Srs, x: f64, y: f64) -> Geographic {
    if srs == Srs::WEB_MERCATOR {
        return mercator::web_mercator_to_geographic(x, y);
    }
    match srs.utm_zone() {
        Some((zone, south)) => utm::utm_to_geographic(x, y, zone, south, utm_ellipsoid(srs)),
        None => Geographic::from_degrees(x, y),
    }
}

fn from_geographic(srs: Srs, geo: Geographic) -> (f64, f64) {
    if srs == Srs::WEB_MERCATOR {
        return mercator::geographic_to_web_mercator(geo);
    }
    match srs.utm_zone() {
        Some((zone, south)) => utm::geographic_to_utm(geo, zone, south, utm_ellipsoid(srs)),
        None => geo.to_degrees(),
    }
}

/// Convertit un point en (longitude, latitude) WGS84
pub fn to_wgs84(point: Point<f64>, srs: Srs) -> Result<(f64, f64), AfeccionError> {
    let reprojector = ReprojectorLite::new(srs, Srs::WGS84)?;
    Ok(reprojector.transform_point(point.x(), point.y()))
}

/// Système métrique adapté au calcul de surface d'une géométrie
///
/// Les UTM sont conservés, les autres systèmes sont ramenés à la zone UTM WGS84
/// contenant le centroïde.
pub fn metric_srs_for(srs: Srs, centroid: Point<f64>) -> Result<Srs, AfeccionError> {
    if srs.utm_zone().is_some() {
        return Ok(srs);
    }
    let (lon, lat) = to_wgs84(centroid, srs)?;
    let zone = zone_for_longitude(lon);
    Ok(if lat < 0.0 {
        Srs(32700 + zone)
    } else {
        Srs(32600 + zone)
    })
}

/// Surface en m² d'un multipolygone exprimé dans `srs`
pub fn area_m2(polygons: &MultiPolygon<f64>, srs: Srs) -> Result<f64, AfeccionError> {
    let Some(centroid) = polygons.centroid() else {
        return Ok(0.0);
    };
    let metric = metric_srs_for(srs, centroid)?;
    if metric == srs {
        return Ok(polygons.unsigned_area());
    }
    let reprojector = ReprojectorLite::new(srs, metric)?;
    Ok(reprojector.transform(polygons).unsigned_area())
}
