//! Projection Web Mercator (EPSG:3857)
//!
//! Utilisée par les services de tuiles et certains WMS.

use super::ellipsoid::WGS84;
use super::Geographic;

/// Convertit coordonnées géographiques vers Web Mercator (EPSG:3857)
pub fn geographic_to_web_mercator(geo: Geographic) -> (f64, f64) {
    // Web Mercator utilise un modèle sphérique avec le rayon équatorial
    let r = WGS84.a;

    // Limiter la latitude pour éviter l'infini
    let lat = geo.lat.clamp(-85.0_f64.to_radians(), 85.0_f64.to_radians());

    let x = r * geo.lon;
    let y = r * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();

    (x, y)
}

/// Convertit Web Mercator vers coordonnées géographiques
pub fn web_mercator_to_geographic(x: f64, y: f64) -> Geographic {
    let r = WGS84.a;
    let lon = x / r;
    let lat = 2.0 * (y / r).exp().atan() - std::f64::consts::FRAC_PI_2;

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_madrid_to_web_mercator() {
        // Madrid: -3.70°E, 40.42°N
        let geo = Geographic::from_degrees(-3.7038, 40.4168);
        let (x, y) = geographic_to_web_mercator(geo);

        // X ≈ -412300, Y ≈ 4926700
        assert!((x - (-412300.0)).abs() < 1000.0, "x={}", x);
        assert!((y - 4926700.0).abs() < 5000.0, "y={}", y);
    }

    #[test]
    fn test_roundtrip() {
        let geo = Geographic::from_degrees(-3.7038, 40.4168);
        let (x, y) = geographic_to_web_mercator(geo);
        let (lon, lat) = web_mercator_to_geographic(x, y).to_degrees();

        assert!((lon - (-3.7038)).abs() < 0.0001, "lon={}", lon);
        assert!((lat - 40.4168).abs() < 0.0001, "lat={}", lat);
    }
}
