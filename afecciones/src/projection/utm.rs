//! Projection UTM (Universal Transverse Mercator)
//!
//! Zones utilisées en Espagne:
//! - Zone 28N (EPSG:25828 / 32628) - Canaries
//! - Zone 29N (EPSG:25829 / 32629) - Galice
//! - Zone 30N (EPSG:25830 / 32630) - Péninsule (projection du Catastro)
//! - Zone 31N (EPSG:25831 / 32631) - Catalogne, Baléares

use super::ellipsoid::Ellipsoid;
use super::Geographic;

/// Facteur d'échelle
const K0: f64 = 0.9996;
/// False easting
const X0: f64 = 500000.0;
/// False northing (hémisphère sud)
const Y0_SOUTH: f64 = 10000000.0;

/// Longitude centrale de la zone (radians)
fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Zone UTM contenant une longitude (degrés)
pub fn zone_for_longitude(lon_deg: f64) -> u32 {
    let zone = ((lon_deg + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u32
}

/// Longueur de l'arc de méridien depuis l'équateur
fn meridian_arc(phi: f64, ell: &Ellipsoid) -> f64 {
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    ell.a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Convertit des coordonnées géographiques vers UTM
pub fn geographic_to_utm(geo: Geographic, zone: u32, south: bool, ell: &Ellipsoid) -> (f64, f64) {
    let e2 = ell.e2();
    let ep2 = ell.ep2();

    let phi = geo.lat;
    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = ell.a / (1.0 - e2 * sin_phi.powi(2)).sqrt();
    let t = tan_phi.powi(2);
    let c = ep2 * cos_phi.powi(2);
    let a = cos_phi * (geo.lon - central_meridian(zone));
    let m = meridian_arc(phi, ell);

    let x = K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t.powi(2) + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + X0;

    let mut y = K0
        * (m + n
            * tan_phi
            * (a.powi(2) / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c.powi(2)) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t.powi(2) + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if south {
        y += Y0_SOUTH;
    }

    (x, y)
}

/// Convertit UTM vers coordonnées géographiques
pub fn utm_to_geographic(x: f64, y: f64, zone: u32, south: bool, ell: &Ellipsoid) -> Geographic {
    let a = ell.a;
    let e2 = ell.e2();
    let ep2 = ell.ep2();

    let y0 = if south { Y0_SOUTH } else { 0.0 };
    let lon0 = central_meridian(zone);

    // Coordonnées réduites
    let x = x - X0;
    let y = y - y0;

    // Calcul du footprint latitude
    let m = y / K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let n1 = a / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = tan_phi1.powi(2);
    let c1 = ep2 * cos_phi1.powi(2);
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2)
                    - 252.0 * ep2
                    - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::super::ellipsoid::GRS80;
    use super::*;

    #[test]
    fn test_madrid_forward() {
        // Puerta del Sol: -3.7038°E, 40.4168°N → ETRS89 UTM 30N ≈ (440 300, 4 474 250)
        let (x, y) = geographic_to_utm(Geographic::from_degrees(-3.7038, 40.4168), 30, false, &GRS80);
        assert!((x - 440300.0).abs() < 300.0, "x={}", x);
        assert!((y - 4474250.0).abs() < 300.0, "y={}", y);
    }

    #[test]
    fn test_roundtrip_zone_30() {
        let (x, y) = geographic_to_utm(Geographic::from_degrees(-5.98, 37.39), 30, false, &GRS80);
        let (lon, lat) = utm_to_geographic(x, y, 30, false, &GRS80).to_degrees();

        assert!((lon - (-5.98)).abs() < 1e-6, "lon={}", lon);
        assert!((lat - 37.39).abs() < 1e-6, "lat={}", lat);
    }

    #[test]
    fn test_barcelona_zone_31() {
        // Barcelone: 2.17°E, 41.39°N → UTM 31N ≈ (431 000, 4 582 000)
        let (x, y) = geographic_to_utm(Geographic::from_degrees(2.17, 41.39), 31, false, &GRS80);
        assert!((x - 431000.0).abs() < 2000.0, "x={}", x);
        assert!((y - 4582000.0).abs() < 2000.0, "y={}", y);
    }

    #[test]
    fn test_zone_for_longitude() {
        assert_eq!(zone_for_longitude(-3.7), 30);
        assert_eq!(zone_for_longitude(-8.5), 29);
        assert_eq!(zone_for_longitude(2.17), 31);
        assert_eq!(zone_for_longitude(-15.4), 28);
        assert_eq!(zone_for_longitude(180.0), 60);
    }
}
