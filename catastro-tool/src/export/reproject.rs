//! Reprojection des géométries: projection légère en priorité, PROJ en repli
//!
//! `Reprojector` (PROJ) n'est disponible qu'avec le feature `reproject`.

use geo::{MultiPolygon, Rect};

use afecciones::projection::ReprojectorLite;
use afecciones::{AfeccionError, Srs};

#[cfg(feature = "reproject")]
pub use with_proj::Reprojector;

#[cfg(feature = "reproject")]
mod with_proj {
    use geo::{Coord, LineString, MultiPolygon, Polygon};
    use proj::Proj;

    use afecciones::{AfeccionError, Srs};

    /// Reprojection via PROJ entre deux systèmes EPSG
    pub struct Reprojector {
        proj: Proj,
    }

    impl Reprojector {
        pub fn new(source: Srs, target: Srs) -> Result<Self, AfeccionError> {
            let proj = Proj::new_known_crs(&source.to_string(), &target.to_string(), None)
                .map_err(|e| {
                    AfeccionError::Projection(format!(
                        "Failed to create projection from {} to {}: {}",
                        source, target, e
                    ))
                })?;
            Ok(Self { proj })
        }

        pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64), AfeccionError> {
            self.proj
                .convert((x, y))
                .map_err(|e| AfeccionError::Projection(e.to_string()))
        }

        /// Conversion par lot des sommets d'un anneau
        fn transform_linestring(&self, ls: &LineString<f64>) -> Result<LineString<f64>, AfeccionError> {
            let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();
            self.proj
                .convert_array(&mut coords)
                .map_err(|e| AfeccionError::Projection(e.to_string()))?;
            Ok(LineString::new(
                coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
            ))
        }

        fn transform_polygon(&self, p: &Polygon<f64>) -> Result<Polygon<f64>, AfeccionError> {
            let exterior = self.transform_linestring(p.exterior())?;
            let interiors = p
                .interiors()
                .iter()
                .map(|ls| self.transform_linestring(ls))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Polygon::new(exterior, interiors))
        }

        pub fn transform_multi_polygon(
            &self,
            mp: &MultiPolygon<f64>,
        ) -> Result<MultiPolygon<f64>, AfeccionError> {
            mp.iter()
                .map(|p| self.transform_polygon(p))
                .collect::<Result<Vec<_>, _>>()
                .map(MultiPolygon::new)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_utm30_to_wgs84() {
            // Puerta del Sol, Madrid
            let r = Reprojector::new(Srs::ETRS89_UTM30N, Srs::WGS84).unwrap();
            let (lon, lat) = r.transform_point(440291.0, 4474254.0).unwrap();
            assert!((lon + 3.70).abs() < 0.01, "lon {}", lon);
            assert!((lat - 40.42).abs() < 0.01, "lat {}", lat);
        }

        #[test]
        fn test_invalid_epsg() {
            assert!(Reprojector::new(Srs(99999), Srs::WGS84).is_err());
        }
    }
}

/// Indique si PROJ est disponible
pub fn is_available() -> bool {
    cfg!(feature = "reproject")
}

/// Choix automatique du moteur de reprojection
pub enum SmartReprojector {
    /// Source et cible identiques
    Identity,
    /// Projection légère (Rust pur)
    Lite(ReprojectorLite),
    /// PROJ (feature `reproject`)
    #[cfg(feature = "reproject")]
    Proj(Reprojector),
}

impl SmartReprojector {
    pub fn new(source: Srs, target: Srs) -> Result<Self, AfeccionError> {
        if source == target {
            return Ok(Self::Identity);
        }
        if ReprojectorLite::is_supported(source) && ReprojectorLite::is_supported(target) {
            return Ok(Self::Lite(ReprojectorLite::new(source, target)?));
        }

        #[cfg(feature = "reproject")]
        {
            Reprojector::new(source, target).map(Self::Proj)
        }

        #[cfg(not(feature = "reproject"))]
        Err(AfeccionError::Projection(format!(
            "Reprojection {} -> {} not supported without the 'reproject' feature \
             (built-in: 4326, 4258, 3857, 258xx, 326xx, 327xx)",
            source, target
        )))
    }

    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64), AfeccionError> {
        match self {
            Self::Identity => Ok((x, y)),
            Self::Lite(lite) => Ok(lite.transform_point(x, y)),
            #[cfg(feature = "reproject")]
            Self::Proj(proj) => proj.transform_point(x, y),
        }
    }

    pub fn transform_multi_polygon(
        &self,
        mp: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, AfeccionError> {
        match self {
            Self::Identity => Ok(mp.clone()),
            Self::Lite(lite) => Ok(lite.transform(mp)),
            #[cfg(feature = "reproject")]
            Self::Proj(proj) => proj.transform_multi_polygon(mp),
        }
    }

    /// Emprise transformée (enveloppe des quatre coins)
    pub fn transform_rect(&self, rect: Rect<f64>) -> Result<Rect<f64>, AfeccionError> {
        let (min, max) = (rect.min(), rect.max());
        let corners = [
            self.transform_point(min.x, min.y)?,
            self.transform_point(max.x, min.y)?,
            self.transform_point(max.x, max.y)?,
            self.transform_point(min.x, max.y)?,
        ];
        let (mut min_x, mut min_y) = corners[0];
        let (mut max_x, mut max_y) = corners[0];
        for (x, y) in &corners[1..] {
            min_x = min_x.min(*x);
            min_y = min_y.min(*y);
            max_x = max_x.max(*x);
            max_y = max_y.max(*y);
        }
        Ok(Rect::new((min_x, min_y), (max_x, max_y)))
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Lite(_) => "lite (pure Rust)",
            #[cfg(feature = "reproject")]
            Self::Proj(_) => "proj (PROJ library)",
        }
    }
}
