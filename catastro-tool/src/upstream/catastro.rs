//! Client du Catastro: géométrie d'une parcelle
//!
//! Stratégie de repli:
//! 1. INSPIRE WFS `GetParcel` (GML, ETRS89 UTM 30N): polygones de la parcelle
//! 2. Service JSON `Geo_RCToWGS84`: centroïde WGS84
//! 3. Service XML `Consulta_RCCOOR`: centroïde WGS84
//!
//! Les deux derniers ne donnent qu'un point.

use async_trait::async_trait;
use geo::Point;
use tracing::{debug, info, warn};

use afecciones::{gml, AfeccionError, GeometrySource, ParcelGeometry, ParcelReference, Srs};

use super::retry::{send_bytes, RetryPolicy};

const SERVICE: &str = "catastro";

/// Résultat d'une méthode de résolution
#[derive(Debug)]
enum Lookup {
    Found(ParcelGeometry),
    /// Le service a répondu sans géométrie
    Missing(String),
}

/// Client HTTP du Catastro
#[derive(Clone)]
pub struct CatastroClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CatastroClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retry,
        }
    }

    fn inspire_url(&self) -> String {
        format!("{}/INSPIRE/wfsCP.aspx", self.base_url)
    }

    /// Méthode 1: GML INSPIRE de la parcelle
    async fn from_inspire(&self, reference: &ParcelReference) -> Result<Lookup, AfeccionError> {
        let url = self.inspire_url();
        let fetched = send_bytes(SERVICE, &self.retry, || {
            self.client.get(&url).query(&[
                ("service", "wfs"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("STOREDQUERY_ID", "GetParcel"),
                ("refcat", reference.parcel_part()),
                ("srsname", "EPSG:25830"),
            ])
        })
        .await?;

        if !fetched.status.is_success() {
            return Ok(Lookup::Missing(format!("INSPIRE HTTP {}", fetched.status)));
        }
        classify_gml(&fetched.body)
    }

    /// Méthode 2: service JSON
    async fn from_json_service(&self, reference: &ParcelReference) -> Result<Lookup, AfeccionError> {
        let url = format!(
            "{}/OVCServWeb/OVCWcfCallejero/COVCCallejero.svc/json/Geo_RCToWGS84/{}",
            self.base_url, reference
        );
        let fetched = send_bytes(SERVICE, &self.retry, || self.client.get(&url)).await?;

        if !fetched.status.is_success() {
            return Ok(Lookup::Missing(format!("JSON HTTP {}", fetched.status)));
        }
        Ok(parse_geo_json(&fetched.body))
    }

    /// Méthode 3: service XML
    async fn from_xml_service(&self, reference: &ParcelReference) -> Result<Lookup, AfeccionError> {
        let url = format!(
            "{}/ovcservweb/ovcswlocalizacionrc/ovccoordenadas.asmx/Consulta_RCCOOR",
            self.base_url
        );
        let fetched = send_bytes(SERVICE, &self.retry, || {
            self.client
                .get(&url)
                .query(&[("SRS", "EPSG:4326"), ("RC", reference.as_str())])
        })
        .await?;

        if !fetched.status.is_success() {
            return Ok(Lookup::Missing(format!("XML HTTP {}", fetched.status)));
        }
        Ok(parse_rccoor_xml(&fetched.body))
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Inspire,
    Json,
    Xml,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Inspire => "inspire",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl CatastroClient {
    async fn lookup(&self, method: Method, reference: &ParcelReference) -> Result<Lookup, AfeccionError> {
        match method {
            Method::Inspire => self.from_inspire(reference).await,
            Method::Json => self.from_json_service(reference).await,
            Method::Xml => self.from_xml_service(reference).await,
        }
    }
}

#[async_trait]
impl GeometrySource for CatastroClient {
    async fn resolve(&self, reference: &ParcelReference) -> Result<ParcelGeometry, AfeccionError> {
        let mut missing = Vec::new();
        let mut last_error = None;

        for method in [Method::Inspire, Method::Json, Method::Xml] {
            match self.lookup(method, reference).await {
                Ok(Lookup::Found(geometry)) => {
                    info!(reference = %reference, method = method.as_str(), "Parcel resolved");
                    return Ok(geometry);
                }
                Ok(Lookup::Missing(reason)) => {
                    debug!(reference = %reference, method = method.as_str(), reason = %reason, "No geometry");
                    missing.push(reason);
                }
                Err(e) => {
                    warn!(reference = %reference, method = method.as_str(), error = %e, "Catastro method failed");
                    last_error = Some(e);
                }
            }
        }

        // Au moins un service a répondu sans géométrie: référence inconnue
        match last_error {
            Some(e) if missing.is_empty() => Err(e),
            _ => Err(AfeccionError::NotFound(reference.to_string())),
        }
    }
}

/// Interprète la réponse GML de `GetParcel`
fn classify_gml(body: &[u8]) -> Result<Lookup, AfeccionError> {
    let doc = gml::parse(body)?;
    if let Some(message) = doc.exception.as_deref() {
        return Ok(Lookup::Missing(format!("INSPIRE exception: {}", message)));
    }
    Ok(doc
        .into_parcel_geometry(Srs::ETRS89_UTM30N)
        .map(Lookup::Found)
        .unwrap_or_else(|| Lookup::Missing("INSPIRE: no geometry".into())))
}

/// Lit `geo.xcen` / `geo.ycen` (nombres ou chaînes)
fn parse_geo_json(body: &[u8]) -> Lookup {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Lookup::Missing("JSON: invalid body".into());
    };
    let coord = |key: &str| {
        let v = value.get("geo")?.get(key)?;
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    };
    match (coord("xcen"), coord("ycen")) {
        (Some(lon), Some(lat)) => Lookup::Found(ParcelGeometry::point(Point::new(lon, lat), Srs::WGS84)),
        _ => Lookup::Missing("JSON: no coordinates".into()),
    }
}

/// Lit `coord/geo/xcen` et `ycen` dans la réponse `Consulta_RCCOOR`
fn parse_rccoor_xml(body: &[u8]) -> Lookup {
    let text = gml::decode(body);
    let lon = element_text(&text, "xcen").and_then(|s| s.trim().parse::<f64>().ok());
    let lat = element_text(&text, "ycen").and_then(|s| s.trim().parse::<f64>().ok());
    match (lon, lat) {
        (Some(lon), Some(lat)) => Lookup::Found(ParcelGeometry::point(Point::new(lon, lat), Srs::WGS84)),
        _ => {
            let reason = element_text(&text, "des").unwrap_or("no coordinates");
            Lookup::Missing(format!("XML: {}", reason.trim()))
        }
    }
}

/// Texte du premier élément de nom local `name` (préfixe de namespace ignoré)
fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = xml;
    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let end = after.find('>')?;
        let tag = &after[..end];
        let qname = tag.split_ascii_whitespace().next().unwrap_or("");
        let local = qname.rsplit(':').next().unwrap_or(qname);
        let content = &after[end + 1..];
        if local == name && !tag.starts_with('/') && !tag.ends_with('/') {
            return content.find('<').map(|close| &content[..close]);
        }
        rest = content;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use afecciones::Shape;

    #[test]
    fn test_classify_gml_exception() {
        let body = br#"<?xml version="1.0"?><ExceptionReport><Exception><ExceptionText>No existe la parcela</ExceptionText></Exception></ExceptionReport>"#;
        match classify_gml(body).unwrap() {
            Lookup::Missing(reason) => assert!(reason.contains("No existe")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_gml_polygon_defaults_to_utm30() {
        let body = br#"<gml:FeatureCollection><gml:featureMember><gml:Polygon><gml:exterior><gml:LinearRing>
            <gml:posList>0 0 10 0 10 10 0 10 0 0</gml:posList></gml:LinearRing></gml:exterior></gml:Polygon>
            </gml:featureMember></gml:FeatureCollection>"#;
        match classify_gml(body).unwrap() {
            Lookup::Found(geometry) => {
                assert_eq!(geometry.srs, Srs::ETRS89_UTM30N);
                assert!(matches!(geometry.shape, Shape::Area(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_geo_json() {
        let body = br#"{"geo": {"xcen": "-3.7038", "ycen": 40.4168}}"#;
        match parse_geo_json(body) {
            Lookup::Found(g) => {
                assert_eq!(g.srs, Srs::WGS84);
                assert_eq!(g.shape, Shape::Point(Point::new(-3.7038, 40.4168)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_geo_json(b"{}"), Lookup::Missing(_)));
        assert!(matches!(parse_geo_json(b"not json"), Lookup::Missing(_)));
    }

    #[test]
    fn test_parse_rccoor_xml() {
        let body = br#"<?xml version="1.0" encoding="utf-8"?>
<consulta_coordenadas xmlns="http://www.catastro.meh.es/"><control><cucoor>1</cucoor></control>
<coordenadas><coord><pc><pc1>9872023</pc1><pc2>VH5797S</pc2></pc>
<geo><xcen>-3.70375</xcen><ycen>40.41677</ycen><srs>EPSG:4326</srs></geo></coord></coordenadas></consulta_coordenadas>"#;
        match parse_rccoor_xml(body) {
            Lookup::Found(g) => assert_eq!(g.shape, Shape::Point(Point::new(-3.70375, 40.41677))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_rccoor_xml_error() {
        let body = br#"<consulta_coordenadas><lerr><err><cod>11</cod><des>LA REFERENCIA CATASTRAL NO EXISTE</des></err></lerr></consulta_coordenadas>"#;
        match parse_rccoor_xml(body) {
            Lookup::Missing(reason) => assert!(reason.contains("NO EXISTE")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_element_text_with_prefix() {
        assert_eq!(element_text("<a><cat:xcen>1.5</cat:xcen></a>", "xcen"), Some("1.5"));
        assert_eq!(element_text("<a><xcenx>1</xcenx></a>", "xcen"), None);
    }
}
