//! Parser GML (INSPIRE CadastralParcel, réponses WFS GetFeature)
//!
//! Extraction volontairement minimale: polygones (`Polygon`, `PolygonPatch`),
//! point de référence de la parcelle, `srsName`, rapports d'exception OGC.
//! Les coordonnées sont lues depuis `posList`, `pos` ou `coordinates` (GML 2).

use std::borrow::Cow;

use encoding_rs::Encoding;
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use memchr::{memchr, memmem};

use crate::types::{ParcelGeometry, Srs};
use crate::AfeccionError;

/// Contenu utile d'un document GML
#[derive(Debug, Default)]
pub struct GmlDocument {
    /// Premier `srsName` rencontré dans le document
    pub srs: Option<Srs>,
    /// Polygones dans l'ordre du document
    pub polygons: Vec<Polygon<f64>>,
    /// `cp:referencePoint` de la parcelle cadastrale
    pub reference_point: Option<Coord<f64>>,
    /// Message d'un `ExceptionReport` / `ServiceExceptionReport`
    pub exception: Option<String>,
    /// Nombre de `member` / `featureMember`
    pub feature_count: usize,
}

impl GmlDocument {
    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }

    pub fn multi_polygon(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.polygons.clone())
    }

    /// Moyenne des sommets extérieurs (repli quand aucun point de référence)
    pub fn vertex_centroid(&self) -> Option<Coord<f64>> {
        let (sum, n) = self
            .polygons
            .iter()
            .flat_map(|p| p.exterior().coords())
            .fold((Coord { x: 0.0, y: 0.0 }, 0usize), |(acc, n), c| {
                (acc + *c, n + 1)
            });
        (n > 0).then(|| Coord {
            x: sum.x / n as f64,
            y: sum.y / n as f64,
        })
    }

    /// Géométrie de parcelle: polygones si présents, sinon point de référence
    pub fn into_parcel_geometry(self, default_srs: Srs) -> Option<ParcelGeometry> {
        let srs = self.srs.unwrap_or(default_srs);
        if !self.polygons.is_empty() {
            return Some(ParcelGeometry::area(MultiPolygon::new(self.polygons), srs));
        }
        self.reference_point
            .map(|c| ParcelGeometry::point(Point::from(c), srs))
    }
}

/// Décode les octets selon la déclaration XML (UTF-8 par défaut)
pub fn decode(data: &[u8]) -> Cow<'_, str> {
    let head = &data[..data.len().min(256)];
    if let Some(encoding) = declared_encoding(head) {
        if encoding != encoding_rs::UTF_8 {
            let (decoded, _, _) = encoding.decode(data);
            return decoded;
        }
    }

    match simdutf8::basic::from_utf8(data) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            // Services IDE espagnols: Latin-1 non déclaré
            tracing::debug!("GML is not valid UTF-8, decoding as windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(data);
            decoded
        }
    }
}

/// Lit `encoding="..."` dans la déclaration XML
fn declared_encoding(head: &[u8]) -> Option<&'static Encoding> {
    let pos = memmem::find(head, b"encoding=")?;
    let rest = &head[pos + 9..];
    let quote = *rest.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = memchr(quote, &rest[1..])?;
    Encoding::for_label(&rest[1..1 + end])
}

/// Parse un document GML
pub fn parse(data: &[u8]) -> Result<GmlDocument, AfeccionError> {
    let text = decode(data);
    parse_str(&text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    PosList,
    Pos,
    Coordinates,
    ExceptionText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingRole {
    Exterior,
    Interior,
}

#[derive(Default)]
struct PolygonBuilder {
    exterior: Option<Vec<Coord<f64>>>,
    interiors: Vec<Vec<Coord<f64>>>,
}

/// État du parcours des balises
#[derive(Default)]
struct Scanner {
    doc: GmlDocument,
    swap_axes: bool,
    /// Profondeur courante des éléments ouverts
    depth: usize,
    /// `srsDimension` déclarés: (profondeur de l'élément, dimension)
    dimensions: Vec<(usize, usize)>,
    polygon: Option<PolygonBuilder>,
    role: Option<RingRole>,
    ring: Vec<Coord<f64>>,
    in_reference_point: bool,
    in_exception: bool,
}

/// Parse un document GML déjà décodé
pub fn parse_str(text: &str) -> Result<GmlDocument, AfeccionError> {
    let bytes = text.as_bytes();
    let mut scanner = Scanner::default();

    let mut pos = 0;
    let mut capture: Option<(Capture, usize)> = None;

    while let Some(offset) = memchr(b'<', &bytes[pos..]) {
        let start = pos + offset;

        // Texte de l'élément capturé: jusqu'à la prochaine balise
        if let Some((kind, text_start)) = capture.take() {
            scanner.on_text(kind, &text[text_start..start])?;
        }

        // Commentaires et CDATA
        if bytes[start..].starts_with(b"<!--") {
            pos = memmem::find(&bytes[start..], b"-->")
                .map(|p| start + p + 3)
                .unwrap_or(bytes.len());
            continue;
        }

        let Some(end_offset) = memchr(b'>', &bytes[start..]) else {
            break;
        };
        let end = start + end_offset;
        let tag = &text[start + 1..end];
        pos = end + 1;

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }

        if let Some(name) = tag.strip_prefix('/') {
            scanner.on_close(local_name(name.trim()));
            continue;
        }

        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/');
        let qname = tag.split_ascii_whitespace().next().unwrap_or("");
        let name = local_name(qname);

        if let Some(kind) = scanner.on_open(name, tag) {
            if !self_closing {
                capture = Some((kind, pos));
            }
        }
        if self_closing {
            scanner.on_close(name);
        }
    }

    Ok(scanner.doc)
}

/// Nom local d'un nom qualifié (`gml:posList` → `posList`)
fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Valeur d'un attribut dans le texte d'une balise ouvrante
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut search = tag;
    loop {
        let pos = search.find(name)?;
        let before = search[..pos].chars().last();
        let rest = &search[pos + name.len()..];
        let rest_trim = rest.trim_start();
        let is_attr = matches!(before, Some(c) if c.is_whitespace() || c == ':')
            && rest_trim.starts_with('=');
        if is_attr {
            let value = rest_trim[1..].trim_start();
            let quote = value.chars().next()?;
            if quote != '"' && quote != '\'' {
                return None;
            }
            let inner = &value[1..];
            let end = inner.find(quote)?;
            return Some(&inner[..end]);
        }
        search = rest;
    }
}

impl Scanner {
    fn on_open(&mut self, name: &str, tag: &str) -> Option<Capture> {
        if let Some(srs_name) = attribute(tag, "srsName") {
            if self.doc.srs.is_none() {
                if let Some(srs) = Srs::from_name(srs_name) {
                    self.doc.srs = Some(srs);
                    // Formes URN / URL: ordre des axes EPSG (lat, lon) pour les géographiques
                    let lowered = srs_name.to_ascii_lowercase();
                    self.swap_axes = srs.is_geographic()
                        && (lowered.starts_with("urn:") || lowered.starts_with("http"));
                }
            }
        }
        self.depth += 1;
        if let Some(dim) = attribute(tag, "srsDimension").and_then(|d| d.trim().parse().ok()) {
            self.dimensions.push((self.depth, dim));
        }

        match name {
            "Polygon" | "PolygonPatch" => {
                self.polygon = Some(PolygonBuilder::default());
                None
            }
            "exterior" | "outerBoundaryIs" => {
                self.role = Some(RingRole::Exterior);
                None
            }
            "interior" | "innerBoundaryIs" => {
                self.role = Some(RingRole::Interior);
                None
            }
            "LinearRing" => {
                self.ring.clear();
                None
            }
            "referencePoint" => {
                self.in_reference_point = true;
                None
            }
            "member" | "featureMember" => {
                self.doc.feature_count += 1;
                None
            }
            "ExceptionReport" | "ServiceExceptionReport" => {
                self.in_exception = true;
                self.doc.exception.get_or_insert_with(String::new);
                None
            }
            "ExceptionText" | "ServiceException" if self.in_exception => {
                Some(Capture::ExceptionText)
            }
            "posList" => Some(Capture::PosList),
            "pos" => Some(Capture::Pos),
            "coordinates" => Some(Capture::Coordinates),
            _ => None,
        }
    }

    /// Dimension en vigueur: déclaration de l'ancêtre le plus proche, 2 sinon
    fn dimension(&self) -> usize {
        self.dimensions.last().map_or(2, |&(_, dim)| dim)
    }

    fn on_close(&mut self, name: &str) {
        while self.dimensions.last().is_some_and(|&(depth, _)| depth >= self.depth) {
            self.dimensions.pop();
        }
        self.depth = self.depth.saturating_sub(1);

        match name {
            "LinearRing" => {
                let ring = std::mem::take(&mut self.ring);
                if let Some(polygon) = self.polygon.as_mut() {
                    match self.role {
                        Some(RingRole::Interior) => polygon.interiors.push(ring),
                        _ => {
                            if polygon.exterior.is_none() {
                                polygon.exterior = Some(ring);
                            }
                        }
                    }
                }
            }
            "exterior" | "outerBoundaryIs" | "interior" | "innerBoundaryIs" => {
                self.role = None;
            }
            "Polygon" | "PolygonPatch" => {
                if let Some(builder) = self.polygon.take() {
                    if let Some(exterior) = builder.exterior.filter(|r| r.len() >= 3) {
                        let interiors = builder
                            .interiors
                            .into_iter()
                            .filter(|r| r.len() >= 3)
                            .map(LineString::new)
                            .collect();
                        self.doc
                            .polygons
                            .push(Polygon::new(LineString::new(exterior), interiors));
                    }
                }
            }
            "referencePoint" => self.in_reference_point = false,
            "ExceptionReport" | "ServiceExceptionReport" => self.in_exception = false,
            _ => {}
        }
    }

    fn on_text(&mut self, kind: Capture, raw: &str) -> Result<(), AfeccionError> {
        match kind {
            Capture::ExceptionText => {
                if let Some(message) = self.doc.exception.as_mut() {
                    if !message.is_empty() {
                        message.push_str("; ");
                    }
                    message.push_str(raw.trim());
                }
            }
            Capture::PosList => {
                let coords = parse_coords(raw, self.dimension(), self.swap_axes, false)?;
                self.ring.extend(coords);
            }
            Capture::Coordinates => {
                let coords = parse_coords(raw, 2, self.swap_axes, true)?;
                self.ring.extend(coords);
            }
            Capture::Pos => {
                let coords = parse_coords(raw, self.dimension(), self.swap_axes, false)?;
                if self.in_reference_point && self.polygon.is_none() {
                    if let Some(first) = coords.first() {
                        self.doc.reference_point = Some(*first);
                    }
                } else {
                    self.ring.extend(coords);
                }
            }
        }
        Ok(())
    }
}

/// Parse une liste de coordonnées séparées par des blancs (et virgules en GML 2)
fn parse_coords(
    raw: &str,
    dimension: usize,
    swap_axes: bool,
    comma_tuples: bool,
) -> Result<Vec<Coord<f64>>, AfeccionError> {
    let dimension = dimension.max(2);
    let values: Vec<f64> = raw
        .split(|c: char| c.is_ascii_whitespace() || (comma_tuples && c == ','))
        .filter(|s| !s.is_empty())
        .map(|s| {
            fast_float::parse::<f64, _>(s)
                .map_err(|_| AfeccionError::Gml(format!("invalid coordinate '{}'", s)))
        })
        .collect::<Result<_, _>>()?;

    if values.len() % dimension != 0 {
        return Err(AfeccionError::Gml(format!(
            "{} values is not a multiple of dimension {}",
            values.len(),
            dimension
        )));
    }

    Ok(values
        .chunks_exact(dimension)
        .map(|c| {
            if swap_axes {
                Coord { x: c[1], y: c[0] }
            } else {
                Coord { x: c[0], y: c[1] }
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    const PARCEL_GML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<gml:FeatureCollection xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:cp="http://inspire.ec.europa.eu/schemas/cp/4.0">
  <gml:featureMember>
    <cp:CadastralParcel gml:id="ES.SDGC.CP.9872023VH5797S">
      <cp:geometry>
        <gml:MultiSurface gml:id="MultiSurface_ES.SDGC.CP.9872023VH5797S" srsName="http://www.opengis.net/def/crs/EPSG/0/25830">
          <gml:surfaceMember>
            <gml:Surface gml:id="Surface_ES.SDGC.CP.9872023VH5797S.1" srsName="http://www.opengis.net/def/crs/EPSG/0/25830">
              <gml:patches>
                <gml:PolygonPatch>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList srsDimension="2" count="5">440000 4474000 440100 4474000 440100 4474100 440000 4474100 440000 4474000</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                  <gml:interior>
                    <gml:LinearRing>
                      <gml:posList srsDimension="2" count="5">440010 4474010 440020 4474010 440020 4474020 440010 4474020 440010 4474010</gml:posList>
                    </gml:LinearRing>
                  </gml:interior>
                </gml:PolygonPatch>
              </gml:patches>
            </gml:Surface>
          </gml:surfaceMember>
        </gml:MultiSurface>
      </cp:geometry>
      <!-- <gml:pos>0 0</gml:pos> -->
      <cp:referencePoint>
        <gml:Point gml:id="ReferencePoint_ES.SDGC.CP.9872023VH5797S" srsName="http://www.opengis.net/def/crs/EPSG/0/25830">
          <gml:pos>440050 4474050</gml:pos>
        </gml:Point>
      </cp:referencePoint>
    </cp:CadastralParcel>
  </gml:featureMember>
</gml:FeatureCollection>"#;

    #[test]
    fn test_parse_cadastral_parcel() {
        let doc = parse(PARCEL_GML.as_bytes()).unwrap();

        assert_eq!(doc.srs, Some(Srs(25830)));
        assert_eq!(doc.feature_count, 1);
        assert_eq!(doc.polygons.len(), 1);
        assert_eq!(doc.polygons[0].interiors().len(), 1);
        assert!((doc.polygons[0].unsigned_area() - 9900.0).abs() < 1e-6);
        assert_eq!(
            doc.reference_point,
            Some(Coord {
                x: 440050.0,
                y: 4474050.0
            })
        );
        assert!(!doc.is_exception());
    }

    #[test]
    fn test_into_parcel_geometry_prefers_polygons() {
        let geometry = parse(PARCEL_GML.as_bytes())
            .unwrap()
            .into_parcel_geometry(Srs::WGS84)
            .unwrap();
        assert_eq!(geometry.srs, Srs(25830));
        assert!(matches!(geometry.shape, crate::types::Shape::Area(_)));
    }

    #[test]
    fn test_urn_wgs84_swaps_axes() {
        let gml = r#"<wfs:FeatureCollection><gml:featureMember><ms:zona>
            <gml:Polygon srsName="urn:ogc:def:crs:EPSG::4326"><gml:exterior><gml:LinearRing>
            <gml:posList>40.0 -3.0 40.0 -2.0 41.0 -2.0 40.0 -3.0</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon></ms:zona></gml:featureMember></wfs:FeatureCollection>"#;
        let doc = parse_str(gml).unwrap();
        assert_eq!(doc.srs, Some(Srs::WGS84));
        let first = doc.polygons[0].exterior().0[0];
        assert_eq!(first, Coord { x: -3.0, y: 40.0 });
    }

    #[test]
    fn test_gml2_coordinates() {
        let gml = r#"<gml:Polygon srsName="EPSG:4326"><gml:outerBoundaryIs><gml:LinearRing>
            <gml:coordinates>-3.0,40.0 -2.0,40.0 -2.0,41.0 -3.0,40.0</gml:coordinates>
            </gml:LinearRing></gml:outerBoundaryIs></gml:Polygon>"#;
        let doc = parse_str(gml).unwrap();
        assert_eq!(doc.polygons.len(), 1);
        assert_eq!(doc.polygons[0].exterior().0[0], Coord { x: -3.0, y: 40.0 });
    }

    #[test]
    fn test_three_dimensional_pos_list() {
        let gml = r#"<gml:Polygon srsName="EPSG:25830"><gml:exterior><gml:LinearRing>
            <gml:posList srsDimension="3">0 0 5 10 0 5 10 10 5 0 0 5</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon>"#;
        let doc = parse_str(gml).unwrap();
        assert_eq!(doc.polygons[0].exterior().0.len(), 4);
        assert!((doc.polygons[0].unsigned_area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_does_not_leak_to_next_geometry() {
        let gml = r#"<wfs:FeatureCollection>
            <wfs:member><gml:Polygon srsName="EPSG:25830" srsDimension="3"><gml:exterior><gml:LinearRing>
            <gml:posList>0 0 5 10 0 5 10 10 5 0 0 5</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon></wfs:member>
            <wfs:member><gml:Polygon><gml:exterior><gml:LinearRing>
            <gml:posList>20 20 30 20 30 30 20 20</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon></wfs:member>
            </wfs:FeatureCollection>"#;
        let doc = parse_str(gml).unwrap();
        assert_eq!(doc.polygons.len(), 2);
        assert!((doc.polygons[0].unsigned_area() - 50.0).abs() < 1e-9);
        assert!((doc.polygons[1].unsigned_area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_exception_report() {
        let gml = r#"<?xml version="1.0"?><ows:ExceptionReport><ows:Exception exceptionCode="InvalidParameterValue">
            <ows:ExceptionText>La referencia catastral no existe</ows:ExceptionText></ows:Exception></ows:ExceptionReport>"#;
        let doc = parse_str(gml).unwrap();
        assert_eq!(doc.exception.as_deref(), Some("La referencia catastral no existe"));
        assert!(doc.polygons.is_empty());
    }

    #[test]
    fn test_invalid_coordinate() {
        let gml = "<gml:posList>1 2 x 4</gml:posList>";
        assert!(matches!(parse_str(gml), Err(AfeccionError::Gml(_))));
    }

    #[test]
    fn test_latin1_declared_encoding() {
        let mut data = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><ows:ExceptionReport><ows:ExceptionText>Par\xe1metro</ows:ExceptionText></ows:ExceptionReport>".to_vec();
        data.shrink_to_fit();
        let doc = parse(&data).unwrap();
        assert_eq!(doc.exception.as_deref(), Some("Parámetro"));
    }

    #[test]
    fn test_vertex_centroid() {
        let doc = parse(PARCEL_GML.as_bytes()).unwrap();
        let c = doc.vertex_centroid().unwrap();
        // Moyenne des 5 sommets (le premier est répété)
        assert!((c.x - 440040.0).abs() < 1e-9);
        assert!((c.y - 4474040.0).abs() < 1e-9);
    }
}
