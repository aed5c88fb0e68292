//! Export KML (WGS84) de la parcelle et des zones affectées

use std::fmt::Write;

use geo::{LineString, MultiPolygon, Point};

use afecciones::{AfeccionError, ParcelGeometry, Shape, Srs};

use super::reproject::SmartReprojector;

/// Contour de la parcelle: rouge, sans remplissage
const PARCEL_STYLE: &str = r#"<Style id="parcela"><LineStyle><color>ff0000ff</color><width>2</width></LineStyle><PolyStyle><fill>0</fill></PolyStyle></Style>"#;
/// Zone affectée: orange semi-transparent
const AFFECTED_STYLE: &str = r#"<Style id="afeccion"><LineStyle><color>ff0080ff</color><width>1</width></LineStyle><PolyStyle><color>800080ff</color></PolyStyle></Style>"#;

/// Placemark à écrire
pub struct Placemark<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub style: &'static str,
    pub shape: &'a Shape,
}

/// Document KML à partir de formes déjà en WGS84
pub fn document(title: &str, placemarks: &[Placemark<'_>]) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push_str("\n<kml xmlns=\"http://www.opengis.net/kml/2.2\"><Document>");
    let _ = write!(out, "<name>{}</name>", escape_xml(title));
    out.push_str(PARCEL_STYLE);
    out.push_str(AFFECTED_STYLE);

    for placemark in placemarks {
        let _ = write!(
            out,
            "<Placemark><name>{}</name><description>{}</description><styleUrl>#{}</styleUrl>",
            escape_xml(placemark.name),
            escape_xml(placemark.description),
            placemark.style
        );
        match placemark.shape {
            Shape::Area(mp) => write_multi_polygon(&mut out, mp),
            Shape::Point(p) => write_point(&mut out, p),
        }
        out.push_str("</Placemark>");
    }

    out.push_str("</Document></kml>\n");
    out
}

/// KML de la parcelle seule
pub fn parcel_kml(reference: &str, parcel: &ParcelGeometry) -> Result<String, AfeccionError> {
    let shape = shape_to_wgs84(&parcel.shape, parcel.srs)?;
    let description = format!("Referencia Catastral: {}", reference);
    let name = format!("Parcela {}", reference);
    Ok(document(
        reference,
        &[Placemark {
            name: &name,
            description: &description,
            style: "parcela",
            shape: &shape,
        }],
    ))
}

/// KML de la parcelle et de son intersection avec une couche
pub fn affection_kml(
    reference: &str,
    layer_name: &str,
    parcel: &ParcelGeometry,
    intersection: &MultiPolygon<f64>,
) -> Result<String, AfeccionError> {
    let parcel_shape = shape_to_wgs84(&parcel.shape, parcel.srs)?;
    let affected = Shape::Area(SmartReprojector::new(parcel.srs, Srs::WGS84)?.transform_multi_polygon(intersection)?);

    let parcel_name = format!("Parcela {}", reference);
    let parcel_description = format!("Referencia Catastral: {}", reference);
    let affected_description = format!("Afección {} sobre {}", layer_name, reference);
    Ok(document(
        &format!("{} - {}", reference, layer_name),
        &[
            Placemark {
                name: &parcel_name,
                description: &parcel_description,
                style: "parcela",
                shape: &parcel_shape,
            },
            Placemark {
                name: layer_name,
                description: &affected_description,
                style: "afeccion",
                shape: &affected,
            },
        ],
    ))
}

fn shape_to_wgs84(shape: &Shape, srs: Srs) -> Result<Shape, AfeccionError> {
    let reprojector = SmartReprojector::new(srs, Srs::WGS84)?;
    Ok(match shape {
        Shape::Area(mp) => Shape::Area(reprojector.transform_multi_polygon(mp)?),
        Shape::Point(p) => {
            let (x, y) = reprojector.transform_point(p.x(), p.y())?;
            Shape::Point(Point::new(x, y))
        }
    })
}

fn write_multi_polygon(out: &mut String, mp: &MultiPolygon<f64>) {
    out.push_str("<MultiGeometry>");
    for polygon in mp {
        out.push_str("<Polygon><outerBoundaryIs>");
        write_ring(out, polygon.exterior());
        out.push_str("</outerBoundaryIs>");
        for interior in polygon.interiors() {
            out.push_str("<innerBoundaryIs>");
            write_ring(out, interior);
            out.push_str("</innerBoundaryIs>");
        }
        out.push_str("</Polygon>");
    }
    out.push_str("</MultiGeometry>");
}

fn write_ring(out: &mut String, ring: &LineString<f64>) {
    out.push_str("<LinearRing><coordinates>");
    for (i, c) in ring.coords().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:.7},{:.7},0", c.x, c.y);
    }
    out.push_str("</coordinates></LinearRing>");
}

fn write_point(out: &mut String, p: &Point<f64>) {
    let _ = write!(out, "<Point><coordinates>{:.7},{:.7},0</coordinates></Point>", p.x(), p.y());
}

fn escape_xml(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            c => result.push(c),
        }
    }
    result
}
