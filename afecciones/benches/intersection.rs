//! Benchmarks du découpage parcelle × couche et du parsing GML

use afecciones::catalog::{Layer, LayerSource};
use afecciones::{
    evaluate_layer, Artifacts, ImpactPolicy, ImpactTier, LayerCategory, LayerData, ParcelGeometry,
    Srs,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Polygone régulier à `n` sommets
fn regular_polygon(cx: f64, cy: f64, radius: f64, n: usize) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * std::f64::consts::TAU;
            Coord {
                x: cx + radius * angle.cos(),
                y: cy + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(coords), vec![])
}

/// Grille de `side × side` polygones autour de la parcelle
fn layer_grid(side: usize) -> MultiPolygon<f64> {
    let mut polygons = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            polygons.push(regular_polygon(
                439500.0 + i as f64 * 60.0,
                4473500.0 + j as f64 * 60.0,
                40.0,
                32,
            ));
        }
    }
    MultiPolygon::new(polygons)
}

fn bench_evaluate_layer(c: &mut Criterion) {
    let layer = Layer {
        id: "bench".into(),
        name: "Bench".into(),
        category: LayerCategory::Environmental,
        severity: ImpactTier::Medium,
        source: LayerSource::Local {
            path: "bench".into(),
        },
    };
    let parcel = ParcelGeometry::area(
        MultiPolygon::new(vec![regular_polygon(440000.0, 4474000.0, 150.0, 64)]),
        Srs::ETRS89_UTM30N,
    );
    let policy = ImpactPolicy::default();

    let mut group = c.benchmark_group("evaluate_layer");
    for side in [4usize, 16, 32] {
        let polygons = layer_grid(side);
        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side * side), &polygons, |b, p| {
            b.iter(|| {
                let data = LayerData::Vector {
                    polygons: p.clone(),
                    names: Vec::new(),
                    artifacts: Artifacts::default(),
                };
                evaluate_layer(
                    black_box(&layer),
                    black_box(&parcel),
                    Some(70000.0),
                    data,
                    &policy,
                )
            })
        });
    }
    group.finish();
}

fn bench_gml_parse(c: &mut Criterion) {
    let mut gml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><wfs:FeatureCollection>"#,
    );
    for polygon in layer_grid(16).iter() {
        gml.push_str(r#"<wfs:member><gml:Polygon srsName="EPSG:25830"><gml:exterior><gml:LinearRing><gml:posList>"#);
        for c in polygon.exterior().coords() {
            gml.push_str(&format!("{:.3} {:.3} ", c.x, c.y));
        }
        gml.push_str("</gml:posList></gml:LinearRing></gml:exterior></gml:Polygon></wfs:member>");
    }
    gml.push_str("</wfs:FeatureCollection>");

    let mut group = c.benchmark_group("gml_parse");
    group.throughput(Throughput::Bytes(gml.len() as u64));
    group.bench_function("256_polygons", |b| {
        b.iter(|| afecciones::gml::parse(black_box(gml.as_bytes())))
    });
    group.finish();
}

criterion_group!(benches, bench_evaluate_layer, bench_gml_parse);
criterion_main!(benches);
