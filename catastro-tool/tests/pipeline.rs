//! Analyse complète avec couches locales, fichiers produits et réponse JSON

use std::sync::Arc;
use std::time::Duration;

use afecciones::{
    AfeccionError, Analyzer, EngineOptions, GeometrySource, IntersectionEngine, LayerCatalog,
    ParcelGeometry, ParcelReference, RunOutcome, Srs,
};
use async_trait::async_trait;
use catastro_tool::cli::Runtime;
use catastro_tool::export::{FileSink, OutputLayout};
use catastro_tool::presenter::ApiResponse;
use catastro_tool::upstream::{LayerDispatcher, LocalLayerStore, RetryPolicy, WfsClient, WmsClient};
use geo::{polygon, MultiPolygon};
use serde_json::Value;

const REFERENCE: &str = "9872023VH5797S";

/// Parcelle de 100 m × 100 m en UTM 30N
struct FakeCatastro;

#[async_trait]
impl GeometrySource for FakeCatastro {
    async fn resolve(&self, reference: &ParcelReference) -> Result<ParcelGeometry, AfeccionError> {
        if reference.as_str() != REFERENCE {
            return Err(AfeccionError::NotFound(reference.to_string()));
        }
        Ok(ParcelGeometry::area(
            MultiPolygon::new(vec![polygon![
                (x: 440000.0, y: 4474000.0),
                (x: 440100.0, y: 4474000.0),
                (x: 440100.0, y: 4474100.0),
                (x: 440000.0, y: 4474100.0),
            ]]),
            Srs::ETRS89_UTM30N,
        ))
    }
}

const UTM_LAYER: &str = r#"{"type":"FeatureCollection",
  "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::25830"}},
  "features":[
    {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[440050,4473900],[440300,4473900],[440300,4474200],[440050,4474200],[440050,4473900]]]}}
  ]}"#;

const FAR_LAYER: &str = r#"{"type":"FeatureCollection","features":[
    {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[2.0,41.0],[2.1,41.0],[2.1,41.1],[2.0,41.1],[2.0,41.0]]]}}
  ]}"#;

const CATALOG: &str = r#"{
  "version": "test-2024.1",
  "layers": [
    {"id": "dph", "name": "Dominio Público Hidráulico", "category": "ambiental", "severity": "Medio",
     "source": {"type": "local", "path": "dph"}},
    {"id": "vias_pecuarias", "name": "Vías Pecuarias", "category": "infraestructuras", "severity": "Bajo",
     "source": {"type": "local", "path": "vias_pecuarias.geojson"}},
    {"id": "catastro", "name": "Catastro", "category": "urbanismo", "severity": "Bajo",
     "source": {"type": "wms", "url": "http://127.0.0.1:9/wms", "layers": "Catastro"}}
  ]
}"#;

fn analyzer(root: &std::path::Path) -> Analyzer {
    let capas = root.join("capas");
    std::fs::create_dir_all(capas.join("dph")).unwrap();
    std::fs::write(capas.join("dph/cauces.geojson"), UTM_LAYER).unwrap();
    std::fs::write(capas.join("vias_pecuarias.geojson"), FAR_LAYER).unwrap();

    let layout = OutputLayout::new(root.join("outputs"));
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let retry = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
    };
    let dispatcher = LayerDispatcher::new(
        WfsClient::new(http.clone(), retry),
        WmsClient::new(http, retry, layout.clone()),
        LocalLayerStore::new(capas),
    );
    let engine = IntersectionEngine::new(
        Arc::new(dispatcher),
        EngineOptions {
            concurrency: 3,
            layer_timeout: Duration::from_secs(10),
        },
    )
    .with_sink(Arc::new(FileSink::new(layout)));

    Analyzer::new(
        Arc::new(FakeCatastro),
        engine,
        Arc::new(LayerCatalog::from_json(CATALOG).unwrap()),
    )
}

#[tokio::test]
async fn local_layers_produce_files_and_api_shape() {
    let dir = tempfile::tempdir().unwrap();
    let analysis = analyzer(dir.path()).analyze(REFERENCE).await.unwrap();

    // Le WMS injoignable rend la couche indisponible sans faire échouer le run
    assert_eq!(analysis.outcome, RunOutcome::PartiallyFailed);

    let value = serde_json::to_value(ApiResponse::from_analysis(&analysis)).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["ref"], REFERENCE);
    assert!((value["coordenadas"]["lat"].as_f64().unwrap() - 40.41).abs() < 0.02);
    assert!((value["coordenadas"]["lon"].as_f64().unwrap() + 3.70).abs() < 0.02);
    assert!(value.get("error").is_none());

    let resumen = &value["analisis"]["resumen"];
    assert_eq!(resumen["total_capas"], 3);
    assert_eq!(resumen["capas_afectan"], 1);
    assert_eq!(resumen["superficie_total_afectada"], "5000.00 m²");
    assert_eq!(resumen["archivos_generados"], 2);

    let capas = value["analisis"]["capas_procesadas"].as_array().unwrap();
    assert_eq!(capas.len(), 3);

    let dph = &capas[0];
    assert_eq!(dph["nombre"], "Dominio Público Hidráulico");
    assert_eq!(dph["estado"], "Solapado");
    assert_eq!(dph["superficie"], "5000.00 m²");
    assert_eq!(dph["porcentaje"], "50.00%");
    assert_eq!(dph["impacto"], "Medio");
    assert_eq!(dph["categoria"], "ambiental");
    assert_eq!(
        dph["kml_url"],
        "/outputs/9872023VH5797S/geometrias/9872023VH5797S_dph.kml"
    );
    assert!(dir
        .path()
        .join("outputs/9872023VH5797S/geometrias/9872023VH5797S_dph.kml")
        .is_file());
    assert!(dir
        .path()
        .join("outputs/9872023VH5797S/datos/9872023VH5797S_dph.json")
        .is_file());

    let vias = &capas[1];
    assert_eq!(vias["estado"], "Descargada");
    assert_eq!(vias["superficie"], "0.00 m²");
    assert!(vias.get("porcentaje").is_none());
    assert!(vias.get("impacto").is_none());

    let wms = &capas[2];
    assert_eq!(wms["estado"], "Unavailable");
    assert_eq!(wms["superficie"], "N/A");
    assert!(wms.get("png_url").is_none());
}

#[tokio::test]
async fn unknown_reference_has_no_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let reference = "0000000XX0000X";
    let err = analyzer(dir.path()).analyze(reference).await.unwrap_err();
    assert!(err.is_fatal());

    let value: Value = serde_json::to_value(ApiResponse::from_error(reference, &err)).unwrap();
    assert_eq!(value["status"], "error");
    assert_eq!(value["ref"], reference);
    assert!(value.get("analisis").is_none());
    assert!(value.get("coordenadas").is_none());
    assert!(!dir.path().join("outputs").join(reference).exists());
}

#[tokio::test]
async fn unwritable_output_keeps_the_analysis() {
    let dir = tempfile::tempdir().unwrap();
    // Un fichier ordinaire à la place du dossier de sortie
    let blocked = dir.path().join("bloqueado");
    std::fs::write(&blocked, "no es un directorio").unwrap();

    let runtime = Runtime::with_analyzer(analyzer(dir.path()), OutputLayout::new(&blocked));
    let value = serde_json::to_value(runtime.respond(REFERENCE, true).await).unwrap();

    assert_eq!(value["status"], "success");
    assert!(value.get("error").is_none());
    assert_eq!(value["analisis"]["resumen"]["total_capas"], 3);
    assert_eq!(value["analisis"]["resumen"]["capas_afectan"], 1);
    assert!(blocked.is_file());
}
