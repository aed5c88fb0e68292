//! Accès aux services amont: Catastro, couches WFS/WMS, couches locales

pub mod catastro;
pub mod local;
pub mod retry;
pub mod wfs;
pub mod wms;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use geo::MultiPolygon;

use afecciones::{AfeccionError, Artifacts, Layer, LayerData, LayerFetcher, LayerRequest, LayerSource};

pub use catastro::CatastroClient;
pub use local::LocalLayerStore;
pub use retry::RetryPolicy;
pub use wfs::WfsClient;
pub use wms::WmsClient;

const USER_AGENT: &str = concat!("catastro-tool/", env!("CARGO_PKG_VERSION"));

/// Client HTTP partagé par tous les services
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .build()
        .context("Failed to build HTTP client")
}

/// Récupération d'une couche selon le type de sa source
pub struct LayerDispatcher {
    wfs: WfsClient,
    wms: WmsClient,
    local: LocalLayerStore,
}

impl LayerDispatcher {
    pub fn new(wfs: WfsClient, wms: WmsClient, local: LocalLayerStore) -> Self {
        Self { wfs, wms, local }
    }
}

#[async_trait]
impl LayerFetcher for LayerDispatcher {
    async fn fetch(&self, layer: &Layer, request: &LayerRequest) -> Result<LayerData, AfeccionError> {
        match &layer.source {
            LayerSource::Wfs { url, type_name } => {
                let polygons = self
                    .wfs
                    .fetch_polygons(&layer.id, url, type_name, request)
                    .await?;
                Ok(LayerData::Vector {
                    polygons,
                    names: Vec::new(),
                    artifacts: Artifacts::default(),
                })
            }
            LayerSource::Wms { url, layers } => {
                let artifacts = self.wms.fetch_image(&layer.id, url, layers, request).await?;
                Ok(LayerData::Raster { artifacts })
            }
            LayerSource::Local { path } => {
                let features = self.local.query(&layer.id, path, request).await?;
                Ok(LayerData::Vector {
                    polygons: MultiPolygon::new(features.polygons),
                    names: features.names,
                    artifacts: Artifacts::default(),
                })
            }
        }
    }
}
