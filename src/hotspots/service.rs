use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::firms::{HotspotProvider, ProviderError};
use super::format;
use super::{EnrichedHotspot, HotspotRecord};
use crate::cache::{self, CacheService};
use crate::inflight::InFlightRegistry;
use crate::location::enricher::LocationEnricher;
use crate::location::geocoder::{GeocodeError, ReverseGeocode};

#[derive(Error, Debug)]
pub enum FireServiceError {
    #[error("result set has {count} records, exceeding the limit of {max}; refine the filters or use pagination")]
    OverLimit { count: usize, max: usize },
    #[error("upstream hotspot fetch failed: {0}")]
    Upstream(#[source] Arc<ProviderError>),
    #[error("location enrichment failed: {0}")]
    Enrichment(#[from] GeocodeError),
}

/// Query parameters as they arrive on the wire. Everything is optional
/// and string-typed so malformed values degrade to defaults instead of
/// rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct RawFireQuery {
    pub dt: Option<String>,
    pub dr: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub all: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FireQuery {
    pub date: String,
    pub day_range: u32,
    pub time_range: Option<(String, String)>,
    pub sort: String,
    pub page: u32,
    pub limit: u32,
    pub all: bool,
}

impl FireQuery {
    /// Lenient parse: absent or malformed fields silently take their
    /// defaults. This is deliberate policy for the dashboard client.
    pub fn from_raw(raw: RawFireQuery) -> Self {
        let time_range = match (raw.start, raw.end) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                Some((start, end))
            }
            _ => None,
        };

        Self {
            date: raw
                .dt
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string()),
            day_range: raw.dr.and_then(|v| v.parse().ok()).unwrap_or(1),
            time_range,
            sort: raw.sort.filter(|s| !s.is_empty()).unwrap_or_else(|| "sensor".to_string()),
            page: raw.page.and_then(|v| v.parse().ok()).unwrap_or(1).max(1),
            limit: raw.limit.and_then(|v| v.parse().ok()).unwrap_or(25),
            all: raw.all.as_deref() == Some("true"),
        }
    }
}

/// Resolved once per request, before any slicing happens.
enum ListMode {
    All,
    Paged { page: u32, limit: u32 },
}

impl ListMode {
    fn from_query(query: &FireQuery) -> Self {
        if query.all {
            ListMode::All
        } else {
            ListMode::Paged {
                page: query.page,
                limit: query.limit,
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimeRangeMeta {
    pub inicio: String,
    pub fim: String,
}

#[derive(Debug, Serialize)]
pub struct SearchParams {
    pub data: String,
    #[serde(rename = "diasConsiderados")]
    pub dias_considerados: u32,
    pub ordenacao: String,
    #[serde(rename = "intervaloHoras", skip_serializing_if = "Option::is_none")]
    pub intervalo_horas: Option<TimeRangeMeta>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    #[serde(rename = "paginaAtual")]
    pub pagina_atual: u32,
    #[serde(rename = "itensPorPagina")]
    pub itens_por_pagina: u32,
    #[serde(rename = "totalPaginas")]
    pub total_paginas: usize,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    #[serde(rename = "parametrosBusca")]
    pub parametros_busca: SearchParams,
    #[serde(rename = "timestampConsulta")]
    pub timestamp_consulta: String,
    #[serde(rename = "totalFocos")]
    pub total_focos: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paginacao: Option<Pagination>,
}

#[derive(Debug, Serialize)]
pub struct PageResult {
    pub metadados: Metadata,
    pub dados: Vec<HotspotRecord>,
}

#[derive(Debug, Serialize)]
pub struct LocatedResult {
    pub metadados: Metadata,
    #[serde(rename = "firesWithLocation")]
    pub fires_with_location: Vec<EnrichedHotspot>,
}

/// Single entry point for fire listings: fetch through the cache and
/// in-flight layers, route by payload shape, sort, then page or return
/// the bounded full set with response metadata.
pub struct FireService<P, G> {
    provider: P,
    enricher: LocationEnricher<G>,
    cache: Arc<CacheService>,
    inflight: InFlightRegistry<Result<Value, Arc<ProviderError>>>,
    sources: Vec<String>,
    area: String,
    max_all_records: usize,
}

impl<P: HotspotProvider, G: ReverseGeocode> FireService<P, G> {
    pub fn new(
        provider: P,
        enricher: LocationEnricher<G>,
        cache: Arc<CacheService>,
        sources: Vec<String>,
        area: String,
        max_all_records: usize,
    ) -> Self {
        Self {
            provider,
            enricher,
            cache,
            inflight: InFlightRegistry::new(),
            sources,
            area,
            max_all_records,
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Fetch the raw payload for one source, deduplicating concurrent
    /// identical fetches and caching the settled result.
    async fn fetch_source(&self, source: &str, query: &FireQuery) -> Result<Value, FireServiceError> {
        let key = cache::area_key(source, &self.area, query.day_range, &query.date);

        if let Some(hit) = self.cache.get_fires(&key) {
            tracing::debug!("cache hit for {}", key);
            return Ok(hit);
        }

        let fetch = async {
            self.provider
                .fetch_area(source, query.day_range, &query.date)
                .await
                .map_err(Arc::new)
        };
        let outcome = self
            .inflight
            .get_or_run(&key, fetch)
            .await
            .map_err(|_| FireServiceError::Upstream(Arc::new(ProviderError::Interrupted)))?;
        let payload = outcome.map_err(FireServiceError::Upstream)?;

        self.cache.set_fires(&key, payload.clone());
        Ok(payload)
    }

    /// Fetch, normalize, filter and sort the full record set for a query.
    /// The normalized (pre-sort) listing is cached on top of the raw
    /// per-source payloads; sorting is cheap and happens per request.
    async fn collect_sorted(&self, query: &FireQuery) -> Result<Vec<HotspotRecord>, FireServiceError> {
        let listing_key = cache::listing_key(
            &query.date,
            query.day_range,
            query
                .time_range
                .as_ref()
                .map(|(start, end)| (start.as_str(), end.as_str())),
        );
        if let Some(hit) = self.cache.get_fires(&listing_key) {
            if let Ok(mut records) = serde_json::from_value::<Vec<HotspotRecord>>(hit) {
                format::sort_fires(&mut records, &query.sort);
                return Ok(records);
            }
        }

        let mut records = Vec::new();
        for source in &self.sources {
            let payload = self.fetch_source(source, query).await?;
            // Empty or non-array payloads become an empty list without
            // ever reaching the format router.
            match payload.as_array() {
                Some(rows) if !rows.is_empty() => {
                    records.extend(format::route_by_format(&payload))
                }
                _ => {}
            }
        }

        if let Some((start, end)) = &query.time_range {
            let start = compact_time(start);
            let end = compact_time(end);
            records.retain(|r| r.acq_time >= start && r.acq_time <= end);
        }

        if let Ok(value) = serde_json::to_value(&records) {
            self.cache.set_fires(&listing_key, value);
        }

        format::sort_fires(&mut records, &query.sort);
        Ok(records)
    }

    fn metadata(&self, query: &FireQuery, total: usize, paginacao: Option<Pagination>) -> Metadata {
        Metadata {
            parametros_busca: SearchParams {
                data: query.date.clone(),
                dias_considerados: query.day_range,
                ordenacao: query.sort.clone(),
                intervalo_horas: query.time_range.as_ref().map(|(inicio, fim)| TimeRangeMeta {
                    inicio: inicio.clone(),
                    fim: fim.clone(),
                }),
            },
            timestamp_consulta: Utc::now().to_rfc3339(),
            total_focos: total,
            paginacao,
        }
    }

    pub async fn list_fires(&self, query: &FireQuery) -> Result<PageResult, FireServiceError> {
        let records = self.collect_sorted(query).await?;
        let total = records.len();

        match ListMode::from_query(query) {
            ListMode::All => {
                if total > self.max_all_records {
                    return Err(FireServiceError::OverLimit {
                        count: total,
                        max: self.max_all_records,
                    });
                }
                Ok(PageResult {
                    metadados: self.metadata(query, total, None),
                    dados: records,
                })
            }
            ListMode::Paged { page, limit } => {
                let total_paginas = if limit == 0 {
                    0
                } else {
                    (total + limit as usize - 1) / limit as usize
                };
                let offset = (page as usize - 1) * limit as usize;
                let dados: Vec<HotspotRecord> = records
                    .into_iter()
                    .skip(offset)
                    .take(limit as usize)
                    .collect();

                Ok(PageResult {
                    metadados: self.metadata(
                        query,
                        total,
                        Some(Pagination {
                            pagina_atual: page,
                            itens_por_pagina: limit,
                            total_paginas,
                        }),
                    ),
                    dados,
                })
            }
        }
    }

    /// Full listing with locations attached; always all-mode, still
    /// subject to the all-mode ceiling.
    pub async fn list_all_with_location(
        &self,
        query: &FireQuery,
    ) -> Result<LocatedResult, FireServiceError> {
        let mut query = query.clone();
        query.all = true;

        let records = self.collect_sorted(&query).await?;
        let total = records.len();
        if total > self.max_all_records {
            return Err(FireServiceError::OverLimit {
                count: total,
                max: self.max_all_records,
            });
        }

        let fires_with_location = self.enricher.enrich(records).await?;
        Ok(LocatedResult {
            metadados: self.metadata(&query, total, None),
            fires_with_location,
        })
    }

    // Every parameter that shapes the record set must land in the key,
    // or a time-filtered aggregate could answer a whole-day query.
    fn stats_params(query: &FireQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("dt".to_string(), query.date.clone()),
            ("dr".to_string(), query.day_range.to_string()),
        ];
        if let Some((start, end)) = &query.time_range {
            params.push(("tr".to_string(), format!("{}-{}", start, end)));
        }
        params
    }

    /// Aggregate counts over the normalized record set.
    pub async fn stats(&self, query: &FireQuery) -> Result<Value, FireServiceError> {
        let key = cache::stats_key("general", &Self::stats_params(query));
        if let Some(hit) = self.cache.get_stats(&key) {
            return Ok(hit);
        }

        let records = self.collect_sorted(query).await?;
        let mut by_sensor = serde_json::Map::new();
        let mut day = 0usize;
        let mut night = 0usize;
        let mut max_frp = 0.0f64;
        let mut frp_sum = 0.0f64;
        for record in &records {
            let counter = by_sensor
                .entry(record.satellite.clone())
                .or_insert(json!(0));
            *counter = json!(counter.as_u64().unwrap_or(0) + 1);
            match record.daynight.as_str() {
                "D" => day += 1,
                "N" => night += 1,
                _ => {}
            }
            max_frp = max_frp.max(record.frp);
            frp_sum += record.frp;
        }
        let avg_frp = if records.is_empty() {
            0.0
        } else {
            frp_sum / records.len() as f64
        };

        let stats = json!({
            "totalFocos": records.len(),
            "porSensor": by_sensor,
            "porPeriodo": { "diurno": day, "noturno": night },
            "frp": { "maximo": max_frp, "medio": avg_frp },
            "parametrosBusca": { "data": query.date, "diasConsiderados": query.day_range },
            "timestampConsulta": Utc::now().to_rfc3339(),
        });
        self.cache.set_stats(&key, stats.clone());
        Ok(stats)
    }

    /// Per-day detection counts over a seven day window ending at the
    /// query date.
    pub async fn weekly_stats(&self, query: &FireQuery) -> Result<Value, FireServiceError> {
        let mut query = query.clone();
        query.day_range = 7;

        let key = cache::stats_key("weekly", &Self::stats_params(&query));
        if let Some(hit) = self.cache.get_stats(&key) {
            return Ok(hit);
        }

        let records = self.collect_sorted(&query).await?;
        let mut by_day = std::collections::BTreeMap::new();
        for record in &records {
            *by_day.entry(record.acq_date.clone()).or_insert(0u64) += 1;
        }

        let stats = json!({
            "totalFocos": records.len(),
            "porDia": by_day,
            "parametrosBusca": { "data": query.date, "diasConsiderados": 7 },
            "timestampConsulta": Utc::now().to_rfc3339(),
        });
        self.cache.set_stats(&key, stats.clone());
        Ok(stats)
    }
}

// "08:30" and "0830" compare the same.
fn compact_time(time: &str) -> String {
    time.chars().filter(|c| c.is_ascii_digit()).collect()
}
