//! Qdrant vector database backend.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, point_id::PointIdOptions, value::Kind, Condition,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, ListValue, PointStruct,
    QuantizationType, ScalarQuantizationBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use super::{DistanceMetric, Point, PointPayload, SearchFilter, SearchHit, VectorStore};

/// Connection settings for Qdrant.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant gRPC URL
    pub url: String,

    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        }
    }
}

/// Page size multiplier when part of a path prefix is checked client-side.
const PREFIX_PAGE_FACTOR: usize = 4;

/// Smallest page fetched while paging for a partial path prefix.
const MIN_PREFIX_PAGE: usize = 64;

/// Payload field listing every directory prefix of a point's path, plus the path.
const PATH_PREFIXES_FIELD: &str = "path_prefixes";

/// [`VectorStore`] backed by a Qdrant server.
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a client. No request is made until the first operation.
    pub fn connect(config: &QdrantConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url).skip_compatibility_check();

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder.build().context("Failed to connect to Qdrant")?;
        info!("Using Qdrant at {}", config.url);

        Ok(Self { client })
    }

    async fn search_page(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        offset: usize,
        filter: Option<Filter>,
    ) -> Result<Vec<SearchHit>> {
        let mut search_builder = SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64)
            .offset(offset as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            search_builder = search_builder.filter(filter);
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .context("Failed to search points")?;

        Ok(results
            .result
            .into_iter()
            .map(|p| {
                let id = p
                    .id
                    .and_then(|id| id.point_id_options)
                    .map(|options| match options {
                        PointIdOptions::Uuid(u) => u,
                        PointIdOptions::Num(n) => n.to_string(),
                    })
                    .unwrap_or_default();

                SearchHit {
                    id,
                    score: p.score,
                    payload: qdrant_map_to_payload(&p.payload),
                }
            })
            .collect())
    }
}

fn to_qdrant_distance(distance: DistanceMetric) -> Distance {
    match distance {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
        DistanceMetric::Euclid => Distance::Euclid,
    }
}

/// `a/b/c.md` -> `["a/", "a/b/", "a/b/c.md"]`.
fn path_prefixes(path: &str) -> Vec<String> {
    let mut prefixes: Vec<String> = path
        .match_indices('/')
        .map(|(i, _)| path[..=i].to_string())
        .collect();
    prefixes.push(path.to_string());
    prefixes
}

/// The longest directory prefix of `prefix` (up to and including the last
/// `/`), which the server can match exactly against [`PATH_PREFIXES_FIELD`].
fn directory_part(prefix: &str) -> Option<&str> {
    prefix.rfind('/').map(|i| &prefix[..=i])
}

/// Whether results still need a client-side `starts_with` check.
fn prefix_needs_paging(prefix: &str) -> bool {
    !prefix.is_empty() && directory_part(prefix) != Some(prefix)
}

/// Server-side part of a filter. A path prefix is matched on its directory
/// part; any remainder after the last `/` is checked on the results.
fn to_qdrant_filter(filter: &SearchFilter) -> Option<Filter> {
    let mut conditions: Vec<Condition> = Vec::new();

    if let Some(directory) = filter.path_prefix.as_deref().and_then(directory_part) {
        conditions.push(Condition::matches(PATH_PREFIXES_FIELD, directory.to_string()));
    }

    if let Some(language) = &filter.language {
        conditions.push(Condition::matches("language", language.clone()));
    }

    if !filter.symbol_types.is_empty() {
        let type_conditions: Vec<Condition> = filter
            .symbol_types
            .iter()
            .map(|t| Condition::matches("symbol_type", t.as_str().to_string()))
            .collect();
        conditions.push(Condition {
            condition_one_of: Some(ConditionOneOf::Filter(Filter::should(type_conditions))),
        });
    }

    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
        distance: DistanceMetric,
    ) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .context("Failed to list Qdrant collections")?;
        let exists = collections.collections.iter().any(|c| c.name == collection);

        if exists {
            debug!("Collection {} already exists", collection);
            return Ok(());
        }

        info!(
            "Creating collection: {} with {} dimensions",
            collection, dimensions
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(
                        dimensions as u64,
                        to_qdrant_distance(distance),
                    ))
                    .quantization_config(
                        ScalarQuantizationBuilder::default()
                            .r#type(QuantizationType::Int8.into())
                            .quantile(0.99)
                            .always_ram(true),
                    ),
            )
            .await
            .with_context(|| format!("Failed to create collection {collection}"))?;

        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            debug!("No points to upsert");
            return Ok(());
        }

        debug!("Upserting {} points into {}", points.len(), collection);

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(p.id, p.vector, payload_to_qdrant_map(&p.payload)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points).wait(true))
            .await
            .context("Failed to upsert points")?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let server_filter = filter.and_then(to_qdrant_filter);
        let partial = filter
            .and_then(|f| f.path_prefix.as_deref())
            .filter(|p| prefix_needs_paging(p));

        let Some(prefix) = partial else {
            debug!("Searching {} for {} similar vectors", collection, limit);
            return self
                .search_page(collection, &vector, limit, 0, server_filter)
                .await;
        };

        // page through results until enough paths match the prefix
        let page = limit
            .saturating_mul(PREFIX_PAGE_FACTOR)
            .max(MIN_PREFIX_PAGE);
        let mut offset = 0;
        let mut hits = Vec::with_capacity(limit);

        while hits.len() < limit {
            let batch = self
                .search_page(collection, &vector, page, offset, server_filter.clone())
                .await?;
            let exhausted = batch.len() < page;
            offset += batch.len();

            hits.extend(
                batch
                    .into_iter()
                    .filter(|hit| hit.payload.path.starts_with(prefix)),
            );
            if exhausted {
                break;
            }
        }
        hits.truncate(limit);

        debug!(prefix, scanned = offset, "Found {} search hits", hits.len());
        Ok(hits)
    }

    async fn delete_by_path(&self, collection: &str, path: &str) -> Result<()> {
        debug!("Deleting points of {} from {}", path, collection);

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(Filter::must([Condition::matches("path", path.to_string())]))
                    .wait(true),
            )
            .await
            .with_context(|| format!("Failed to delete points for {path}"))?;

        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .context("Failed to get collection info")?;

        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        info!("Deleting collection: {}", collection);

        self.client
            .delete_collection(collection)
            .await
            .context("Failed to delete collection")?;

        Ok(())
    }
}

/// Convert a payload to Qdrant's map representation.
fn payload_to_qdrant_map(payload: &PointPayload) -> HashMap<String, Value> {
    let mut map = HashMap::new();

    map.insert("chunk_id".to_string(), Value::from(payload.chunk_id.clone()));
    map.insert("path".to_string(), Value::from(payload.path.clone()));
    map.insert(
        PATH_PREFIXES_FIELD.to_string(),
        Value {
            kind: Some(Kind::ListValue(ListValue {
                values: path_prefixes(&payload.path)
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            })),
        },
    );
    map.insert("section".to_string(), Value::from(payload.section.clone()));
    map.insert("content".to_string(), Value::from(payload.content.clone()));
    map.insert("start_line".to_string(), Value::from(payload.start_line as i64));
    map.insert("end_line".to_string(), Value::from(payload.end_line as i64));

    if let Some(ref language) = payload.language {
        map.insert("language".to_string(), Value::from(language.clone()));
    }
    if let Some(ref symbol_type) = payload.symbol_type {
        map.insert("symbol_type".to_string(), Value::from(symbol_type.clone()));
    }

    map
}

/// Convert Qdrant's map representation back to a payload.
fn qdrant_map_to_payload(map: &HashMap<String, Value>) -> PointPayload {
    PointPayload {
        chunk_id: extract_string(map.get("chunk_id")).unwrap_or_default(),
        path: extract_string(map.get("path")).unwrap_or_default(),
        section: extract_string(map.get("section")).unwrap_or_default(),
        content: extract_string(map.get("content")).unwrap_or_default(),
        start_line: extract_integer(map.get("start_line")) as usize,
        end_line: extract_integer(map.get("end_line")) as usize,
        language: extract_string(map.get("language")),
        symbol_type: extract_string(map.get("symbol_type")),
    }
}

fn extract_string(value: Option<&Value>) -> Option<String> {
    match value.and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn extract_integer(value: Option<&Value>) -> i64 {
    match value.and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => (*i).max(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::SymbolType;

    #[test]
    fn test_qdrant_config_default() {
        let config = QdrantConfig::default();
        assert_eq!(config.url, "http://localhost:6334");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_payload_to_qdrant_map_skips_missing_code_fields() {
        let payload = PointPayload {
            chunk_id: "guide.md#Intro@1".to_string(),
            path: "guide.md".to_string(),
            section: "Intro".to_string(),
            content: "Hello".to_string(),
            start_line: 1,
            end_line: 4,
            language: None,
            symbol_type: None,
        };

        let map = payload_to_qdrant_map(&payload);
        assert!(map.contains_key("path"));
        assert!(map.contains_key("content"));
        assert!(!map.contains_key("language"));
        assert!(!map.contains_key("symbol_type"));
        assert_eq!(qdrant_map_to_payload(&map), payload);
    }

    #[test]
    fn test_code_payload_survives_conversion() {
        let payload = PointPayload {
            chunk_id: "app/src/lib.rs#run@10".to_string(),
            path: "app/src/lib.rs".to_string(),
            section: "run".to_string(),
            content: "fn run() {}".to_string(),
            start_line: 10,
            end_line: 12,
            language: Some("rust".to_string()),
            symbol_type: Some("function".to_string()),
        };
        assert_eq!(qdrant_map_to_payload(&payload_to_qdrant_map(&payload)), payload);
    }

    #[test]
    fn test_empty_map_gives_defaults() {
        let payload = qdrant_map_to_payload(&HashMap::new());
        assert!(payload.path.is_empty());
        assert_eq!(payload.start_line, 0);
        assert!(payload.language.is_none());
    }

    #[test]
    fn test_filter_conversion() {
        assert!(to_qdrant_filter(&SearchFilter::new()).is_none());
        // a bare file-name prefix has no directory part for the server
        assert!(to_qdrant_filter(&SearchFilter::new().with_path_prefix("READ")).is_none());

        let filter = SearchFilter::new()
            .with_language("go")
            .with_symbol_types(vec![SymbolType::Function, SymbolType::Type]);
        let converted = to_qdrant_filter(&filter).unwrap();
        assert_eq!(converted.must.len(), 2);
    }

    #[test]
    fn test_distance_mapping() {
        assert_eq!(to_qdrant_distance(DistanceMetric::Cosine), Distance::Cosine);
        assert_eq!(to_qdrant_distance(DistanceMetric::Euclid), Distance::Euclid);
    }

    #[test]
    fn test_path_prefixes_cover_every_directory() {
        assert_eq!(
            path_prefixes("api/v1/handlers.rs"),
            vec!["api/", "api/v1/", "api/v1/handlers.rs"]
        );
        assert_eq!(path_prefixes("README.md"), vec!["README.md"]);

        let payload = PointPayload {
            path: "api/handlers.rs".to_string(),
            ..Default::default()
        };
        let map = payload_to_qdrant_map(&payload);
        match map.get(PATH_PREFIXES_FIELD).and_then(|v| v.kind.as_ref()) {
            Some(Kind::ListValue(list)) => assert_eq!(list.values.len(), 2),
            other => panic!("expected a list, got {other:?}"),
        }
        // the extra field does not leak into the payload
        assert_eq!(qdrant_map_to_payload(&map), payload);
    }

    #[test]
    fn test_directory_prefix_is_filtered_on_server() {
        let filter = SearchFilter::new().with_path_prefix("api/");
        let converted = to_qdrant_filter(&filter).unwrap();
        assert_eq!(converted.must.len(), 1);
        assert!(!prefix_needs_paging("api/"));
    }

    #[test]
    fn test_partial_prefix_narrows_to_directory_and_pages() {
        assert_eq!(directory_part("api/hand"), Some("api/"));
        assert_eq!(directory_part("hand"), None);
        assert!(prefix_needs_paging("api/hand"));
        assert!(prefix_needs_paging("hand"));
        assert!(!prefix_needs_paging(""));

        let filter = SearchFilter::new()
            .with_path_prefix("web/src/au")
            .with_language("typescript");
        let converted = to_qdrant_filter(&filter).unwrap();
        assert_eq!(converted.must.len(), 2);
    }
}
