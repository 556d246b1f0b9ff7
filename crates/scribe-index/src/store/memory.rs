//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Search is brute force over every point in the collection.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{DistanceMetric, Point, PointPayload, SearchFilter, SearchHit, VectorStore};
use crate::embeddings::cosine_similarity;

struct Collection {
    dimensions: usize,
    distance: DistanceMetric,
    points: BTreeMap<String, Point>,
}

/// Vector store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads of every point in `collection`, ordered by point id.
    pub async fn payloads(&self, collection: &str) -> Vec<PointPayload> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.values().map(|p| p.payload.clone()).collect())
            .unwrap_or_default()
    }
}

fn score(distance: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        DistanceMetric::Euclid => {
            let d: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            1.0 / (1.0 + d.sqrt())
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
        distance: DistanceMetric,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(collection) {
            if existing.dimensions != dimensions {
                bail!(
                    "collection {} has {} dimensions, requested {}",
                    collection,
                    existing.dimensions,
                    dimensions
                );
            }
            return Ok(());
        }

        debug!("Creating in-memory collection {}", collection);
        collections.insert(
            collection.to_string(),
            Collection {
                dimensions,
                distance,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("collection {} does not exist", collection))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != target.dimensions) {
            bail!(
                "point {} has {} dimensions, collection {} expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                target.dimensions
            );
        }

        for point in points {
            target.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| anyhow!("collection {} does not exist", collection))?;

        let mut hits: Vec<SearchHit> = source
            .points
            .values()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: score(source.distance, &vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_path(&self, collection: &str, path: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(target) = collections.get_mut(collection) {
            target.points.retain(|_, p| p.payload.path != path);
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}
