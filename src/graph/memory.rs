use super::{validate_identifier, GraphStore};
use crate::models::{ArticleId, Edge, EdgeKey, Vertex};
use anyhow::{bail, Result};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    next_id: ArticleId,
    vertices: FxHashMap<ArticleId, Vertex>,
    names: FxHashMap<ArticleId, String>,
    edges: Vec<Edge>,
}

/// In-process graph store used for dry runs and tests.
///
/// Records how many vertex-creation transactions it has served so callers can
/// assert that already-known articles never reach the store.
#[derive(Default)]
pub struct MemoryGraph {
    state: Mutex<State>,
    vertex_calls: AtomicU64,
    edge_calls: AtomicU64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_calls(&self) -> u64 {
        self.vertex_calls.load(Ordering::Relaxed)
    }

    pub fn edge_calls(&self) -> u64 {
        self.edge_calls.load(Ordering::Relaxed)
    }

    pub fn vertex_count(&self) -> usize {
        self.lock().vertices.len()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.lock().edges.clone()
    }

    pub fn name_of(&self, id: ArticleId) -> Option<String> {
        self.lock().names.get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // State is never left half-updated, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GraphStore for MemoryGraph {
    async fn create_vertices(&self, vertex_type: &str, count: usize) -> Result<Vec<ArticleId>> {
        validate_identifier("vertex type", vertex_type)?;
        self.vertex_calls.fetch_add(1, Ordering::Relaxed);

        let mut state = self.lock();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = state.next_id;
            state.next_id += 1;
            state.vertices.insert(
                id,
                Vertex {
                    id,
                    vertex_type: vertex_type.to_string(),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn set_names(&self, named: &[(String, ArticleId)]) -> Result<()> {
        let mut state = self.lock();
        for (name, id) in named {
            if !state.vertices.contains_key(id) {
                bail!("Cannot name missing vertex {id}");
            }
            state.names.insert(*id, name.clone());
        }
        Ok(())
    }

    async fn get_names(&self, ids: &[ArticleId]) -> Result<FxHashMap<ArticleId, String>> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.names.get(id).map(|name| (*id, name.clone())))
            .collect())
    }

    async fn create_edges(&self, edges: &[EdgeKey], weight: f64) -> Result<usize> {
        self.edge_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();

        // Validate everything first so the transaction is all-or-nothing.
        for key in edges {
            validate_identifier("relation", &key.relation)?;
            for id in [key.outbound_id, key.inbound_id] {
                if !state.vertices.contains_key(&id) {
                    bail!("Edge endpoint {id} does not exist");
                }
            }
        }

        state.edges.extend(edges.iter().map(|key| Edge {
            outbound_id: key.outbound_id,
            relation: key.relation.clone(),
            inbound_id: key.inbound_id,
            weight,
        }));
        Ok(edges.len())
    }

    async fn get_vertex(&self, id: ArticleId) -> Result<Option<Vertex>> {
        Ok(self.lock().vertices.get(&id).cloned())
    }

    async fn get_edge_count(&self, id: ArticleId, relation: &str) -> Result<u64> {
        let state = self.lock();
        Ok(state
            .edges
            .iter()
            .filter(|e| e.outbound_id == id && e.relation == relation)
            .count() as u64)
    }

    async fn get_edges(&self, id: ArticleId, relation: &str, limit: usize) -> Result<Vec<Edge>> {
        let state = self.lock();
        Ok(state
            .edges
            .iter()
            .filter(|e| e.outbound_id == id && e.relation == relation)
            .take(limit)
            .cloned()
            .collect())
    }
}
