use super::{validate_identifier, GraphStore};
use crate::models::{ArticleId, Credentials, Edge, EdgeKey, Vertex};
use crate::server::ServerGuard;
use anyhow::{bail, Context, Result};
use neo4rs::{query, Graph, Row};
use rustc_hash::FxHashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Names are the only vertex property this pipeline writes, through this script.
const SET_NAMES_SCRIPT: &str = "UNWIND range(0, size($ids) - 1) AS i
MATCH (v) WHERE id(v) = $ids[i]
SET v.name = $names[i]";

const GET_NAMES_SCRIPT: &str = "MATCH (v) WHERE id(v) IN $ids AND v.name IS NOT NULL
RETURN id(v) AS id, v.name AS name";

const GET_VERTEX: &str = "MATCH (v) WHERE id(v) = $id RETURN id(v) AS id, labels(v)[0] AS type";

pub struct Neo4jConfig {
    pub uri: String,
    pub credentials: Credentials,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Graph store backed by Neo4j over Bolt.
///
/// Every request runs under `request_timeout`; an expired timeout is returned
/// as an error and never retried here.
pub struct Neo4jGraph {
    graph: Graph,
    timeout: Duration,
}

impl Neo4jGraph {
    /// Connects and waits until the server answers a probe query.
    ///
    /// Between attempts the managed server process (if any) is checked, so a
    /// crashed server fails the run instead of burning the retry budget.
    pub async fn connect(config: &Neo4jConfig, server: &mut ServerGuard) -> Result<Self> {
        let user = &config.credentials.id;
        let password = &config.credentials.secret;

        for attempt in 1..=config.max_retries {
            let probe = match Graph::new(&config.uri, user, password) {
                Ok(graph) => {
                    match tokio::time::timeout(config.request_timeout, graph.run(query("RETURN 1;")))
                        .await
                    {
                        Ok(Ok(_)) => return Ok(Self::from_graph(graph, config.request_timeout)),
                        Ok(Err(e)) => e.to_string(),
                        Err(_) => "probe timed out".to_string(),
                    }
                }
                Err(e) => e.to_string(),
            };

            server.ensure_running()?;
            if attempt < config.max_retries {
                info!(attempt, error = %probe, "Graph store not ready at {}, retrying", config.uri);
                tokio::time::sleep(config.retry_delay).await;
            } else {
                bail!(
                    "Cannot connect to graph store at {} after {} attempts: {}",
                    config.uri,
                    config.max_retries,
                    probe
                );
            }
        }

        bail!("Cannot connect to graph store at {}", config.uri);
    }

    pub fn from_graph(graph: Graph, timeout: Duration) -> Self {
        Self { graph, timeout }
    }

    async fn timed<T, F>(&self, what: &str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_timeout(self.timeout, what, request).await
    }

    async fn collect_rows(&self, what: &str, q: neo4rs::Query) -> Result<Vec<Row>> {
        self.timed(what, async {
            let mut stream = self.graph.execute(q).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, anyhow::Error>(rows)
        })
        .await
    }
}

/// Runs `request` under `timeout`. An expired timeout is an error, never a retry.
async fn with_timeout<T, F>(timeout: Duration, what: &str, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result.with_context(|| format!("Graph store request failed: {what}")),
        Err(_) => bail!(
            "Graph store request timed out after {}ms: {what}",
            timeout.as_millis()
        ),
    }
}

/// Puts `(request index, id)` rows back in request order; every index in
/// `0..count` must appear exactly once.
fn ids_in_request_order(mut indexed: Vec<(i64, ArticleId)>, count: usize) -> Result<Vec<ArticleId>> {
    if indexed.len() != count {
        bail!("Requested {count} vertices but the store returned {}", indexed.len());
    }
    indexed.sort_unstable_by_key(|(i, _)| *i);
    for (expected, (i, _)) in indexed.iter().enumerate() {
        if *i != expected as i64 {
            bail!("Vertex result has index {i} where {expected} was expected");
        }
    }
    Ok(indexed.into_iter().map(|(_, id)| id).collect())
}

fn check_edge_count(created: usize, requested: usize) -> Result<()> {
    if created != requested {
        bail!("Only {created} of {requested} edges matched existing vertices; transaction rolled back");
    }
    Ok(())
}

impl GraphStore for Neo4jGraph {
    async fn create_vertices(&self, vertex_type: &str, count: usize) -> Result<Vec<ArticleId>> {
        validate_identifier("vertex type", vertex_type)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let cypher =
            format!("UNWIND range(0, $count - 1) AS i CREATE (v:`{vertex_type}`) RETURN i, id(v) AS id");
        let rows = self
            .timed("create vertices", async {
                let mut txn = self.graph.start_txn().await?;
                let mut stream = txn
                    .execute(query(&cypher).param("count", count as i64))
                    .await?;
                let mut rows = Vec::with_capacity(count);
                while let Some(row) = stream.next(txn.handle()).await? {
                    rows.push(row);
                }
                txn.commit().await?;
                Ok::<_, anyhow::Error>(rows)
            })
            .await?;

        let indexed = rows
            .iter()
            .map(|row| {
                let i: i64 = row.get("i").context("Missing 'i' in vertex result")?;
                let id: i64 = row.get("id").context("Missing 'id' in vertex result")?;
                Ok((i, id))
            })
            .collect::<Result<Vec<_>>>()?;

        let ids = ids_in_request_order(indexed, count)?;
        debug!(count, "Vertices created");
        Ok(ids)
    }

    async fn set_names(&self, named: &[(String, ArticleId)]) -> Result<()> {
        if named.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = named.iter().map(|(_, id)| *id).collect();
        let names: Vec<String> = named.iter().map(|(name, _)| name.clone()).collect();

        self.timed("set article names", async {
            self.graph
                .run(query(SET_NAMES_SCRIPT).param("ids", ids).param("names", names))
                .await?;
            Ok::<_, anyhow::Error>(())
        })
        .await
    }

    async fn get_names(&self, ids: &[ArticleId]) -> Result<FxHashMap<ArticleId, String>> {
        if ids.is_empty() {
            return Ok(FxHashMap::default());
        }
        let rows = self
            .collect_rows(
                "get article names",
                query(GET_NAMES_SCRIPT).param("ids", ids.to_vec()),
            )
            .await?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.get("id").context("Missing 'id' in name result")?;
                let name: String = row.get("name").context("Missing 'name' in name result")?;
                Ok((id, name))
            })
            .collect()
    }

    async fn create_edges(&self, edges: &[EdgeKey], weight: f64) -> Result<usize> {
        if edges.is_empty() {
            return Ok(0);
        }

        let mut by_relation: FxHashMap<&str, (Vec<i64>, Vec<i64>)> = FxHashMap::default();
        for key in edges {
            validate_identifier("relation", &key.relation)?;
            let (sources, targets) = by_relation.entry(key.relation.as_str()).or_default();
            sources.push(key.outbound_id);
            targets.push(key.inbound_id);
        }

        self.timed("create edges", async {
            let mut txn = self.graph.start_txn().await?;
            let mut created = 0usize;

            for (relation, (sources, targets)) in by_relation {
                let cypher = format!(
                    "UNWIND range(0, size($sources) - 1) AS i
MATCH (a) WHERE id(a) = $sources[i]
MATCH (b) WHERE id(b) = $targets[i]
CREATE (a)-[:`{relation}` {{weight: $weight}}]->(b)
RETURN count(*) AS created"
                );
                let mut stream = txn
                    .execute(
                        query(&cypher)
                            .param("sources", sources)
                            .param("targets", targets)
                            .param("weight", weight),
                    )
                    .await?;
                while let Some(row) = stream.next(txn.handle()).await? {
                    let count: i64 = row.get("created").context("Missing 'created' in edge result")?;
                    created += count as usize;
                }
            }

            if let Err(e) = check_edge_count(created, edges.len()) {
                txn.rollback().await?;
                return Err(e);
            }
            txn.commit().await?;
            Ok::<_, anyhow::Error>(created)
        })
        .await
    }

    async fn get_vertex(&self, id: ArticleId) -> Result<Option<Vertex>> {
        let rows = self
            .collect_rows("get vertex", query(GET_VERTEX).param("id", id))
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let vertex_type: String = row.get("type").context("Missing 'type' in vertex result")?;
        Ok(Some(Vertex { id, vertex_type }))
    }

    async fn get_edge_count(&self, id: ArticleId, relation: &str) -> Result<u64> {
        validate_identifier("relation", relation)?;
        let cypher =
            format!("MATCH (v)-[r:`{relation}`]->() WHERE id(v) = $id RETURN count(r) AS cnt");
        let rows = self
            .collect_rows("get edge count", query(&cypher).param("id", id))
            .await?;
        match rows.first() {
            Some(row) => {
                let count: i64 = row.get("cnt").context("Missing 'cnt' field in result")?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }

    async fn get_edges(&self, id: ArticleId, relation: &str, limit: usize) -> Result<Vec<Edge>> {
        validate_identifier("relation", relation)?;
        let cypher = format!(
            "MATCH (v)-[r:`{relation}`]->(t) WHERE id(v) = $id
RETURN id(t) AS inbound, r.weight AS weight LIMIT $limit"
        );
        let rows = self
            .collect_rows(
                "get edges",
                query(&cypher).param("id", id).param("limit", limit as i64),
            )
            .await?;

        rows.iter()
            .map(|row| {
                let inbound_id: i64 = row.get("inbound").context("Missing 'inbound' in edge result")?;
                let weight: f64 = row.get("weight").context("Missing 'weight' in edge result")?;
                Ok(Edge {
                    outbound_id: id,
                    relation: relation.to_string(),
                    inbound_id,
                    weight,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_timeout_is_an_error() {
        let result: Result<()> =
            with_timeout(Duration::from_millis(10), "stalled", std::future::pending()).await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("timed out"), "{err}");
        assert!(err.contains("stalled"));
    }

    #[tokio::test]
    async fn request_error_is_wrapped() {
        let refused = async { Err::<(), _>(anyhow::anyhow!("refused")) };
        let result = with_timeout(Duration::from_secs(5), "probe", refused).await;
        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Graph store request failed: probe"));
        assert!(err.contains("refused"));
    }

    #[tokio::test]
    async fn fast_request_passes_through() {
        let value = with_timeout(Duration::from_secs(5), "fast", async { Ok::<_, anyhow::Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn ids_come_back_in_request_order() {
        let ids = ids_in_request_order(vec![(2, 30), (0, 10), (1, 20)], 3).unwrap();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn short_vertex_result_is_an_error() {
        assert!(ids_in_request_order(vec![(0, 10), (1, 20)], 3).is_err());
    }

    #[test]
    fn duplicate_vertex_index_is_an_error() {
        assert!(ids_in_request_order(vec![(0, 10), (0, 11), (2, 12)], 3).is_err());
    }

    #[test]
    fn short_edge_count_is_an_error() {
        assert!(check_edge_count(3, 3).is_ok());
        let err = check_edge_count(2, 3).unwrap_err().to_string();
        assert!(err.contains("2 of 3"));
    }
}
