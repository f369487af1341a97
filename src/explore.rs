use crate::config::LINK_RELATION;
use crate::graph::GraphStore;
use crate::models::{ArticleView, LinkedArticle};
use crate::store::MappingStore;
use anyhow::Result;
use std::fmt::Write;

/// Looks up an article by name and collects up to `limit` of its outbound links.
///
/// Returns `None` when the name was never ingested.
pub async fn article_view<G: GraphStore>(
    graph: &G,
    store: &MappingStore,
    name: &str,
    limit: usize,
) -> Result<Option<ArticleView>> {
    let Some(id) = store.get_article_id(name)? else {
        return Ok(None);
    };

    let vertex = graph.get_vertex(id).await?;
    let link_count = graph.get_edge_count(id, LINK_RELATION).await?;
    let edges = graph.get_edges(id, LINK_RELATION, limit).await?;

    let targets: Vec<_> = edges.iter().map(|e| e.inbound_id).collect();
    let names = graph.get_names(&targets).await?;

    let links = targets
        .into_iter()
        .map(|id| {
            let name = match names.get(&id) {
                Some(name) => Some(name.clone()),
                None => store.get_article_name(id)?,
            };
            Ok(LinkedArticle { id, name })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(ArticleView {
        name: name.to_string(),
        id,
        vertex,
        link_count,
        links,
    }))
}

pub fn render_text(view: &ArticleView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} (id {})", view.name, view.id);
    match &view.vertex {
        Some(v) => {
            let _ = writeln!(out, "type:  {}", v.vertex_type);
        }
        None => {
            let _ = writeln!(out, "type:  <missing from graph store>");
        }
    }
    let _ = writeln!(out, "links: {}", view.link_count);
    for link in &view.links {
        let _ = writeln!(
            out,
            "  -> {} ({})",
            link.name.as_deref().unwrap_or("<unnamed>"),
            link.id
        );
    }
    if (view.links.len() as u64) < view.link_count {
        let _ = writeln!(out, "  ... {} more", view.link_count - view.links.len() as u64);
    }
    out
}
