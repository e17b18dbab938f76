//! One-shot job (C6): streams an edge-list file into adjacency state
//! shared with the controller and workers, building the node set,
//! out-link map, and a uniform `1/N` initial rank vector.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use observability_deps::tracing::info;
use search_types::Edge;

use crate::state::GraphState;
use crate::PageRankError;

/// Streams `edges_path` (`source\ttarget` lines, self-edges already
/// rejected by [`Edge::parse_line`]) and writes the resulting graph into
/// `state`. Returns the node count `N`.
pub async fn load(edges_path: &Path, state: &Arc<dyn GraphState>) -> Result<usize, PageRankError> {
    let file = std::fs::File::open(edges_path)?;
    let reader = std::io::BufReader::new(file);

    // Preserve first-seen order so `graph:nodes` positions are stable
    // across a re-run against the same file.
    let mut nodes: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut out_links: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();

    for line in reader.lines() {
        let line = line?;
        let Some(edge) = Edge::parse_line(&line) else {
            continue;
        };
        for id in [&edge.source, &edge.target] {
            if seen.insert(id.clone()) {
                nodes.push(id.clone());
            }
        }
        out_links.entry(edge.source).or_default().push(edge.target);
    }

    let n = nodes.len();
    state.push_nodes(nodes).await?;
    for (id, targets) in out_links {
        state.set_out_links(&id, targets).await?;
    }
    let uniform = if n > 0 { 1.0 / n as f64 } else { 0.0 };
    state.init_ranks_current(uniform).await?;
    state.set_node_count(n).await?;

    info!(node_count = n, "graph loaded");
    Ok(n)
}
