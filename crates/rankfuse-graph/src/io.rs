//! Line-based persistence for labeled fusion graphs.
//!
//! Layout, best read top to bottom:
//!
//! ```text
//! <id>
//! <label>(\t<label>)*          (blank line when the record has no labels)
//! <numVertices>\t<numEdges>\t<0|1>[\tC]
//! <vertex>\t<weight>           (numVertices lines)
//! <source>\t<target>\t<weight>\t<label>
//! ```
//!
//! The trailing `C` on the header line marks the compressed edge layout:
//! one line per source vertex with outgoing edges, holding every
//! `(target, weight, label)` triple of that source.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use rankfuse_core::{format_weight, FuseError, FuseResult, ItemId};

use crate::graph::FusionGraph;

/// Extension used for persisted graph records.
pub const GRAPH_EXT: &str = "graph";

/// A persisted fusion graph: the query id it was built for, the query's
/// ground-truth labels (possibly empty), and the graph itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRecord {
    pub id: ItemId,
    pub labels: Vec<String>,
    pub graph: FusionGraph,
}

/// File under `dir` holding the record for `id`.
#[must_use]
pub fn graph_file(dir: &Path, id: ItemId) -> PathBuf {
    dir.join(format!("{id}.{GRAPH_EXT}"))
}

/// Recover the item id from a record path produced by [`graph_file`].
#[must_use]
pub fn id_from_path(path: &Path) -> Option<ItemId> {
    path.file_stem()?.to_str()?.parse().ok()
}

impl GraphRecord {
    #[must_use]
    pub fn new(id: ItemId, labels: Vec<String>, graph: FusionGraph) -> Self {
        Self { id, labels, graph }
    }

    /// Write the record to `path`, with the compressed edge layout when
    /// `compress`. Refuses to persist non-finite weights.
    pub fn save(&self, path: &Path, compress: bool) -> FuseResult<()> {
        let graph = &self.graph;
        let mut out = String::new();
        out.push_str(&self.id.to_string());
        out.push('\n');
        out.push_str(&self.labels.join("\t"));
        out.push('\n');
        out.push_str(&format!(
            "{}\t{}\t{}{}\n",
            graph.vertex_count(),
            graph.edge_count(),
            u8::from(graph.is_weighted()),
            if compress { "\tC" } else { "" },
        ));

        for id in graph.vertex_ids() {
            let weight = graph.vertex_weight(id).unwrap_or(1.0);
            if !weight.is_finite() {
                return Err(FuseError::CorruptFile {
                    path: path.to_path_buf(),
                    detail: format!("refusing to write non-finite weight for vertex {id}"),
                });
            }
            out.push_str(&format!("{id}\t{}\n", format_weight(weight)));
        }

        if compress {
            for source in graph.vertex_ids() {
                let edges = graph.outgoing(source);
                if edges.is_empty() {
                    continue;
                }
                out.push_str(&source.to_string());
                for edge in edges {
                    let weight = self.checked_edge_weight(path, source, edge.target, &edge.label)?;
                    out.push_str(&format!(
                        "\t{}\t{}\t{}",
                        edge.target,
                        format_weight(weight),
                        edge.label
                    ));
                }
                out.push('\n');
            }
        } else {
            for (source, edge) in graph.edges() {
                let weight = self.checked_edge_weight(path, source, edge.target, &edge.label)?;
                out.push_str(&format!(
                    "{source}\t{}\t{}\t{}\n",
                    edge.target,
                    format_weight(weight),
                    edge.label
                ));
            }
        }

        fs::write(path, out)?;
        debug!(
            target: "rankfuse.graph",
            id = self.id,
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            compress,
            "graph record written"
        );
        Ok(())
    }

    fn checked_edge_weight(
        &self,
        path: &Path,
        source: ItemId,
        target: ItemId,
        label: &str,
    ) -> FuseResult<f64> {
        let weight = self
            .graph
            .edge_weight(source, target, label)
            .unwrap_or(1.0);
        if !weight.is_finite() {
            return Err(FuseError::CorruptFile {
                path: path.to_path_buf(),
                detail: format!("refusing to write non-finite weight for edge {source}->{target}"),
            });
        }
        Ok(weight)
    }

    /// Read a record written by [`GraphRecord::save`], either edge layout.
    pub fn load(path: &Path) -> FuseResult<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut lines = reader.lines().enumerate();

        let mut next_line = move || -> FuseResult<(usize, String)> {
            match lines.next() {
                Some((index, line)) => Ok((index + 1, line?)),
                None => Err(FuseError::CorruptFile {
                    path: path.to_path_buf(),
                    detail: "graph record truncated".into(),
                }),
            }
        };
        let malformed = |line: usize, detail: String| FuseError::MalformedLine {
            path: path.to_path_buf(),
            line,
            detail,
        };

        let (line_no, raw) = next_line()?;
        let id: ItemId = raw
            .trim()
            .parse()
            .map_err(|_| malformed(line_no, format!("expected item id, got {raw:?}")))?;

        let (_, raw) = next_line()?;
        let labels: Vec<String> = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('\t').map(str::to_string).collect()
        };

        let (line_no, raw) = next_line()?;
        let header: Vec<&str> = raw.split('\t').collect();
        if header.len() < 3 {
            return Err(malformed(
                line_no,
                format!("expected vertex/edge counts and weighted flag, got {raw:?}"),
            ));
        }
        let num_vertices: usize = header[0]
            .parse()
            .map_err(|_| malformed(line_no, format!("bad vertex count {:?}", header[0])))?;
        let num_edges: usize = header[1]
            .parse()
            .map_err(|_| malformed(line_no, format!("bad edge count {:?}", header[1])))?;
        let weighted = match header[2] {
            "0" => false,
            "1" => true,
            other => {
                return Err(malformed(line_no, format!("bad weighted flag {other:?}")));
            }
        };
        let compressed = header.get(3) == Some(&"C");

        let mut graph = FusionGraph::new(weighted);
        for _ in 0..num_vertices {
            let (line_no, raw) = next_line()?;
            let mut fields = raw.split('\t');
            let (Some(name), Some(weight)) = (fields.next(), fields.next()) else {
                return Err(malformed(line_no, format!("bad vertex line {raw:?}")));
            };
            let vertex: ItemId = name
                .parse()
                .map_err(|_| malformed(line_no, format!("bad vertex id {name:?}")))?;
            let weight: f64 = weight
                .parse()
                .map_err(|_| malformed(line_no, format!("bad vertex weight {weight:?}")))?;
            graph.add_vertex(vertex, weight);
        }

        let mut seen_edges = 0usize;
        while seen_edges < num_edges {
            let (line_no, raw) = next_line()?;
            let fields: Vec<&str> = raw.split('\t').collect();
            if compressed {
                if fields.len() < 4 || (fields.len() - 1) % 3 != 0 {
                    return Err(malformed(line_no, format!("bad compressed edge line {raw:?}")));
                }
                let source: ItemId = fields[0]
                    .parse()
                    .map_err(|_| malformed(line_no, format!("bad source id {:?}", fields[0])))?;
                for triple in fields[1..].chunks_exact(3) {
                    parse_edge(&mut graph, source, triple[0], triple[1], triple[2])
                        .map_err(|detail| malformed(line_no, detail))?;
                    seen_edges += 1;
                }
            } else {
                if fields.len() != 4 {
                    return Err(malformed(line_no, format!("bad edge line {raw:?}")));
                }
                let source: ItemId = fields[0]
                    .parse()
                    .map_err(|_| malformed(line_no, format!("bad source id {:?}", fields[0])))?;
                parse_edge(&mut graph, source, fields[1], fields[2], fields[3])
                    .map_err(|detail| malformed(line_no, detail))?;
                seen_edges += 1;
            }
        }
        if seen_edges != num_edges {
            return Err(FuseError::CorruptFile {
                path: path.to_path_buf(),
                detail: format!("header declares {num_edges} edges, found {seen_edges}"),
            });
        }

        Ok(Self { id, labels, graph })
    }
}

fn parse_edge(
    graph: &mut FusionGraph,
    source: ItemId,
    target: &str,
    weight: &str,
    label: &str,
) -> Result<(), String> {
    let target: ItemId = target
        .parse()
        .map_err(|_| format!("bad target id {target:?}"))?;
    let weight: f64 = weight
        .parse()
        .map_err(|_| format!("bad edge weight {weight:?}"))?;
    graph.add_edge(source, target, label, weight);
    Ok(())
}
