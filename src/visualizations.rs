use std::{fs, io, path::Path, process::Command};

use ndarray::Array2;
use petgraph::{dot::Dot, graph::Graph};

/// Directed graph of demes with one weighted edge per non-zero off-diagonal migration count.
pub fn graph_from_migration_counts(m: &Array2<usize>) -> Graph<usize, usize> {
    let n = m.nrows();
    let mut g = Graph::<usize, usize>::new();

    let nodes: Vec<_> = (0..n).map(|i| g.add_node(i)).collect();

    for ((from, to), &count) in m.indexed_iter() {
        if from != to && count > 0 {
            g.add_edge(nodes[from], nodes[to], count);
        }
    }

    g
}

pub fn to_dot(g: &Graph<usize, usize>) -> String {
    format!("{:?}", Dot::new(g))
}

pub fn save_graph_dot(g: &Graph<usize, usize>, path: impl AsRef<Path>) -> io::Result<()> {
    fs::write(path, to_dot(g))
}

/// Render a DOT file to PNG with Graphviz `dot`.
pub fn render_png(dot_path: impl AsRef<Path>, png_path: impl AsRef<Path>) -> io::Result<()> {
    let status = Command::new("dot")
        .arg("-Tpng")
        .arg(dot_path.as_ref())
        .arg("-o")
        .arg(png_path.as_ref())
        .status()?;

    if !status.success() {
        return Err(io::Error::other(format!("graphviz exited with {status}")));
    }

    Ok(())
}

#[test]
fn test_graph_skips_self_and_empty_edges() {
    let m = Array2::from_shape_vec((3, 3), vec![5, 2, 0, 0, 7, 1, 3, 0, 9]).unwrap();
    let g = graph_from_migration_counts(&m);

    assert_eq!(g.node_count(), 3);
    assert_eq!(g.edge_count(), 3);
    let mut weights: Vec<_> = g.edge_weights().copied().collect();
    weights.sort();
    assert_eq!(weights, vec![1, 2, 3]);
}

#[test]
fn test_dot_output() {
    let m = Array2::from_shape_vec((2, 2), vec![0, 4, 0, 0]).unwrap();
    let dot = to_dot(&graph_from_migration_counts(&m));

    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("0 -> 1"));
    assert!(dot.contains("\"4\""));
}
