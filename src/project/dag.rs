use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::warn;

use super::Connection;
use crate::error::ToolboxError;

/// One weakly connected component of the project graph
#[derive(Debug, Clone)]
pub struct Dag {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl Dag {
    /// Split items and connections into weakly connected graphs.
    ///
    /// Graphs are ordered by their alphabetically first item name. Connections
    /// to unknown items are ignored.
    pub fn from_project<'a>(
        names: impl IntoIterator<Item = &'a String>,
        connections: &[Connection],
    ) -> Vec<Dag> {
        let names: Vec<&String> = names.into_iter().collect();
        let position: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut edges = Vec::new();
        let mut components = UnionFind::new(names.len());
        for connection in connections {
            match (
                position.get(connection.source()),
                position.get(connection.destination()),
            ) {
                (Some(&a), Some(&b)) => {
                    components.union(a, b);
                    edges.push((a, b));
                }
                _ => warn!(
                    source = connection.source(),
                    destination = connection.destination(),
                    "ignoring connection to unknown item"
                ),
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..names.len() {
            groups.entry(components.find_mut(i)).or_default().push(i);
        }

        let mut dags: Vec<Dag> = groups
            .into_values()
            .map(|members| {
                let member_set: HashSet<usize> = members.iter().copied().collect();
                let mut dag = Dag::empty();
                for &i in &members {
                    dag.add_node(names[i]);
                }
                for &(a, b) in edges.iter().filter(|(a, _)| member_set.contains(a)) {
                    dag.add_edge(names[a], names[b]);
                }
                dag
            })
            .collect();
        dags.sort_by(|a, b| a.node_names().first().cmp(&b.node_names().first()));
        dags
    }

    fn empty() -> Self {
        Self {
            graph: DiGraph::new(),
            indices: HashMap::new(),
        }
    }

    fn add_node(&mut self, name: &str) {
        if !self.indices.contains_key(name) {
            let index = self.graph.add_node(name.to_string());
            self.indices.insert(name.to_string(), index);
        }
    }

    fn add_edge(&mut self, source: &str, destination: &str) {
        let (a, b) = (self.indices[source], self.indices[destination]);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Item names, sorted
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.graph.node_weights().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Items in an order where every item follows its predecessors
    pub fn topological_order(&self) -> Result<Vec<&str>, ToolboxError> {
        let order = toposort(&self.graph, None).map_err(|_| ToolboxError::NotADag)?;
        Ok(order.into_iter().map(|i| self.graph[i].as_str()).collect())
    }

    /// Items grouped into layers; an item's predecessors are all in earlier layers
    pub fn layers(&self) -> Result<Vec<Vec<&str>>, ToolboxError> {
        let order = toposort(&self.graph, None).map_err(|_| ToolboxError::NotADag)?;
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut layers: Vec<Vec<&str>> = Vec::new();
        for node in order {
            let level = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .map(|e| depth[&e.source()] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(self.graph[node].as_str());
        }
        for layer in &mut layers {
            layer.sort_unstable();
        }
        Ok(layers)
    }

    /// Direct predecessors of an item
    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&index) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|i| self.graph[i].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// All items reachable from `name`, excluding itself
    pub fn descendants(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(&start) = self.indices.get(name) else {
            return found;
        };
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                found.insert(self.graph[node].clone());
            }
        }
        found
    }
}

/// Which items of a DAG may execute in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPermits(BTreeMap<String, bool>);

impl ExecutionPermits {
    /// An item is permitted if it is selected (or nothing is selected) and
    /// not deselected.
    pub fn new(
        dag: &Dag,
        selected: Option<&HashSet<String>>,
        deselected: Option<&HashSet<String>>,
    ) -> Self {
        let permits = dag
            .node_names()
            .into_iter()
            .map(|name| {
                let permitted = selected.is_none_or(|s| s.contains(name))
                    && deselected.is_none_or(|d| !d.contains(name));
                (name.to_string(), permitted)
            })
            .collect();
        Self(permits)
    }

    pub fn is_permitted(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    /// Whether anything in the DAG may execute
    pub fn any(&self) -> bool {
        self.0.values().any(|p| *p)
    }

    pub fn permitted(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, p)| **p).map(|(n, _)| n.as_str())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, p)| !**p).map(|(n, _)| n.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn set(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_into_weakly_connected_components() {
        let items = names(&["a", "b", "c", "d", "e"]);
        let connections = vec![
            Connection::new("a", "b"),
            Connection::new("c", "b"),
            Connection::new("d", "e"),
        ];
        let dags = Dag::from_project(&items, &connections);
        assert_eq!(dags.len(), 2);
        assert_eq!(dags[0].node_names(), vec!["a", "b", "c"]);
        assert_eq!(dags[1].node_names(), vec!["d", "e"]);
    }

    #[test]
    fn isolated_items_form_their_own_dags() {
        let items = names(&["x", "y"]);
        let dags = Dag::from_project(&items, &[]);
        assert_eq!(dags.len(), 2);
        assert_eq!(dags[0].len(), 1);
    }

    #[test]
    fn unknown_connection_endpoints_are_ignored() {
        let items = names(&["a"]);
        let dags = Dag::from_project(&items, &[Connection::new("a", "ghost")]);
        assert_eq!(dags.len(), 1);
        assert_eq!(dags[0].node_names(), vec!["a"]);
    }

    #[test]
    fn topological_order_respects_edges() {
        let items = names(&["tool", "data", "store"]);
        let connections = vec![
            Connection::new("data", "tool"),
            Connection::new("tool", "store"),
        ];
        let dags = Dag::from_project(&items, &connections);
        assert_eq!(dags[0].topological_order().unwrap(), vec!["data", "tool", "store"]);
    }

    #[test]
    fn cycle_is_not_a_dag() {
        let items = names(&["a", "b"]);
        let connections = vec![Connection::new("a", "b"), Connection::new("b", "a")];
        let dags = Dag::from_project(&items, &connections);
        assert!(!dags[0].is_acyclic());
        assert!(matches!(dags[0].topological_order(), Err(ToolboxError::NotADag)));
        assert!(dags[0].layers().is_err());
    }

    #[test]
    fn layers_group_independent_items() {
        let items = names(&["a", "b", "c", "d"]);
        let connections = vec![
            Connection::new("a", "c"),
            Connection::new("b", "c"),
            Connection::new("a", "d"),
            Connection::new("c", "d"),
        ];
        let dags = Dag::from_project(&items, &connections);
        let layers = dags[0].layers().unwrap();
        assert_eq!(layers, vec![vec!["a", "b"], vec!["c"], vec!["d"]]);
    }

    #[test]
    fn neighbors_and_descendants() {
        let items = names(&["a", "b", "c", "d"]);
        let connections = vec![
            Connection::new("a", "b"),
            Connection::new("b", "c"),
            Connection::new("d", "c"),
        ];
        let dag = &Dag::from_project(&items, &connections)[0];
        assert_eq!(dag.predecessors("c"), vec!["b", "d"]);
        let descendants: Vec<String> = dag.descendants("a").into_iter().collect();
        assert_eq!(descendants, names(&["b", "c"]));
        assert!(dag.descendants("missing").is_empty());
    }

    #[test]
    fn permits_follow_selection() {
        let items = names(&["a", "b", "c"]);
        let connections = vec![Connection::new("a", "b"), Connection::new("b", "c")];
        let dag = &Dag::from_project(&items, &connections)[0];

        let all = ExecutionPermits::new(dag, None, None);
        assert_eq!(all.permitted().count(), 3);

        let selected = set(&["a", "b"]);
        let deselected = set(&["b"]);
        let permits = ExecutionPermits::new(dag, Some(&selected), Some(&deselected));
        assert!(permits.is_permitted("a"));
        assert!(!permits.is_permitted("b"));
        assert!(!permits.is_permitted("c"));
        assert_eq!(permits.skipped().collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(permits.any());

        let none = ExecutionPermits::new(dag, Some(&set(&["zzz"])), None);
        assert!(!none.any());
    }
}
