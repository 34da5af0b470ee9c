//! Whole-graph checks that can only run once every row is built: state
//! connectivity, dead-end states, and action-level connectivity. Also builds
//! the diagnostic graphs written out as GraphViz.

use std::collections::HashSet;

use indexmap::IndexSet;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::context::CompilerContext;
use super::error::Diagnostic;
use super::graph::{ActionType, StateId};

/// States as nodes (node index == state id); transitions and PREVIOUS
/// returns as edges labelled with what triggers them.
pub fn state_graph(ctx: &CompilerContext) -> DiGraph<String, String> {
    let mut graph = DiGraph::new();
    let nodes: Vec<NodeIndex> = ctx
        .states
        .iter()
        .map(|s| graph.add_node(s.name.clone()))
        .collect();

    for (r, action) in ctx.actions.iter() {
        let Some(target) = action.target_state().filter(|_| action.kind.targets_state()) else {
            continue;
        };
        let origin = ctx.actions.get(ctx.actions.sequence_origin(r));
        let label = format!("{} {}/{}", action.trigger, origin.choice_share, origin.choice_total);
        graph.add_edge(nodes[action.state.0], nodes[target.0], label);
    }

    // PREVIOUS can return to any state that leads here.
    let returns: IndexSet<(NodeIndex, NodeIndex)> = ctx
        .actions
        .iter()
        .filter(|(_, a)| a.kind == ActionType::Previous)
        .flat_map(|(_, a)| {
            let from = nodes[a.state.0];
            graph
                .neighbors_directed(from, Direction::Incoming)
                .map(move |to| (from, to))
        })
        .collect();
    for (from, to) in returns {
        graph.add_edge(from, to, "PREVIOUS".to_string());
    }
    graph
}

/// States and live actions as nodes, with `next`, `alt` and `goto` edges.
pub fn action_graph(ctx: &CompilerContext) -> DiGraph<String, String> {
    let mut graph = DiGraph::new();
    let state_nodes: Vec<NodeIndex> = ctx
        .states
        .iter()
        .map(|s| graph.add_node(format!("[{}]", s.name)))
        .collect();
    let positions = ctx.actions.positions();
    let mut action_nodes: Vec<Option<NodeIndex>> = vec![None; positions.len()];
    for (r, action) in ctx.actions.iter() {
        let id = positions[r.0].unwrap_or_default();
        action_nodes[r.0] = Some(graph.add_node(format!("{id}: {action}")));
    }

    for (i, state) in ctx.states.iter().enumerate() {
        for (trigger, head) in &state.events {
            if let Some(node) = action_nodes[head.0] {
                graph.add_edge(state_nodes[i], node, trigger.to_string());
            }
        }
    }
    for (r, action) in ctx.actions.iter() {
        let Some(from) = action_nodes[r.0] else { continue };
        if let Some(next) = action.next_action.and_then(|n| action_nodes[n.0]) {
            graph.add_edge(from, next, "next".to_string());
        }
        if let Some(alt) = action.next_choice.and_then(|n| action_nodes[n.0]) {
            graph.add_edge(from, alt, "alt".to_string());
        }
        if let Some(target) = action.target_state().filter(|_| action.kind.targets_state()) {
            graph.add_edge(from, state_nodes[target.0], "goto".to_string());
        }
    }
    graph
}

pub fn to_dot(graph: &DiGraph<String, String>) -> String {
    format!("{}", Dot::new(graph))
}

/// Nodes outside the weakly connected component of node 0.
fn detached_nodes(graph: &DiGraph<String, String>) -> Vec<NodeIndex> {
    let mut components = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        components.union(edge.source().index(), edge.target().index());
    }
    if graph.node_count() == 0 {
        return Vec::new();
    }
    let root = components.find(0);
    graph
        .node_indices()
        .filter(|n| components.find(n.index()) != root)
        .collect()
}

/// States where every way out lands in a state that can close the
/// interaction.
fn dead_ends(ctx: &CompilerContext) -> Vec<StateId> {
    let closable: HashSet<StateId> = ctx
        .actions
        .iter()
        .filter(|(_, a)| a.kind == ActionType::Close)
        .map(|(_, a)| a.state)
        .collect();

    let mut exits: Vec<Vec<StateId>> = vec![Vec::new(); ctx.states.len()];
    for (_, action) in ctx.actions.iter() {
        if let Some(target) = action.target_state().filter(|_| action.kind.targets_state()) {
            exits[action.state.0].push(target);
        }
    }
    exits
        .iter()
        .enumerate()
        .filter(|(_, targets)| !targets.is_empty() && targets.iter().all(|t| closable.contains(t)))
        .map(|(i, _)| StateId(i))
        .collect()
}

/// Style warnings for the finished graph.
pub fn validate(ctx: &CompilerContext) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();

    let states = state_graph(ctx);
    let detached = detached_nodes(&states);
    if !detached.is_empty() {
        let names: Vec<&str> = detached.iter().map(|n| states[*n].as_str()).collect();
        warnings.push(Diagnostic::style(format!(
            "State graph is not connected; states not connected to POST: {}",
            names.join(", ")
        )));
    }

    for id in dead_ends(ctx) {
        warnings.push(Diagnostic::style(format!(
            "State {} is a dead end: every transition leads to a closable state",
            ctx.state(id).name
        )));
    }

    let actions = action_graph(ctx);
    let detached = detached_nodes(&actions);
    if !detached.is_empty() {
        warnings.push(Diagnostic::style(format!(
            "Action graph is not connected; {} nodes not connected to POST",
            detached.len()
        )));
    }

    tracing::debug!(warnings = warnings.len(), "graph validated");
    warnings
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::dsl::compile_source;

    const HEADER: &str = "Input_type,Input_detail,Choice_share,Result_duration,Result_type,Result_detail,";

    fn compile(body: &str) -> CompilerContext {
        compile_source(&format!("{HEADER}\n{body}"), &CompileOptions::default()).unwrap()
    }

    #[test]
    fn connected_game_has_no_warnings() {
        let ctx = compile(
            "START_STATE,home\nENTER,,,,TEXT,hi\nUSER_IN,go,,,STATE_TRANSITION,away\n\
             START_STATE,away\nENTER,,,,TEXT,there\nCONTD,,,,PREVIOUS,\n",
        );
        assert!(validate(&ctx).is_empty(), "{:?}", validate(&ctx));
    }

    #[test]
    fn transition_edges_are_labelled() {
        let ctx = compile(
            "START_STATE,home\nUSER_IN,go,1,,STATE_TRANSITION,away\nUSER_IN,go,2,,CLOSE,\n\
             START_STATE,away\nENTER,,,,PREVIOUS,\n",
        );
        let graph = state_graph(&ctx);
        let labels: Vec<&str> = graph.edge_weights().map(String::as_str).collect();
        assert!(labels.contains(&"USER_IN(go) 1/3"), "{labels:?}");
        assert!(labels.contains(&"ENTER 1/1"));
        // PREVIOUS in AWAY returns to HOME.
        let home = NodeIndex::new(1);
        let away = NodeIndex::new(2);
        assert!(graph
            .edges_connecting(away, home)
            .any(|e| e.weight() == "PREVIOUS"));
    }

    #[test]
    fn unreachable_state_is_reported() {
        let ctx = compile("START_STATE,home\nENTER,,,,CLOSE,\nSTART_STATE,island\nENTER,,,,CLOSE,\n");
        let warnings = validate(&ctx);
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("not connected to POST: ISLAND")));
        assert!(warnings.iter().all(|w| !w.is_fatal()));
    }

    #[test]
    fn dead_end_heuristic() {
        let ctx = compile(
            "START_STATE,home\nUSER_IN,bye,,,STATE_TRANSITION,closer\n\
             START_STATE,closer\nENTER,,,,CLOSE,\nCONTD,,,,STATE_TRANSITION,home\n",
        );
        let warnings = validate(&ctx);
        assert!(warnings.iter().any(|w| w.message.contains("State HOME is a dead end")));
        assert!(!warnings.iter().any(|w| w.message.contains("State CLOSER")));
    }

    #[test]
    fn action_graph_links_everything() {
        let ctx = compile("START_STATE,home\nENTER,,,,TEXT,a,b\nCONTD,,,,STATE_TRANSITION,home\n");
        let graph = action_graph(&ctx);
        assert_eq!(graph.node_count(), ctx.states.len() + ctx.actions.len());
        let kinds: Vec<&str> = graph.edge_weights().map(String::as_str).collect();
        assert!(kinds.contains(&"alt"));
        assert!(kinds.contains(&"goto"));
        assert!(detached_nodes(&graph).is_empty());
        assert!(to_dot(&graph).starts_with("digraph {"));
    }
}
