//! The derivation graph: an arena index over the input tree that resolves
//! `derivedFrom` references, rejects cycles and yields the order in which
//! nodes can be materialized.
//!
//! Scopes are those of the input tree, before dimension expansion, so a
//! reference may name a dim template (`Timer[%s]`) and forward references
//! resolve naturally. Reference resolution runs in rounds: a container's
//! children become visible through its resolved derivation link, so a path
//! into a derived-in subtree resolves once the link it travels through has
//! been resolved itself.

use std::fmt;

use indexmap::IndexSet;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::input::{DeviceNode, FieldNode, RegisterClusterNode};
use crate::path::{self, segment_matches, Path};

/// What kind of element a graph node indexes. Derivation may only connect
/// nodes of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
  Peripheral,
  Cluster,
  Register,
  Field,
  EnumSet,
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      NodeKind::Peripheral => "peripheral",
      NodeKind::Cluster => "cluster",
      NodeKind::Register => "register",
      NodeKind::Field => "field",
      NodeKind::EnumSet => "enumerated-value container",
    };
    write!(f, "{}", name)
  }
}

#[derive(Debug)]
pub(crate) struct GraphNode {
  pub kind: NodeKind,
  /// The declared name, used for reference matching. Unnamed enumerated
  /// value containers have none and can't be derivation targets.
  pub name: Option<String>,
  /// The full pre-expansion path. Unnamed containers get a positional
  /// placeholder segment.
  pub path: String,
  pub parent: Option<usize>,
  pub children: Vec<usize>,
  pub derived_from: Option<String>,
  pub base: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct DeriveGraph {
  pub nodes: Vec<GraphNode>,
  pub roots: Vec<usize>,
  pub poisoned: Vec<bool>,
}

enum Lookup {
  Found(usize),
  WrongKind(usize),
  Ambiguous,
  Invalid,
  NotFound { wrong_kind: Option<usize> },
}

impl DeriveGraph {
  pub(crate) fn build(device: &DeviceNode) -> Self {
    let mut graph = Self {
      nodes: Vec::new(),
      roots: Vec::new(),
      poisoned: Vec::new(),
    };

    for peripheral in &device.peripherals {
      let id = graph.add(
        NodeKind::Peripheral,
        Some(peripheral.name.clone()),
        peripheral.name.clone(),
        None,
        peripheral.derived_from.clone(),
      );
      graph.roots.push(id);
      graph.add_register_clusters(&peripheral.children, id);
    }

    graph.poisoned = vec![false; graph.nodes.len()];
    graph
  }

  /// Resolves every `derivedFrom` reference, poisoning nodes whose
  /// reference fails. Returns `false` when fail-fast mode aborted.
  pub(crate) fn resolve_references(
    &mut self,
    diagnostics: &mut Vec<Diagnostic>,
    keep_going: bool,
  ) -> bool {
    let mut pending: Vec<usize> = (0..self.nodes.len())
      .filter(|&id| self.nodes[id].derived_from.is_some())
      .collect();

    log::debug!("resolving {} derivation references", pending.len());

    loop {
      let mut progress = false;
      let mut still_pending = Vec::new();

      for &id in &pending {
        match self.try_resolve(id) {
          Lookup::Found(base) => {
            self.nodes[id].base = Some(base);
            progress = true;
          }
          Lookup::WrongKind(found) => {
            progress = true;
            self.poisoned[id] = true;
            diagnostics.push(self.wrong_kind_diagnostic(id, found));
            if !keep_going {
              return false;
            }
          }
          Lookup::Ambiguous => {
            progress = true;
            self.poisoned[id] = true;
            diagnostics.push(self.unresolved_diagnostic(id, "the reference is ambiguous"));
            if !keep_going {
              return false;
            }
          }
          Lookup::Invalid => {
            progress = true;
            self.poisoned[id] = true;
            diagnostics.push(self.unresolved_diagnostic(id, "the reference is not a valid path"));
            if !keep_going {
              return false;
            }
          }
          Lookup::NotFound { .. } => still_pending.push(id),
        }
      }

      pending = still_pending;
      if pending.is_empty() {
        return true;
      }

      if !progress {
        for &id in &pending {
          self.poisoned[id] = true;
          let diagnostic = match self.try_resolve(id) {
            Lookup::NotFound {
              wrong_kind: Some(found),
            } => self.wrong_kind_diagnostic(id, found),
            _ => self.unresolved_diagnostic(id, "nothing by that name is visible"),
          };
          diagnostics.push(diagnostic);
          if !keep_going {
            return false;
          }
        }
        return true;
      }
    }
  }

  /// Detects derivation cycles and returns the materialization order:
  /// every node after its children and after its base's subtree. Returns
  /// `None` when fail-fast mode aborted on a cycle.
  pub(crate) fn processing_order(
    &mut self,
    diagnostics: &mut Vec<Diagnostic>,
    keep_going: bool,
  ) -> Option<Vec<usize>> {
    let count = self.nodes.len();
    let mut state = TarjanState {
      index: vec![None; count],
      low: vec![0; count],
      on_stack: vec![false; count],
      stack: Vec::new(),
      next: 0,
      order: Vec::new(),
      cycles: Vec::new(),
    };

    for id in 0..count {
      if state.index[id].is_none() {
        self.strong_connect(id, &mut state);
      }
    }

    let mut aborted = false;
    for mut cycle in state.cycles {
      cycle.sort_unstable();
      let members: Vec<&str> = cycle.iter().map(|&m| self.nodes[m].path.as_str()).collect();
      let reporter = cycle
        .iter()
        .copied()
        .find(|&m| self.nodes[m].derived_from.is_some())
        .unwrap_or(cycle[0]);

      diagnostics.push(Diagnostic::error(
        DiagnosticKind::CircularInheritance,
        &self.nodes[reporter].path,
        format!("inheritance cycle: {}", members.join(" -> ")),
      ));

      for &member in &cycle {
        self.poisoned[member] = true;
      }

      if !keep_going {
        aborted = true;
        break;
      }
    }

    if aborted {
      None
    } else {
      Some(state.order)
    }
  }

  /// Marks every node below a poisoned node, or deriving (transitively)
  /// from one, as poisoned itself.
  pub(crate) fn propagate_poison(&mut self) {
    loop {
      let mut changed = false;
      for id in 0..self.nodes.len() {
        if self.poisoned[id] {
          continue;
        }
        let parent_poisoned = self.nodes[id].parent.map_or(false, |p| self.poisoned[p]);
        let base_poisoned = self.nodes[id].base.map_or(false, |b| self.poisoned[b]);
        if parent_poisoned || base_poisoned {
          self.poisoned[id] = true;
          changed = true;
        }
      }
      if !changed {
        break;
      }
    }
  }

  /// Paths of the subtree roots that must be dropped from the working tree.
  pub(crate) fn poisoned_paths(&self) -> IndexSet<String> {
    (0..self.nodes.len())
      .filter(|&id| self.poisoned[id])
      .map(|id| self.nodes[id].path.clone())
      .collect()
  }

  fn add(
    &mut self,
    kind: NodeKind,
    name: Option<String>,
    segment: String,
    parent: Option<usize>,
    derived_from: Option<String>,
  ) -> usize {
    let node_path = match parent {
      Some(p) => path::join(&self.nodes[p].path, &segment),
      None => segment.clone(),
    };

    let id = self.nodes.len();
    self.nodes.push(GraphNode {
      kind,
      name,
      path: node_path,
      parent,
      children: Vec::new(),
      derived_from,
      base: None,
    });

    if let Some(p) = parent {
      self.nodes[p].children.push(id);
    }

    id
  }

  fn add_register_clusters(&mut self, children: &[RegisterClusterNode], parent: usize) {
    for child in children {
      match child {
        RegisterClusterNode::Register(register) => {
          let id = self.add(
            NodeKind::Register,
            Some(register.name.clone()),
            register.name.clone(),
            Some(parent),
            register.derived_from.clone(),
          );
          self.add_fields(&register.fields, id);
        }
        RegisterClusterNode::Cluster(cluster) => {
          let id = self.add(
            NodeKind::Cluster,
            Some(cluster.name.clone()),
            cluster.name.clone(),
            Some(parent),
            cluster.derived_from.clone(),
          );
          self.add_register_clusters(&cluster.children, id);
        }
      }
    }
  }

  fn add_fields(&mut self, fields: &[FieldNode], parent: usize) {
    for field in fields {
      let id = self.add(
        NodeKind::Field,
        Some(field.name.clone()),
        field.name.clone(),
        Some(parent),
        field.derived_from.clone(),
      );

      for (position, set) in field.enumerated_value_sets.iter().enumerate() {
        let segment = set
          .name
          .clone()
          .unwrap_or_else(|| format!("[enum#{}]", position));
        self.add(
          NodeKind::EnumSet,
          set.name.clone(),
          segment,
          Some(id),
          set.derived_from.clone(),
        );
      }
    }
  }

  fn try_resolve(&self, id: usize) -> Lookup {
    let node = &self.nodes[id];
    let reference = node.derived_from.as_deref().unwrap_or("");

    let Some(reference_path) = Path::parse(reference) else {
      return Lookup::Invalid;
    };

    if let Some(single) = reference_path.single() {
      let mut wrong_kind = None;
      let mut scope = node.parent;

      loop {
        let candidates = match scope {
          Some(container) => self.effective_children(container),
          None => self.roots.clone(),
        };

        for candidate in candidates {
          if candidate == id || !self.matches_name(candidate, single) {
            continue;
          }
          if self.nodes[candidate].kind == node.kind {
            return Lookup::Found(candidate);
          }
          if wrong_kind.is_none() {
            wrong_kind = Some(candidate);
          }
        }

        match scope {
          Some(container) => scope = self.nodes[container].parent,
          None => break,
        }
      }

      return Lookup::NotFound { wrong_kind };
    }

    let segments = reference_path.segments();
    let mut current: Vec<usize> = self
      .roots
      .iter()
      .copied()
      .filter(|&root| self.matches_name(root, &segments[0]))
      .collect();

    for segment in &segments[1..] {
      let mut next = Vec::new();
      for &candidate in &current {
        for child in self.effective_children(candidate) {
          if self.matches_name(child, segment) && !next.contains(&child) {
            next.push(child);
          }
        }
      }
      current = next;
      if current.is_empty() {
        break;
      }
    }

    current.retain(|&candidate| candidate != id);

    match current.as_slice() {
      [] => Lookup::NotFound { wrong_kind: None },
      [found] if self.nodes[*found].kind == node.kind => Lookup::Found(*found),
      [found] => Lookup::WrongKind(*found),
      _ => Lookup::Ambiguous,
    }
  }

  /// A container's own children plus those visible through its (resolved)
  /// derivation chain.
  fn effective_children(&self, container: usize) -> Vec<usize> {
    let mut children = self.nodes[container].children.clone();

    let mut link = self.nodes[container].base;
    let mut guard = 0;
    while let Some(base) = link {
      children.extend(self.nodes[base].children.iter().copied());
      link = self.nodes[base].base;
      guard += 1;
      if guard > 64 {
        break;
      }
    }

    children
  }

  fn matches_name(&self, id: usize, segment: &str) -> bool {
    self.nodes[id]
      .name
      .as_deref()
      .map_or(false, |name| segment_matches(name, segment))
  }

  fn wrong_kind_diagnostic(&self, id: usize, found: usize) -> Diagnostic {
    let node = &self.nodes[id];
    Diagnostic::error(
      DiagnosticKind::WrongKindReference,
      &node.path,
      format!(
        "`{}` names a {} but a {} was expected",
        node.derived_from.as_deref().unwrap_or(""),
        self.nodes[found].kind,
        node.kind
      ),
    )
  }

  fn unresolved_diagnostic(&self, id: usize, details: &str) -> Diagnostic {
    let node = &self.nodes[id];
    Diagnostic::error(
      DiagnosticKind::UnresolvedReference,
      &node.path,
      format!(
        "`{}` does not resolve to any {}: {}",
        node.derived_from.as_deref().unwrap_or(""),
        node.kind,
        details
      ),
    )
  }

  fn successors(&self, id: usize) -> Vec<usize> {
    let mut successors = self.nodes[id].children.clone();
    if let Some(base) = self.nodes[id].base {
      successors.push(base);
    }
    successors
  }

  fn strong_connect(&self, v: usize, state: &mut TarjanState) {
    state.index[v] = Some(state.next);
    state.low[v] = state.next;
    state.next += 1;
    state.stack.push(v);
    state.on_stack[v] = true;

    for w in self.successors(v) {
      if state.index[w].is_none() {
        self.strong_connect(w, state);
        state.low[v] = state.low[v].min(state.low[w]);
      } else if state.on_stack[w] {
        state.low[v] = state.low[v].min(state.index[w].unwrap());
      }
    }

    if state.low[v] == state.index[v].unwrap() {
      let mut component = Vec::new();
      loop {
        let w = state.stack.pop().unwrap();
        state.on_stack[w] = false;
        component.push(w);
        if w == v {
          break;
        }
      }

      if component.len() > 1 || self.nodes[v].base == Some(v) {
        state.cycles.push(component);
      } else {
        state.order.push(v);
      }
    }
  }
}

struct TarjanState {
  index: Vec<Option<u32>>,
  low: Vec<u32>,
  on_stack: Vec<bool>,
  stack: Vec<usize>,
  next: u32,
  order: Vec<usize>,
  cycles: Vec<Vec<usize>>,
}
