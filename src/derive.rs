//! Materialization of `derivedFrom` links: every derived node inherits its
//! base's attributes and children, overlaid with its own explicit content.
//!
//! The pass works on a clone of the input tree, in the order produced by the
//! derivation graph, so a base's subtree is always fully materialized before
//! anything copies it. Names and addresses are never inherited; child lists
//! are inherited by deep copy with same-named children replaced in place and
//! new children appended in source order.

use indexmap::IndexSet;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::field::explicit_bit_range;
use crate::graph::{DeriveGraph, NodeKind};
use crate::input::{
  ClusterNode, DeviceNode, EnumeratedValueNode, EnumeratedValueSetNode, FieldNode, InterruptNode,
  PeripheralNode, RegisterClusterNode, RegisterNode,
};
use crate::path;

/// Resolves references, rejects cycles and materializes every derived node.
/// Returns `None` when fail-fast mode aborted; diagnostics are pushed either
/// way.
pub(crate) fn materialize(
  device: &DeviceNode,
  diagnostics: &mut Vec<Diagnostic>,
  keep_going: bool,
) -> Option<DeviceNode> {
  let mut graph = DeriveGraph::build(device);

  if !graph.resolve_references(diagnostics, keep_going) {
    return None;
  }

  let order = graph.processing_order(diagnostics, keep_going)?;

  // A failed enumerated-value container takes its whole field down; there is
  // no stable way to address one unnamed container inside a partial field.
  for id in 0..graph.nodes.len() {
    if graph.poisoned[id] && graph.nodes[id].kind == NodeKind::EnumSet {
      if let Some(parent) = graph.nodes[id].parent {
        graph.poisoned[parent] = true;
      }
    }
  }
  graph.propagate_poison();

  let mut working = device.clone();

  for &id in &order {
    if graph.poisoned[id] {
      continue;
    }
    let Some(base_id) = graph.nodes[id].base else {
      continue;
    };

    let base_path = graph.nodes[base_id].path.clone();
    let target_path = graph.nodes[id].path.clone();

    let Some(base) = clone_node(&working, &base_path) else {
      continue;
    };
    let Some(target) = resolve_mut(&mut working, &target_path) else {
      continue;
    };

    merge_into(target, &base, &target_path, diagnostics);
  }

  let poisoned = graph.poisoned_paths();
  if !poisoned.is_empty() {
    log::debug!(
      "dropping {} subtree(s) whose derivation failed",
      poisoned.len()
    );
    prune(&mut working, &poisoned);
  }

  Some(working)
}

enum NodeRefMut<'a> {
  Peripheral(&'a mut PeripheralNode),
  Cluster(&'a mut ClusterNode),
  Register(&'a mut RegisterNode),
  Field(&'a mut FieldNode),
  EnumSet(&'a mut EnumeratedValueSetNode),
}

enum NodeClone {
  Peripheral(PeripheralNode),
  Cluster(ClusterNode),
  Register(RegisterNode),
  Field(FieldNode),
  EnumSet(EnumeratedValueSetNode),
}

fn enum_set_position(segment: &str) -> Option<usize> {
  segment.strip_prefix("[enum#")?.strip_suffix(']')?.parse().ok()
}

fn resolve_mut<'a>(device: &'a mut DeviceNode, node_path: &str) -> Option<NodeRefMut<'a>> {
  let mut segments = node_path.split('.');
  let first = segments.next()?;

  let peripheral = device.peripherals.iter_mut().find(|p| p.name == first)?;
  let mut current = NodeRefMut::Peripheral(peripheral);

  for segment in segments {
    current = match current {
      NodeRefMut::Peripheral(p) => register_cluster_child_mut(&mut p.children, segment)?,
      NodeRefMut::Cluster(c) => register_cluster_child_mut(&mut c.children, segment)?,
      NodeRefMut::Register(r) => {
        NodeRefMut::Field(r.fields.iter_mut().find(|f| f.name == segment)?)
      }
      NodeRefMut::Field(f) => {
        let set = match enum_set_position(segment) {
          Some(position) => f.enumerated_value_sets.get_mut(position)?,
          None => f
            .enumerated_value_sets
            .iter_mut()
            .find(|s| s.name.as_deref() == Some(segment))?,
        };
        NodeRefMut::EnumSet(set)
      }
      NodeRefMut::EnumSet(_) => return None,
    };
  }

  Some(current)
}

fn register_cluster_child_mut<'a>(
  children: &'a mut [RegisterClusterNode],
  segment: &str,
) -> Option<NodeRefMut<'a>> {
  for child in children.iter_mut() {
    match child {
      RegisterClusterNode::Register(r) if r.name == segment => {
        return Some(NodeRefMut::Register(r));
      }
      RegisterClusterNode::Cluster(c) if c.name == segment => {
        return Some(NodeRefMut::Cluster(c));
      }
      _ => {}
    }
  }
  None
}

fn clone_node(device: &DeviceNode, node_path: &str) -> Option<NodeClone> {
  #[derive(Clone, Copy)]
  enum NodeRef<'a> {
    Peripheral(&'a PeripheralNode),
    Cluster(&'a ClusterNode),
    Register(&'a RegisterNode),
    Field(&'a FieldNode),
    EnumSet(&'a EnumeratedValueSetNode),
  }

  let mut segments = node_path.split('.');
  let first = segments.next()?;

  let peripheral = device.peripherals.iter().find(|p| p.name == first)?;
  let mut current = NodeRef::Peripheral(peripheral);

  for segment in segments {
    let children = match current {
      NodeRef::Peripheral(p) => Some(&p.children),
      NodeRef::Cluster(c) => Some(&c.children),
      _ => None,
    };

    current = match current {
      NodeRef::Peripheral(_) | NodeRef::Cluster(_) => {
        let mut found = None;
        for child in children.unwrap() {
          match child {
            RegisterClusterNode::Register(r) if r.name == segment => {
              found = Some(NodeRef::Register(r));
              break;
            }
            RegisterClusterNode::Cluster(c) if c.name == segment => {
              found = Some(NodeRef::Cluster(c));
              break;
            }
            _ => {}
          }
        }
        found?
      }
      NodeRef::Register(r) => NodeRef::Field(r.fields.iter().find(|f| f.name == segment)?),
      NodeRef::Field(f) => {
        let set = match enum_set_position(segment) {
          Some(position) => f.enumerated_value_sets.get(position)?,
          None => f
            .enumerated_value_sets
            .iter()
            .find(|s| s.name.as_deref() == Some(segment))?,
        };
        NodeRef::EnumSet(set)
      }
      NodeRef::EnumSet(_) => return None,
    };
  }

  Some(match current {
    NodeRef::Peripheral(p) => NodeClone::Peripheral(p.clone()),
    NodeRef::Cluster(c) => NodeClone::Cluster(c.clone()),
    NodeRef::Register(r) => NodeClone::Register(r.clone()),
    NodeRef::Field(f) => NodeClone::Field(f.clone()),
    NodeRef::EnumSet(s) => NodeClone::EnumSet(s.clone()),
  })
}

fn merge_into(
  target: NodeRefMut<'_>,
  base: &NodeClone,
  target_path: &str,
  diagnostics: &mut Vec<Diagnostic>,
) {
  match (target, base) {
    (NodeRefMut::Peripheral(t), NodeClone::Peripheral(b)) => merge_peripheral(t, b),
    (NodeRefMut::Cluster(t), NodeClone::Cluster(b)) => merge_cluster(t, b),
    (NodeRefMut::Register(t), NodeClone::Register(b)) => {
      merge_register(t, b, target_path, diagnostics);
    }
    (NodeRefMut::Field(t), NodeClone::Field(b)) => merge_field(t, b),
    (NodeRefMut::EnumSet(t), NodeClone::EnumSet(b)) => merge_enum_set(t, b),
    _ => {}
  }
}

fn or_assign<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
  if slot.is_none() {
    *slot = value.clone();
  }
}

fn merge_peripheral(target: &mut PeripheralNode, base: &PeripheralNode) {
  or_assign(&mut target.version, &base.version);
  or_assign(&mut target.description, &base.description);
  or_assign(&mut target.alternate_peripheral, &base.alternate_peripheral);
  or_assign(&mut target.group_name, &base.group_name);
  or_assign(&mut target.prepend_to_name, &base.prepend_to_name);
  or_assign(&mut target.append_to_name, &base.append_to_name);
  or_assign(&mut target.header_struct_name, &base.header_struct_name);
  or_assign(&mut target.disable_condition, &base.disable_condition);

  target.register_properties.inherit_from(&base.register_properties);

  if target.dim.dim.is_none() {
    target.dim = base.dim.clone();
  }

  // Address blocks carry no name to key an overlay on; a derived peripheral
  // that declares any supplies all of them.
  if target.address_blocks.is_empty() {
    target.address_blocks = base.address_blocks.clone();
  }

  overlay_interrupts(&mut target.interrupts, &base.interrupts);
  overlay_register_clusters(&mut target.children, &base.children);

  target.derived_from = None;
}

fn merge_cluster(target: &mut ClusterNode, base: &ClusterNode) {
  or_assign(&mut target.description, &base.description);
  or_assign(&mut target.alternate_cluster, &base.alternate_cluster);
  or_assign(&mut target.header_struct_name, &base.header_struct_name);

  target.register_properties.inherit_from(&base.register_properties);

  if target.dim.dim.is_none() {
    target.dim = base.dim.clone();
  }

  overlay_register_clusters(&mut target.children, &base.children);

  target.derived_from = None;
}

fn merge_register(
  target: &mut RegisterNode,
  base: &RegisterNode,
  target_path: &str,
  diagnostics: &mut Vec<Diagnostic>,
) {
  or_assign(&mut target.display_name, &base.display_name);
  or_assign(&mut target.description, &base.description);
  or_assign(&mut target.alternate_group, &base.alternate_group);
  or_assign(&mut target.alternate_register, &base.alternate_register);
  or_assign(&mut target.data_type, &base.data_type);
  or_assign(&mut target.modified_write_values, &base.modified_write_values);
  or_assign(&mut target.write_constraint, &base.write_constraint);
  or_assign(&mut target.read_action, &base.read_action);

  target.register_properties.inherit_from(&base.register_properties);

  if target.dim.dim.is_none() {
    target.dim = base.dim.clone();
  }

  overlay_fields(&mut target.fields, &base.fields, target_path, diagnostics);

  target.derived_from = None;
}

fn merge_field(target: &mut FieldNode, base: &FieldNode) {
  or_assign(&mut target.description, &base.description);
  or_assign(&mut target.access, &base.access);
  or_assign(&mut target.modified_write_values, &base.modified_write_values);
  or_assign(&mut target.write_constraint, &base.write_constraint);
  or_assign(&mut target.read_action, &base.read_action);

  // The bit position counts as one attribute in whichever of the three
  // forms it was written; a derived field either restates it completely or
  // inherits the base's form untouched.
  let has_own_bits = target.bit_range.is_some()
    || target.lsb.is_some()
    || target.msb.is_some()
    || target.bit_offset.is_some()
    || target.bit_width.is_some();
  if !has_own_bits {
    target.bit_range = base.bit_range.clone();
    target.lsb = base.lsb;
    target.msb = base.msb;
    target.bit_offset = base.bit_offset;
    target.bit_width = base.bit_width;
  }

  if target.dim.dim.is_none() {
    target.dim = base.dim.clone();
  }

  overlay_enum_sets(&mut target.enumerated_value_sets, &base.enumerated_value_sets);

  target.derived_from = None;
}

fn merge_enum_set(target: &mut EnumeratedValueSetNode, base: &EnumeratedValueSetNode) {
  or_assign(&mut target.name, &base.name);
  or_assign(&mut target.header_enum_name, &base.header_enum_name);
  or_assign(&mut target.usage, &base.usage);

  overlay_enum_values(&mut target.values, &base.values);

  target.derived_from = None;
}

fn overlay_register_clusters(own: &mut Vec<RegisterClusterNode>, base: &[RegisterClusterNode]) {
  let mut merged: Vec<RegisterClusterNode> = base.to_vec();
  for child in own.drain(..) {
    if let Some(position) = merged.iter().position(|existing| existing.name() == child.name()) {
      merged[position] = child;
    } else {
      merged.push(child);
    }
  }
  *own = merged;
}

fn overlay_fields(
  own: &mut Vec<FieldNode>,
  base: &[FieldNode],
  register_path: &str,
  diagnostics: &mut Vec<Diagnostic>,
) {
  let mut merged: Vec<FieldNode> = base.to_vec();
  for field in own.drain(..) {
    if let Some(position) = merged.iter().position(|existing| existing.name == field.name) {
      if let (Some(own_range), Some(base_range)) =
        (explicit_bit_range(&field), explicit_bit_range(&merged[position]))
      {
        if own_range == base_range {
          diagnostics.push(Diagnostic::warning(
            DiagnosticKind::RedundantOverride,
            &path::join(register_path, &field.name),
            "the explicit bit range repeats the base field's",
          ));
        }
      }
      merged[position] = field;
    } else {
      merged.push(field);
    }
  }
  *own = merged;
}

fn overlay_interrupts(own: &mut Vec<InterruptNode>, base: &[InterruptNode]) {
  let mut merged: Vec<InterruptNode> = base.to_vec();
  for interrupt in own.drain(..) {
    if let Some(position) = merged.iter().position(|existing| existing.name == interrupt.name) {
      merged[position] = interrupt;
    } else {
      merged.push(interrupt);
    }
  }
  *own = merged;
}

fn overlay_enum_sets(own: &mut Vec<EnumeratedValueSetNode>, base: &[EnumeratedValueSetNode]) {
  let mut merged: Vec<EnumeratedValueSetNode> = base.to_vec();
  for set in own.drain(..) {
    let matched = set.name.as_ref().and_then(|name| {
      merged
        .iter()
        .position(|existing| existing.name.as_ref() == Some(name))
    });
    match matched {
      Some(position) => merged[position] = set,
      None => merged.push(set),
    }
  }
  *own = merged;
}

fn overlay_enum_values(own: &mut Vec<EnumeratedValueNode>, base: &[EnumeratedValueNode]) {
  let mut merged: Vec<EnumeratedValueNode> = base.to_vec();
  for value in own.drain(..) {
    if let Some(position) = merged.iter().position(|existing| existing.name == value.name) {
      merged[position] = value;
    } else {
      merged.push(value);
    }
  }
  *own = merged;
}

fn prune(device: &mut DeviceNode, poisoned: &IndexSet<String>) {
  device.peripherals.retain(|p| !poisoned.contains(&p.name));
  for peripheral in &mut device.peripherals {
    let preceding = peripheral.name.clone();
    prune_register_clusters(&mut peripheral.children, &preceding, poisoned);
  }
}

fn prune_register_clusters(
  children: &mut Vec<RegisterClusterNode>,
  preceding: &str,
  poisoned: &IndexSet<String>,
) {
  children.retain(|child| !poisoned.contains(&path::join(preceding, child.name())));
  for child in children.iter_mut() {
    match child {
      RegisterClusterNode::Cluster(cluster) => {
        let cluster_path = path::join(preceding, &cluster.name);
        prune_register_clusters(&mut cluster.children, &cluster_path, poisoned);
      }
      RegisterClusterNode::Register(register) => {
        let register_path = path::join(preceding, &register.name);
        register
          .fields
          .retain(|field| !poisoned.contains(&path::join(&register_path, &field.name)));
      }
    }
  }
}
