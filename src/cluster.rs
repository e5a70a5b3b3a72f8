//! Clusters: named groups of registers (and nested clusters) at a shared
//! address offset. Registers and clusters stay siblings in one
//! source-ordered list, modelled by [`RegisterClusterSpec`].

use crate::dim::{self, DimInstance};
use crate::error::{Diagnostic, ProcessResult};
use crate::field::FieldSpec;
use crate::input::{ClusterNode, RegisterClusterNode, RegisterPropertiesGroup};
use crate::register::RegisterSpec;
use crate::value::DimArrayIndexSpec;
use crate::{clean_whitespace_opt, path};

/// A register or a cluster, in the position the source gave it.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterClusterSpec {
  Register(RegisterSpec),
  Cluster(ClusterSpec),
}

impl RegisterClusterSpec {
  pub fn name(&self) -> &str {
    match self {
      RegisterClusterSpec::Register(r) => &r.name,
      RegisterClusterSpec::Cluster(c) => &c.name,
    }
  }

  /// Starting address relative to the parent.
  pub fn address_offset(&self) -> u64 {
    match self {
      RegisterClusterSpec::Register(r) => r.address_offset,
      RegisterClusterSpec::Cluster(c) => c.address_offset,
    }
  }

  /// Absolute starting address.
  pub fn address(&self) -> u64 {
    match self {
      RegisterClusterSpec::Register(r) => r.address(),
      RegisterClusterSpec::Cluster(c) => c.address(),
    }
  }

  pub fn path(&self) -> String {
    match self {
      RegisterClusterSpec::Register(r) => r.path(),
      RegisterClusterSpec::Cluster(c) => c.path(),
    }
  }

  /// The number of address units this element spans.
  pub(crate) fn byte_span(&self) -> u64 {
    match self {
      RegisterClusterSpec::Register(r) => r.size_bytes(),
      RegisterClusterSpec::Cluster(c) => c.byte_span(),
    }
  }
}

/// Describes a cluster of registers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
  preceding_path: String,
  base_address: u64,

  /// Name that identifies the cluster. Must be unique within the scope of
  /// its parent.
  pub name: String,

  /// Description of the details of the cluster.
  pub description: Option<String>,

  /// The sibling cluster this cluster overlays.
  pub alternate_cluster: Option<String>,

  /// Name for the C structure a header generator emits for this cluster.
  pub header_struct_name: Option<String>,

  /// Cluster's starting address relative to its parent.
  pub address_offset: u64,

  /// The resolved register-properties record the cluster hands down to its
  /// children.
  pub default_register_properties: RegisterPropertiesGroup,

  /// Registers and nested clusters, in source order with expanded arrays
  /// inserted at the template's position.
  pub children: Vec<RegisterClusterSpec>,

  /// Index enumeration carried over from the array this cluster was
  /// expanded from.
  pub dim_array_index: Option<DimArrayIndexSpec>,
}

impl ClusterSpec {
  pub(crate) fn new(
    c: &ClusterNode,
    preceding_path: &str,
    base_address: u64,
    inherited: &RegisterPropertiesGroup,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Vec<Self>> {
    let template_path = path::join(preceding_path, &c.name);

    let specs = match dim::expand_dim(&c.name, &c.dim, &template_path)? {
      None => vec![Self::from_node(
        c,
        None,
        preceding_path,
        base_address,
        inherited,
        diagnostics,
      )?],
      Some(instances) => {
        let mut specs = Vec::with_capacity(instances.len());
        for instance in &instances {
          specs.push(Self::from_node(
            c,
            Some(instance),
            preceding_path,
            base_address,
            inherited,
            diagnostics,
          )?);
        }
        specs
      }
    };

    Ok(specs)
  }

  /// The absolute starting address of this cluster.
  pub fn address(&self) -> u64 {
    self.base_address + self.address_offset
  }

  /// The full path to this cluster.
  pub fn path(&self) -> String {
    path::join(&self.preceding_path, &self.name)
  }

  /// This cluster and every cluster nested below it.
  pub fn iter_clusters<'a>(&'a self) -> Box<dyn Iterator<Item = &'a ClusterSpec> + 'a> {
    Box::new(
      std::iter::once(self).chain(self.children.iter().flat_map(|child| match child {
        RegisterClusterSpec::Cluster(c) => c.iter_clusters(),
        RegisterClusterSpec::Register(_) => {
          Box::new(std::iter::empty()) as Box<dyn Iterator<Item = &'a ClusterSpec> + 'a>
        }
      })),
    )
  }

  /// Recursively iterates all the registers contained within this cluster.
  pub fn iter_registers<'a>(&'a self) -> Box<dyn Iterator<Item = &'a RegisterSpec> + 'a> {
    Box::new(self.children.iter().flat_map(|child| match child {
      RegisterClusterSpec::Register(r) => {
        Box::new(std::iter::once(r)) as Box<dyn Iterator<Item = &'a RegisterSpec> + 'a>
      }
      RegisterClusterSpec::Cluster(c) => c.iter_registers(),
    }))
  }

  /// Recursively iterates all the fields on registers within this cluster.
  pub fn iter_fields<'a>(&'a self) -> Box<dyn Iterator<Item = &'a FieldSpec> + 'a> {
    Box::new(self.iter_registers().flat_map(|r| r.fields.iter()))
  }

  /// The number of address units from the cluster's start to the end of its
  /// furthest child.
  pub(crate) fn byte_span(&self) -> u64 {
    self
      .children
      .iter()
      .map(|child| child.address_offset() + child.byte_span())
      .max()
      .unwrap_or(0)
  }

  fn from_node(
    c: &ClusterNode,
    instance: Option<&DimInstance>,
    preceding_path: &str,
    base_address: u64,
    inherited: &RegisterPropertiesGroup,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Self> {
    let name = instance.map_or_else(|| c.name.clone(), |i| i.name.clone());
    let cluster_path = path::join(preceding_path, &name);
    let address_offset = c.address_offset + instance.map_or(0, |i| i.offset_delta);
    let properties = inherited.merged(&c.register_properties);

    let mut cluster = Self {
      preceding_path: preceding_path.to_owned(),
      base_address,
      name,
      description: dim::substitute(clean_whitespace_opt(c.description.clone()), instance),
      alternate_cluster: c.alternate_cluster.clone(),
      header_struct_name: c.header_struct_name.clone(),
      address_offset,
      default_register_properties: properties.clone(),
      children: Vec::new(),
      dim_array_index: c
        .dim
        .dim_array_index
        .as_ref()
        .map(|node| DimArrayIndexSpec::new(node, &cluster_path))
        .transpose()?,
    };

    cluster.children = build_children(
      &c.children,
      &cluster_path,
      base_address + address_offset,
      &properties,
      diagnostics,
    )?;

    Ok(cluster)
  }
}

/// Builds the interleaved child list of a peripheral or cluster, expanding
/// dim groups in place so instances land at the template's position.
pub(crate) fn build_children(
  nodes: &[RegisterClusterNode],
  preceding_path: &str,
  base_address: u64,
  inherited: &RegisterPropertiesGroup,
  diagnostics: &mut Vec<Diagnostic>,
) -> ProcessResult<Vec<RegisterClusterSpec>> {
  let mut children = Vec::new();

  for node in nodes {
    match node {
      RegisterClusterNode::Register(r) => children.extend(
        RegisterSpec::new(r, preceding_path, base_address, inherited, diagnostics)?
          .into_iter()
          .map(RegisterClusterSpec::Register),
      ),
      RegisterClusterNode::Cluster(c) => children.extend(
        ClusterSpec::new(c, preceding_path, base_address, inherited, diagnostics)?
          .into_iter()
          .map(RegisterClusterSpec::Cluster),
      ),
    }
  }

  Ok(children)
}
