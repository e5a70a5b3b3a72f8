//! Peripherals: the top-level elements of the device map, each owning its
//! base address, address blocks, interrupts and register tree.

use crate::cluster::{build_children, ClusterSpec, RegisterClusterSpec};
use crate::dim::{self, DimInstance};
use crate::error::{Diagnostic, ProcessResult};
use crate::field::FieldSpec;
use crate::input::{AddressBlockNode, InterruptNode, PeripheralNode, RegisterPropertiesGroup};
use crate::register::RegisterSpec;
use crate::value::DimArrayIndexSpec;
use crate::{clean_whitespace_opt, ProtectionSpec};

/// What an address block is used for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AddressBlockUsageSpec {
  #[default]
  Registers,
  Buffer,
  Reserved,
}

/// Describes an address range uniquely mapped to a peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressBlockSpec {
  /// The start address of the address block relative to the peripheral's
  /// base address.
  pub offset: u64,

  /// The number of address units covered by this address block.
  pub size: u64,

  /// What the address block is used for.
  pub usage: AddressBlockUsageSpec,

  /// Protection qualifier, falling back to the peripheral's.
  pub protection: Option<ProtectionSpec>,
}

impl AddressBlockSpec {
  pub(crate) fn new(ab: &AddressBlockNode, peripheral_protection: Option<ProtectionSpec>) -> Self {
    Self {
      offset: ab.offset,
      size: ab.size,
      usage: ab.usage.clone(),
      protection: ab.protection.or(peripheral_protection),
    }
  }
}

/// Describes an interrupt that exists on a peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptSpec {
  /// The unique name of the interrupt.
  pub name: String,

  /// Overview of the interrupt's purpose and function.
  pub description: Option<String>,

  /// The index value of the interrupt.
  pub value: u32,
}

impl InterruptSpec {
  pub(crate) fn new(interrupt: &InterruptNode) -> Self {
    Self {
      name: interrupt.name.clone(),
      description: interrupt.description.clone(),
      value: interrupt.value,
    }
  }
}

/// Describes a peripheral on a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralSpec {
  /// Name of the peripheral. Must be unique for the entire device.
  pub name: String,

  /// The version of the peripheral description.
  pub version: Option<String>,

  /// Overview of the purpose and functionality of the peripheral.
  pub description: Option<String>,

  /// The sibling peripheral this peripheral overlays.
  pub alternate_peripheral: Option<String>,

  /// Name of the group to which this peripheral belongs.
  pub group_name: Option<String>,

  /// Prefix a header generator inserts before every register name of this
  /// peripheral.
  pub prepend_to_name: Option<String>,

  /// Suffix a header generator appends after every register name of this
  /// peripheral.
  pub append_to_name: Option<String>,

  /// Name for the C structure a header generator emits for this peripheral.
  pub header_struct_name: Option<String>,

  /// Opaque expression a downstream consumer may use to disable the
  /// peripheral. Never evaluated here.
  pub disable_condition: Option<String>,

  /// Lowest address reserved or used by the peripheral.
  pub base_address: u64,

  /// The resolved register-properties record the peripheral hands down to
  /// its children.
  pub default_register_properties: RegisterPropertiesGroup,

  /// Address ranges uniquely mapped to this peripheral.
  pub address_blocks: Vec<AddressBlockSpec>,

  /// Interrupts that exist on this peripheral.
  pub interrupts: Vec<InterruptSpec>,

  /// Registers and clusters, in source order with expanded arrays inserted
  /// at the template's position.
  pub children: Vec<RegisterClusterSpec>,

  /// Index enumeration carried over from the array this peripheral was
  /// expanded from.
  pub dim_array_index: Option<DimArrayIndexSpec>,
}

impl PeripheralSpec {
  pub(crate) fn new(
    p: &PeripheralNode,
    inherited: &RegisterPropertiesGroup,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Vec<Self>> {
    let specs = match dim::expand_dim(&p.name, &p.dim, &p.name)? {
      None => vec![Self::from_node(p, None, inherited, diagnostics)?],
      Some(instances) => {
        let mut specs = Vec::with_capacity(instances.len());
        for instance in &instances {
          specs.push(Self::from_node(p, Some(instance), inherited, diagnostics)?);
        }
        specs
      }
    };

    Ok(specs)
  }

  /// The full path of this peripheral. Since all peripherals are top-level
  /// components of the device, this is just the name of the peripheral.
  pub fn path(&self) -> String {
    self.name.clone()
  }

  /// Recursively iterates all the register clusters contained within this
  /// peripheral.
  pub fn iter_clusters<'a>(&'a self) -> Box<dyn Iterator<Item = &'a ClusterSpec> + 'a> {
    Box::new(self.children.iter().flat_map(|child| match child {
      RegisterClusterSpec::Cluster(c) => c.iter_clusters(),
      RegisterClusterSpec::Register(_) => {
        Box::new(std::iter::empty()) as Box<dyn Iterator<Item = &'a ClusterSpec> + 'a>
      }
    }))
  }

  /// Recursively iterates all the registers contained within this
  /// peripheral.
  pub fn iter_registers<'a>(&'a self) -> Box<dyn Iterator<Item = &'a RegisterSpec> + 'a> {
    Box::new(self.children.iter().flat_map(|child| match child {
      RegisterClusterSpec::Register(r) => {
        Box::new(std::iter::once(r)) as Box<dyn Iterator<Item = &'a RegisterSpec> + 'a>
      }
      RegisterClusterSpec::Cluster(c) => c.iter_registers(),
    }))
  }

  /// Recursively iterates all the register fields contained within this
  /// peripheral.
  pub fn iter_fields<'a>(&'a self) -> Box<dyn Iterator<Item = &'a FieldSpec> + 'a> {
    Box::new(self.iter_registers().flat_map(|r| r.fields.iter()))
  }

  /// The absolute address ranges of this peripheral's address blocks.
  pub(crate) fn block_ranges(&self) -> Vec<(u64, u64)> {
    self
      .address_blocks
      .iter()
      .map(|block| {
        (
          self.base_address + block.offset,
          self.base_address + block.offset + block.size,
        )
      })
      .collect()
  }

  fn from_node(
    p: &PeripheralNode,
    instance: Option<&DimInstance>,
    inherited: &RegisterPropertiesGroup,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Self> {
    let name = instance.map_or_else(|| p.name.clone(), |i| i.name.clone());
    let base_address = p.base_address + instance.map_or(0, |i| i.offset_delta);
    let properties = inherited.merged(&p.register_properties);

    let mut peripheral = Self {
      name: name.clone(),
      version: p.version.clone(),
      description: dim::substitute(clean_whitespace_opt(p.description.clone()), instance),
      alternate_peripheral: p.alternate_peripheral.clone(),
      group_name: p.group_name.clone(),
      prepend_to_name: p.prepend_to_name.clone(),
      append_to_name: p.append_to_name.clone(),
      header_struct_name: p.header_struct_name.clone(),
      disable_condition: p.disable_condition.clone(),
      base_address,
      default_register_properties: properties.clone(),
      address_blocks: p
        .address_blocks
        .iter()
        .map(|block| AddressBlockSpec::new(block, properties.protection))
        .collect(),
      interrupts: p.interrupts.iter().map(InterruptSpec::new).collect(),
      children: Vec::new(),
      dim_array_index: p
        .dim
        .dim_array_index
        .as_ref()
        .map(|node| DimArrayIndexSpec::new(node, &name))
        .transpose()?,
    };

    peripheral.children =
      build_children(&p.children, &name, base_address, &properties, diagnostics)?;

    Ok(peripheral)
  }
}

#[cfg(test)]
mod tests {
  use super::PeripheralSpec;
  use crate::input::{
    AddressBlockNode, ClusterNode, DimGroup, InterruptNode, PeripheralNode, RegisterClusterNode,
    RegisterNode, RegisterPropertiesGroup,
  };
  use crate::peripheral::AddressBlockUsageSpec;
  use crate::ProtectionSpec;

  fn inherited() -> RegisterPropertiesGroup {
    RegisterPropertiesGroup::default().with_device_defaults()
  }

  #[test]
  fn keeps_blocks_interrupts_and_children() {
    let node = PeripheralNode {
      name: "UART0".to_owned(),
      base_address: 0x4000_2000,
      address_blocks: vec![AddressBlockNode {
        offset: 0,
        size: 0x400,
        usage: AddressBlockUsageSpec::Registers,
        ..AddressBlockNode::default()
      }],
      interrupts: vec![InterruptNode {
        name: "UART0_IRQ".to_owned(),
        value: 17,
        ..InterruptNode::default()
      }],
      children: vec![
        RegisterClusterNode::Register(RegisterNode {
          name: "DR".to_owned(),
          address_offset: 0x0,
          ..RegisterNode::default()
        }),
        RegisterClusterNode::Cluster(ClusterNode {
          name: "CFG".to_owned(),
          address_offset: 0x10,
          children: vec![RegisterClusterNode::Register(RegisterNode {
            name: "BAUD".to_owned(),
            address_offset: 0x0,
            ..RegisterNode::default()
          })],
          ..ClusterNode::default()
        }),
      ],
      ..PeripheralNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = PeripheralSpec::new(&node, &inherited(), &mut diagnostics).unwrap();
    let peripheral = &specs[0];

    assert_eq!("UART0", peripheral.path());
    assert_eq!(1, peripheral.interrupts.len());
    assert_eq!(vec![(0x4000_2000, 0x4000_2400)], peripheral.block_ranges());
    assert_eq!(2, peripheral.children.len());

    let registers: Vec<String> = peripheral.iter_registers().map(|r| r.path()).collect();
    assert_eq!(vec!["UART0.DR", "UART0.CFG.BAUD"], registers);
    assert_eq!(1, peripheral.iter_clusters().count());
  }

  #[test]
  fn address_blocks_inherit_the_peripheral_protection() {
    let node = PeripheralNode {
      name: "SEC".to_owned(),
      register_properties: RegisterPropertiesGroup {
        protection: Some(ProtectionSpec::Secure),
        ..RegisterPropertiesGroup::default()
      },
      address_blocks: vec![AddressBlockNode {
        offset: 0,
        size: 0x100,
        ..AddressBlockNode::default()
      }],
      ..PeripheralNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = PeripheralSpec::new(&node, &inherited(), &mut diagnostics).unwrap();

    assert_eq!(
      Some(ProtectionSpec::Secure),
      specs[0].address_blocks[0].protection
    );
  }

  #[test]
  fn expands_peripheral_arrays_through_base_addresses() {
    let node = PeripheralNode {
      name: "TIMER[%s]".to_owned(),
      base_address: 0x4000_3000,
      dim: DimGroup {
        dim: Some(2),
        dim_increment: Some(0x1000),
        ..DimGroup::default()
      },
      children: vec![RegisterClusterNode::Register(RegisterNode {
        name: "CR".to_owned(),
        address_offset: 0x0,
        ..RegisterNode::default()
      })],
      ..PeripheralNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = PeripheralSpec::new(&node, &inherited(), &mut diagnostics).unwrap();

    assert_eq!(2, specs.len());
    assert_eq!("TIMER[0]", specs[0].name);
    assert_eq!(0x4000_3000, specs[0].base_address);
    assert_eq!("TIMER[1]", specs[1].name);
    assert_eq!(0x4000_4000, specs[1].base_address);

    let register = specs[1].iter_registers().next().unwrap();
    assert_eq!("TIMER[1].CR", register.path());
    assert_eq!(0x4000_4000, register.address());
  }
}
