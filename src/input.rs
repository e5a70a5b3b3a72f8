//! The input IR: the raw device tree as delivered by an SVD parser, before
//! derivation, dimension expansion and property propagation.
//!
//! Every attribute that the SVD schema marks optional is optional here; the
//! processor fills the gaps. Nodes carry their `derivedFrom` reference as an
//! unresolved string and their `dim` group unexpanded. The tree is read-only
//! for the processor, which works on its own clone.

use crate::device::{CpuSpec, DeviceSpec, EndianSpec, SauAccessSpec};
use crate::peripheral::AddressBlockUsageSpec;
use crate::register::RegisterSpec;
use crate::cluster::{ClusterSpec, RegisterClusterSpec};
use crate::field::FieldSpec;
use crate::value::{
  DataTypeSpec, DimArrayIndexSpec, EnumUsageSpec, EnumeratedValueSetSpec, EnumeratedValueSpec,
  ModifiedWriteValuesSpec, ReadActionSpec, WriteConstraintSpec,
};
use crate::{AccessSpec, ProtectionSpec};

/// The inheritable register-properties group. Any subset may be present at
/// any level of the hierarchy; absent members inherit from the enclosing
/// level during processing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegisterPropertiesGroup {
  pub size: Option<u32>,
  pub access: Option<AccessSpec>,
  pub protection: Option<ProtectionSpec>,
  pub reset_value: Option<u64>,
  pub reset_mask: Option<u64>,
}

impl RegisterPropertiesGroup {
  /// Derivation overlay: members set on `self` stay, unset members take the
  /// base's value.
  pub(crate) fn inherit_from(&mut self, base: &Self) {
    self.size = self.size.or(base.size);
    self.access = self.access.or(base.access);
    self.protection = self.protection.or(base.protection);
    self.reset_value = self.reset_value.or(base.reset_value);
    self.reset_mask = self.reset_mask.or(base.reset_mask);
  }

  /// Propagation merge: produces the record a child carries, given `self` as
  /// the inherited record and `own` as the child's explicit values. The
  /// strictest protection qualifier wins and reset masks intersect.
  pub(crate) fn merged(&self, own: &Self) -> Self {
    Self {
      size: own.size.or(self.size),
      access: own.access.or(self.access),
      protection: match (own.protection, self.protection) {
        (Some(own), Some(inherited)) => Some(own.strictest(inherited)),
        (own, inherited) => own.or(inherited),
      },
      reset_value: own.reset_value.or(self.reset_value),
      reset_mask: match (own.reset_mask, self.reset_mask) {
        (Some(own), Some(inherited)) => Some(own & inherited),
        (own, inherited) => own.or(inherited),
      },
    }
  }

  /// The record the device roots propagation with. Unset members take the
  /// CMSIS defaults: 32-bit registers, read-write, reset value 0, all reset
  /// bits defined.
  pub(crate) fn with_device_defaults(&self) -> Self {
    Self {
      size: self.size.or(Some(32)),
      access: self.access.or(Some(AccessSpec::ReadWrite)),
      protection: self.protection,
      reset_value: self.reset_value.or(Some(0)),
      reset_mask: self.reset_mask.or(Some(0xFFFF_FFFF)),
    }
  }
}

/// The `{dim, dimIncrement, dimIndex, dimName, dimArrayIndex}` attribute
/// group. A node with `dim` set expands into `dim` sibling instances.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DimGroup {
  pub dim: Option<u32>,
  pub dim_increment: Option<u64>,
  pub dim_index: Option<String>,
  pub dim_name: Option<String>,
  pub dim_array_index: Option<DimArrayIndexNode>,
}

/// An enumeration over the indices of an array, attached via `dimArrayIndex`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DimArrayIndexNode {
  pub header_enum_name: Option<String>,
  pub values: Vec<EnumeratedValueNode>,
}

/// One symbolic value of a field, or the `isDefault` catch-all entry.
/// `value` holds the raw literal text because binary literals may carry
/// don't-care bits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumeratedValueNode {
  pub name: String,
  pub description: Option<String>,
  pub value: Option<String>,
  pub is_default: Option<bool>,
}

/// A container of enumerated values with a read/write usage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumeratedValueSetNode {
  pub name: Option<String>,
  pub header_enum_name: Option<String>,
  pub usage: Option<EnumUsageSpec>,
  pub values: Vec<EnumeratedValueNode>,
  pub derived_from: Option<String>,
}

/// A field of a register. The bit position may be given in any of the three
/// equivalent SVD forms; the processor canonicalizes to `{lsb, msb}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldNode {
  pub name: String,
  pub description: Option<String>,
  pub bit_offset: Option<u32>,
  pub bit_width: Option<u32>,
  pub lsb: Option<u32>,
  pub msb: Option<u32>,
  pub bit_range: Option<String>,
  pub access: Option<AccessSpec>,
  pub modified_write_values: Option<ModifiedWriteValuesSpec>,
  pub write_constraint: Option<WriteConstraintSpec>,
  pub read_action: Option<ReadActionSpec>,
  pub enumerated_value_sets: Vec<EnumeratedValueSetNode>,
  pub dim: DimGroup,
  pub derived_from: Option<String>,
}

/// A register.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegisterNode {
  pub name: String,
  pub display_name: Option<String>,
  pub description: Option<String>,
  pub alternate_group: Option<String>,
  pub alternate_register: Option<String>,
  pub address_offset: u64,
  pub data_type: Option<DataTypeSpec>,
  pub modified_write_values: Option<ModifiedWriteValuesSpec>,
  pub write_constraint: Option<WriteConstraintSpec>,
  pub read_action: Option<ReadActionSpec>,
  pub register_properties: RegisterPropertiesGroup,
  pub dim: DimGroup,
  pub fields: Vec<FieldNode>,
  pub derived_from: Option<String>,
}

/// A cluster: a named group of registers and nested clusters sharing an
/// address offset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterNode {
  pub name: String,
  pub description: Option<String>,
  pub alternate_cluster: Option<String>,
  pub header_struct_name: Option<String>,
  pub address_offset: u64,
  pub register_properties: RegisterPropertiesGroup,
  pub dim: DimGroup,
  pub children: Vec<RegisterClusterNode>,
  pub derived_from: Option<String>,
}

/// Registers and clusters are siblings in one source-ordered list.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterClusterNode {
  Register(RegisterNode),
  Cluster(ClusterNode),
}

impl RegisterClusterNode {
  pub fn name(&self) -> &str {
    match self {
      RegisterClusterNode::Register(r) => &r.name,
      RegisterClusterNode::Cluster(c) => &c.name,
    }
  }

  pub fn derived_from(&self) -> Option<&str> {
    match self {
      RegisterClusterNode::Register(r) => r.derived_from.as_deref(),
      RegisterClusterNode::Cluster(c) => c.derived_from.as_deref(),
    }
  }
}

/// An address range uniquely mapped to a peripheral.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AddressBlockNode {
  pub offset: u64,
  pub size: u64,
  pub usage: AddressBlockUsageSpec,
  pub protection: Option<ProtectionSpec>,
}

/// An interrupt line of a peripheral.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterruptNode {
  pub name: String,
  pub description: Option<String>,
  pub value: u32,
}

/// A peripheral.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeripheralNode {
  pub name: String,
  pub version: Option<String>,
  pub description: Option<String>,
  pub alternate_peripheral: Option<String>,
  pub group_name: Option<String>,
  pub prepend_to_name: Option<String>,
  pub append_to_name: Option<String>,
  pub header_struct_name: Option<String>,
  pub disable_condition: Option<String>,
  pub base_address: u64,
  pub register_properties: RegisterPropertiesGroup,
  pub address_blocks: Vec<AddressBlockNode>,
  pub interrupts: Vec<InterruptNode>,
  pub dim: DimGroup,
  pub children: Vec<RegisterClusterNode>,
  pub derived_from: Option<String>,
}

/// SAU region configuration on the CPU descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SauRegionsConfigNode {
  pub enabled: Option<bool>,
  pub protection_when_disabled: Option<ProtectionSpec>,
  pub regions: Vec<SauRegionNode>,
}

/// One SAU region.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SauRegionNode {
  pub enabled: Option<bool>,
  pub name: Option<String>,
  pub base: u64,
  pub limit: u64,
  pub access: SauAccessSpec,
}

/// The CPU descriptor. Presence flags are tri-state in the input; the
/// processor applies the documented defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CpuNode {
  pub name: String,
  pub revision: String,
  pub endian: EndianSpec,
  pub mpu_present: Option<bool>,
  pub fpu_present: Option<bool>,
  pub fpu_dp: Option<bool>,
  pub dsp_present: Option<bool>,
  pub icache_present: Option<bool>,
  pub dcache_present: Option<bool>,
  pub itcm_present: Option<bool>,
  pub dtcm_present: Option<bool>,
  pub vtor_present: Option<bool>,
  pub nvic_priority_bits: u32,
  pub has_vendor_systick: bool,
  pub device_num_interrupts: Option<u32>,
  pub sau_num_regions: Option<u32>,
  pub sau_regions_config: Option<SauRegionsConfigNode>,
}

/// The outermost frame of the description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceNode {
  pub vendor: Option<String>,
  pub vendor_id: Option<String>,
  pub name: String,
  pub series: Option<String>,
  pub version: String,
  pub description: String,
  pub license_text: Option<String>,
  pub cpu: Option<CpuNode>,
  pub header_system_filename: Option<String>,
  pub header_definitions_prefix: Option<String>,
  pub address_unit_bits: u32,
  pub width: u32,
  pub register_properties: RegisterPropertiesGroup,
  pub peripherals: Vec<PeripheralNode>,
  pub vendor_extensions: Option<String>,
}

impl From<&DeviceSpec> for DeviceNode {
  /// Rebuilds an input tree from a processed tree. The result carries no
  /// `derivedFrom` links and no `dim` groups; re-processing it reproduces
  /// the processed tree.
  fn from(device: &DeviceSpec) -> Self {
    Self {
      vendor: device.vendor.clone(),
      vendor_id: device.vendor_id.clone(),
      name: device.name.clone(),
      series: device.series.clone(),
      version: device.version.clone(),
      description: device.description.clone(),
      license_text: device.license_text.clone(),
      cpu: device.cpu.as_ref().map(cpu_node),
      header_system_filename: device.header_system_filename.clone(),
      header_definitions_prefix: device.header_definitions_prefix.clone(),
      address_unit_bits: device.address_unit_bits,
      width: device.width,
      register_properties: device.default_register_properties.clone(),
      peripherals: device.peripherals.iter().map(peripheral_node).collect(),
      vendor_extensions: device.vendor_extensions.clone(),
    }
  }
}

fn cpu_node(cpu: &CpuSpec) -> CpuNode {
  CpuNode {
    name: cpu.name.as_str().to_owned(),
    revision: cpu.revision.clone(),
    endian: cpu.endian.clone(),
    mpu_present: Some(cpu.mpu_present),
    fpu_present: Some(cpu.fpu_present),
    fpu_dp: Some(cpu.fpu_dp),
    dsp_present: Some(cpu.dsp_present),
    icache_present: Some(cpu.icache_present),
    dcache_present: Some(cpu.dcache_present),
    itcm_present: Some(cpu.itcm_present),
    dtcm_present: Some(cpu.dtcm_present),
    vtor_present: Some(cpu.vtor_present),
    nvic_priority_bits: cpu.nvic_priority_bits,
    has_vendor_systick: cpu.has_vendor_systick,
    device_num_interrupts: cpu.device_num_interrupts,
    sau_num_regions: cpu.sau_num_regions,
    sau_regions_config: cpu.sau_regions_config.as_ref().map(|config| {
      SauRegionsConfigNode {
        enabled: Some(config.enabled),
        protection_when_disabled: Some(config.protection_when_disabled),
        regions: config
          .regions
          .iter()
          .map(|region| SauRegionNode {
            enabled: Some(region.enabled),
            name: region.name.clone(),
            base: region.base,
            limit: region.limit,
            access: region.access.clone(),
          })
          .collect(),
      }
    }),
  }
}

fn peripheral_node(peripheral: &crate::peripheral::PeripheralSpec) -> PeripheralNode {
  PeripheralNode {
    name: peripheral.name.clone(),
    version: peripheral.version.clone(),
    description: peripheral.description.clone(),
    alternate_peripheral: peripheral.alternate_peripheral.clone(),
    group_name: peripheral.group_name.clone(),
    prepend_to_name: peripheral.prepend_to_name.clone(),
    append_to_name: peripheral.append_to_name.clone(),
    header_struct_name: peripheral.header_struct_name.clone(),
    disable_condition: peripheral.disable_condition.clone(),
    base_address: peripheral.base_address,
    register_properties: peripheral.default_register_properties.clone(),
    address_blocks: peripheral
      .address_blocks
      .iter()
      .map(|block| AddressBlockNode {
        offset: block.offset,
        size: block.size,
        usage: block.usage.clone(),
        protection: block.protection,
      })
      .collect(),
    interrupts: peripheral
      .interrupts
      .iter()
      .map(|interrupt| InterruptNode {
        name: interrupt.name.clone(),
        description: interrupt.description.clone(),
        value: interrupt.value,
      })
      .collect(),
    dim: dim_group(&peripheral.dim_array_index),
    children: peripheral.children.iter().map(register_cluster_node).collect(),
    derived_from: None,
  }
}

fn register_cluster_node(child: &RegisterClusterSpec) -> RegisterClusterNode {
  match child {
    RegisterClusterSpec::Register(r) => RegisterClusterNode::Register(register_node(r)),
    RegisterClusterSpec::Cluster(c) => RegisterClusterNode::Cluster(cluster_node(c)),
  }
}

fn cluster_node(cluster: &ClusterSpec) -> ClusterNode {
  ClusterNode {
    name: cluster.name.clone(),
    description: cluster.description.clone(),
    alternate_cluster: cluster.alternate_cluster.clone(),
    header_struct_name: cluster.header_struct_name.clone(),
    address_offset: cluster.address_offset,
    register_properties: cluster.default_register_properties.clone(),
    dim: dim_group(&cluster.dim_array_index),
    children: cluster.children.iter().map(register_cluster_node).collect(),
    derived_from: None,
  }
}

fn register_node(register: &RegisterSpec) -> RegisterNode {
  RegisterNode {
    name: register.name.clone(),
    display_name: register.display_name.clone(),
    description: register.description.clone(),
    alternate_group: register.alternate_group.clone(),
    alternate_register: register.alternate_register.clone(),
    address_offset: register.address_offset,
    data_type: register.data_type.clone(),
    modified_write_values: Some(register.modified_write_values.clone()),
    write_constraint: register.write_constraint.clone(),
    read_action: register.read_action.clone(),
    register_properties: RegisterPropertiesGroup {
      size: Some(register.size),
      access: Some(register.access),
      protection: register.protection,
      reset_value: Some(register.reset_value),
      reset_mask: Some(register.reset_mask),
    },
    dim: dim_group(&register.dim_array_index),
    fields: register.fields.iter().map(field_node).collect(),
    derived_from: None,
  }
}

fn field_node(field: &FieldSpec) -> FieldNode {
  FieldNode {
    name: field.name.clone(),
    description: field.description.clone(),
    bit_offset: None,
    bit_width: None,
    lsb: Some(field.lsb),
    msb: Some(field.msb),
    bit_range: None,
    access: Some(field.access),
    modified_write_values: Some(field.modified_write_values.clone()),
    write_constraint: field.write_constraint.clone(),
    read_action: field.read_action.clone(),
    enumerated_value_sets: field
      .enumerated_value_sets
      .iter()
      .map(enumerated_value_set_node)
      .collect(),
    dim: DimGroup::default(),
    derived_from: None,
  }
}

fn enumerated_value_set_node(set: &EnumeratedValueSetSpec) -> EnumeratedValueSetNode {
  EnumeratedValueSetNode {
    name: set.name.clone(),
    header_enum_name: set.header_enum_name.clone(),
    usage: Some(set.usage.clone()),
    values: set.values.iter().map(enumerated_value_node).collect(),
    derived_from: None,
  }
}

fn enumerated_value_node(value: &EnumeratedValueSpec) -> EnumeratedValueNode {
  EnumeratedValueNode {
    name: value.name.clone(),
    description: value.description.clone(),
    value: Some(value.value.to_string()),
    is_default: None,
  }
}

fn dim_group(dim_array_index: &Option<DimArrayIndexSpec>) -> DimGroup {
  DimGroup {
    dim_array_index: dim_array_index.as_ref().map(|index| DimArrayIndexNode {
      header_enum_name: index.header_enum_name.clone(),
      values: index.values.iter().map(enumerated_value_node).collect(),
    }),
    ..DimGroup::default()
  }
}
