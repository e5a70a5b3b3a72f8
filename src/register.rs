//! Registers: the addressable elements of the model. After processing every
//! register carries definite size, access and reset semantics, plus its
//! absolute address.

use crate::dim::{self, DimInstance};
use crate::error::{Diagnostic, DiagnosticKind, ProcessResult};
use crate::field::FieldSpec;
use crate::input::{RegisterNode, RegisterPropertiesGroup};
use crate::value::{
  DataTypeSpec, DimArrayIndexSpec, EnumeratedValueSetSpec, ModifiedWriteValuesSpec,
  ReadActionSpec, WriteConstraintSpec,
};
use crate::{clean_whitespace_opt, path, AccessSpec, ProtectionSpec};

/// Describes a register. Registers may be top-level constructs of a
/// peripheral or may be nested within clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
  preceding_path: String,
  base_address: u64,

  /// Name that identifies the register. Must be unique within the scope of
  /// its parent.
  pub name: String,

  /// Human-friendly display name. A `%s` placeholder has been substituted
  /// with the instance index.
  pub display_name: Option<String>,

  /// Description of the details of the register.
  pub description: Option<String>,

  /// Register's starting address relative to its parent.
  pub address_offset: u64,

  /// The bit width of the register.
  pub size: u32,

  /// The access rights of the register.
  pub access: AccessSpec,

  /// Protection qualifier of the register, when any level declared one.
  pub protection: Option<ProtectionSpec>,

  /// The value of the register after reset.
  pub reset_value: u64,

  /// The bits of the register that have a defined reset value.
  pub reset_mask: u64,

  /// CMSIS native type assigned to the register.
  pub data_type: Option<DataTypeSpec>,

  /// Write side effects for the register.
  pub modified_write_values: ModifiedWriteValuesSpec,

  /// Constraints for writing values to the register.
  pub write_constraint: Option<WriteConstraintSpec>,

  /// Side effect of reading the register.
  pub read_action: Option<ReadActionSpec>,

  /// The group of overlapping registers this register belongs to.
  pub alternate_group: Option<String>,

  /// The sibling register this register overlays.
  pub alternate_register: Option<String>,

  /// The fields that exist on the register.
  pub fields: Vec<FieldSpec>,

  /// Index enumeration carried over from the array this register was
  /// expanded from.
  pub dim_array_index: Option<DimArrayIndexSpec>,
}

impl RegisterSpec {
  pub(crate) fn new(
    r: &RegisterNode,
    preceding_path: &str,
    base_address: u64,
    inherited: &RegisterPropertiesGroup,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Vec<Self>> {
    let template_path = path::join(preceding_path, &r.name);

    let specs = match dim::expand_dim(&r.name, &r.dim, &template_path)? {
      None => vec![Self::from_node(
        r,
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
            r,
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

  /// The absolute memory address of this register.
  pub fn address(&self) -> u64 {
    self.base_address + self.address_offset
  }

  /// The full path to this register.
  pub fn path(&self) -> String {
    path::join(&self.preceding_path, &self.name)
  }

  /// The number of address units the register occupies.
  pub fn size_bytes(&self) -> u64 {
    u64::from((self.size + 7) / 8)
  }

  /// Iterates all the enumerated value sets on all the fields in this
  /// register.
  pub fn iter_enumerated_value_sets<'a>(
    &'a self,
  ) -> Box<dyn Iterator<Item = &'a EnumeratedValueSetSpec> + 'a> {
    Box::new(
      self
        .fields
        .iter()
        .flat_map(|f| f.enumerated_value_sets.iter()),
    )
  }

  fn from_node(
    r: &RegisterNode,
    instance: Option<&DimInstance>,
    preceding_path: &str,
    base_address: u64,
    inherited: &RegisterPropertiesGroup,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Self> {
    let name = instance.map_or_else(|| r.name.clone(), |i| i.name.clone());
    let register_path = path::join(preceding_path, &name);

    if r.alternate_group.is_some() && r.alternate_register.is_some() {
      return Err(Diagnostic::error(
        DiagnosticKind::ConflictingAlternate,
        &register_path,
        "alternateGroup and alternateRegister are mutually exclusive",
      ));
    }

    let properties = inherited.merged(&r.register_properties);
    let size = properties.size.unwrap_or(32);
    let access = properties.access.unwrap_or(AccessSpec::ReadWrite);

    let mut register = Self {
      preceding_path: preceding_path.to_owned(),
      base_address,
      name,
      display_name: dim::substitute(r.display_name.clone(), instance),
      description: dim::substitute(clean_whitespace_opt(r.description.clone()), instance),
      address_offset: r.address_offset + instance.map_or(0, |i| i.offset_delta),
      size,
      access,
      protection: properties.protection,
      reset_value: properties.reset_value.unwrap_or(0),
      reset_mask: properties.reset_mask.unwrap_or(0xFFFF_FFFF),
      data_type: r.data_type.clone(),
      modified_write_values: r.modified_write_values.clone().unwrap_or_default(),
      write_constraint: r.write_constraint.clone(),
      read_action: r.read_action.clone(),
      alternate_group: r.alternate_group.clone(),
      alternate_register: r.alternate_register.clone(),
      fields: Vec::new(),
      dim_array_index: r
        .dim
        .dim_array_index
        .as_ref()
        .map(|node| DimArrayIndexSpec::new(node, &register_path))
        .transpose()?,
    };

    let mut fields = Vec::new();
    for field_node in &r.fields {
      fields.extend(FieldSpec::new(
        field_node,
        &register_path,
        size,
        access,
        diagnostics,
      )?);
    }
    register.fields = fields;

    Ok(register)
  }
}

#[cfg(test)]
mod tests {
  use super::RegisterSpec;
  use crate::error::DiagnosticKind;
  use crate::input::{DimGroup, FieldNode, RegisterNode, RegisterPropertiesGroup};
  use crate::AccessSpec;

  fn inherited() -> RegisterPropertiesGroup {
    RegisterPropertiesGroup::default().with_device_defaults()
  }

  #[test]
  fn resolves_properties_from_the_inherited_record() {
    let node = RegisterNode {
      name: "CR".to_owned(),
      address_offset: 0x8,
      ..RegisterNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs =
      RegisterSpec::new(&node, "P1", 0x4000_0000, &inherited(), &mut diagnostics).unwrap();
    let register = &specs[0];

    assert_eq!(32, register.size);
    assert_eq!(AccessSpec::ReadWrite, register.access);
    assert_eq!(0, register.reset_value);
    assert_eq!(0xFFFF_FFFF, register.reset_mask);
    assert_eq!(0x4000_0008, register.address());
    assert_eq!("P1.CR", register.path());
  }

  #[test]
  fn own_properties_beat_the_inherited_record() {
    let node = RegisterNode {
      name: "CR".to_owned(),
      register_properties: RegisterPropertiesGroup {
        size: Some(16),
        access: Some(AccessSpec::ReadOnly),
        reset_value: Some(0x1234),
        reset_mask: Some(0xFFFF),
        ..RegisterPropertiesGroup::default()
      },
      ..RegisterNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = RegisterSpec::new(&node, "P1", 0, &inherited(), &mut diagnostics).unwrap();
    let register = &specs[0];

    assert_eq!(16, register.size);
    assert_eq!(AccessSpec::ReadOnly, register.access);
    assert_eq!(0x1234, register.reset_value);
    assert_eq!(0xFFFF, register.reset_mask);
    assert_eq!(2, register.size_bytes());
  }

  #[test]
  fn fields_inherit_register_size_and_access() {
    let node = RegisterNode {
      name: "CR".to_owned(),
      register_properties: RegisterPropertiesGroup {
        size: Some(16),
        access: Some(AccessSpec::ReadOnly),
        ..RegisterPropertiesGroup::default()
      },
      fields: vec![FieldNode {
        name: "F".to_owned(),
        bit_offset: Some(4),
        ..FieldNode::default()
      }],
      ..RegisterNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = RegisterSpec::new(&node, "P1", 0, &inherited(), &mut diagnostics).unwrap();
    let field = &specs[0].fields[0];

    assert_eq!(AccessSpec::ReadOnly, field.access);
    assert_eq!((4, 15), (field.lsb, field.msb));
  }

  #[test]
  fn expands_register_lists_with_offsets_and_descriptions() {
    let node = RegisterNode {
      name: "FOO_%s".to_owned(),
      description: Some("Bar %s".to_owned()),
      address_offset: 0x3000,
      dim: DimGroup {
        dim: Some(3),
        dim_increment: Some(0x20),
        dim_index: Some("one,two,three".to_owned()),
        ..DimGroup::default()
      },
      ..RegisterNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = RegisterSpec::new(&node, "P1", 0, &inherited(), &mut diagnostics).unwrap();

    assert_eq!(3, specs.len());

    assert_eq!("FOO_one", specs[0].name);
    assert_eq!(Some("Bar one".to_owned()), specs[0].description);
    assert_eq!(0x3000, specs[0].address_offset);

    assert_eq!("FOO_two", specs[1].name);
    assert_eq!(0x3020, specs[1].address_offset);

    assert_eq!("FOO_three", specs[2].name);
    assert_eq!(Some("Bar three".to_owned()), specs[2].description);
    assert_eq!(0x3040, specs[2].address_offset);
  }

  #[test]
  fn expands_register_arrays_with_bracketed_names() {
    let node = RegisterNode {
      name: "DATA[%s]".to_owned(),
      address_offset: 0x10,
      dim: DimGroup {
        dim: Some(2),
        dim_increment: Some(4),
        ..DimGroup::default()
      },
      ..RegisterNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs = RegisterSpec::new(&node, "P1", 0x100, &inherited(), &mut diagnostics).unwrap();

    assert_eq!("DATA[0]", specs[0].name);
    assert_eq!("DATA[1]", specs[1].name);
    assert_eq!("P1.DATA[1]", specs[1].path());
    assert_eq!(0x114, specs[1].address());
  }

  #[test]
  fn rejects_conflicting_alternates() {
    let node = RegisterNode {
      name: "CR".to_owned(),
      alternate_group: Some("G".to_owned()),
      alternate_register: Some("CR0".to_owned()),
      ..RegisterNode::default()
    };

    let mut diagnostics = Vec::new();
    let err = RegisterSpec::new(&node, "P1", 0, &inherited(), &mut diagnostics).unwrap_err();

    assert_eq!(DiagnosticKind::ConflictingAlternate, err.kind);
    assert_eq!("P1.CR", err.path);
  }
}
