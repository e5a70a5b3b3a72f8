//! Fields of a register, with their bit positions canonicalized to
//! `{lsb, msb}` whichever of the three SVD forms declared them.

use regex::Regex;

use crate::dim::{self, DimInstance};
use crate::error::{Diagnostic, DiagnosticKind, ProcessResult};
use crate::input::FieldNode;
use crate::value::{
  check_usage_conflicts, EnumeratedValueSetSpec, ModifiedWriteValuesSpec, ReadActionSpec,
  WriteConstraintSpec,
};
use crate::{clean_whitespace_opt, path, AccessSpec};

/// Describes a field on a register.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
  preceding_path: String,

  /// A name that identifies the field. Must be unique within the parent
  /// register.
  pub name: String,

  /// Description of the field's usage, purpose, and/or operation.
  pub description: Option<String>,

  /// The position of the least-significant bit of this field within its
  /// register.
  pub lsb: u32,

  /// The position of the most-significant bit of this field within its
  /// register.
  pub msb: u32,

  /// The access rights to the field.
  pub access: AccessSpec,

  /// Describes the manipulation of data written to this field.
  pub modified_write_values: ModifiedWriteValuesSpec,

  /// Constraints for writing values to the field.
  pub write_constraint: Option<WriteConstraintSpec>,

  /// Side effect of reading the field.
  pub read_action: Option<ReadActionSpec>,

  /// The field's enumerated-value containers, flattened: at most one for
  /// reads and one for writes.
  pub enumerated_value_sets: Vec<EnumeratedValueSetSpec>,
}

impl FieldSpec {
  pub(crate) fn new(
    f: &FieldNode,
    preceding_path: &str,
    register_size: u32,
    register_access: AccessSpec,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Vec<Self>> {
    let template_path = path::join(preceding_path, &f.name);

    let specs = match dim::expand_dim(&f.name, &f.dim, &template_path)? {
      None => vec![Self::from_node(
        f,
        None,
        preceding_path,
        register_size,
        register_access,
        diagnostics,
      )?],
      Some(instances) => {
        let mut specs = Vec::with_capacity(instances.len());
        for instance in &instances {
          specs.push(Self::from_node(
            f,
            Some(instance),
            preceding_path,
            register_size,
            register_access,
            diagnostics,
          )?);
        }
        specs
      }
    };

    Ok(specs)
  }

  /// The full path to this field.
  pub fn path(&self) -> String {
    path::join(&self.preceding_path, &self.name)
  }

  /// The bit width of the field.
  pub fn width(&self) -> u32 {
    self.msb - self.lsb + 1
  }

  /// The bit offset of the field, an alias for `lsb`.
  pub fn offset(&self) -> u32 {
    self.lsb
  }

  fn from_node(
    f: &FieldNode,
    instance: Option<&DimInstance>,
    preceding_path: &str,
    register_size: u32,
    register_access: AccessSpec,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Self> {
    let name = instance.map_or_else(|| f.name.clone(), |i| i.name.clone());
    let field_path = path::join(preceding_path, &name);

    let (mut lsb, mut msb) = bit_range(f, &field_path, register_size)?;
    if let Some(instance) = instance {
      // A field array steps through bit positions, not addresses.
      lsb += instance.offset_delta as u32;
      msb += instance.offset_delta as u32;
    }

    let mut field = Self {
      preceding_path: preceding_path.to_owned(),
      name,
      description: dim::substitute(clean_whitespace_opt(f.description.clone()), instance),
      lsb,
      msb,
      access: f.access.unwrap_or(register_access),
      modified_write_values: f.modified_write_values.clone().unwrap_or_default(),
      write_constraint: f.write_constraint.clone(),
      read_action: f.read_action.clone(),
      enumerated_value_sets: Vec::new(),
    };

    let width = field.width();
    let mut sets = Vec::with_capacity(f.enumerated_value_sets.len());
    for set_node in &f.enumerated_value_sets {
      let set_path = match &set_node.name {
        Some(set_name) => path::join(&field_path, set_name),
        None => field_path.clone(),
      };
      sets.push(EnumeratedValueSetSpec::new(
        set_node,
        &set_path,
        width,
        diagnostics,
      )?);
    }
    check_usage_conflicts(&sets, &field_path)?;
    field.enumerated_value_sets = sets;

    Ok(field)
  }
}

/// The bit range a field declares explicitly, in whichever form, without
/// falling back to register-derived defaults. Used to spot redundant
/// derivation overrides.
pub(crate) fn explicit_bit_range(f: &FieldNode) -> Option<(u32, u32)> {
  if let (Some(lsb), Some(msb)) = (f.lsb, f.msb) {
    return Some((lsb, msb));
  }

  if let (Some(offset), Some(width)) = (f.bit_offset, f.bit_width) {
    if width > 0 {
      return Some((offset, offset + width - 1));
    }
    return None;
  }

  if let Some(text) = &f.bit_range {
    return parse_bit_range_text(text);
  }

  None
}

fn parse_bit_range_text(text: &str) -> Option<(u32, u32)> {
  let pattern = Regex::new(r"^\[([0-9]+):([0-9]+)\]$").unwrap();
  let captures = pattern.captures(text)?;
  let msb = captures[1].parse().ok()?;
  let lsb = captures[2].parse().ok()?;
  Some((lsb, msb))
}

fn bit_range(f: &FieldNode, field_path: &str, register_size: u32) -> ProcessResult<(u32, u32)> {
  if f.lsb.is_some() != f.msb.is_some() {
    return Err(invalid(field_path, "lsb and msb must be given together"));
  }

  if let Some(text) = &f.bit_range {
    if parse_bit_range_text(text).is_none() {
      return Err(invalid(
        field_path,
        format!("`{}` is not a valid [msb:lsb] range", text),
      ));
    }
  }

  if f.bit_width == Some(0) {
    return Err(invalid(field_path, "bitWidth must be at least 1"));
  }

  if let Some((lsb, msb)) = explicit_bit_range(f) {
    if lsb > msb {
      return Err(invalid(
        field_path,
        format!("lsb {} exceeds msb {}", lsb, msb),
      ));
    }
    return Ok((lsb, msb));
  }

  if let Some(offset) = f.bit_offset {
    // With no width, the field reaches to the top of the register.
    if offset >= register_size {
      return Err(invalid(
        field_path,
        format!(
          "bitOffset {} is outside the {}-bit register",
          offset, register_size
        ),
      ));
    }
    return Ok((offset, register_size - 1));
  }

  Err(invalid(field_path, "no bit position given"))
}

fn invalid(field_path: &str, details: impl Into<String>) -> Diagnostic {
  Diagnostic::error(DiagnosticKind::InvalidBitRange, field_path, details)
}

#[cfg(test)]
mod tests {
  use super::FieldSpec;
  use crate::error::DiagnosticKind;
  use crate::input::{DimGroup, FieldNode};
  use crate::AccessSpec;

  fn new_single(f: &FieldNode) -> FieldSpec {
    let mut diagnostics = Vec::new();
    let mut specs = FieldSpec::new(f, "P.R", 32, AccessSpec::ReadWrite, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(1, specs.len());
    specs.pop().unwrap()
  }

  #[test]
  fn canonicalizes_offset_and_width() {
    let field = new_single(&FieldNode {
      name: "F".to_owned(),
      bit_offset: Some(2),
      bit_width: Some(3),
      ..FieldNode::default()
    });

    assert_eq!(2, field.lsb);
    assert_eq!(4, field.msb);
    assert_eq!(3, field.width());
    assert_eq!(2, field.offset());
    assert_eq!("P.R.F", field.path());
  }

  #[test]
  fn canonicalizes_lsb_msb() {
    let field = new_single(&FieldNode {
      name: "F".to_owned(),
      lsb: Some(4),
      msb: Some(7),
      ..FieldNode::default()
    });

    assert_eq!((4, 7), (field.lsb, field.msb));
  }

  #[test]
  fn canonicalizes_bit_range_text() {
    let field = new_single(&FieldNode {
      name: "F".to_owned(),
      bit_range: Some("[7:4]".to_owned()),
      ..FieldNode::default()
    });

    assert_eq!((4, 7), (field.lsb, field.msb));
  }

  #[test]
  fn width_defaults_to_the_rest_of_the_register() {
    let field = new_single(&FieldNode {
      name: "F".to_owned(),
      bit_offset: Some(8),
      ..FieldNode::default()
    });

    assert_eq!((8, 31), (field.lsb, field.msb));
    assert_eq!(24, field.width());
  }

  #[test]
  fn access_falls_back_to_the_register() {
    let node = FieldNode {
      name: "F".to_owned(),
      lsb: Some(0),
      msb: Some(0),
      ..FieldNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs =
      FieldSpec::new(&node, "P.R", 32, AccessSpec::ReadOnly, &mut diagnostics).unwrap();
    assert_eq!(AccessSpec::ReadOnly, specs[0].access);

    let explicit = FieldNode {
      access: Some(AccessSpec::WriteOnly),
      ..node
    };
    let specs =
      FieldSpec::new(&explicit, "P.R", 32, AccessSpec::ReadOnly, &mut diagnostics).unwrap();
    assert_eq!(AccessSpec::WriteOnly, specs[0].access);
  }

  #[test]
  fn rejects_inconsistent_bit_positions() {
    let cases = vec![
      FieldNode {
        name: "F".to_owned(),
        lsb: Some(3),
        ..FieldNode::default()
      },
      FieldNode {
        name: "F".to_owned(),
        lsb: Some(4),
        msb: Some(2),
        ..FieldNode::default()
      },
      FieldNode {
        name: "F".to_owned(),
        bit_range: Some("7:4".to_owned()),
        ..FieldNode::default()
      },
      FieldNode {
        name: "F".to_owned(),
        bit_offset: Some(2),
        bit_width: Some(0),
        ..FieldNode::default()
      },
      FieldNode {
        name: "F".to_owned(),
        ..FieldNode::default()
      },
      FieldNode {
        name: "F".to_owned(),
        bit_offset: Some(32),
        ..FieldNode::default()
      },
    ];

    for case in cases {
      let mut diagnostics = Vec::new();
      let err = FieldSpec::new(&case, "P.R", 32, AccessSpec::ReadWrite, &mut diagnostics)
        .unwrap_err();
      assert_eq!(DiagnosticKind::InvalidBitRange, err.kind);
      assert_eq!("P.R.F", err.path);
    }
  }

  #[test]
  fn expands_field_arrays_through_bit_positions() {
    let node = FieldNode {
      name: "CH%s_EN".to_owned(),
      description: Some("Enable channel %s".to_owned()),
      lsb: Some(0),
      msb: Some(1),
      dim: DimGroup {
        dim: Some(3),
        dim_increment: Some(2),
        ..DimGroup::default()
      },
      ..FieldNode::default()
    };

    let mut diagnostics = Vec::new();
    let specs =
      FieldSpec::new(&node, "P.R", 32, AccessSpec::ReadWrite, &mut diagnostics).unwrap();

    assert_eq!(3, specs.len());
    assert_eq!("CH0_EN", specs[0].name);
    assert_eq!((0, 1), (specs[0].lsb, specs[0].msb));
    assert_eq!("CH2_EN", specs[2].name);
    assert_eq!((4, 5), (specs[2].lsb, specs[2].msb));
    assert_eq!(
      Some("Enable channel 2".to_owned()),
      specs[2].description
    );
  }
}
