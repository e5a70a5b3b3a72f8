//! Value-level pieces of the model: write semantics, data types and the
//! enumerated-value post-processor that flattens `isDefault` and don't-care
//! entries into explicit value sets.

use crate::error::{Diagnostic, DiagnosticKind, ProcessResult};
use crate::input::{DimArrayIndexNode, EnumeratedValueSetNode};
use crate::num;

/// Describes the manipulation of data written to a register or field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModifiedWriteValuesSpec {
  OneToClear,
  OneToSet,
  OneToToggle,
  ZeroToClear,
  ZeroToSet,
  ZeroToToggle,
  Clear,
  Set,
  /// The value written is the value stored. This is the default.
  #[default]
  Modify,
}

/// Constraints for writing values to a register or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConstraintSpec {
  /// Only the values in the field's enumerated-value containers may be
  /// written.
  UseEnumeratedValues,

  /// Only values inside a range may be written.
  Range(WriteConstraintRangeSpec),

  /// Only the last-read value may be written back.
  WriteAsRead,
}

/// The inclusive value range of a `Range` write constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConstraintRangeSpec {
  pub min: u64,
  pub max: u64,
}

/// Side effect of reading a register or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadActionSpec {
  Clear,
  Set,
  Modify,
  ModifyExternal,
}

/// CMSIS native data type assigned to a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTypeSpec {
  Uint8,
  Uint16,
  Uint32,
  Uint64,
  Int8,
  Int16,
  Int32,
  Int64,
  Uint8Ptr,
  Uint16Ptr,
  Uint32Ptr,
  Uint64Ptr,
  Int8Ptr,
  Int16Ptr,
  Int32Ptr,
  Int64Ptr,
}

/// Whether an enumerated-value container applies to reads, writes or both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnumUsageSpec {
  Read,
  Write,
  #[default]
  ReadWrite,
}

impl EnumUsageSpec {
  pub fn as_str(&self) -> &'static str {
    match self {
      EnumUsageSpec::Read => "read",
      EnumUsageSpec::Write => "write",
      EnumUsageSpec::ReadWrite => "read-write",
    }
  }
}

/// A symbolic name for one concrete value of a field. After processing,
/// every entry carries a concrete value; `isDefault` and don't-care entries
/// have been expanded away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedValueSpec {
  pub name: String,
  pub description: Option<String>,
  pub value: u64,
}

/// The index enumeration attached to an expanded array via `dimArrayIndex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimArrayIndexSpec {
  pub header_enum_name: Option<String>,
  pub values: Vec<EnumeratedValueSpec>,
}

impl DimArrayIndexSpec {
  pub(crate) fn new(node: &DimArrayIndexNode, node_path: &str) -> ProcessResult<Self> {
    let values = node
      .values
      .iter()
      .map(|value| {
        let Some(text) = &value.value else {
          return Err(Diagnostic::error(
            DiagnosticKind::MalformedNumber,
            node_path,
            format!("`dimArrayIndex` entry `{}` has no value", value.name),
          ));
        };
        let literal = num::parse_value_literal(text).map_err(|d| d.at(node_path))?;
        if literal.has_dont_care() {
          return Err(Diagnostic::error(
            DiagnosticKind::MalformedNumber,
            node_path,
            format!(
              "`dimArrayIndex` entry `{}` may not use don't-care bits",
              value.name
            ),
          ));
        }
        Ok(EnumeratedValueSpec {
          name: value.name.clone(),
          description: value.description.clone(),
          value: literal.expand()[0],
        })
      })
      .collect::<ProcessResult<Vec<_>>>()?;

    Ok(Self {
      header_enum_name: node.header_enum_name.clone(),
      values,
    })
  }
}

/// A processed enumerated-value container: usage resolved, every entry
/// concrete, entries sorted by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedValueSetSpec {
  pub name: Option<String>,
  pub header_enum_name: Option<String>,
  pub usage: EnumUsageSpec,
  pub values: Vec<EnumeratedValueSpec>,

  /// Whether the container names every value in the field's value space.
  pub complete: bool,
}

impl EnumeratedValueSetSpec {
  pub(crate) fn new(
    set: &EnumeratedValueSetNode,
    set_path: &str,
    width: u32,
    diagnostics: &mut Vec<Diagnostic>,
  ) -> ProcessResult<Self> {
    let mut values: Vec<EnumeratedValueSpec> = Vec::new();
    let mut default_entry = None;

    for value_node in &set.values {
      if value_node.is_default == Some(true) {
        if value_node.value.is_some() {
          return Err(Diagnostic::error(
            DiagnosticKind::MalformedNumber,
            set_path,
            format!(
              "`{}` carries both a value and isDefault",
              value_node.name
            ),
          ));
        }
        if default_entry.is_some() {
          diagnostics.push(Diagnostic::warning(
            DiagnosticKind::DuplicateEnumValue,
            set_path,
            "more than one isDefault entry; the first is kept",
          ));
          continue;
        }
        default_entry = Some(value_node);
        continue;
      }

      let Some(literal_text) = &value_node.value else {
        return Err(Diagnostic::error(
          DiagnosticKind::MalformedNumber,
          set_path,
          format!(
            "`{}` has neither a value nor isDefault",
            value_node.name
          ),
        ));
      };

      let literal = num::parse_value_literal(literal_text).map_err(|d| d.at(set_path))?;
      let wildcard = literal.has_dont_care();

      if wildcard && width > 16 {
        return Err(Diagnostic::error(
          DiagnosticKind::DefaultExpansionOverflow,
          set_path,
          format!(
            "don't-care expansion is not practical for a {}-bit field",
            width
          ),
        ));
      }

      for concrete in literal.expand() {
        if width < 64 && concrete >= 1 << width {
          return Err(Diagnostic::error(
            DiagnosticKind::FieldOutOfRange,
            set_path,
            format!("value {:#x} does not fit in {} bits", concrete, width),
          ));
        }

        if values.iter().any(|v| v.value == concrete) {
          // An expanded don't-care value losing to an explicit entry is by
          // the book; an explicit duplicate is reported.
          if !wildcard {
            diagnostics.push(Diagnostic::warning(
              DiagnosticKind::DuplicateEnumValue,
              set_path,
              format!(
                "value {:#x} is declared more than once; the first occurrence is kept",
                concrete
              ),
            ));
          }
          continue;
        }

        let name = if wildcard {
          format!("{}_{}", value_node.name, concrete)
        } else {
          value_node.name.clone()
        };

        values.push(EnumeratedValueSpec {
          name,
          description: value_node.description.clone(),
          value: concrete,
        });
      }
    }

    if let Some(default) = default_entry {
      if width > 16 {
        return Err(Diagnostic::error(
          DiagnosticKind::DefaultExpansionOverflow,
          set_path,
          format!(
            "isDefault expansion is not practical for a {}-bit field",
            width
          ),
        ));
      }

      for concrete in 0..1u64 << width {
        if !values.iter().any(|v| v.value == concrete) {
          values.push(EnumeratedValueSpec {
            name: default.name.clone(),
            description: default.description.clone(),
            value: concrete,
          });
        }
      }
    }

    values.sort_by_key(|v| v.value);

    let complete = default_entry.is_some()
      || (width < 64 && values.len() as u64 == 1 << width);

    Ok(Self {
      name: set.name.clone(),
      header_enum_name: set.header_enum_name.clone(),
      usage: set.usage.clone().unwrap_or_default(),
      values,
      complete,
    })
  }
}

/// Enforces the per-field container rules: at most one `read` and one
/// `write` container, with a `read-write` container counting as both.
pub(crate) fn check_usage_conflicts(
  sets: &[EnumeratedValueSetSpec],
  field_path: &str,
) -> ProcessResult<()> {
  if sets.len() > 2 {
    return Err(Diagnostic::error(
      DiagnosticKind::ConflictingEnumUsage,
      field_path,
      "a field may own at most two enumerated-value containers",
    ));
  }

  let mut read_taken = false;
  let mut write_taken = false;

  for set in sets {
    let (reads, writes) = match set.usage {
      EnumUsageSpec::Read => (true, false),
      EnumUsageSpec::Write => (false, true),
      EnumUsageSpec::ReadWrite => (true, true),
    };

    if (reads && read_taken) || (writes && write_taken) {
      return Err(Diagnostic::error(
        DiagnosticKind::ConflictingEnumUsage,
        field_path,
        format!("two containers cover the `{}` usage", set.usage.as_str()),
      ));
    }

    read_taken |= reads;
    write_taken |= writes;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::{check_usage_conflicts, EnumUsageSpec, EnumeratedValueSetSpec};
  use crate::error::{DiagnosticKind, Severity};
  use crate::input::{EnumeratedValueNode, EnumeratedValueSetNode};

  fn value(name: &str, literal: &str) -> EnumeratedValueNode {
    EnumeratedValueNode {
      name: name.to_owned(),
      value: Some(literal.to_owned()),
      ..EnumeratedValueNode::default()
    }
  }

  fn default_value(name: &str) -> EnumeratedValueNode {
    EnumeratedValueNode {
      name: name.to_owned(),
      is_default: Some(true),
      ..EnumeratedValueNode::default()
    }
  }

  fn set(values: Vec<EnumeratedValueNode>) -> EnumeratedValueSetNode {
    EnumeratedValueSetNode {
      values,
      ..EnumeratedValueSetNode::default()
    }
  }

  #[test]
  fn resolves_plain_values_and_usage_default() {
    let mut diagnostics = Vec::new();
    let processed = EnumeratedValueSetSpec::new(
      &set(vec![value("OFF", "0"), value("ON", "1")]),
      "F",
      1,
      &mut diagnostics,
    )
    .unwrap();

    assert!(diagnostics.is_empty());
    assert_eq!(EnumUsageSpec::ReadWrite, processed.usage);
    assert_eq!(2, processed.values.len());
    assert_eq!("OFF", processed.values[0].name);
    assert_eq!(0, processed.values[0].value);
    assert_eq!("ON", processed.values[1].name);
    assert!(processed.complete);
  }

  #[test]
  fn expands_is_default_over_the_value_space() {
    let mut diagnostics = Vec::new();
    let processed = EnumeratedValueSetSpec::new(
      &set(vec![value("Name_2", "0b10"), default_value("default")]),
      "F",
      2,
      &mut diagnostics,
    )
    .unwrap();

    assert_eq!(4, processed.values.len());
    let rendered: Vec<(u64, &str)> = processed
      .values
      .iter()
      .map(|v| (v.value, v.name.as_str()))
      .collect();
    assert_eq!(
      vec![(0, "default"), (1, "default"), (2, "Name_2"), (3, "default")],
      rendered
    );
    assert!(processed.complete);
  }

  #[test]
  fn expands_dont_care_values_and_keeps_explicit_winners() {
    let mut diagnostics = Vec::new();
    let processed = EnumeratedValueSetSpec::new(
      &set(vec![value("EXACT", "0b110"), value("ANY", "0b1x0")]),
      "F",
      3,
      &mut diagnostics,
    )
    .unwrap();

    // `0b1x0` denotes {4, 6}; 6 collides with the explicit entry and drops
    // out silently.
    assert!(diagnostics.is_empty());
    let rendered: Vec<(u64, &str)> = processed
      .values
      .iter()
      .map(|v| (v.value, v.name.as_str()))
      .collect();
    assert_eq!(vec![(4, "ANY_4"), (6, "EXACT")], rendered);
    assert!(!processed.complete);
  }

  #[test]
  fn warns_on_duplicate_explicit_values() {
    let mut diagnostics = Vec::new();
    let processed = EnumeratedValueSetSpec::new(
      &set(vec![value("A", "1"), value("B", "0x1")]),
      "F",
      2,
      &mut diagnostics,
    )
    .unwrap();

    assert_eq!(1, diagnostics.len());
    assert_eq!(DiagnosticKind::DuplicateEnumValue, diagnostics[0].kind);
    assert_eq!(Severity::Warning, diagnostics[0].severity);
    assert_eq!(1, processed.values.len());
    assert_eq!("A", processed.values[0].name);
  }

  #[test]
  fn rejects_expansion_on_wide_fields() {
    let mut diagnostics = Vec::new();

    let err = EnumeratedValueSetSpec::new(
      &set(vec![value("ANY", "0b1x")]),
      "F",
      17,
      &mut diagnostics,
    )
    .unwrap_err();
    assert_eq!(DiagnosticKind::DefaultExpansionOverflow, err.kind);

    let err = EnumeratedValueSetSpec::new(
      &set(vec![default_value("default")]),
      "F",
      17,
      &mut diagnostics,
    )
    .unwrap_err();
    assert_eq!(DiagnosticKind::DefaultExpansionOverflow, err.kind);

    // 16 bits is the documented limit for don't-care expansion.
    assert!(EnumeratedValueSetSpec::new(
      &set(vec![value("ANY", "0bx1")]),
      "F",
      16,
      &mut diagnostics,
    )
    .is_ok());
  }

  #[test]
  fn rejects_values_outside_the_field() {
    let mut diagnostics = Vec::new();
    let err = EnumeratedValueSetSpec::new(
      &set(vec![value("BIG", "4")]),
      "F",
      2,
      &mut diagnostics,
    )
    .unwrap_err();

    assert_eq!(DiagnosticKind::FieldOutOfRange, err.kind);
  }

  #[test]
  fn rejects_entries_without_value_or_default() {
    let mut diagnostics = Vec::new();
    let err = EnumeratedValueSetSpec::new(
      &set(vec![EnumeratedValueNode {
        name: "EMPTY".to_owned(),
        ..EnumeratedValueNode::default()
      }]),
      "F",
      1,
      &mut diagnostics,
    )
    .unwrap_err();

    assert_eq!(DiagnosticKind::MalformedNumber, err.kind);
  }

  #[test]
  fn usage_conflicts_are_detected() {
    let mut diagnostics = Vec::new();
    let read_set = EnumeratedValueSetSpec::new(
      &EnumeratedValueSetNode {
        usage: Some(EnumUsageSpec::Read),
        values: vec![value("A", "0")],
        ..EnumeratedValueSetNode::default()
      },
      "F",
      1,
      &mut diagnostics,
    )
    .unwrap();
    let write_set = EnumeratedValueSetSpec::new(
      &EnumeratedValueSetNode {
        usage: Some(EnumUsageSpec::Write),
        values: vec![value("B", "1")],
        ..EnumeratedValueSetNode::default()
      },
      "F",
      1,
      &mut diagnostics,
    )
    .unwrap();
    let both_set = EnumeratedValueSetSpec::new(
      &EnumeratedValueSetNode {
        values: vec![value("C", "0")],
        ..EnumeratedValueSetNode::default()
      },
      "F",
      1,
      &mut diagnostics,
    )
    .unwrap();

    assert!(check_usage_conflicts(&[read_set.clone(), write_set.clone()], "F").is_ok());
    assert!(check_usage_conflicts(&[both_set.clone()], "F").is_ok());

    let err = check_usage_conflicts(&[read_set.clone(), both_set], "F").unwrap_err();
    assert_eq!(DiagnosticKind::ConflictingEnumUsage, err.kind);

    let err = check_usage_conflicts(&[read_set.clone(), read_set], "F").unwrap_err();
    assert_eq!(DiagnosticKind::ConflictingEnumUsage, err.kind);
  }
}
