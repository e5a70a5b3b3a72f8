use std::fmt;
use thiserror::Error;

/// Convenience type for a result that may contain a `Diagnostic`.
pub type ProcessResult<T> = std::result::Result<T, Diagnostic>;

/// How severe a diagnostic is. `Error` diagnostics abort processing (or, in
/// collect-and-continue mode, drop the offending subtree); `Warning`
/// diagnostics never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Warning,
  Error,
}

/// The closed set of conditions the processor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
  /// A scaled-integer or value literal does not match the SVD numeric grammar.
  MalformedNumber,

  /// A `dim` group is inconsistent: `dimIndex` length differs from `dim`,
  /// `dim` is zero, `dimIncrement` is missing or zero, or the element name
  /// lacks a `%s`/`[%s]` placeholder.
  DimIndexMismatch,

  /// A field's bit position is inconsistent, or a register size is not
  /// feasible for the device width.
  InvalidBitRange,

  /// `alternateGroup` and `alternateRegister` are both present on one
  /// register.
  ConflictingAlternate,

  /// Two siblings share a name after expansion.
  DuplicateName,

  /// Two elements occupy overlapping address (or bit) ranges without an
  /// alternate relationship legitimizing the overlay.
  AddressOverlap,

  /// A field extends past its register's bit width.
  FieldOutOfRange,

  /// A register does not lie within any `registers`-usage address block of
  /// its peripheral.
  AddressBlockViolation,

  /// A `derivedFrom` reference names nothing visible from its scope.
  UnresolvedReference,

  /// A `derivedFrom` reference resolves to a node of a different kind.
  WrongKindReference,

  /// The derivation graph contains a cycle.
  CircularInheritance,

  /// A field owns two enumerated-value containers with the same usage.
  ConflictingEnumUsage,

  /// Two enumerated values in one container share a concrete value, or a
  /// container holds more than one `isDefault` entry. The first occurrence
  /// is kept.
  DuplicateEnumValue,

  /// Expanding `isDefault` or don't-care bits would enumerate more than
  /// 2^16 values.
  DefaultExpansionOverflow,

  /// A CPU descriptor field is outside its allowed range.
  CpuFieldOutOfRange,

  /// An SAU region has `base > limit` or the region count exceeds
  /// `sauNumRegions`.
  SauRegionInvalid,

  /// A derived element repeats an attribute of its base verbatim.
  RedundantOverride,

  /// A `reserved`-usage address block contains registers.
  ReservedAddressBlock,
}

impl fmt::Display for DiagnosticKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DiagnosticKind::MalformedNumber => "MalformedNumber",
      DiagnosticKind::DimIndexMismatch => "DimIndexMismatch",
      DiagnosticKind::InvalidBitRange => "InvalidBitRange",
      DiagnosticKind::ConflictingAlternate => "ConflictingAlternate",
      DiagnosticKind::DuplicateName => "DuplicateName",
      DiagnosticKind::AddressOverlap => "AddressOverlap",
      DiagnosticKind::FieldOutOfRange => "FieldOutOfRange",
      DiagnosticKind::AddressBlockViolation => "AddressBlockViolation",
      DiagnosticKind::UnresolvedReference => "UnresolvedReference",
      DiagnosticKind::WrongKindReference => "WrongKindReference",
      DiagnosticKind::CircularInheritance => "CircularInheritance",
      DiagnosticKind::ConflictingEnumUsage => "ConflictingEnumUsage",
      DiagnosticKind::DuplicateEnumValue => "DuplicateEnumValue",
      DiagnosticKind::DefaultExpansionOverflow => "DefaultExpansionOverflow",
      DiagnosticKind::CpuFieldOutOfRange => "CpuFieldOutOfRange",
      DiagnosticKind::SauRegionInvalid => "SauRegionInvalid",
      DiagnosticKind::RedundantOverride => "RedundantOverride",
      DiagnosticKind::ReservedAddressBlock => "ReservedAddressBlock",
    };
    write!(f, "{}", name)
  }
}

/// A structured diagnostic: what went wrong, where, and the human-readable
/// detail. `path` is the pre-expansion path of the offending node where one
/// exists, or empty for device-level conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at `{path}`: {details}")]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  pub severity: Severity,
  pub path: String,
  pub details: String,
}

impl Diagnostic {
  pub(crate) fn error(kind: DiagnosticKind, path: &str, details: impl Into<String>) -> Self {
    Self {
      kind,
      severity: Severity::Error,
      path: path.to_owned(),
      details: details.into(),
    }
  }

  pub(crate) fn warning(kind: DiagnosticKind, path: &str, details: impl Into<String>) -> Self {
    Self {
      kind,
      severity: Severity::Warning,
      path: path.to_owned(),
      details: details.into(),
    }
  }

  /// Rewrites the path of a diagnostic raised by a path-agnostic helper.
  pub(crate) fn at(mut self, path: &str) -> Self {
    self.path = path.to_owned();
    self
  }

  pub fn is_error(&self) -> bool {
    self.severity == Severity::Error
  }
}

#[cfg(test)]
mod tests {
  use super::{Diagnostic, DiagnosticKind, Severity};

  #[test]
  fn displays_kind_path_and_details() {
    let diagnostic = Diagnostic::error(
      DiagnosticKind::UnresolvedReference,
      "TIMER0.CR",
      "no register named `CR2`",
    );

    assert_eq!(
      "UnresolvedReference at `TIMER0.CR`: no register named `CR2`",
      diagnostic.to_string()
    );
  }

  #[test]
  fn at_replaces_the_path() {
    let diagnostic =
      Diagnostic::error(DiagnosticKind::MalformedNumber, "", "bad digit").at("ADC1.ISR");

    assert_eq!("ADC1.ISR", diagnostic.path);
    assert_eq!(Severity::Error, diagnostic.severity);
  }
}
