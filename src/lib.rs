//! Resolves inheritance chains, expands arrays and validates CMSIS-SVD
//! device descriptions.
//!
//! The input is a raw device tree ([`input::DeviceNode`]) as delivered by an
//! SVD parser: `derivedFrom` references unresolved, `dim` groups unexpanded,
//! register properties scattered across the hierarchy. The processor turns
//! it into a fully derived tree ([`DeviceSpec`]) in which every reference is
//! resolved, every array is expanded into concrete instances, every register
//! has definite size, access and reset semantics, enumerated values are
//! flattened, and absolute addresses are computed.
//!
//! ## Example usage:
//!
//! ```
//! use svd_processor::input::{DeviceNode, PeripheralNode};
//! use svd_processor::DeviceSpec;
//!
//! let device = DeviceNode {
//!   name: "EXAMPLE".to_owned(),
//!   width: 32,
//!   peripherals: vec![PeripheralNode {
//!     name: "TIMER0".to_owned(),
//!     base_address: 0x4000_0000,
//!     ..PeripheralNode::default()
//!   }],
//!   ..DeviceNode::default()
//! };
//!
//! let processed = DeviceSpec::resolve(&device).unwrap();
//! assert_eq!(0x4000_0000, processed.peripherals[0].base_address);
//! ```
//!
//! This crate is intended for use in code generators, debugger views and
//! static analysis of register maps. XML decoding and schema validation are
//! the parser's concern; the processor assumes a syntactically well-formed
//! input tree and reports semantic problems only.

mod cluster;
mod derive;
mod device;
mod dim;
mod error;
mod field;
mod graph;
pub mod input;
pub mod num;
pub mod path;
mod peripheral;
mod register;
mod validate;
mod value;

pub use cluster::{ClusterSpec, RegisterClusterSpec};
pub use device::{
  CpuNameSpec, CpuSpec, DeviceSpec, EndianSpec, SauAccessSpec, SauRegionSpec,
  SauRegionsConfigSpec,
};
pub use error::{Diagnostic, DiagnosticKind, ProcessResult, Severity};
pub use field::FieldSpec;
pub use input::RegisterPropertiesGroup;
pub use peripheral::{AddressBlockSpec, AddressBlockUsageSpec, InterruptSpec, PeripheralSpec};
pub use register::RegisterSpec;
pub use value::{
  DataTypeSpec, DimArrayIndexSpec, EnumUsageSpec, EnumeratedValueSetSpec, EnumeratedValueSpec,
  ModifiedWriteValuesSpec, ReadActionSpec, WriteConstraintRangeSpec, WriteConstraintSpec,
};

use input::DeviceNode;

/// Defines access rights for fields on the device, though it may be
/// specified at a higher level than individual fields.
///
/// # Values
///
/// * `ReadOnly` = Read access is permitted. Write operations have an undefined effect.
/// * `ReadWrite` = Read and write accesses are permitted.
/// * `ReadWriteOnce` = Read access is always permitted. Only the first write after a reset will
/// affect the content. Following writes have an undefined effect.
/// * `WriteOnce` = Read operations have undefined results. Only the first write after a reset will
/// affect the content.
/// * `WriteOnly` = Read operations have an undefined result. Write access is permitted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessSpec {
  /// Read access is permitted. Write operations have an undefined effect.
  ReadOnly,

  /// Read and write accesses are permitted.
  ReadWrite,

  /// Read access is always permitted. Only the first write after a reset will affect the content.
  /// Following writes have an undefined effect.
  ReadWriteOnce,

  /// Read operations have undefined results. Only the first write after a reset will affect the
  /// content.
  WriteOnce,

  /// Read operations have an undefined result. Write access is permitted.
  WriteOnly,
}

impl AccessSpec {
  /// Whether the field is readable at least once.
  pub fn can_read(&self) -> bool {
    matches!(
      self,
      AccessSpec::ReadOnly | AccessSpec::ReadWrite | AccessSpec::ReadWriteOnce
    )
  }

  /// Whether the field is writable at least once.
  pub fn can_write(&self) -> bool {
    matches!(
      self,
      AccessSpec::ReadWrite
        | AccessSpec::ReadWriteOnce
        | AccessSpec::WriteOnce
        | AccessSpec::WriteOnly
    )
  }
}

/// Access protection qualifier for an address range.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProtectionSpec {
  /// Secure accesses only.
  Secure,

  /// Privileged accesses only.
  Privileged,

  /// Non-secure accesses permitted.
  NonSecure,
}

impl ProtectionSpec {
  fn rank(self) -> u8 {
    match self {
      ProtectionSpec::Secure => 3,
      ProtectionSpec::Privileged => 2,
      ProtectionSpec::NonSecure => 1,
    }
  }

  /// The stricter of two qualifiers: secure over privileged over non-secure.
  pub fn strictest(self, other: Self) -> Self {
    if self.rank() >= other.rank() {
      self
    } else {
      other
    }
  }
}

/// Configurable front door to the processor.
///
/// The default mode is fail-fast: processing aborts on the first fatal
/// diagnostic. With [`keep_going`](Processor::keep_going) the processor
/// records diagnostics, drops the offending subtree and carries on, so a
/// partial tree plus the complete diagnostic list come back together.
#[derive(Debug, Clone, Default)]
pub struct Processor {
  keep_going: bool,
}

/// What a processing run produced: the processed tree (absent when fail-fast
/// aborted), whether it is partial, and every diagnostic in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
  pub device: Option<DeviceSpec>,
  pub partial: bool,
  pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
  /// The first fatal diagnostic, if any was raised.
  pub fn first_error(&self) -> Option<&Diagnostic> {
    self.diagnostics.iter().find(|d| d.is_error())
  }
}

impl Processor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Collect diagnostics and continue past fatal ones, skipping the
  /// affected subtrees.
  pub fn keep_going(mut self, keep_going: bool) -> Self {
    self.keep_going = keep_going;
    self
  }

  /// Runs the full pipeline: reference resolution, derivation, dimension
  /// expansion, property propagation, enumeration post-processing, address
  /// computation and structural validation.
  pub fn process(&self, device: &DeviceNode) -> Resolution {
    let mut diagnostics = Vec::new();

    let materialized = derive::materialize(device, &mut diagnostics, self.keep_going);

    let device_spec = materialized
      .and_then(|working| DeviceSpec::build(&working, &mut diagnostics, self.keep_going));

    if let Some(ref spec) = device_spec {
      validate::validate_device(spec, &mut diagnostics, self.keep_going);
    }

    for warning in diagnostics.iter().filter(|d| !d.is_error()) {
      log::warn!("{}", warning);
    }

    let partial = diagnostics.iter().any(Diagnostic::is_error);
    let device = match (device_spec, self.keep_going) {
      (Some(spec), true) => Some(spec),
      (Some(spec), false) if !partial => Some(spec),
      _ => None,
    };

    Resolution {
      device,
      partial,
      diagnostics,
    }
  }
}

/// Collapses runs of whitespace in description text.
pub(crate) fn clean_whitespace_opt(text: Option<String>) -> Option<String> {
  text.map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
  use super::{AccessSpec, ProtectionSpec};

  #[test]
  fn access_read_write_flags() {
    assert!(AccessSpec::ReadOnly.can_read());
    assert!(!AccessSpec::ReadOnly.can_write());
    assert!(AccessSpec::ReadWrite.can_read());
    assert!(AccessSpec::ReadWrite.can_write());
    assert!(!AccessSpec::WriteOnly.can_read());
    assert!(AccessSpec::WriteOnce.can_write());
  }

  #[test]
  fn protection_strictest_ordering() {
    assert_eq!(
      ProtectionSpec::Secure,
      ProtectionSpec::Secure.strictest(ProtectionSpec::NonSecure)
    );
    assert_eq!(
      ProtectionSpec::Secure,
      ProtectionSpec::NonSecure.strictest(ProtectionSpec::Secure)
    );
    assert_eq!(
      ProtectionSpec::Privileged,
      ProtectionSpec::Privileged.strictest(ProtectionSpec::NonSecure)
    );
  }

  #[test]
  fn whitespace_is_collapsed() {
    assert_eq!(
      Some("one two three".to_owned()),
      super::clean_whitespace_opt(Some("one\n  two\tthree".to_owned()))
    );
    assert_eq!(None, super::clean_whitespace_opt(None));
  }
}
