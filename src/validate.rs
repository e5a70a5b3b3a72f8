//! Structural validation of the processed tree: name uniqueness, address
//! and bit-range overlaps, address-block containment, CPU and SAU sanity.

use crate::cluster::RegisterClusterSpec;
use crate::device::{CpuSpec, DeviceSpec};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::peripheral::{AddressBlockUsageSpec, PeripheralSpec};
use crate::register::RegisterSpec;

pub(crate) fn validate_device(
  device: &DeviceSpec,
  diagnostics: &mut Vec<Diagnostic>,
  keep_going: bool,
) {
  let mut validator = Validator {
    diagnostics,
    keep_going,
    stopped: false,
  };
  validator.device(device);
}

struct Validator<'a> {
  diagnostics: &'a mut Vec<Diagnostic>,
  keep_going: bool,
  stopped: bool,
}

impl Validator<'_> {
  fn error(&mut self, kind: DiagnosticKind, path: &str, details: impl Into<String>) {
    if self.stopped {
      return;
    }
    self.diagnostics.push(Diagnostic::error(kind, path, details));
    if !self.keep_going {
      self.stopped = true;
    }
  }

  fn warning(&mut self, kind: DiagnosticKind, path: &str, details: impl Into<String>) {
    if self.stopped {
      return;
    }
    self
      .diagnostics
      .push(Diagnostic::warning(kind, path, details));
  }

  fn device(&mut self, device: &DeviceSpec) {
    for (index, peripheral) in device.peripherals.iter().enumerate() {
      for other in &device.peripherals[index + 1..] {
        if peripheral.name == other.name {
          self.error(
            DiagnosticKind::DuplicateName,
            &other.path(),
            "a sibling peripheral has the same name",
          );
        } else if blocks_overlap(peripheral, other) && !peripheral_overlay(peripheral, other) {
          self.error(
            DiagnosticKind::AddressOverlap,
            &peripheral.path(),
            format!(
              "address blocks overlap those of `{}` without an alternatePeripheral relation",
              other.name
            ),
          );
        }
      }
    }

    for peripheral in &device.peripherals {
      self.peripheral(device, peripheral);
    }

    if let Some(cpu) = &device.cpu {
      self.cpu(cpu);
    }
  }

  fn peripheral(&mut self, device: &DeviceSpec, peripheral: &PeripheralSpec) {
    let blocks = &peripheral.address_blocks;
    for (index, block) in blocks.iter().enumerate() {
      for other in &blocks[index + 1..] {
        if ranges_overlap(
          (block.offset, block.offset + block.size),
          (other.offset, other.offset + other.size),
        ) {
          self.error(
            DiagnosticKind::AddressOverlap,
            &peripheral.path(),
            "two address blocks of the peripheral overlap",
          );
        }
      }
    }

    self.children(device, &peripheral.children);

    if !blocks.is_empty() {
      for register in peripheral.iter_registers() {
        let start = register.address() - peripheral.base_address;
        let end = start + register.size_bytes();

        let contained = |usage: &AddressBlockUsageSpec| {
          blocks
            .iter()
            .any(|b| b.usage == *usage && start >= b.offset && end <= b.offset + b.size)
        };

        if contained(&AddressBlockUsageSpec::Registers) {
          continue;
        }
        if contained(&AddressBlockUsageSpec::Reserved) {
          self.warning(
            DiagnosticKind::ReservedAddressBlock,
            &register.path(),
            "register lies in a reserved-usage address block",
          );
        } else {
          self.error(
            DiagnosticKind::AddressBlockViolation,
            &register.path(),
            "register does not lie within any registers-usage address block",
          );
        }
      }
    }
  }

  fn children(&mut self, device: &DeviceSpec, children: &[RegisterClusterSpec]) {
    for (index, child) in children.iter().enumerate() {
      for other in &children[index + 1..] {
        if child.name() == other.name() {
          self.error(
            DiagnosticKind::DuplicateName,
            &other.path(),
            "a sibling element has the same name",
          );
          continue;
        }

        let child_range = (
          child.address_offset(),
          child.address_offset() + child.byte_span(),
        );
        let other_range = (
          other.address_offset(),
          other.address_offset() + other.byte_span(),
        );
        if ranges_overlap(child_range, other_range) && !sibling_overlay(child, other) {
          self.error(
            DiagnosticKind::AddressOverlap,
            &child.path(),
            format!(
              "address range overlaps sibling `{}` without an alternate relation",
              other.name()
            ),
          );
        }
      }
    }

    for child in children {
      match child {
        RegisterClusterSpec::Register(register) => self.register(device, register),
        RegisterClusterSpec::Cluster(cluster) => self.children(device, &cluster.children),
      }
    }
  }

  fn register(&mut self, device: &DeviceSpec, register: &RegisterSpec) {
    if register.size == 0 {
      self.error(
        DiagnosticKind::InvalidBitRange,
        &register.path(),
        "register size must be positive",
      );
      return;
    }
    if device.width > 0 && register.size != device.width && device.width % register.size != 0 {
      self.error(
        DiagnosticKind::InvalidBitRange,
        &register.path(),
        format!(
          "register size {} neither divides nor equals the device width {}",
          register.size, device.width
        ),
      );
    }

    for (index, field) in register.fields.iter().enumerate() {
      if field.msb >= register.size {
        self.error(
          DiagnosticKind::FieldOutOfRange,
          &field.path(),
          format!(
            "bits [{}:{}] exceed the {}-bit register",
            field.msb, field.lsb, register.size
          ),
        );
      }

      for other in &register.fields[index + 1..] {
        if field.name == other.name {
          self.error(
            DiagnosticKind::DuplicateName,
            &other.path(),
            "a sibling field has the same name",
          );
          continue;
        }
        if field.lsb <= other.msb && other.lsb <= field.msb {
          self.error(
            DiagnosticKind::AddressOverlap,
            &field.path(),
            format!("bit range overlaps sibling field `{}`", other.name),
          );
        }
      }
    }
  }

  fn cpu(&mut self, cpu: &CpuSpec) {
    if !(2..=8).contains(&cpu.nvic_priority_bits) {
      self.error(
        DiagnosticKind::CpuFieldOutOfRange,
        "cpu",
        format!(
          "nvicPrioBits {} is outside the allowed range [2, 8]",
          cpu.nvic_priority_bits
        ),
      );
    }

    if let Some(config) = &cpu.sau_regions_config {
      if let Some(allowed) = cpu.sau_num_regions {
        if config.regions.len() as u32 > allowed {
          self.error(
            DiagnosticKind::SauRegionInvalid,
            "cpu",
            format!(
              "{} SAU regions configured but only {} declared",
              config.regions.len(),
              allowed
            ),
          );
        }
      }

      for (index, region) in config.regions.iter().enumerate() {
        if region.base > region.limit {
          self.error(
            DiagnosticKind::SauRegionInvalid,
            "cpu",
            format!(
              "SAU region {} has base {:#x} above limit {:#x}",
              index, region.base, region.limit
            ),
          );
        }
      }
    }
  }
}

fn ranges_overlap(a: (u64, u64), b: (u64, u64)) -> bool {
  a.0 < b.1 && b.0 < a.1
}

fn blocks_overlap(a: &PeripheralSpec, b: &PeripheralSpec) -> bool {
  for a_range in a.block_ranges() {
    for b_range in b.block_ranges() {
      if ranges_overlap(a_range, b_range) {
        return true;
      }
    }
  }
  false
}

fn peripheral_overlay(a: &PeripheralSpec, b: &PeripheralSpec) -> bool {
  a.alternate_peripheral.as_deref() == Some(b.name.as_str())
    || b.alternate_peripheral.as_deref() == Some(a.name.as_str())
}

fn sibling_overlay(a: &RegisterClusterSpec, b: &RegisterClusterSpec) -> bool {
  match (a, b) {
    (RegisterClusterSpec::Register(ra), RegisterClusterSpec::Register(rb)) => {
      ra.alternate_register.as_deref() == Some(rb.name.as_str())
        || rb.alternate_register.as_deref() == Some(ra.name.as_str())
        || (ra.alternate_group.is_some() && ra.alternate_group == rb.alternate_group)
    }
    (RegisterClusterSpec::Cluster(ca), RegisterClusterSpec::Cluster(cb)) => {
      ca.alternate_cluster.as_deref() == Some(cb.name.as_str())
        || cb.alternate_cluster.as_deref() == Some(ca.name.as_str())
    }
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use crate::error::{DiagnosticKind, Severity};
  use crate::input::{
    AddressBlockNode, CpuNode, DeviceNode, FieldNode, PeripheralNode, RegisterClusterNode,
    RegisterNode, RegisterPropertiesGroup, SauRegionNode, SauRegionsConfigNode,
  };
  use crate::peripheral::AddressBlockUsageSpec;
  use crate::Processor;

  fn process(input: &DeviceNode) -> Vec<crate::Diagnostic> {
    Processor::new().keep_going(true).process(input).diagnostics
  }

  fn device(peripherals: Vec<PeripheralNode>) -> DeviceNode {
    DeviceNode {
      name: "TESTDEV".to_owned(),
      width: 32,
      peripherals,
      ..DeviceNode::default()
    }
  }

  fn register_at(name: &str, offset: u64) -> RegisterNode {
    RegisterNode {
      name: name.to_owned(),
      address_offset: offset,
      ..RegisterNode::default()
    }
  }

  #[test]
  fn reports_duplicate_sibling_names() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![
        RegisterClusterNode::Register(register_at("CR", 0x0)),
        RegisterClusterNode::Register(register_at("CR", 0x4)),
      ],
      ..PeripheralNode::default()
    }]);

    let diagnostics = process(&input);
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::DuplicateName && d.path == "P1.CR"));
  }

  #[test]
  fn reports_register_overlap_without_alternates() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![
        RegisterClusterNode::Register(register_at("A", 0x0)),
        RegisterClusterNode::Register(register_at("B", 0x2)),
      ],
      ..PeripheralNode::default()
    }]);

    let diagnostics = process(&input);
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::AddressOverlap && d.path == "P1.A"));
  }

  #[test]
  fn alternate_register_legitimizes_overlap() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![
        RegisterClusterNode::Register(register_at("A", 0x0)),
        RegisterClusterNode::Register(RegisterNode {
          alternate_register: Some("A".to_owned()),
          ..register_at("B", 0x0)
        }),
      ],
      ..PeripheralNode::default()
    }]);

    assert!(process(&input).is_empty());
  }

  #[test]
  fn shared_alternate_group_legitimizes_overlap() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![
        RegisterClusterNode::Register(RegisterNode {
          alternate_group: Some("MODE".to_owned()),
          ..register_at("A", 0x0)
        }),
        RegisterClusterNode::Register(RegisterNode {
          alternate_group: Some("MODE".to_owned()),
          ..register_at("B", 0x0)
        }),
      ],
      ..PeripheralNode::default()
    }]);

    assert!(process(&input).is_empty());
  }

  #[test]
  fn checks_address_block_containment() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      base_address: 0x1000,
      address_blocks: vec![
        AddressBlockNode {
          offset: 0x0,
          size: 0x10,
          usage: AddressBlockUsageSpec::Registers,
          ..AddressBlockNode::default()
        },
        AddressBlockNode {
          offset: 0x10,
          size: 0x10,
          usage: AddressBlockUsageSpec::Reserved,
          ..AddressBlockNode::default()
        },
      ],
      children: vec![
        RegisterClusterNode::Register(register_at("IN", 0x0)),
        RegisterClusterNode::Register(register_at("IN_RESERVED", 0x10)),
        RegisterClusterNode::Register(register_at("OUT", 0x40)),
      ],
      ..PeripheralNode::default()
    }]);

    let diagnostics = process(&input);

    assert!(diagnostics.iter().any(|d| {
      d.kind == DiagnosticKind::ReservedAddressBlock
        && d.severity == Severity::Warning
        && d.path == "P1.IN_RESERVED"
    }));
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::AddressBlockViolation && d.path == "P1.OUT"));
    assert!(!diagnostics.iter().any(|d| d.path == "P1.IN"));
  }

  #[test]
  fn reports_overlapping_address_blocks() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      address_blocks: vec![
        AddressBlockNode {
          offset: 0x0,
          size: 0x20,
          ..AddressBlockNode::default()
        },
        AddressBlockNode {
          offset: 0x10,
          size: 0x20,
          ..AddressBlockNode::default()
        },
      ],
      ..PeripheralNode::default()
    }]);

    let diagnostics = process(&input);
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::AddressOverlap && d.path == "P1"));
  }

  #[test]
  fn reports_peripheral_overlap_unless_alternate() {
    let block = AddressBlockNode {
      offset: 0x0,
      size: 0x100,
      ..AddressBlockNode::default()
    };

    let overlapping = device(vec![
      PeripheralNode {
        name: "P1".to_owned(),
        base_address: 0x1000,
        address_blocks: vec![block.clone()],
        ..PeripheralNode::default()
      },
      PeripheralNode {
        name: "P2".to_owned(),
        base_address: 0x1080,
        address_blocks: vec![block.clone()],
        ..PeripheralNode::default()
      },
    ]);

    let diagnostics = process(&overlapping);
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::AddressOverlap && d.path == "P1"));

    let mut exempted = overlapping.clone();
    exempted.peripherals[1].alternate_peripheral = Some("P1".to_owned());
    assert!(process(&exempted).is_empty());
  }

  #[test]
  fn reports_fields_outside_and_overlapping() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![RegisterClusterNode::Register(RegisterNode {
        register_properties: RegisterPropertiesGroup {
          size: Some(8),
          ..RegisterPropertiesGroup::default()
        },
        fields: vec![
          FieldNode {
            name: "LOW".to_owned(),
            lsb: Some(0),
            msb: Some(3),
            ..FieldNode::default()
          },
          FieldNode {
            name: "CLASH".to_owned(),
            lsb: Some(2),
            msb: Some(5),
            ..FieldNode::default()
          },
          FieldNode {
            name: "HIGH".to_owned(),
            lsb: Some(6),
            msb: Some(9),
            ..FieldNode::default()
          },
        ],
        ..register_at("CR", 0x0)
      })],
      ..PeripheralNode::default()
    }]);

    let diagnostics = process(&input);

    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::AddressOverlap && d.path == "P1.CR.LOW"));
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::FieldOutOfRange && d.path == "P1.CR.HIGH"));
  }

  #[test]
  fn reports_infeasible_register_sizes() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![RegisterClusterNode::Register(RegisterNode {
        register_properties: RegisterPropertiesGroup {
          size: Some(24),
          ..RegisterPropertiesGroup::default()
        },
        ..register_at("CR", 0x0)
      })],
      ..PeripheralNode::default()
    }]);

    let diagnostics = process(&input);
    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::InvalidBitRange && d.path == "P1.CR"));
  }

  #[test]
  fn checks_cpu_and_sau_ranges() {
    let mut input = device(vec![]);
    input.cpu = Some(CpuNode {
      name: "CM33".to_owned(),
      revision: "r0p4".to_owned(),
      nvic_priority_bits: 9,
      sau_num_regions: Some(1),
      sau_regions_config: Some(SauRegionsConfigNode {
        regions: vec![
          SauRegionNode {
            base: 0x2000,
            limit: 0x1000,
            ..SauRegionNode::default()
          },
          SauRegionNode {
            base: 0x0,
            limit: 0x1000,
            ..SauRegionNode::default()
          },
        ],
        ..SauRegionsConfigNode::default()
      }),
      ..CpuNode::default()
    });

    let diagnostics = process(&input);

    assert!(diagnostics
      .iter()
      .any(|d| d.kind == DiagnosticKind::CpuFieldOutOfRange));
    // Region count exceeds sauNumRegions and region 0 runs backwards.
    assert_eq!(
      2,
      diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::SauRegionInvalid)
        .count()
    );
  }

  #[test]
  fn fail_fast_stops_at_the_first_error() {
    let input = device(vec![PeripheralNode {
      name: "P1".to_owned(),
      children: vec![
        RegisterClusterNode::Register(register_at("A", 0x0)),
        RegisterClusterNode::Register(register_at("A", 0x0)),
        RegisterClusterNode::Register(register_at("B", 0x2)),
      ],
      ..PeripheralNode::default()
    }]);

    let resolution = Processor::new().process(&input);

    assert!(resolution.device.is_none());
    assert!(resolution.partial);
    assert_eq!(
      1,
      resolution
        .diagnostics
        .iter()
        .filter(|d| d.is_error())
        .count()
    );
  }
}
