//! The device: the outermost frame of the processed model, plus the CPU
//! descriptor.

use crate::cluster::ClusterSpec;
use crate::error::{Diagnostic, DiagnosticKind, ProcessResult};
use crate::field::FieldSpec;
use crate::input::{CpuNode, DeviceNode, RegisterPropertiesGroup, SauRegionsConfigNode};
use crate::peripheral::PeripheralSpec;
use crate::register::RegisterSpec;
use crate::{Processor, ProtectionSpec};

/// Byte ordering of the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndianSpec {
  #[default]
  Little,
  Big,
  Selectable,
  Other,
}

/// The closed set of CPU names the schema admits, with a catch-all for
/// vendor-specific cores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuNameSpec {
  Cm0,
  Cm0Plus,
  Cm1,
  Cm3,
  Cm4,
  Cm7,
  Cm23,
  Cm33,
  Cm35P,
  Cm52,
  Cm55,
  Cm85,
  Sc000,
  Sc300,
  Armv8Mml,
  Armv8Mbl,
  Armv81Mml,
  Ca5,
  Ca7,
  Ca8,
  Ca9,
  Ca15,
  Ca17,
  Ca53,
  Ca57,
  Ca72,
  Smc1,
  Other(String),
}

impl CpuNameSpec {
  /// Maps the schema token onto the name. `CM0+` normalizes to `CM0PLUS`;
  /// unknown tokens are carried through verbatim.
  pub fn from_name(label: &str) -> Self {
    match label.to_uppercase().as_str() {
      "CM0" => CpuNameSpec::Cm0,
      "CM0PLUS" | "CM0+" => CpuNameSpec::Cm0Plus,
      "CM1" => CpuNameSpec::Cm1,
      "CM3" => CpuNameSpec::Cm3,
      "CM4" => CpuNameSpec::Cm4,
      "CM7" => CpuNameSpec::Cm7,
      "CM23" => CpuNameSpec::Cm23,
      "CM33" => CpuNameSpec::Cm33,
      "CM35P" => CpuNameSpec::Cm35P,
      "CM52" => CpuNameSpec::Cm52,
      "CM55" => CpuNameSpec::Cm55,
      "CM85" => CpuNameSpec::Cm85,
      "SC000" => CpuNameSpec::Sc000,
      "SC300" => CpuNameSpec::Sc300,
      "ARMV8MML" => CpuNameSpec::Armv8Mml,
      "ARMV8MBL" => CpuNameSpec::Armv8Mbl,
      "ARMV81MML" => CpuNameSpec::Armv81Mml,
      "CA5" => CpuNameSpec::Ca5,
      "CA7" => CpuNameSpec::Ca7,
      "CA8" => CpuNameSpec::Ca8,
      "CA9" => CpuNameSpec::Ca9,
      "CA15" => CpuNameSpec::Ca15,
      "CA17" => CpuNameSpec::Ca17,
      "CA53" => CpuNameSpec::Ca53,
      "CA57" => CpuNameSpec::Ca57,
      "CA72" => CpuNameSpec::Ca72,
      "SMC1" => CpuNameSpec::Smc1,
      _ => CpuNameSpec::Other(label.to_owned()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      CpuNameSpec::Cm0 => "CM0",
      CpuNameSpec::Cm0Plus => "CM0PLUS",
      CpuNameSpec::Cm1 => "CM1",
      CpuNameSpec::Cm3 => "CM3",
      CpuNameSpec::Cm4 => "CM4",
      CpuNameSpec::Cm7 => "CM7",
      CpuNameSpec::Cm23 => "CM23",
      CpuNameSpec::Cm33 => "CM33",
      CpuNameSpec::Cm35P => "CM35P",
      CpuNameSpec::Cm52 => "CM52",
      CpuNameSpec::Cm55 => "CM55",
      CpuNameSpec::Cm85 => "CM85",
      CpuNameSpec::Sc000 => "SC000",
      CpuNameSpec::Sc300 => "SC300",
      CpuNameSpec::Armv8Mml => "ARMV8MML",
      CpuNameSpec::Armv8Mbl => "ARMV8MBL",
      CpuNameSpec::Armv81Mml => "ARMV81MML",
      CpuNameSpec::Ca5 => "CA5",
      CpuNameSpec::Ca7 => "CA7",
      CpuNameSpec::Ca8 => "CA8",
      CpuNameSpec::Ca9 => "CA9",
      CpuNameSpec::Ca15 => "CA15",
      CpuNameSpec::Ca17 => "CA17",
      CpuNameSpec::Ca53 => "CA53",
      CpuNameSpec::Ca57 => "CA57",
      CpuNameSpec::Ca72 => "CA72",
      CpuNameSpec::Smc1 => "SMC1",
      CpuNameSpec::Other(label) => label,
    }
  }
}

/// Whether an SAU region is callable from non-secure state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SauAccessSpec {
  NonSecureCallable,
  #[default]
  NonSecure,
}

/// One SAU region with its resolved enable flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SauRegionSpec {
  pub enabled: bool,
  pub name: Option<String>,
  pub base: u64,
  pub limit: u64,
  pub access: SauAccessSpec,
}

/// SAU region configuration with its resolved defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SauRegionsConfigSpec {
  pub enabled: bool,
  pub protection_when_disabled: ProtectionSpec,
  pub regions: Vec<SauRegionSpec>,
}

impl SauRegionsConfigSpec {
  fn new(node: &SauRegionsConfigNode) -> Self {
    Self {
      enabled: node.enabled.unwrap_or(true),
      protection_when_disabled: node
        .protection_when_disabled
        .unwrap_or(ProtectionSpec::Secure),
      regions: node
        .regions
        .iter()
        .map(|region| SauRegionSpec {
          enabled: region.enabled.unwrap_or(true),
          name: region.name.clone(),
          base: region.base,
          limit: region.limit,
          access: region.access.clone(),
        })
        .collect(),
    }
  }
}

/// The CPU descriptor with every presence flag resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSpec {
  pub name: CpuNameSpec,
  pub revision: String,
  pub endian: EndianSpec,
  pub mpu_present: bool,
  pub fpu_present: bool,
  pub fpu_dp: bool,
  pub dsp_present: bool,
  pub icache_present: bool,
  pub dcache_present: bool,
  pub itcm_present: bool,
  pub dtcm_present: bool,
  pub vtor_present: bool,
  pub nvic_priority_bits: u32,
  pub has_vendor_systick: bool,
  pub device_num_interrupts: Option<u32>,
  pub sau_num_regions: Option<u32>,
  pub sau_regions_config: Option<SauRegionsConfigSpec>,
}

impl CpuSpec {
  pub(crate) fn new(node: &CpuNode) -> Self {
    Self {
      name: CpuNameSpec::from_name(&node.name),
      revision: node.revision.clone(),
      endian: node.endian.clone(),
      mpu_present: node.mpu_present.unwrap_or(false),
      fpu_present: node.fpu_present.unwrap_or(false),
      fpu_dp: node.fpu_dp.unwrap_or(false),
      dsp_present: node.dsp_present.unwrap_or(false),
      icache_present: node.icache_present.unwrap_or(false),
      dcache_present: node.dcache_present.unwrap_or(false),
      itcm_present: node.itcm_present.unwrap_or(false),
      dtcm_present: node.dtcm_present.unwrap_or(false),
      vtor_present: node.vtor_present.unwrap_or(true),
      nvic_priority_bits: node.nvic_priority_bits,
      has_vendor_systick: node.has_vendor_systick,
      device_num_interrupts: node.device_num_interrupts,
      sau_num_regions: node.sau_num_regions,
      sau_regions_config: node.sau_regions_config.as_ref().map(SauRegionsConfigSpec::new),
    }
  }
}

/// The fully processed device: references resolved, arrays expanded,
/// properties propagated, enumerations flattened, addresses computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
  pub vendor: Option<String>,
  pub vendor_id: Option<String>,

  /// The name of the device or device series.
  pub name: String,

  pub series: Option<String>,
  pub version: String,
  pub description: String,
  pub license_text: Option<String>,
  pub cpu: Option<CpuSpec>,
  pub header_system_filename: Option<String>,
  pub header_definitions_prefix: Option<String>,

  /// Number of bits in one address unit.
  pub address_unit_bits: u32,

  /// Maximum bus width of the device.
  pub width: u32,

  /// The register-properties record the device roots propagation with,
  /// CMSIS defaults filled in.
  pub default_register_properties: RegisterPropertiesGroup,

  pub peripherals: Vec<PeripheralSpec>,

  /// Opaque vendor-extension payload, passed through untouched.
  pub vendor_extensions: Option<String>,
}

impl DeviceSpec {
  /// Processes an input tree, failing on the first fatal diagnostic. Use
  /// [`Processor`] for collect-and-continue behavior.
  pub fn resolve(device: &DeviceNode) -> ProcessResult<Self> {
    let resolution = Processor::new().process(device);
    match resolution.device {
      Some(spec) => Ok(spec),
      None => Err(
        resolution
          .first_error()
          .cloned()
          .unwrap_or_else(|| {
            Diagnostic::error(DiagnosticKind::UnresolvedReference, "", "processing failed")
          }),
      ),
    }
  }

  pub(crate) fn build(
    device: &DeviceNode,
    diagnostics: &mut Vec<Diagnostic>,
    keep_going: bool,
  ) -> Option<Self> {
    let defaults = device.register_properties.with_device_defaults();

    let mut peripherals = Vec::new();
    for peripheral in &device.peripherals {
      match PeripheralSpec::new(peripheral, &defaults, diagnostics) {
        Ok(mut specs) => peripherals.append(&mut specs),
        Err(diagnostic) => {
          diagnostics.push(diagnostic);
          if !keep_going {
            return None;
          }
        }
      }
    }

    Some(Self {
      vendor: device.vendor.clone(),
      vendor_id: device.vendor_id.clone(),
      name: device.name.clone(),
      series: device.series.clone(),
      version: device.version.clone(),
      description: device.description.clone(),
      license_text: device.license_text.clone(),
      cpu: device.cpu.as_ref().map(CpuSpec::new),
      header_system_filename: device.header_system_filename.clone(),
      header_definitions_prefix: device.header_definitions_prefix.clone(),
      address_unit_bits: device.address_unit_bits,
      width: device.width,
      default_register_properties: defaults,
      peripherals,
      vendor_extensions: device.vendor_extensions.clone(),
    })
  }

  /// Iterates all the clusters on the device.
  pub fn iter_clusters(&self) -> impl Iterator<Item = &ClusterSpec> {
    self.peripherals.iter().flat_map(|p| p.iter_clusters())
  }

  /// Iterates all the registers on the device.
  pub fn iter_registers(&self) -> impl Iterator<Item = &RegisterSpec> {
    self.peripherals.iter().flat_map(|p| p.iter_registers())
  }

  /// Iterates all the register fields on the device.
  pub fn iter_fields(&self) -> impl Iterator<Item = &FieldSpec> {
    self.peripherals.iter().flat_map(|p| p.iter_fields())
  }

  pub fn get_peripheral(&self, path: &str) -> ProcessResult<&PeripheralSpec> {
    match self.peripherals.iter().find(|p| p.path() == path) {
      Some(p) => Ok(p),
      None => Err(no_such(path, "peripheral")),
    }
  }

  pub fn get_cluster(&self, path: &str) -> ProcessResult<&ClusterSpec> {
    match self.iter_clusters().find(|c| c.path() == path) {
      Some(c) => Ok(c),
      None => Err(no_such(path, "cluster")),
    }
  }

  pub fn get_register(&self, path: &str) -> ProcessResult<&RegisterSpec> {
    match self.iter_registers().find(|r| r.path() == path) {
      Some(r) => Ok(r),
      None => Err(no_such(path, "register")),
    }
  }

  pub fn get_field(&self, path: &str) -> ProcessResult<&FieldSpec> {
    match self.iter_fields().find(|f| f.path() == path) {
      Some(f) => Ok(f),
      None => Err(no_such(path, "field")),
    }
  }
}

fn no_such(path: &str, kind: &str) -> Diagnostic {
  Diagnostic::error(
    DiagnosticKind::UnresolvedReference,
    path,
    format!("no {} at this path", kind),
  )
}
