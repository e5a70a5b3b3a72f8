//! Expansion of the `dim` element group into concrete instances.
//!
//! Two name forms exist: the array form `Name[%s]`, whose instances keep
//! bracketed indices (`Name[0]`…`Name[N-1]`), and the substitution form
//! `Name%s`, whose instances substitute consecutive integers or the parsed
//! `dimIndex` tokens.

use regex::Regex;

use crate::error::{Diagnostic, DiagnosticKind, ProcessResult};
use crate::input::DimGroup;

/// One expansion of a dimmed element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DimInstance {
  /// The instance's concrete name.
  pub name: String,
  /// The index token substituted into `%s` placeholders in display names and
  /// descriptions.
  pub index: String,
  /// Offset of this instance relative to the template's address.
  pub offset_delta: u64,
}

/// Expands a dim group into its instances, or `None` for a plain element.
pub(crate) fn expand_dim(
  name: &str,
  group: &DimGroup,
  path: &str,
) -> ProcessResult<Option<Vec<DimInstance>>> {
  let Some(dim) = group.dim else {
    return Ok(None);
  };

  if dim < 1 {
    return Err(mismatch(path, "`dim` must be at least 1"));
  }

  let increment = match group.dim_increment {
    Some(increment) if increment > 0 => increment,
    Some(_) => return Err(mismatch(path, "`dimIncrement` must be greater than 0")),
    None => return Err(mismatch(path, "`dim` requires a `dimIncrement`")),
  };

  let instances = if name.contains("[%s]") {
    (0..dim)
      .map(|k| DimInstance {
        name: name.replace("[%s]", &format!("[{}]", k)),
        index: k.to_string(),
        offset_delta: u64::from(k) * increment,
      })
      .collect()
  } else if name.contains("%s") {
    let indices = resolve_dim_index(dim, group.dim_index.as_deref(), path)?;
    indices
      .into_iter()
      .enumerate()
      .map(|(k, index)| DimInstance {
        name: name.replace("%s", &index),
        index,
        offset_delta: k as u64 * increment,
      })
      .collect()
  } else {
    return Err(mismatch(
      path,
      "`dim` requires a `%s` or `[%s]` placeholder in the name",
    ));
  };

  Ok(Some(instances))
}

/// Substitutes the instance index into `%s` placeholders of display names
/// and descriptions. A bracketed placeholder keeps its brackets.
pub(crate) fn substitute(text: Option<String>, instance: Option<&DimInstance>) -> Option<String> {
  match (text, instance) {
    (Some(text), Some(instance)) => Some(text.replace("%s", &instance.index)),
    (text, _) => text,
  }
}

/// Parses the `dimIndex` grammar into exactly `dim` index tokens. With no
/// `dimIndex`, indices are consecutive integers starting at 0.
pub(crate) fn resolve_dim_index(
  dim: u32,
  dim_index: Option<&str>,
  path: &str,
) -> ProcessResult<Vec<String>> {
  let tokens = match dim_index {
    None => (0..dim).map(|k| k.to_string()).collect(),
    Some(text) => parse_dim_index(text, path)?,
  };

  if tokens.len() != dim as usize {
    return Err(mismatch(
      path,
      format!(
        "`dimIndex` yields {} indices but `dim` is {}",
        tokens.len(),
        dim
      ),
    ));
  }

  Ok(tokens)
}

fn parse_dim_index(text: &str, path: &str) -> ProcessResult<Vec<String>> {
  let numeric_range = Regex::new(r"^([0-9]+)-([0-9]+)$").unwrap();
  let alpha_range = Regex::new(r"^([A-Z])-([A-Z])$").unwrap();
  let token_list = Regex::new(r"^[_0-9a-zA-Z]+(,\s*[_0-9a-zA-Z]+)*$").unwrap();

  if let Some(captures) = numeric_range.captures(text) {
    let start: u64 = captures[1].parse().map_err(|_| bad_index(text, path))?;
    let end: u64 = captures[2].parse().map_err(|_| bad_index(text, path))?;
    if start > end {
      return Err(mismatch(
        path,
        format!("`dimIndex` range `{}` runs backwards", text),
      ));
    }
    return Ok((start..=end).map(|k| k.to_string()).collect());
  }

  if let Some(captures) = alpha_range.captures(text) {
    let start = captures[1].as_bytes()[0];
    let end = captures[2].as_bytes()[0];
    if start > end {
      return Err(mismatch(
        path,
        format!("`dimIndex` range `{}` runs backwards", text),
      ));
    }
    return Ok((start..=end).map(|c| (c as char).to_string()).collect());
  }

  if token_list.is_match(text) {
    return Ok(text.split(',').map(|token| token.trim().to_owned()).collect());
  }

  Err(bad_index(text, path))
}

fn bad_index(text: &str, path: &str) -> Diagnostic {
  mismatch(path, format!("`dimIndex` `{}` is not a valid index list", text))
}

fn mismatch(path: &str, details: impl Into<String>) -> Diagnostic {
  Diagnostic::error(DiagnosticKind::DimIndexMismatch, path, details)
}

#[cfg(test)]
mod tests {
  use super::{expand_dim, resolve_dim_index, DimInstance};
  use crate::error::DiagnosticKind;
  use crate::input::DimGroup;

  fn group(dim: u32, increment: u64, index: Option<&str>) -> DimGroup {
    DimGroup {
      dim: Some(dim),
      dim_increment: Some(increment),
      dim_index: index.map(str::to_owned),
      ..DimGroup::default()
    }
  }

  #[test]
  fn plain_elements_do_not_expand() {
    assert_eq!(
      None,
      expand_dim("CR", &DimGroup::default(), "P.CR").unwrap()
    );
  }

  #[test]
  fn expands_array_form_with_bracketed_indices() {
    let instances = expand_dim("TIMER[%s]", &group(3, 0x100, None), "TIMER[%s]")
      .unwrap()
      .unwrap();

    assert_eq!(
      vec![
        DimInstance {
          name: "TIMER[0]".to_owned(),
          index: "0".to_owned(),
          offset_delta: 0,
        },
        DimInstance {
          name: "TIMER[1]".to_owned(),
          index: "1".to_owned(),
          offset_delta: 0x100,
        },
        DimInstance {
          name: "TIMER[2]".to_owned(),
          index: "2".to_owned(),
          offset_delta: 0x200,
        },
      ],
      instances
    );
  }

  #[test]
  fn expands_substitution_form_with_default_indices() {
    let instances = expand_dim("CH%s_CR", &group(2, 4, None), "P.CH%s_CR")
      .unwrap()
      .unwrap();

    assert_eq!("CH0_CR", instances[0].name);
    assert_eq!("CH1_CR", instances[1].name);
    assert_eq!(4, instances[1].offset_delta);
  }

  #[test]
  fn expands_substitution_form_with_token_list() {
    let instances = expand_dim("CR_%s", &group(3, 4, Some("one, two,three")), "P.CR_%s")
      .unwrap()
      .unwrap();

    let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(vec!["CR_one", "CR_two", "CR_three"], names);
  }

  #[test]
  fn resolves_numeric_ranges() {
    assert_eq!(
      vec!["3", "4", "5"],
      resolve_dim_index(3, Some("3-5"), "").unwrap()
    );
    assert_eq!(vec!["7"], resolve_dim_index(1, Some("7-7"), "").unwrap());
  }

  #[test]
  fn resolves_alpha_ranges() {
    assert_eq!(
      vec!["A", "B", "C"],
      resolve_dim_index(3, Some("A-C"), "").unwrap()
    );
  }

  #[test]
  fn rejects_index_count_mismatch() {
    let err = resolve_dim_index(2, Some("A-D"), "P.CR").unwrap_err();
    assert_eq!(DiagnosticKind::DimIndexMismatch, err.kind);
    assert_eq!("P.CR", err.path);
  }

  #[test]
  fn rejects_backward_ranges() {
    assert!(resolve_dim_index(3, Some("5-3"), "").is_err());
    assert!(resolve_dim_index(3, Some("C-A"), "").is_err());
  }

  #[test]
  fn rejects_degenerate_dim_groups() {
    assert!(expand_dim("CR%s", &group(0, 4, None), "").is_err());
    assert!(expand_dim(
      "CR%s",
      &DimGroup {
        dim: Some(2),
        ..DimGroup::default()
      },
      ""
    )
    .is_err());
    assert!(expand_dim("CR%s", &group(2, 0, None), "").is_err());
    assert!(expand_dim("CR", &group(2, 4, None), "").is_err());
  }
}
