//! Qualified names and the rules for matching them.
//!
//! A path is a sequence of identifier segments separated by `.`. A segment
//! may carry a concrete array index (`Timer[0]`) or one of the template
//! placeholder forms used before dimension expansion (`Timer[%s]`,
//! `Timer%s`).

use std::fmt;

/// A dotted reference path, already split into segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
  segments: Vec<String>,
}

impl Path {
  /// Parses a reference string. Returns `None` when any segment is empty or
  /// contains characters outside the SVD identifier grammar.
  pub fn parse(text: &str) -> Option<Self> {
    if text.is_empty() {
      return None;
    }

    let segments: Vec<String> = text.split('.').map(str::to_owned).collect();
    if segments.iter().any(|s| !valid_segment(s)) {
      return None;
    }

    Some(Self { segments })
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }

  /// The sole segment of a single-segment path, if that is what this is.
  pub fn single(&self) -> Option<&str> {
    match self.segments.as_slice() {
      [only] => Some(only),
      _ => None,
    }
  }
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.segments.join("."))
  }
}

/// Appends a name to a preceding path, yielding the child's full path.
pub fn join(preceding_path: &str, name: &str) -> String {
  if preceding_path.is_empty() {
    name.to_owned()
  } else {
    format!("{}.{}", preceding_path, name)
  }
}

/// Whether a declared node name matches one reference segment.
///
/// Exact equality always matches. A concrete segment additionally matches a
/// template node name when stripping the `%s`/`[%s]` placeholder from the
/// template yields the same identifier, and an explicitly indexed segment
/// (`Timer[0]`) matches the bracketed template (`Timer[%s]`).
pub fn segment_matches(node_name: &str, segment: &str) -> bool {
  if node_name == segment {
    return true;
  }

  if let Some(base) = node_name.strip_suffix("[%s]") {
    if segment == base {
      return true;
    }

    if let Some(rest) = segment.strip_prefix(base) {
      if rest.len() > 2
        && rest.starts_with('[')
        && rest.ends_with(']')
        && rest[1..rest.len() - 1].bytes().all(|b| b.is_ascii_digit())
      {
        return true;
      }
    }

    return false;
  }

  if node_name.contains("%s") && segment == node_name.replace("%s", "") {
    return true;
  }

  false
}

fn valid_segment(segment: &str) -> bool {
  let body = if let Some(stripped) = segment.strip_suffix("[%s]") {
    stripped.to_owned()
  } else if let Some(open) = segment.find('[') {
    if !segment.ends_with(']') {
      return false;
    }
    let index = &segment[open + 1..segment.len() - 1];
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
      return false;
    }
    segment[..open].to_owned()
  } else {
    segment.to_owned()
  };

  let body = body.replace("%s", "");
  !segment.is_empty()
    && body.bytes().all(|b| b == b'_' || b.is_ascii_alphanumeric())
}
