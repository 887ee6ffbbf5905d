//! Editable issue fields and `field=value` parsing for `iv set`
use chrono::NaiveDate;

use crate::error::{FieldError, ParseError};
use crate::model::IssuePatch;

#[derive(Debug, Clone)]
pub struct Field {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All fields a patch can touch
pub const FIELDS: &[Field] = &[
  Field {
    name: "name",
    aliases: &["title", "n"],
    description: "Issue title",
  },
  Field {
    name: "priority",
    aliases: &["p", "prio"],
    description: "urgent, high, medium, low or none",
  },
  Field {
    name: "state",
    aliases: &["s", "status"],
    description: "State id",
  },
  Field {
    name: "assignees",
    aliases: &["a", "assignee"],
    description: "Comma-separated user ids",
  },
  Field {
    name: "labels",
    aliases: &["l", "label"],
    description: "Comma-separated label ids",
  },
  Field {
    name: "target_date",
    aliases: &["due", "due_date"],
    description: "YYYY-MM-DD, or none to clear",
  },
  Field {
    name: "estimate_point",
    aliases: &["estimate", "e"],
    description: "Estimate points, or none to clear",
  },
  Field {
    name: "parent",
    aliases: &["parent_id"],
    description: "Parent issue id, or none to clear",
  },
  Field {
    name: "sort_order",
    aliases: &["order"],
    description: "Manual sort position",
  },
];

/// Get matching fields for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Field> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return FIELDS.iter().collect();
  }

  let mut matches: Vec<(&Field, u32)> = Vec::new();

  for field in FIELDS {
    if field.name == input_lower {
      matches.push((field, 0));
      continue;
    }

    if field.aliases.contains(&input_lower.as_str()) {
      matches.push((field, 1));
      continue;
    }

    if field.name.starts_with(&input_lower) {
      matches.push((field, 2));
      continue;
    }

    if field.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((field, 3));
    }
  }

  matches.sort_by_key(|(_, rank)| *rank);

  matches.into_iter().map(|(field, _)| field).collect()
}

/// Resolve a possibly abbreviated field name.
///
/// A full name or alias always wins. A bare prefix must point at exactly
/// one field.
pub fn resolve(input: &str) -> Result<&'static Field, FieldError> {
  let wanted = input.trim().to_lowercase();
  if wanted.is_empty() {
    return Err(FieldError::Unknown(input.to_string()));
  }

  if let Some(field) = FIELDS
    .iter()
    .find(|f| f.name == wanted || f.aliases.contains(&wanted.as_str()))
  {
    return Ok(field);
  }

  match get_suggestions(&wanted).as_slice() {
    [] => Err(FieldError::Unknown(input.to_string())),
    [only] => Ok(*only),
    many => Err(FieldError::Ambiguous {
      input: input.to_string(),
      candidates: many.iter().map(|f| f.name).collect(),
    }),
  }
}

fn is_clear(value: &str) -> bool {
  matches!(value.to_lowercase().as_str(), "" | "none" | "null")
}

fn list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .collect()
}

/// Parse `field=value` pairs into one patch. Later pairs win.
pub fn parse_assignments(pairs: &[String]) -> Result<IssuePatch, FieldError> {
  let mut patch = IssuePatch::default();
  for pair in pairs {
    let (field, value) = pair
      .split_once('=')
      .ok_or_else(|| ParseError::new("assignment", pair.as_str()))?;
    let value = value.trim();

    match resolve(field)?.name {
      "name" => patch.name = Some(value.to_string()),
      "priority" => patch.priority = Some(value.parse()?),
      "state" => patch.state = Some(value.to_string()),
      "assignees" => patch.assignees = Some(list(value)),
      "labels" => patch.labels = Some(list(value)),
      "target_date" => {
        patch.target_date = Some(if is_clear(value) {
          None
        } else {
          Some(
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
              .map_err(|_| ParseError::new("date", value))?,
          )
        })
      }
      "estimate_point" => {
        patch.estimate_point = Some(if is_clear(value) {
          None
        } else {
          Some(value.parse().map_err(|_| ParseError::new("estimate", value))?)
        })
      }
      "parent" => {
        patch.parent = Some((!is_clear(value)).then(|| value.to_string()));
      }
      "sort_order" => {
        patch.sort_order = Some(value.parse().map_err(|_| ParseError::new("sort order", value))?)
      }
      _ => return Err(FieldError::Unknown(field.to_string())),
    }
  }
  Ok(patch)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Priority;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), FIELDS.len());
  }

  #[test]
  fn test_exact_and_alias_match() {
    assert_eq!(get_suggestions("labels")[0].name, "labels");
    assert_eq!(get_suggestions("due")[0].name, "target_date");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(resolve("prio").unwrap().name, "priority");
    assert_eq!(resolve("est").unwrap().name, "estimate_point");
  }

  #[test]
  fn test_unknown_field() {
    assert!(matches!(resolve("colour"), Err(FieldError::Unknown(_))));
    assert!(resolve("").is_err());
  }

  #[test]
  fn test_shared_prefix_is_ambiguous() {
    let err = resolve("t").unwrap_err();
    assert_eq!(
      err,
      FieldError::Ambiguous {
        input: "t".to_string(),
        candidates: vec!["target_date", "name"],
      }
    );
    assert!(err.to_string().contains("target_date, name"));
    assert!(parse_assignments(&["t=x".to_string()]).is_err());

    // an alias is never ambiguous, even when it prefixes another field
    assert_eq!(resolve("p").unwrap().name, "priority");
  }

  #[test]
  fn test_parse_assignments() {
    let patch = parse_assignments(&[
      "priority=high".to_string(),
      "labels=bug, ui".to_string(),
      "due=none".to_string(),
    ])
    .unwrap();
    assert_eq!(patch.priority, Some(Priority::High));
    assert_eq!(patch.labels, Some(vec!["bug".to_string(), "ui".to_string()]));
    assert_eq!(patch.target_date, Some(None));
    assert_eq!(patch.state, None);
  }

  #[test]
  fn test_parse_date_and_estimate() {
    let patch =
      parse_assignments(&["target_date=2024-03-01".to_string(), "e=3".to_string()]).unwrap();
    assert_eq!(patch.target_date, Some(NaiveDate::from_ymd_opt(2024, 3, 1)));
    assert_eq!(patch.estimate_point, Some(Some(3)));
  }

  #[test]
  fn test_bad_values_are_rejected() {
    assert!(parse_assignments(&["priority=critical".to_string()]).is_err());
    assert!(parse_assignments(&["due=tomorrow".to_string()]).is_err());
    assert!(parse_assignments(&["priority".to_string()]).is_err());
  }
}
