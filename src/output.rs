//! Plain-text rendering of derived views for the command line.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::model::Issue;
use crate::view::{DisplayProperties, GroupBy, GroupKey, GroupedIssues};

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Header shown above a bucket.
fn group_title(grouped: &GroupedIssues, key: &GroupKey, issues: &[Issue]) -> String {
  let name = match grouped.group_by() {
    Some(GroupBy::State) => issues
      .iter()
      .find_map(|i| i.state_detail.as_ref().filter(|s| s.id == key.as_str()))
      .map(|s| s.name.clone()),
    Some(GroupBy::Labels) => issues
      .iter()
      .flat_map(|i| i.label_details.iter())
      .find(|l| l.id == key.as_str())
      .map(|l| l.name.clone()),
    _ => None,
  };
  name.unwrap_or_else(|| key.to_string())
}

/// One line per issue, with the columns the view shows.
pub fn issue_line(issue: &Issue, properties: &DisplayProperties) -> String {
  let mut columns = Vec::new();
  if properties.key {
    columns.push(format!("{:<8}", format!("#{}", issue.sequence_id)));
  }
  columns.push(format!("{:<48}", truncate(&issue.name, 48)));
  if properties.state {
    let state = issue
      .state_detail
      .as_ref()
      .map(|s| s.name.as_str())
      .unwrap_or(issue.state.as_str());
    columns.push(format!("{:<12}", truncate(state, 12)));
  }
  if properties.priority {
    columns.push(format!("{:<8}", issue.priority.as_str()));
  }
  if properties.assignee && !issue.assignee_details.is_empty() {
    let names: Vec<String> = issue.assignee_details.iter().map(|u| u.name()).collect();
    columns.push(format!("@{}", names.join(",@")));
  }
  if properties.labels && !issue.label_details.is_empty() {
    let names: Vec<&str> = issue.label_details.iter().map(|l| l.name.as_str()).collect();
    columns.push(format!("[{}]", names.join(", ")));
  }
  if properties.due_date {
    if let Some(date) = issue.target_date {
      columns.push(format!("due {}", date));
    }
  }
  if properties.estimate {
    if let Some(points) = issue.estimate_point {
      columns.push(format!("{}pt", points));
    }
  }
  if properties.sub_issue_count && issue.sub_issues_count > 0 {
    columns.push(format!("{} sub", issue.sub_issues_count));
  }
  if properties.link && issue.link_count > 0 {
    columns.push(format!("{} links", issue.link_count));
  }
  if properties.attachment_count && issue.attachment_count > 0 {
    columns.push(format!("{} files", issue.attachment_count));
  }
  if properties.created_on {
    columns.push(format!("created {}", issue.created_at.format("%Y-%m-%d")));
  }
  if properties.updated_on {
    columns.push(format!("updated {}", issue.updated_at.format("%Y-%m-%d")));
  }
  columns.join(" ").trim_end().to_string()
}

pub fn render_grouped(grouped: &GroupedIssues, properties: &DisplayProperties) -> String {
  if grouped.is_empty() {
    return "No issues found.\n".to_string();
  }

  let mut out = String::new();
  for (key, issues) in grouped.iter() {
    if grouped.group_by().is_some() {
      out.push_str(&format!(
        "{} ({})\n",
        group_title(grouped, key, issues),
        issues.len()
      ));
    }
    for issue in issues {
      out.push_str("  ");
      out.push_str(&issue_line(issue, properties));
      out.push('\n');
    }
  }
  out
}

pub fn render_calendar(days: &BTreeMap<NaiveDate, Vec<Issue>>, properties: &DisplayProperties) -> String {
  if days.is_empty() {
    return "No scheduled issues.\n".to_string();
  }

  let mut out = String::new();
  for (day, issues) in days {
    out.push_str(&format!("{}\n", day.format("%a %Y-%m-%d")));
    for issue in issues {
      out.push_str("  ");
      out.push_str(&issue_line(issue, properties));
      out.push('\n');
    }
  }
  out
}
