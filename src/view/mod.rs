//! View state and the grouping/ordering engine.

mod derived;
mod filters;
mod grouping;
mod state;

pub use derived::{calendar_days, DerivedState, DerivedView};
pub use filters::{FilterDimension, FilterPatch, IssueFilters, IssueTypeFilter, Patch};
pub use grouping::{
  bucket_by_target_date, group_issues, order_issues, GroupBy, GroupKey, GroupedIssues, OrderBy,
  OrderField,
};
pub use state::{
  DisplayProperties, DisplayProperty, IssueLayout, ViewDefaults, ViewScope, ViewState, ViewStore,
};
