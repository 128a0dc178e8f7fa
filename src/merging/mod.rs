pub mod executor;
pub mod policy;

pub use executor::{check_merge_preconditions, plan_merge, MergePlan};
pub use policy::{MergeField, MergeFieldPolicy, MergeStrategy};
