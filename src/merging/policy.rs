// src/merging/policy.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DedupeError, DedupeResult};

/// Lead fields a merge can write into the canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeField {
    Emails,
    Phones,
    Sources,
    Name,
    Website,
    Address,
}

impl MergeField {
    pub const ALL: [MergeField; 6] = [
        MergeField::Emails,
        MergeField::Phones,
        MergeField::Sources,
        MergeField::Name,
        MergeField::Website,
        MergeField::Address,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emails => "emails",
            Self::Phones => "phones",
            Self::Sources => "sources",
            Self::Name => "name",
            Self::Website => "website",
            Self::Address => "address",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::Emails | Self::Phones | Self::Sources)
    }

    fn default_strategy(&self) -> MergeStrategy {
        match self {
            Self::Emails | Self::Phones | Self::Sources => MergeStrategy::Union,
            Self::Name | Self::Website => MergeStrategy::KeepCanonical,
            Self::Address => MergeStrategy::MostRecent,
        }
    }
}

impl fmt::Display for MergeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeField {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "emails" | "email" => Ok(Self::Emails),
            "phones" | "phone" => Ok(Self::Phones),
            "sources" | "source" => Ok(Self::Sources),
            "name" => Ok(Self::Name),
            "website" => Ok(Self::Website),
            "address" => Ok(Self::Address),
            other => Err(DedupeError::InvalidArgument(format!(
                "unknown merge field '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Ordered union of canonical and member values without repeats
    Union,
    /// Leave the canonical's value untouched
    KeepCanonical,
    /// Non-empty value from the most recently updated lead
    MostRecent,
    /// Canonical's value if non-empty, else the first non-empty member value
    FirstNonEmpty,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::KeepCanonical => "keep_canonical",
            Self::MostRecent => "most_recent",
            Self::FirstNonEmpty => "first_non_empty",
        }
    }

    fn applies_to(&self, field: MergeField) -> bool {
        match self {
            Self::KeepCanonical => true,
            Self::Union => field.is_list(),
            Self::MostRecent | Self::FirstNonEmpty => !field.is_list(),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "union" => Ok(Self::Union),
            "keep_canonical" | "keep" => Ok(Self::KeepCanonical),
            "most_recent" => Ok(Self::MostRecent),
            "first_non_empty" => Ok(Self::FirstNonEmpty),
            other => Err(DedupeError::InvalidArgument(format!(
                "unknown merge strategy '{}'",
                other
            ))),
        }
    }
}

/// Per-field strategies for one merge. Fields not overridden keep their
/// default strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeFieldPolicy {
    strategies: BTreeMap<MergeField, MergeStrategy>,
}

impl Default for MergeFieldPolicy {
    fn default() -> Self {
        Self {
            strategies: MergeField::ALL
                .iter()
                .map(|f| (*f, f.default_strategy()))
                .collect(),
        }
    }
}

impl MergeFieldPolicy {
    pub fn strategy(&self, field: MergeField) -> MergeStrategy {
        self.strategies
            .get(&field)
            .copied()
            .unwrap_or_else(|| field.default_strategy())
    }

    /// Overrides one field, rejecting strategies that make no sense for it
    /// (e.g. `union` on `name`).
    pub fn set(&mut self, field: MergeField, strategy: MergeStrategy) -> DedupeResult<()> {
        if !strategy.applies_to(field) {
            return Err(DedupeError::InvalidArgument(format!(
                "strategy '{}' is not valid for field '{}'",
                strategy, field
            )));
        }
        self.strategies.insert(field, strategy);
        Ok(())
    }

    /// Builds a policy from `field -> strategy` name pairs, as sent in a
    /// merge request's `merge_fields` object.
    pub fn from_map<'a, I>(overrides: I) -> DedupeResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut policy = Self::default();
        for (field, strategy) in overrides {
            policy.set(field.parse()?, strategy.parse()?)?;
        }
        Ok(policy)
    }

    /// Parses CLI-style `field=strategy` arguments.
    pub fn from_assignments<S: AsRef<str>>(assignments: &[S]) -> DedupeResult<Self> {
        let pairs = assignments
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                raw.split_once('=').ok_or_else(|| {
                    DedupeError::InvalidArgument(format!(
                        "expected field=strategy, got '{}'",
                        raw
                    ))
                })
            })
            .collect::<DedupeResult<Vec<_>>>()?;
        Self::from_map(pairs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MergeField, MergeStrategy)> + '_ {
        MergeField::ALL.iter().map(move |f| (*f, self.strategy(*f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = MergeFieldPolicy::default();
        assert_eq!(policy.strategy(MergeField::Emails), MergeStrategy::Union);
        assert_eq!(policy.strategy(MergeField::Phones), MergeStrategy::Union);
        assert_eq!(policy.strategy(MergeField::Sources), MergeStrategy::Union);
        assert_eq!(policy.strategy(MergeField::Name), MergeStrategy::KeepCanonical);
        assert_eq!(policy.strategy(MergeField::Website), MergeStrategy::KeepCanonical);
        assert_eq!(policy.strategy(MergeField::Address), MergeStrategy::MostRecent);
    }

    #[test]
    fn test_overrides_leave_other_fields_at_default() {
        let policy = MergeFieldPolicy::from_map([("name", "most_recent"), ("phones", "keep_canonical")]).unwrap();
        assert_eq!(policy.strategy(MergeField::Name), MergeStrategy::MostRecent);
        assert_eq!(policy.strategy(MergeField::Phones), MergeStrategy::KeepCanonical);
        assert_eq!(policy.strategy(MergeField::Emails), MergeStrategy::Union);
        assert_eq!(policy.strategy(MergeField::Address), MergeStrategy::MostRecent);
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(matches!(
            MergeFieldPolicy::from_map([("fax", "union")]),
            Err(DedupeError::InvalidArgument(_))
        ));
        assert!(matches!(
            MergeFieldPolicy::from_map([("emails", "newest")]),
            Err(DedupeError::InvalidArgument(_))
        ));
        assert!(matches!(
            MergeFieldPolicy::from_map([("name", "union")]),
            Err(DedupeError::InvalidArgument(_))
        ));
        assert!(matches!(
            MergeFieldPolicy::from_map([("emails", "most_recent")]),
            Err(DedupeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_cli_assignments() {
        let policy = MergeFieldPolicy::from_assignments(&["website=first-non-empty"]).unwrap();
        assert_eq!(policy.strategy(MergeField::Website), MergeStrategy::FirstNonEmpty);
        assert!(MergeFieldPolicy::from_assignments(&["website"]).is_err());
        assert_eq!(
            MergeFieldPolicy::from_assignments::<&str>(&[]).unwrap(),
            MergeFieldPolicy::default()
        );
    }
}
