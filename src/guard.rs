// Neutron Harness: Resource tracking and teardown for Neutron test topologies
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Preconditions that decide whether a test runs at all.
//!
//! A test case carries an ordered list of guards. Before anything is created for the test, the
//! guards are evaluated in order, and the first guard that asks to skip the test wins. The
//! remaining guards are not evaluated. A guard that cannot be evaluated (for instance, because a
//! comparison is not defined for the values involved) returns an error, which is reported as a test
//! error and never turned into a skip.

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display, Formatter},
};

use itertools::Itertools;
use neutron_api::{ApiObject, ClientError, ControlPlane, TopologyProvider};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Extensions supported by the control plane, indexed by their alias. The map is fetched once per
/// suite and never changes afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityMap {
    extensions: BTreeMap<String, ApiObject>,
}

impl CapabilityMap {
    /// Build the map from the extension objects, each of which must have an `alias` field.
    pub fn from_extensions(
        extensions: impl IntoIterator<Item = ApiObject>,
    ) -> Result<Self, ClientError> {
        let extensions = extensions
            .into_iter()
            .map(|ext| Ok((ext.str_field("alias")?.to_string(), ext)))
            .collect::<Result<_, ClientError>>()?;
        Ok(Self { extensions })
    }

    /// Ask the control plane for all its extensions.
    pub fn fetch(client: &dyn ControlPlane) -> Result<Self, ClientError> {
        let map = Self::from_extensions(client.list_extensions()?)?;
        log::debug!(
            "[guard] control plane supports {} extensions: {}",
            map.len(),
            map.aliases().join(", ")
        );
        Ok(map)
    }

    /// Check whether the extension with the given alias is supported.
    pub fn contains(&self, alias: &str) -> bool {
        self.extensions.contains_key(alias)
    }

    /// Get the metadata of an extension.
    pub fn get(&self, alias: &str) -> Option<&ApiObject> {
        self.extensions.get(alias)
    }

    /// Aliases of all supported extensions, in alphabetical order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    /// Number of supported extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns `true` if no extension is supported.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Everything a guard may look at.
#[derive(Clone, Copy)]
pub struct GuardContext<'a> {
    pub capabilities: &'a CapabilityMap,
    pub topology: &'a dyn TopologyProvider,
}

/// Why a test was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SkipReason(String);

impl SkipReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A precondition of a test.
pub trait Guard: Debug {
    /// Returns `Some(reason)` if the test must be skipped, and `None` if it may run.
    fn should_skip(&self, ctx: &GuardContext<'_>) -> Result<Option<SkipReason>, GuardError>;
}

/// Evaluate all guards in order, and return the reason of the first guard that asks to skip.
pub fn evaluate(
    guards: &[Box<dyn Guard + '_>],
    ctx: &GuardContext<'_>,
) -> Result<Option<SkipReason>, GuardError> {
    for guard in guards {
        if let Some(reason) = guard.should_skip(ctx)? {
            log::trace!("[guard] {guard:?} asks to skip: {reason}");
            return Ok(Some(reason));
        }
    }
    Ok(None)
}

/// Require an extension of the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireExtension(pub String);

impl Guard for RequireExtension {
    fn should_skip(&self, ctx: &GuardContext<'_>) -> Result<Option<SkipReason>, GuardError> {
        Ok((!ctx.capabilities.contains(&self.0))
            .then(|| SkipReason::new(format!("extension `{}` is not enabled", self.0))))
    }
}

/// Require a set of hosts to be part of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireHosts(pub Vec<String>);

impl Guard for RequireHosts {
    fn should_skip(&self, ctx: &GuardContext<'_>) -> Result<Option<SkipReason>, GuardError> {
        let hosts = ctx.topology.hosts();
        let missing = self
            .0
            .iter()
            .filter(|h| !hosts.contains_key(h.as_str()))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            Ok(None)
        } else {
            Ok(Some(SkipReason::new(format!(
                "missing hosts: {}",
                missing.iter().join(", ")
            ))))
        }
    }
}

/// A predicate on the value of a topology feature.
pub type Predicate = fn(&Value) -> Result<bool, GuardError>;

/// A comparison of the value of a topology feature (left) with an expected value (right).
pub type Comparator = fn(&Value, &Value) -> Result<bool, GuardError>;

/// How the value of a topology feature is checked.
#[derive(Debug, Clone)]
pub enum FeatureCheck {
    /// The value must be truthy (see [`is_truthy`]).
    Truthy,
    /// The value must be equal to the expected value.
    Equals(Value),
    /// The predicate must return `true`.
    Predicate(Predicate),
    /// The comparator must return `true` when comparing the value with the expected value.
    Compare(Comparator, Value),
}

impl FeatureCheck {
    fn accepts(&self, value: &Value) -> Result<bool, GuardError> {
        match self {
            FeatureCheck::Truthy => Ok(is_truthy(value)),
            FeatureCheck::Equals(expected) => Ok(cmp::equal(value, expected)),
            FeatureCheck::Predicate(pred) => pred(value),
            FeatureCheck::Compare(cmp, expected) => cmp(value, expected),
        }
    }
}

impl Display for FeatureCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureCheck::Truthy => f.write_str("is not set"),
            FeatureCheck::Equals(expected) => write!(f, "is not equal to {expected}"),
            FeatureCheck::Predicate(_) => f.write_str("does not satisfy the predicate"),
            FeatureCheck::Compare(_, expected) => {
                write!(f, "does not satisfy the comparison with {expected}")
            }
        }
    }
}

/// Require a feature of the topology. If the topology does not have the feature at all, the test is
/// skipped regardless of the check.
#[derive(Debug, Clone)]
pub struct RequireFeature {
    pub name: String,
    pub check: FeatureCheck,
}

impl RequireFeature {
    /// Require the feature to be truthy.
    pub fn truthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: FeatureCheck::Truthy,
        }
    }

    /// Require the feature to have exactly the given value.
    pub fn equals(name: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            check: FeatureCheck::Equals(expected.into()),
        }
    }

    /// Require the feature to satisfy the predicate.
    pub fn matching(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            check: FeatureCheck::Predicate(predicate),
        }
    }

    /// Require `comparator(value, expected)` to hold.
    pub fn compare(
        name: impl Into<String>,
        comparator: Comparator,
        expected: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            check: FeatureCheck::Compare(comparator, expected.into()),
        }
    }
}

impl Guard for RequireFeature {
    fn should_skip(&self, ctx: &GuardContext<'_>) -> Result<Option<SkipReason>, GuardError> {
        let Some(value) = ctx.topology.get_topology_feature(&self.name) else {
            return Ok(Some(SkipReason::new(format!(
                "topology feature `{}` is not available",
                self.name
            ))));
        };
        if self.check.accepts(&value)? {
            Ok(None)
        } else {
            Ok(Some(SkipReason::new(format!(
                "topology feature `{}` = {value} {}",
                self.name, self.check
            ))))
        }
    }
}

/// Truthiness of a feature value: `null`, `false`, zero, and empty strings, arrays and objects are
/// falsy. Everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Comparators for [`RequireFeature::compare`]. Numbers are compared numerically, and strings
/// lexicographically. Ordering any other combination of values is an error.
pub mod cmp {
    use std::cmp::Ordering;

    use serde_json::Value;

    use super::GuardError;

    fn order(left: &Value, right: &Value) -> Result<Ordering, GuardError> {
        let ordering = match (left, right) {
            (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => None,
            },
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            _ => None,
        };
        ordering.ok_or_else(|| GuardError::Incomparable {
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    pub fn gt(left: &Value, right: &Value) -> Result<bool, GuardError> {
        Ok(order(left, right)? == Ordering::Greater)
    }

    pub fn ge(left: &Value, right: &Value) -> Result<bool, GuardError> {
        Ok(order(left, right)? != Ordering::Less)
    }

    pub fn lt(left: &Value, right: &Value) -> Result<bool, GuardError> {
        Ok(order(left, right)? == Ordering::Less)
    }

    pub fn le(left: &Value, right: &Value) -> Result<bool, GuardError> {
        Ok(order(left, right)? != Ordering::Greater)
    }

    pub fn eq(left: &Value, right: &Value) -> Result<bool, GuardError> {
        Ok(equal(left, right))
    }

    pub fn ne(left: &Value, right: &Value) -> Result<bool, GuardError> {
        Ok(!equal(left, right))
    }

    /// Equality of feature values, where numbers are equal if they have the same numeric value
    /// (`2 == 2.0`), also inside arrays and objects.
    pub(super) fn equal(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l == r,
                _ => l == r,
            },
            (Value::Array(l), Value::Array(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(l, r)| equal(l, r))
            }
            (Value::Object(l), Value::Object(r)) => {
                l.len() == r.len()
                    && l.iter()
                        .all(|(k, l)| r.get(k).map(|r| equal(l, r)).unwrap_or(false))
            }
            _ => left == right,
        }
    }
}

/// Error while evaluating a guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The values cannot be ordered.
    #[error("Cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },
    /// The guard itself is malformed.
    #[error("Invalid guard: {0}")]
    Invalid(String),
}
