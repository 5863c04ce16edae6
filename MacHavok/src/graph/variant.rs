//! Concrete type selection for polymorphic objects
//!
//! Some inputs (hand-written or stripped XML) name only the abstract base of
//! an object. The concrete type is picked from an ordered rule table: the
//! first rule for that base whose required members are all present wins.

use crate::error::{Error, Result};
use lazy_static::lazy_static;

/// One candidate concrete type for an abstract base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRule {
    pub base: String,
    pub concrete: String,
    /// Members that must all be present for this rule to match.
    pub required: Vec<String>,
}

impl VariantRule {
    #[must_use]
    pub fn new(base: &str, concrete: &str, required: &[&str]) -> Self {
        Self {
            base: base.to_string(),
            concrete: concrete.to_string(),
            required: required.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, base: &str, members: &[&str]) -> bool {
        self.base == base && self.required.iter().all(|r| members.contains(&r.as_str()))
    }
}

lazy_static! {
    /// Built-in rules for physics shapes. More specific shapes come first.
    static ref DEFAULT_RULES: Vec<VariantRule> = vec![
        VariantRule::new("hkpShape", "hkpCylinderShape", &["vertexA", "vertexB", "cylRadius"]),
        VariantRule::new("hkpShape", "hkpCapsuleShape", &["vertexA", "vertexB", "radius"]),
        VariantRule::new("hkpShape", "hkpBoxShape", &["halfExtents"]),
        VariantRule::new("hkpShape", "hkpConvexVerticesShape", &["rotatedVertices", "numVertices"]),
        VariantRule::new("hkpShape", "hkpListShape", &["childInfo"]),
        VariantRule::new("hkpShape", "hkpMoppBvTreeShape", &["code", "child"]),
        VariantRule::new("hkpShape", "hkpTransformShape", &["childShape", "transform", "rotation"]),
        VariantRule::new("hkpShape", "hkpConvexTransformShape", &["childShape", "transform"]),
        VariantRule::new("hkpShape", "hkpConvexTranslateShape", &["childShape", "translation"]),
        VariantRule::new("hkpShape", "hkpSphereShape", &["radius"]),
        VariantRule::new("hkpConstraintData", "hkpRagdollConstraintData", &["atoms"]),
    ];
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct VariantSelector {
    rules: Vec<VariantRule>,
}

impl Default for VariantSelector {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl VariantSelector {
    /// Selector with the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector with no rules at all.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule ahead of the existing ones.
    #[must_use]
    pub fn with_rule(mut self, rule: VariantRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Pick the concrete type name for `base` from the members present.
    pub fn select(&self, base: &str, members: &[&str]) -> Result<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(base, members))
            .map(|rule| rule.concrete.as_str())
            .ok_or_else(|| Error::UnknownVariant {
                base: base.to_string(),
                members: members.iter().map(ToString::to_string).collect(),
            })
    }
}
