//! # Records and Tenant Scope
//!
//! The [`Record`] trait is the contract every mirrored entity satisfies, and
//! [`TenantScope`] is the partition every read and identity comparison is
//! made within.
//!
//! ## Tenant Scope
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tenant Scoping                                 │
//! │                                                                         │
//! │  TenantScope::Company(7)          TenantScope::Unscoped                 │
//! │  ───────────────────────          ─────────────────────                 │
//! │  records with company_id = 7      every record, every tenant,           │
//! │                                   including admin records whose         │
//! │                                   company_id is NULL                    │
//! │                                                                         │
//! │  There is no Default impl: forgetting to choose is a compile error,    │
//! │  not a silent "all tenants" query.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::natural_key::KeyRule;
use crate::types::EntityKind;

// =============================================================================
// Tenant Scope
// =============================================================================

/// Which tenant's records an operation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantScope {
    /// Records belonging to one company.
    Company(i64),

    /// All records, across all tenants. Administrative use only.
    Unscoped,
}

impl TenantScope {
    /// Scope for an optional company id, `None` meaning unscoped.
    pub fn from_company(company_id: Option<i64>) -> Self {
        match company_id {
            Some(id) => TenantScope::Company(id),
            None => TenantScope::Unscoped,
        }
    }

    /// The company id filter, if any.
    pub fn company_id(&self) -> Option<i64> {
        match self {
            TenantScope::Company(id) => Some(*id),
            TenantScope::Unscoped => None,
        }
    }

    /// Returns true if a record owned by `company_id` falls inside this scope.
    pub fn includes(&self, company_id: Option<i64>) -> bool {
        match self {
            TenantScope::Company(id) => company_id == Some(*id),
            TenantScope::Unscoped => true,
        }
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantScope::Company(id) => write!(f, "company {}", id),
            TenantScope::Unscoped => write!(f, "all tenants"),
        }
    }
}

// =============================================================================
// Record Trait
// =============================================================================

/// A business record mirrored between the local and the remote store.
pub trait Record:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Which entity kind this type is.
    const KIND: EntityKind;

    /// Identifier assigned by whichever store created the record first.
    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Owning tenant; `None` for administrative records.
    fn company_id(&self) -> Option<i64>;

    /// Archived/inactive records are hidden from listings unless asked for.
    fn is_archived(&self) -> bool {
        false
    }

    /// Stamps the record's modification time, where it has one.
    fn touch(&mut self, _now: DateTime<Utc>) {}

    /// Natural-key rules in priority order.
    fn key_rules() -> &'static [KeyRule<Self>];

    /// Short human-readable handle for log lines and error messages.
    fn label(&self) -> String {
        self.id().to_string()
    }

    /// Returns true if the record should appear in a listing for `scope`.
    fn is_visible(&self, scope: TenantScope, include_archived: bool) -> bool {
        scope.includes(self.company_id()) && (include_archived || !self.is_archived())
    }
}

// =============================================================================
// Partial Updates
// =============================================================================

/// Applies a JSON merge of `patch` onto `record`.
///
/// Top-level keys in `patch` replace the record's values; `id` is never
/// changed. The merged document must still describe a valid record.
pub fn apply_patch<T: Record>(record: &T, patch: &Value) -> CoreResult<T> {
    let changes = patch.as_object().ok_or_else(|| {
        CoreError::invalid_patch(T::KIND.as_str(), "patch must be a JSON object")
    })?;

    let mut document = serde_json::to_value(record)?;
    let fields = document.as_object_mut().ok_or_else(|| {
        CoreError::Serialization(format!("{} did not serialize to an object", T::KIND))
    })?;

    for (key, value) in changes {
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    let mut merged: T = serde_json::from_value(document)
        .map_err(|e| CoreError::invalid_patch(T::KIND.as_str(), e.to_string()))?;
    merged.set_id(record.id());
    Ok(merged)
}

/// Serializes a record for creation on the remote store (without its id).
pub fn without_id<T: Record>(record: &T) -> CoreResult<Value> {
    let mut document = serde_json::to_value(record)?;
    if let Some(fields) = document.as_object_mut() {
        fields.remove("id");
    }
    Ok(document)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Customer, Expense, Product};
    use serde_json::json;

    #[test]
    fn test_scope_includes() {
        let scope = TenantScope::Company(7);
        assert!(scope.includes(Some(7)));
        assert!(!scope.includes(Some(8)));
        assert!(!scope.includes(None));

        assert!(TenantScope::Unscoped.includes(None));
        assert!(TenantScope::Unscoped.includes(Some(8)));
    }

    #[test]
    fn test_scope_from_company() {
        assert_eq!(TenantScope::from_company(Some(3)), TenantScope::Company(3));
        assert_eq!(TenantScope::from_company(None), TenantScope::Unscoped);
        assert_eq!(TenantScope::Company(3).to_string(), "company 3");
    }

    #[test]
    fn test_visibility_respects_archive_flag() {
        let customer = Customer {
            company_id: Some(1),
            is_active: false,
            ..Default::default()
        };

        assert!(!customer.is_visible(TenantScope::Company(1), false));
        assert!(customer.is_visible(TenantScope::Company(1), true));
        assert!(!customer.is_visible(TenantScope::Company(2), true));
    }

    #[test]
    fn test_apply_patch_merges_fields_and_keeps_id() {
        let product = Product {
            id: 5,
            name: "Widget".into(),
            sku: Some("W-1".into()),
            ..Default::default()
        };

        let patched = apply_patch(&product, &json!({"name": "Gadget", "id": 99, "color": "red"}))
            .unwrap();

        assert_eq!(patched.id, 5);
        assert_eq!(patched.name, "Gadget");
        assert_eq!(patched.sku.as_deref(), Some("W-1"));
        assert_eq!(patched.extra.get("color"), Some(&json!("red")));
    }

    #[test]
    fn test_apply_patch_rejects_bad_input() {
        let expense = Expense::default();

        assert!(matches!(
            apply_patch(&expense, &json!(["not", "an", "object"])),
            Err(CoreError::InvalidPatch { .. })
        ));
        assert!(matches!(
            apply_patch(&expense, &json!({"amount": "lots"})),
            Err(CoreError::InvalidPatch { .. })
        ));
    }

    #[test]
    fn test_without_id() {
        let product = Product {
            id: 42,
            name: "Widget".into(),
            ..Default::default()
        };
        let body = without_id(&product).unwrap();
        assert!(body.get("id").is_none());
        assert_eq!(body.get("name"), Some(&json!("Widget")));
    }
}
