//! # Domain Types
//!
//! The eight business record types mirrored between the local store and the
//! remote store, plus [`EntityKind`] naming them.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Entity Kinds                                  │
//! │                                                                         │
//! │  Kind                 Remote table            Tenant scoped   Archive   │
//! │  ───────────────────  ──────────────────────  ─────────────   ───────── │
//! │  Product              products                yes             status    │
//! │  Customer             customers               yes             is_active │
//! │  Supplier             suppliers               yes             -         │
//! │  Purchase             purchases               yes             -         │
//! │  Sale                 sales                   yes             -         │
//! │  Expense              expenses                yes             -         │
//! │  Device               user_devices            no (admin)      is_active │
//! │  RegistrationRequest  registration_requests   no (admin)      -         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Open Records
//! Only the fields the sync engine reasons about are typed. Every other
//! column the remote store returns is kept in `extra` and written back
//! untouched, so a record survives a local round trip without losing data.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::error::CoreError;
use crate::natural_key::{self, KeyRule};
use crate::record::Record;

// =============================================================================
// Entity Kind
// =============================================================================

/// The kinds of records the engine knows how to mirror.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Customer,
    Supplier,
    Purchase,
    Sale,
    Expense,
    Device,
    RegistrationRequest,
}

impl EntityKind {
    /// Every kind, in reconciliation order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Product,
        EntityKind::Customer,
        EntityKind::Supplier,
        EntityKind::Purchase,
        EntityKind::Sale,
        EntityKind::Expense,
        EntityKind::Device,
        EntityKind::RegistrationRequest,
    ];

    /// Stable identifier used in config files and the local store.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Customer => "customer",
            EntityKind::Supplier => "supplier",
            EntityKind::Purchase => "purchase",
            EntityKind::Sale => "sale",
            EntityKind::Expense => "expense",
            EntityKind::Device => "device",
            EntityKind::RegistrationRequest => "registration_request",
        }
    }

    /// Remote table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Customer => "customers",
            EntityKind::Supplier => "suppliers",
            EntityKind::Purchase => "purchases",
            EntityKind::Sale => "sales",
            EntityKind::Expense => "expenses",
            EntityKind::Device => "user_devices",
            EntityKind::RegistrationRequest => "registration_requests",
        }
    }

    /// Singular label used in per-record error messages ("Product ABC-1: ...").
    pub fn singular(&self) -> &'static str {
        match self {
            EntityKind::Product => "Product",
            EntityKind::Customer => "Customer",
            EntityKind::Supplier => "Supplier",
            EntityKind::Purchase => "Purchase",
            EntityKind::Sale => "Sale",
            EntityKind::Expense => "Expense",
            EntityKind::Device => "Device",
            EntityKind::RegistrationRequest => "Registration request",
        }
    }

    /// Plural label used in whole-collection error messages ("Suppliers sync error: ...").
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Product => "Products",
            EntityKind::Customer => "Customers",
            EntityKind::Supplier => "Suppliers",
            EntityKind::Purchase => "Purchases",
            EntityKind::Sale => "Sales",
            EntityKind::Expense => "Expenses",
            EntityKind::Device => "Devices",
            EntityKind::RegistrationRequest => "Registration requests",
        }
    }

    /// Column and value that mark a record as live.
    ///
    /// Listing without archived records filters on `column = value`.
    /// `None` means the kind has no archive state.
    pub fn live_filter(&self) -> Option<(&'static str, &'static str)> {
        match self {
            EntityKind::Product => Some(("status", "active")),
            EntityKind::Customer | EntityKind::Device => Some(("is_active", "true")),
            _ => None,
        }
    }

    /// Column the remote store orders listings by (newest first).
    pub fn order_column(&self) -> &'static str {
        match self {
            EntityKind::Device => "last_accessed",
            _ => "created_at",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted || kind.table() == wanted)
            .ok_or_else(|| CoreError::UnknownEntityKind(s.to_string()))
    }
}

/// Formats a timestamp the way the remote store writes them.
fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Product
// =============================================================================

/// A product held in inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default)]
    pub name: String,

    /// Stock keeping unit; the preferred natural key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,

    /// "active", "sold" or "archived". Missing means active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// Remote columns not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Product {
    const KIND: EntityKind = EntityKind::Product;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn is_archived(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| !status.trim().eq_ignore_ascii_case("active"))
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::PRODUCT_KEYS
    }

    fn label(&self) -> String {
        non_blank(self.sku.as_deref()).unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Customer {
    fn default() -> Self {
        Customer {
            id: 0,
            company_id: None,
            name: String::new(),
            email: None,
            phone: None,
            is_active: true,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Record for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn is_archived(&self) -> bool {
        !self.is_active
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::CUSTOMER_KEYS
    }

    fn label(&self) -> String {
        non_blank(self.email.as_deref()).unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// Supplier
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// GST registration number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gstin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Supplier {
    const KIND: EntityKind = EntityKind::Supplier;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::SUPPLIER_KEYS
    }

    fn label(&self) -> String {
        non_blank(self.email.as_deref())
            .or_else(|| non_blank(self.gstin.as_deref()))
            .unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// Purchase
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Purchase {
    const KIND: EntityKind = EntityKind::Purchase;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::PURCHASE_KEYS
    }

    fn label(&self) -> String {
        non_blank(self.invoice_number.as_deref()).unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// Sale
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Sale {
    const KIND: EntityKind = EntityKind::Sale;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::SALE_KEYS
    }

    fn label(&self) -> String {
        non_blank(self.invoice_number.as_deref()).unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// Expense
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    /// Calendar date of the expense ("2024-03-31").
    #[serde(default)]
    pub expense_date: String,

    #[serde(default)]
    pub amount: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Expense {
    const KIND: EntityKind = EntityKind::Expense;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::EXPENSE_KEYS
    }

    fn label(&self) -> String {
        non_blank(self.receipt_number.as_deref()).unwrap_or_else(|| self.id.to_string())
    }
}

// =============================================================================
// Device
// =============================================================================

/// A device registered against a user account.
///
/// Devices are administrative records: they carry no tenant of their own and
/// are only reconciled by unscoped passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            id: 0,
            company_id: None,
            user_id: String::new(),
            device_id: String::new(),
            device_name: None,
            is_active: true,
            last_accessed: None,
            created_at: None,
            extra: Map::new(),
        }
    }
}

impl Record for Device {
    const KIND: EntityKind = EntityKind::Device;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn is_archived(&self) -> bool {
        !self.is_active
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::DEVICE_KEYS
    }

    fn label(&self) -> String {
        format!("{}/{}", self.user_id, self.device_id)
    }
}

// =============================================================================
// Registration Request
// =============================================================================

/// A pending sign-up awaiting administrator approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub email: String,

    /// "pending", "approved" or "rejected".
    #[serde(default = "default_request_status")]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_request_status() -> String {
    "pending".to_string()
}

impl Default for RegistrationRequest {
    fn default() -> Self {
        RegistrationRequest {
            id: 0,
            company_id: None,
            name: None,
            email: String::new(),
            status: default_request_status(),
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Record for RegistrationRequest {
    const KIND: EntityKind = EntityKind::RegistrationRequest;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(timestamp(now));
    }

    fn key_rules() -> &'static [KeyRule<Self>] {
        natural_key::REGISTRATION_REQUEST_KEYS
    }

    fn label(&self) -> String {
        non_blank(Some(self.email.as_str())).unwrap_or_else(|| self.id.to_string())
    }
}

/// Trimmed copy of `value`, or `None` when it is missing or blank.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("product".parse::<EntityKind>().unwrap(), EntityKind::Product);
        assert_eq!("Suppliers".parse::<EntityKind>().unwrap(), EntityKind::Supplier);
        assert_eq!(
            "registration-request".parse::<EntityKind>().unwrap(),
            EntityKind::RegistrationRequest
        );
        assert_eq!("user_devices".parse::<EntityKind>().unwrap(), EntityKind::Device);
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_kind_serde_matches_as_str() {
        for kind in EntityKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
    }

    #[test]
    fn test_unknown_columns_survive_round_trip() {
        let raw = json!({
            "id": 12,
            "company_id": 3,
            "name": "Widget",
            "sku": "W-1",
            "purchase_price": 40.5,
            "hsn_code": "8471"
        });

        let product: Product = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(product.extra.get("hsn_code"), Some(&json!("8471")));

        let back = serde_json::to_value(&product).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_archive_state() {
        let mut product = Product::default();
        assert!(!product.is_archived());
        product.status = Some("active".into());
        assert!(!product.is_archived());
        product.status = Some("archived".into());
        assert!(product.is_archived());

        let customer = Customer {
            is_active: false,
            ..Default::default()
        };
        assert!(customer.is_archived());

        assert!(!Supplier::default().is_archived());
    }

    #[test]
    fn test_missing_is_active_defaults_to_true() {
        let customer: Customer = serde_json::from_value(json!({"id": 1, "name": "A"})).unwrap();
        assert!(customer.is_active);
    }

    #[test]
    fn test_touch_stamps_updated_at() {
        let now = Utc::now();
        let mut sale = Sale::default();
        sale.touch(now);
        assert_eq!(sale.updated_at, Some(timestamp(now)));
    }

    #[test]
    fn test_labels_prefer_business_keys() {
        let product = Product {
            id: 9,
            sku: Some(" ABC-1 ".into()),
            ..Default::default()
        };
        assert_eq!(product.label(), "ABC-1");

        let purchase = Purchase {
            id: 4,
            ..Default::default()
        };
        assert_eq!(purchase.label(), "4");
    }
}
