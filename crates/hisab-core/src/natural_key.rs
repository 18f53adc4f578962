//! # Natural-Key Resolver
//!
//! Records created on a device while offline get an id from that device; the
//! remote store assigns its own id when the record is finally pushed. Ids
//! therefore cannot tell us whether a local record already exists remotely.
//! Natural keys can: a normalized identity string derived from the record's
//! business fields.
//!
//! ## Rule Tables
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Key rules (first applicable rule wins)                  │
//! │                                                                         │
//! │  Product              sku ──► name + company ──► id                     │
//! │  Customer             email ──► name + phone ──► id                     │
//! │  Supplier             email ──► gstin ──► name + phone ──► id           │
//! │  Purchase / Sale      invoice number ──► id                             │
//! │  Expense              receipt number ──►                                │
//! │                       date + amount + category + description ──► id     │
//! │  Device               user id + device id (always applies)              │
//! │  RegistrationRequest  email ──► id                                      │
//! │                                                                         │
//! │  Encoding:  "<rule>:<part>|<part>"   e.g.  "sku:abc-1"                  │
//! │             "name_phone:ravi traders|98450"   "id:1712345678901"        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Text parts are trimmed and lower-cased. A rule applies only when its
//! first part is present and non-blank; later parts that are missing encode
//! as empty strings. The rule name is part of the key, so an email key can
//! never equal a name key by accident.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::types::{
    Customer, Device, Expense, Product, Purchase, RegistrationRequest, Sale, Supplier,
};

// =============================================================================
// Natural Key
// =============================================================================

/// A normalized identity string for a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey(String);

impl NaturalKey {
    fn tagged(rule: &str, body: &str) -> Self {
        NaturalKey(format!("{}:{}", rule, body))
    }

    /// The last-resort key: the record's id.
    pub fn from_id(id: i64) -> Self {
        NaturalKey(format!("id:{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry in a type's key table.
///
/// `extract` returns the encoded key body, or `None` when the rule does not
/// apply to this record.
pub struct KeyRule<T> {
    pub name: &'static str,
    pub extract: fn(&T) -> Option<String>,
}

/// Computes the natural key of a record.
pub fn resolve<T: Record>(record: &T) -> NaturalKey {
    T::key_rules()
        .iter()
        .find_map(|rule| (rule.extract)(record).map(|body| NaturalKey::tagged(rule.name, &body)))
        .unwrap_or_else(|| NaturalKey::from_id(record.id()))
}

/// Trimmed, lower-cased form of a text component.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A primary component: `None` when missing or blank.
fn primary(value: Option<&str>) -> Option<String> {
    value.map(normalize).filter(|v| !v.is_empty())
}

/// A secondary component: empty string when missing.
fn secondary(value: Option<&str>) -> String {
    value.map(normalize).unwrap_or_default()
}

fn company(company_id: Option<i64>) -> String {
    company_id.map(|id| id.to_string()).unwrap_or_default()
}

fn join(parts: &[String]) -> String {
    parts.join("|")
}

// =============================================================================
// Per-Type Rule Tables
// =============================================================================

pub(crate) const PRODUCT_KEYS: &[KeyRule<Product>] = &[
    KeyRule {
        name: "sku",
        extract: product_sku,
    },
    KeyRule {
        name: "name",
        extract: product_name,
    },
];

fn product_sku(p: &Product) -> Option<String> {
    primary(p.sku.as_deref())
}

fn product_name(p: &Product) -> Option<String> {
    let name = primary(Some(&p.name))?;
    Some(join(&[name, company(p.company_id)]))
}

pub(crate) const CUSTOMER_KEYS: &[KeyRule<Customer>] = &[
    KeyRule {
        name: "email",
        extract: customer_email,
    },
    KeyRule {
        name: "name_phone",
        extract: customer_name_phone,
    },
];

fn customer_email(c: &Customer) -> Option<String> {
    primary(c.email.as_deref())
}

fn customer_name_phone(c: &Customer) -> Option<String> {
    let name = primary(Some(&c.name))?;
    Some(join(&[name, secondary(c.phone.as_deref())]))
}

pub(crate) const SUPPLIER_KEYS: &[KeyRule<Supplier>] = &[
    KeyRule {
        name: "email",
        extract: supplier_email,
    },
    KeyRule {
        name: "gstin",
        extract: supplier_gstin,
    },
    KeyRule {
        name: "name_phone",
        extract: supplier_name_phone,
    },
];

fn supplier_email(s: &Supplier) -> Option<String> {
    primary(s.email.as_deref())
}

fn supplier_gstin(s: &Supplier) -> Option<String> {
    primary(s.gstin.as_deref())
}

fn supplier_name_phone(s: &Supplier) -> Option<String> {
    let name = primary(Some(&s.name))?;
    Some(join(&[name, secondary(s.phone.as_deref())]))
}

pub(crate) const PURCHASE_KEYS: &[KeyRule<Purchase>] = &[KeyRule {
    name: "invoice",
    extract: purchase_invoice,
}];

fn purchase_invoice(p: &Purchase) -> Option<String> {
    primary(p.invoice_number.as_deref())
}

pub(crate) const SALE_KEYS: &[KeyRule<Sale>] = &[KeyRule {
    name: "invoice",
    extract: sale_invoice,
}];

fn sale_invoice(s: &Sale) -> Option<String> {
    primary(s.invoice_number.as_deref())
}

pub(crate) const EXPENSE_KEYS: &[KeyRule<Expense>] = &[
    KeyRule {
        name: "receipt",
        extract: expense_receipt,
    },
    KeyRule {
        name: "details",
        extract: expense_details,
    },
];

fn expense_receipt(e: &Expense) -> Option<String> {
    primary(e.receipt_number.as_deref())
}

fn expense_details(e: &Expense) -> Option<String> {
    let date = primary(Some(&e.expense_date))?;
    Some(join(&[
        date,
        e.amount.to_string(),
        secondary(e.category.as_deref()),
        secondary(e.description.as_deref()),
    ]))
}

// Devices are identified by their owner and hardware id only; there is no
// id fallback.
pub(crate) const DEVICE_KEYS: &[KeyRule<Device>] = &[KeyRule {
    name: "device",
    extract: device_identity,
}];

fn device_identity(d: &Device) -> Option<String> {
    Some(join(&[normalize(&d.user_id), normalize(&d.device_id)]))
}

pub(crate) const REGISTRATION_REQUEST_KEYS: &[KeyRule<RegistrationRequest>] = &[KeyRule {
    name: "email",
    extract: registration_email,
}];

fn registration_email(r: &RegistrationRequest) -> Option<String> {
    primary(Some(&r.email))
}

// =============================================================================
// Identity Sets
// =============================================================================

/// The identities present in one store's collection.
///
/// Both natural keys and ids are qualified by the owning tenant, so a record
/// can only ever match a record of the same tenant.
#[derive(Debug, Clone, Default)]
pub struct IdentitySet {
    keys: HashSet<(Option<i64>, NaturalKey)>,
    ids: HashSet<(Option<i64>, i64)>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the identity set of a collection.
    pub fn from_records<T: Record>(records: &[T]) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }

    pub fn insert<T: Record>(&mut self, record: &T) {
        self.keys.insert((record.company_id(), resolve(record)));
        self.ids.insert((record.company_id(), record.id()));
    }

    /// Returns true if the record's natural key or its id is present.
    pub fn matches<T: Record>(&self, record: &T) -> bool {
        self.keys.contains(&(record.company_id(), resolve(record)))
            || self.ids.contains(&(record.company_id(), record.id()))
    }

    /// Number of distinct ids in the set.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key<T: Record>(record: &T) -> String {
        resolve(record).to_string()
    }

    #[test]
    fn test_product_prefers_sku_over_name() {
        let mut product = Product {
            id: 1,
            company_id: Some(7),
            name: "Widget".into(),
            sku: Some("  ABC-1 ".into()),
            ..Default::default()
        };
        assert_eq!(key(&product), "sku:abc-1");

        product.sku = None;
        assert_eq!(key(&product), "name:widget|7");

        product.sku = Some("   ".into());
        assert_eq!(key(&product), "name:widget|7");

        product.name = String::new();
        assert_eq!(key(&product), "id:1");
    }

    #[test]
    fn test_product_name_key_without_company() {
        let product = Product {
            name: "Widget".into(),
            ..Default::default()
        };
        assert_eq!(key(&product), "name:widget|");
    }

    #[test]
    fn test_customer_rules() {
        let mut customer = Customer {
            id: 3,
            name: "Ravi".into(),
            email: Some("A@B.com ".into()),
            phone: Some("98450".into()),
            ..Default::default()
        };
        assert_eq!(key(&customer), "email:a@b.com");

        customer.email = None;
        assert_eq!(key(&customer), "name_phone:ravi|98450");

        customer.phone = None;
        assert_eq!(key(&customer), "name_phone:ravi|");

        customer.name = " ".into();
        assert_eq!(key(&customer), "id:3");
    }

    #[test]
    fn test_supplier_uses_gstin_before_name() {
        let mut supplier = Supplier {
            id: 8,
            name: "Ravi Traders".into(),
            gstin: Some("29ABCDE1234F1Z5".into()),
            phone: Some("080-1".into()),
            ..Default::default()
        };
        assert_eq!(key(&supplier), "gstin:29abcde1234f1z5");

        supplier.email = Some("sales@ravi.in".into());
        assert_eq!(key(&supplier), "email:sales@ravi.in");

        supplier.email = None;
        supplier.gstin = None;
        assert_eq!(key(&supplier), "name_phone:ravi traders|080-1");
    }

    #[test]
    fn test_purchase_and_sale_use_invoice() {
        let purchase = Purchase {
            id: 11,
            invoice_number: Some("INV-001".into()),
            ..Default::default()
        };
        assert_eq!(key(&purchase), "invoice:inv-001");

        let sale = Sale {
            id: 12,
            ..Default::default()
        };
        assert_eq!(key(&sale), "id:12");
    }

    #[test]
    fn test_expense_rules() {
        let mut expense = Expense {
            id: 21,
            expense_date: "2024-03-31".into(),
            amount: 100.0,
            category: Some("Rent".into()),
            description: Some(" March Rent ".into()),
            receipt_number: Some("R-9".into()),
            ..Default::default()
        };
        assert_eq!(key(&expense), "receipt:r-9");

        expense.receipt_number = None;
        assert_eq!(key(&expense), "details:2024-03-31|100|rent|march rent");

        expense.amount = 99.5;
        expense.category = None;
        assert_eq!(key(&expense), "details:2024-03-31|99.5||march rent");

        expense.expense_date = String::new();
        assert_eq!(key(&expense), "id:21");
    }

    #[test]
    fn test_device_key_has_no_id_fallback() {
        let device = Device {
            id: 5,
            user_id: "U-1".into(),
            device_id: "Laptop-A".into(),
            ..Default::default()
        };
        assert_eq!(key(&device), "device:u-1|laptop-a");

        let blank = Device {
            id: 6,
            ..Default::default()
        };
        assert_eq!(key(&blank), "device:|");
    }

    #[test]
    fn test_registration_request_rules() {
        let mut request = RegistrationRequest {
            id: 2,
            email: "New@Shop.in".into(),
            ..Default::default()
        };
        assert_eq!(key(&request), "email:new@shop.in");

        request.email = String::new();
        assert_eq!(key(&request), "id:2");
    }

    #[test]
    fn test_identity_set_matches_by_key_or_id() {
        let remote = vec![Customer {
            id: 100,
            company_id: Some(1),
            email: Some("a@b.com".into()),
            ..Default::default()
        }];
        let set = IdentitySet::from_records(&remote);
        assert_eq!(set.len(), 1);

        let same_email = Customer {
            id: 5,
            company_id: Some(1),
            email: Some("A@B.COM".into()),
            ..Default::default()
        };
        assert!(set.matches(&same_email));

        let same_id = Customer {
            id: 100,
            company_id: Some(1),
            email: Some("changed@b.com".into()),
            ..Default::default()
        };
        assert!(set.matches(&same_id));

        let unrelated = Customer {
            id: 6,
            company_id: Some(1),
            email: Some("c@d.com".into()),
            ..Default::default()
        };
        assert!(!set.matches(&unrelated));
    }

    #[test]
    fn test_identity_set_never_matches_across_tenants() {
        let remote = vec![Product {
            id: 1,
            company_id: Some(2),
            sku: Some("ABC-1".into()),
            ..Default::default()
        }];
        let set = IdentitySet::from_records(&remote);

        let other_tenant = Product {
            id: 1,
            company_id: Some(1),
            sku: Some("ABC-1".into()),
            ..Default::default()
        };
        assert!(!set.matches(&other_tenant));
    }
}
