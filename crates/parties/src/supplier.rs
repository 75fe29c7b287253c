use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classwms_core::{text, DomainResult, SupplierId};

/// Contact information for a party.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    fn normalized(self) -> Self {
        Self {
            email: text::optional(self.email.as_deref()),
            phone: text::optional(self.phone.as_deref()),
            address: text::optional(self.address.as_deref()),
        }
    }
}

/// A supplier as persisted in a tenant store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub tax_id: Option<String>,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    pub tax_id: Option<String>,
    pub contact: ContactInfo,
}

impl NewSupplier {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: text::required("supplier name", &self.name)?,
            tax_id: text::optional(self.tax_id.as_deref()),
            contact: self.contact.normalized(),
        })
    }
}
