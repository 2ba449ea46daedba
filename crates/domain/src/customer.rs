//! Customer details submitted with a checkout.

use common::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a customer snapshot is not complete enough to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustomerInfoError {
    #[error("Customer name is required")]
    MissingName,

    #[error("A contact phone number is required")]
    MissingContact,

    #[error("Shipping address is incomplete: missing {field}")]
    MissingAddress { field: &'static str },

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Customer snapshot stored with an order.
///
/// `user_id` is the identity from the session collaborator; guests have none
/// and are therefore exempt from per-user coupon limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

impl CustomerInfo {
    /// Checks that name, contact, address and email are all usable.
    pub fn validate(&self) -> Result<(), CustomerInfoError> {
        if self.name.trim().is_empty() {
            return Err(CustomerInfoError::MissingName);
        }
        if self.phone.trim().is_empty() {
            return Err(CustomerInfoError::MissingContact);
        }

        let required = [
            ("line1", &self.address.line1),
            ("city", &self.address.city),
            ("postal_code", &self.address.postal_code),
            ("country", &self.address.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CustomerInfoError::MissingAddress { field });
            }
        }

        if !is_valid_email(&self.email) {
            return Err(CustomerInfoError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }
}

/// Structural email check: one `@`, non-empty local part, dotted domain, no
/// whitespace.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
