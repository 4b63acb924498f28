//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::UnknownVariant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    ProductManager,
    SalesManager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::ProductManager => "product_manager",
            Self::SalesManager => "sales_manager",
        }
    }
    pub fn is_staff(&self) -> bool { !matches!(self, Self::Customer) }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "product_manager" => Ok(Self::ProductManager),
            "sales_manager" => Ok(Self::SalesManager),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn create(username: impl Into<String>, email: impl Into<String>, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::now_v7(), username: username.into(), email: normalize_email(&email.into()), password_hash, role,
            first_name: None, last_name: None, created_at: Utc::now(),
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None) => f.clone(),
            _ => self.username.clone(),
        }
    }
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// Personal data kept encrypted at rest. Values here are ciphertexts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SensitiveData {
    pub user_id: Uuid,
    pub home_address: Option<String>,
    pub phone_number: Option<String>,
    pub tax_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Server-side login session. Only the token digest is kept.
#[derive(Clone, Debug)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("sales_manager".parse::<Role>().unwrap(), Role::SalesManager);
        assert!("admin".parse::<Role>().is_err());
        assert!(Role::ProductManager.is_staff());
        assert!(!Role::Customer.is_staff());
    }

    #[test]
    fn test_email_is_normalized() {
        let u = User::create("jane", " Jane@Example.COM ", String::new(), Role::Customer);
        assert_eq!(u.email, "jane@example.com");
        assert_eq!(u.display_name(), "jane");
    }
}
