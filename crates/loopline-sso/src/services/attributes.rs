//! Attribute mapping from IdP assertions and claims to internal user fields.
//!
//! Each configuration can override where a field comes from via its
//! `attribute_mapping` JSON object (internal field name -> IdP attribute or
//! claim name); unmapped fields fall back to per-protocol defaults.

use crate::error::{SsoError, SsoResult};
use serde_json::Value;
use std::collections::HashMap;

/// Internal user fields an IdP can populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalField {
    Email,
    FirstName,
    LastName,
    FullName,
    EmployeeId,
    Department,
}

impl InternalField {
    /// Key used in the `attribute_mapping` configuration object.
    #[must_use]
    pub fn mapping_key(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::FullName => "full_name",
            Self::EmployeeId => "employee_id",
            Self::Department => "department",
        }
    }

    /// Default SAML attribute name.
    #[must_use]
    pub fn saml_default(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::FullName => "displayName",
            Self::EmployeeId => "employeeId",
            Self::Department => "department",
        }
    }

    /// Default OIDC claim name.
    #[must_use]
    pub fn oidc_default(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::FirstName => "given_name",
            Self::LastName => "family_name",
            Self::FullName => "name",
            Self::EmployeeId => "employee_id",
            Self::Department => "department",
        }
    }
}

const ALL_FIELDS: [InternalField; 6] = [
    InternalField::Email,
    InternalField::FirstName,
    InternalField::LastName,
    InternalField::FullName,
    InternalField::EmployeeId,
    InternalField::Department,
];

/// User fields resolved from an IdP assertion or userinfo claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedAttributes {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub employee_id: Option<String>,
    pub department: Option<String>,
}

impl MappedAttributes {
    /// Display name for provisioning: explicit full name, else first+last,
    /// else the local part of the email.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(full) = &self.full_name {
            if !full.is_empty() {
                return full.clone();
            }
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self
                .email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string(),
        }
    }
}

fn source_name(mapping: &Value, field: InternalField, default: &'static str) -> String {
    mapping
        .get(field.mapping_key())
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Resolve fields from SAML attributes. A missing email attribute falls back
/// to the NameID when it looks like an address; otherwise the login fails
/// with `MissingRequiredAttribute`.
pub fn map_saml_attributes(
    mapping: &Value,
    attributes: &HashMap<String, Vec<String>>,
    name_id: &str,
) -> SsoResult<MappedAttributes> {
    let lookup = |field: InternalField| -> Option<String> {
        let name = source_name(mapping, field, field.saml_default());
        attributes
            .get(&name)
            .and_then(|values| values.first())
            .filter(|v| !v.is_empty())
            .cloned()
    };

    let email = match lookup(InternalField::Email) {
        Some(email) => email,
        None if name_id.contains('@') => name_id.to_string(),
        None => return Err(SsoError::MissingRequiredAttribute("email".to_string())),
    };

    Ok(MappedAttributes {
        email,
        first_name: lookup(InternalField::FirstName),
        last_name: lookup(InternalField::LastName),
        full_name: lookup(InternalField::FullName),
        employee_id: lookup(InternalField::EmployeeId),
        department: lookup(InternalField::Department),
    })
}

/// Resolve fields from OIDC userinfo claims.
pub fn map_oidc_claims(
    mapping: &Value,
    claims: &HashMap<String, Value>,
) -> SsoResult<MappedAttributes> {
    let lookup = |field: InternalField| -> Option<String> {
        let name = source_name(mapping, field, field.oidc_default());
        claims
            .get(&name)
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|v| !v.is_empty())
    };

    let email = lookup(InternalField::Email)
        .ok_or_else(|| SsoError::MissingRequiredAttribute("email".to_string()))?;

    Ok(MappedAttributes {
        email,
        first_name: lookup(InternalField::FirstName),
        last_name: lookup(InternalField::LastName),
        full_name: lookup(InternalField::FullName),
        employee_id: lookup(InternalField::EmployeeId),
        department: lookup(InternalField::Department),
    })
}

/// Enforce the configuration's email-domain allowlist. An empty allowlist
/// permits any domain; entries match the domain part exactly.
pub fn enforce_domain_allowlist(email: &str, allowed_domains: &[String]) -> SsoResult<()> {
    if allowed_domains.is_empty() {
        return Ok(());
    }
    let domain = email.rsplit('@').next().unwrap_or("");
    if email.contains('@') && allowed_domains.iter().any(|d| d == domain) {
        return Ok(());
    }
    Err(SsoError::DomainNotAllowed(domain.to_string()))
}

/// The full attribute set serialized for session storage.
#[must_use]
pub fn saml_attributes_json(attributes: &HashMap<String, Vec<String>>) -> Value {
    serde_json::to_value(attributes).unwrap_or(Value::Null)
}

/// Userinfo claims serialized for session storage.
#[must_use]
pub fn oidc_claims_json(claims: &HashMap<String, Value>) -> Value {
    serde_json::to_value(claims).unwrap_or(Value::Null)
}
