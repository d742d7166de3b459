//! Profile domain type and incremental updates.
//!
//! A Profile is the mutable record the backing store keeps for each
//! [`Identity`]. It is created on first successful authentication, edited
//! through profile flows, and never deleted client-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use workincz_core::Identity;

use crate::role::{Capability, CapabilitySet, Role};

/// Descriptive record associated with an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// The identity this profile belongs to.
    identity: Identity,
    /// Name shown in navigation and messages.
    display_name: Option<String>,
    /// Contact email, if the provider supplied one.
    email: Option<String>,
    /// Marketplace role.
    #[serde(default)]
    role: Role,
    /// Whether the account holds a paid plan.
    #[serde(default)]
    premium: bool,
    /// Free-form attributes owned by feature modules (CV link, company name, ...).
    #[serde(default)]
    attributes: Map<String, Value>,
    /// When the profile was created.
    created_at: DateTime<Utc>,
    /// When the profile was last updated.
    updated_at: DateTime<Utc>,
}

impl Profile {
    /// Creates the default profile for a first-time sign-in.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        let now = Utc::now();
        Self {
            identity,
            display_name: None,
            email: None,
            role: Role::default(),
            premium: false,
            attributes: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the premium flag.
    #[must_use]
    pub fn with_premium(mut self, premium: bool) -> Self {
        self.premium = premium;
        self
    }

    /// Returns the owning identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the display name, if set.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the email address, if set.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the marketplace role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns true for paid accounts.
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.premium
    }

    /// Returns the free-form attributes.
    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Returns a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns when the profile was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the profile was last updated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the role's capabilities plus the premium extras, if any.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        let base = self.role.capabilities();
        if self.premium {
            base.union(CapabilitySet::from_slice(&Capability::PREMIUM))
        } else {
            base
        }
    }

    /// Returns true if this profile may perform the given action.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Sets the email address.
    pub fn set_email(&mut self, email: Option<String>) {
        self.email = email;
        self.updated_at = Utc::now();
    }

    /// Sets the role.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        self.updated_at = Utc::now();
    }

    /// Shallow-merges the set fields of a patch into this profile.
    ///
    /// Attributes merge key-by-key; a `null` value removes the key.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(name) = &patch.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(premium) = patch.premium {
            self.premium = premium;
        }
        for (key, value) in &patch.attributes {
            if value.is_null() {
                self.attributes.remove(key);
            } else {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Partial profile used for incremental updates.
///
/// Unset fields leave the target untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub premium: Option<bool>,
    pub attributes: Map<String, Value>,
}

impl ProfilePatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    #[must_use]
    pub fn premium(mut self, premium: bool) -> Self {
        self.premium = Some(premium);
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.premium.is_none()
            && self.attributes.is_empty()
    }
}
