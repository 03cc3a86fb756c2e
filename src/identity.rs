//! Actor identity and capability roles
//!
//! Authentication itself lives upstream; this module only models the
//! resolved actor id and role set handed to the workflow engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Capability roles an actor can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can create postings and confirm completed work
    Customer,
    /// Can apply to postings and report work done
    Performer,
    /// Can view any posting but not act on it
    Support,
    /// Can view any posting but not act on it
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Performer => "performer",
            Role::Support => "support",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "performer" => Ok(Role::Performer),
            "support" => Ok(Role::Support),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// A set of roles with helper methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleSet {
    roles: HashSet<Role>,
}

impl RoleSet {
    pub fn new() -> Self {
        Self {
            roles: HashSet::new(),
        }
    }

    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn add(&mut self, role: Role) {
        self.roles.insert(role);
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Support and admin may view any posting; they still cannot arbitrate.
    pub fn can_view_any(&self) -> bool {
        self.roles.contains(&Role::Support) || self.roles.contains(&Role::Admin)
    }

    pub fn to_vec(&self) -> Vec<Role> {
        self.roles.iter().copied().collect()
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }
}

/// An authenticated actor with its resolved role set
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub roles: RoleSet,
}

impl Actor {
    pub fn new(id: Uuid, roles: impl Into<RoleSet>) -> Self {
        Self {
            id,
            roles: roles.into(),
        }
    }

    /// Convenience constructor for a customer-role actor
    pub fn customer(id: Uuid) -> Self {
        Self::new(id, vec![Role::Customer])
    }

    /// Convenience constructor for a performer-role actor
    pub fn performer(id: Uuid) -> Self {
        Self::new(id, vec![Role::Performer])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.has(role)
    }
}
