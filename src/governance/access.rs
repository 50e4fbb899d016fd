// src/governance/access.rs
use ethers::types::Address;
use std::collections::{HashMap, HashSet};

use crate::types::{DEFAULT_ADMIN_ROLE, Role};

#[derive(Debug, Default, Clone)]
struct RoleData {
    members: HashSet<Address>,
    admin_role: Role,
}

/// Role membership and the role hierarchy. Unknown roles are administered by
/// `DEFAULT_ADMIN_ROLE`.
#[derive(Debug, Default, Clone)]
pub struct RoleSet {
    roles: HashMap<Role, RoleData>,
}

impl RoleSet {
    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.roles
            .get(&role)
            .is_some_and(|data| data.members.contains(&account))
    }

    pub fn role_admin(&self, role: Role) -> Role {
        self.roles
            .get(&role)
            .map(|data| data.admin_role)
            .unwrap_or(DEFAULT_ADMIN_ROLE)
    }

    /// Returns whether the account was newly added.
    pub fn grant(&mut self, role: Role, account: Address) -> bool {
        self.roles.entry(role).or_default().members.insert(account)
    }

    /// Returns whether the account held the role.
    pub fn revoke(&mut self, role: Role, account: Address) -> bool {
        self.roles
            .get_mut(&role)
            .is_some_and(|data| data.members.remove(&account))
    }

    /// Sets the admin role and returns the previous one.
    pub fn set_admin(&mut self, role: Role, admin_role: Role) -> Role {
        let data = self.roles.entry(role).or_default();
        std::mem::replace(&mut data.admin_role, admin_role)
    }

    pub fn members(&self, role: Role) -> Vec<Address> {
        let mut members: Vec<Address> = self
            .roles
            .get(&role)
            .map(|data| data.members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}
