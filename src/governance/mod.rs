// src/governance/mod.rs
//! Access control and upgrade authority shared by the registry and router.
//!
//! Roles follow the usual hierarchy: every role has an admin role whose
//! holders may grant and revoke it. `DEFAULT_ADMIN_ROLE` has exactly one
//! holder at a time and changes hands only through the timelock in
//! [`timelock`].

pub mod access;
pub mod timelock;

use ethers::types::{Address, Bytes, H256};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::error::{ProtocolError, Result};
use crate::events::{Event, EventLog};
use crate::gateway::CodeInspector;
use crate::types::{CallContext, DEFAULT_ADMIN_ROLE, Role, Timestamp};
use access::RoleSet;
use timelock::{AdminTimelock, DEFAULT_ADMIN_DELAY_INCREASE_WAIT};

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const ERC1967_IMPLEMENTATION_SLOT: H256 = H256([
    0x36, 0x08, 0x94, 0xa1, 0x3b, 0xa1, 0xa3, 0x21, 0x06, 0x67, 0xc8, 0x28, 0x49, 0x2d, 0xb9,
    0x8d, 0xca, 0x3e, 0x20, 0x76, 0xcc, 0x37, 0x35, 0xa9, 0x20, 0xa3, 0xca, 0x50, 0x5d, 0x38,
    0x2b, 0xbc,
]);

#[derive(Debug)]
struct GovernanceState {
    roles: RoleSet,
    timelock: AdminTimelock,
    implementation: Address,
}

/// Read-only view of the admin seat and its pending changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSnapshot {
    pub default_admin: Address,
    pub pending_admin: Address,
    pub accept_schedule: Timestamp,
    pub default_admin_delay: u64,
    pub pending_delay: u64,
    pub delay_effect_schedule: Timestamp,
    pub delay_increase_wait: u64,
    pub implementation: Address,
}

pub struct Governance {
    address: Address,
    events: Arc<EventLog>,
    inspector: Arc<dyn CodeInspector>,
    state: RwLock<GovernanceState>,
}

impl Governance {
    /// Initializes governance at `address` with `admin` holding the default
    /// admin role.
    pub fn new(
        address: Address,
        admin: Address,
        initial_delay: u64,
        implementation: Address,
        events: Arc<EventLog>,
        inspector: Arc<dyn CodeInspector>,
    ) -> Result<Self> {
        if admin.is_zero() {
            return Err(ProtocolError::CanNotZeroAddress);
        }
        let mut roles = RoleSet::default();
        roles.grant(DEFAULT_ADMIN_ROLE, admin);

        let governance = Self {
            address,
            events,
            inspector,
            state: RwLock::new(GovernanceState {
                roles,
                timelock: AdminTimelock::new(admin, initial_delay),
                implementation,
            }),
        };
        governance.emit(Event::RoleGranted {
            role: DEFAULT_ADMIN_ROLE,
            account: admin,
            sender: admin,
        });
        governance.emit(Event::Initialized { version: 1 });
        Ok(governance)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn read(&self) -> RwLockReadGuard<'_, GovernanceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GovernanceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        self.events.emit(self.address, event);
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.read().roles.has_role(role, account)
    }

    pub fn get_role_admin(&self, role: Role) -> Role {
        self.read().roles.role_admin(role)
    }

    pub fn role_members(&self, role: Role) -> Vec<Address> {
        self.read().roles.members(role)
    }

    /// Fails with `AccessControlUnauthorizedAccount` unless `account` holds `role`.
    pub fn check_role(&self, role: Role, account: Address) -> Result<()> {
        check(&self.read().roles, role, account)
    }

    pub fn grant_role(&self, ctx: &CallContext, role: Role, account: Address) -> Result<()> {
        if role == DEFAULT_ADMIN_ROLE {
            return Err(ProtocolError::AccessControlEnforcedDefaultAdminRules);
        }
        let mut state = self.write();
        check(&state.roles, state.roles.role_admin(role), ctx.sender)?;
        if state.roles.grant(role, account) {
            drop(state);
            self.emit(Event::RoleGranted {
                role,
                account,
                sender: ctx.sender,
            });
        }
        Ok(())
    }

    pub fn revoke_role(&self, ctx: &CallContext, role: Role, account: Address) -> Result<()> {
        if role == DEFAULT_ADMIN_ROLE {
            return Err(ProtocolError::AccessControlEnforcedDefaultAdminRules);
        }
        let mut state = self.write();
        check(&state.roles, state.roles.role_admin(role), ctx.sender)?;
        if state.roles.revoke(role, account) {
            drop(state);
            self.emit(Event::RoleRevoked {
                role,
                account,
                sender: ctx.sender,
            });
        }
        Ok(())
    }

    /// Gives up `role` held by the caller. `confirmation` must be the caller.
    /// The default admin may only renounce after a transfer to the zero
    /// address has been scheduled and become due.
    pub fn renounce_role(&self, ctx: &CallContext, role: Role, confirmation: Address) -> Result<()> {
        if confirmation != ctx.sender {
            return Err(ProtocolError::AccessControlBadConfirmation);
        }
        let mut state = self.write();
        if role == DEFAULT_ADMIN_ROLE && confirmation == state.timelock.default_admin() {
            state.timelock.renounce(ctx.timestamp)?;
        }
        if state.roles.revoke(role, confirmation) {
            drop(state);
            self.emit(Event::RoleRevoked {
                role,
                account: confirmation,
                sender: ctx.sender,
            });
        }
        Ok(())
    }

    pub fn set_role_admin(&self, ctx: &CallContext, role: Role, admin_role: Role) -> Result<()> {
        if role == DEFAULT_ADMIN_ROLE {
            return Err(ProtocolError::AccessControlEnforcedDefaultAdminRules);
        }
        let mut state = self.write();
        check(&state.roles, DEFAULT_ADMIN_ROLE, ctx.sender)?;
        let previous_admin_role = state.roles.set_admin(role, admin_role);
        drop(state);
        self.emit(Event::RoleAdminChanged {
            role,
            previous_admin_role,
            new_admin_role: admin_role,
        });
        Ok(())
    }

    pub fn default_admin(&self) -> Address {
        self.read().timelock.default_admin()
    }

    pub fn owner(&self) -> Address {
        self.default_admin()
    }

    pub fn pending_default_admin(&self) -> (Address, Timestamp) {
        self.read().timelock.pending_default_admin()
    }

    pub fn default_admin_delay(&self, now: Timestamp) -> u64 {
        self.read().timelock.default_admin_delay(now)
    }

    pub fn pending_default_admin_delay(&self, now: Timestamp) -> (u64, Timestamp) {
        self.read().timelock.pending_default_admin_delay(now)
    }

    pub fn default_admin_delay_increase_wait(&self) -> u64 {
        DEFAULT_ADMIN_DELAY_INCREASE_WAIT
    }

    pub fn snapshot(&self, now: Timestamp) -> AdminSnapshot {
        let state = self.read();
        let (pending_admin, accept_schedule) = state.timelock.pending_default_admin();
        let (pending_delay, delay_effect_schedule) =
            state.timelock.pending_default_admin_delay(now);
        AdminSnapshot {
            default_admin: state.timelock.default_admin(),
            pending_admin,
            accept_schedule,
            default_admin_delay: state.timelock.default_admin_delay(now),
            pending_delay,
            delay_effect_schedule,
            delay_increase_wait: DEFAULT_ADMIN_DELAY_INCREASE_WAIT,
            implementation: state.implementation,
        }
    }

    pub fn begin_default_admin_transfer(&self, ctx: &CallContext, new_admin: Address) -> Result<()> {
        let mut state = self.write();
        check(&state.roles, DEFAULT_ADMIN_ROLE, ctx.sender)?;
        let scheduled = state.timelock.begin_transfer(new_admin, ctx.timestamp)?;
        drop(state);

        if scheduled.replaced_pending {
            self.emit(Event::DefaultAdminTransferCanceled);
        }
        self.emit(Event::DefaultAdminTransferScheduled {
            new_admin,
            accept_schedule: scheduled.schedule,
        });
        Ok(())
    }

    pub fn cancel_default_admin_transfer(&self, ctx: &CallContext) -> Result<()> {
        let mut state = self.write();
        check(&state.roles, DEFAULT_ADMIN_ROLE, ctx.sender)?;
        let was_scheduled = state.timelock.cancel_transfer();
        drop(state);

        if was_scheduled {
            self.emit(Event::DefaultAdminTransferCanceled);
        }
        Ok(())
    }

    pub fn accept_default_admin_transfer(&self, ctx: &CallContext) -> Result<()> {
        let mut state = self.write();
        let previous = state.timelock.accept_transfer(ctx.sender, ctx.timestamp)?;
        let revoked = state.roles.revoke(DEFAULT_ADMIN_ROLE, previous);
        state.roles.grant(DEFAULT_ADMIN_ROLE, ctx.sender);
        drop(state);

        info!(previous = ?previous, admin = ?ctx.sender, "default admin transferred");
        if revoked {
            self.emit(Event::RoleRevoked {
                role: DEFAULT_ADMIN_ROLE,
                account: previous,
                sender: ctx.sender,
            });
        }
        self.emit(Event::RoleGranted {
            role: DEFAULT_ADMIN_ROLE,
            account: ctx.sender,
            sender: ctx.sender,
        });
        Ok(())
    }

    pub fn change_default_admin_delay(&self, ctx: &CallContext, new_delay: u64) -> Result<()> {
        let mut state = self.write();
        check(&state.roles, DEFAULT_ADMIN_ROLE, ctx.sender)?;
        let scheduled = state.timelock.change_delay(new_delay, ctx.timestamp)?;
        drop(state);

        if scheduled.replaced_pending {
            self.emit(Event::DefaultAdminDelayChangeCanceled);
        }
        self.emit(Event::DefaultAdminDelayChangeScheduled {
            new_delay,
            effect_schedule: scheduled.schedule,
        });
        Ok(())
    }

    pub fn rollback_default_admin_delay(&self, ctx: &CallContext) -> Result<()> {
        let mut state = self.write();
        check(&state.roles, DEFAULT_ADMIN_ROLE, ctx.sender)?;
        let was_waiting = state.timelock.rollback_delay(ctx.timestamp);
        drop(state);

        if was_waiting {
            self.emit(Event::DefaultAdminDelayChangeCanceled);
        }
        Ok(())
    }

    pub fn implementation(&self) -> Address {
        self.read().implementation
    }

    pub fn proxiable_uuid(&self) -> H256 {
        ERC1967_IMPLEMENTATION_SLOT
    }

    /// Swaps the implementation behind the proxy and optionally runs `data`
    /// against it as an initializer in the same call.
    pub fn upgrade_to_and_call(
        &self,
        ctx: &CallContext,
        new_implementation: Address,
        data: Bytes,
    ) -> Result<()> {
        self.check_role(DEFAULT_ADMIN_ROLE, ctx.sender)?;
        if new_implementation.is_zero() || !self.inspector.is_contract(new_implementation) {
            return Err(ProtocolError::ERC1967InvalidImplementation(new_implementation));
        }
        match self.inspector.proxiable_uuid(new_implementation) {
            Some(slot) if slot == ERC1967_IMPLEMENTATION_SLOT => {}
            Some(slot) => return Err(ProtocolError::UUPSUnsupportedProxiableUUID(slot)),
            None => return Err(ProtocolError::ERC1967InvalidImplementation(new_implementation)),
        }
        if data.is_empty() {
            if !ctx.value.is_zero() {
                return Err(ProtocolError::ERC1967NonPayable);
            }
        } else {
            self.inspector
                .initialize(new_implementation, &data)
                .inspect_err(|err| warn!(implementation = ?new_implementation, error = %err, "upgrade initializer failed"))?;
        }

        {
            // The admin seat may have changed hands while the initializer ran.
            let mut state = self.write();
            check(&state.roles, DEFAULT_ADMIN_ROLE, ctx.sender)?;
            state.implementation = new_implementation;
        }
        self.emit(Event::Upgraded {
            implementation: new_implementation,
        });
        Ok(())
    }
}

fn check(roles: &RoleSet, role: Role, account: Address) -> Result<()> {
    if roles.has_role(role, account) {
        Ok(())
    } else {
        Err(ProtocolError::AccessControlUnauthorizedAccount { account, role })
    }
}
