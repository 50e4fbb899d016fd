// src/governance/timelock.rs
//! Default-admin timelock. Two independent schedules: one for handing the
//! admin seat to a new account, one for changing the delay itself. A pending
//! delay change has no commit step; it is read as applied once its schedule
//! has been reached.

use ethers::types::Address;
use serde::Serialize;

use crate::error::{ProtocolError, Result};
use crate::types::Timestamp;

/// Minimum wait before an increased delay applies: 5 days.
pub const DEFAULT_ADMIN_DELAY_INCREASE_WAIT: u64 = 5 * 24 * 60 * 60;

fn is_set(schedule: Timestamp) -> bool {
    schedule != 0
}

fn has_passed(schedule: Timestamp, now: Timestamp) -> bool {
    now >= schedule
}

/// Which previously pending change, if any, a new schedule replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub schedule: Timestamp,
    pub replaced_pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTimelock {
    current_admin: Address,
    pending_admin: Address,
    accept_schedule: Timestamp,
    current_delay: u64,
    pending_delay: u64,
    effect_schedule: Timestamp,
}

impl AdminTimelock {
    pub fn new(admin: Address, delay: u64) -> Self {
        Self {
            current_admin: admin,
            current_delay: delay,
            ..Self::default()
        }
    }

    pub fn default_admin(&self) -> Address {
        self.current_admin
    }

    /// `(newAdmin, acceptSchedule)`; both zero when nothing is pending.
    pub fn pending_default_admin(&self) -> (Address, Timestamp) {
        (self.pending_admin, self.accept_schedule)
    }

    pub fn default_admin_delay(&self, now: Timestamp) -> u64 {
        if is_set(self.effect_schedule) && has_passed(self.effect_schedule, now) {
            self.pending_delay
        } else {
            self.current_delay
        }
    }

    /// `(newDelay, effectSchedule)` while a change is waiting, zeros otherwise.
    pub fn pending_default_admin_delay(&self, now: Timestamp) -> (u64, Timestamp) {
        if is_set(self.effect_schedule) && !has_passed(self.effect_schedule, now) {
            (self.pending_delay, self.effect_schedule)
        } else {
            (0, 0)
        }
    }

    /// Wait before `new_delay` applies: `min(new_delay, increase_wait)` for an
    /// increase, `current - new_delay` for a decrease.
    pub fn delay_change_wait(&self, new_delay: u64, now: Timestamp) -> u64 {
        let current = self.default_admin_delay(now);
        if new_delay > current {
            new_delay.min(DEFAULT_ADMIN_DELAY_INCREASE_WAIT)
        } else {
            current - new_delay
        }
    }

    pub fn begin_transfer(&mut self, new_admin: Address, now: Timestamp) -> Result<Scheduled> {
        let schedule = now
            .checked_add(self.default_admin_delay(now))
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let replaced_pending = self.clear_pending_admin();
        self.pending_admin = new_admin;
        self.accept_schedule = schedule;
        Ok(Scheduled {
            schedule,
            replaced_pending,
        })
    }

    /// Drops the pending transfer; true when one was scheduled, due or not.
    pub fn cancel_transfer(&mut self) -> bool {
        self.clear_pending_admin()
    }

    fn clear_pending_admin(&mut self) -> bool {
        let was_scheduled = is_set(self.accept_schedule);
        self.pending_admin = Address::zero();
        self.accept_schedule = 0;
        was_scheduled
    }

    /// Completes the transfer for `caller`; returns the previous admin.
    pub fn accept_transfer(&mut self, caller: Address, now: Timestamp) -> Result<Address> {
        if caller != self.pending_admin || !is_set(self.accept_schedule) {
            return Err(ProtocolError::AccessControlInvalidDefaultAdmin(caller));
        }
        if !has_passed(self.accept_schedule, now) {
            return Err(ProtocolError::AccessControlEnforcedDefaultAdminDelay(
                self.accept_schedule,
            ));
        }
        let previous = std::mem::replace(&mut self.current_admin, caller);
        self.pending_admin = Address::zero();
        self.accept_schedule = 0;
        Ok(previous)
    }

    /// Checks that the current admin may give up the seat: a transfer to the
    /// zero address must have been scheduled and become due.
    pub fn renounce(&mut self, now: Timestamp) -> Result<()> {
        let (new_admin, schedule) = self.pending_default_admin();
        if !new_admin.is_zero() || !is_set(schedule) || !has_passed(schedule, now) {
            return Err(ProtocolError::AccessControlEnforcedDefaultAdminDelay(schedule));
        }
        self.accept_schedule = 0;
        self.current_admin = Address::zero();
        Ok(())
    }

    pub fn change_delay(&mut self, new_delay: u64, now: Timestamp) -> Result<Scheduled> {
        let schedule = now
            .checked_add(self.delay_change_wait(new_delay, now))
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let replaced_pending = self.set_pending_delay(new_delay, schedule, now);
        Ok(Scheduled {
            schedule,
            replaced_pending,
        })
    }

    /// Discards a delay change that hasn't applied yet; true if one was waiting.
    pub fn rollback_delay(&mut self, now: Timestamp) -> bool {
        self.set_pending_delay(0, 0, now)
    }

    fn set_pending_delay(&mut self, delay: u64, schedule: Timestamp, now: Timestamp) -> bool {
        let mut replaced_pending = false;
        if is_set(self.effect_schedule) {
            if has_passed(self.effect_schedule, now) {
                self.current_delay = self.pending_delay;
            } else {
                replaced_pending = true;
            }
        }
        self.pending_delay = delay;
        self.effect_schedule = schedule;
        replaced_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    fn admin() -> Address {
        Address::repeat_byte(0xad)
    }

    #[test]
    fn transfer_is_accepted_only_after_schedule() {
        let mut lock = AdminTimelock::new(admin(), DAY);
        let next = Address::repeat_byte(0x0e);
        let scheduled = lock.begin_transfer(next, 1_000).unwrap();
        assert_eq!(scheduled.schedule, 1_000 + DAY);

        assert_eq!(
            lock.accept_transfer(next, 1_000 + DAY - 1),
            Err(ProtocolError::AccessControlEnforcedDefaultAdminDelay(1_000 + DAY))
        );
        assert_eq!(lock.accept_transfer(next, 1_000 + DAY), Ok(admin()));
        assert_eq!(lock.default_admin(), next);
        assert_eq!(
            lock.accept_transfer(next, 1_000 + DAY),
            Err(ProtocolError::AccessControlInvalidDefaultAdmin(next))
        );
    }

    #[test]
    fn rescheduling_replaces_a_waiting_transfer() {
        let mut lock = AdminTimelock::new(admin(), DAY);
        assert!(!lock.begin_transfer(Address::repeat_byte(1), 0).unwrap().replaced_pending);
        assert!(lock.begin_transfer(Address::repeat_byte(2), 10).unwrap().replaced_pending);
        assert_eq!(lock.pending_default_admin(), (Address::repeat_byte(2), 10 + DAY));

        // A due but unaccepted transfer still counts as replaced.
        assert!(lock.begin_transfer(Address::repeat_byte(3), 20 + DAY).unwrap().replaced_pending);
        assert!(lock.cancel_transfer());
        assert!(!lock.cancel_transfer());
    }

    #[test]
    fn delay_increase_is_capped_by_increase_wait() {
        let mut lock = AdminTimelock::new(admin(), DAY);
        let scheduled = lock.change_delay(30 * DAY, 0).unwrap();
        assert_eq!(scheduled.schedule, DEFAULT_ADMIN_DELAY_INCREASE_WAIT);

        let small = AdminTimelock::new(admin(), DAY).delay_change_wait(2 * DAY, 0);
        assert_eq!(small, 2 * DAY);
    }

    #[test]
    fn delay_decrease_waits_the_difference() {
        let mut lock = AdminTimelock::new(admin(), 10 * DAY);
        let scheduled = lock.change_delay(3 * DAY, 100).unwrap();
        assert_eq!(scheduled.schedule, 100 + 7 * DAY);

        assert_eq!(lock.default_admin_delay(100 + 7 * DAY - 1), 10 * DAY);
        assert_eq!(lock.pending_default_admin_delay(100), (3 * DAY, 100 + 7 * DAY));
        assert_eq!(lock.default_admin_delay(100 + 7 * DAY), 3 * DAY);
        assert_eq!(lock.pending_default_admin_delay(100 + 7 * DAY), (0, 0));
    }

    #[test]
    fn rollback_restores_previous_delay() {
        let mut lock = AdminTimelock::new(admin(), DAY);
        lock.change_delay(2 * DAY, 0).unwrap();
        assert!(lock.rollback_delay(DAY));
        assert_eq!(lock.default_admin_delay(10 * DAY), DAY);
        assert!(!lock.rollback_delay(DAY));
    }

    #[test]
    fn applied_delay_is_materialized_on_next_change() {
        let mut lock = AdminTimelock::new(admin(), DAY);
        lock.change_delay(2 * DAY, 0).unwrap();
        let scheduled = lock.change_delay(DAY, 3 * DAY).unwrap();
        assert!(!scheduled.replaced_pending);
        assert_eq!(scheduled.schedule, 4 * DAY);
        assert_eq!(lock.default_admin_delay(3 * DAY), 2 * DAY);
    }

    #[test]
    fn renounce_requires_due_transfer_to_zero() {
        let mut lock = AdminTimelock::new(admin(), DAY);
        assert_eq!(lock.renounce(0), Err(ProtocolError::AccessControlEnforcedDefaultAdminDelay(0)));

        lock.begin_transfer(Address::zero(), 0).unwrap();
        assert!(lock.renounce(DAY - 1).is_err());
        assert_eq!(lock.renounce(DAY), Ok(()));
        assert!(lock.default_admin().is_zero());
    }
}
