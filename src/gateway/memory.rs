// src/gateway/memory.rs
//! In-process chain state: native balances, ERC20 tokens with permit, a
//! wrapped-native token and a directory of deployed code. Backs the dev node
//! and the test suite.

use ethers::types::{Address, Bytes, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::permit::{domain_separator, permit_digest, recover_signer};
use super::{CodeInspector, PermitRequest, TokenGateway};
use crate::error::GatewayError;
use crate::types::Timestamp;

/// How a token answers `transfer`/`transferFrom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenBehavior {
    #[default]
    Standard,
    /// Returns `false` instead of moving funds.
    ReturnsFalse,
    /// Reverts every transfer.
    Reverts,
}

/// A completed token transfer, handed to the token's hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferNotice {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// Code run by a token after it moved funds, like a receive hook. It runs
/// with no chain lock held and may call back into the protocol.
pub type TransferHook = Arc<dyn Fn(&TransferNotice) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Default)]
struct TokenState {
    metadata: Option<TokenMetadata>,
    behavior: TokenBehavior,
    wrapped_native: bool,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    nonces: HashMap<Address, U256>,
}

impl TokenState {
    fn balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    fn debit(&mut self, account: Address, amount: U256) -> Result<(), GatewayError> {
        let available = self.balance(account);
        if available < amount {
            return Err(GatewayError::InsufficientBalance {
                account,
                needed: amount,
                available,
            });
        }
        self.balances.insert(account, available - amount);
        Ok(())
    }

    fn credit(&mut self, account: Address, amount: U256) {
        let entry = self.balances.entry(account).or_default();
        *entry = entry.saturating_add(amount);
    }
}

#[derive(Debug, Clone, Default)]
struct Contract {
    proxiable_uuid: Option<H256>,
    rejects_initialization: bool,
}

#[derive(Default)]
struct ChainState {
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, TokenState>,
    contracts: HashMap<Address, Contract>,
    rejects_native: HashSet<Address>,
}

impl ChainState {
    fn token_mut(&mut self, token: Address) -> Result<&mut TokenState, GatewayError> {
        self.tokens
            .get_mut(&token)
            .ok_or(GatewayError::UnknownToken(token))
    }

    fn native_balance(&self, account: Address) -> U256 {
        self.native.get(&account).copied().unwrap_or_default()
    }

    fn move_native(&mut self, from: Address, to: Address, amount: U256) -> Result<(), GatewayError> {
        if self.rejects_native.contains(&to) {
            return Err(GatewayError::NativeTransferRejected(to));
        }
        let available = self.native_balance(from);
        if available < amount {
            return Err(GatewayError::InsufficientBalance {
                account: from,
                needed: amount,
                available,
            });
        }
        self.native.insert(from, available - amount);
        let entry = self.native.entry(to).or_default();
        *entry = entry.saturating_add(amount);
        Ok(())
    }
}

pub struct MemoryChain {
    chain_id: u64,
    state: RwLock<ChainState>,
    hooks: RwLock<HashMap<Address, TransferHook>>,
}

impl MemoryChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: RwLock::new(ChainState::default()),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deploy_token(&self, address: Address, metadata: TokenMetadata, behavior: TokenBehavior) {
        let mut state = self.write();
        state.contracts.entry(address).or_default();
        state.tokens.insert(
            address,
            TokenState {
                metadata: Some(metadata),
                behavior,
                ..TokenState::default()
            },
        );
    }

    pub fn deploy_wrapped_native(&self, address: Address, metadata: TokenMetadata) {
        let mut state = self.write();
        state.contracts.entry(address).or_default();
        state.tokens.insert(
            address,
            TokenState {
                metadata: Some(metadata),
                wrapped_native: true,
                ..TokenState::default()
            },
        );
    }

    /// Registers code at `address`. A UUPS implementation reports the ERC-1967
    /// slot as its proxiable uuid.
    pub fn deploy_contract(&self, address: Address, proxiable_uuid: Option<H256>) {
        self.write().contracts.insert(
            address,
            Contract {
                proxiable_uuid,
                rejects_initialization: false,
            },
        );
    }

    /// Makes every initialization call delegated into `implementation` revert.
    pub fn reject_initialization(&self, implementation: Address) {
        self.write()
            .contracts
            .entry(implementation)
            .or_default()
            .rejects_initialization = true;
    }

    pub fn set_behavior(&self, token: Address, behavior: TokenBehavior) -> Result<(), GatewayError> {
        self.write().token_mut(token)?.behavior = behavior;
        Ok(())
    }

    pub fn set_transfer_hook(&self, token: Address, hook: TransferHook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, hook);
    }

    pub fn clear_transfer_hook(&self, token: Address) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
    }

    pub fn mint(&self, token: Address, to: Address, amount: U256) -> Result<(), GatewayError> {
        self.write().token_mut(token)?.credit(to, amount);
        Ok(())
    }

    pub fn set_native_balance(&self, account: Address, amount: U256) {
        self.write().native.insert(account, amount);
    }

    /// Makes `account` behave like a contract without a payable fallback.
    pub fn reject_native(&self, account: Address) {
        self.write().rejects_native.insert(account);
    }

    pub fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), GatewayError> {
        self.write()
            .token_mut(token)?
            .allowances
            .insert((owner, spender), amount);
        Ok(())
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.read()
            .tokens
            .get(&token)
            .and_then(|t| t.allowances.get(&(owner, spender)).copied())
            .unwrap_or_default()
    }

    pub fn nonces(&self, token: Address, owner: Address) -> U256 {
        self.read()
            .tokens
            .get(&token)
            .and_then(|t| t.nonces.get(&owner).copied())
            .unwrap_or_default()
    }

    pub fn metadata(&self, token: Address) -> Option<TokenMetadata> {
        self.read().tokens.get(&token).and_then(|t| t.metadata.clone())
    }

    pub fn domain_separator(&self, token: Address) -> Result<H256, GatewayError> {
        let metadata = self.metadata(token).ok_or(GatewayError::UnknownToken(token))?;
        Ok(domain_separator(&metadata.name, self.chain_id, token))
    }

    /// Moves `amount` and returns the notice to hand to the hook, or
    /// `Ok(None)` when the token answered `false`.
    fn move_tokens(
        &self,
        token: Address,
        spender: Option<Address>,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TransferNotice>, GatewayError> {
        let mut state = self.write();
        let entry = state.token_mut(token)?;
        match entry.behavior {
            TokenBehavior::Reverts => {
                return Err(GatewayError::Reverted(format!("{token:?}: transfer disabled")));
            }
            TokenBehavior::ReturnsFalse => return Ok(None),
            TokenBehavior::Standard => {}
        }

        if let Some(spender) = spender {
            let allowed = entry
                .allowances
                .get(&(from, spender))
                .copied()
                .unwrap_or_default();
            if allowed < amount {
                return Err(GatewayError::InsufficientAllowance {
                    spender,
                    needed: amount,
                    allowed,
                });
            }
            entry.debit(from, amount)?;
            if allowed != U256::MAX {
                entry.allowances.insert((from, spender), allowed - amount);
            }
        } else {
            entry.debit(from, amount)?;
        }
        entry.credit(to, amount);

        Ok(Some(TransferNotice {
            token,
            from,
            to,
            amount,
        }))
    }

    fn run_hook(&self, notice: &TransferNotice) {
        let hook = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&notice.token)
            .cloned();
        if let Some(hook) = hook {
            hook(notice);
        }
    }
}

impl TokenGateway for MemoryChain {
    fn balance_of(&self, token: Address, account: Address) -> U256 {
        self.read()
            .tokens
            .get(&token)
            .map(|t| t.balance(account))
            .unwrap_or_default()
    }

    fn transfer(
        &self,
        token: Address,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<bool, GatewayError> {
        match self.move_tokens(token, None, caller, to, amount)? {
            Some(notice) => {
                self.run_hook(&notice);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn transfer_from(
        &self,
        token: Address,
        caller: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<bool, GatewayError> {
        match self.move_tokens(token, Some(caller), from, to, amount)? {
            Some(notice) => {
                self.run_hook(&notice);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn permit(
        &self,
        token: Address,
        request: &PermitRequest,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        if U256::from(now) > request.deadline {
            return Err(GatewayError::ExpiredSignature(request.deadline));
        }
        let domain = self.domain_separator(token)?;

        let mut state = self.write();
        let entry = state.token_mut(token)?;
        let nonce = entry.nonces.get(&request.owner).copied().unwrap_or_default();
        let digest = permit_digest(
            domain,
            request.owner,
            request.spender,
            request.value,
            nonce,
            request.deadline,
        );
        let signer = recover_signer(digest, request.v, request.r, request.s)?;
        if signer != request.owner {
            return Err(GatewayError::InvalidSigner {
                signer,
                owner: request.owner,
            });
        }

        entry.nonces.insert(request.owner, nonce + 1);
        entry
            .allowances
            .insert((request.owner, request.spender), request.value);
        Ok(())
    }

    fn native_balance(&self, account: Address) -> U256 {
        self.read().native_balance(account)
    }

    fn deposit(
        &self,
        wrapped: Address,
        payer: Address,
        to: Address,
        value: U256,
    ) -> Result<(), GatewayError> {
        let mut state = self.write();
        if !state.tokens.get(&wrapped).is_some_and(|t| t.wrapped_native) {
            return Err(GatewayError::UnknownToken(wrapped));
        }
        state.move_native(payer, wrapped, value)?;
        state.token_mut(wrapped)?.credit(to, value);
        Ok(())
    }

    fn withdraw_to(
        &self,
        wrapped: Address,
        holder: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), GatewayError> {
        let mut state = self.write();
        let entry = state.token_mut(wrapped)?;
        if !entry.wrapped_native {
            return Err(GatewayError::UnknownToken(wrapped));
        }
        let available = entry.balance(holder);
        if available < amount {
            return Err(GatewayError::InsufficientBalance {
                account: holder,
                needed: amount,
                available,
            });
        }
        state.move_native(wrapped, to, amount)?;
        state.token_mut(wrapped)?.debit(holder, amount)
    }
}

impl CodeInspector for MemoryChain {
    fn code_size(&self, account: Address) -> usize {
        // Every registered contract reports the size of an EIP-1167 clone.
        if self.read().contracts.contains_key(&account) {
            45
        } else {
            0
        }
    }

    fn proxiable_uuid(&self, implementation: Address) -> Option<H256> {
        self.read()
            .contracts
            .get(&implementation)
            .and_then(|c| c.proxiable_uuid)
    }

    fn initialize(&self, implementation: Address, data: &Bytes) -> Result<(), GatewayError> {
        match self.read().contracts.get(&implementation) {
            Some(contract) if !contract.rejects_initialization => Ok(()),
            Some(_) => Err(GatewayError::Reverted(format!(
                "initializer rejected {} bytes of calldata",
                data.len()
            ))),
            None => Err(GatewayError::Reverted(format!(
                "{implementation:?} has no code"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TokenMetadata {
        TokenMetadata {
            name: "Test".into(),
            symbol: "TST".into(),
            decimals: 18,
        }
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let chain = MemoryChain::new(1);
        let token = Address::repeat_byte(0x10);
        let (owner, spender, to) = (
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        chain.deploy_token(token, metadata(), TokenBehavior::Standard);
        chain.mint(token, owner, U256::from(100)).unwrap();
        chain.approve(token, owner, spender, U256::from(60)).unwrap();

        assert!(chain.transfer_from(token, spender, owner, to, U256::from(40)).unwrap());
        assert_eq!(chain.allowance(token, owner, spender), U256::from(20));
        assert_eq!(chain.balance_of(token, to), U256::from(40));
        assert!(matches!(
            chain.transfer_from(token, spender, owner, to, U256::from(40)),
            Err(GatewayError::InsufficientAllowance { .. })
        ));
    }

    #[test]
    fn failed_unwrap_leaves_balances_untouched() {
        let chain = MemoryChain::new(1);
        let wrapped = Address::repeat_byte(0x20);
        let (holder, sink) = (Address::repeat_byte(1), Address::repeat_byte(9));
        chain.deploy_wrapped_native(wrapped, metadata());
        chain.set_native_balance(holder, U256::from(10));
        chain.deposit(wrapped, holder, holder, U256::from(10)).unwrap();
        chain.reject_native(sink);

        assert_eq!(
            chain.withdraw_to(wrapped, holder, sink, U256::from(10)),
            Err(GatewayError::NativeTransferRejected(sink))
        );
        assert_eq!(chain.balance_of(wrapped, holder), U256::from(10));
        assert_eq!(chain.native_balance(wrapped), U256::from(10));

        chain.withdraw(wrapped, holder, U256::from(10)).unwrap();
        assert_eq!(chain.native_balance(holder), U256::from(10));
        assert!(chain.balance_of(wrapped, holder).is_zero());
    }
}
