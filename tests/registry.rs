mod common;

use common::{alice, bob, deploy};
use cross_staking::gateway::TokenGateway;
use cross_staking::registry::pool::clone_address;
use cross_staking::types::{DEFAULT_ADMIN_ROLE, PoolStatus, manager_role};
use cross_staking::{Event, ProtocolError};
use ethers::types::{Address, U256};
use std::collections::HashSet;

fn unauthorized(account: Address, role: cross_staking::types::Role) -> ProtocolError {
    ProtocolError::AccessControlUnauthorizedAccount { account, role }
}

#[test]
fn pool_ids_are_sequential_and_addresses_resolve_back() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let other = fx.reward;

    let ids: Vec<U256> = (0..5)
        .map(|i| fx.create_pool(if i % 2 == 0 { fx.token } else { other }, 0))
        .collect();
    assert_eq!(ids, (0u64..5).map(U256::from).collect::<Vec<_>>());
    assert_eq!(registry.pool_count(), U256::from(5));
    assert_eq!(registry.get_all_pool_ids(), ids);

    let mut addresses = HashSet::new();
    for id in &ids {
        let address = registry.get_pool_address(*id).unwrap();
        assert_eq!(address, clone_address(registry.address(), *id, fx.deployment.pool_implementation));
        assert_eq!(registry.get_pool_id_by_address(address), Some(*id));
        assert!(addresses.insert(address));
    }
    assert_eq!(registry.get_pool_id_by_address(Address::repeat_byte(0x77)), None);

    let token_pools = registry.get_pool_ids_by_staking_token(fx.token);
    assert_eq!(token_pools, vec![U256::from(0), U256::from(2), U256::from(4)]);
    assert_eq!(
        registry.pool_by_staking_token_at(fx.token, 1).unwrap(),
        registry.get_pool_address(U256::from(2)).unwrap()
    );
    assert_eq!(
        registry.pool_by_staking_token_at(fx.token, 3),
        Err(ProtocolError::PoolIndexOutOfBounds {
            token: fx.token,
            index: 3,
        })
    );
    assert!(registry.get_pool_ids_by_staking_token(Address::repeat_byte(0x99)).is_empty());

    let created = fx
        .protocol
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::PoolCreated { .. }))
        .count();
    assert_eq!(created, 5);
}

#[test]
fn pool_info_reflects_creation_parameters() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let pool_id = fx.create_pool(fx.token, 25);

    let info = registry.get_pool_info(pool_id).unwrap();
    assert_eq!(info.pool_id, pool_id);
    assert_eq!(info.staking_token, fx.token);
    assert_eq!(info.implementation, fx.deployment.pool_implementation);
    assert_eq!(info.created_at, common::NOW);
    assert_eq!(info.status, PoolStatus::Active);
    assert_eq!(info.min_stake_amount, U256::from(25));
    assert!(info.reward_tokens.is_empty());

    assert_eq!(
        registry.get_pool_info(U256::from(1)),
        Err(ProtocolError::PoolNotFound(U256::from(1)))
    );
}

#[test]
fn create_pool_validates_caller_and_token() {
    let fx = deploy();
    let registry = &fx.protocol.registry;

    assert_eq!(
        registry.create_pool(&fx.admin_ctx(), Address::zero(), U256::zero()),
        Err(ProtocolError::CanNotZeroAddress)
    );
    assert_eq!(
        registry.create_pool(&fx.ctx(alice()), fx.token, U256::zero()),
        Err(unauthorized(alice(), manager_role()))
    );
    assert_eq!(registry.pool_count(), U256::zero());
}

#[test]
fn reward_token_membership_is_idempotent() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let pool_id = fx.create_pool(fx.token, 0);
    let admin = fx.admin_ctx();

    assert_eq!(registry.add_reward_token(&admin, pool_id, fx.reward), Ok(true));
    assert_eq!(registry.add_reward_token(&admin, pool_id, fx.reward), Ok(false));
    assert_eq!(registry.get_pool_info(pool_id).unwrap().reward_tokens, vec![fx.reward]);
    assert_eq!(
        fx.protocol.router.get_user_staking_info(pool_id, alice()).unwrap().reward_tokens.len(),
        1
    );

    assert_eq!(registry.remove_reward_token(&admin, pool_id, fx.reward), Ok(true));
    assert_eq!(registry.remove_reward_token(&admin, pool_id, fx.reward), Ok(false));
    assert!(registry.get_pool_info(pool_id).unwrap().reward_tokens.is_empty());
    assert_eq!(
        registry.add_reward_token(&admin, pool_id, Address::zero()),
        Err(ProtocolError::CanNotZeroAddress)
    );

    let events = fx.protocol.events.events();
    let added = events.iter().filter(|e| matches!(e, Event::RewardTokenAdded { .. })).count();
    let removed = events.iter().filter(|e| matches!(e, Event::RewardTokenRemoved { .. })).count();
    assert_eq!((added, removed), (1, 1));
}

#[test]
fn sweep_only_takes_what_stakers_are_not_owed() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let pool_id = fx.create_pool(fx.token, 0);
    let pool_address = registry.get_pool_address(pool_id).unwrap();
    fx.fund(fx.token, alice(), 100);
    fx.stake(pool_id, alice(), 100);

    // Tokens sent straight to the pool, outside the router.
    fx.chain.mint(fx.token, pool_address, U256::from(30)).unwrap();
    fx.chain.mint(fx.reward, pool_address, U256::from(12)).unwrap();

    assert_eq!(
        registry.withdraw_from_pool(&fx.admin_ctx(), pool_id, fx.token, bob()),
        Ok(U256::from(30))
    );
    assert_eq!(fx.chain.balance_of(fx.token, bob()), U256::from(30));
    assert_eq!(
        registry.withdraw_from_pool(&fx.admin_ctx(), pool_id, fx.token, bob()),
        Err(ProtocolError::InvalidAmount)
    );
    assert_eq!(
        registry.withdraw_from_pool(&fx.admin_ctx(), pool_id, fx.reward, bob()),
        Ok(U256::from(12))
    );
    assert!(fx.protocol.events.events().contains(&Event::WithdrawnFromPool {
        pool_id,
        token: fx.reward,
        to: bob(),
        amount: U256::from(12),
    }));

    fx.protocol.router.unstake_erc20(&fx.ctx(alice()), pool_id).unwrap();
    assert_eq!(fx.chain.balance_of(fx.token, alice()), U256::from(100));
}

#[test]
fn manager_operations_require_the_manager_role() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let pool_id = fx.create_pool(fx.token, 0);
    let ctx = fx.ctx(alice());
    let denied = unauthorized(alice(), manager_role());

    assert_eq!(registry.set_pool_status(&ctx, pool_id, PoolStatus::Paused), Err(denied.clone()));
    assert_eq!(registry.update_min_stake_amount(&ctx, pool_id, U256::one()), Err(denied.clone()));
    assert_eq!(registry.add_reward_token(&ctx, pool_id, fx.reward), Err(denied.clone()));
    assert_eq!(registry.remove_reward_token(&ctx, pool_id, fx.reward), Err(denied.clone()));
    assert_eq!(registry.withdraw_from_pool(&ctx, pool_id, fx.token, alice()), Err(denied.clone()));
    assert_eq!(
        registry.set_pool_implementation(&ctx, fx.deployment.pool_implementation),
        Err(denied)
    );

    fx.protocol
        .governance
        .grant_role(&fx.admin_ctx(), manager_role(), alice())
        .unwrap();
    registry.set_pool_status(&ctx, pool_id, PoolStatus::Paused).unwrap();
    registry.update_min_stake_amount(&ctx, pool_id, U256::from(9)).unwrap();

    let info = registry.get_pool_info(pool_id).unwrap();
    assert_eq!(info.status, PoolStatus::Paused);
    assert_eq!(info.min_stake_amount, U256::from(9));
    assert!(fx.protocol.events.events().contains(&Event::MinStakeAmountUpdated {
        pool_id,
        previous: U256::zero(),
        amount: U256::from(9),
    }));
}

#[test]
fn new_implementation_applies_to_future_pools_only() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let admin = fx.admin_ctx();
    let first = fx.create_pool(fx.token, 0);

    let no_code = Address::repeat_byte(0x42);
    assert_eq!(
        registry.set_pool_implementation(&admin, no_code),
        Err(ProtocolError::ERC1967InvalidImplementation(no_code))
    );
    assert_eq!(
        registry.set_pool_implementation(&admin, Address::zero()),
        Err(ProtocolError::CanNotZeroAddress)
    );

    let v2 = Address::repeat_byte(0x44);
    fx.chain.deploy_contract(v2, None);
    registry.set_pool_implementation(&admin, v2).unwrap();
    assert_eq!(registry.pool_implementation(), v2);
    let second = fx.create_pool(fx.token, 0);

    assert_eq!(
        registry.get_pool_info(first).unwrap().implementation,
        fx.deployment.pool_implementation
    );
    assert_eq!(registry.get_pool_info(second).unwrap().implementation, v2);
    assert_eq!(
        registry.get_pool_address(second).unwrap(),
        clone_address(registry.address(), second, v2)
    );
    assert!(fx.protocol.events.events().contains(&Event::PoolImplementationSet {
        previous: fx.deployment.pool_implementation,
        implementation: v2,
    }));
}

#[test]
fn replacing_the_router_cuts_off_the_old_one() {
    let fx = deploy();
    let registry = &fx.protocol.registry;
    let pool_id = fx.create_pool(fx.token, 0);
    fx.fund(fx.token, alice(), 100);
    fx.protocol
        .governance
        .grant_role(&fx.admin_ctx(), manager_role(), bob())
        .unwrap();

    let replacement = Address::repeat_byte(0x22);
    assert_eq!(
        registry.set_router(&fx.ctx(bob()), replacement),
        Err(unauthorized(bob(), DEFAULT_ADMIN_ROLE))
    );
    assert_eq!(
        registry.set_router(&fx.admin_ctx(), Address::zero()),
        Err(ProtocolError::CanNotZeroAddress)
    );
    registry.set_router(&fx.admin_ctx(), replacement).unwrap();
    assert_eq!(registry.router(), replacement);
    assert!(fx.protocol.events.events().contains(&Event::RouterSet {
        previous: fx.router_address(),
        router: replacement,
    }));

    assert_eq!(
        fx.protocol.router.stake_erc20(&fx.ctx(alice()), pool_id, U256::from(100)),
        Err(ProtocolError::OnlyRouter(fx.router_address()))
    );
    assert_eq!(fx.chain.balance_of(fx.token, alice()), U256::from(100));
    assert!(registry.staked_amount(pool_id, alice()).unwrap().is_zero());
}
