use crate as pallet_withdrawal_queue;
use frame_support::{
	derive_impl, dispatch::DispatchResult, parameter_types, traits::ConstU64, PalletId,
};
use sp_core::U256;
use sp_keyring::AccountKeyring;
use sp_runtime::{
	traits::{IdentifyAccount, IdentityLookup, Verify},
	BuildStorage,
};
use std::cell::Cell;

pub type Signature = sp_runtime::MultiSignature;
pub type AccountId = <<Signature as Verify>::Signer as IdentifyAccount>::AccountId;
pub type Balance = u128;

// Test configuration constants
pub const INITIAL_BALANCE: Balance = 1_000_000_000_000_000_000_000_000;
pub const E27: u128 = 1_000_000_000_000_000_000_000_000_000;
pub const STK: u128 = 1_000_000_000_000_000_000;
pub const INITIAL_REPORT_TIMESTAMP: u64 = 500;

// Configure a mock runtime to test the pallet
frame_support::construct_runtime!(
	pub enum Test
	{
		System: frame_system,
		Balances: pallet_balances,
		Timestamp: pallet_timestamp,
		WithdrawalQueue: pallet_withdrawal_queue,
	}
);

#[derive_impl(frame_system::config_preludes::TestDefaultConfig as frame_system::DefaultConfig)]
impl frame_system::Config for Test {
	type Block = frame_system::mocking::MockBlock<Test>;
	type AccountId = AccountId;
	type AccountData = pallet_balances::AccountData<Balance>;
	type Lookup = IdentityLookup<Self::AccountId>;
}

parameter_types! {
	pub const ExistentialDeposit: Balance = 1;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
	type Balance = Balance;
	type AccountStore = System;
	type ExistentialDeposit = ExistentialDeposit;
}

impl pallet_timestamp::Config for Test {
	type Moment = u64;
	type OnTimestampSet = ();
	type MinimumPeriod = ConstU64<1>;
	type WeightInfo = ();
}

parameter_types! {
	pub const WithdrawalQueuePalletId: PalletId = PalletId(*b"wthdrwlq");
}

impl pallet_withdrawal_queue::Config for Test {
	type RuntimeEvent = RuntimeEvent;
	type PalletId = WithdrawalQueuePalletId;
	type Currency = Balances;
	type StakedToken = MockStakedToken;
	type WeightInfo = ();
}

thread_local! {
	static SHARE_RATE_E27: Cell<u128> = Cell::new(E27);
	static CUSTODIED_STK: Cell<u128> = Cell::new(0);
	static BURNED_SHARES: Cell<u128> = Cell::new(0);
}

/// Set the STK share rate the mock token converts at (scaled by 10^27).
pub fn set_share_rate(rate_e27: u128) {
	SHARE_RATE_E27.with(|rate| rate.set(rate_e27));
}

pub fn share_rate() -> u128 {
	SHARE_RATE_E27.with(|rate| rate.get())
}

/// Total STK the mock token has moved into queue custody.
pub fn custodied_stk() -> u128 {
	CUSTODIED_STK.with(|total| total.get())
}

/// Total shares the mock token has burned out of custody.
pub fn burned_shares() -> u128 {
	BURNED_SHARES.with(|total| total.get())
}

fn reset_mock_token() {
	SHARE_RATE_E27.with(|rate| rate.set(E27));
	CUSTODIED_STK.with(|total| total.set(0));
	BURNED_SHARES.with(|total| total.set(0));
}

/// Fixed-rate stand-in for the liquid-staking token.
pub struct MockStakedToken;

impl pallet_withdrawal_queue::StakedTokenProvider<AccountId> for MockStakedToken {
	fn shares_of(stk_amount: u128) -> u128 {
		let shares = U256::from(stk_amount) * U256::from(E27) / U256::from(share_rate());
		shares.as_u128()
	}

	fn transfer_to_custody(
		_from: &AccountId,
		_custody: &AccountId,
		stk_amount: u128,
	) -> DispatchResult {
		CUSTODIED_STK.with(|total| total.set(total.get() + stk_amount));
		Ok(())
	}

	fn burn_shares(_custody: &AccountId, shares: u128) -> DispatchResult {
		BURNED_SHARES.with(|total| total.set(total.get() + shares));
		Ok(())
	}
}

// Test accounts
pub fn alice() -> AccountId {
	AccountKeyring::Alice.to_account_id()
}
pub fn bob() -> AccountId {
	AccountKeyring::Bob.to_account_id()
}
pub fn user1() -> AccountId {
	AccountKeyring::Charlie.to_account_id()
}
pub fn user2() -> AccountId {
	AccountKeyring::Dave.to_account_id()
}
pub fn recipient() -> AccountId {
	AccountKeyring::Eve.to_account_id()
}

pub fn new_test_ext() -> sp_io::TestExternalities {
	let mut t = frame_system::GenesisConfig::<Test>::default().build_storage().unwrap();

	pallet_balances::GenesisConfig::<Test> {
		balances: vec![
			(alice(), INITIAL_BALANCE),
			(bob(), INITIAL_BALANCE),
			(user1(), INITIAL_BALANCE),
			(user2(), INITIAL_BALANCE),
			(recipient(), INITIAL_BALANCE),
		],
	}
	.assimilate_storage(&mut t)
	.unwrap();

	let mut ext: sp_io::TestExternalities = t.into();

	ext.execute_with(|| {
		System::set_block_number(1);
		Timestamp::set_timestamp(1_000);
		reset_mock_token();
		// Alice and Bob act as the oracle/finalizer role
		pallet_withdrawal_queue::Finalizers::<Test>::put(vec![alice(), bob()]);
		pallet_withdrawal_queue::LastReportTimestamp::<Test>::put(INITIAL_REPORT_TIMESTAMP);
	});
	ext
}
