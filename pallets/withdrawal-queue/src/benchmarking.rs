//! Benchmarking setup for pallet-withdrawal-queue
#![cfg(feature = "runtime-benchmarks")]

use super::*;
#[allow(unused_imports)]
use crate::Pallet as WithdrawalQueue;
use frame_benchmarking::v2::*;
use frame_support::traits::Currency;
use frame_system::RawOrigin;
use sp_std::vec;

const SEED: u32 = 0;
const NAT: u128 = 1_000_000_000_000_000_000;

/// Create a funded account with the given index and balance
fn create_funded_user<T: Config>(index: u32, balance: u128) -> T::AccountId {
	let user: T::AccountId = account("user", index, SEED);
	let balance_value: BalanceOf<T> =
		balance.try_into().ok().expect("Balance conversion should work");
	T::Currency::make_free_balance_be(&user, balance_value);
	user
}

/// Register a funded finalizer account
fn setup_finalizer<T: Config>() -> T::AccountId {
	let finalizer = create_funded_user::<T>(100, 100 * NAT);
	Finalizers::<T>::put(vec![finalizer.clone()]);
	finalizer
}

/// Insert an unfinalized request directly into storage.
fn insert_request<T: Config>(
	request_id: u64,
	owner: T::AccountId,
	cumulative_stk: u128,
	cumulative_shares: u128,
) {
	Requests::<T>::insert(
		request_id,
		WithdrawalRequest {
			cumulative_stk,
			cumulative_shares,
			owner,
			created_at: 1,
			report_timestamp: 1,
			claimed: false,
		},
	);
	LastRequestId::<T>::put(request_id);
}

/// Seed a finalized queue of `n` nominal requests ready to be claimed.
fn seed_claimable_requests<T: Config>(owner: T::AccountId, n: u32) {
	for request_id in 1..=n as u64 {
		let cumulative = request_id as u128 * NAT;
		insert_request::<T>(request_id, owner.clone(), cumulative, cumulative);
	}
	RequestsByOwner::<T>::insert(&owner, (1..=n as u64).collect::<Vec<_>>());
	LastFinalizedRequestId::<T>::put(n as u64);
	Checkpoints::<T>::insert(
		1,
		Checkpoint { from_request_id: 1, max_share_rate: unlimited_share_rate() },
	);
	LastCheckpointIndex::<T>::put(1);
	LockedNatAmount::<T>::put(n as u128 * NAT);
	let custody_balance: BalanceOf<T> =
		((n as u128 + 1) * NAT).try_into().ok().expect("Balance conversion should work");
	T::Currency::make_free_balance_be(&Pallet::<T>::account_id(), custody_balance);
}

#[benchmarks]
mod benchmarks {
	use super::*;

	#[benchmark]
	fn request_withdrawal() {
		let caller = create_funded_user::<T>(0, 100 * NAT);

		#[extrinsic_call]
		_(RawOrigin::Signed(caller), NAT, None);

		assert_eq!(LastRequestId::<T>::get(), 1);
	}

	#[benchmark]
	fn finalize(b: Linear<1, 36>) {
		let finalizer = setup_finalizer::<T>();
		let owner = create_funded_user::<T>(0, NAT);

		// One request per batch, alternating around a cap of 1.0 so every
		// adjacent batch pair sits on opposite sides of it.
		let mut cumulative_stk = 0u128;
		let mut cumulative_shares = 0u128;
		let mut nat_amount = 0u128;
		let mut batches = Vec::new();
		for request_id in 1..=b as u64 {
			cumulative_stk += NAT;
			if request_id % 2 == 1 {
				// Below the cap: locks the full STK amount
				cumulative_shares += 2 * NAT;
				nat_amount += NAT;
			} else {
				// Above the cap: locks the shares at the capped rate
				cumulative_shares += NAT / 2;
				nat_amount += NAT / 2;
			}
			insert_request::<T>(request_id, owner.clone(), cumulative_stk, cumulative_shares);
			batches.push(request_id);
		}

		#[extrinsic_call]
		_(RawOrigin::Signed(finalizer), batches, nat_amount, share_rate_precision());

		assert_eq!(LastFinalizedRequestId::<T>::get(), b as u64);
	}

	#[benchmark]
	fn claim_withdrawal_to() {
		let owner = create_funded_user::<T>(0, NAT);
		let beneficiary = create_funded_user::<T>(1, NAT);
		seed_claimable_requests::<T>(owner.clone(), 1);

		#[extrinsic_call]
		_(RawOrigin::Signed(owner), 1u64, 1u32, beneficiary);

		assert_eq!(LockedNatAmount::<T>::get(), 0);
	}

	#[benchmark]
	fn claim_withdrawal() {
		let owner = create_funded_user::<T>(0, NAT);
		seed_claimable_requests::<T>(owner.clone(), 1);

		#[extrinsic_call]
		_(RawOrigin::Signed(owner), 1u64);

		assert_eq!(LockedNatAmount::<T>::get(), 0);
	}

	#[benchmark]
	fn claim_withdrawals(n: Linear<1, 100>) {
		let owner = create_funded_user::<T>(0, NAT);
		seed_claimable_requests::<T>(owner.clone(), n);
		let request_ids: Vec<u64> = (1..=n as u64).collect();
		let hints = vec![1u32; n as usize];

		#[extrinsic_call]
		_(RawOrigin::Signed(owner), request_ids, hints);

		assert_eq!(LockedNatAmount::<T>::get(), 0);
	}

	#[benchmark]
	fn handle_oracle_report() {
		let finalizer = setup_finalizer::<T>();

		#[extrinsic_call]
		_(RawOrigin::Signed(finalizer), 12_345u64);

		assert_eq!(LastReportTimestamp::<T>::get(), 12_345);
	}

	#[benchmark]
	fn set_finalizers(n: Linear<1, 10>) {
		let finalizers: Vec<T::AccountId> =
			(0..n).map(|index| account("finalizer", index, SEED)).collect();

		#[extrinsic_call]
		_(RawOrigin::Root, finalizers.clone());

		assert_eq!(Finalizers::<T>::get(), finalizers);
	}

	#[benchmark]
	fn pause() {
		#[extrinsic_call]
		_(RawOrigin::Root);

		assert!(Paused::<T>::get());
	}

	#[benchmark]
	fn unpause() {
		Paused::<T>::put(true);

		#[extrinsic_call]
		_(RawOrigin::Root);

		assert!(!Paused::<T>::get());
	}

	impl_benchmark_test_suite!(WithdrawalQueue, crate::mock::new_test_ext(), crate::mock::Test);
}
