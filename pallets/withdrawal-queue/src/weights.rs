#![cfg_attr(rustfmt, rustfmt_skip)]
#![allow(unused_parens)]
#![allow(unused_imports)]

use frame_support::{traits::Get, weights::{Weight, constants::RocksDbWeight}};
use sp_std::marker::PhantomData;

/// Weight functions needed for pallet_withdrawal_queue.
pub trait WeightInfo {
	fn request_withdrawal() -> Weight;
	fn finalize(b: u32) -> Weight;
	fn claim_withdrawal_to() -> Weight;
	fn claim_withdrawal() -> Weight;
	fn claim_withdrawals(n: u32) -> Weight;
	fn handle_oracle_report() -> Weight;
	fn set_finalizers(n: u32) -> Weight;
	fn pause() -> Weight;
	fn unpause() -> Weight;
}

/// Default weights for pallet_withdrawal_queue
pub struct SubstrateWeight<T>(PhantomData<T>);
impl<T: frame_system::Config> WeightInfo for SubstrateWeight<T> {
	fn request_withdrawal() -> Weight {
		Weight::from_parts(25_000, 0)
			.saturating_add(T::DbWeight::get().reads(5))
			.saturating_add(T::DbWeight::get().writes(3))
	}

	fn finalize(b: u32) -> Weight {
		Weight::from_parts(40_000, 0)
			.saturating_add(Weight::from_parts(8_000, 0).saturating_mul(b as u64))
			.saturating_add(T::DbWeight::get().reads(6))
			.saturating_add(T::DbWeight::get().reads(2u64.saturating_mul(b as u64)))
			.saturating_add(T::DbWeight::get().writes(4))
	}

	fn claim_withdrawal_to() -> Weight {
		Weight::from_parts(30_000, 0)
			.saturating_add(T::DbWeight::get().reads(7))
			.saturating_add(T::DbWeight::get().writes(4))
	}

	fn claim_withdrawal() -> Weight {
		// Adds the checkpoint binary search on top of the hinted claim.
		Weight::from_parts(35_000, 0)
			.saturating_add(T::DbWeight::get().reads(9))
			.saturating_add(T::DbWeight::get().writes(4))
	}

	fn claim_withdrawals(n: u32) -> Weight {
		Weight::from_parts(10_000, 0)
			.saturating_add(Weight::from_parts(30_000, 0).saturating_mul(n as u64))
			.saturating_add(T::DbWeight::get().reads(4u64.saturating_mul(n as u64)))
			.saturating_add(T::DbWeight::get().writes(4u64.saturating_mul(n as u64)))
	}

	fn handle_oracle_report() -> Weight {
		Weight::from_parts(12_000, 0)
			.saturating_add(T::DbWeight::get().reads(2))
			.saturating_add(T::DbWeight::get().writes(1))
	}

	fn set_finalizers(n: u32) -> Weight {
		Weight::from_parts(10_000, 0)
			.saturating_add(Weight::from_parts(1_000, 0).saturating_mul(n as u64))
			.saturating_add(T::DbWeight::get().writes(1))
	}

	fn pause() -> Weight {
		Weight::from_parts(8_000, 0).saturating_add(T::DbWeight::get().writes(1))
	}

	fn unpause() -> Weight {
		Weight::from_parts(8_000, 0).saturating_add(T::DbWeight::get().writes(1))
	}
}

impl WeightInfo for () {
	fn request_withdrawal() -> Weight {
		Weight::from_parts(25_000, 0)
	}

	fn finalize(b: u32) -> Weight {
		Weight::from_parts(40_000, 0)
			.saturating_add(Weight::from_parts(8_000, 0).saturating_mul(b as u64))
	}

	fn claim_withdrawal_to() -> Weight {
		Weight::from_parts(30_000, 0)
	}

	fn claim_withdrawal() -> Weight {
		Weight::from_parts(35_000, 0)
	}

	fn claim_withdrawals(n: u32) -> Weight {
		Weight::from_parts(10_000, 0)
			.saturating_add(Weight::from_parts(30_000, 0).saturating_mul(n as u64))
	}

	fn handle_oracle_report() -> Weight {
		Weight::from_parts(12_000, 0)
	}

	fn set_finalizers(n: u32) -> Weight {
		Weight::from_parts(10_000, 0)
			.saturating_add(Weight::from_parts(1_000, 0).saturating_mul(n as u64))
	}

	fn pause() -> Weight {
		Weight::from_parts(8_000, 0)
	}

	fn unpause() -> Weight {
		Weight::from_parts(8_000, 0)
	}
}
