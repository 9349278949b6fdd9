use codec::{Decode, Encode};
use frame_support::pallet_prelude::*;
use scale_info::TypeInfo;
use sp_core::U256;
use sp_std::prelude::*;

/// Share rates are integer ratios scaled by 10^27.
pub fn share_rate_precision() -> U256 {
	U256::exp10(27)
}

/// Sentinel share-rate cap meaning "no discount applied".
pub fn unlimited_share_rate() -> U256 {
	U256::MAX
}

/// Bookkeeping operations the queue consumes from the liquid-staking token.
///
/// The token itself lives outside this pallet; the queue only needs to
/// convert amounts to shares at enqueue time, pull STK into its custody
/// account, and burn the custodied shares once a range is finalized.
pub trait StakedTokenProvider<AccountId> {
	/// Convert an STK amount into shares at the token's current share rate.
	fn shares_of(stk_amount: u128) -> u128;

	/// Move `stk_amount` of STK from `from` into the queue's custody account.
	fn transfer_to_custody(from: &AccountId, custody: &AccountId, stk_amount: u128) -> DispatchResult;

	/// Burn `shares` previously accumulated in the custody account.
	fn burn_shares(custody: &AccountId, shares: u128) -> DispatchResult;
}

/// A single withdrawal request in the append-only queue.
///
/// Requests carry *cumulative* STK and share sums rather than per-request
/// amounts, so any contiguous range `(a, b]` can be summarised in constant
/// time by a partial-sum difference.
#[derive(Clone, Encode, Decode, Eq, PartialEq, RuntimeDebug, TypeInfo)]
pub struct WithdrawalRequest<AccountId> {
	/// Sum of the STK amounts of requests `1..=id`.
	pub cumulative_stk: u128,
	/// Sum of the STK shares of requests `1..=id`.
	pub cumulative_shares: u128,
	/// Account entitled to claim the payout.
	pub owner: AccountId,
	/// Wall-clock timestamp (ms) at enqueue.
	pub created_at: u64,
	/// Timestamp of the most recent oracle report at enqueue. Requests that
	/// share it were created under the same oracle view of the share rate.
	pub report_timestamp: u64,
	/// One-shot flag set at claim.
	pub claimed: bool,
}

/// A discount record: all requests from `from_request_id` up to the next
/// checkpoint's boundary were finalized under `max_share_rate`.
#[derive(Clone, Encode, Decode, Eq, PartialEq, RuntimeDebug, TypeInfo)]
pub struct Checkpoint {
	pub from_request_id: u64,
	pub max_share_rate: U256,
}

/// Summary of a contiguous request range `(pre_start, end]`.
#[derive(Clone, Copy, Eq, PartialEq, RuntimeDebug)]
pub struct BatchCalculation {
	/// `stk_amount * 10^27 / shares`, the rate the range was requested at.
	pub share_rate: U256,
	pub stk_amount: u128,
	pub shares: u128,
}

/// Summarise the range `(pre_start, end]` via partial-sum difference.
pub fn calc_batch<AccountId>(
	pre_start: &WithdrawalRequest<AccountId>,
	end: &WithdrawalRequest<AccountId>,
) -> BatchCalculation {
	let stk_amount = end.cumulative_stk.saturating_sub(pre_start.cumulative_stk);
	let shares = end.cumulative_shares.saturating_sub(pre_start.cumulative_shares);
	// An empty range holds no shares; its rate is never consulted.
	let share_rate = if shares == 0 {
		U256::zero()
	} else {
		// stk_amount * 10^27 stays well below 2^256.
		U256::from(stk_amount) * share_rate_precision() / U256::from(shares)
	};
	BatchCalculation { share_rate, stk_amount, shares }
}

/// NAT owed for `shares` capped at `max_share_rate`.
pub fn discounted_nat(shares: u128, max_share_rate: U256) -> u128 {
	let nat = U256::from(shares).saturating_mul(max_share_rate) / share_rate_precision();
	if nat > U256::from(u128::MAX) {
		u128::MAX
	} else {
		nat.as_u128()
	}
}

/// Caller-owned state threaded through `calculate_finalization_batches`
/// invocations until `finished` turns true.
#[derive(Clone, Encode, Decode, Eq, PartialEq, RuntimeDebug, TypeInfo)]
pub struct BatchesCalculationState {
	/// NAT still available to cover payouts.
	pub remaining_nat_budget: u128,
	/// True once every eligible request has been consumed.
	pub finished: bool,
	/// Ending request id of each batch; the starting id is implicit.
	pub batches: Vec<u64>,
}

impl BatchesCalculationState {
	pub fn new(nat_budget: u128) -> Self {
		Self { remaining_nat_budget: nat_budget, finished: false, batches: Vec::new() }
	}
}

/// Result of the pure finalization pre-flight.
#[derive(Clone, Copy, Eq, PartialEq, RuntimeDebug)]
pub struct PrefinalizeResult {
	/// NAT that must be locked to cover the batches.
	pub nat_to_lock: u128,
	/// Shares to burn once the batches are finalized.
	pub shares_to_burn: u128,
}

/// Point-in-time view of a single request, for RPC and offchain callers.
#[derive(Clone, Encode, Decode, Eq, PartialEq, RuntimeDebug, TypeInfo)]
pub struct WithdrawalRequestStatus<AccountId> {
	/// STK amount surrendered by this request alone.
	pub amount_of_stk: u128,
	/// Shares this request alone accounts for.
	pub amount_of_shares: u128,
	pub owner: AccountId,
	pub created_at: u64,
	pub is_finalized: bool,
	pub is_claimed: bool,
}
