#![cfg_attr(not(feature = "std"), no_std)]

//! # Withdrawal Queue Pallet
//!
//! A queue between a liquid-staking token (STK) and the chain's native asset
//! (NAT). Holders surrender STK for a queued claim on NAT; a finalizer role
//! periodically locks NAT for a contiguous prefix of the queue under a
//! reported share-rate cap; finalized requests are claimed to any recipient.
//!
//! ## Design Principles
//! - Append-only request book with partial-sum accounting — any contiguous
//!   range is summarised in constant time
//! - Two-phase finalization — batches are calculated off-chain with a pure
//!   read and verified on-chain before state advances
//! - Discounts recorded as checkpoints — claims resolve the governing cap
//!   with a caller-supplied hint and O(log C) search
//!
//! ## Storage Model
//! - `Requests` — the queue itself, with a synthetic sentinel at id 0
//! - `Checkpoints` — discount history, sentinel at index 0
//! - `RequestsByOwner` — owner to request-id index
//! - scalar frontier values (`LastRequestId`, `LastFinalizedRequestId`,
//!   `LastCheckpointIndex`, `LockedNatAmount`, `LastReportTimestamp`)

#[cfg(test)]
mod mock;


#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;

pub mod rebase_limiter;
pub mod weights;

mod types;
pub use types::*;

use crate::weights::WeightInfo;
use frame_support::{
	pallet_prelude::*,
	traits::{Currency, ExistenceRequirement, ReservableCurrency, StorageVersion},
	PalletId,
};
use frame_system::pallet_prelude::*;
use sp_core::U256;
use sp_runtime::{traits::AccountIdConversion, SaturatedConversion};
use sp_std::prelude::*;

pub use pallet::*;

/// The current storage version
const STORAGE_VERSION: StorageVersion = StorageVersion::new(0);

pub const LOG_TARGET: &str = "runtime::withdrawal-queue";

/// Hard cap on batches per finalization, so verification stays bounded
/// regardless of queue depth.
pub const MAX_BATCHES: usize = 36;

/// Requests examined per `calculate_finalization_batches` invocation.
pub const MAX_REQUESTS_PER_CALL: u64 = 1000;

/// Smallest STK amount accepted at enqueue. Keeps every request non-zero in
/// both STK and shares, so batch rates never divide by zero.
pub const MIN_WITHDRAWAL_AMOUNT: u128 = 100;

/// Largest STK amount accepted at enqueue (1000 whole STK).
pub const MAX_WITHDRAWAL_AMOUNT: u128 = 1_000_000_000_000_000_000_000;

/// Maximum number of finalizer accounts allowed
pub const MAX_FINALIZERS: usize = 10;

/// Returned by `find_checkpoint_hint` when no checkpoint governs the request.
pub const NOT_FOUND: u32 = 0;

#[frame_support::pallet]
pub mod pallet {
	use super::*;

	/// Balance type of the NAT currency.
	pub type BalanceOf<T> =
		<<T as Config>::Currency as Currency<<T as frame_system::Config>::AccountId>>::Balance;

	#[pallet::pallet]
	#[pallet::without_storage_info]
	#[pallet::storage_version(STORAGE_VERSION)]
	pub struct Pallet<T>(_);

	#[pallet::config]
	pub trait Config: frame_system::Config + pallet_timestamp::Config {
		type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

		/// The pallet's id, used for deriving its NAT custody account.
		#[pallet::constant]
		type PalletId: Get<PalletId>;

		/// The NAT currency locked at finalization and paid out at claim.
		type Currency: ReservableCurrency<Self::AccountId>;

		/// Bookkeeping surface of the liquid-staking token.
		type StakedToken: StakedTokenProvider<Self::AccountId>;

		/// Weight information for extrinsics in this pallet.
		type WeightInfo: WeightInfo;
	}

	/// Sentinel request at id 0: zero sums, already claimed, owned by the
	/// custody account. Keeps `Requests::get(id - 1)` always in-range.
	#[pallet::type_value]
	pub fn DefaultRequest<T: Config>() -> WithdrawalRequest<T::AccountId> {
		WithdrawalRequest {
			cumulative_stk: 0,
			cumulative_shares: 0,
			owner: Pallet::<T>::account_id(),
			created_at: 0,
			report_timestamp: 0,
			claimed: true,
		}
	}

	/// Sentinel checkpoint at index 0.
	#[pallet::type_value]
	pub fn DefaultCheckpoint() -> Checkpoint {
		Checkpoint { from_request_id: 0, max_share_rate: unlimited_share_rate() }
	}

	// ============ Queue Storage ============

	/// The request book. Ids are dense, starting at 1.
	#[pallet::storage]
	#[pallet::getter(fn requests)]
	pub type Requests<T: Config> = StorageMap<
		_,
		Blake2_128Concat,
		u64,
		WithdrawalRequest<T::AccountId>,
		ValueQuery,
		DefaultRequest<T>,
	>;

	/// Discount history. Indices are dense, starting at 1.
	#[pallet::storage]
	#[pallet::getter(fn checkpoints)]
	pub type Checkpoints<T: Config> =
		StorageMap<_, Blake2_128Concat, u32, Checkpoint, ValueQuery, DefaultCheckpoint>;

	/// Unclaimed request ids per owner.
	#[pallet::storage]
	#[pallet::getter(fn requests_by_owner)]
	pub type RequestsByOwner<T: Config> =
		StorageMap<_, Blake2_128Concat, T::AccountId, Vec<u64>, ValueQuery>;

	/// Id of the most recently enqueued request.
	#[pallet::storage]
	#[pallet::getter(fn last_request_id)]
	pub type LastRequestId<T: Config> = StorageValue<_, u64, ValueQuery>;

	/// Id of the most recently finalized request.
	#[pallet::storage]
	#[pallet::getter(fn last_finalized_request_id)]
	pub type LastFinalizedRequestId<T: Config> = StorageValue<_, u64, ValueQuery>;

	/// Index of the most recently written checkpoint.
	#[pallet::storage]
	#[pallet::getter(fn last_checkpoint_index)]
	pub type LastCheckpointIndex<T: Config> = StorageValue<_, u32, ValueQuery>;

	/// NAT reserved for finalized-but-unclaimed requests.
	#[pallet::storage]
	#[pallet::getter(fn locked_nat_amount)]
	pub type LockedNatAmount<T: Config> = StorageValue<_, u128, ValueQuery>;

	/// Timestamp of the most recent oracle report, stamped onto subsequent
	/// requests to group those created under the same oracle view.
	#[pallet::storage]
	#[pallet::getter(fn last_report_timestamp)]
	pub type LastReportTimestamp<T: Config> = StorageValue<_, u64, ValueQuery>;

	// ============ Configuration Storage ============

	/// Accounts authorized to finalize and to submit oracle reports.
	#[pallet::storage]
	#[pallet::getter(fn finalizers)]
	pub type Finalizers<T: Config> = StorageValue<_, Vec<T::AccountId>, ValueQuery>;

	/// Emergency pause switch (blocks enqueue, finalize and claim when true)
	#[pallet::storage]
	#[pallet::getter(fn paused)]
	pub type Paused<T: Config> = StorageValue<_, bool, ValueQuery>;

	#[pallet::genesis_config]
	#[derive(frame_support::DefaultNoBound)]
	pub struct GenesisConfig<T: Config> {
		pub finalizers: Vec<T::AccountId>,
	}

	#[pallet::genesis_build]
	impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
		fn build(&self) {
			Finalizers::<T>::put(self.finalizers.clone());
		}
	}

	// ============ Events ============

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		/// A withdrawal request joined the queue
		WithdrawalRequested {
			request_id: u64,
			requestor: T::AccountId,
			owner: T::AccountId,
			amount_of_stk: u128,
			amount_of_shares: u128,
		},

		/// A contiguous range of requests was finalized and NAT locked
		WithdrawalBatchFinalized {
			from_request_id: u64,
			to_request_id: u64,
			amount_of_nat_locked: u128,
			shares_burned: u128,
			timestamp: u64,
		},

		/// A finalized request was claimed and its NAT paid out
		WithdrawalClaimed {
			request_id: u64,
			owner: T::AccountId,
			recipient: T::AccountId,
			amount_of_nat: u128,
		},

		/// An oracle report timestamp was recorded
		OracleReportReceived { report_timestamp: u64 },

		/// Finalizer set replaced atomically
		FinalizersUpdated { finalizers: Vec<T::AccountId> },

		/// Queue paused
		Paused,

		/// Queue unpaused
		Unpaused,
	}

	// ============ Errors ============

	#[pallet::error]
	pub enum Error<T> {
		/// The share-rate cap must be non-zero
		ZeroShareRate,
		/// The report timestamp must be non-zero
		ZeroTimestamp,
		/// The NAT amount must be non-zero
		ZeroAmountOfNat,
		/// The batch list must be non-empty
		EmptyBatches,
		/// Request id is zero or beyond the queue
		InvalidRequestId,
		/// The checkpoint search range is malformed
		InvalidRequestIdRange,
		/// The supplied checkpoint hint does not govern the request
		InvalidHint,
		/// Request ids and hints must have equal lengths
		ArraysLengthMismatch,
		/// Request ids must be strictly increasing
		RequestIdsNotSorted,
		/// Calculation state is finished or out of budget
		InvalidCalculationState,
		/// Request does not exist or is not finalized yet
		RequestNotFoundOrNotFinalized,
		/// Request was already claimed
		RequestAlreadyClaimed,
		/// Caller does not own the request
		NotOwner,
		/// Caller is not a finalizer
		NotFinalizer,
		/// Too many finalizer accounts provided
		TooManyFinalizers,
		/// NAT amount exceeds the STK total of the finalized range
		TooMuchNatToFinalize,
		/// Custodied NAT balance is below the payout
		InsufficientCustodyBalance,
		/// Batch ending ids must be strictly increasing
		BatchesNotSorted,
		/// Adjacent batch rates must lie on opposite sides of the cap
		BatchesNotAlternating,
		/// STK amount below the minimum withdrawal
		RequestAmountTooSmall,
		/// STK amount above the maximum withdrawal
		RequestAmountTooLarge,
		/// Failed to convert between numeric balance types
		AmountConversionFailed,
		/// Arithmetic overflow
		ArithmeticOverflow,
		/// The queue is currently paused
		QueuePaused,
	}

	// ============ Extrinsics ============

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		/// Surrender `stk_amount` of STK for a queued claim on NAT.
		///
		/// STK moves into the queue's custody immediately; the claim becomes
		/// redeemable once a finalizer locks NAT for this request. The claim
		/// is assigned to `owner` when given, otherwise to the caller.
		///
		/// # Arguments
		/// * `origin` - Must be signed by the STK holder
		/// * `stk_amount` - STK to surrender, within the withdrawal bounds
		/// * `owner` - Optional account entitled to claim
		#[pallet::call_index(0)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::request_withdrawal())]
		pub fn request_withdrawal(
			origin: OriginFor<T>,
			stk_amount: u128,
			owner: Option<T::AccountId>,
		) -> DispatchResult {
			let requestor = ensure_signed(origin)?;
			Self::ensure_not_paused()?;

			ensure!(stk_amount >= MIN_WITHDRAWAL_AMOUNT, Error::<T>::RequestAmountTooSmall);
			ensure!(stk_amount <= MAX_WITHDRAWAL_AMOUNT, Error::<T>::RequestAmountTooLarge);

			let owner = owner.unwrap_or_else(|| requestor.clone());
			let shares = T::StakedToken::shares_of(stk_amount);
			ensure!(shares > 0, Error::<T>::RequestAmountTooSmall);

			T::StakedToken::transfer_to_custody(&requestor, &Self::account_id(), stk_amount)?;
			Self::do_enqueue(&requestor, &owner, stk_amount, shares)?;

			Ok(())
		}

		/// Finalize the queue prefix ending at the last id in `batches`.
		///
		/// Re-runs the pure pre-flight over the batch list (ordering, range
		/// and alternation checks), moves `nat_amount` of NAT from the caller
		/// into custody, burns the covered shares and advances the finalized
		/// frontier. Writes a checkpoint when the effective cap differs from
		/// the last recorded one.
		///
		/// # Arguments
		/// * `origin` - Must be signed by a finalizer
		/// * `batches` - Ending request id of each batch, strictly increasing
		/// * `nat_amount` - NAT to lock for the finalized range
		/// * `max_share_rate` - Reported share-rate cap (scaled by 10^27)
		#[pallet::call_index(1)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::finalize(batches.len() as u32))]
		pub fn finalize(
			origin: OriginFor<T>,
			batches: Vec<u64>,
			nat_amount: u128,
			max_share_rate: U256,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::ensure_finalizer(&who)?;
			Self::ensure_not_paused()?;
			ensure!(nat_amount > 0, Error::<T>::ZeroAmountOfNat);

			let preflight = Self::prefinalize(&batches, max_share_rate)?;

			let last_finalized = LastFinalizedRequestId::<T>::get();
			let first_id = last_finalized.saturating_add(1);
			let last_id = batches.last().copied().ok_or(Error::<T>::EmptyBatches)?;

			let range = calc_batch(&Requests::<T>::get(last_finalized), &Requests::<T>::get(last_id));
			ensure!(nat_amount <= range.stk_amount, Error::<T>::TooMuchNatToFinalize);

			// Nominal case: a single batch covered in full keeps its own rates.
			let effective_cap = if batches.len() == 1 && nat_amount == range.stk_amount {
				unlimited_share_rate()
			} else {
				max_share_rate
			};

			T::Currency::transfer(
				&who,
				&Self::account_id(),
				Self::amount_to_balance(nat_amount)?,
				ExistenceRequirement::AllowDeath,
			)?;
			T::StakedToken::burn_shares(&Self::account_id(), preflight.shares_to_burn)?;

			let checkpoint_index = LastCheckpointIndex::<T>::get();
			// The first finalization always records a checkpoint; afterwards
			// consecutive finalizations under an equal cap coalesce.
			if checkpoint_index == 0
				|| Checkpoints::<T>::get(checkpoint_index).max_share_rate != effective_cap
			{
				let next_index = checkpoint_index.saturating_add(1);
				Checkpoints::<T>::insert(
					next_index,
					Checkpoint { from_request_id: first_id, max_share_rate: effective_cap },
				);
				LastCheckpointIndex::<T>::put(next_index);
			}

			LockedNatAmount::<T>::try_mutate(|locked| -> DispatchResult {
				*locked = locked.checked_add(nat_amount).ok_or(Error::<T>::ArithmeticOverflow)?;
				Ok(())
			})?;
			LastFinalizedRequestId::<T>::put(last_id);

			let now = pallet_timestamp::Pallet::<T>::get().saturated_into::<u64>();
			log::info!(
				target: LOG_TARGET,
				"finalized requests {}..={}, locked {} NAT, burned {} shares",
				first_id,
				last_id,
				nat_amount,
				preflight.shares_to_burn
			);

			Self::deposit_event(Event::WithdrawalBatchFinalized {
				from_request_id: first_id,
				to_request_id: last_id,
				amount_of_nat_locked: nat_amount,
				shares_burned: preflight.shares_to_burn,
				timestamp: now,
			});

			Ok(())
		}

		/// Claim a finalized request and pay its NAT out to `recipient`.
		///
		/// `hint` is the index of the checkpoint governing the request,
		/// produced off-chain via `find_checkpoint_hint`; it is validated
		/// before any payout.
		///
		/// # Arguments
		/// * `origin` - Must be signed by the request owner
		/// * `request_id` - The request to claim
		/// * `hint` - Governing checkpoint index
		/// * `recipient` - Account receiving the NAT
		#[pallet::call_index(2)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::claim_withdrawal_to())]
		pub fn claim_withdrawal_to(
			origin: OriginFor<T>,
			request_id: u64,
			hint: u32,
			recipient: T::AccountId,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused()?;
			Self::do_claim(&who, request_id, hint, &recipient)
		}

		/// Claim a finalized request to the owner, resolving the checkpoint
		/// hint on-chain with a binary search over the full history.
		///
		/// # Arguments
		/// * `origin` - Must be signed by the request owner
		/// * `request_id` - The request to claim
		#[pallet::call_index(3)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::claim_withdrawal())]
		pub fn claim_withdrawal(origin: OriginFor<T>, request_id: u64) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused()?;
			let hint =
				Self::find_checkpoint_hint(request_id, 1, LastCheckpointIndex::<T>::get())?;
			Self::do_claim(&who, request_id, hint, &who)
		}

		/// Claim several owned requests to the caller in one call.
		///
		/// `request_ids` and `hints` are matched positionally; the first
		/// failing claim aborts the whole call.
		///
		/// # Arguments
		/// * `origin` - Must be signed by the owner of every request
		/// * `request_ids` - Requests to claim
		/// * `hints` - Governing checkpoint index per request
		#[pallet::call_index(4)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::claim_withdrawals(request_ids.len() as u32))]
		pub fn claim_withdrawals(
			origin: OriginFor<T>,
			request_ids: Vec<u64>,
			hints: Vec<u32>,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused()?;
			ensure!(request_ids.len() == hints.len(), Error::<T>::ArraysLengthMismatch);

			for (request_id, hint) in request_ids.into_iter().zip(hints) {
				Self::do_claim(&who, request_id, hint, &who)?;
			}

			Ok(())
		}

		/// Record the timestamp of an oracle report. Subsequent requests are
		/// stamped with it, grouping those created under the same oracle view.
		///
		/// # Arguments
		/// * `origin` - Must be signed by a finalizer
		/// * `report_timestamp` - Wall-clock timestamp (ms) of the report
		#[pallet::call_index(5)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::handle_oracle_report())]
		pub fn handle_oracle_report(origin: OriginFor<T>, report_timestamp: u64) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::ensure_finalizer(&who)?;
			ensure!(report_timestamp > 0, Error::<T>::ZeroTimestamp);

			LastReportTimestamp::<T>::put(report_timestamp);
			Self::deposit_event(Event::OracleReportReceived { report_timestamp });

			Ok(())
		}

		/// Atomically replace the finalizer set (root only).
		///
		/// # Arguments
		/// * `origin` - Must be root
		/// * `finalizers` - New finalizer set
		#[pallet::call_index(6)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::set_finalizers(finalizers.len() as u32))]
		pub fn set_finalizers(
			origin: OriginFor<T>,
			finalizers: Vec<T::AccountId>,
		) -> DispatchResult {
			ensure_root(origin)?;
			ensure!(finalizers.len() <= MAX_FINALIZERS, Error::<T>::TooManyFinalizers);

			Finalizers::<T>::put(finalizers.clone());
			Self::deposit_event(Event::FinalizersUpdated { finalizers });

			Ok(())
		}

		/// Pause the queue (root only)
		#[pallet::call_index(7)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::pause())]
		pub fn pause(origin: OriginFor<T>) -> DispatchResult {
			ensure_root(origin)?;
			Paused::<T>::put(true);
			Self::deposit_event(Event::Paused);
			Ok(())
		}

		/// Unpause the queue (root only)
		#[pallet::call_index(8)]
		#[pallet::weight(<T as pallet::Config>::WeightInfo::unpause())]
		pub fn unpause(origin: OriginFor<T>) -> DispatchResult {
			ensure_root(origin)?;
			Paused::<T>::put(false);
			Self::deposit_event(Event::Unpaused);
			Ok(())
		}
	}

	// ============ Helper Functions ============

	impl<T: Config> Pallet<T> {
		/// Get the NAT custody account ID
		pub fn account_id() -> T::AccountId {
			<T as pallet::Config>::PalletId::get().into_account_truncating()
		}

		/// Ensure the caller is a finalizer
		pub fn ensure_finalizer(account: &T::AccountId) -> DispatchResult {
			ensure!(Finalizers::<T>::get().contains(account), Error::<T>::NotFinalizer);
			Ok(())
		}

		/// Ensure the queue is not paused
		pub fn ensure_not_paused() -> DispatchResult {
			ensure!(!Paused::<T>::get(), Error::<T>::QueuePaused);
			Ok(())
		}

		/// Convert a raw NAT amount into the runtime's balance type
		pub fn amount_to_balance(amount: u128) -> Result<BalanceOf<T>, DispatchError> {
			amount.try_into().map_err(|_| Error::<T>::AmountConversionFailed.into())
		}

		/// Append one request to the book and update the partial sums.
		fn do_enqueue(
			requestor: &T::AccountId,
			owner: &T::AccountId,
			stk_amount: u128,
			shares: u128,
		) -> Result<u64, DispatchError> {
			let last_request_id = LastRequestId::<T>::get();
			let last_request = Requests::<T>::get(last_request_id);

			let cumulative_stk = last_request
				.cumulative_stk
				.checked_add(stk_amount)
				.ok_or(Error::<T>::ArithmeticOverflow)?;
			let cumulative_shares = last_request
				.cumulative_shares
				.checked_add(shares)
				.ok_or(Error::<T>::ArithmeticOverflow)?;

			let request_id = last_request_id.saturating_add(1);
			let request = WithdrawalRequest {
				cumulative_stk,
				cumulative_shares,
				owner: owner.clone(),
				created_at: pallet_timestamp::Pallet::<T>::get().saturated_into::<u64>(),
				report_timestamp: LastReportTimestamp::<T>::get(),
				claimed: false,
			};

			Requests::<T>::insert(request_id, request);
			LastRequestId::<T>::put(request_id);
			RequestsByOwner::<T>::append(owner, request_id);

			Self::deposit_event(Event::WithdrawalRequested {
				request_id,
				requestor: requestor.clone(),
				owner: owner.clone(),
				amount_of_stk: stk_amount,
				amount_of_shares: shares,
			});

			Ok(request_id)
		}

		/// Split the unfinalized prefix into batches under an NAT budget.
		///
		/// Pure read: global state is untouched, the returned state belongs
		/// to the caller and is threaded across invocations until `finished`.
		/// Within a batch every request is either at-or-below the cap or
		/// above it; requests created under the same oracle report extend
		/// the current batch regardless, tolerating the 1-2 wei rate jitter
		/// integer division puts between same-view requests.
		pub fn calculate_finalization_batches(
			max_share_rate: U256,
			max_timestamp: u64,
			mut state: BatchesCalculationState,
		) -> Result<BatchesCalculationState, DispatchError> {
			ensure!(!max_share_rate.is_zero(), Error::<T>::ZeroShareRate);
			ensure!(max_timestamp > 0, Error::<T>::ZeroTimestamp);
			ensure!(
				!state.finished && state.remaining_nat_budget > 0,
				Error::<T>::InvalidCalculationState
			);

			let queue_end = LastRequestId::<T>::get().saturating_add(1);
			let (mut current_id, mut prev_request, mut prev_share_rate) =
				match state.batches.last().copied() {
					// Virgin state: start just past the finalized frontier.
					None => {
						let start = LastFinalizedRequestId::<T>::get().saturating_add(1);
						(start, Requests::<T>::get(start - 1), U256::zero())
					},
					// Resumed state: recompute the grouping context from the
					// last id handled by the previous invocation.
					Some(last_handled) => {
						let prev = Requests::<T>::get(last_handled);
						let rate =
							calc_batch(&Requests::<T>::get(last_handled - 1), &prev).share_rate;
						(last_handled.saturating_add(1), prev, rate)
					},
				};
			let next_call_id = current_id.saturating_add(MAX_REQUESTS_PER_CALL);

			while current_id < queue_end && current_id < next_call_id {
				let request = Requests::<T>::get(current_id);
				// Requests newer than the oracle view are excluded.
				if request.created_at > max_timestamp {
					break;
				}

				let batch = calc_batch(&prev_request, &request);
				let nat_to_lock = if batch.share_rate > max_share_rate {
					discounted_nat(batch.shares, max_share_rate)
				} else {
					batch.stk_amount
				};
				if nat_to_lock > state.remaining_nat_budget {
					break;
				}
				state.remaining_nat_budget -= nat_to_lock;

				let extend_current_batch = !state.batches.is_empty() && {
					let same_oracle_view =
						prev_request.report_timestamp == request.report_timestamp;
					let both_nominal = prev_share_rate <= max_share_rate
						&& batch.share_rate <= max_share_rate;
					let both_discounted = prev_share_rate > max_share_rate
						&& batch.share_rate > max_share_rate;
					same_oracle_view || both_nominal || both_discounted
				};
				if extend_current_batch {
					if let Some(last) = state.batches.last_mut() {
						*last = current_id;
					}
				} else {
					if state.batches.len() == MAX_BATCHES {
						break;
					}
					state.batches.push(current_id);
				}

				prev_share_rate = batch.share_rate;
				prev_request = request;
				current_id = current_id.saturating_add(1);
			}

			// Finished only once the whole eligible queue is consumed; a
			// budget, timestamp or batch-cap break leaves it false so that
			// repeat invocations make no progress until the caller finalizes.
			state.finished = current_id == queue_end;

			Ok(state)
		}

		/// Pure finalization pre-flight: validate the batch list and compute
		/// the NAT to lock and the shares to burn for it.
		pub fn prefinalize(
			batches: &[u64],
			max_share_rate: U256,
		) -> Result<PrefinalizeResult, DispatchError> {
			ensure!(!max_share_rate.is_zero(), Error::<T>::ZeroShareRate);
			ensure!(!batches.is_empty(), Error::<T>::EmptyBatches);

			let last_finalized = LastFinalizedRequestId::<T>::get();
			ensure!(batches[0] > last_finalized, Error::<T>::InvalidRequestId);
			ensure!(
				batches[batches.len() - 1] <= LastRequestId::<T>::get(),
				Error::<T>::InvalidRequestId
			);

			let mut prev_batch_end_id = last_finalized;
			let mut prev_batch_end = Requests::<T>::get(prev_batch_end_id);
			let mut prev_above_cap: Option<bool> = None;
			let mut nat_to_lock: u128 = 0;
			let mut shares_to_burn: u128 = 0;

			for &batch_end_id in batches {
				ensure!(batch_end_id > prev_batch_end_id, Error::<T>::BatchesNotSorted);

				let batch_end = Requests::<T>::get(batch_end_id);
				let batch = calc_batch(&prev_batch_end, &batch_end);
				let above_cap = batch.share_rate > max_share_rate;

				// Batches exist only to separate nominal from discounted
				// runs, so adjacent batches must sit on opposite sides.
				if let Some(prev_above) = prev_above_cap {
					ensure!(prev_above != above_cap, Error::<T>::BatchesNotAlternating);
				}

				let locked = if above_cap {
					discounted_nat(batch.shares, max_share_rate)
				} else {
					batch.stk_amount
				};
				nat_to_lock =
					nat_to_lock.checked_add(locked).ok_or(Error::<T>::ArithmeticOverflow)?;
				shares_to_burn = shares_to_burn
					.checked_add(batch.shares)
					.ok_or(Error::<T>::ArithmeticOverflow)?;

				prev_above_cap = Some(above_cap);
				prev_batch_end_id = batch_end_id;
				prev_batch_end = batch_end;
			}

			Ok(PrefinalizeResult { nat_to_lock, shares_to_burn })
		}

		/// Search `[start, end]` for the checkpoint governing `request_id`.
		///
		/// Returns `NOT_FOUND` (0) when the range is empty, when the request
		/// is not finalized, or when the answer lies outside the range.
		pub fn find_checkpoint_hint(
			request_id: u64,
			start: u32,
			end: u32,
		) -> Result<u32, DispatchError> {
			ensure!(
				request_id >= 1 && request_id <= LastRequestId::<T>::get(),
				Error::<T>::InvalidRequestId
			);
			let last_checkpoint_index = LastCheckpointIndex::<T>::get();
			ensure!(start != 0 && end <= last_checkpoint_index, Error::<T>::InvalidRequestIdRange);

			if last_checkpoint_index == 0
				|| request_id > LastFinalizedRequestId::<T>::get()
				|| start > end
			{
				return Ok(NOT_FOUND);
			}

			// Right boundary: the answer may sit at the range's end.
			if request_id >= Checkpoints::<T>::get(end).from_request_id {
				if end == last_checkpoint_index {
					return Ok(end);
				}
				if Checkpoints::<T>::get(end + 1).from_request_id > request_id {
					return Ok(end);
				}
				// Governed by a checkpoint right of the range.
				return Ok(NOT_FOUND);
			}
			// Left boundary: the range starts past the request.
			if request_id < Checkpoints::<T>::get(start).from_request_id {
				return Ok(NOT_FOUND);
			}

			// Upper-bound binary search over [start, end - 1]: greatest
			// index whose from_request_id <= request_id.
			let mut min = start;
			let mut max = end - 1;
			while max > min {
				let mid = (max + min + 1) / 2;
				if Checkpoints::<T>::get(mid).from_request_id <= request_id {
					min = mid;
				} else {
					max = mid - 1;
				}
			}
			Ok(min)
		}

		/// Resolve hints for an ascending list of request ids, narrowing each
		/// search with the previous answer (hints are monotone in id).
		pub fn find_checkpoint_hints(request_ids: &[u64]) -> Result<Vec<u32>, DispatchError> {
			let last_checkpoint_index = LastCheckpointIndex::<T>::get();
			let mut hints = Vec::with_capacity(request_ids.len());
			let mut prev_request_id: u64 = 0;
			let mut start: u32 = 1;

			for &request_id in request_ids {
				ensure!(request_id > prev_request_id, Error::<T>::RequestIdsNotSorted);
				let hint = Self::find_checkpoint_hint(request_id, start, last_checkpoint_index)?;
				if hint != NOT_FOUND {
					start = hint;
				}
				hints.push(hint);
				prev_request_id = request_id;
			}

			Ok(hints)
		}

		/// NAT a finalized, unclaimed request would redeem for under `hint`.
		pub fn claimable_nat(request_id: u64, hint: u32) -> Result<u128, DispatchError> {
			ensure!(request_id >= 1, Error::<T>::InvalidRequestId);
			ensure!(
				request_id <= LastFinalizedRequestId::<T>::get(),
				Error::<T>::RequestNotFoundOrNotFinalized
			);
			let request = Requests::<T>::get(request_id);
			ensure!(!request.claimed, Error::<T>::RequestAlreadyClaimed);
			Self::calculate_claimable(request_id, &request, hint)
		}

		/// Validate the hint against the checkpoint range rule and compute
		/// the payout for `request_id`.
		fn calculate_claimable(
			request_id: u64,
			request: &WithdrawalRequest<T::AccountId>,
			hint: u32,
		) -> Result<u128, DispatchError> {
			let last_checkpoint_index = LastCheckpointIndex::<T>::get();
			ensure!(hint >= 1 && hint <= last_checkpoint_index, Error::<T>::InvalidHint);

			let checkpoint = Checkpoints::<T>::get(hint);
			ensure!(checkpoint.from_request_id <= request_id, Error::<T>::InvalidHint);
			if hint < last_checkpoint_index {
				ensure!(
					Checkpoints::<T>::get(hint + 1).from_request_id > request_id,
					Error::<T>::InvalidHint
				);
			}

			let batch = calc_batch(&Requests::<T>::get(request_id - 1), request);
			if batch.share_rate > checkpoint.max_share_rate {
				Ok(discounted_nat(batch.shares, checkpoint.max_share_rate))
			} else {
				Ok(batch.stk_amount)
			}
		}

		/// Mark a request claimed and pay its NAT out of custody.
		fn do_claim(
			who: &T::AccountId,
			request_id: u64,
			hint: u32,
			recipient: &T::AccountId,
		) -> DispatchResult {
			ensure!(request_id >= 1, Error::<T>::InvalidRequestId);
			ensure!(
				request_id <= LastFinalizedRequestId::<T>::get(),
				Error::<T>::RequestNotFoundOrNotFinalized
			);

			let mut request = Requests::<T>::get(request_id);
			ensure!(!request.claimed, Error::<T>::RequestAlreadyClaimed);
			ensure!(&request.owner == who, Error::<T>::NotOwner);

			let nat_amount = Self::calculate_claimable(request_id, &request, hint)?;
			let custody = Self::account_id();
			let balance = Self::amount_to_balance(nat_amount)?;
			ensure!(
				T::Currency::free_balance(&custody) >= balance,
				Error::<T>::InsufficientCustodyBalance
			);

			request.claimed = true;
			Requests::<T>::insert(request_id, request.clone());
			RequestsByOwner::<T>::mutate(&request.owner, |ids| {
				if let Some(pos) = ids.iter().position(|&id| id == request_id) {
					ids.swap_remove(pos);
				}
			});

			LockedNatAmount::<T>::try_mutate(|locked| -> DispatchResult {
				*locked =
					locked.checked_sub(nat_amount).ok_or(Error::<T>::ArithmeticOverflow)?;
				Ok(())
			})?;

			T::Currency::transfer(&custody, recipient, balance, ExistenceRequirement::AllowDeath)?;

			Self::deposit_event(Event::WithdrawalClaimed {
				request_id,
				owner: request.owner,
				recipient: recipient.clone(),
				amount_of_nat: nat_amount,
			});

			Ok(())
		}

		/// Point-in-time view of one request.
		pub fn withdrawal_status(
			request_id: u64,
		) -> Result<WithdrawalRequestStatus<T::AccountId>, DispatchError> {
			ensure!(
				request_id >= 1 && request_id <= LastRequestId::<T>::get(),
				Error::<T>::InvalidRequestId
			);

			let request = Requests::<T>::get(request_id);
			let previous = Requests::<T>::get(request_id - 1);

			Ok(WithdrawalRequestStatus {
				amount_of_stk: request.cumulative_stk.saturating_sub(previous.cumulative_stk),
				amount_of_shares: request
					.cumulative_shares
					.saturating_sub(previous.cumulative_shares),
				owner: request.owner,
				created_at: request.created_at,
				is_finalized: request_id <= LastFinalizedRequestId::<T>::get(),
				is_claimed: request.claimed,
			})
		}

		/// Unclaimed request ids owned by `owner`.
		pub fn withdrawal_requests_of(owner: &T::AccountId) -> Vec<u64> {
			RequestsByOwner::<T>::get(owner)
		}

		/// How many requests sit past the finalized frontier.
		pub fn unfinalized_request_count() -> u64 {
			LastRequestId::<T>::get().saturating_sub(LastFinalizedRequestId::<T>::get())
		}

		/// STK total of the requests past the finalized frontier.
		pub fn unfinalized_stk() -> u128 {
			let last = Requests::<T>::get(LastRequestId::<T>::get());
			let finalized = Requests::<T>::get(LastFinalizedRequestId::<T>::get());
			last.cumulative_stk.saturating_sub(finalized.cumulative_stk)
		}
	}
}
