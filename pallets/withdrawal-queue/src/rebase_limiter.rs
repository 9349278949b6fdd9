//! Positive-rebase limiter for the report pipeline.
//!
//! Tracks how far the token's total pooled NAT may grow within one report
//! relative to the pre-report state, so that the share rate cannot jump by
//! more than the configured limit. Withdrawals raise the available headroom,
//! rewards consume it. The value is caller-owned; nothing here touches
//! pallet storage.

use sp_core::U256;
use sp_runtime::RuntimeDebug;

/// Rebase limits are expressed as share-rate growth per `10^9`.
pub const LIMITER_PRECISION: u128 = 1_000_000_000;

/// Sentinel limit meaning "no cap on positive rebase".
pub const UNLIMITED_REBASE: u128 = u128::MAX;

#[derive(Clone, Copy, Eq, PartialEq, RuntimeDebug)]
pub enum RebaseLimiterError {
	/// The limit must lie in `(0, UNLIMITED_REBASE]`.
	InvalidRebaseLimit,
	/// More NAT withdrawn than the tracked total holds.
	PooledAmountUnderflow,
}

#[derive(Clone, Copy, Eq, PartialEq, RuntimeDebug)]
pub struct RebaseLimiter {
	/// Total pooled NAT before the report was applied.
	pre_total_pooled: u128,
	/// Total shares before the report was applied.
	pre_total_shares: u128,
	/// Total pooled NAT as mutated by the report so far.
	post_total_pooled: u128,
	/// Allowed share-rate growth per `LIMITER_PRECISION`.
	rebase_limit: u128,
	/// Precomputed ceiling for `post_total_pooled`.
	max_total_pooled: u128,
}

impl RebaseLimiter {
	pub fn init(
		rebase_limit: u128,
		pre_total_pooled: u128,
		pre_total_shares: u128,
	) -> Result<Self, RebaseLimiterError> {
		if rebase_limit == 0 {
			return Err(RebaseLimiterError::InvalidRebaseLimit);
		}
		// Relative growth of an empty pool is meaningless; lift the cap.
		let rebase_limit =
			if pre_total_pooled == 0 { UNLIMITED_REBASE } else { rebase_limit };
		let max_total_pooled = if rebase_limit == UNLIMITED_REBASE {
			u128::MAX
		} else {
			let growth = U256::from(pre_total_pooled) * U256::from(rebase_limit)
				/ U256::from(LIMITER_PRECISION);
			let max = U256::from(pre_total_pooled) + growth;
			if max > U256::from(u128::MAX) { u128::MAX } else { max.as_u128() }
		};
		Ok(Self {
			pre_total_pooled,
			pre_total_shares,
			post_total_pooled: pre_total_pooled,
			rebase_limit,
			max_total_pooled,
		})
	}

	/// Account NAT leaving the pool (withdrawals), which adds headroom.
	pub fn raise_limit(&mut self, nat_amount: u128) -> Result<(), RebaseLimiterError> {
		self.post_total_pooled = self
			.post_total_pooled
			.checked_sub(nat_amount)
			.ok_or(RebaseLimiterError::PooledAmountUnderflow)?;
		Ok(())
	}

	/// Account NAT entering the pool (rewards), capped at the remaining
	/// headroom. Returns the amount actually consumed.
	pub fn consume_limit(&mut self, nat_amount: u128) -> u128 {
		let headroom = self.max_total_pooled.saturating_sub(self.post_total_pooled);
		let consumed = nat_amount.min(headroom);
		self.post_total_pooled = self.post_total_pooled.saturating_add(consumed);
		consumed
	}

	pub fn is_limit_reached(&self) -> bool {
		self.post_total_pooled >= self.max_total_pooled
	}

	/// How many shares may still be burned before the share rate would grow
	/// past the limit. Burning shares at a fixed pooled amount raises the
	/// rate just like rewards do.
	pub fn shares_to_burn_limit(&self) -> u128 {
		if self.rebase_limit == UNLIMITED_REBASE {
			return self.pre_total_shares;
		}
		if self.is_limit_reached() {
			return 0;
		}
		let limit_plus_base = U256::from(self.rebase_limit) + U256::from(LIMITER_PRECISION);
		let pooled_rate = U256::from(self.post_total_pooled) * U256::from(LIMITER_PRECISION)
			/ U256::from(self.pre_total_pooled);
		let shares = U256::from(self.pre_total_shares) * (limit_plus_base - pooled_rate)
			/ limit_plus_base;
		if shares > U256::from(u128::MAX) { u128::MAX } else { shares.as_u128() }
	}
}
