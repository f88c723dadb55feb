//! Time weighted prices over the reserve snapshot history.
//!
//! Integration runs backward from `now`. Each snapshot's price counts for the time
//! it was in effect, clipped to the interval. A history shorter than the interval
//! averages over what exists. Snapshots before the latest liquidity change are
//! never read.

use super::core::{Amm, ReserveSnapshot};
use super::pricing::{input_price_with_reserves, output_price_with_reserves};
use super::results::AmmError;
use crate::fixed_point::FixedPoint;
use crate::types::{Dir, Timestamp};

#[derive(Debug, Clone, Copy)]
enum TwapSource {
    // quote / base mid price
    Reserve,
    Input(Dir, FixedPoint),
    Output(Dir, FixedPoint),
}

impl Amm {
    pub fn twap_price(&self, interval: u64, now: Timestamp) -> Result<FixedPoint, AmmError> {
        self.calc_twap(TwapSource::Reserve, interval, now)
    }

    /// TWAP of the base exchanged for `quote_amount`.
    pub fn input_twap(&self, dir_of_quote: Dir, quote_amount: FixedPoint, now: Timestamp) -> Result<FixedPoint, AmmError> {
        self.calc_twap(TwapSource::Input(dir_of_quote, quote_amount), self.spot_price_twap_interval, now)
    }

    /// TWAP of the quote exchanged for `base_amount`.
    pub fn output_twap(&self, dir_of_base: Dir, base_amount: FixedPoint, now: Timestamp) -> Result<FixedPoint, AmmError> {
        self.calc_twap(TwapSource::Output(dir_of_base, base_amount), self.spot_price_twap_interval, now)
    }

    fn price_at(snapshot: &ReserveSnapshot, source: TwapSource) -> Result<FixedPoint, AmmError> {
        let (quote, base) = (snapshot.quote_asset_reserve, snapshot.base_asset_reserve);
        match source {
            TwapSource::Reserve => Ok(quote.checked_div(base)?),
            TwapSource::Input(dir, amount) => input_price_with_reserves(dir, amount, quote, base),
            TwapSource::Output(dir, amount) => output_price_with_reserves(dir, amount, quote, base),
        }
    }

    fn calc_twap(&self, source: TwapSource, interval: u64, now: Timestamp) -> Result<FixedPoint, AmmError> {
        let floor = self.twap_floor_index();
        let mut index = self.reserve_snapshots.len().checked_sub(1).ok_or(AmmError::ReserveExhausted)?;
        let mut snapshot = &self.reserve_snapshots[index];
        let mut price = Self::price_at(snapshot, source)?;
        if interval == 0 {
            return Ok(price);
        }

        let base_timestamp = now.saturating_sub(interval);
        if index <= floor || snapshot.timestamp <= base_timestamp {
            return Ok(price);
        }

        let mut previous = snapshot.timestamp;
        let mut period = u128::from(now.elapsed_since(previous));
        let mut weighted = price.mul_scalar(period)?;
        loop {
            if index <= floor {
                if period == 0 {
                    return Ok(price);
                }
                return Ok(weighted.div_scalar(period)?);
            }
            index -= 1;
            snapshot = &self.reserve_snapshots[index];
            price = Self::price_at(snapshot, source)?;

            if snapshot.timestamp <= base_timestamp {
                // only the part inside the window counts
                let clipped = u128::from(previous.elapsed_since(base_timestamp));
                weighted = weighted.checked_add(price.mul_scalar(clipped)?)?;
                break;
            }
            let fraction = u128::from(previous.elapsed_since(snapshot.timestamp));
            weighted = weighted.checked_add(price.mul_scalar(fraction)?)?;
            period += fraction;
            previous = snapshot.timestamp;
        }
        // the window is shorter than `interval` only when it would start before t=0
        Ok(weighted.div_scalar(u128::from(now.elapsed_since(base_timestamp)))?)
    }
}
