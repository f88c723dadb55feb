//! Funding premium settlement.

use super::core::Amm;
use super::results::{AmmError, FundingSettlement};
use crate::access::Role;
use crate::price_feed::PriceFeed;
use crate::types::{Address, BlockInfo, Timestamp};

const ONE_HOUR: u64 = 3_600;
const ONE_DAY: i128 = 86_400;

pub fn floor_to_hour(secs: u64) -> Timestamp {
    Timestamp::from_secs(secs / ONE_HOUR * ONE_HOUR)
}

impl Amm {
    /// premium = spot TWAP - oracle TWAP over the funding period,
    /// premium fraction = premium × funding period / 1 day.
    ///
    /// The next funding time stays on the hour grid unless the call came so late
    /// that it would fall inside the buffer period, in which case it rebases on now.
    pub fn settle_funding(
        &mut self,
        caller: Address,
        feed: &dyn PriceFeed,
        block: BlockInfo,
    ) -> Result<FundingSettlement, AmmError> {
        self.access.require(Role::CounterParty, caller)?;
        self.require_open()?;
        let now = block.timestamp;
        if now < self.next_funding_time {
            return Err(AmmError::FundingTooEarly {
                next: self.next_funding_time,
                now,
            });
        }

        let underlying_twap = self.underlying_twap_price(feed, self.funding_period, now)?;
        let spot_twap = self.twap_price(self.funding_period, now)?;
        let premium = spot_twap.to_signed()?.checked_sub(underlying_twap.to_signed()?)?;
        let premium_fraction = premium
            .mul_scalar(i128::from(self.funding_period))?
            .div_scalar(ONE_DAY)?;
        let funding_rate = premium_fraction.div_unsigned(underlying_twap)?;

        let min_next = Timestamp::from_secs(now.as_secs() + self.funding_buffer_period);
        let on_hour = floor_to_hour(self.next_funding_time.as_secs() + self.funding_period);
        self.next_funding_time = on_hour.max(min_next);
        self.premium_fractions.push(premium_fraction);
        self.funding_rate = funding_rate;

        tracing::info!(
            symbol = %self.symbol,
            %premium_fraction,
            %funding_rate,
            next_funding_time = %self.next_funding_time,
            "funding settled"
        );
        Ok(FundingSettlement {
            premium_fraction,
            funding_rate,
            next_funding_time: self.next_funding_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmmConfig;
    use crate::fixed_point::FixedPoint;
    use crate::price_feed::MockPriceFeed;
    use crate::types::Dir;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const OWNER: Address = Address(1);
    const CH: Address = Address(2);

    fn fp(value: Decimal) -> FixedPoint {
        FixedPoint::from_decimal(value).unwrap()
    }

    fn setup() -> (Amm, MockPriceFeed) {
        let config = AmmConfig {
            fluctuation_limit_ratio: Decimal::ZERO,
            ..AmmConfig::default()
        };
        let mut amm = Amm::new(&config, OWNER, BlockInfo::new(0, Timestamp::from_secs(0))).unwrap();
        amm.set_counter_party(OWNER, CH).unwrap();
        let mut feed = MockPriceFeed::new();
        feed.set_price("ETH", fp(dec!(10)), Timestamp::from_secs(0));
        (amm, feed)
    }

    #[test]
    fn floor_to_hour_grid() {
        assert_eq!(floor_to_hour(7_199), Timestamp::from_secs(3_600));
        assert_eq!(floor_to_hour(7_200), Timestamp::from_secs(7_200));
    }

    #[test]
    fn too_early_and_access() {
        let (mut amm, feed) = setup();
        let early = BlockInfo::new(1, Timestamp::from_secs(3_599));
        assert!(matches!(
            amm.settle_funding(CH, &feed, early),
            Err(AmmError::FundingTooEarly { .. })
        ));
        let due = BlockInfo::new(2, Timestamp::from_secs(3_600));
        assert!(matches!(amm.settle_funding(OWNER, &feed, due), Err(AmmError::Access(_))));
    }

    #[test]
    fn positive_premium_when_amm_above_oracle() {
        let (mut amm, mut feed) = setup();
        // spot 16 for the whole funding period, oracle 10
        amm.swap_input(CH, Dir::AddToAmm, fp(dec!(600)), FixedPoint::ZERO, false, BlockInfo::new(1, Timestamp::from_secs(0)))
            .unwrap();
        feed.set_price("ETH", fp(dec!(10)), Timestamp::from_secs(3_000));

        let settlement = amm.settle_funding(CH, &feed, BlockInfo::new(2, Timestamp::from_secs(3_600))).unwrap();
        // (16 - 10) * 3600 / 86400 = 0.25
        assert_eq!(settlement.premium_fraction.to_decimal(), dec!(0.25));
        assert_eq!(settlement.funding_rate.to_decimal(), dec!(0.025));
        assert_eq!(settlement.next_funding_time, Timestamp::from_secs(7_200));
        assert_eq!(amm.premium_fractions().len(), 1);
    }

    #[test]
    fn late_call_rebases_on_now() {
        let (mut amm, mut feed) = setup();
        feed.set_price("ETH", fp(dec!(10)), Timestamp::from_secs(9_000));
        let settlement = amm.settle_funding(CH, &feed, BlockInfo::new(1, Timestamp::from_secs(9_000))).unwrap();
        // on-hour next would be 7200, already past; buffer is half a period
        assert_eq!(settlement.next_funding_time, Timestamp::from_secs(10_800));
        assert!(settlement.premium_fraction.is_zero());
    }

    #[test]
    fn stale_oracle_blocks_funding() {
        let (mut amm, feed) = setup();
        // last answer at t=0, max age one hour
        let err = amm
            .settle_funding(CH, &feed, BlockInfo::new(1, Timestamp::from_secs(3_601)))
            .unwrap_err();
        assert!(err.to_string().contains("stale price feed"));
    }
}
