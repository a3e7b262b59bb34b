use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::product::CatalogItem;

/// 10% expressed in basis points.
pub const DEFAULT_TAX_RATE_BPS: u32 = 1_000;

const BPS_DENOMINATOR: i64 = 10_000;

/// Price snapshot for a party on a date. Amounts are minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub base_price: i64,
    pub party_size: u32,
    pub subtotal: i64,
    pub taxes: i64,
    pub total: i64,
    pub currency: String,
}

impl Quote {
    /// `subtotal = base × party` and `total = subtotal + taxes`.
    pub fn is_consistent(&self) -> bool {
        self.subtotal == self.base_price * i64::from(self.party_size)
            && self.total == self.subtotal + self.taxes
    }
}

#[derive(Debug, Clone)]
pub struct PricingCalculator {
    tax_rate_bps: u32,
}

impl PricingCalculator {
    pub fn new(tax_rate_bps: u32) -> Self {
        Self { tax_rate_bps }
    }

    /// Tier price covering `date`, else the flat base price.
    pub fn base_price_for(&self, item: &CatalogItem, date: NaiveDate) -> i64 {
        item.price_tiers
            .iter()
            .find(|tier| tier.covers(date))
            .map(|tier| tier.price)
            .unwrap_or(item.base_price)
    }

    pub fn compute_price(
        &self,
        item: &CatalogItem,
        date: NaiveDate,
        party_size: u32,
    ) -> Result<Quote, PricingError> {
        if party_size < 1 {
            return Err(PricingError::EmptyParty);
        }

        let base_price = self.base_price_for(item, date);
        let subtotal = base_price
            .checked_mul(i64::from(party_size))
            .ok_or(PricingError::AmountOverflow)?;
        let taxes = self.taxes_on(subtotal)?;
        let total = subtotal.checked_add(taxes).ok_or(PricingError::AmountOverflow)?;

        Ok(Quote {
            base_price,
            party_size,
            subtotal,
            taxes,
            total,
            currency: item.currency.clone(),
        })
    }

    /// Rounded half-up to the nearest minor unit.
    fn taxes_on(&self, subtotal: i64) -> Result<i64, PricingError> {
        let scaled = subtotal
            .checked_mul(i64::from(self.tax_rate_bps))
            .ok_or(PricingError::AmountOverflow)?;
        Ok((scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR)
    }
}

impl Default for PricingCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_TAX_RATE_BPS)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("party size must be at least 1")]
    EmptyParty,

    #[error("amount out of range")]
    AmountOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::tests::{date, tour};
    use crate::product::PriceTier;

    #[test]
    fn test_party_of_three_at_fifty() {
        let item = tour(5000, 10);
        let quote = PricingCalculator::default()
            .compute_price(&item, date(2030, 6, 1), 3)
            .unwrap();

        assert_eq!(quote.base_price, 5000);
        assert_eq!(quote.subtotal, 15000);
        assert_eq!(quote.taxes, 1500);
        assert_eq!(quote.total, 16500);
        assert_eq!(quote.currency, "USD");
        assert!(quote.is_consistent());
    }

    #[test]
    fn test_seasonal_tier_applies_inside_range_only() {
        let mut item = tour(10000, 10);
        item.price_tiers.push(PriceTier {
            start_date: date(2030, 12, 20),
            end_date: date(2031, 1, 5),
            price: 15000,
        });
        let calc = PricingCalculator::default();

        assert_eq!(calc.compute_price(&item, date(2030, 12, 31), 1).unwrap().base_price, 15000);
        assert_eq!(calc.compute_price(&item, date(2031, 1, 5), 1).unwrap().base_price, 15000);
        assert_eq!(calc.compute_price(&item, date(2031, 1, 6), 1).unwrap().base_price, 10000);
    }

    #[test]
    fn test_tax_rounds_half_up() {
        let item = tour(1005, 10);
        let quote = PricingCalculator::default()
            .compute_price(&item, date(2030, 6, 1), 1)
            .unwrap();

        // 10% of 10.05 is 1.005
        assert_eq!(quote.taxes, 101);
        assert_eq!(quote.total, 1106);
    }

    #[test]
    fn test_invalid_inputs() {
        let calc = PricingCalculator::default();
        assert_eq!(
            calc.compute_price(&tour(100, 1), date(2030, 6, 1), 0),
            Err(PricingError::EmptyParty)
        );
        assert_eq!(
            calc.compute_price(&tour(i64::MAX, 1), date(2030, 6, 1), 2),
            Err(PricingError::AmountOverflow)
        );
    }
}
