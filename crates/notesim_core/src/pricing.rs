//! Black-Scholes pricing of structured-note participation rates
//!
//! A note is funded as a discount bond plus an option package: the issuer
//! keeps `1 - B` of principal (with `B` the bond price at the funding rate),
//! sells the investor's downside beyond `p` as a put struck at `S(1-p)`, and
//! spends the proceeds on at-the-money calls. The participation rate is how
//! many calls that budget buys.

use serde::{Deserialize, Serialize};

use crate::error::PricingError;
use crate::math::normal_cdf;
use crate::model::{DEFAULT_UNDERLYING, MarketData, NoteTable, NoteTerms, ProtectionType};

pub const DEFAULT_DIVIDEND_YIELD: f64 = 0.02;
pub const DEFAULT_FUNDING_SPREAD: f64 = 0.015;
pub const DEFAULT_VOLATILITY: f64 = 0.20;
/// Protection levels priced when a market file carries no notes
pub const DEFAULT_PROTECTION_LEVELS: [f64; 4] = [0.05, 0.10, 0.15, 0.20];

/// Spot used when a year has no index level; participation is scale-free
const NOMINAL_SPOT: f64 = 100.0;

/// Market inputs for pricing one note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketState {
    pub spot: f64,
    pub risk_free_rate: f64,
    pub volatility: f64,
    pub dividend_yield: f64,
    pub funding_spread: f64,
}

impl MarketState {
    #[must_use]
    pub fn new(spot: f64, risk_free_rate: f64, volatility: f64) -> Self {
        MarketState {
            spot,
            risk_free_rate,
            volatility,
            dividend_yield: DEFAULT_DIVIDEND_YIELD,
            funding_spread: DEFAULT_FUNDING_SPREAD,
        }
    }

    #[must_use]
    pub fn dividend_yield(mut self, q: f64) -> Self {
        self.dividend_yield = q;
        self
    }

    #[must_use]
    pub fn funding_spread(mut self, spread: f64) -> Self {
        self.funding_spread = spread;
        self
    }
}

fn default_term() -> f64 {
    1.0
}

fn default_iv_factor() -> f64 {
    0.90
}

fn default_participation_cap() -> f64 {
    2.0
}

/// Model settings shared by every priced note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_term")]
    pub term: f64,
    /// Scales quoted volatility to the implied volatility used for options
    #[serde(default = "default_iv_factor")]
    pub iv_factor: f64,
    #[serde(default = "default_participation_cap")]
    pub participation_cap: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            term: default_term(),
            iv_factor: default_iv_factor(),
            participation_cap: default_participation_cap(),
        }
    }
}

/// Intermediate values of a participation-rate calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipationBreakdown {
    pub bond_capital: f64,
    pub put_price: f64,
    pub call_price: f64,
    /// Participation before the cap is applied
    pub raw_participation: f64,
    pub participation_rate: f64,
}

fn invalid(field: &'static str, value: f64, reason: &'static str) -> PricingError {
    PricingError::InvalidInput {
        field,
        value,
        reason,
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), PricingError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be a positive finite number"))
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), PricingError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, value, "must be finite"))
    }
}

#[inline]
fn d1_d2(adjusted_spot: f64, strike: f64, rate: f64, vol: f64, expiry: f64) -> (f64, f64) {
    let sig_sqrt_t = vol * expiry.sqrt();
    let d1 = ((adjusted_spot / strike).ln() + (rate + 0.5 * vol * vol) * expiry) / sig_sqrt_t;
    (d1, d1 - sig_sqrt_t)
}

fn validate_option_inputs(
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    expiry: f64,
) -> Result<(), PricingError> {
    check_positive("spot", spot)?;
    check_positive("strike", strike)?;
    check_positive("volatility", vol)?;
    check_positive("term", expiry)?;
    check_finite("risk_free_rate", rate)?;
    check_finite("dividend_yield", dividend_yield)
}

/// European call on a dividend-paying underlying
pub fn bs_call(
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    expiry: f64,
) -> Result<f64, PricingError> {
    validate_option_inputs(spot, strike, rate, dividend_yield, vol, expiry)?;
    let adjusted = spot * (-dividend_yield * expiry).exp();
    let (d1, d2) = d1_d2(adjusted, strike, rate, vol, expiry);
    Ok(adjusted * normal_cdf(d1) - strike * (-rate * expiry).exp() * normal_cdf(d2))
}

/// European put on a dividend-paying underlying
pub fn bs_put(
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    expiry: f64,
) -> Result<f64, PricingError> {
    validate_option_inputs(spot, strike, rate, dividend_yield, vol, expiry)?;
    let adjusted = spot * (-dividend_yield * expiry).exp();
    let (d1, d2) = d1_d2(adjusted, strike, rate, vol, expiry);
    Ok(strike * (-rate * expiry).exp() * normal_cdf(-d2) - adjusted * normal_cdf(-d1))
}

/// Participation rate with every intermediate price
pub fn participation_breakdown(
    market: &MarketState,
    protection_level: f64,
    config: &PricingConfig,
) -> Result<ParticipationBreakdown, PricingError> {
    if !(protection_level > 0.0 && protection_level < 1.0) {
        return Err(invalid(
            "protection_level",
            protection_level,
            "must lie strictly between 0 and 1",
        ));
    }
    check_positive("iv_factor", config.iv_factor)?;
    check_positive("participation_cap", config.participation_cap)?;
    check_finite("funding_spread", market.funding_spread)?;
    check_positive("volatility", market.volatility)?;

    let spot = market.spot;
    let rate = market.risk_free_rate;
    let q = market.dividend_yield;
    let term = config.term;
    let vol = market.volatility * config.iv_factor;

    let funding_rate = rate + market.funding_spread;
    let bond_price = 1.0 / (1.0 + funding_rate).powf(term);
    let bond_capital = 1.0 - bond_price;

    let put_price = bs_put(spot, spot * (1.0 - protection_level), rate, q, vol, term)?;
    let call_price = bs_call(spot, spot, rate, q, vol, term)?;
    if !(call_price > 0.0) {
        return Err(PricingError::ZeroCallPrice { call_price });
    }

    let raw_participation = (bond_capital + put_price / spot) / (call_price / spot);
    Ok(ParticipationBreakdown {
        bond_capital,
        put_price,
        call_price,
        raw_participation,
        participation_rate: raw_participation.min(config.participation_cap),
    })
}

/// Participation rate for a note protecting against the first `protection_level` of losses
pub fn participation_rate(
    market: &MarketState,
    protection_level: f64,
    config: &PricingConfig,
) -> Result<f64, PricingError> {
    participation_breakdown(market, protection_level, config).map(|b| b.participation_rate)
}

/// Price a Buffer note at each protection level for every year with a
/// treasury rate. The VIX level is the quoted volatility (0.20 when absent).
pub fn price_note_table(
    market: &MarketData,
    protection_levels: &[f64],
    config: &PricingConfig,
) -> Result<NoteTable, PricingError> {
    let mut table = NoteTable::new();
    for year in market.years() {
        let Some(rate) = year.treasury_rate else {
            continue;
        };
        let state = MarketState::new(
            year.equity_level.unwrap_or(NOMINAL_SPOT),
            rate,
            year.vix_level.unwrap_or(DEFAULT_VOLATILITY),
        )
        .dividend_yield(year.dividend_yield.unwrap_or(DEFAULT_DIVIDEND_YIELD))
        .funding_spread(year.funding_spread.unwrap_or(DEFAULT_FUNDING_SPREAD));

        for &level in protection_levels {
            table.insert(NoteTerms {
                calendar_year: year.year,
                participation_rate: participation_rate(&state, level, config)?,
                protection_level: level,
                protection_type: ProtectionType::Buffer,
                term: config.term,
                underlying_asset: DEFAULT_UNDERLYING.to_string(),
            });
        }
    }
    Ok(table)
}
