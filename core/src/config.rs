//! Game configuration.
//!
//! Every constant the allocation and settlement engines use lives here.
//! Defaults follow the published game rules; a data directory can
//! override them with `game_config.json`.

use crate::types::{CustomerId, Paise, Volume};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerConfig {
    pub customer_id: CustomerId,
    pub name: String,
    /// Share of the monthly market, in basis points.
    pub share_bps: u32,
    /// Days until the customer pays. Converted to whole months (30 days).
    pub payment_terms_days: u32,
}

impl CustomerConfig {
    pub fn payment_delay_months(&self) -> u32 {
        self.payment_terms_days / 30
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RmConfig {
    /// Quarterly RM supply contributed to the pool per registered team.
    pub supply_per_team_m3: Volume,
    /// Allocation factor drop per rank, in percent.
    pub factor_step_pct: u32,
    /// Shortfall penalty on top of the reference bid price, in basis points.
    pub spot_penalty_bps: u32,
    /// Highest per-m³ RM bid a team may place.
    pub max_bid_price_paise: Paise,
    /// Largest quarterly RM volume a single bid may ask for.
    pub max_bid_volume_m3: Volume,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmConfig {
    pub monthly_cost_paise: Paise,
    /// Rate for TMs auto-allotted when the fleet runs out.
    pub penalty_monthly_cost_paise: Paise,
    pub throughput_m3_per_month: Volume,
    /// Market-wide fleet contributed per registered team.
    pub fleet_per_team: i64,
    /// Most TMs a single bid may ask for.
    pub max_bid_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionTier {
    /// Inclusive lower bound of monthly sales volume for this tier.
    pub min_volume: Volume,
    pub rate_paise: Paise,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingCapitalConfig {
    /// Interest-free seed capital every team starts with.
    pub seed_paise: Paise,
    /// Maximum interest-bearing borrowing beyond the seed.
    pub borrowing_ceiling_paise: Paise,
    pub monthly_interest_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub months_per_quarter: u32,
    pub max_quarters: u32,
    pub market_size_per_team_m3: Volume,
    pub team_capacity_cap_m3: Volume,
    pub max_ask_price_paise: Paise,
    pub customers: Vec<CustomerConfig>,
    pub rm: RmConfig,
    pub tm: TmConfig,
    /// Sorted by `min_volume` descending after load.
    pub production_tiers: Vec<ProductionTier>,
    pub working_capital: WorkingCapitalConfig,
}

impl GameConfig {
    /// Load from `{data_dir}/game_config.json`.
    /// In tests, use GameConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/game_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: GameConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validated()
    }

    /// Check cross-field constraints and normalise tier order.
    pub fn validated(mut self) -> anyhow::Result<Self> {
        if self.months_per_quarter == 0 || self.max_quarters == 0 {
            anyhow::bail!("months_per_quarter and max_quarters must be positive");
        }
        if self.customers.is_empty() {
            anyhow::bail!("at least one customer is required");
        }
        let share_total: u32 = self.customers.iter().map(|c| c.share_bps).sum();
        if share_total > 10_000 {
            anyhow::bail!("customer shares sum to {share_total} bps, above 10000");
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.customers {
            if !seen.insert(c.customer_id.as_str()) {
                anyhow::bail!("duplicate customer id {}", c.customer_id);
            }
        }
        if self.production_tiers.is_empty() {
            anyhow::bail!("at least one production tier is required");
        }
        self.production_tiers
            .sort_by(|a, b| b.min_volume.cmp(&a.min_volume));
        if self.production_tiers.last().map(|t| t.min_volume) != Some(0) {
            anyhow::bail!("the lowest production tier must start at volume 0");
        }
        if self.tm.throughput_m3_per_month <= 0 {
            anyhow::bail!("tm.throughput_m3_per_month must be positive");
        }
        if self.rm.max_bid_price_paise <= 0
            || self.rm.max_bid_volume_m3 <= 0
            || self.tm.max_bid_count < 0
        {
            anyhow::bail!("RM and TM bid limits must be positive");
        }
        Ok(self)
    }

    pub fn customer(&self, customer_id: &str) -> Option<&CustomerConfig> {
        self.customers.iter().find(|c| c.customer_id == customer_id)
    }

    /// Per-m³ production rate for a month's sales volume.
    pub fn production_rate(&self, sales_vol: Volume) -> Paise {
        self.production_tiers
            .iter()
            .find(|t| sales_vol >= t.min_volume)
            .or(self.production_tiers.last())
            .map(|t| t.rate_paise)
            .unwrap_or(0)
    }

    /// Total monthly demand across all customers.
    pub fn market_size(&self, team_count: usize) -> Volume {
        team_count as Volume * self.market_size_per_team_m3
    }

    /// Config with the published rule-sheet defaults.
    /// Used by tests and as the fallback when no data dir is given.
    pub fn default_test() -> Self {
        Self {
            months_per_quarter: 3,
            max_quarters: 4,
            market_size_per_team_m3: 40_000,
            team_capacity_cap_m3: 50_000,
            max_ask_price_paise: 700_000, // Rs 7,000 per m³
            customers: vec![
                CustomerConfig {
                    customer_id: "laddu".into(),
                    name: "Laddu".into(),
                    share_bps: 4_000,
                    payment_terms_days: 60,
                },
                CustomerConfig {
                    customer_id: "shahi".into(),
                    name: "Shahi".into(),
                    share_bps: 3_000,
                    payment_terms_days: 30,
                },
                CustomerConfig {
                    customer_id: "lemon".into(),
                    name: "Lemon".into(),
                    share_bps: 2_000,
                    payment_terms_days: 0,
                },
                CustomerConfig {
                    customer_id: "jamoon".into(),
                    name: "Jamoon".into(),
                    share_bps: 1_000,
                    payment_terms_days: 0,
                },
            ],
            rm: RmConfig {
                supply_per_team_m3: 120_000,
                factor_step_pct: 10,
                spot_penalty_bps: 1_000,
                max_bid_price_paise: 700_000, // Rs 7,000 per m³
                max_bid_volume_m3: 500_000,
            },
            tm: TmConfig {
                monthly_cost_paise: 18_000_000,         // Rs 1,80,000
                penalty_monthly_cost_paise: 25_000_000, // Rs 2,50,000
                throughput_m3_per_month: 540,
                fleet_per_team: 80,
                max_bid_count: 1_000,
            },
            production_tiers: vec![
                ProductionTier { min_volume: 30_000, rate_paise: 40_000 },
                ProductionTier { min_volume: 20_000, rate_paise: 50_000 },
                ProductionTier { min_volume: 10_000, rate_paise: 60_000 },
                ProductionTier { min_volume: 0,      rate_paise: 70_000 },
            ],
            working_capital: WorkingCapitalConfig {
                seed_paise: 10_000_000_000,              // Rs 10 Cr
                borrowing_ceiling_paise: 10_000_000_000, // Rs 10 Cr
                monthly_interest_bps: 200,
            },
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::default_test()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_sorts_tiers_descending() {
        let mut cfg = GameConfig::default_test();
        cfg.production_tiers.reverse();
        let cfg = cfg.validated().unwrap();
        assert_eq!(cfg.production_tiers[0].min_volume, 30_000);
        assert_eq!(cfg.production_rate(30_000), 40_000);
    }

    #[test]
    fn rejects_oversubscribed_customer_shares() {
        let mut cfg = GameConfig::default_test();
        cfg.customers[0].share_bps = 9_000;
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn rejects_non_positive_bid_limits() {
        let mut cfg = GameConfig::default_test();
        cfg.rm.max_bid_price_paise = 0;
        assert!(cfg.validated().is_err());
    }
}
