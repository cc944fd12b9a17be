//! Seeded bot bidders.
//!
//! Bots stand in for human teams in dry runs and in the determinism test.
//! Every bid a bot places is drawn from its team's own RNG stream, so a
//! given seed always replays the same game.

use crate::{
    command::AdminCommand,
    config::GameConfig,
    engine::GameEngine,
    error::GameResult,
    ledger::LedgerStore,
    phase::Phase,
    rng::{RngBank, StreamRng},
    types::{CustomerId, Paise, TeamId, Volume},
};

/// Per-m³ RM bid range in paise (Rs 2,000 to Rs 3,000).
const RM_PRICE_RANGE: (Paise, Paise) = (200_000, 300_000);

/// Per-m³ ask range in paise (Rs 3,500 to Rs 6,500).
const ASK_PRICE_RANGE: (Paise, Paise) = (350_000, 650_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRmBid {
    pub bid_price_paise: Paise,
    pub bid_volume:      Volume,
    pub tm_bid_count:    i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCustomerBid {
    pub customer_id:     CustomerId,
    pub ask_price_paise: Paise,
    pub ask_volume:      Volume,
}

pub struct BotBidder {
    pub team_id: TeamId,
    rng:         StreamRng,
}

impl BotBidder {
    pub fn new(team_id: TeamId, bank: &RngBank) -> Self {
        Self { team_id, rng: bank.for_team(team_id) }
    }

    /// One quarter's RM/TM bid, sized around the team's fair share of
    /// the market.
    pub fn rm_bid(&mut self, config: &GameConfig) -> BotRmBid {
        let quarterly_share = config.market_size_per_team_m3 * config.months_per_quarter as Volume;
        let bid_volume = self.rng.between(quarterly_share * 3 / 4, quarterly_share * 11 / 10);
        let monthly = bid_volume / config.months_per_quarter.max(1) as Volume;
        let needed_tms = (monthly + config.tm.throughput_m3_per_month - 1)
            / config.tm.throughput_m3_per_month;
        BotRmBid {
            bid_price_paise: self.rng.between(RM_PRICE_RANGE.0, RM_PRICE_RANGE.1),
            bid_volume,
            tm_bid_count: self.rng.between(needed_tms * 4 / 5, needed_tms),
        }
    }

    /// Asks for this month, one per customer the bot chooses to serve.
    pub fn customer_bids(&mut self, config: &GameConfig, team_count: usize) -> Vec<BotCustomerBid> {
        let market = config.market_size(team_count);
        let teams = team_count.max(1) as Volume;
        let mut bids = Vec::with_capacity(config.customers.len());
        for customer in &config.customers {
            if !self.rng.chance(0.9) {
                continue;
            }
            let fair_share = market * customer.share_bps as Volume / 10_000 / teams;
            let ask_volume = self.rng.between(fair_share / 2, fair_share * 3 / 2).max(1);
            let ceiling = ASK_PRICE_RANGE.1.min(config.max_ask_price_paise);
            bids.push(BotCustomerBid {
                customer_id: customer.customer_id.clone(),
                ask_price_paise: self.rng.between(ASK_PRICE_RANGE.0.min(ceiling), ceiling),
                ask_volume,
            });
        }
        bids
    }
}

/// Register `team_count` bots and play `quarters` quarters through the
/// engine's public commands, ending the game afterwards.
pub fn play_game<S: LedgerStore>(
    engine: &GameEngine<S>,
    seed: u64,
    team_count: usize,
    quarters: u32,
) -> GameResult<()> {
    let bank = RngBank::new(seed);
    let mut bots = Vec::with_capacity(team_count);
    for i in 1..=team_count {
        let (team_id, _) = engine.register_team(&format!("Bot {i}"), &format!("{:04}", i))?;
        bots.push(BotBidder::new(team_id, &bank));
    }

    let config = engine.config().clone();
    let quarters = quarters.min(config.max_quarters);
    for _ in 0..quarters {
        if engine.state()?.phase == Phase::Lobby {
            engine.apply_admin(AdminCommand::SetPhase { phase: Phase::QuarterPreroll })?;
        }
        engine.apply_admin(AdminCommand::SetPhase { phase: Phase::QuarterStart })?;
        for bot in &mut bots {
            let bid = bot.rm_bid(&config);
            engine.submit_rm_bid(bot.team_id, bid.bid_price_paise, bid.bid_volume, bid.tm_bid_count)?;
        }
        engine.apply_admin(AdminCommand::ProcessRmAllocation)?;

        for _ in 0..config.months_per_quarter {
            engine.apply_admin(AdminCommand::SetPhase { phase: Phase::CustomerAuctionPreroll })?;
            engine.apply_admin(AdminCommand::SetPhase { phase: Phase::CustomerAuction })?;
            for bot in &mut bots {
                for bid in bot.customer_bids(&config, team_count) {
                    engine.submit_customer_bid(
                        bot.team_id,
                        &bid.customer_id,
                        bid.ask_price_paise,
                        bid.ask_volume,
                    )?;
                }
            }
            engine.apply_admin(AdminCommand::ProcessCustomerAllocation)?;
            engine.apply_admin(AdminCommand::AdvanceMonth)?;
        }
    }

    if !matches!(engine.state()?.phase, Phase::Lobby | Phase::GameOver) {
        engine.apply_admin(AdminCommand::EndGame)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_bids_pass_submission_checks() {
        let config = GameConfig::default_test();
        let bank = RngBank::new(99);
        let mut bot = BotBidder::new(1, &bank);
        let rm = bot.rm_bid(&config);
        assert!(rm.bid_price_paise > 0 && rm.bid_volume > 0 && rm.tm_bid_count >= 0);
        for b in bot.customer_bids(&config, 4) {
            assert!(b.ask_price_paise <= config.max_ask_price_paise);
            assert!(b.ask_volume > 0);
        }
    }
}
