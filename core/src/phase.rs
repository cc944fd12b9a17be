//! Phase guard: the game's quarter/month state machine.
//!
//! RULE: No engine holds the current phase. Callers pass a `GameState`
//! value into every call and the guard decides whether the requested
//! operation is legal at that point of the calendar.
//!
//! Calendar of one quarter:
//!   LOBBY -> QUARTER_PREROLL -> QUARTER_START
//!     -> MONTH_START -> CUSTOMER_AUCTION_PREROLL -> CUSTOMER_AUCTION -> MONTH_END
//!     -> (MONTH_START of the next month | QUARTER_PREROLL of the next quarter | GAME_OVER)

use crate::{
    config::GameConfig,
    error::{GameError, GameResult},
    types::{MonthKey, QuarterId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    QuarterPreroll,
    QuarterStart,
    MonthStart,
    CustomerAuctionPreroll,
    CustomerAuction,
    MonthEnd,
    GameOver,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby                  => "LOBBY",
            Self::QuarterPreroll         => "QUARTER_PREROLL",
            Self::QuarterStart           => "QUARTER_START",
            Self::MonthStart             => "MONTH_START",
            Self::CustomerAuctionPreroll => "CUSTOMER_AUCTION_PREROLL",
            Self::CustomerAuction        => "CUSTOMER_AUCTION",
            Self::MonthEnd               => "MONTH_END",
            Self::GameOver               => "GAME_OVER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Lobby,
            Self::QuarterPreroll,
            Self::QuarterStart,
            Self::MonthStart,
            Self::CustomerAuctionPreroll,
            Self::CustomerAuction,
            Self::MonthEnd,
            Self::GameOver,
        ]
        .into_iter()
        .find(|p| p.as_str() == s)
    }

    /// Phases in which the current quarter's RM bids are closed.
    fn rm_bidding_closed(&self) -> bool {
        matches!(
            self,
            Self::MonthStart
                | Self::CustomerAuctionPreroll
                | Self::CustomerAuction
                | Self::MonthEnd
                | Self::GameOver
        )
    }
}

/// Admin-triggered phase changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// LOBBY -> QUARTER_PREROLL
    Announce,
    /// QUARTER_PREROLL -> QUARTER_START
    OpenBidding,
    /// QUARTER_START -> MONTH_START (month 1)
    StartFirstMonth,
    /// MONTH_START -> CUSTOMER_AUCTION_PREROLL
    AnnounceAuction,
    /// CUSTOMER_AUCTION_PREROLL -> CUSTOMER_AUCTION
    OpenAuction,
    /// CUSTOMER_AUCTION -> MONTH_END
    CloseAuction,
    /// MONTH_END -> next month, next quarter, or GAME_OVER after the last quarter
    AdvanceMonth,
    /// Any in-game phase -> GAME_OVER
    EndGame,
    /// Anything -> LOBBY, quarter 1
    Reset,
}

/// Engine operations the guard authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RegisterTeam,
    SubmitRmBid(QuarterId),
    SubmitCustomerBid(MonthKey),
    RmAllocation(QuarterId),
    CustomerAllocation(MonthKey),
    Financials(MonthKey),
    Leaderboard(QuarterId),
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegisterTeam          => write!(f, "register_team"),
            Self::SubmitRmBid(q)        => write!(f, "submit_rm_bid(Q{q})"),
            Self::SubmitCustomerBid(k)  => write!(f, "submit_customer_bid({k})"),
            Self::RmAllocation(q)       => write!(f, "rm_allocation(Q{q})"),
            Self::CustomerAllocation(k) => write!(f, "customer_allocation({k})"),
            Self::Financials(k)         => write!(f, "financials({k})"),
            Self::Leaderboard(q)        => write!(f, "leaderboard(Q{q})"),
        }
    }
}

/// The phase value object. Cheap to copy; persisted by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub current_quarter: QuarterId,
    pub current_month_within_quarter: u32,
    pub months_per_quarter: u32,
    pub max_quarters: u32,
}

impl GameState {
    pub fn initial(config: &GameConfig) -> Self {
        Self {
            phase: Phase::Lobby,
            current_quarter: 1,
            current_month_within_quarter: 1,
            months_per_quarter: config.months_per_quarter,
            max_quarters: config.max_quarters,
        }
    }

    pub fn current_month(&self) -> MonthKey {
        MonthKey::new(self.current_quarter, self.current_month_within_quarter)
    }

    pub fn is_last_month_of_quarter(&self) -> bool {
        self.current_month_within_quarter >= self.months_per_quarter
    }

    /// Apply an admin transition. Illegal transitions fail with
    /// `PhaseViolation` and the state is left untouched.
    pub fn transition(&self, t: Transition) -> GameResult<GameState> {
        let mut next = *self;
        match (self.phase, t) {
            (Phase::Lobby, Transition::Announce) => next.phase = Phase::QuarterPreroll,
            (Phase::QuarterPreroll, Transition::OpenBidding) => next.phase = Phase::QuarterStart,
            (Phase::QuarterStart, Transition::StartFirstMonth) => {
                next.phase = Phase::MonthStart;
                next.current_month_within_quarter = 1;
            }
            (Phase::MonthStart, Transition::AnnounceAuction) => {
                next.phase = Phase::CustomerAuctionPreroll
            }
            (Phase::CustomerAuctionPreroll, Transition::OpenAuction) => {
                next.phase = Phase::CustomerAuction
            }
            (Phase::CustomerAuction, Transition::CloseAuction) => next.phase = Phase::MonthEnd,
            (Phase::MonthEnd, Transition::AdvanceMonth) => {
                if !self.is_last_month_of_quarter() {
                    next.phase = Phase::MonthStart;
                    next.current_month_within_quarter += 1;
                } else if self.current_quarter < self.max_quarters {
                    next.phase = Phase::QuarterPreroll;
                    next.current_quarter += 1;
                    next.current_month_within_quarter = 1;
                } else {
                    next.phase = Phase::GameOver;
                }
            }
            (Phase::Lobby | Phase::GameOver, Transition::EndGame) => {
                return Err(GameError::phase_violation("end_game", self.phase));
            }
            (_, Transition::EndGame) => next.phase = Phase::GameOver,
            (_, Transition::Reset) => {
                next.phase = Phase::Lobby;
                next.current_quarter = 1;
                next.current_month_within_quarter = 1;
            }
            (phase, t) => {
                return Err(GameError::phase_violation(format!("{t:?}"), phase));
            }
        }
        Ok(next)
    }

    /// The transition that moves the game to `target` in one step, if any.
    pub fn transition_towards(&self, target: Phase) -> GameResult<Transition> {
        let t = match (self.phase, target) {
            (Phase::Lobby, Phase::QuarterPreroll)                    => Transition::Announce,
            (Phase::QuarterPreroll, Phase::QuarterStart)             => Transition::OpenBidding,
            (Phase::MonthStart, Phase::CustomerAuctionPreroll)       => Transition::AnnounceAuction,
            (Phase::CustomerAuctionPreroll, Phase::CustomerAuction)  => Transition::OpenAuction,
            (_, Phase::GameOver)                                     => Transition::EndGame,
            (_, Phase::Lobby)                                        => Transition::Reset,
            (phase, target) => {
                return Err(GameError::phase_violation(
                    format!("set_phase({})", target.as_str()),
                    phase,
                ));
            }
        };
        Ok(t)
    }

    /// Gate an engine operation against the current calendar position.
    pub fn authorize(&self, op: Operation) -> GameResult<()> {
        let current = self.current_month();
        let allowed = match op {
            Operation::RegisterTeam => {
                self.phase == Phase::Lobby && self.current_quarter == 1
            }
            Operation::SubmitRmBid(q) => {
                self.phase == Phase::QuarterStart && q == self.current_quarter
            }
            Operation::SubmitCustomerBid(k) => {
                self.phase == Phase::CustomerAuction && k == current
            }
            Operation::RmAllocation(q) => {
                if q == 0 || q > self.current_quarter {
                    false
                } else if q == self.current_quarter {
                    self.phase == Phase::QuarterStart || self.phase.rm_bidding_closed()
                } else {
                    true
                }
            }
            Operation::CustomerAllocation(k) => {
                self.valid_month(k)
                    && (k < current
                        || (k == current
                            && matches!(
                                self.phase,
                                Phase::CustomerAuction | Phase::MonthEnd | Phase::GameOver
                            )))
            }
            Operation::Financials(k) => {
                self.valid_month(k)
                    && (k < current
                        || (k == current
                            && matches!(self.phase, Phase::MonthEnd | Phase::GameOver)))
            }
            Operation::Leaderboard(q) => q >= 1 && q <= self.current_quarter,
        };

        if allowed {
            Ok(())
        } else {
            log::debug!("phase guard rejected {op} during {}", self.phase.as_str());
            Err(GameError::phase_violation(op.to_string(), self.phase))
        }
    }

    fn valid_month(&self, k: MonthKey) -> bool {
        k.quarter >= 1 && k.month >= 1 && k.month <= self.months_per_quarter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(phase: Phase, q: u32, m: u32) -> GameState {
        GameState {
            phase,
            current_quarter: q,
            current_month_within_quarter: m,
            months_per_quarter: 3,
            max_quarters: 4,
        }
    }

    #[test]
    fn phase_names_round_trip() {
        for p in [Phase::Lobby, Phase::CustomerAuctionPreroll, Phase::GameOver] {
            assert_eq!(Phase::parse(p.as_str()), Some(p));
        }
        assert_eq!(Phase::parse("NOPE"), None);
    }

    #[test]
    fn month_end_of_third_month_rolls_into_next_quarter() {
        let next = state(Phase::MonthEnd, 1, 3)
            .transition(Transition::AdvanceMonth)
            .unwrap();
        assert_eq!(next.phase, Phase::QuarterPreroll);
        assert_eq!(next.current_quarter, 2);
        assert_eq!(next.current_month_within_quarter, 1);
    }

    #[test]
    fn set_phase_cannot_skip_allocation() {
        let s = state(Phase::QuarterStart, 1, 1);
        assert!(s.transition_towards(Phase::MonthStart).is_err());
    }
}
