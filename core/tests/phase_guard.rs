//! Phase guard tests: the calendar state machine and operation gating.

use rmc_core::{
    config::GameConfig,
    error::GameError,
    phase::{GameState, Operation, Phase, Transition},
    types::MonthKey,
};

fn at(phase: Phase, quarter: u32, month: u32) -> GameState {
    GameState {
        phase,
        current_quarter: quarter,
        current_month_within_quarter: month,
        months_per_quarter: 3,
        max_quarters: 4,
    }
}

#[test]
fn a_full_game_walks_every_phase_in_order() {
    let mut state = GameState::initial(&GameConfig::default_test());
    let mut visited = vec![state.phase];

    for _ in 0..4 {
        if state.phase == Phase::Lobby {
            state = state.transition(Transition::Announce).unwrap();
            visited.push(state.phase);
        }
        state = state.transition(Transition::OpenBidding).unwrap();
        state = state.transition(Transition::StartFirstMonth).unwrap();
        for _ in 0..3 {
            state = state.transition(Transition::AnnounceAuction).unwrap();
            state = state.transition(Transition::OpenAuction).unwrap();
            state = state.transition(Transition::CloseAuction).unwrap();
            state = state.transition(Transition::AdvanceMonth).unwrap();
        }
    }

    assert_eq!(visited, vec![Phase::Lobby, Phase::QuarterPreroll]);
    assert_eq!(state.phase, Phase::GameOver);
    assert_eq!(state.current_quarter, 4);
}

#[test]
fn skipping_ahead_is_a_phase_violation() {
    let lobby = at(Phase::Lobby, 1, 1);
    assert!(matches!(
        lobby.transition(Transition::OpenAuction),
        Err(GameError::PhaseViolation { phase: Phase::Lobby, .. })
    ));
    assert!(lobby.transition(Transition::EndGame).is_err());
    assert!(at(Phase::MonthStart, 1, 1).transition(Transition::CloseAuction).is_err());
    assert!(at(Phase::GameOver, 4, 3).transition(Transition::AdvanceMonth).is_err());
}

#[test]
fn end_game_and_reset_work_from_mid_game() {
    let mid = at(Phase::CustomerAuction, 2, 2);
    assert_eq!(mid.transition(Transition::EndGame).unwrap().phase, Phase::GameOver);
    let reset = mid.transition(Transition::Reset).unwrap();
    assert_eq!(reset, at(Phase::Lobby, 1, 1));
}

#[test]
fn rm_allocation_is_closed_to_future_quarters() {
    let s = at(Phase::QuarterStart, 2, 1);
    assert!(s.authorize(Operation::RmAllocation(2)).is_ok());
    assert!(s.authorize(Operation::RmAllocation(1)).is_ok());
    assert!(s.authorize(Operation::RmAllocation(3)).is_err());
    assert!(s.authorize(Operation::RmAllocation(0)).is_err());
    assert!(at(Phase::QuarterPreroll, 2, 1)
        .authorize(Operation::RmAllocation(2))
        .is_err());
}

#[test]
fn customer_allocation_and_financials_follow_the_auction() {
    let key = MonthKey::new(1, 2);
    let auction = at(Phase::CustomerAuction, 1, 2);
    assert!(auction.authorize(Operation::CustomerAllocation(key)).is_ok());
    assert!(auction.authorize(Operation::Financials(key)).is_err());
    assert!(auction.authorize(Operation::Financials(MonthKey::new(1, 1))).is_ok());

    let month_end = at(Phase::MonthEnd, 1, 2);
    assert!(month_end.authorize(Operation::Financials(key)).is_ok());
    assert!(month_end
        .authorize(Operation::Financials(MonthKey::new(1, 3)))
        .is_err());
    assert!(month_end
        .authorize(Operation::Financials(MonthKey::new(1, 4)))
        .is_err());

    let preroll = at(Phase::CustomerAuctionPreroll, 1, 2);
    assert!(preroll.authorize(Operation::CustomerAllocation(key)).is_err());
}

#[test]
fn bids_are_only_taken_while_their_window_is_open() {
    assert!(at(Phase::QuarterStart, 1, 1).authorize(Operation::SubmitRmBid(1)).is_ok());
    assert!(at(Phase::QuarterStart, 1, 1).authorize(Operation::SubmitRmBid(2)).is_err());
    assert!(at(Phase::MonthStart, 1, 1).authorize(Operation::SubmitRmBid(1)).is_err());

    let key = MonthKey::new(3, 1);
    assert!(at(Phase::CustomerAuction, 3, 1).authorize(Operation::SubmitCustomerBid(key)).is_ok());
    assert!(at(Phase::MonthEnd, 3, 1).authorize(Operation::SubmitCustomerBid(key)).is_err());
}

#[test]
fn set_phase_resolves_only_single_steps() {
    let s = at(Phase::MonthStart, 1, 1);
    assert_eq!(
        s.transition_towards(Phase::CustomerAuctionPreroll).unwrap(),
        Transition::AnnounceAuction
    );
    assert_eq!(s.transition_towards(Phase::GameOver).unwrap(), Transition::EndGame);
    assert!(s.transition_towards(Phase::CustomerAuction).is_err());
}
