//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two engines, same seed, same bot game.
//! They must produce identical ledgers and event logs.
//! Any divergence is a blocker. Do not merge until fixed.

use rmc_core::{
    bot, engine::GameEngine, ledger::LedgerStore, model::FinancialRow, phase::Phase,
    store::GameStore,
};

fn play(seed: u64, quarters: u32) -> GameEngine<GameStore> {
    let engine = GameEngine::build_test().expect("in-memory engine");
    bot::play_game(&engine, seed, 4, quarters).expect("bot game");
    engine
}

fn ledger(engine: &GameEngine<GameStore>) -> Vec<FinancialRow> {
    let store = engine.ledger();
    (1..=engine.config().max_quarters)
        .flat_map(|q| store.financial_rows(q, None).expect("read rows"))
        .collect()
}

fn event_payloads(engine: &GameEngine<GameStore>) -> Vec<String> {
    engine
        .events_since(0)
        .expect("read events")
        .into_iter()
        .map(|e| e.payload)
        .collect()
}

#[test]
fn same_seed_produces_identical_ledgers() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let engine_a = play(SEED, 4);
    let engine_b = play(SEED, 4);

    let ledger_a = ledger(&engine_a);
    let ledger_b = ledger(&engine_b);
    assert_eq!(ledger_a.len(), 4 * 12, "one row per team per month");
    assert_eq!(ledger_a, ledger_b);

    let log_a = event_payloads(&engine_a);
    let log_b = event_payloads(&engine_b);
    assert_eq!(
        log_a.len(), log_b.len(),
        "Event log lengths differ: {} vs {}",
        log_a.len(), log_b.len()
    );
    for (i, (a, b)) in log_a.iter().zip(log_b.iter()).enumerate() {
        assert_eq!(a, b, "Event log diverged at entry {i}:\n  A: {a}\n  B: {b}");
    }

    assert_eq!(engine_a.state().unwrap().phase, Phase::GameOver);
}

#[test]
fn different_seeds_produce_different_ledgers() {
    let ledger_a = ledger(&play(42, 1));
    let ledger_b = ledger(&play(99, 1));
    assert_eq!(ledger_a.len(), ledger_b.len());
    assert_ne!(ledger_a, ledger_b, "Different seeds produced identical ledgers; seed is not being used");
}

#[test]
fn cumulative_ebitda_is_the_running_sum() {
    let engine = play(7, 2);
    let rows = ledger(&engine);
    for team_id in 1..=4 {
        let mut running = 0;
        for r in rows.iter().filter(|r| r.team_id == team_id) {
            running += r.ebitda_paise;
            assert_eq!(r.cumulative_ebitda_paise, running);
        }
    }
}
