//! The game engine: orchestrates every computation of the game.
//!
//! EXECUTION ORDER per computation (fixed, never reordered):
//!   1. Phase guard authorizes the operation against a GameState.
//!   2. In-flight registry claims the computation key.
//!   3. Inputs are read through the BidLedgerReader (validated).
//!   4. The pure engine computes and self-verifies its results.
//!   5. The store commits the result set and its event in one transaction.
//!   6. The read view is republished.
//!
//! RULES:
//!   - Engines never hold the phase; it is passed in as a value.
//!   - A failed run leaves previously committed results untouched.
//!   - Re-running a key replaces its results (recalculation is idempotent).
//!   - All writes go through the single writer store behind the mutex.
//!   - Admin and team commands read the phase under the writer lock and keep
//!     it until their last write, so no bid lands after its window closes.
//!   - Reads are served from the published `ReadView` and never take the
//!     writer lock.

use crate::{
    command::{AdminCommand, TeamCommand},
    config::GameConfig,
    customer_allocation::{allocate_customers, customer_demands, team_capacities},
    error::{GameError, GameResult},
    event::{EventLogEntry, GameEvent},
    inflight::{ComputationKey, InFlight},
    ledger::{check_customer_bid, check_rm_bid, BidLedgerReader, LedgerStore},
    model::{
        CustomerAllocationResult, CustomerBid, FinancialRow, LeaderboardEntry,
        RmAllocationResult, RmBid, Team,
    },
    phase::{GameState, Operation, Phase, Transition},
    rm_allocation::{allocate_rm, RmMarket},
    settlement::{self, MonthContext},
    snapshot::{GameSnapshot, ReadView},
    store::GameStore,
    types::{MonthId, MonthKey, QuarterId, TeamId},
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

pub struct GameEngine<S: LedgerStore> {
    config:   GameConfig,
    store:    Mutex<S>,
    inflight: InFlight,
    view:     RwLock<Arc<ReadView>>,
    events:   RwLock<Vec<EventLogEntry>>,
}

impl GameEngine<GameStore> {
    /// Open (or create) a game database at `path` and apply migrations.
    pub fn open(config: GameConfig, path: &str) -> GameResult<Self> {
        let store = GameStore::open(path)?;
        store.migrate()?;
        Self::new(config, store)
    }

    /// In-memory engine with the default rule-sheet config (used in tests).
    pub fn build_test() -> GameResult<Self> {
        Self::build_test_with(GameConfig::default_test())
    }

    pub fn build_test_with(config: GameConfig) -> GameResult<Self> {
        let store = GameStore::in_memory()?;
        store.migrate()?;
        Self::new(config, store)
    }
}

impl<S: LedgerStore> GameEngine<S> {
    pub fn new(config: GameConfig, store: S) -> GameResult<Self> {
        let view = ReadView::load(&store, &config)?;
        let events = store.events_since(0)?;
        Ok(Self {
            config,
            store: Mutex::new(store),
            inflight: InFlight::new(),
            view: RwLock::new(Arc::new(view)),
            events: RwLock::new(events),
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    /// Direct access to the writer store. Holding the guard blocks every
    /// other write, so keep it short. Writes made through it are not
    /// published to readers.
    pub fn ledger(&self) -> MutexGuard<'_, S> {
        self.store.lock()
    }

    // ── Read side ──────────────────────────────────────────────

    /// The latest published view. Holding it blocks nothing.
    pub fn view(&self) -> Arc<ReadView> {
        Arc::clone(&self.view.read())
    }

    /// The committed game state, or the initial lobby state for a fresh game.
    pub fn state(&self) -> GameResult<GameState> {
        Ok(self.view().snapshot.state)
    }

    pub fn snapshot(&self) -> GameResult<GameSnapshot> {
        Ok(self.view().snapshot.clone())
    }

    pub fn financial_rows(
        &self,
        quarter: QuarterId,
        month: Option<MonthId>,
    ) -> GameResult<Vec<FinancialRow>> {
        Ok(self.view().financial_rows(quarter, month))
    }

    pub fn leaderboard(
        &self,
        state: &GameState,
        quarter: QuarterId,
    ) -> GameResult<Vec<LeaderboardEntry>> {
        state.authorize(Operation::Leaderboard(quarter))?;
        Ok(self.view().leaderboard(quarter))
    }

    pub fn events_since(&self, seq: i64) -> GameResult<Vec<EventLogEntry>> {
        let events = self.events.read();
        let start = events.partition_point(|e| e.seq <= seq);
        Ok(events[start..].to_vec())
    }

    /// The team with this name, if the PIN matches.
    pub fn verify_team_pin(&self, name: &str, pin: &str) -> GameResult<Option<Team>> {
        let name = name.trim();
        Ok(self
            .view()
            .snapshot
            .teams
            .iter()
            .find(|t| t.name == name && t.pin == pin)
            .cloned())
    }

    // ── Writer ─────────────────────────────────────────────────

    /// Run `op` with the writer store, then republish the read view.
    fn write<T>(&self, op: impl FnOnce(&S) -> GameResult<T>) -> GameResult<T> {
        let store = self.store.lock();
        let out = op(&*store);
        self.publish(&*store);
        out
    }

    fn publish(&self, store: &S) {
        match ReadView::load(store, &self.config) {
            Ok(view) => *self.view.write() = Arc::new(view),
            Err(e) => log::error!("read view not refreshed: {e}"),
        }
        let last_seq = self.events.read().last().map_or(0, |e| e.seq);
        match store.events_since(last_seq) {
            Ok(fresh) => self.events.write().extend(fresh),
            Err(e) => log::error!("event cache not refreshed: {e}"),
        }
    }

    fn load_state(&self, store: &S) -> GameResult<GameState> {
        Ok(store
            .load_game_state()?
            .unwrap_or_else(|| GameState::initial(&self.config)))
    }

    // ── Computations ───────────────────────────────────────────

    pub fn compute_rm_allocation(
        &self,
        state: &GameState,
        quarter: QuarterId,
    ) -> GameResult<Vec<RmAllocationResult>> {
        state.authorize(Operation::RmAllocation(quarter))?;
        let _guard = self.inflight.try_acquire(ComputationKey::RmAllocation(quarter))?;
        self.write(|store| self.allocate_rm_in(store, quarter))
            .map(|(results, _)| results)
    }

    pub fn compute_customer_allocation(
        &self,
        state: &GameState,
        quarter: QuarterId,
        month: MonthId,
    ) -> GameResult<Vec<CustomerAllocationResult>> {
        let key = MonthKey::new(quarter, month);
        state.authorize(Operation::CustomerAllocation(key))?;
        let _guard = self.inflight.try_acquire(ComputationKey::CustomerAllocation(key))?;
        self.write(|store| self.allocate_customers_in(store, key))
            .map(|(results, _)| results)
    }

    pub fn compute_financials(
        &self,
        state: &GameState,
        quarter: QuarterId,
        month: MonthId,
    ) -> GameResult<Vec<FinancialRow>> {
        let key = MonthKey::new(quarter, month);
        state.authorize(Operation::Financials(key))?;
        let _guard = self.inflight.try_acquire(ComputationKey::Financials(key))?;
        self.write(|store| self.settle_in(store, key)).map(|(rows, _)| rows)
    }

    fn allocate_rm_in(
        &self,
        store: &S,
        quarter: QuarterId,
    ) -> GameResult<(Vec<RmAllocationResult>, GameEvent)> {
        let reader = BidLedgerReader::new(store, &self.config);
        let teams = reader.teams()?;
        if teams.is_empty() {
            return Err(GameError::insufficient("no registered teams"));
        }
        let bids = reader.rm_bids(quarter, &teams)?;
        let market = RmMarket::from_config(&self.config, teams.len());
        let results = allocate_rm(&bids.accepted, &market)?;

        let total_allocated = results.iter().map(|r| r.allocated_volume).sum();
        let total_spot = results.iter().map(|r| r.rm_spot_vol).sum();
        let event = GameEvent::RmAllocationCommitted {
            quarter,
            teams: results.len(),
            total_allocated,
            total_spot,
        };
        store.commit_rm_allocation(quarter, &results, &event)?;
        log::info!(
            "Q{quarter} RM allocation committed: {} teams, {total_allocated} m3 allocated, \
             {total_spot} m3 at spot, {} bids rejected",
            results.len(),
            bids.rejected.len()
        );
        Ok((results, event))
    }

    fn allocate_customers_in(
        &self,
        store: &S,
        key: MonthKey,
    ) -> GameResult<(Vec<CustomerAllocationResult>, GameEvent)> {
        let reader = BidLedgerReader::new(store, &self.config);
        let teams = reader.teams()?;
        if teams.is_empty() {
            return Err(GameError::insufficient("no registered teams"));
        }
        let bids = reader.customer_bids(key, &teams)?;
        let rm_allocations = reader.rm_allocations(key.quarter)?;
        let demands = customer_demands(&self.config, teams.len());
        let capacities = team_capacities(&self.config, &rm_allocations);
        let outcome = allocate_customers(key, &bids.accepted, &demands, &capacities)?;

        let total_allocated = outcome.sales.values().map(|s| s.sales_vol).sum();
        let event = GameEvent::CustomerAllocationCommitted {
            quarter: key.quarter,
            month: key.month,
            total_allocated,
        };
        store.commit_customer_allocation(key, &outcome.results, &event)?;
        log::info!(
            "{key} customer allocation committed: {} bids, {total_allocated} m3 sold",
            outcome.results.len()
        );
        Ok((outcome.results, event))
    }

    fn settle_in(&self, store: &S, key: MonthKey) -> GameResult<(Vec<FinancialRow>, GameEvent)> {
        let reader = BidLedgerReader::new(store, &self.config);
        let months = self.config.months_per_quarter;

        let teams = reader.teams()?;
        if teams.is_empty() {
            return Err(GameError::insufficient("no registered teams"));
        }
        let prior_rows = reader.financial_rows_before(key)?;
        let global = key.global_index(months);
        if let Some(previous) = MonthKey::from_global_index(global - 1, months) {
            if !prior_rows.iter().any(|r| r.month_key() == previous) {
                return Err(GameError::insufficient(format!(
                    "{previous} has not been settled"
                )));
            }
        }

        let rm_allocations = reader.rm_allocations(key.quarter)?;
        let customer_allocations = reader.customer_allocations(key)?;
        let longest_delay = self
            .config
            .customers
            .iter()
            .map(|c| c.payment_delay_months())
            .max()
            .unwrap_or(0);
        let mut earlier_allocations = Vec::new();
        for delay in 1..=longest_delay {
            if let Some(earlier) = global
                .checked_sub(delay)
                .and_then(|g| MonthKey::from_global_index(g, months))
            {
                earlier_allocations.extend(reader.customer_allocations(earlier)?);
            }
        }

        let rows = settlement::settle_month(&MonthContext {
            key,
            config: &self.config,
            teams: &teams,
            rm_allocations: &rm_allocations,
            customer_allocations: &customer_allocations,
            earlier_allocations: &earlier_allocations,
            prior_rows: &prior_rows,
        })?;

        let total_ebitda = rows.iter().map(|r| r.ebitda_paise).sum();
        let event = GameEvent::FinancialsCommitted {
            quarter: key.quarter,
            month: key.month,
            teams: rows.len(),
            total_ebitda,
        };
        store.commit_financials(key, &rows, &event)?;
        log::info!(
            "{key} financials committed: {} teams, total EBITDA {total_ebitda} paise",
            rows.len()
        );
        Ok((rows, event))
    }

    // ── Admin flow ─────────────────────────────────────────────

    pub fn apply_admin(&self, cmd: AdminCommand) -> GameResult<Vec<GameEvent>> {
        self.write(|store| {
            let state = self.load_state(store)?;
            self.admin_in(store, &state, cmd)
        })
    }

    fn admin_in(
        &self,
        store: &S,
        state: &GameState,
        cmd: AdminCommand,
    ) -> GameResult<Vec<GameEvent>> {
        match cmd {
            AdminCommand::SetPhase { phase } => {
                let t = state.transition_towards(phase)?;
                if t == Transition::Reset {
                    return self.reset_in(store, state);
                }
                self.transition_in(store, state, t).map(|(_, event)| vec![event])
            }
            AdminCommand::ProcessRmAllocation => {
                if state.phase != Phase::QuarterStart {
                    return Err(GameError::phase_violation("process_rm_allocation", state.phase));
                }
                let quarter = state.current_quarter;
                state.authorize(Operation::RmAllocation(quarter))?;
                let _guard = self.inflight.try_acquire(ComputationKey::RmAllocation(quarter))?;
                let mut events = match self.allocate_rm_in(store, quarter) {
                    Ok((_, event)) => vec![event],
                    Err(GameError::InsufficientData { what }) => {
                        log::warn!("Q{quarter} starts without RM allocation: {what}");
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                };
                let (_, event) = self.transition_in(store, state, Transition::StartFirstMonth)?;
                events.push(event);
                Ok(events)
            }
            AdminCommand::ProcessCustomerAllocation => {
                if state.phase != Phase::CustomerAuction {
                    return Err(GameError::phase_violation(
                        "process_customer_allocation",
                        state.phase,
                    ));
                }
                let key = state.current_month();
                state.authorize(Operation::CustomerAllocation(key))?;
                let _allocating =
                    self.inflight.try_acquire(ComputationKey::CustomerAllocation(key))?;
                let mut events = match self.allocate_customers_in(store, key) {
                    Ok((_, event)) => vec![event],
                    Err(GameError::InsufficientData { what }) => {
                        log::warn!("{key} closes without sales: {what}");
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                };
                let (closed, event) = self.transition_in(store, state, Transition::CloseAuction)?;
                events.push(event);

                closed.authorize(Operation::Financials(key))?;
                let _settling = self.inflight.try_acquire(ComputationKey::Financials(key))?;
                let (_, event) = self.settle_in(store, key)?;
                events.push(event);
                Ok(events)
            }
            AdminCommand::RecalculateFinancials { quarter, month } => {
                let key = MonthKey::new(quarter, month);
                state.authorize(Operation::Financials(key))?;
                let _guard = self.inflight.try_acquire(ComputationKey::Financials(key))?;
                let (_, event) = self.settle_in(store, key)?;
                Ok(vec![event])
            }
            AdminCommand::AdvanceMonth => {
                if state.phase == Phase::MonthEnd {
                    ensure_settled(store, state.current_month())?;
                }
                self.transition_in(store, state, Transition::AdvanceMonth)
                    .map(|(_, event)| vec![event])
            }
            AdminCommand::EndGame => self
                .transition_in(store, state, Transition::EndGame)
                .map(|(_, event)| vec![event]),
            AdminCommand::ResetGame => self.reset_in(store, state),
        }
    }

    fn transition_in(
        &self,
        store: &S,
        state: &GameState,
        t: Transition,
    ) -> GameResult<(GameState, GameEvent)> {
        let next = state.transition(t)?;
        store.save_game_state(&next)?;
        let event = GameEvent::PhaseChanged {
            phase: next.phase,
            quarter: next.current_quarter,
            month: next.current_month_within_quarter,
        };
        store.append_event(&event)?;
        log::info!(
            "phase {} -> {} (Q{} M{})",
            state.phase.as_str(),
            next.phase.as_str(),
            next.current_quarter,
            next.current_month_within_quarter
        );
        Ok((next, event))
    }

    fn reset_in(&self, store: &S, state: &GameState) -> GameResult<Vec<GameEvent>> {
        let next = state.transition(Transition::Reset)?;
        store.reset_game()?;
        store.save_game_state(&next)?;
        let events = vec![
            GameEvent::GameReset,
            GameEvent::PhaseChanged {
                phase: next.phase,
                quarter: next.current_quarter,
                month: next.current_month_within_quarter,
            },
        ];
        for event in &events {
            store.append_event(event)?;
        }
        log::warn!("game reset to lobby");
        Ok(events)
    }

    // ── Team commands ──────────────────────────────────────────

    pub fn apply_team(&self, cmd: TeamCommand) -> GameResult<Vec<GameEvent>> {
        match cmd {
            TeamCommand::RegisterTeam { name, pin } => self.register_team(&name, &pin).map(|(_, e)| vec![e]),
            TeamCommand::SubmitRmBid { team_id, bid_price_paise, bid_volume, tm_bid_count } => {
                self.submit_rm_bid(team_id, bid_price_paise, bid_volume, tm_bid_count)
                    .map(|e| vec![e])
            }
            TeamCommand::SubmitCustomerBid { team_id, customer_id, ask_price_paise, ask_volume } => {
                self.submit_customer_bid(team_id, &customer_id, ask_price_paise, ask_volume)
                    .map(|e| vec![e])
            }
        }
    }

    /// Register a new team, or rejoin an existing one when the name and
    /// PIN both match. Rejoining works in any phase.
    pub fn register_team(&self, name: &str, pin: &str) -> GameResult<(TeamId, GameEvent)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::invalid("team name must not be empty"));
        }
        if pin.is_empty() {
            return Err(GameError::invalid("team PIN must not be empty"));
        }
        self.write(|store| {
            if let Some(team) = store.teams()?.into_iter().find(|t| t.name == name) {
                if team.pin != pin {
                    return Err(GameError::invalid(format!("team name '{name}' is taken")));
                }
                let event = GameEvent::TeamRejoined { team_id: team.id };
                store.append_event(&event)?;
                log::info!("team {} rejoined as '{name}'", team.id);
                return Ok((team.id, event));
            }

            self.load_state(store)?.authorize(Operation::RegisterTeam)?;
            let team_id = store.insert_team(name, pin, self.config.working_capital.seed_paise)?;
            let event = GameEvent::TeamRegistered { team_id, name: name.to_string() };
            store.append_event(&event)?;
            log::info!("team {team_id} registered as '{name}'");
            Ok((team_id, event))
        })
    }

    pub fn submit_rm_bid(
        &self,
        team_id: TeamId,
        bid_price_paise: i64,
        bid_volume: i64,
        tm_bid_count: i64,
    ) -> GameResult<GameEvent> {
        self.write(|store| {
            let state = self.load_state(store)?;
            let quarter = state.current_quarter;
            state.authorize(Operation::SubmitRmBid(quarter))?;
            let bid = RmBid { team_id, quarter_id: quarter, bid_price_paise, bid_volume, tm_bid_count };
            check_rm_bid(&bid, &self.config).map_err(GameError::invalid)?;
            ensure_registered(&store.teams()?, team_id)?;

            store.upsert_rm_bid(&bid)?;
            let event = GameEvent::RmBidSubmitted { team_id, quarter };
            store.append_event(&event)?;
            Ok(event)
        })
    }

    pub fn submit_customer_bid(
        &self,
        team_id: TeamId,
        customer_id: &str,
        ask_price_paise: i64,
        ask_volume: i64,
    ) -> GameResult<GameEvent> {
        self.write(|store| {
            let state = self.load_state(store)?;
            let key = state.current_month();
            state.authorize(Operation::SubmitCustomerBid(key))?;
            let bid = CustomerBid {
                team_id,
                quarter_id: key.quarter,
                month_id: key.month,
                customer_id: customer_id.to_string(),
                ask_price_paise,
                ask_volume,
            };
            check_customer_bid(&bid, &self.config).map_err(GameError::invalid)?;
            ensure_registered(&store.teams()?, team_id)?;

            store.upsert_customer_bid(&bid)?;
            let event = GameEvent::CustomerBidSubmitted {
                team_id,
                quarter: key.quarter,
                month: key.month,
                customer_id: bid.customer_id,
            };
            store.append_event(&event)?;
            Ok(event)
        })
    }
}

fn ensure_settled<S: LedgerStore + ?Sized>(store: &S, key: MonthKey) -> GameResult<()> {
    if store.teams()?.is_empty() {
        return Ok(());
    }
    if store.financial_rows(key.quarter, Some(key.month))?.is_empty() {
        return Err(GameError::insufficient(format!("{key} has not been settled")));
    }
    Ok(())
}

fn ensure_registered(teams: &[Team], team_id: TeamId) -> GameResult<()> {
    if teams.iter().any(|t| t.id == team_id) {
        Ok(())
    } else {
        Err(GameError::invalid(format!("team {team_id} is not registered")))
    }
}
