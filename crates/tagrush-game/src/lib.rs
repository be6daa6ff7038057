pub mod physics;

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tagrush_core::level::{LevelGeometry, Rect};
use tagrush_core::net::messages::{InputKey, MatchSnapshot, PlayerSnapshot, RankedPlayer};
use tagrush_core::player::{ConnId, LobbyPlayer, PlayerColor};

use physics::{IntentFlags, PlayerBody, step_player};

/// Tunable match rules supplied by the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct MatchRules {
    /// Seconds the tagged player has to pass the tag on before
    /// disqualification.
    pub round_secs: u32,
    /// Minimum interval between successive tag transfers.
    pub tag_cooldown: Duration,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            round_secs: 30,
            tag_cooldown: Duration::from_millis(500),
        }
    }
}

/// Phase of a match session. Strictly forward: Countdown -> Active -> Over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Countdown,
    Active,
    Over,
}

/// One player inside the authoritative simulation.
#[derive(Debug, Clone)]
pub struct MatchPlayer {
    pub conn: ConnId,
    pub username: String,
    pub color: PlayerColor,
    pub body: PlayerBody,
    pub intent: IntentFlags,
    pub tagged: bool,
    pub disqualified: bool,
    pub disqualified_at: Option<Instant>,
}

/// Final result of a match, produced exactly once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Username of the last player standing; `None` on a draw.
    pub winner: Option<String>,
    /// Winner first, then disqualified players by descending
    /// disqualification time (longest survivor ranks highest).
    pub rankings: Vec<RankedPlayer>,
    /// Everyone who played, for stats accounting.
    pub participants: Vec<String>,
}

/// The authoritative state machine for one match.
///
/// Pure simulation: the caller owns the clock (every mutation takes `now`)
/// and the tick cadence, so tests drive it with synthetic timestamps. All
/// randomness flows through the seeded RNG injected at construction.
pub struct MatchSim {
    players: Vec<MatchPlayer>,
    platforms: Vec<Rect>,
    rules: MatchRules,
    phase: MatchPhase,
    timer_secs: u32,
    next_second_deadline: Instant,
    tag_cooldown_until: Instant,
    finalized: bool,
    outcome: Option<MatchOutcome>,
    tick: u32,
    rng: StdRng,
}

impl MatchSim {
    /// Snapshot the lobby roster into a fresh session: players at the level's
    /// spawn points in join order (cycling if the level has fewer points),
    /// velocity zero, grounded, one uniformly random initial tag-holder.
    pub fn new(roster: &[LobbyPlayer], level: &LevelGeometry, rules: MatchRules, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let spawns = if level.spawn_points.is_empty() {
            tagrush_core::level::default_level().spawn_points
        } else {
            level.spawn_points.clone()
        };

        let mut players: Vec<MatchPlayer> = roster
            .iter()
            .enumerate()
            .map(|(i, p)| MatchPlayer {
                conn: p.conn,
                username: p.username.clone(),
                color: p.color,
                body: PlayerBody::at_spawn(spawns[i % spawns.len()]),
                intent: IntentFlags::default(),
                tagged: false,
                disqualified: false,
                disqualified_at: None,
            })
            .collect();

        if !players.is_empty() {
            let idx = rng.random_range(0..players.len());
            players[idx].tagged = true;
        }

        let now = Instant::now();
        Self {
            players,
            platforms: level.platforms.clone(),
            rules,
            phase: MatchPhase::Countdown,
            timer_secs: rules.round_secs,
            next_second_deadline: now,
            tag_cooldown_until: now,
            finalized: false,
            outcome: None,
            tick: 0,
            rng,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn players(&self) -> &[MatchPlayer] {
        &self.players
    }

    pub fn timer_secs(&self) -> u32 {
        self.timer_secs
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// Arm the clocks and enter Active. Called when the countdown completes.
    pub fn activate(&mut self, now: Instant) {
        if self.phase != MatchPhase::Countdown {
            return;
        }
        self.phase = MatchPhase::Active;
        self.next_second_deadline = now + Duration::from_secs(1);
        self.tag_cooldown_until = now;
    }

    /// Record a key edge from a client. Ignored unless the match is Active
    /// and the player is still in play.
    pub fn apply_input(&mut self, conn: ConnId, key: InputKey, pressed: bool) {
        if self.phase != MatchPhase::Active {
            return;
        }
        if let Some(p) = self
            .players
            .iter_mut()
            .find(|p| p.conn == conn && !p.disqualified)
        {
            match key {
                InputKey::Left => p.intent.left = pressed,
                InputKey::Right => p.intent.right = pressed,
                InputKey::Jump => p.intent.jump = pressed,
            }
        }
    }

    /// Advance the simulation one tick. Returns the outcome on the tick that
    /// ends the match; every later call is a no-op.
    pub fn tick(&mut self, now: Instant) -> Option<MatchOutcome> {
        if self.phase != MatchPhase::Active {
            return None;
        }
        self.tick += 1;

        // The round timer follows the wall clock, not the tick cadence: each
        // stored deadline that has passed costs exactly one second.
        while self.timer_secs > 0 && now >= self.next_second_deadline {
            self.timer_secs -= 1;
            self.next_second_deadline += Duration::from_secs(1);
        }

        if self.timer_secs == 0 {
            if let Some(outcome) = self.expire_round(now) {
                return Some(outcome);
            }
        }

        for p in &mut self.players {
            if p.disqualified {
                continue;
            }
            step_player(&mut p.body, p.intent, &self.platforms);
        }

        self.detect_tag(now);
        None
    }

    /// Full authoritative state for broadcast.
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            timer_secs: self.timer_secs,
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    conn: p.conn,
                    username: p.username.clone(),
                    color: p.color,
                    x: p.body.x,
                    y: p.body.y,
                    tagged: p.tagged,
                    disqualified: p.disqualified,
                })
                .collect(),
        }
    }

    /// Timer hit zero: the tagged player is out. Either the match ends or
    /// the round restarts with a fresh uniformly random tag-holder and a
    /// full timer.
    fn expire_round(&mut self, now: Instant) -> Option<MatchOutcome> {
        if let Some(p) = self
            .players
            .iter_mut()
            .find(|p| p.tagged && !p.disqualified)
        {
            p.tagged = false;
            p.intent = IntentFlags::default();
            p.disqualified = true;
            p.disqualified_at = Some(now);
        }

        let remaining: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.disqualified)
            .map(|(i, _)| i)
            .collect();

        if remaining.len() <= 1 {
            return Some(self.finalize());
        }

        for p in &mut self.players {
            p.tagged = false;
        }
        let idx = remaining[self.rng.random_range(0..remaining.len())];
        self.players[idx].tagged = true;
        self.timer_secs = self.rules.round_secs;
        self.next_second_deadline = now + Duration::from_secs(1);
        None
    }

    /// At most one tag transfer per tick, gated by the cooldown window.
    /// Candidates are scanned in roster order; the first overlap wins.
    fn detect_tag(&mut self, now: Instant) {
        if now < self.tag_cooldown_until {
            return;
        }
        let Some(tagged_idx) = self.players.iter().position(|p| p.tagged && !p.disqualified)
        else {
            return;
        };
        let tagged_box = self.players[tagged_idx].body.aabb();
        let hit = self
            .players
            .iter()
            .position(|p| !p.disqualified && !p.tagged && p.body.aabb().overlaps(&tagged_box));
        if let Some(idx) = hit {
            self.players[tagged_idx].tagged = false;
            self.players[idx].tagged = true;
            self.tag_cooldown_until = now + self.rules.tag_cooldown;
        }
    }

    /// One-shot: rank the field and close the session. Subsequent calls
    /// return the cached outcome without re-running any effects.
    pub fn finalize(&mut self) -> MatchOutcome {
        if let Some(ref outcome) = self.outcome {
            return outcome.clone();
        }
        self.finalized = true;
        self.phase = MatchPhase::Over;

        let winner = {
            let mut alive = self.players.iter().filter(|p| !p.disqualified);
            match (alive.next(), alive.next()) {
                (Some(p), None) => Some(p.username.clone()),
                _ => None,
            }
        };

        let mut rankings = Vec::with_capacity(self.players.len());
        let mut rank = 1u32;
        if let Some(ref name) = winner {
            rankings.push(RankedPlayer {
                rank,
                username: name.clone(),
                disqualified: false,
            });
            rank += 1;
        }

        let mut out: Vec<&MatchPlayer> = self.players.iter().filter(|p| p.disqualified).collect();
        out.sort_by(|a, b| b.disqualified_at.cmp(&a.disqualified_at));
        for p in out {
            rankings.push(RankedPlayer {
                rank,
                username: p.username.clone(),
                disqualified: true,
            });
            rank += 1;
        }

        let outcome = MatchOutcome {
            winner,
            rankings,
            participants: self.players.iter().map(|p| p.username.clone()).collect(),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[cfg(test)]
    fn player_at_mut(&mut self, idx: usize) -> &mut MatchPlayer {
        &mut self.players[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::physics::{ARENA_HEIGHT, ARENA_WIDTH, PLAYER_SIZE};
    use tagrush_core::level::default_level;
    use tagrush_core::test_helpers::make_players;

    fn active_sim(n: usize, rules: MatchRules, seed: u64) -> (MatchSim, Instant) {
        let mut sim = MatchSim::new(&make_players(n), &default_level(), rules, seed);
        let t0 = Instant::now();
        sim.activate(t0);
        (sim, t0)
    }

    fn tagged_count(sim: &MatchSim) -> usize {
        sim.players()
            .iter()
            .filter(|p| p.tagged && !p.disqualified)
            .count()
    }

    #[test]
    fn new_sim_snapshots_roster_at_spawns() {
        let sim = MatchSim::new(
            &make_players(3),
            &default_level(),
            MatchRules::default(),
            1,
        );
        assert_eq!(sim.phase(), MatchPhase::Countdown);
        assert_eq!(sim.timer_secs(), 30);
        assert_eq!(tagged_count(&sim), 1);
        for p in sim.players() {
            assert_eq!((p.body.vx, p.body.vy), (0.0, 0.0));
            assert!(p.body.grounded);
            assert!(!p.disqualified);
        }
        // Spawn points are taken in join order.
        assert_eq!(sim.players()[0].body.x, 50.0);
        assert_eq!(sim.players()[1].body.x, 200.0);
    }

    #[test]
    fn initial_tag_holder_follows_seed() {
        let a = MatchSim::new(
            &make_players(4),
            &default_level(),
            MatchRules::default(),
            11,
        );
        let b = MatchSim::new(
            &make_players(4),
            &default_level(),
            MatchRules::default(),
            11,
        );
        let pick = |sim: &MatchSim| sim.players().iter().position(|p| p.tagged);
        assert_eq!(pick(&a), pick(&b));
    }

    #[test]
    fn tick_is_noop_during_countdown() {
        let mut sim = MatchSim::new(
            &make_players(2),
            &default_level(),
            MatchRules::default(),
            1,
        );
        let before = sim.snapshot();
        assert!(sim.tick(Instant::now()).is_none());
        assert_eq!(sim.snapshot(), before);
        assert_eq!(sim.tick_count(), 0);
    }

    #[test]
    fn input_ignored_until_active() {
        let mut sim = MatchSim::new(
            &make_players(2),
            &default_level(),
            MatchRules::default(),
            1,
        );
        sim.apply_input(1, InputKey::Right, true);
        assert!(!sim.players()[0].intent.right);

        sim.activate(Instant::now());
        sim.apply_input(1, InputKey::Right, true);
        assert!(sim.players()[0].intent.right);
        sim.apply_input(1, InputKey::Right, false);
        assert!(!sim.players()[0].intent.right);
    }

    #[test]
    fn timer_follows_wall_clock_not_tick_cadence() {
        let (mut sim, t0) = active_sim(3, MatchRules::default(), 2);

        // Many fast ticks inside the same second: no decrement.
        for i in 0..20 {
            sim.tick(t0 + Duration::from_millis(i * 10));
        }
        assert_eq!(sim.timer_secs(), 30);

        sim.tick(t0 + Duration::from_secs(1));
        assert_eq!(sim.timer_secs(), 29);

        // A long stall still costs exactly one second per elapsed second.
        sim.tick(t0 + Duration::from_secs(4));
        assert_eq!(sim.timer_secs(), 26);
    }

    #[test]
    fn timeout_disqualifies_tagged_and_retags_survivor_pool() {
        let rules = MatchRules {
            round_secs: 1,
            ..MatchRules::default()
        };
        let (mut sim, t0) = active_sim(3, rules, 3);
        let first_tagged = sim.players().iter().position(|p| p.tagged).unwrap();

        let outcome = sim.tick(t0 + Duration::from_secs(1));
        assert!(outcome.is_none(), "two survivors keep playing");

        let p = &sim.players()[first_tagged];
        assert!(p.disqualified);
        assert!(p.disqualified_at.is_some());
        assert!(!p.tagged);
        assert_eq!(tagged_count(&sim), 1);
        assert_eq!(sim.timer_secs(), rules.round_secs);
    }

    #[test]
    fn last_disqualification_ends_match_with_winner() {
        let rules = MatchRules {
            round_secs: 1,
            ..MatchRules::default()
        };
        let (mut sim, t0) = active_sim(2, rules, 4);

        let outcome = sim
            .tick(t0 + Duration::from_secs(1))
            .expect("one survivor ends the match");
        assert_eq!(sim.phase(), MatchPhase::Over);
        assert!(sim.is_finalized());

        let loser = sim.players().iter().find(|p| p.disqualified).unwrap();
        let winner = outcome.winner.clone().unwrap();
        assert_ne!(winner, loser.username);
        assert_eq!(outcome.rankings[0].rank, 1);
        assert_eq!(outcome.rankings[0].username, winner);
        assert_eq!(outcome.rankings[1].username, loser.username);

        // Later ticks are absorbed.
        assert!(sim.tick(t0 + Duration::from_secs(2)).is_none());
    }

    #[test]
    fn rankings_order_by_descending_disqualification_time() {
        let rules = MatchRules {
            round_secs: 1,
            ..MatchRules::default()
        };
        let (mut sim, t0) = active_sim(4, rules, 5);

        let mut order = Vec::new();
        let mut outcome = None;
        for s in 1..=4u64 {
            let before: Vec<String> = sim
                .players()
                .iter()
                .filter(|p| p.disqualified)
                .map(|p| p.username.clone())
                .collect();
            outcome = sim.tick(t0 + Duration::from_secs(s));
            for p in sim.players().iter().filter(|p| p.disqualified) {
                if !before.contains(&p.username) {
                    order.push(p.username.clone());
                }
            }
            if outcome.is_some() {
                break;
            }
        }
        let outcome = outcome.expect("four players take three timeouts");
        assert_eq!(order.len(), 3);

        // Winner first, then most recently disqualified downwards.
        let expected: Vec<String> = std::iter::once(outcome.winner.clone().unwrap())
            .chain(order.iter().rev().cloned())
            .collect();
        let got: Vec<String> = outcome.rankings.iter().map(|r| r.username.clone()).collect();
        assert_eq!(got, expected);
        assert_eq!(
            outcome.rankings.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn overlap_transfers_tag_once_per_cooldown() {
        let rules = MatchRules {
            round_secs: 60,
            tag_cooldown: Duration::from_millis(500),
        };
        let (mut sim, t0) = active_sim(2, rules, 6);
        let tagged = sim.players().iter().position(|p| p.tagged).unwrap();
        let other = 1 - tagged;

        // Stack the players so their boxes overlap.
        let x = sim.players()[tagged].body.x;
        sim.player_at_mut(other).body.x = x + PLAYER_SIZE / 2.0;
        sim.player_at_mut(other).body.y = sim.players()[tagged].body.y;

        sim.tick(t0 + Duration::from_millis(16));
        assert!(sim.players()[other].tagged, "tag transfers on overlap");
        assert!(!sim.players()[tagged].tagged);

        // Boxes still overlap; within the cooldown nothing moves back.
        for i in 2..=20u64 {
            sim.tick(t0 + Duration::from_millis(16 * i));
            assert!(sim.players()[other].tagged);
        }

        // After the window the tag can come back.
        sim.tick(t0 + Duration::from_millis(16 + 600));
        assert!(sim.players()[tagged].tagged);
        assert_eq!(tagged_count(&sim), 1);
    }

    #[test]
    fn exactly_one_tagged_while_two_or_more_remain() {
        let rules = MatchRules {
            round_secs: 1,
            ..MatchRules::default()
        };
        let (mut sim, t0) = active_sim(4, rules, 7);
        for s in 1..=3u64 {
            if sim.tick(t0 + Duration::from_secs(s)).is_some() {
                break;
            }
            let remaining = sim
                .players()
                .iter()
                .filter(|p| !p.disqualified)
                .count();
            if remaining >= 2 {
                assert_eq!(tagged_count(&sim), 1);
            }
        }
    }

    #[test]
    fn finalize_is_idempotent() {
        let rules = MatchRules {
            round_secs: 1,
            ..MatchRules::default()
        };
        let (mut sim, t0) = active_sim(2, rules, 8);
        let first = sim.tick(t0 + Duration::from_secs(1)).unwrap();
        let again = sim.finalize();
        assert_eq!(first, again);
    }

    #[test]
    fn disqualified_player_input_is_dropped() {
        let rules = MatchRules {
            round_secs: 1,
            ..MatchRules::default()
        };
        let (mut sim, t0) = active_sim(3, rules, 9);
        sim.tick(t0 + Duration::from_secs(1));
        let dq = sim.players().iter().position(|p| p.disqualified).unwrap();
        let conn = sim.players()[dq].conn;
        sim.apply_input(conn, InputKey::Right, true);
        assert_eq!(sim.players()[dq].intent, IntentFlags::default());
    }

    mod arena_bounds {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Whatever keys arrive in whatever order, bodies stay inside
            // the arena.
            #[test]
            fn players_never_leave_the_arena(
                edges in prop::collection::vec((0u64..2, 0u8..3, any::<bool>()), 0..400)
            ) {
                let rules = MatchRules { round_secs: 600, ..MatchRules::default() };
                let mut sim = MatchSim::new(
                    &make_players(2),
                    &default_level(),
                    rules,
                    42,
                );
                let t0 = Instant::now();
                sim.activate(t0);

                for (i, &(conn, key, pressed)) in edges.iter().enumerate() {
                    let key = match key {
                        0 => InputKey::Left,
                        1 => InputKey::Right,
                        _ => InputKey::Jump,
                    };
                    sim.apply_input(conn + 1, key, pressed);
                    sim.tick(t0 + Duration::from_millis(16 * i as u64));

                    for p in sim.players() {
                        prop_assert!(p.body.x >= 0.0);
                        prop_assert!(p.body.x <= ARENA_WIDTH - PLAYER_SIZE);
                        prop_assert!(p.body.y >= 0.0);
                        prop_assert!(p.body.y <= ARENA_HEIGHT - PLAYER_SIZE);
                    }
                }
            }
        }
    }
}
