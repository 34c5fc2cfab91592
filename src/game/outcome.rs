//! Win-condition evaluation

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ws::protocol::Team;

use super::player::Player;
use super::MatchError;

/// Decided result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Win(Team),
    Draw,
}

/// Decide whether the match is over.
///
/// A team with no members counts as having no alive members. Returns
/// `Ok(None)` while both teams still have someone standing.
pub fn evaluate(players: &BTreeMap<Uuid, Player>) -> Result<Option<MatchOutcome>, MatchError> {
    if players.is_empty() {
        return Err(MatchError::Invariant(
            "win check ran with no registered players",
        ));
    }

    let alive = |team: Team| players.values().any(|p| p.team == team && p.is_alive());
    let red_alive = alive(Team::Red);
    let blue_alive = alive(Team::Blue);

    Ok(match (red_alive, blue_alive) {
        (false, false) => Some(MatchOutcome::Draw),
        (false, true) => Some(MatchOutcome::Win(Team::Blue)),
        (true, false) => Some(MatchOutcome::Win(Team::Red)),
        (true, true) => None,
    })
}
