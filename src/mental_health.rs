//! Composite mental-health score from recent games and mood check-ins.
//!
//! Every component starts at 50. Games (last 50) push focus up and stress
//! down; mood entries (last 30) set mood and anxiety outright and adjust
//! stress and focus. Components are clamped to 0..=100 where they move.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{GameKind, GameResult, MoodEntry};

pub const SCORE_GAME_WINDOW: u32 = 50;
pub const SCORE_MOOD_WINDOW: u32 = 30;
pub const RECOMMENDATION_THRESHOLD: f64 = 60.0;

const BASELINE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentalHealthScore {
    pub overall: i64,
    pub stress: i64,
    pub anxiety: i64,
    pub focus: i64,
    pub mood: i64,
    pub recommendations: Vec<String>,
    pub last_updated: NaiveDateTime,
}

fn focus_weight(game: GameKind) -> f64 {
    match game {
        GameKind::Memory | GameKind::Focus => 0.3,
        GameKind::Reaction | GameKind::Color => 0.2,
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Banker's rounding: ties go to the even integer.
fn round_half_even(v: f64) -> i64 {
    v.round_ties_even() as i64
}

/// `games` and `moods` are the caller's most recent rows; order does not matter.
pub fn compute_score(
    games: &[GameResult],
    moods: &[MoodEntry],
    now: NaiveDateTime,
) -> MentalHealthScore {
    let mut focus = BASELINE;
    let mut stress = BASELINE;
    let mut mood = BASELINE;
    let mut anxiety = BASELINE;

    for kind in [GameKind::Memory, GameKind::Reaction, GameKind::Color, GameKind::Focus] {
        let avg = average(games.iter().filter(|g| g.game == kind).map(|g| g.score));
        if let Some(avg) = avg {
            focus = (focus + avg * focus_weight(kind)).min(100.0);
            if kind == GameKind::Focus {
                stress = (stress - avg * 0.2).max(0.0);
            }
        }
    }

    if let (Some(avg_mood), Some(avg_anxiety), Some(avg_energy)) = (
        average(moods.iter().map(|m| m.mood as f64)),
        average(moods.iter().map(|m| m.anxiety as f64)),
        average(moods.iter().map(|m| m.energy as f64)),
    ) {
        mood = avg_mood * 10.0;
        anxiety = 100.0 - avg_anxiety * 10.0;
        stress = (stress - avg_anxiety * 5.0).max(0.0);
        focus = (focus + avg_energy * 3.0).min(100.0);
    }

    let overall = round_half_even((focus + stress + mood + anxiety) / 4.0);

    let mut recommendations = Vec::new();
    if focus < RECOMMENDATION_THRESHOLD {
        recommendations.push("Try more memory and reaction games to improve focus".to_string());
    }
    if stress < RECOMMENDATION_THRESHOLD {
        recommendations.push("Practice breathing exercises and meditation".to_string());
    }
    if mood < RECOMMENDATION_THRESHOLD {
        recommendations
            .push("Consider activities that bring you joy and track your mood regularly".to_string());
    }
    if anxiety < RECOMMENDATION_THRESHOLD {
        recommendations.push(
            "Try relaxation techniques and consider talking to a mental health professional"
                .to_string(),
        );
    }

    MentalHealthScore {
        overall,
        stress: round_half_even(stress),
        anxiety: round_half_even(anxiety),
        focus: round_half_even(focus),
        mood: round_half_even(mood),
        recommendations,
        last_updated: now,
    }
}
