//! Gamification arithmetic for break outcomes.
//!
//! Everything here is pure: randomness comes in through the caller's RNG so
//! outcomes are reproducible under a seeded generator.

use std::time::Duration;

use rand::Rng;

use crate::storage::{PetMood, ProgressState, RewardsConfig, SkipConfig, SkipPolicy, MAX_EYE_SCORE};

/// XP needed per pet level; level `n` levels up at `n * LEVEL_XP_STEP`.
pub const LEVEL_XP_STEP: u32 = 100;

pub const BREAK_TITLES: &[&str] = &[
    "Time for an eye break! 👀",
    "Quick break time! ✨",
    "Give your eyes a rest! 💙",
    "Break time! 🌟",
];

/// Templates for a completion without level-up. `{xp}` is replaced by the gain.
pub const ENCOURAGEMENTS: &[&str] = &[
    "+{xp} XP! Great job! ✨",
    "+{xp} XP! Your eyes thank you! 💙",
    "+{xp} XP! Keep it up! 🌟",
];

pub fn pick_message<'a, R: Rng + ?Sized>(pool: &[&'a str], rng: &mut R) -> &'a str {
    if pool.is_empty() {
        return "";
    }
    pool[rng.gen_range(0..pool.len())]
}

/// Uniform XP gain in `min..=max`. Bounds given in the wrong order are swapped.
pub fn roll_xp<R: Rng + ?Sized>(min: u32, max: u32, rng: &mut R) -> u32 {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    rng.gen_range(low..=high)
}

pub fn level_threshold(level: u32) -> u32 {
    level.max(1).saturating_mul(LEVEL_XP_STEP)
}

pub fn level_up_message(level: u32) -> String {
    format!("🎉 Level {level}! Your eye buddy evolved!")
}

/// Result of crediting one completed break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub progress: ProgressState,
    pub xp_gain: u32,
    pub leveled_up: bool,
    pub achievement: String,
}

/// Credit a completed break on `today` (local `YYYY-MM-DD`).
pub fn apply_completion<R: Rng + ?Sized>(
    mut progress: ProgressState,
    today: &str,
    rewards: &RewardsConfig,
    rng: &mut R,
) -> Completion {
    if progress.breaks_today_date.as_deref() != Some(today) {
        progress.breaks_today = 0;
        progress.breaks_today_date = Some(today.to_string());
    }
    progress.breaks_today = progress.breaks_today.saturating_add(1);
    progress.total_breaks_completed = progress.total_breaks_completed.saturating_add(1);
    progress.eye_score = progress
        .eye_score
        .saturating_add(rewards.eye_score_reward)
        .min(MAX_EYE_SCORE);

    let xp_gain = roll_xp(rewards.xp_min, rewards.xp_max, rng);
    let threshold = level_threshold(progress.pet_level);
    let total_xp = progress.pet_xp.saturating_add(xp_gain);
    let leveled_up = total_xp >= threshold;

    let achievement = if leveled_up {
        progress.pet_level = progress.pet_level.max(1) + 1;
        progress.pet_xp = total_xp - threshold;
        let message = level_up_message(progress.pet_level);
        progress.achievements.push(message.clone());
        message
    } else {
        progress.pet_xp = total_xp;
        pick_message(ENCOURAGEMENTS, rng).replace("{xp}", &xp_gain.to_string())
    };

    progress.pet_mood = PetMood::Happy;
    progress.latest_achievement = Some(achievement.clone());

    Completion {
        progress,
        xp_gain,
        leveled_up,
        achievement,
    }
}

/// Apply the skip policy. Returns the updated progress and the delay until
/// the next break.
pub fn apply_skip(
    mut progress: ProgressState,
    interval: Duration,
    skip: &SkipConfig,
) -> (ProgressState, Duration) {
    match skip.policy {
        SkipPolicy::Lenient => (progress, interval),
        SkipPolicy::Penalize => {
            progress.eye_score = progress
                .eye_score
                .saturating_sub(skip.score_penalty)
                .max(skip.score_floor.min(MAX_EYE_SCORE))
                .min(MAX_EYE_SCORE);
            progress.pet_mood = PetMood::Sleepy;
            // Unusable factors leave the interval unstretched.
            let stretched = Some(skip.interval_factor)
                .filter(|factor| factor.is_finite() && *factor > 0.0)
                .and_then(|factor| {
                    Duration::try_from_secs_f64(interval.as_secs_f64() * factor).ok()
                })
                .unwrap_or(interval);
            (progress, stretched)
        }
    }
}
