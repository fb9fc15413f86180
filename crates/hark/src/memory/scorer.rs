//! Candidate ranking for competing geofences
//!
//! Several memories can be in range at once. The scorer discards the ones
//! that cannot or should not play, then orders the rest:
//! 1. Distance, quantized to `distance_resolution_m` (closer bucket wins)
//! 2. Composite priority: proximity + ownership/friend boost + freshness
//! 3. Most recently created, then identifier
//!
//! The ordering is total and deterministic.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::memory::types::{LocationSample, Memory, Viewer};

/// A memory that survived filtering, with its ranking inputs
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Distance from the query point in meters
    pub distance_m: f64,
    pub is_owner: bool,
    pub is_friend: bool,
    /// Composite priority used inside a distance bucket
    pub score: f64,
}

/// Ranks in-range memories for playback
#[derive(Debug, Clone, Default)]
pub struct MemoryScorer {
    config: ScoringConfig,
}

impl MemoryScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Best playable, in-range candidate, without viewer context
    pub fn select_best(&self, candidates: &[Memory], at: &LocationSample) -> Option<Memory> {
        self.rank(candidates, at, None)
            .into_iter()
            .next()
            .map(|scored| scored.memory)
    }

    /// Best candidate the given viewer may hear
    pub fn select_best_for(
        &self,
        candidates: &[Memory],
        at: &LocationSample,
        viewer: &Viewer,
    ) -> Option<ScoredMemory> {
        self.rank(candidates, at, Some(viewer)).into_iter().next()
    }

    /// All surviving candidates in playback priority order.
    ///
    /// With no viewer, every privacy tier is treated as audible and no
    /// relationship boosts apply.
    pub fn rank(
        &self,
        candidates: &[Memory],
        at: &LocationSample,
        viewer: Option<&Viewer>,
    ) -> Vec<ScoredMemory> {
        self.rank_at(candidates, at, viewer, Utc::now())
    }

    fn rank_at(
        &self,
        candidates: &[Memory],
        at: &LocationSample,
        viewer: Option<&Viewer>,
        now: DateTime<Utc>,
    ) -> Vec<ScoredMemory> {
        let mut ranked: Vec<ScoredMemory> = candidates
            .iter()
            .filter(|memory| memory.is_playable())
            .filter(|memory| viewer.is_none_or(|v| v.can_hear(memory)))
            .filter_map(|memory| {
                let distance_m = memory.distance_to(at);
                if distance_m.is_nan() || distance_m > memory.radius_m {
                    return None;
                }
                let is_owner = viewer.is_some_and(|v| v.is_owner(memory));
                let is_friend = viewer.is_some_and(|v| v.is_friend(memory));
                let score = self.score(memory, distance_m, is_owner, is_friend, now);
                Some(ScoredMemory {
                    memory: memory.clone(),
                    distance_m,
                    is_owner,
                    is_friend,
                    score,
                })
            })
            .collect();

        ranked.sort_by(|a, b| self.compare(a, b));
        ranked
    }

    /// Composite priority for a memory at `distance_m`
    pub fn score(
        &self,
        memory: &Memory,
        distance_m: f64,
        is_owner: bool,
        is_friend: bool,
        now: DateTime<Utc>,
    ) -> f64 {
        let proximity = if memory.radius_m > 0.0 {
            (1.0 - distance_m / memory.radius_m).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let mut score = proximity;
        if is_owner {
            score += self.config.owner_boost;
        } else if is_friend {
            score += self.config.friend_boost;
        }

        let age_days = ((now - memory.created_at).num_seconds().max(0) as f64) / 86_400.0;
        score += self.config.freshness_weight * (-self.config.decay_rate * age_days).exp();

        score
    }

    fn compare(&self, a: &ScoredMemory, b: &ScoredMemory) -> Ordering {
        self.compare_distance(a.distance_m, b.distance_m)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    }

    fn compare_distance(&self, a: f64, b: f64) -> Ordering {
        let resolution = self.config.distance_resolution_m;
        if resolution > 0.0 {
            let bucket_a = (a / resolution).floor() as i64;
            let bucket_b = (b / resolution).floor() as i64;
            bucket_a.cmp(&bucket_b)
        } else {
            a.total_cmp(&b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Privacy;
    use chrono::Duration;
    use uuid::Uuid;

    /// Offset north of the origin by roughly `meters`
    fn memory_north(meters: f64, radius_m: f64) -> Memory {
        let lat = 37.8720 + meters / 111_194.93;
        Memory::new(format!("{meters}m north"), lat, -122.2580, radius_m)
            .with_audio(format!("https://cdn.example.com/{meters}.mp3"))
    }

    fn origin() -> LocationSample {
        LocationSample::new(37.8720, -122.2580)
    }

    #[test]
    fn test_select_best_empty_is_none() {
        let scorer = MemoryScorer::default();
        assert!(scorer.select_best(&[], &origin()).is_none());
    }

    #[test]
    fn test_select_best_skips_memories_without_audio() {
        let scorer = MemoryScorer::default();
        let silent = Memory::new("no audio", 37.8720, -122.2580, 50.0);
        assert!(scorer.select_best(&[silent.clone()], &origin()).is_none());

        let audible = memory_north(10.0, 50.0);
        let best = scorer.select_best(&[silent, audible.clone()], &origin()).unwrap();
        assert_eq!(best.id, audible.id);
    }

    #[test]
    fn test_select_best_respects_own_radius() {
        let scorer = MemoryScorer::default();
        let memory = Memory::new("quad", 37.8720, -122.2580, 20.0).with_audio("https://a/1.mp3");

        let near = LocationSample::new(37.8721, -122.2580);
        let far = LocationSample::new(37.8730, -122.2580);

        assert_eq!(scorer.select_best(&[memory.clone()], &near).unwrap().id, memory.id);
        assert!(scorer.select_best(&[memory], &far).is_none());
    }

    #[test]
    fn test_closer_memory_wins() {
        let scorer = MemoryScorer::default();
        let near = memory_north(5.0, 100.0);
        let far = memory_north(50.0, 100.0);

        let best = scorer.select_best(&[far, near.clone()], &origin()).unwrap();
        assert_eq!(best.id, near.id);
    }

    #[test]
    fn test_closer_wins_even_against_owner_boost() {
        let scorer = MemoryScorer::default();
        let me = Uuid::new_v4();
        let viewer = Viewer::new(me);

        let near = memory_north(5.0, 100.0);
        let mine_far = memory_north(50.0, 100.0).with_author(me);

        let best = scorer
            .select_best_for(&[mine_far, near.clone()], &origin(), &viewer)
            .unwrap();
        assert_eq!(best.memory.id, near.id);
    }

    #[test]
    fn test_owner_boost_breaks_same_bucket_tie() {
        let scorer = MemoryScorer::default();
        let me = Uuid::new_v4();
        let viewer = Viewer::new(me);

        let created = Utc::now();
        let mine = memory_north(5.2, 100.0).with_author(me).with_created_at(created);
        let theirs = memory_north(5.1, 100.0).with_created_at(created);

        let ranked = scorer.rank(&[theirs, mine.clone()], &origin(), Some(&viewer));
        assert_eq!(ranked[0].memory.id, mine.id);
        assert!(ranked[0].is_owner);
    }

    #[test]
    fn test_tie_broken_by_most_recent() {
        let scorer = MemoryScorer::new(ScoringConfig {
            freshness_weight: 0.0,
            ..ScoringConfig::default()
        });
        let now = Utc::now();
        let older = Memory::new("old", 37.8720, -122.2580, 20.0)
            .with_audio("https://a/old.mp3")
            .with_created_at(now - Duration::days(3));
        let newer = Memory::new("new", 37.8720, -122.2580, 20.0)
            .with_audio("https://a/new.mp3")
            .with_created_at(now);

        for candidates in [[older.clone(), newer.clone()], [newer.clone(), older.clone()]] {
            let best = scorer.select_best(&candidates, &origin()).unwrap();
            assert_eq!(best.id, newer.id);
        }
    }

    #[test]
    fn test_full_tie_ordered_by_id() {
        let scorer = MemoryScorer::default();
        let created = Utc::now();
        let a = Memory::new("a", 37.8720, -122.2580, 20.0)
            .with_audio("https://a/a.mp3")
            .with_created_at(created);
        let b = Memory {
            id: Uuid::new_v4(),
            ..a.clone()
        };
        let expected = a.id.min(b.id);

        assert_eq!(scorer.select_best(&[a.clone(), b.clone()], &origin()).unwrap().id, expected);
        assert_eq!(scorer.select_best(&[b, a], &origin()).unwrap().id, expected);
    }

    #[test]
    fn test_rank_filters_privacy_for_viewer() {
        let scorer = MemoryScorer::default();
        let viewer = Viewer::new(Uuid::new_v4());
        let private = memory_north(5.0, 50.0)
            .with_author(Uuid::new_v4())
            .with_privacy(Privacy::Private);

        assert!(scorer.rank(&[private.clone()], &origin(), Some(&viewer)).is_empty());
        assert_eq!(scorer.rank(&[private], &origin(), None).len(), 1);
    }

    #[test]
    fn test_rank_never_returns_out_of_range_or_silent() {
        let scorer = MemoryScorer::default();
        let candidates = vec![
            memory_north(5.0, 10.0),
            memory_north(15.0, 10.0),
            memory_north(30.0, 40.0),
            Memory::new("silent", 37.8720, -122.2580, 100.0),
        ];

        let ranked = scorer.rank(&candidates, &origin(), None);
        assert_eq!(ranked.len(), 2);
        for scored in &ranked {
            assert!(scored.memory.is_playable());
            assert!(scored.distance_m <= scored.memory.radius_m);
        }
        assert!(ranked[0].distance_m <= ranked[1].distance_m);
    }

    #[test]
    fn test_freshness_decays_with_age() {
        let scorer = MemoryScorer::default();
        let now = Utc::now();
        let fresh = memory_north(0.0, 10.0).with_created_at(now);
        let stale = memory_north(0.0, 10.0).with_created_at(now - Duration::days(60));

        let fresh_score = scorer.score(&fresh, 0.0, false, false, now);
        let stale_score = scorer.score(&stale, 0.0, false, false, now);
        assert!(fresh_score > stale_score);
    }
}
