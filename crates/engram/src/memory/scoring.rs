//! Importance scoring and time decay
//!
//! Scores assign each note a [0, 1] importance from its section and content
//! signals. Decay then erodes that importance over time, slowed by access:
//!
//! ```text
//! access_bonus = min(0.5, access_count * 0.05)
//! age_factor   = 1 / (1 + days_since_created * 0.01)
//! staleness    = days_since_last_accessed * decay_rate
//! decayed      = clamp((importance - staleness + access_bonus) * age_factor, 0, 1)
//! ```
//!
//! For a fixed access count the decayed value is non-increasing as the time
//! since last access grows.

use chrono::{DateTime, Utc};

use crate::memory::types::{Note, Section};

const SECONDS_PER_DAY: f32 = 86_400.0;

/// Phrases that mark identity and preference statements
const IDENTITY_PATTERNS: [&str; 10] = [
    "my name is",
    "i am ",
    "i'm ",
    "user's name",
    "user is",
    "i prefer",
    "user prefers",
    "i like",
    "i don't like",
    "i always",
];

/// Phrases that mark project and decision statements
const PROJECT_PATTERNS: [&str; 8] = [
    "decided",
    "decision",
    "working on",
    "project",
    "deadline",
    "plan to",
    "we will",
    "milestone",
];

/// Configuration for scoring and classification thresholds
#[derive(Debug, Clone, Copy)]
pub struct ScorerConfig {
    /// Score at or above which content classifies as core
    pub core_threshold: f32,
    /// Score at or above which content classifies as high
    pub high_threshold: f32,
    /// Score at or above which content classifies as medium
    pub medium_threshold: f32,
    /// Decayed importance below which a note is an archival candidate
    pub archive_threshold: f32,
    /// Raw importance at or above which a note is a promotion candidate
    pub promotion_threshold: f32,
    /// Decayed importance required for inclusion in context assembly
    pub retrieval_threshold: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            core_threshold: 0.8,
            high_threshold: 0.6,
            medium_threshold: 0.35,
            archive_threshold: 0.05,
            promotion_threshold: 0.8,
            retrieval_threshold: 0.2,
        }
    }
}

/// Classification buckets for a raw importance score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceClass {
    Core,
    High,
    Medium,
    Low,
}

/// Scores content importance and applies time decay.
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    config: ScorerConfig,
}

impl ImportanceScorer {
    /// Create a scorer with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer with custom thresholds
    pub fn with_config(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score content importance in [0, 1].
    ///
    /// The section contributes a base weight; identity/preference phrasing
    /// and project/decision phrasing add fixed bonuses; concrete tokens
    /// (dates, URLs, version strings) add a small bonus each. An optional
    /// hint from the extraction agent can only raise the result.
    pub fn score(&self, content: &str, section: Section, hint: Option<f32>) -> f32 {
        let lower = content.to_lowercase();

        let mut score = match section {
            Section::ImportantFacts => 0.5,
            Section::PeopleEntities => 0.45,
            Section::OngoingThreads => 0.4,
            Section::KeyTopics => 0.35,
            Section::FileKnowledge => 0.3,
        };

        if IDENTITY_PATTERNS.iter().any(|p| lower.contains(p)) {
            score += 0.4;
        }

        if PROJECT_PATTERNS.iter().any(|p| lower.contains(p)) {
            score += 0.3;
        }

        score += 0.08 * specific_token_signals(&lower) as f32;

        if let Some(hint) = hint {
            score = score.max(hint);
        }

        score.clamp(0.0, 1.0)
    }

    /// Classify a raw score into a bucket
    pub fn classify(&self, score: f32) -> ImportanceClass {
        if score >= self.config.core_threshold {
            ImportanceClass::Core
        } else if score >= self.config.high_threshold {
            ImportanceClass::High
        } else if score >= self.config.medium_threshold {
            ImportanceClass::Medium
        } else {
            ImportanceClass::Low
        }
    }

    /// Compute the decayed importance of a note at `now`.
    ///
    /// Does not mutate the note; maintenance passes persist the result
    /// explicitly.
    pub fn decay(&self, note: &Note, now: DateTime<Utc>) -> f32 {
        let days_since_created =
            ((now - note.created_at).num_seconds().max(0) as f32) / SECONDS_PER_DAY;
        let days_since_accessed =
            ((now - note.last_accessed).num_seconds().max(0) as f32) / SECONDS_PER_DAY;

        let access_bonus = (note.access_count as f32 * 0.05).min(0.5);
        let age_factor = 1.0 / (1.0 + days_since_created * 0.01);
        let staleness = days_since_accessed * note.decay_rate;

        ((note.importance - staleness + access_bonus) * age_factor).clamp(0.0, 1.0)
    }

    /// Notes whose decayed importance has fallen below the archive threshold
    pub fn archival_candidates<'a>(
        &self,
        notes: &'a [Note],
        now: DateTime<Utc>,
    ) -> Vec<&'a Note> {
        notes
            .iter()
            .filter(|n| self.decay(n, now) < self.config.archive_threshold)
            .collect()
    }

    /// Notes whose raw importance qualifies them for core promotion
    pub fn promotion_candidates<'a>(&self, notes: &'a [Note]) -> Vec<&'a Note> {
        notes
            .iter()
            .filter(|n| n.importance >= self.config.promotion_threshold)
            .collect()
    }

    /// Whether a note should be included in context assembly
    pub fn should_retrieve(&self, note: &Note, now: DateTime<Utc>) -> bool {
        self.decay(note, now) >= self.config.retrieval_threshold
    }
}

/// Count concrete-token signals: years, URLs, version strings
fn specific_token_signals(lower: &str) -> usize {
    let mut signals = 0;
    if contains_year(lower) {
        signals += 1;
    }
    if lower.contains("http://") || lower.contains("https://") || lower.contains("www.") {
        signals += 1;
    }
    if contains_version(lower) {
        signals += 1;
    }
    signals
}

/// A four-digit year starting 19xx or 20xx
fn contains_year(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.windows(4).any(|w| {
        (w.starts_with(b"19") || w.starts_with(b"20")) && w.iter().all(u8::is_ascii_digit)
    })
}

/// A `digit.digit` fragment, as in "2.1" or "v0.23.0"
fn contains_version(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes
        .windows(3)
        .any(|w| w[0].is_ascii_digit() && w[1] == b'.' && w[2].is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn note_with(
        importance: f32,
        decay_rate: f32,
        access_count: u32,
        created_days_ago: i64,
        accessed_days_ago: i64,
    ) -> Note {
        let now = Utc::now();
        let content = format!(
            "Decay test note imp={importance} rate={decay_rate} acc={access_count} \
             age={created_days_ago} stale={accessed_days_ago}"
        );
        let mut note = Note::new(content, Section::ImportantFacts);
        note.importance = importance;
        note.decay_rate = decay_rate;
        note.access_count = access_count;
        note.created_at = now - Duration::days(created_days_ago);
        note.last_accessed = now - Duration::days(accessed_days_ago);
        note
    }

    #[test]
    fn test_identity_content_scores_high() {
        let scorer = ImportanceScorer::new();

        let identity = scorer.score("My name is Alice", Section::ImportantFacts, None);
        let mundane = scorer.score("The weather was fine", Section::ImportantFacts, None);

        assert!(identity > mundane);
        assert!(identity >= 0.8, "identity statement should reach core band");
    }

    #[test]
    fn test_project_content_gets_bonus() {
        let scorer = ImportanceScorer::new();

        let project = scorer.score(
            "We decided to ship the parser rewrite next sprint",
            Section::OngoingThreads,
            None,
        );
        let idle = scorer.score("Lunch was pleasant", Section::OngoingThreads, None);

        assert!(project > idle);
    }

    #[test]
    fn test_specific_tokens_add_signal() {
        let scorer = ImportanceScorer::new();

        let with_tokens = scorer.score(
            "Released 2.1 in 2026, docs at https://example.com",
            Section::FileKnowledge,
            None,
        );
        let without = scorer.score("Released a new version", Section::FileKnowledge, None);

        assert!(with_tokens > without);
    }

    #[test]
    fn test_hint_only_raises() {
        let scorer = ImportanceScorer::new();

        let base = scorer.score("A plain remark", Section::KeyTopics, None);
        let hinted_up = scorer.score("A plain remark", Section::KeyTopics, Some(0.9));
        let hinted_down = scorer.score("A plain remark", Section::KeyTopics, Some(0.0));

        assert_eq!(hinted_up, 0.9);
        assert_eq!(hinted_down, base);
    }

    #[test]
    fn test_score_clamped() {
        let scorer = ImportanceScorer::new();
        let score = scorer.score(
            "My name is Alice and we decided the project ships v2.1 in 2026 via https://x.com",
            Section::ImportantFacts,
            Some(2.0),
        );
        assert!(score <= 1.0);
    }

    #[test]
    fn test_classify_thresholds() {
        let scorer = ImportanceScorer::new();
        assert_eq!(scorer.classify(0.85), ImportanceClass::Core);
        assert_eq!(scorer.classify(0.8), ImportanceClass::Core);
        assert_eq!(scorer.classify(0.7), ImportanceClass::High);
        assert_eq!(scorer.classify(0.5), ImportanceClass::Medium);
        assert_eq!(scorer.classify(0.35), ImportanceClass::Medium);
        assert_eq!(scorer.classify(0.1), ImportanceClass::Low);
    }

    #[test]
    fn test_decay_monotone_in_staleness() {
        let scorer = ImportanceScorer::new();
        let now = Utc::now();

        let mut previous = f32::MAX;
        for accessed_days_ago in [0, 5, 10, 20, 40, 80, 160] {
            let note = note_with(0.8, 0.01, 3, 200, accessed_days_ago);
            let decayed = scorer.decay(&note, now);
            assert!(
                decayed <= previous,
                "decay must be non-increasing with staleness: {decayed} after {previous}"
            );
            previous = decayed;
        }
    }

    #[test]
    fn test_access_slows_decay() {
        let scorer = ImportanceScorer::new();
        let now = Utc::now();

        let untouched = note_with(0.5, 0.01, 0, 60, 30);
        let well_used = note_with(0.5, 0.01, 8, 60, 30);

        assert!(scorer.decay(&well_used, now) > scorer.decay(&untouched, now));
    }

    #[test]
    fn test_access_bonus_caps_at_half() {
        let scorer = ImportanceScorer::new();
        let now = Utc::now();

        let ten = note_with(0.4, 0.01, 10, 30, 10);
        let thousand = note_with(0.4, 0.01, 1000, 30, 10);

        assert_eq!(scorer.decay(&ten, now), scorer.decay(&thousand, now));
    }

    #[test]
    fn test_decay_clamped_to_unit_interval() {
        let scorer = ImportanceScorer::new();
        let now = Utc::now();

        let floor = note_with(0.1, 0.05, 0, 400, 400);
        assert_eq!(scorer.decay(&floor, now), 0.0);

        let fresh = note_with(1.0, 0.01, 20, 0, 0);
        assert!(scorer.decay(&fresh, now) <= 1.0);
    }

    #[test]
    fn test_stale_low_importance_note_is_archival_candidate() {
        let scorer = ImportanceScorer::new();
        let now = Utc::now();

        let stale = note_with(0.5, 0.01, 0, 120, 40);
        let fresh = note_with(0.5, 0.01, 0, 0, 0);
        let notes = vec![stale.clone(), fresh];

        let decayed = scorer.decay(&stale, now);
        assert!(decayed < 0.05, "expected decay below threshold, got {decayed}");

        let candidates = scorer.archival_candidates(&notes, now);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, stale.id);
    }

    #[test]
    fn test_promotion_candidates_use_raw_importance() {
        let scorer = ImportanceScorer::new();

        let high = note_with(0.9, 0.01, 0, 300, 300);
        let low = note_with(0.5, 0.01, 0, 0, 0);
        let notes = vec![high.clone(), low];

        let candidates = scorer.promotion_candidates(&notes);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, high.id);
    }

    #[test]
    fn test_should_retrieve_gates_on_decayed_value() {
        let scorer = ImportanceScorer::new();
        let now = Utc::now();

        let live = note_with(0.6, 0.01, 2, 10, 1);
        let faded = note_with(0.3, 0.01, 0, 200, 90);

        assert!(scorer.should_retrieve(&live, now));
        assert!(!scorer.should_retrieve(&faded, now));
    }
}
