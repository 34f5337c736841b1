//! Per-user preference learning
//!
//! Tracks learned preferences, domain expertise, and a bounded satisfaction
//! history per user, with a lifecycle independent from conversation memory.
//! Confidence in a preference only rises through corroborating evidence and
//! decays monotonically while it goes uncorroborated; a preference that has
//! not met the evidence threshold is advisory-only and is never exposed as
//! authoritative to callers.

use crate::error::{MemoriaError, MemoriaResult};
use crate::events::EventSink;
use crate::scoring::term_set;
use crate::storage::{preference_key, preference_prefix};
use crate::store::DurableWriter;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One observed preference signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceSignal {
    /// Preference category (e.g. "citation_style_preference")
    pub key: String,

    /// Candidate value for the category
    pub value: String,

    /// Signal strength in (0.0, 1.0]
    pub strength: f64,

    /// Optional domain this signal is evidence of expertise in
    pub domain: Option<String>,
}

impl PreferenceSignal {
    /// Create a signal
    pub fn new(key: impl Into<String>, value: impl Into<String>, strength: f64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            strength,
            domain: None,
        }
    }

    /// Attach a domain-expertise dimension
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Reject malformed signals before any state is touched
    pub fn validate(&self) -> MemoriaResult<()> {
        if self.key.trim().is_empty() {
            return Err(MemoriaError::invalid_signal("key", "must not be empty"));
        }
        if self.value.trim().is_empty() {
            return Err(MemoriaError::invalid_signal("value", "must not be empty"));
        }
        if !self.strength.is_finite() || self.strength <= 0.0 || self.strength > 1.0 {
            return Err(MemoriaError::invalid_signal(
                "strength",
                format!("must be in (0.0, 1.0], got {}", self.strength),
            ));
        }
        Ok(())
    }
}

/// One learned preference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    /// Owning user
    pub user_id: String,

    /// Preference category
    pub key: String,

    /// Current best value for the category
    pub value: String,

    /// Confidence in the value (0.0 to 1.0)
    pub confidence: f64,

    /// Number of corroborating signals behind the current value
    pub evidence_count: u32,

    /// Last corroboration time
    pub updated_at: chrono::DateTime<chrono::Utc>,

    /// Last time the passive decay pass touched this preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decayed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregate per-user state owned by the learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Owning user
    pub user_id: String,

    /// Learned preferences by category
    pub preferences: HashMap<String, UserPreference>,

    /// Domain → expertise level (0.0 to 1.0)
    pub expertise: HashMap<String, f64>,

    /// Rolling window of satisfaction scores, most recent last
    pub satisfaction: VecDeque<f64>,

    /// Last profile mutation
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UserProfile {
    fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            preferences: HashMap::new(),
            expertise: HashMap::new(),
            satisfaction: VecDeque::new(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Mean satisfaction over the rolling window, if any
    pub fn mean_satisfaction(&self) -> Option<f64> {
        if self.satisfaction.is_empty() {
            None
        } else {
            Some(self.satisfaction.iter().sum::<f64>() / self.satisfaction.len() as f64)
        }
    }
}

/// Target complexity for generated responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    /// Assume little background
    Introductory,
    /// Working familiarity
    Intermediate,
    /// Full technical depth
    Advanced,
}

impl ComplexityLevel {
    fn from_level(level: f64) -> Self {
        if level < 0.34 {
            ComplexityLevel::Introductory
        } else if level < 0.67 {
            ComplexityLevel::Intermediate
        } else {
            ComplexityLevel::Advanced
        }
    }

    fn stepped_down(self) -> Self {
        match self {
            ComplexityLevel::Advanced => ComplexityLevel::Intermediate,
            _ => ComplexityLevel::Introductory,
        }
    }
}

/// Structured hint set handed to the generation pipeline. The subsystem does
/// not act on these itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationHints {
    /// Domains the user knows, strongest (and most query-relevant) first
    pub preferred_domains: Vec<String>,

    /// Suggested response complexity
    pub complexity: ComplexityLevel,

    /// Authoritative formatting/style preferences by category
    pub format_preferences: HashMap<String, String>,
}

impl Default for PersonalizationHints {
    fn default() -> Self {
        Self {
            preferred_domains: Vec::new(),
            complexity: ComplexityLevel::Intermediate,
            format_preferences: HashMap::new(),
        }
    }
}

/// Tuning for [`PreferenceLearner`]
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Fraction of the remaining confidence gap closed per corroboration
    pub learning_rate: f64,

    /// Confidence bled per contradicting signal (scaled by strength)
    pub contradiction_rate: f64,

    /// Confidence below which a contradicted value is replaced
    pub replace_floor: f64,

    /// Corroborations required before a preference is authoritative
    pub min_evidence: u32,

    /// Idle time after which confidence starts to decay; also the decay
    /// half-life
    pub retention_window: std::time::Duration,

    /// Confidence required for a preference to appear in hints
    pub hint_confidence: f64,

    /// Rolling satisfaction window length
    pub satisfaction_window: usize,

    /// Expertise gained per domain-tagged signal (scaled by strength)
    pub expertise_rate: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            contradiction_rate: 0.3,
            replace_floor: 0.2,
            min_evidence: 3,
            retention_window: std::time::Duration::from_secs(30 * 24 * 60 * 60),
            hint_confidence: 0.5,
            satisfaction_window: 20,
            expertise_rate: 0.1,
        }
    }
}

/// Learns and serves per-user preference state
pub struct PreferenceLearner {
    writer: Arc<DurableWriter>,
    profiles: DashMap<String, Arc<tokio::sync::Mutex<UserProfile>>>,
    events: Arc<dyn EventSink>,
    config: LearnerConfig,
}

impl PreferenceLearner {
    pub(crate) fn new(
        writer: Arc<DurableWriter>,
        events: Arc<dyn EventSink>,
        config: LearnerConfig,
    ) -> Self {
        Self {
            writer,
            profiles: DashMap::new(),
            events,
            config,
        }
    }

    fn profile_slot(&self, user_id: &str) -> Arc<tokio::sync::Mutex<UserProfile>> {
        self.profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(UserProfile::new(user_id))))
            .clone()
    }

    fn persist_preference(&self, preference: &UserPreference) {
        if let Ok(value) = serde_json::to_value(preference) {
            self.writer
                .spawn_set(preference_key(&preference.user_id, &preference.key), value);
        }
    }

    /// Fold one signal into the user's profile. Malformed signals are
    /// rejected synchronously with no partial mutation.
    pub async fn record_signal(&self, user_id: &str, signal: PreferenceSignal) -> MemoriaResult<()> {
        signal.validate()?;

        let slot = self.profile_slot(user_id);
        let mut profile = slot.lock().await;
        let now = chrono::Utc::now();

        let preference = match profile.preferences.get_mut(&signal.key) {
            None => {
                let preference = UserPreference {
                    user_id: user_id.to_string(),
                    key: signal.key.clone(),
                    value: signal.value.clone(),
                    confidence: (self.config.learning_rate * signal.strength).clamp(0.0, 1.0),
                    evidence_count: 1,
                    updated_at: now,
                    last_decayed_at: None,
                };
                profile.preferences.insert(signal.key.clone(), preference.clone());
                preference
            }
            Some(existing) if existing.value == signal.value => {
                // corroboration: close part of the remaining gap, never decrease
                let gain = self.config.learning_rate * signal.strength * (1.0 - existing.confidence);
                existing.confidence = (existing.confidence + gain).clamp(0.0, 1.0);
                existing.evidence_count += 1;
                existing.updated_at = now;
                existing.last_decayed_at = None;
                existing.clone()
            }
            Some(existing) => {
                // contradiction bleeds confidence; a sufficiently weakened
                // value is replaced by the new one with fresh evidence
                existing.confidence =
                    (existing.confidence - self.config.contradiction_rate * signal.strength).max(0.0);
                if existing.confidence < self.config.replace_floor {
                    existing.value = signal.value.clone();
                    existing.confidence =
                        (self.config.learning_rate * signal.strength).clamp(0.0, 1.0);
                    existing.evidence_count = 1;
                }
                existing.updated_at = now;
                existing.clone()
            }
        };

        if let Some(domain) = &signal.domain {
            let level = profile.expertise.entry(domain.clone()).or_insert(0.0);
            *level = (*level + self.config.expertise_rate * signal.strength).min(1.0);
        }
        profile.updated_at = now;
        drop(profile);

        self.persist_preference(&preference);
        Ok(())
    }

    /// Record an end-user satisfaction score in [0.0, 1.0]
    pub async fn record_satisfaction(&self, user_id: &str, score: f64) -> MemoriaResult<()> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(MemoriaError::invalid_signal(
                "satisfaction",
                format!("must be in [0.0, 1.0], got {}", score),
            ));
        }

        let slot = self.profile_slot(user_id);
        let mut profile = slot.lock().await;
        profile.satisfaction.push_back(score);
        while profile.satisfaction.len() > self.config.satisfaction_window {
            profile.satisfaction.pop_front();
        }
        profile.updated_at = chrono::Utc::now();

        Ok(())
    }

    /// Authoritative preferences: confidence at or above `min_confidence` AND
    /// evidence at or above the configured threshold, strongest first.
    pub async fn get_preferences(&self, user_id: &str, min_confidence: f64) -> Vec<UserPreference> {
        let slot = self.profile_slot(user_id);
        let profile = slot.lock().await;

        let mut preferences: Vec<UserPreference> = profile
            .preferences
            .values()
            .filter(|p| p.confidence >= min_confidence && p.evidence_count >= self.config.min_evidence)
            .cloned()
            .collect();

        preferences.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        preferences
    }

    /// Passive decay pass: preferences idle past the retention window lose
    /// confidence on an exponential half-life. Never increases confidence.
    /// Returns the number of preferences decayed.
    pub async fn decay_confidence(&self) -> usize {
        let now = chrono::Utc::now();
        let window = chrono::Duration::from_std(self.config.retention_window)
            .unwrap_or_else(|_| chrono::Duration::days(30));
        let half_life_secs = self.config.retention_window.as_secs_f64().max(1.0);

        let slots: Vec<Arc<tokio::sync::Mutex<UserProfile>>> =
            self.profiles.iter().map(|e| e.value().clone()).collect();

        let mut decayed = 0;
        for slot in slots {
            let mut profile = slot.lock().await;
            let mut touched: Vec<UserPreference> = Vec::new();

            for preference in profile.preferences.values_mut() {
                let decay_start = preference.updated_at + window;
                if now <= decay_start {
                    continue;
                }

                let from = preference
                    .last_decayed_at
                    .map(|d| d.max(decay_start))
                    .unwrap_or(decay_start);
                let elapsed = (now - from).to_std().unwrap_or_default().as_secs_f64();
                if elapsed <= 0.0 {
                    continue;
                }

                let factor = 0.5_f64.powf(elapsed / half_life_secs);
                preference.confidence *= factor;
                preference.last_decayed_at = Some(now);
                touched.push(preference.clone());
                decayed += 1;
            }
            drop(profile);

            for preference in &touched {
                self.persist_preference(preference);
            }
        }

        if decayed > 0 {
            tracing::debug!(decayed, "decayed stale preference confidence");
            self.events
                .emit("preferences_decayed", vec![("count".into(), decayed.to_string())]);
        }

        decayed
    }

    /// Personalization hints for the caller to weight retrieval/generation.
    /// This subsystem never performs retrieval itself.
    pub async fn get_personalized_context(&self, user_id: &str, query: &str) -> PersonalizationHints {
        let slot = self.profile_slot(user_id);
        let profile = slot.lock().await;

        let query_terms = term_set(query);

        let mut domains: Vec<(&String, f64)> = profile
            .expertise
            .iter()
            .map(|(domain, &level)| {
                let relevance = if term_set(domain).iter().any(|t| query_terms.contains(t)) {
                    0.25
                } else {
                    0.0
                };
                (domain, level + relevance)
            })
            .filter(|(_, weight)| *weight > 0.1)
            .collect();
        domains.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let preferred_domains: Vec<String> =
            domains.iter().take(3).map(|(d, _)| (*d).clone()).collect();

        let expertise_basis = if domains.is_empty() {
            0.5
        } else {
            domains.iter().map(|(_, w)| *w).sum::<f64>() / domains.len() as f64
        };
        let mut complexity = ComplexityLevel::from_level(expertise_basis);
        if profile.mean_satisfaction().map(|m| m < 0.4).unwrap_or(false) {
            // a struggling user gets simpler output regardless of expertise
            complexity = complexity.stepped_down();
        }

        let format_preferences: HashMap<String, String> = profile
            .preferences
            .values()
            .filter(|p| {
                p.confidence >= self.config.hint_confidence
                    && p.evidence_count >= self.config.min_evidence
                    && (p.key.contains("format") || p.key.contains("style"))
            })
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect();

        PersonalizationHints {
            preferred_domains,
            complexity,
            format_preferences,
        }
    }

    /// Rehydrate a user's preferences from the durable tier. Corrupt records
    /// are skipped and logged. Returns the number of preferences loaded.
    pub async fn load_user(&self, user_id: &str) -> MemoriaResult<usize> {
        let records = self
            .writer
            .durable()
            .scan_prefix(&preference_prefix(user_id))
            .await?;

        let slot = self.profile_slot(user_id);
        let mut profile = slot.lock().await;
        let mut loaded = 0;

        for (key, value) in records {
            match serde_json::from_value::<UserPreference>(value) {
                Ok(preference) => {
                    profile.preferences.insert(preference.key.clone(), preference);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping corrupt preference record");
                    self.events
                        .emit("corrupt_preference_skipped", vec![("key".into(), key)]);
                }
            }
        }

        Ok(loaded)
    }

    /// Read-shared snapshot of a user's profile
    pub async fn profile(&self, user_id: &str) -> Option<UserProfile> {
        let slot = self.profiles.get(user_id)?.clone();
        let profile = slot.lock().await;
        Some(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::storage::InMemoryDurableStore;

    fn learner() -> PreferenceLearner {
        learner_with(LearnerConfig::default())
    }

    fn learner_with(config: LearnerConfig) -> PreferenceLearner {
        let durable = Arc::new(InMemoryDurableStore::new());
        let writer = DurableWriter::new(durable, Arc::new(NullEventSink), 2);
        PreferenceLearner::new(writer, Arc::new(NullEventSink), config)
    }

    #[tokio::test]
    async fn test_invalid_signal_rejected_without_mutation() {
        let learner = learner();

        let err = learner
            .record_signal("user-1", PreferenceSignal::new("", "value", 0.5))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidSignal { .. }));

        let err = learner
            .record_signal("user-1", PreferenceSignal::new("key", "value", 1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidSignal { .. }));

        let profile = learner.profile("user-1").await;
        assert!(profile.map(|p| p.preferences.is_empty()).unwrap_or(true));
    }

    #[tokio::test]
    async fn test_corroboration_never_decreases_confidence() {
        let learner = learner();
        let mut last = 0.0;

        for _ in 0..5 {
            learner
                .record_signal(
                    "user-1",
                    PreferenceSignal::new("citation_style_preference", "apa", 0.8),
                )
                .await
                .unwrap();

            let profile = learner.profile("user-1").await.unwrap();
            let confidence = profile.preferences["citation_style_preference"].confidence;
            assert!(confidence >= last);
            assert!(confidence <= 1.0);
            last = confidence;
        }
    }

    #[tokio::test]
    async fn test_exposure_requires_evidence_threshold() {
        let learner = learner();
        let signal = PreferenceSignal::new("citation_style_preference", "apa", 1.0);

        // two corroborating signals: confidence is high but evidence is short
        learner.record_signal("user-1", signal.clone()).await.unwrap();
        learner.record_signal("user-1", signal.clone()).await.unwrap();
        assert!(learner.get_preferences("user-1", 0.5).await.is_empty());

        // third signal crosses the evidence threshold
        learner.record_signal("user-1", signal).await.unwrap();
        let preferences = learner.get_preferences("user-1", 0.5).await;
        assert_eq!(preferences.len(), 1);
        assert_eq!(preferences[0].value, "apa");
        assert!(preferences[0].confidence >= 0.5);
    }

    #[tokio::test]
    async fn test_exposure_respects_min_confidence() {
        let learner = learner();
        let signal = PreferenceSignal::new("verbosity", "terse", 0.3);

        for _ in 0..4 {
            learner.record_signal("user-1", signal.clone()).await.unwrap();
        }

        let confidence = learner.profile("user-1").await.unwrap().preferences["verbosity"].confidence;
        let below = learner.get_preferences("user-1", confidence + 0.01).await;
        assert!(below.is_empty());

        let at = learner.get_preferences("user-1", confidence).await;
        assert_eq!(at.len(), 1);
    }

    #[tokio::test]
    async fn test_contradiction_bleeds_then_replaces() {
        let learner = learner();

        for _ in 0..3 {
            learner
                .record_signal("user-1", PreferenceSignal::new("theme", "dark", 1.0))
                .await
                .unwrap();
        }
        let before = learner.profile("user-1").await.unwrap().preferences["theme"].confidence;

        // contradictions erode the held value
        for _ in 0..3 {
            learner
                .record_signal("user-1", PreferenceSignal::new("theme", "light", 1.0))
                .await
                .unwrap();
        }

        let profile = learner.profile("user-1").await.unwrap();
        let preference = &profile.preferences["theme"];
        assert_eq!(preference.value, "light");
        assert_eq!(preference.evidence_count, 1);
        assert!(preference.confidence < before);
    }

    #[tokio::test]
    async fn test_decay_reduces_stale_confidence_only() {
        let config = LearnerConfig {
            retention_window: std::time::Duration::from_secs(60 * 60),
            ..LearnerConfig::default()
        };
        let learner = learner_with(config);

        learner
            .record_signal("user-1", PreferenceSignal::new("stale", "v", 1.0))
            .await
            .unwrap();
        learner
            .record_signal("user-1", PreferenceSignal::new("fresh", "v", 1.0))
            .await
            .unwrap();

        // age the stale preference past the window
        {
            let slot = learner.profile_slot("user-1");
            let mut profile = slot.lock().await;
            let preference = profile.preferences.get_mut("stale").unwrap();
            preference.updated_at = chrono::Utc::now() - chrono::Duration::hours(3);
        }

        let decayed = learner.decay_confidence().await;
        assert_eq!(decayed, 1);

        let profile = learner.profile("user-1").await.unwrap();
        assert!(profile.preferences["stale"].confidence < 0.5);
        assert!((profile.preferences["fresh"].confidence - 0.5).abs() < 1e-9);

        // a second pass never increases confidence
        let after_first = profile.preferences["stale"].confidence;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        learner.decay_confidence().await;
        let profile = learner.profile("user-1").await.unwrap();
        assert!(profile.preferences["stale"].confidence <= after_first);
    }

    #[tokio::test]
    async fn test_satisfaction_window_is_bounded() {
        let config = LearnerConfig {
            satisfaction_window: 5,
            ..LearnerConfig::default()
        };
        let learner = learner_with(config);

        for n in 0..12 {
            learner
                .record_satisfaction("user-1", (n % 2) as f64)
                .await
                .unwrap();
        }

        let profile = learner.profile("user-1").await.unwrap();
        assert_eq!(profile.satisfaction.len(), 5);

        let err = learner.record_satisfaction("user-1", 1.5).await.unwrap_err();
        assert!(matches!(err, MemoriaError::InvalidSignal { .. }));
    }

    #[tokio::test]
    async fn test_personalized_hints() {
        let learner = learner();

        for _ in 0..4 {
            learner
                .record_signal(
                    "user-1",
                    PreferenceSignal::new("response_format", "bullet_points", 1.0)
                        .with_domain("databases"),
                )
                .await
                .unwrap();
            learner
                .record_signal(
                    "user-1",
                    PreferenceSignal::new("tone", "direct", 1.0).with_domain("databases"),
                )
                .await
                .unwrap();
        }

        let hints = learner
            .get_personalized_context("user-1", "how should I index this databases table?")
            .await;

        assert_eq!(hints.preferred_domains, vec!["databases".to_string()]);
        assert_eq!(
            hints.format_preferences.get("response_format").map(String::as_str),
            Some("bullet_points")
        );
        // "tone" carries no format/style marker and stays out of format hints
        assert!(!hints.format_preferences.contains_key("tone"));
    }

    #[tokio::test]
    async fn test_load_user_roundtrip() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let writer = DurableWriter::new(durable.clone(), Arc::new(NullEventSink), 2);
        let learner = PreferenceLearner::new(writer, Arc::new(NullEventSink), LearnerConfig::default());

        let signal = PreferenceSignal::new("citation_style_preference", "apa", 1.0);
        for _ in 0..3 {
            learner.record_signal("user-1", signal.clone()).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // a fresh learner over the same durable tier sees the preference
        let writer = DurableWriter::new(durable, Arc::new(NullEventSink), 2);
        let rehydrated =
            PreferenceLearner::new(writer, Arc::new(NullEventSink), LearnerConfig::default());
        let loaded = rehydrated.load_user("user-1").await.unwrap();
        assert_eq!(loaded, 1);

        let preferences = rehydrated.get_preferences("user-1", 0.5).await;
        assert_eq!(preferences.len(), 1);
        assert_eq!(preferences[0].value, "apa");
    }
}
