// ── Summarizer / Retention Engine ───────────────────────────────────────────
//
// Folds old interactions into dated digests and decides what stays in the
// working set.
//
//   summarize     - bucket by local calendar date → one DailySummary per day
//   extract_*     - keyword rules (injectable, case-insensitive substring)
//   cleanup       - split at `now - max_age_days`: old → one PeriodSummary,
//                   new → retained (capped at `max_interactions`)
//
// Pure computation: no I/O, no locking. The facade owns persistence.

use crate::atoms::types::{DailySummary, Interaction, PeriodSummary, SummaryPeriod};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Rule table ─────────────────────────────────────────────────────────────

/// Any keyword present in an interaction tags its day with `topic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRule {
    pub topic: String,
    pub keywords: Vec<String>,
}

impl TopicRule {
    pub fn new(topic: &str, keywords: &[&str]) -> Self {
        Self {
            topic: topic.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryRules {
    pub topics: Vec<TopicRule>,
    /// An interaction containing any of these is kept verbatim as a key point.
    pub key_point_keywords: Vec<String>,
}

impl Default for SummaryRules {
    fn default() -> Self {
        Self {
            topics: vec![
                TopicRule::new("weather", &["weather"]),
                TopicRule::new("time", &["time", "schedule"]),
                TopicRule::new("search", &["search", "look up"]),
                TopicRule::new("applications", &["application", "app"]),
                TopicRule::new("screen", &["screen", "monitor"]),
            ],
            key_point_keywords: vec!["remember".into(), "note".into(), "important".into()],
        }
    }
}

impl SummaryRules {
    /// Lowercase every keyword so matching is a plain `contains`.
    fn normalized(mut self) -> Self {
        for rule in &mut self.topics {
            for k in &mut rule.keywords {
                *k = k.to_lowercase();
            }
        }
        for k in &mut self.key_point_keywords {
            *k = k.to_lowercase();
        }
        self
    }
}

// ── Retention outcome ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionOutcome {
    /// Interactions at or after the cutoff, chronological, capped.
    pub retained: Vec<Interaction>,
    /// Zero or one summary of everything before the cutoff.
    pub summaries: Vec<PeriodSummary>,
    pub cutoff: DateTime<Utc>,
}

// ── Summarizer ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Summarizer {
    rules: SummaryRules,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new(SummaryRules::default())
    }
}

impl Summarizer {
    pub fn new(rules: SummaryRules) -> Self {
        Self { rules: rules.normalized() }
    }

    pub fn rules(&self) -> &SummaryRules {
        &self.rules
    }

    /// Digest `interactions`. Empty input yields `PeriodSummary::default()`.
    ///
    /// Daily summaries come out sorted by date ascending; within a day the
    /// input order is kept for key points.
    pub fn summarize(&self, interactions: &[Interaction]) -> PeriodSummary {
        if interactions.is_empty() {
            return PeriodSummary::default();
        }

        let mut buckets: BTreeMap<NaiveDate, Vec<Interaction>> = BTreeMap::new();
        for i in interactions {
            buckets.entry(i.local_date()).or_default().push(i.clone());
        }

        // BTreeMap is non-empty here, so first/last exist.
        let period = match (buckets.keys().next(), buckets.keys().next_back()) {
            (Some(&start), Some(&end)) => Some(SummaryPeriod { start, end }),
            _ => None,
        };

        let daily_summaries: Vec<DailySummary> = buckets
            .into_iter()
            .map(|(date, day)| DailySummary {
                date,
                interaction_count: day.len(),
                topics: self.extract_topics(&day),
                key_points: self.extract_key_points(&day),
            })
            .collect();

        debug!(
            "[retention] Summarized {} interactions across {} days",
            interactions.len(),
            daily_summaries.len()
        );

        PeriodSummary {
            period,
            total_interactions: interactions.len(),
            daily_summaries,
        }
    }

    /// Topics whose rule matched at least one interaction.
    pub fn extract_topics(&self, interactions: &[Interaction]) -> BTreeSet<String> {
        let mut topics = BTreeSet::new();
        for i in interactions {
            let text = i.text.to_lowercase();
            for rule in &self.rules.topics {
                if rule.keywords.iter().any(|k| text.contains(k.as_str())) {
                    topics.insert(rule.topic.clone());
                }
            }
        }
        topics
    }

    /// Verbatim text of every interaction mentioning a key-point keyword,
    /// in input order, duplicates kept.
    pub fn extract_key_points(&self, interactions: &[Interaction]) -> Vec<String> {
        interactions
            .iter()
            .filter(|i| {
                let text = i.text.to_lowercase();
                self.rules.key_point_keywords.iter().any(|k| text.contains(k.as_str()))
            })
            .map(|i| i.text.clone())
            .collect()
    }

    pub fn cutoff(now: DateTime<Utc>, max_age_days: u32) -> DateTime<Utc> {
        now - Duration::days(i64::from(max_age_days))
    }

    pub fn cleanup(&self, interactions: Vec<Interaction>, max_age_days: u32, max_interactions: usize) -> RetentionOutcome {
        self.cleanup_at(interactions, max_age_days, max_interactions, Utc::now())
    }

    /// `cleanup` against an explicit clock.
    pub fn cleanup_at(
        &self,
        interactions: Vec<Interaction>,
        max_age_days: u32,
        max_interactions: usize,
        now: DateTime<Utc>,
    ) -> RetentionOutcome {
        let cutoff = Self::cutoff(now, max_age_days);
        let (old, mut retained): (Vec<_>, Vec<_>) =
            interactions.into_iter().partition(|i| i.timestamp < cutoff);

        let summaries = if old.is_empty() {
            Vec::new()
        } else {
            vec![self.summarize(&old)]
        };

        // Stable sort keeps call order for equal timestamps.
        retained.sort_by_key(|i| i.timestamp);
        if retained.len() > max_interactions {
            let excess = retained.len() - max_interactions;
            retained.drain(..excess);
        }

        info!(
            "[retention] Cutoff {}: {} summarized, {} retained",
            cutoff,
            old.len(),
            retained.len()
        );

        RetentionOutcome { retained, summaries, cutoff }
    }
}
