//! Reading Timeline Reconciler
//!
//! Owns the reconciled timeline and the live reading. Three sources feed it:
//!
//! - **Seed**: bulk fetch, replaces the timeline wholesale
//! - **Extend**: periodic poll, prepends strictly newer readings
//! - **Splice**: stream push, updates the live reading and optionally folds
//!   it into the timeline
//!
//! Invariant: the timeline is strictly descending by timestamp, so no two
//! readings share a timestamp, and `last_reading_time` equals the head's
//! timestamp whenever the timeline is non-empty.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;

use super::error::TimelineResult;
use super::normalize::{normalize_batch, normalize_reading, snap_to_minute};
use super::types::{RawReading, Reading};

/// Capacity of the change notification channel
const EVENT_CAPACITY: usize = 256;

/// Whether stream pushes are folded into the timeline
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SplicePolicy {
    /// Only update the live reading
    #[default]
    LiveOnly,
    /// Also insert into the timeline (minute-snapped, overwrite on tie)
    FoldIntoTimeline,
}

impl std::str::FromStr for SplicePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live_only" | "live" => Ok(SplicePolicy::LiveOnly),
            "fold_into_timeline" | "fold" => Ok(SplicePolicy::FoldIntoTimeline),
            other => Err(format!("Unknown splice policy: {}", other)),
        }
    }
}

/// Change notifications for presentation components
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    /// Timeline was replaced by a bulk load
    Seeded { count: usize, dropped: usize },
    /// Newer readings were prepended by a poll
    Extended { added: usize },
    /// A pushed reading was folded into the timeline
    Spliced { reading: Reading, replaced: bool },
    /// The live reading changed
    LiveUpdated { reading: Reading },
    /// A recoverable failure the user should see (network, decode)
    Notice { message: String },
}

/// What a splice did to the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceOutcome {
    /// Policy is live-only; timeline untouched
    LiveOnly,
    /// New head inserted
    Inserted,
    /// Head with the same timestamp overwritten
    Replaced,
    /// Snapped timestamp is older than the head; timeline untouched
    Stale,
}

/// Reconciles bulk, polled and streamed readings into one timeline
#[derive(Debug)]
pub struct Reconciler {
    /// Strictly descending by timestamp
    timeline: Vec<Reading>,
    most_recent: Option<Reading>,
    last_reading_time: Option<i64>,
    policy: SplicePolicy,
    events: broadcast::Sender<TimelineEvent>,
}

impl Reconciler {
    /// Create an empty reconciler
    pub fn new(policy: SplicePolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            timeline: Vec::new(),
            most_recent: None,
            last_reading_time: None,
            policy,
            events,
        }
    }

    /// The reconciled timeline, newest first
    pub fn timeline(&self) -> &[Reading] {
        &self.timeline
    }

    /// Latest reading delivered by the stream, if any
    pub fn most_recent(&self) -> Option<Reading> {
        self.most_recent
    }

    /// Timestamp of the timeline head
    pub fn last_reading_time(&self) -> Option<i64> {
        self.last_reading_time
    }

    pub fn head(&self) -> Option<&Reading> {
        self.timeline.first()
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn splice_policy(&self) -> SplicePolicy {
        self.policy
    }

    /// Forget the live reading, e.g. when leaving live mode
    pub fn clear_live(&mut self) {
        self.most_recent = None;
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TimelineEvent> {
        self.events.subscribe()
    }

    /// Publish a user-visible notice without touching state
    pub fn notice(&self, message: impl Into<String>) {
        self.emit(TimelineEvent::Notice {
            message: message.into(),
        });
    }

    /// Replace the timeline with a bulk load
    ///
    /// The first occurrence of a timestamp wins, which for a descending feed
    /// is the freshest value. An empty batch yields an empty timeline.
    pub fn seed(&mut self, raw: &[RawReading]) -> &[Reading] {
        let (readings, dropped) = normalize_batch(raw);

        let mut seen = HashSet::with_capacity(readings.len());
        let mut timeline: Vec<Reading> = readings
            .into_iter()
            .filter(|r| seen.insert(r.timestamp))
            .collect();
        timeline.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        self.last_reading_time = timeline.first().map(|r| r.timestamp);
        self.timeline = timeline;

        tracing::debug!(
            count = self.timeline.len(),
            dropped,
            last_reading_time = ?self.last_reading_time,
            "Timeline seeded"
        );
        self.emit(TimelineEvent::Seeded {
            count: self.timeline.len(),
            dropped,
        });

        &self.timeline
    }

    /// Prepend readings strictly newer than the current head
    ///
    /// Returns the number of readings added. When nothing is newer the
    /// timeline and `last_reading_time` are left untouched.
    pub fn extend(&mut self, raw: &[RawReading]) -> usize {
        let (readings, dropped) = normalize_batch(raw);
        let bound = self.last_reading_time;

        let mut seen = HashSet::new();
        let mut fresh: Vec<Reading> = readings
            .into_iter()
            .filter(|r| bound.map_or(true, |b| r.timestamp > b))
            .filter(|r| seen.insert(r.timestamp))
            .collect();

        if fresh.is_empty() {
            tracing::trace!(dropped, "Poll returned nothing newer");
            return 0;
        }

        fresh.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let added = fresh.len();
        self.last_reading_time = Some(fresh[0].timestamp);
        self.timeline.splice(0..0, fresh);

        tracing::debug!(
            added,
            dropped,
            last_reading_time = ?self.last_reading_time,
            "Timeline extended"
        );
        self.emit(TimelineEvent::Extended { added });

        added
    }

    /// Apply a stream push
    ///
    /// The live reading is always replaced. Folding into the timeline only
    /// happens under [`SplicePolicy::FoldIntoTimeline`].
    pub fn splice(&mut self, raw: &RawReading) -> TimelineResult<SpliceOutcome> {
        let reading = normalize_reading(raw)?;

        self.most_recent = Some(reading);
        self.emit(TimelineEvent::LiveUpdated { reading });

        if self.policy == SplicePolicy::LiveOnly {
            return Ok(SpliceOutcome::LiveOnly);
        }

        let snapped = Reading::new(reading.value, snap_to_minute(reading.timestamp));
        let outcome = match self.timeline.first().map(|head| head.timestamp) {
            Some(head_ts) if snapped.timestamp == head_ts => {
                self.timeline[0].value = snapped.value;
                SpliceOutcome::Replaced
            }
            Some(head_ts) if snapped.timestamp < head_ts => SpliceOutcome::Stale,
            _ => {
                self.timeline.insert(0, snapped);
                self.last_reading_time = Some(snapped.timestamp);
                SpliceOutcome::Inserted
            }
        };

        match outcome {
            SpliceOutcome::Inserted | SpliceOutcome::Replaced => {
                tracing::debug!(
                    timestamp = snapped.timestamp,
                    value = snapped.value,
                    ?outcome,
                    "Stream reading folded into timeline"
                );
                self.emit(TimelineEvent::Spliced {
                    reading: snapped,
                    replaced: outcome == SpliceOutcome::Replaced,
                });
            }
            _ => {
                tracing::trace!(
                    timestamp = snapped.timestamp,
                    "Stream reading older than head, not folded"
                );
            }
        }

        Ok(outcome)
    }

    fn emit(&self, event: TimelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SplicePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineError;

    fn assert_invariants(reconciler: &Reconciler) {
        let timeline = reconciler.timeline();
        for pair in timeline.windows(2) {
            assert!(
                pair[0].timestamp > pair[1].timestamp,
                "timeline not strictly descending: {:?}",
                timeline
            );
        }
        assert_eq!(
            reconciler.last_reading_time(),
            timeline.first().map(|r| r.timestamp)
        );
    }

    #[test]
    fn test_seed_normalizes_and_keeps_order() {
        let mut reconciler = Reconciler::default();
        let raw = vec![
            RawReading::new(5.1, "2024-01-01T00:02:00Z"),
            RawReading::new(5.3, "2024-01-01T00:01:00Z"),
        ];

        let timeline = reconciler.seed(&raw).to_vec();

        assert_eq!(
            timeline,
            vec![Reading::new(5.1, 1704067320), Reading::new(5.3, 1704067260)]
        );
        assert_eq!(reconciler.last_reading_time(), Some(1704067320));
    }

    #[test]
    fn test_seed_sorts_and_dedups_unordered_input() {
        let mut reconciler = Reconciler::default();
        let raw = vec![
            RawReading::new(6.0, 1704067260),
            RawReading::new(7.0, 1704067380),
            RawReading::new(6.5, 1704067260),
            RawReading::new(5.0, 1704067200),
            RawReading::new(7.5, "2024-01-01T00:03:00Z"),
        ];

        reconciler.seed(&raw);

        assert_eq!(
            reconciler.timeline(),
            &[
                Reading::new(7.0, 1704067380),
                Reading::new(6.0, 1704067260),
                Reading::new(5.0, 1704067200),
            ]
        );
        assert_invariants(&reconciler);
    }

    #[test]
    fn test_seed_empty_is_valid() {
        let mut reconciler = Reconciler::default();
        reconciler.seed(&[RawReading::new(5.0, 1704067200)]);

        reconciler.seed(&[]);

        assert!(reconciler.is_empty());
        assert_eq!(reconciler.last_reading_time(), None);
    }

    #[test]
    fn test_seed_drops_bad_timestamps() {
        let mut reconciler = Reconciler::default();
        let mut rx = reconciler.subscribe();
        let raw = vec![
            RawReading::new(5.0, "tomorrow-ish"),
            RawReading::new(5.5, 1704067260),
        ];

        reconciler.seed(&raw);

        assert_eq!(reconciler.timeline(), &[Reading::new(5.5, 1704067260)]);
        assert_eq!(
            rx.try_recv().unwrap(),
            TimelineEvent::Seeded {
                count: 1,
                dropped: 1
            }
        );
    }

    #[test]
    fn test_extend_admits_only_strictly_newer() {
        let mut reconciler = Reconciler::default();
        reconciler.seed(&[RawReading::new(4.8, 1704067200)]);

        let added = reconciler.extend(&[
            RawReading::new(5.0, 1704067200),
            RawReading::new(5.5, 1704067260),
        ]);

        assert_eq!(added, 1);
        assert_eq!(
            reconciler.timeline(),
            &[Reading::new(5.5, 1704067260), Reading::new(4.8, 1704067200)]
        );
        assert_eq!(reconciler.last_reading_time(), Some(1704067260));
    }

    #[test]
    fn test_extend_nothing_new_is_noop() {
        let mut reconciler = Reconciler::default();
        reconciler.seed(&[
            RawReading::new(5.5, 1704067260),
            RawReading::new(4.8, 1704067200),
        ]);
        let before = reconciler.timeline().to_vec();
        let before_ptr = reconciler.timeline().as_ptr();
        let mut rx = reconciler.subscribe();

        let added = reconciler.extend(&[
            RawReading::new(9.9, 1704067260),
            RawReading::new(9.9, 1704067000),
        ]);

        assert_eq!(added, 0);
        assert_eq!(reconciler.timeline(), before.as_slice());
        assert_eq!(reconciler.timeline().as_ptr(), before_ptr);
        assert_eq!(reconciler.last_reading_time(), Some(1704067260));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_extend_on_empty_timeline_accepts_all() {
        let mut reconciler = Reconciler::default();

        let added = reconciler.extend(&[
            RawReading::new(5.0, 1704067200),
            RawReading::new(5.5, 1704067320),
            RawReading::new(5.2, 1704067260),
            RawReading::new(5.9, 1704067320),
        ]);

        assert_eq!(added, 3);
        assert_eq!(reconciler.head(), Some(&Reading::new(5.5, 1704067320)));
        assert_invariants(&reconciler);
    }

    #[test]
    fn test_extend_new_entries_exceed_previous_bound() {
        let mut reconciler = Reconciler::default();
        reconciler.seed(&[
            RawReading::new(5.0, 1704067320),
            RawReading::new(5.1, 1704067260),
        ]);
        let bound = reconciler.last_reading_time().unwrap();
        let before: HashSet<i64> = reconciler.timeline().iter().map(|r| r.timestamp).collect();

        reconciler.extend(&[
            RawReading::new(6.0, 1704067500),
            RawReading::new(6.1, 1704067100),
            RawReading::new(6.2, 1704067380),
            RawReading::new(6.3, "2024-01-01T00:07:00Z"),
        ]);

        for reading in reconciler.timeline() {
            if !before.contains(&reading.timestamp) {
                assert!(reading.timestamp > bound);
            }
        }
        assert_eq!(reconciler.len(), 5);
        assert_invariants(&reconciler);
    }

    #[test]
    fn test_splice_live_only_leaves_timeline() {
        let mut reconciler = Reconciler::new(SplicePolicy::LiveOnly);
        reconciler.seed(&[RawReading::new(5.5, 1704067260)]);

        let outcome = reconciler
            .splice(&RawReading::new(6.1, 1704067400))
            .unwrap();

        assert_eq!(outcome, SpliceOutcome::LiveOnly);
        assert_eq!(reconciler.len(), 1);
        assert_eq!(
            reconciler.most_recent(),
            Some(Reading::new(6.1, 1704067400))
        );
    }

    #[test]
    fn test_splice_overwrites_same_timestamp_head() {
        let mut reconciler = Reconciler::new(SplicePolicy::FoldIntoTimeline);
        reconciler.seed(&[
            RawReading::new(5.5, 1704067260),
            RawReading::new(5.0, 1704067200),
        ]);
        let mut rx = reconciler.subscribe();

        let outcome = reconciler
            .splice(&RawReading::new(5.7, 1704067260))
            .unwrap();

        assert_eq!(outcome, SpliceOutcome::Replaced);
        assert_eq!(reconciler.len(), 2);
        assert_eq!(reconciler.head(), Some(&Reading::new(5.7, 1704067260)));
        assert_eq!(
            rx.try_recv().unwrap(),
            TimelineEvent::LiveUpdated {
                reading: Reading::new(5.7, 1704067260)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TimelineEvent::Spliced {
                reading: Reading::new(5.7, 1704067260),
                replaced: true
            }
        );
    }

    #[test]
    fn test_splice_snaps_before_folding() {
        let mut reconciler = Reconciler::new(SplicePolicy::FoldIntoTimeline);
        reconciler.seed(&[RawReading::new(5.5, 1704067260)]);

        // 00:01:25 snaps down onto the head
        let outcome = reconciler
            .splice(&RawReading::new(5.6, 1704067285))
            .unwrap();
        assert_eq!(outcome, SpliceOutcome::Replaced);
        assert_eq!(reconciler.len(), 1);

        // 00:01:45 snaps up to 00:02:00
        let outcome = reconciler
            .splice(&RawReading::new(5.8, 1704067305))
            .unwrap();
        assert_eq!(outcome, SpliceOutcome::Inserted);
        assert_eq!(reconciler.head(), Some(&Reading::new(5.8, 1704067320)));
        assert_eq!(reconciler.last_reading_time(), Some(1704067320));

        // Live reading keeps the unsnapped timestamp
        assert_eq!(
            reconciler.most_recent(),
            Some(Reading::new(5.8, 1704067305))
        );
        assert_invariants(&reconciler);
    }

    #[test]
    fn test_splice_older_than_head_not_folded() {
        let mut reconciler = Reconciler::new(SplicePolicy::FoldIntoTimeline);
        reconciler.seed(&[RawReading::new(5.5, 1704067320)]);

        let outcome = reconciler
            .splice(&RawReading::new(4.0, 1704067200))
            .unwrap();

        assert_eq!(outcome, SpliceOutcome::Stale);
        assert_eq!(reconciler.timeline(), &[Reading::new(5.5, 1704067320)]);
        assert_eq!(
            reconciler.most_recent(),
            Some(Reading::new(4.0, 1704067200))
        );
    }

    #[test]
    fn test_splice_bad_timestamp_keeps_state() {
        let mut reconciler = Reconciler::new(SplicePolicy::FoldIntoTimeline);
        reconciler.seed(&[RawReading::new(5.5, 1704067320)]);
        reconciler
            .splice(&RawReading::new(5.6, 1704067320))
            .unwrap();

        let result = reconciler.splice(&RawReading::new(9.0, "??"));

        assert!(matches!(result, Err(TimelineError::InvalidTimestamp(_))));
        assert_eq!(
            reconciler.most_recent(),
            Some(Reading::new(5.6, 1704067320))
        );
        assert_eq!(reconciler.len(), 1);
    }

    #[test]
    fn test_extend_after_fold_respects_spliced_head() {
        let mut reconciler = Reconciler::new(SplicePolicy::FoldIntoTimeline);
        reconciler.seed(&[RawReading::new(5.0, 1704067200)]);
        reconciler
            .splice(&RawReading::new(5.2, 1704067260))
            .unwrap();

        let added = reconciler.extend(&[
            RawReading::new(5.3, 1704067260),
            RawReading::new(5.4, 1704067320),
        ]);

        assert_eq!(added, 1);
        assert_eq!(reconciler.len(), 3);
        assert_invariants(&reconciler);
    }

    #[test]
    fn test_clear_live_keeps_timeline() {
        let mut reconciler = Reconciler::default();
        reconciler.seed(&[RawReading::new(5.5, 1704067260)]);
        reconciler
            .splice(&RawReading::new(6.1, 1704067400))
            .unwrap();

        reconciler.clear_live();

        assert_eq!(reconciler.most_recent(), None);
        assert_eq!(reconciler.timeline(), &[Reading::new(5.5, 1704067260)]);
    }

    #[test]
    fn test_splice_out_of_range_epoch_rejected() {
        let mut reconciler = Reconciler::new(SplicePolicy::FoldIntoTimeline);

        let result = reconciler.splice(&RawReading::new(5.0, i64::MIN));

        assert!(matches!(result, Err(TimelineError::InvalidTimestamp(_))));
        assert_eq!(reconciler.most_recent(), None);
        assert!(reconciler.is_empty());
    }

    #[test]
    fn test_splice_policy_from_str() {
        assert_eq!(
            "live_only".parse::<SplicePolicy>(),
            Ok(SplicePolicy::LiveOnly)
        );
        assert_eq!(
            "FOLD".parse::<SplicePolicy>(),
            Ok(SplicePolicy::FoldIntoTimeline)
        );
        assert!("sometimes".parse::<SplicePolicy>().is_err());
    }
}
