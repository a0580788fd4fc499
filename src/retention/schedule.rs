//! Cadence bookkeeping for the scheduling loop.
//!
//! Each cadence keeps an explicit next-due instant. When a tick observes
//! `now >= next_due` the cadence fires once and its due instant moves forward
//! by whole intervals until it is in the future again, so a late or missed
//! tick delays a cadence but never drops it and never makes it fire twice.

use std::time::Duration;

use tokio::time::Instant;

/// What a cadence triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadenceTarget {
    /// One category's pass.
    Category(String),
    /// A pass over every category.
    All,
}

#[derive(Debug, Clone)]
struct Cadence {
    target: CadenceTarget,
    interval: Duration,
    next_due: Instant,
}

/// The set of cadences driven by one scheduling loop.
#[derive(Debug, Clone)]
pub struct Schedule {
    cadences: Vec<Cadence>,
}

impl Schedule {
    /// Create a schedule whose cadences first fall due one interval after `start`.
    ///
    /// Category cadences are evaluated before the aggregate one. Zero
    /// intervals are clamped to one second.
    pub fn new(
        categories: impl IntoIterator<Item = (String, Duration)>,
        full_pass_interval: Duration,
        start: Instant,
    ) -> Self {
        let mut cadences: Vec<Cadence> = categories
            .into_iter()
            .map(|(name, interval)| Cadence::new(CadenceTarget::Category(name), interval, start))
            .collect();
        cadences.push(Cadence::new(CadenceTarget::All, full_pass_interval, start));

        Self { cadences }
    }

    /// Return the targets due at `now`, advancing each fired cadence.
    pub fn due(&mut self, now: Instant) -> Vec<CadenceTarget> {
        let mut fired = Vec::new();
        for cadence in &mut self.cadences {
            if now < cadence.next_due {
                continue;
            }

            let overdue = now.duration_since(cadence.next_due);
            let skipped = (overdue.as_nanos() / cadence.interval.as_nanos()) as u32;
            if skipped > 0 {
                tracing::debug!(
                    target_cadence = ?cadence.target,
                    skipped,
                    "Cadence fell behind, catching up with a single run"
                );
            }
            cadence.next_due += cadence.interval * (skipped + 1);
            fired.push(cadence.target.clone());
        }
        fired
    }

    /// The earliest instant at which any cadence falls due.
    #[cfg(test)]
    fn next_due(&self) -> Option<Instant> {
        self.cadences.iter().map(|c| c.next_due).min()
    }
}

impl Cadence {
    fn new(target: CadenceTarget, interval: Duration, start: Instant) -> Self {
        let interval = interval.max(Duration::from_secs(1));
        Self {
            target,
            interval,
            next_due: start + interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn schedule(start: Instant) -> Schedule {
        Schedule::new(
            vec![
                ("tts_temp".to_string(), 30 * MINUTE),
                ("logs".to_string(), 120 * MINUTE),
                ("cache".to_string(), 360 * MINUTE),
            ],
            60 * MINUTE,
            start,
        )
    }

    fn category(name: &str) -> CadenceTarget {
        CadenceTarget::Category(name.to_string())
    }

    #[test]
    fn test_nothing_due_before_first_interval() {
        let start = Instant::now();
        let mut schedule = schedule(start);

        assert!(schedule.due(start).is_empty());
        assert!(schedule.due(start + 29 * MINUTE).is_empty());
        assert_eq!(schedule.next_due(), Some(start + 30 * MINUTE));
    }

    #[test]
    fn test_cadences_fire_on_their_intervals() {
        let start = Instant::now();
        let mut schedule = schedule(start);

        assert_eq!(schedule.due(start + 30 * MINUTE), vec![category("tts_temp")]);
        // Same instant again: already advanced
        assert!(schedule.due(start + 30 * MINUTE).is_empty());

        assert_eq!(
            schedule.due(start + 60 * MINUTE),
            vec![category("tts_temp"), CadenceTarget::All]
        );
        assert_eq!(
            schedule.due(start + 120 * MINUTE),
            vec![category("tts_temp"), category("logs"), CadenceTarget::All]
        );
    }

    #[test]
    fn test_one_minute_ticks_fire_each_cadence_once_per_interval() {
        let start = Instant::now();
        let mut schedule = schedule(start);
        let mut tts_runs = 0;
        let mut full_runs = 0;

        for minute in 1..=360u32 {
            for target in schedule.due(start + MINUTE * minute) {
                match target {
                    CadenceTarget::Category(name) if name == "tts_temp" => tts_runs += 1,
                    CadenceTarget::All => full_runs += 1,
                    _ => {}
                }
            }
        }

        assert_eq!(tts_runs, 12);
        assert_eq!(full_runs, 6);
    }

    #[test]
    fn test_long_stall_fires_once_then_realigns() {
        let start = Instant::now();
        let mut schedule = Schedule::new(vec![("tts_temp".to_string(), 30 * MINUTE)], 600 * MINUTE, start);

        // Loop was blocked for 100 minutes: three intervals missed, one run
        assert_eq!(schedule.due(start + 100 * MINUTE), vec![category("tts_temp")]);
        assert!(schedule.due(start + 101 * MINUTE).is_empty());
        // Next due at the 120 minute mark, keeping the original phase
        assert_eq!(schedule.next_due(), Some(start + 120 * MINUTE));
        assert_eq!(schedule.due(start + 120 * MINUTE), vec![category("tts_temp")]);
    }

    #[test]
    fn test_jittered_tick_does_not_skip() {
        let start = Instant::now();
        let mut schedule = Schedule::new(vec![("c".to_string(), 30 * MINUTE)], 600 * MINUTE, start);

        // Tick lands a few seconds late
        let late = start + 30 * MINUTE + Duration::from_secs(7);
        assert_eq!(schedule.due(late), vec![category("c")]);
        assert_eq!(schedule.next_due(), Some(start + 60 * MINUTE));
    }

    #[test]
    fn test_zero_interval_clamped() {
        let start = Instant::now();
        let mut schedule = Schedule::new(vec![("c".to_string(), Duration::ZERO)], Duration::ZERO, start);
        assert_eq!(schedule.due(start + Duration::from_secs(1)).len(), 2);
    }
}
