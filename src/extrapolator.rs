//! Progress extrapolation between snapshots.
//!
//! Snapshots report the position at the instant they were taken, and arrive
//! only when something changes. To show a position that advances smoothly,
//! the [`Extrapolator`] keeps an [`Anchor`] (a monotonic instant, the
//! position at that instant, and the playback rate) and computes
//!
//! ```text
//! position(now) = base_position + (now - base_time) × rate × 1 000 000
//! ```
//!
//! on every display frame. The result depends only on elapsed time, never
//! on how many frames were drawn, so a slow or irregular frame rate does not
//! drift.
//!
//! # States
//!
//! * **Idle** - No frame task exists; nothing is extrapolated.
//! * **Active** - A repeating frame task is scheduled and each
//!   [`tick`](Extrapolator::tick) computes the displayed position.
//!
//! The anchor is taken when a running snapshot arrives while Idle. Further
//! running snapshots leave it alone, so jitter in their arrival does not
//! make the display stutter; only a change of rate re-anchors, at the last
//! drawn frame, to keep the curve continuous. A snapshot that is not running
//! cancels the frame task.

use std::{future, time::Duration};

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::protocol::Snapshot;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Time, position and rate from which positions are extrapolated.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Anchor {
    pub base_time: Instant,
    /// Microseconds.
    pub base_position: i64,
    pub rate: f64,
}

impl Anchor {
    /// Predicts the position at `now`.
    ///
    /// Instants before `base_time` predict `base_position`. The result is
    /// never negative.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn position_at(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.base_time).as_secs_f64();
        // Float to integer casts saturate, and NaN becomes zero.
        let advance = (elapsed * self.rate * MICROS_PER_SECOND).round() as i64;
        self.base_position.saturating_add(advance).max(0)
    }
}

/// Outcome of feeding a snapshot to the [`Extrapolator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Idle to Active: anchored and frame task scheduled.
    Started,
    /// Still Active, re-anchored at the last frame with a new rate.
    RateChanged,
    /// Active to Idle: frame task cancelled.
    Stopped,
    /// Nothing changed.
    Unchanged,
}

/// A position computed for a display frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Frame {
    time: Instant,
    position: i64,
}

#[derive(Debug)]
enum Mode {
    Idle,
    Active { anchor: Anchor, frames: Interval },
}

#[derive(Debug)]
pub struct Extrapolator {
    mode: Mode,
    last_frame: Option<Frame>,
    frame_period: Duration,
}

impl Extrapolator {
    /// Creates an idle extrapolator that draws a frame every `frame_period`.
    #[must_use]
    pub fn new(frame_period: Duration) -> Self {
        Self {
            mode: Mode::Idle,
            last_frame: None,
            // A zero period would make the frame task spin.
            frame_period: frame_period.max(Duration::from_millis(1)),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.mode, Mode::Active { .. })
    }

    #[must_use]
    pub fn anchor(&self) -> Option<Anchor> {
        match &self.mode {
            Mode::Active { anchor, .. } => Some(*anchor),
            Mode::Idle => None,
        }
    }

    /// Position computed for the most recent frame, if any.
    #[must_use]
    pub fn last_position(&self) -> Option<i64> {
        self.last_frame.map(|frame| frame.position)
    }

    /// Feeds a snapshot received at `now`.
    ///
    /// # Panics
    ///
    /// Panics when starting the frame task outside of a Tokio runtime.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot, now: Instant) -> Transition {
        let rate = snapshot.effective_rate();

        if !snapshot.running {
            return if self.is_active() {
                self.stop();
                Transition::Stopped
            } else {
                Transition::Unchanged
            };
        }

        if let Mode::Active { anchor, .. } = &mut self.mode {
            if (anchor.rate - rate).abs() <= f64::EPSILON {
                return Transition::Unchanged;
            }

            // Started always records a frame, so there is one.
            if let Some(frame) = self.last_frame {
                *anchor = Anchor {
                    base_time: frame.time,
                    base_position: frame.position,
                    rate,
                };
            }
            trace!("rate changed to {rate}");
            return Transition::RateChanged;
        }

        self.start(
            Anchor {
                base_time: now,
                base_position: snapshot.position,
                rate,
            },
            now,
        );
        Transition::Started
    }

    /// Computes the position to display at `now` and records it as the last
    /// frame.
    ///
    /// Returns `None` when Idle, so a frame that fires after cancellation
    /// has no effect.
    pub fn tick(&mut self, now: Instant) -> Option<i64> {
        let Mode::Active { anchor, .. } = &self.mode else {
            return None;
        };

        let position = anchor.position_at(now);
        self.last_frame = Some(Frame {
            time: now,
            position,
        });
        Some(position)
    }

    /// Predicts the position at `now` without recording a frame.
    #[must_use]
    pub fn position_at(&self, now: Instant) -> Option<i64> {
        self.anchor().map(|anchor| anchor.position_at(now))
    }

    /// Waits for the next display frame.
    ///
    /// Never completes while Idle, so it can sit in a `select!` next to
    /// other event sources. Cancel safe.
    pub async fn next_frame(&mut self) -> Instant {
        match &mut self.mode {
            Mode::Active { frames, .. } => frames.tick().await,
            Mode::Idle => future::pending().await,
        }
    }

    /// Cancels the frame task. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.is_active() {
            trace!("stopping frame task");
        }
        self.mode = Mode::Idle;
    }

    fn start(&mut self, anchor: Anchor, now: Instant) {
        trace!(
            "starting frame task at {}µs, rate {}",
            anchor.base_position,
            anchor.rate
        );

        // The anchor position is drawn right away; the first frame follows
        // one period later.
        let mut frames = time::interval_at(now + self.frame_period, self.frame_period);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.last_frame = Some(Frame {
            time: now,
            position: anchor.base_position,
        });
        self.mode = Mode::Active { anchor, frames };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    fn snapshot(position: i64, running: bool, playback_rate: f64) -> Snapshot {
        Snapshot {
            position,
            length: 10_000_000,
            running,
            playback_rate: Some(playback_rate),
            ..Snapshot::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_never_extrapolates() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();

        for position in [0, 3_000_000, 1_000] {
            let transition = extrapolator.on_snapshot(&snapshot(position, false, 1.0), t0);
            assert_eq!(transition, Transition::Unchanged);
        }

        time::advance(Duration::from_secs(60)).await;
        assert!(!extrapolator.is_active());
        assert_eq!(extrapolator.tick(Instant::now()), None);
        assert_eq!(extrapolator.position_at(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn doubled_rate_from_five_seconds() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();

        let transition = extrapolator.on_snapshot(&snapshot(5_000_000, true, 2.0), t0);
        assert_eq!(transition, Transition::Started);

        assert_eq!(
            extrapolator.tick(t0 + Duration::from_secs(1)),
            Some(7_000_000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn independent_of_frame_count() {
        let t0 = Instant::now();
        let mut smooth = Extrapolator::new(FRAME);
        let mut choppy = Extrapolator::new(FRAME);
        smooth.on_snapshot(&snapshot(1_000_000, true, 1.5), t0);
        choppy.on_snapshot(&snapshot(1_000_000, true, 1.5), t0);

        for frame in 1..=187 {
            smooth.tick(t0 + FRAME * frame);
        }

        for delta in [
            Duration::ZERO,
            Duration::from_millis(1),
            Duration::from_millis(2_999),
            Duration::from_secs(3),
        ] {
            let expected = 1_000_000 + (delta.as_secs_f64() * 1.5 * 1e6).round() as i64;
            assert_eq!(smooth.position_at(t0 + delta), Some(expected));
            assert_eq!(choppy.position_at(t0 + delta), Some(expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart_reanchors() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();

        extrapolator.on_snapshot(&snapshot(0, true, 1.0), t0);
        let t1 = t0 + Duration::from_secs(2);
        assert_eq!(extrapolator.tick(t1), Some(2_000_000));

        assert_eq!(
            extrapolator.on_snapshot(&snapshot(2_000_000, false, 1.0), t1),
            Transition::Stopped
        );
        assert_eq!(extrapolator.tick(t1 + FRAME), None);

        // Paused for ten seconds, then resumed.
        let t2 = t1 + Duration::from_secs(10);
        assert_eq!(
            extrapolator.on_snapshot(&snapshot(2_000_000, true, 1.0), t2),
            Transition::Started
        );
        assert_eq!(
            extrapolator.tick(t2 + Duration::from_secs(1)),
            Some(3_000_000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn routine_snapshots_do_not_jump() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();
        extrapolator.on_snapshot(&snapshot(0, true, 1.0), t0);

        let mut previous = 0;
        for frame in 1..=120 {
            let now = t0 + FRAME * frame;
            if frame % 10 == 0 {
                // A stale report of the original position, arriving late.
                let transition = extrapolator.on_snapshot(&snapshot(0, true, 1.0), now);
                assert_eq!(transition, Transition::Unchanged);
            }

            let position = extrapolator.tick(now).unwrap();
            assert!(position >= previous);
            assert!(position - previous <= 16_000);
            previous = position;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_change_continues_from_last_frame() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();
        extrapolator.on_snapshot(&snapshot(0, true, 1.0), t0);

        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(extrapolator.tick(t1), Some(1_000_000));

        assert_eq!(
            extrapolator.on_snapshot(&snapshot(0, true, 2.0), t1 + FRAME),
            Transition::RateChanged
        );
        let anchor = extrapolator.anchor().unwrap();
        assert_eq!(anchor.base_time, t1);
        assert_eq!(anchor.base_position, 1_000_000);

        // One frame at the new rate.
        assert_eq!(extrapolator.tick(t1 + FRAME), Some(1_032_000));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_follow_the_period() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();
        extrapolator.on_snapshot(&snapshot(0, true, 1.0), t0);

        let first = extrapolator.next_frame().await;
        assert_eq!(first, t0 + FRAME);
        let second = extrapolator.next_frame().await;
        assert_eq!(second, t0 + FRAME * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_frames_when_stopped() {
        let mut extrapolator = Extrapolator::new(FRAME);
        let t0 = Instant::now();
        extrapolator.on_snapshot(&snapshot(0, true, 1.0), t0);
        extrapolator.on_snapshot(&snapshot(0, false, 1.0), t0);
        extrapolator.stop();

        let frame = time::timeout(Duration::from_secs(5), extrapolator.next_frame()).await;
        assert!(frame.is_err());
        assert_eq!(extrapolator.last_position(), Some(0));
    }

    #[test]
    fn anchor_never_goes_negative_or_back_in_time() {
        let base_time = std::time::Instant::now().into();
        let anchor = Anchor {
            base_time,
            base_position: 500,
            rate: 1.0,
        };
        assert_eq!(anchor.position_at(base_time), 500);

        let rewinding = Anchor {
            rate: -1.0,
            ..anchor
        };
        assert_eq!(rewinding.position_at(base_time + Duration::from_secs(1)), 0);
    }
}
