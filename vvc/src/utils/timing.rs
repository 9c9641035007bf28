//! Timestamp tracking for access units.
//!
//! Timestamps are expressed in microseconds. The [`Clock`] is a rational
//! cursor advanced in whole frame ticks with the division remainder carried
//! over, so a 30000/1001 stream never drifts. [`ClockState`] layers the
//! packetizer policy on top: base-layer tracking, the pending presentation
//! timestamp and resynchronization from externally supplied timestamps.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{Result, bail, ensure};
use log::trace;

use crate::utils::errors::FrameRateError;

/// Timestamp units per second.
pub const CLOCK_FREQ: i64 = 1_000_000;

/// A supplied DTS further ahead than this many ticks is a discontinuity.
pub const MAX_TICK_JUMP: i64 = 3;

/// Frame rate as a rational number of frames per second.
///
/// Both components are non-zero and reduced. Rates are built through
/// [`FrameRate::new`], [`FrameRate::from_fps`] or parsing:
///
/// ```compile_fail
/// let rate = vvc::utils::timing::FrameRate { num: 0, den: 1 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 50, den: 1 }
    }
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Result<Self, FrameRateError> {
        if num == 0 || den == 0 {
            return Err(FrameRateError::ZeroComponent { num, den });
        }

        let divisor = gcd(num, den);
        Ok(Self {
            num: num / divisor,
            den: den / divisor,
        })
    }

    /// Converts a floating point rate with millihertz precision.
    ///
    /// Rates below 0.001 fps are clamped to 0.001 fps.
    pub fn from_fps(fps: f64) -> Self {
        let fps = if fps.is_finite() { fps.max(0.001) } else { 0.001 };
        let num = (fps * 1000.0).round().min(u32::MAX as f64) as u32;
        let divisor = gcd(num, 1000);

        Self {
            num: num / divisor,
            den: 1000 / divisor,
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Whole microseconds covered by one frame, rounded down.
    pub fn tick_us(&self) -> i64 {
        (CLOCK_FREQ as u64 * self.den as u64 / self.num as u64) as i64
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({:.3} fps)", self.num, self.den, self.as_f64())
    }
}

impl FromStr for FrameRate {
    type Err = anyhow::Error;

    /// Accepts `30000/1001`, `29.97` or `25`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some((num, den)) = s.split_once('/') {
            let (Ok(num), Ok(den)) = (num.trim().parse::<u32>(), den.trim().parse::<u32>())
            else {
                bail!(FrameRateError::Invalid(s.to_string()));
            };
            return Ok(Self::new(num, den)?);
        }

        let Ok(fps) = s.parse::<f64>() else {
            bail!(FrameRateError::Invalid(s.to_string()));
        };
        ensure!(
            fps.is_finite() && fps > 0.0,
            FrameRateError::Invalid(s.to_string())
        );

        Ok(Self::from_fps(fps))
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

/// Rational date cursor.
#[derive(Debug, Clone)]
pub struct Clock {
    rate: FrameRate,
    date: Option<i64>,
    remainder: u64,
}

impl Clock {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            rate,
            date: None,
            remainder: 0,
        }
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    /// Changes the tick length; the current date is kept.
    pub fn set_rate(&mut self, rate: FrameRate) {
        self.rate = rate;
        self.remainder = 0;
    }

    pub fn get(&self) -> Option<i64> {
        self.date
    }

    pub fn set(&mut self, date: i64) {
        self.date = Some(date);
        self.remainder = 0;
    }

    pub fn unset(&mut self) {
        self.date = None;
        self.remainder = 0;
    }

    /// Current date, anchoring an unset clock at the stream origin.
    pub fn date_or_origin(&mut self) -> i64 {
        *self.date.get_or_insert(0)
    }

    /// Advances by `count` frames. An unset clock stays unset.
    pub fn increment(&mut self, count: u32) -> Option<i64> {
        let date = self.date.as_mut()?;

        let num = self.rate.num as u64;
        let dividend = count as u64 * CLOCK_FREQ as u64 * self.rate.den as u64;
        *date += (dividend / num) as i64;
        self.remainder += dividend % num;

        if self.remainder >= num {
            *date += 1;
            self.remainder -= num;
        }

        Some(*date)
    }
}

/// A supplied timestamp that did not follow the running clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discontinuity {
    pub expected: i64,
    pub supplied: i64,
}

/// Decoding clock of one packetizer session.
#[derive(Debug, Clone)]
pub struct ClockState {
    clock: Clock,
    pending_pts: Option<i64>,
    base_layer_id: Option<u8>,
    need_initial_ts: bool,
}

impl ClockState {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            clock: Clock::new(rate),
            pending_pts: None,
            base_layer_id: None,
            need_initial_ts: true,
        }
    }

    pub fn rate(&self) -> FrameRate {
        self.clock.rate()
    }

    pub fn set_rate(&mut self, rate: FrameRate) {
        self.clock.set_rate(rate);
    }

    pub fn current_dts(&self) -> Option<i64> {
        self.clock.get()
    }

    pub fn pending_pts(&self) -> Option<i64> {
        self.pending_pts
    }

    pub fn base_layer_id(&self) -> Option<u8> {
        self.base_layer_id
    }

    pub fn is_base_layer(&self, layer_id: u8) -> bool {
        self.base_layer_id == Some(layer_id)
    }

    /// Tracks the numerically smallest layer id. Returns `true` on change.
    pub fn observe_layer(&mut self, layer_id: u8) -> bool {
        match self.base_layer_id {
            Some(base) if base <= layer_id => false,
            _ => {
                self.base_layer_id = Some(layer_id);
                true
            }
        }
    }

    /// Takes the first supplied timestamps as the clock anchor.
    pub fn anchor(&mut self, dts: Option<i64>, pts: Option<i64>) {
        if !self.need_initial_ts {
            return;
        }

        if let Some(dts) = dts {
            self.clock.set(dts);
        }
        self.pending_pts = pts;

        if self.clock.get().is_some() {
            self.need_initial_ts = false;
        }
    }

    /// DTS for a frame that carries no timestamp of its own.
    pub fn frame_dts(&mut self) -> i64 {
        self.clock.date_or_origin()
    }

    /// Handles a picture boundary opened by a unit on `layer_id`.
    ///
    /// Only base-layer boundaries move the clock: one tick forward, then a
    /// resync to `dts` when the stream supplies one. A supplied DTS behind
    /// the previous date, or more than [`MAX_TICK_JUMP`] ticks ahead, is
    /// reported as a discontinuity; the clock follows it either way.
    pub fn advance(
        &mut self,
        layer_id: u8,
        dts: Option<i64>,
        pts: Option<i64>,
    ) -> Option<Discontinuity> {
        if !self.is_base_layer(layer_id) {
            return None;
        }

        let previous = self.clock.date_or_origin();
        let expected = self.clock.increment(1).unwrap_or(previous);
        self.pending_pts = pts;

        let supplied = dts?;
        self.clock.set(supplied);
        trace!("Clock resynchronized to {supplied} (expected {expected})");

        let max_jump = self.clock.rate().tick_us() * MAX_TICK_JUMP;
        if supplied < previous || supplied - expected > max_jump {
            return Some(Discontinuity { expected, supplied });
        }

        None
    }

    /// Forgets all timestamps and the base layer; the rate is kept.
    pub fn reset(&mut self) {
        self.clock.unset();
        self.pending_pts = None;
        self.base_layer_id = None;
        self.need_initial_ts = true;
    }
}

#[test]
fn clock_ticks_at_25_fps() {
    let mut state = ClockState::new(FrameRate::new(25, 1).unwrap());
    state.observe_layer(0);

    let start = state.frame_dts();
    for _ in 0..5 {
        assert_eq!(state.advance(0, None, None), None);
    }

    assert_eq!(state.current_dts().unwrap() - start, 5 * 40_000);
}

#[test]
fn clock_carries_remainder() {
    let mut clock = Clock::new(FrameRate::new(30000, 1001).unwrap());
    assert_eq!(clock.increment(1), None);

    clock.set(0);
    assert_eq!(clock.increment(1), Some(33_366));
    assert_eq!(clock.increment(1), Some(66_733));
    assert_eq!(clock.increment(1), Some(100_100));
}

#[test]
fn only_base_layer_moves_clock() {
    let mut state = ClockState::new(FrameRate::default());
    assert!(state.observe_layer(2));
    assert!(state.observe_layer(0));
    assert!(!state.observe_layer(1));
    assert_eq!(state.base_layer_id(), Some(0));

    state.frame_dts();
    assert_eq!(state.advance(1, Some(5_000_000), None), None);
    assert_eq!(state.current_dts(), Some(0));

    state.advance(0, None, Some(7));
    assert_eq!(state.current_dts(), Some(20_000));
    assert_eq!(state.pending_pts(), Some(7));
}

#[test]
fn supplied_timestamps_resync() {
    let mut state = ClockState::new(FrameRate::new(25, 1).unwrap());
    state.observe_layer(0);
    state.anchor(Some(1_000_000), Some(1_080_000));
    assert_eq!(state.current_dts(), Some(1_000_000));
    assert_eq!(state.pending_pts(), Some(1_080_000));

    // anchored once only
    state.anchor(Some(9), None);
    assert_eq!(state.current_dts(), Some(1_000_000));

    assert_eq!(state.advance(0, Some(1_040_000), None), None);

    let jump = state.advance(0, Some(500_000), None);
    assert_eq!(
        jump,
        Some(Discontinuity {
            expected: 1_080_000,
            supplied: 500_000
        })
    );
    assert_eq!(state.current_dts(), Some(500_000));

    state.reset();
    assert_eq!(state.current_dts(), None);
    assert_eq!(state.base_layer_id(), None);
}

#[test]
fn parse_frame_rates() -> Result<()> {
    assert_eq!("30000/1001".parse::<FrameRate>()?, FrameRate::new(30000, 1001)?);
    assert_eq!("25".parse::<FrameRate>()?, FrameRate::new(25, 1)?);
    assert_eq!("29.97".parse::<FrameRate>()?, FrameRate::new(2997, 100)?);
    assert_eq!(FrameRate::from_fps(0.0), FrameRate::new(1, 1000)?);
    assert_eq!(FrameRate::from_fps(f64::NAN), FrameRate::new(1, 1000)?);
    assert_eq!(FrameRate::from_fps(1e-9).tick_us(), 1_000_000_000);
    assert!(matches!(
        FrameRate::new(0, 1),
        Err(FrameRateError::ZeroComponent { num: 0, den: 1 })
    ));
    assert!(FrameRate::new(5, 0).is_err());
    assert!("0/1".parse::<FrameRate>().is_err());
    assert!("fast".parse::<FrameRate>().is_err());
    assert!("-3".parse::<FrameRate>().is_err());
    Ok(())
}
