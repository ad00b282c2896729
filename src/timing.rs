use std::time::{SystemTime, UNIX_EPOCH};
use log::debug;
use tokio::{sync::mpsc, time::{self, Duration, MissedTickBehavior}};

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Countdown {
    Expired,
    Remaining { days: i64, hours: i64, minutes: i64, seconds: i64 },
}

impl Countdown {
    pub fn is_expired(&self) -> bool {
        matches!(self, Countdown::Expired)
    }
}

/// Plain duration decomposition of `end - now`, both in epoch milliseconds.
pub fn countdown(end_ms: i64, now_ms: i64) -> Countdown {
    let remaining = end_ms.saturating_sub(now_ms);
    if remaining <= 0 {
        return Countdown::Expired;
    }
    Countdown::Remaining {
        days: remaining / MS_PER_DAY,
        hours: (remaining / MS_PER_HOUR) % 24,
        minutes: (remaining / MS_PER_MINUTE) % 60,
        seconds: (remaining / MS_PER_SECOND) % 60,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreatmentProgress {
    /// No usable duration. Shown as "unspecified".
    Unspecified,
    Tracked { elapsed_days: u32, progress_percent: u8, remaining_days: u32 },
}

pub fn treatment_progress(start_ms: i64, duration_days: Option<u32>, now_ms: i64) -> TreatmentProgress {
    let duration = match duration_days {
        Some(d) if d > 0 => d,
        _ => return TreatmentProgress::Unspecified,
    };

    let elapsed = now_ms.saturating_sub(start_ms).div_euclid(MS_PER_DAY);
    let elapsed = elapsed.clamp(0, duration as i64) as u32;
    let percent = (100.0 * elapsed as f64 / duration as f64).round().clamp(0.0, 100.0) as u8;

    TreatmentProgress::Tracked {
        elapsed_days: elapsed,
        progress_percent: percent,
        remaining_days: duration - elapsed,
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Publishes the countdown to `on_tick` every `tick` until it expires or a
/// message arrives on `cancel`. Dropping the sender also stops the loop.
pub async fn start_countdown_loop<F>(end_ms: i64, tick: Duration, mut cancel: mpsc::Receiver<()>, mut on_tick: F) -> Countdown
where
    F: FnMut(Countdown),
{
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel.recv() => {
                debug!("countdown_loop:: cancelled");
                return countdown(end_ms, now_millis());
            }
        }

        let current = countdown(end_ms, now_millis());
        on_tick(current);
        if current.is_expired() {
            debug!("countdown_loop:: expired");
            return current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_duration() {
        let now = 1_700_000_000_000;
        assert_eq!(
            countdown(now + 90_061_001, now),
            Countdown::Remaining { days: 1, hours: 1, minutes: 1, seconds: 1 }
        );
        assert_eq!(
            countdown(now + 59_999, now),
            Countdown::Remaining { days: 0, hours: 0, minutes: 0, seconds: 59 }
        );
    }

    #[test]
    fn expired_when_end_not_after_now() {
        assert_eq!(countdown(1_000, 1_000), Countdown::Expired);
        assert_eq!(countdown(1_000, 5_000), Countdown::Expired);
        assert!(countdown(0, 1).is_expired());
    }

    #[test]
    fn progress_ten_days_into_thirty() {
        let now = 1_700_000_000_000;
        let start = now - 10 * MS_PER_DAY;
        assert_eq!(
            treatment_progress(start, Some(30), now),
            TreatmentProgress::Tracked { elapsed_days: 10, progress_percent: 33, remaining_days: 20 }
        );
    }

    #[test]
    fn progress_is_clamped() {
        let now = 1_700_000_000_000;
        assert_eq!(
            treatment_progress(now - 45 * MS_PER_DAY, Some(30), now),
            TreatmentProgress::Tracked { elapsed_days: 30, progress_percent: 100, remaining_days: 0 }
        );
        assert_eq!(
            treatment_progress(now + 3 * MS_PER_DAY, Some(30), now),
            TreatmentProgress::Tracked { elapsed_days: 0, progress_percent: 0, remaining_days: 30 }
        );
    }

    #[test]
    fn zero_or_missing_duration_is_unspecified() {
        assert_eq!(treatment_progress(0, Some(0), MS_PER_DAY), TreatmentProgress::Unspecified);
        assert_eq!(treatment_progress(0, None, MS_PER_DAY), TreatmentProgress::Unspecified);
    }

    #[tokio::test]
    async fn loop_stops_when_expired() {
        let (_tx, rx) = mpsc::channel(1);
        let mut ticks = Vec::new();
        let end = now_millis() + 30;
        let last = start_countdown_loop(end, Duration::from_millis(20), rx, |c| ticks.push(c)).await;
        assert!(last.is_expired());
        assert_eq!(ticks.last(), Some(&Countdown::Expired));
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let (tx, rx) = mpsc::channel(1);
        let end = now_millis() + 60 * MS_PER_MINUTE;
        let handle = tokio::spawn(start_countdown_loop(end, Duration::from_millis(10), rx, |_| {}));
        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(()).await.unwrap();
        let last = handle.await.unwrap();
        assert!(!last.is_expired());
    }
}
