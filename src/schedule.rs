use crate::error::ClientError;
use crate::types::ClockTime;

/// First slot of the even split used past the fixed table.
const DAY_START_HOUR: u32 = 8;

const FIXED_SLOTS: [&[(u8, u8)]; 4] = [
    &[(9, 0)],
    &[(9, 0), (21, 0)],
    &[(8, 0), (14, 0), (20, 0)],
    &[(8, 0), (12, 0), (17, 0), (21, 0)],
];

/// Default reminder slots for a dose frequency of `times_per_day`.
///
/// Frequencies up to four use a fixed table. Larger ones are split evenly
/// starting at 08:00, every `24 / n` hours, wrapping past midnight. Above 24
/// the interval is zero and every slot lands on 08:00.
pub fn derive_reminder_times(times_per_day: u32) -> Result<Vec<ClockTime>, ClientError> {
    if times_per_day < 1 {
        return Err(ClientError::validation(
            "times_per_day",
            "Dose frequency must be at least once a day.",
        ));
    }

    if let Some(slots) = FIXED_SLOTS.get(times_per_day as usize - 1) {
        return slots.iter().map(|(h, m)| ClockTime::new(*h, *m)).collect();
    }

    let interval = 24 / times_per_day;
    Ok((0..times_per_day)
        .map(|i| ClockTime::on_the_hour(DAY_START_HOUR + i * interval))
        .collect())
}

/// Validates a user-entered dose frequency.
pub fn parse_times_per_day(raw: &str) -> Result<u32, ClientError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ClientError::validation("times_per_day", "Enter how many times a day as a whole number."))?;
    if value < 1 {
        return Err(ClientError::validation(
            "times_per_day",
            "Dose frequency must be at least once a day.",
        ));
    }
    u32::try_from(value).map_err(|_| ClientError::validation("times_per_day", "Dose frequency is too large."))
}
