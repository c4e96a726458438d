use chrono::NaiveDate;

/// Walk distinct check-in dates in ascending order and return
/// (current_streak, longest_streak).
///
/// The running streak resets to 1 whenever the gap to the previous date
/// is not exactly one day. The final run only counts as the current
/// streak while it is still reachable: its last date must be `today` or
/// yesterday, otherwise the streak has lapsed and current is 0.
pub fn compute_streaks(dates: &[NaiveDate], today: NaiveDate) -> (u32, u32) {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut last: Option<NaiveDate> = None;

    for &date in dates {
        run = match last {
            Some(prev) if (date - prev).num_days() == 1 => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        last = Some(date);
    }

    let current = match last {
        Some(date) if (0..=1).contains(&(today - date).num_days()) => run,
        _ => 0,
    };

    (current, longest)
}
