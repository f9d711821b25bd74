use super::ReduceError;
use super::weights::nanmean;
use crate::cftime::CalendarDateTime;

pub const MONTHS_PER_YEAR: usize = 12;

/// Averages consecutive, non-overlapping windows of `window` records. A
/// trailing partial window is dropped.
pub fn coarsen_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return Vec::new();
    }
    values
        .chunks_exact(window)
        .map(|chunk| nanmean(chunk.iter().copied()))
        .collect()
}

/// Checks that every full window of `dates` covers twelve consecutive
/// months starting in January, so positional windows match calendar years.
pub fn check_calendar_alignment(dates: &[CalendarDateTime]) -> Result<(), ReduceError> {
    for (window, chunk) in dates.chunks_exact(MONTHS_PER_YEAR).enumerate() {
        let first = chunk[0];
        if first.month != 1 {
            return Err(ReduceError::CalendarMisaligned {
                window,
                date: first,
                reason: "window does not start in January".to_string(),
            });
        }

        for pair in chunk.windows(2) {
            if pair[1].month_index() - pair[0].month_index() != 1 {
                return Err(ReduceError::CalendarMisaligned {
                    window,
                    date: pair[1],
                    reason: format!("expected the month after {}", pair[0]),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(start_year: i32, start_month: u32, n: usize) -> Vec<CalendarDateTime> {
        (0..n)
            .map(|i| {
                let idx = start_year as i64 * 12 + start_month as i64 - 1 + i as i64;
                CalendarDateTime::ymd((idx / 12) as i32, (idx % 12) as u32 + 1, 16)
            })
            .collect()
    }

    #[test]
    fn test_coarsen_exact_years() {
        let values: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let out = coarsen_mean(&values, MONTHS_PER_YEAR);
        assert_eq!(out, vec![5.5, 17.5]);
    }

    #[test]
    fn test_coarsen_drops_partial_window() {
        let values: Vec<f64> = (0..25).map(|v| v as f64).collect();
        let out = coarsen_mean(&values, MONTHS_PER_YEAR);
        assert_eq!(out.len(), 2);
        assert_eq!(out, vec![5.5, 17.5]);

        assert!(coarsen_mean(&values[..11], MONTHS_PER_YEAR).is_empty());
    }

    #[test]
    fn test_coarsen_skips_nan() {
        let mut values = vec![2.0; 12];
        values[3] = f64::NAN;
        assert_eq!(coarsen_mean(&values, MONTHS_PER_YEAR), vec![2.0]);
    }

    #[test]
    fn test_alignment_accepts_calendar_years() {
        assert!(check_calendar_alignment(&monthly(1850, 1, 36)).is_ok());
        // The trailing partial year is never coarsened, so it is not checked
        assert!(check_calendar_alignment(&monthly(1850, 1, 30)).is_ok());
    }

    #[test]
    fn test_alignment_rejects_mid_year_start() {
        let err = check_calendar_alignment(&monthly(1850, 7, 24)).unwrap_err();
        assert!(matches!(err, ReduceError::CalendarMisaligned { window: 0, .. }));
    }

    #[test]
    fn test_alignment_rejects_gap() {
        let mut dates = monthly(1850, 1, 24);
        dates.remove(15);
        dates.push(CalendarDateTime::ymd(1852, 1, 16));
        let err = check_calendar_alignment(&dates).unwrap_err();
        assert!(matches!(err, ReduceError::CalendarMisaligned { window: 1, .. }));
    }
}
