use chrono::NaiveTime;

/// Split fractional hours of day into whole (hours, minutes, seconds)
pub fn hours_to_hms(hours: f64) -> Option<(u32, u32, u32)> {
    if !hours.is_finite() || !(0.0..24.0).contains(&hours) {
        return None;
    }
    let hh = hours.trunc() as u32;
    let mm = ((hours * 60.0) % 60.0).trunc() as u32;
    let ss = ((hours * 3600.0) % 60.0).trunc() as u32;
    Some((hh, mm, ss))
}

/// Observation time of a pixel stored as fractional hours (UTC)
pub fn hours_to_time(hours: f64) -> Option<NaiveTime> {
    let (hh, mm, ss) = hours_to_hms(hours)?;
    NaiveTime::from_hms_opt(hh, mm, ss)
}
