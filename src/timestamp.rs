use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use ttx::structs::service_data::ServiceData;

/// MJD 0 is 17 November 1858.
fn mjd_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1858, 11, 17)
}

pub fn mjd_to_date(mjd: u32) -> Option<NaiveDate> {
    mjd_epoch()?.checked_add_days(Days::new(mjd as u64))
}

/// Broadcast time in the local offset announced by the service.
pub fn service_time(service: &ServiceData) -> Option<DateTime<FixedOffset>> {
    let utc = mjd_to_date(service.modified_julian_date)?
        .and_hms_opt(
            service.utc_hours as u32,
            service.utc_minutes as u32,
            service.utc_seconds as u32,
        )?
        .and_utc();
    let offset = FixedOffset::east_opt(service.time_offset as i32 * 1800)?;

    Some(utc.with_timezone(&offset))
}

pub fn service_time_str(service: &ServiceData) -> String {
    match service_time(service) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S %:z").to_string(),
        None => format!(
            "invalid (MJD {} {:02}:{:02}:{:02})",
            service.modified_julian_date,
            service.utc_hours,
            service.utc_minutes,
            service.utc_seconds
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mjd_reference_dates() {
        assert_eq!(mjd_to_date(0), NaiveDate::from_ymd_opt(1858, 11, 17));
        assert_eq!(mjd_to_date(45000), NaiveDate::from_ymd_opt(1982, 1, 31));
        assert_eq!(mjd_to_date(51544), NaiveDate::from_ymd_opt(2000, 1, 1));
        assert_eq!(mjd_to_date(60000), NaiveDate::from_ymd_opt(2023, 2, 25));
    }

    #[test]
    fn offset_moves_local_time() {
        let service = ServiceData {
            modified_julian_date: 60000,
            utc_hours: 23,
            utc_minutes: 30,
            utc_seconds: 5,
            time_offset: 2,
            ..Default::default()
        };

        assert_eq!(service_time_str(&service), "2023-02-26 00:30:05 +01:00");
    }

    #[test]
    fn out_of_range_clock_is_reported() {
        let service = ServiceData {
            utc_hours: 25,
            ..Default::default()
        };

        assert!(service_time(&service).is_none());
        assert!(service_time_str(&service).starts_with("invalid"));
    }
}
