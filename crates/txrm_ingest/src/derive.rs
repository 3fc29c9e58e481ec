//! Derived-field calculations
//!
//! These are the only places where metadata values are interpreted. The
//! scaling constants are public so they can be reviewed and changed in one
//! place.

use crate::types::{DerivedFields, MetadataRecord};
use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, warn};

/// Multiplier applied to `power_watts / voltage_kv`.
///
/// W / kV is milliamps; the acquisition reports have always published the
/// percent-scaled value (×100). The milliamp-to-microamp convention would be
/// ×1000. Change here only.
pub const CURRENT_SCALE: f64 = 100.0;

/// Plausible pixel size range in micrometres.
pub const PIXEL_SIZE_MIN_UM: f64 = 0.01;
pub const PIXEL_SIZE_MAX_UM: f64 = 1000.0;

/// Upper bound on ×/÷1000 corrections applied to one pixel size.
pub const MAX_PIXEL_RESCALE_STEPS: u32 = 3;

/// Timestamp layouts seen in projection dates, tried in order.
pub const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%d.%m.%Y %H:%M:%S",
    "%Y%m%d_%H%M%S",
];

/// Compute every derived field for `record`.
pub fn derive_fields(record: &MetadataRecord) -> DerivedFields {
    let current = derive_current(record.machine.power_watts, record.machine.voltage_kv);

    let pixel = record.machine.pixel_size_um.and_then(correct_pixel_size);
    let (pixel_size_um, pixel_size_correction) = match pixel {
        Some((size, factor)) => (Some(size), Some(factor)),
        None => (None, None),
    };

    let width_real_um = real_dimension(record.image.width_pixels, pixel_size_um);
    let height_real_um = real_dimension(record.image.height_pixels, pixel_size_um);

    let scan_duration = match (&record.first_projection, &record.last_projection) {
        (Some(first), Some(last)) => {
            scan_duration(first.date.as_deref(), last.date.as_deref())
        }
        _ => None,
    };

    DerivedFields {
        current,
        pixel_size_um,
        pixel_size_correction,
        width_real_um,
        height_real_um,
        scan_duration,
    }
}

/// `power / voltage * CURRENT_SCALE`, or `None` when it cannot be computed.
pub fn derive_current(power_watts: Option<f64>, voltage_kv: Option<f64>) -> Option<f64> {
    let power = power_watts?;
    let voltage = voltage_kv?;
    if voltage == 0.0 || !voltage.is_finite() || !power.is_finite() {
        return None;
    }
    Some(power / voltage * CURRENT_SCALE)
}

/// Bring a reported pixel size into the plausible micrometre range.
///
/// Returns the corrected size and the factor applied. Non-positive or
/// non-finite sizes, and sizes still out of range after
/// [`MAX_PIXEL_RESCALE_STEPS`], yield `None`.
pub fn correct_pixel_size(reported: f64) -> Option<(f64, f64)> {
    if !reported.is_finite() || reported <= 0.0 {
        return None;
    }

    let mut size = reported;
    let mut factor = 1.0;
    for _ in 0..MAX_PIXEL_RESCALE_STEPS {
        if size < PIXEL_SIZE_MIN_UM {
            size *= 1000.0;
            factor *= 1000.0;
        } else if size > PIXEL_SIZE_MAX_UM {
            size /= 1000.0;
            factor /= 1000.0;
        } else {
            break;
        }
    }

    if !(PIXEL_SIZE_MIN_UM..=PIXEL_SIZE_MAX_UM).contains(&size) {
        warn!(reported, "Pixel size outside plausible range, leaving real dimensions empty");
        return None;
    }
    if factor != 1.0 {
        warn!(reported, corrected = size, factor, "Pixel size rescaled into micrometre range");
    }
    Some((size, factor))
}

fn real_dimension(pixels: Option<u32>, pixel_size_um: Option<f64>) -> Option<f64> {
    Some(f64::from(pixels?) * pixel_size_um?)
}

/// Parse a projection timestamp in any of the accepted layouts.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Elapsed time between two timestamps as `H:MM:SS`.
///
/// Unparseable input or an end before the start degrade to `None`.
pub fn scan_duration(start: Option<&str>, end: Option<&str>) -> Option<String> {
    let (start_text, end_text) = (start?, end?);
    let (Some(start), Some(end)) = (parse_timestamp(start_text), parse_timestamp(end_text)) else {
        debug!(start = start_text, end = end_text, "Unparseable projection timestamps");
        return None;
    };
    let elapsed = end.signed_duration_since(start);
    if elapsed < chrono::Duration::zero() {
        debug!(start = start_text, end = end_text, "Last projection precedes first");
        return None;
    }
    let secs = elapsed.num_seconds();
    Some(format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectionSample;

    #[test]
    fn test_current_formula() {
        assert_eq!(derive_current(Some(100.0), Some(50.0)), Some(200.0));
        assert_eq!(derive_current(Some(10.0), Some(80.0)), Some(12.5));
    }

    #[test]
    fn test_current_zero_voltage_is_empty() {
        assert_eq!(derive_current(Some(100.0), Some(0.0)), None);
        assert_eq!(derive_current(Some(100.0), None), None);
        assert_eq!(derive_current(None, Some(50.0)), None);
        assert_eq!(derive_current(Some(f64::NAN), Some(50.0)), None);
    }

    #[test]
    fn test_pixel_size_in_range_untouched() {
        assert_eq!(correct_pixel_size(2.5), Some((2.5, 1.0)));
    }

    #[test]
    fn test_pixel_size_rescaled_from_millimetres() {
        let (size, factor) = correct_pixel_size(0.002).unwrap();
        assert!((size - 2.0).abs() < 1e-9);
        assert_eq!(factor, 1000.0);
    }

    #[test]
    fn test_pixel_size_rescaled_from_metres() {
        let (size, factor) = correct_pixel_size(3e-6).unwrap();
        assert!((size - 3.0).abs() < 1e-6);
        assert_eq!(factor, 1_000_000.0);
    }

    #[test]
    fn test_pixel_size_rescaled_from_picometres() {
        let (size, _) = correct_pixel_size(5_000_000.0).unwrap();
        assert!((size - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_pixel_size_invalid() {
        assert_eq!(correct_pixel_size(0.0), None);
        assert_eq!(correct_pixel_size(-1.0), None);
        assert_eq!(correct_pixel_size(f64::INFINITY), None);
        assert_eq!(correct_pixel_size(1e-30), None);
    }

    #[test]
    fn test_scan_duration_formats() {
        assert_eq!(
            scan_duration(Some("2024-03-01 10:00:00"), Some("2024-03-01 11:02:03")),
            Some("1:02:03".to_string())
        );
        assert_eq!(
            scan_duration(Some("03/01/2024 11:59:00 PM"), Some("03/02/2024 12:01:30 AM")),
            Some("0:02:30".to_string())
        );
        assert_eq!(
            scan_duration(Some("2024-03-01T10:00:00.250"), Some("2024-03-01T10:00:10.750")),
            Some("0:00:10".to_string())
        );
        assert_eq!(
            scan_duration(Some("01.03.2024 08:00:00"), Some("02.03.2024 08:00:00")),
            Some("24:00:00".to_string())
        );
    }

    #[test]
    fn test_scan_duration_degrades_to_empty() {
        assert_eq!(scan_duration(Some("yesterday"), Some("2024-03-01 10:00:00")), None);
        assert_eq!(scan_duration(Some("2024-03-01 10:00:00"), None), None);
        assert_eq!(
            scan_duration(Some("2024-03-01 10:00:00"), Some("2024-03-01 09:00:00")),
            None
        );
    }

    #[test]
    fn test_derive_fields_end_to_end() {
        let mut record = MetadataRecord::default();
        record.machine.power_watts = Some(100.0);
        record.machine.voltage_kv = Some(50.0);
        record.machine.pixel_size_um = Some(0.001);
        record.image.width_pixels = Some(1024);
        record.image.height_pixels = Some(512);
        record.first_projection = Some(ProjectionSample {
            date: Some("2024-03-01 10:00:00".to_string()),
            ..Default::default()
        });
        record.last_projection = Some(ProjectionSample {
            index: 1600,
            date: Some("2024-03-01 10:30:00".to_string()),
            ..Default::default()
        });

        let derived = derive_fields(&record);
        assert_eq!(derived.current, Some(200.0));
        assert_eq!(derived.pixel_size_correction, Some(1000.0));
        assert!((derived.width_real_um.unwrap() - 1024.0).abs() < 1e-6);
        assert!((derived.height_real_um.unwrap() - 512.0).abs() < 1e-6);
        assert_eq!(derived.scan_duration.as_deref(), Some("0:30:00"));
    }
}
