use serde_json::Value;

use super::HotspotRecord;

/// Normalize a raw upstream payload into hotspot records, dispatching
/// on the payload shape. FIRMS area rows and INPE focos rows are both
/// understood; anything else normalizes to an empty list with a warning.
pub fn route_by_format(payload: &Value) -> Vec<HotspotRecord> {
    let rows = match payload.as_array() {
        Some(rows) if !rows.is_empty() => rows,
        _ => return Vec::new(),
    };

    let first = &rows[0];
    if first.get("acq_date").is_some() || first.get("latitude").is_some() {
        rows.iter().filter_map(from_firms_row).collect()
    } else if first.get("data_hora_gmt").is_some() || first.get("lat").is_some() {
        rows.iter().filter_map(from_inpe_row).collect()
    } else {
        tracing::warn!("unrecognized hotspot payload shape, returning no records");
        Vec::new()
    }
}

/// Sort records in place by the requested key. Unknown keys fall back
/// to the default sensor ordering.
pub fn sort_fires(records: &mut [HotspotRecord], sort_key: &str) {
    match sort_key {
        "frp" => records.sort_by(|a, b| b.frp.total_cmp(&a.frp)),
        "brightness" => records.sort_by(|a, b| b.bright_ti4.total_cmp(&a.bright_ti4)),
        "confidence" => records.sort_by(|a, b| a.confidence.cmp(&b.confidence)),
        "date" => records.sort_by(|a, b| {
            (a.acq_date.as_str(), a.acq_time.as_str())
                .cmp(&(b.acq_date.as_str(), b.acq_time.as_str()))
        }),
        _ => records.sort_by(|a, b| {
            (a.satellite.as_str(), a.acq_date.as_str(), a.acq_time.as_str())
                .cmp(&(b.satellite.as_str(), b.acq_date.as_str(), b.acq_time.as_str()))
        }),
    }
}

// CSV-derived rows carry every field as a string; JSON rows carry
// numbers. Both are accepted.
fn num(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn from_firms_row(row: &Value) -> Option<HotspotRecord> {
    let latitude = num(row.get("latitude"))?;
    let longitude = num(row.get("longitude"))?;

    Some(HotspotRecord {
        latitude,
        longitude,
        acq_date: text(row.get("acq_date")),
        acq_time: pad_time(&text(row.get("acq_time"))),
        satellite: text(row.get("satellite")),
        instrument: text(row.get("instrument")),
        confidence: text(row.get("confidence")),
        frp: num(row.get("frp")).unwrap_or(0.0),
        bright_ti4: num(row.get("bright_ti4")).unwrap_or(0.0),
        bright_ti5: num(row.get("bright_ti5")).unwrap_or(0.0),
        daynight: text(row.get("daynight")),
    })
}

fn from_inpe_row(row: &Value) -> Option<HotspotRecord> {
    let latitude = num(row.get("lat"))?;
    let longitude = num(row.get("lon"))?;

    // "2024-06-06 12:30:00" → date and HHMM time
    let stamp = text(row.get("data_hora_gmt"));
    let (acq_date, acq_time) = match stamp.split_once(' ') {
        Some((date, time)) => {
            let compact: String = time.chars().filter(|c| c.is_ascii_digit()).take(4).collect();
            (date.to_string(), compact)
        }
        None => (stamp, String::new()),
    };

    Some(HotspotRecord {
        latitude,
        longitude,
        acq_date,
        acq_time,
        satellite: text(row.get("satelite")),
        instrument: {
            let sensor = text(row.get("sensor"));
            if sensor.is_empty() {
                "N/A".to_string()
            } else {
                sensor
            }
        },
        confidence: text(row.get("risco_fogo")),
        frp: num(row.get("frp")).unwrap_or(0.0),
        bright_ti4: 0.0,
        bright_ti5: 0.0,
        daynight: "N/A".to_string(),
    })
}

// FIRMS CSV reports acquisition time as an integer, dropping leading
// zeros ("36" means 00:36).
fn pad_time(time: &str) -> String {
    if time.is_empty() || time.len() >= 4 {
        return time.to_string();
    }
    format!("{:0>4}", time)
}
