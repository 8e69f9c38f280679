//! Transport line format: `<objectId>|<rssi>` per packet.

use beaconcore::interface::BeaconReading;
use beaconcore::Millis;

/// Decodes one transport line. Malformed lines are dropped without error.
pub fn decode_line(line: &str, received_at: Millis) -> Option<BeaconReading> {
    let (id, rssi) = line.trim().split_once('|')?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    let rssi: i32 = rssi.trim().parse().ok()?;
    Some(BeaconReading::new(id, rssi, received_at))
}

/// Decodes a newline-separated batch, returning the readings and the number of rejected lines.
pub fn decode_batch(body: &str, received_at: Millis) -> (Vec<BeaconReading>, usize) {
    let mut rejected = 0;
    let readings = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let decoded = decode_line(line, received_at);
            if decoded.is_none() {
                rejected += 1;
            }
            decoded
        })
        .collect();
    (readings, rejected)
}
