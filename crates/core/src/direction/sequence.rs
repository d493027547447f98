use busradar_transit::{StationIdentifier, StopTime, TripIdentifier};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSequenceEntry {
    pub stop_id: StationIdentifier,
    pub stop_name: Option<String>,
    pub sequence: u32,
    pub is_current: bool,
    pub is_destination: bool,
}

/// Stop times of `trip_id` ordered by sequence number.
///
/// Sorting is stable, so when a feed repeats a sequence number the entry that
/// came first in the input is the one kept.
pub fn trip_stops<'a>(stop_times: &'a [StopTime], trip_id: &TripIdentifier) -> Vec<&'a StopTime> {
    let mut stops: Vec<&StopTime> = stop_times.iter().filter(|st| &st.trip_id == trip_id).collect();
    stops.sort_by_key(|st| st.sequence);
    stops.dedup_by_key(|st| st.sequence);
    stops
}

/// Annotate ordered trip stops. `current` indexes into `stops`.
pub fn build_stop_sequence(stops: &[&StopTime], current: Option<usize>) -> Vec<StopSequenceEntry> {
    let last = stops.len().saturating_sub(1);
    stops
        .iter()
        .enumerate()
        .map(|(i, st)| StopSequenceEntry {
            stop_id: st.stop_id.clone(),
            stop_name: st.stop_name.clone(),
            sequence: st.sequence,
            is_current: current == Some(i),
            is_destination: i == last,
        })
        .collect()
}
