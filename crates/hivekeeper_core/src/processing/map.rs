//! Map projections of hive locations.

use crate::model::hive::{GeoPoint, Hive, HiveId, HiveStatus};
use std::cmp::Ordering;

const EARTH_RADIUS_KM: f64 = 6_371.0;
/// Span used when every marker sits on the same point.
const MIN_SPAN_DEGREES: f64 = 0.01;
const REGION_PADDING: f64 = 1.4;

#[derive(Debug, Clone, PartialEq)]
pub struct HiveMarker {
    pub hive_id: HiveId,
    pub name: String,
    pub status: HiveStatus,
    pub location: GeoPoint,
}

/// Visible map window: center plus total latitude/longitude span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRegion {
    pub center: GeoPoint,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

/// Markers for hives that have coordinates, in input order.
pub fn hive_markers(hives: &[Hive]) -> Vec<HiveMarker> {
    hives
        .iter()
        .filter_map(|hive| {
            hive.location().map(|location| HiveMarker {
                hive_id: hive.id,
                name: hive.name.clone(),
                status: hive.status,
                location,
            })
        })
        .collect()
}

/// Smallest padded region showing every point; `None` for no points.
pub fn region_for(points: &[GeoPoint]) -> Option<MapRegion> {
    let first = points.first()?;
    let (mut min_lat, mut max_lat) = (first.latitude, first.latitude);
    let (mut min_lon, mut max_lon) = (first.longitude, first.longitude);
    for point in &points[1..] {
        min_lat = min_lat.min(point.latitude);
        max_lat = max_lat.max(point.latitude);
        min_lon = min_lon.min(point.longitude);
        max_lon = max_lon.max(point.longitude);
    }

    Some(MapRegion {
        center: GeoPoint {
            latitude: (min_lat + max_lat) / 2.0,
            longitude: (min_lon + max_lon) / 2.0,
        },
        latitude_delta: ((max_lat - min_lat) * REGION_PADDING).max(MIN_SPAN_DEGREES),
        longitude_delta: ((max_lon - min_lon) * REGION_PADDING).max(MIN_SPAN_DEGREES),
    })
}

/// Great-circle distance in kilometers.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Up to `limit` markers closest to `origin`, nearest first, with distances.
pub fn nearest_hives(
    markers: &[HiveMarker],
    origin: GeoPoint,
    limit: usize,
) -> Vec<(HiveMarker, f64)> {
    let mut ranked = markers
        .iter()
        .map(|marker| (marker.clone(), haversine_km(origin, marker.location)))
        .collect::<Vec<_>>();
    ranked.sort_by(|left, right| left.1.partial_cmp(&right.1).unwrap_or(Ordering::Equal));
    ranked.truncate(limit);
    ranked
}
