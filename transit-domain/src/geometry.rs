use crate::model::LatLon;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();

    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Cumulative arc-length from the first vertex, one entry per vertex.
/// Empty input yields an empty vec; a single vertex yields `[0.0]`.
pub fn cumulative_arc_length_m(polyline: &[LatLon]) -> Vec<f64> {
    if polyline.is_empty() {
        return Vec::new();
    }
    let mut cum = Vec::with_capacity(polyline.len());
    cum.push(0.0);
    for window in polyline.windows(2) {
        let seg = haversine_m(window[0], window[1]);
        cum.push(cum.last().copied().unwrap_or(0.0) + seg);
    }
    cum
}

/// Projects each point onto the route by nearest vertex and returns the
/// cumulative arc-length at that vertex. A point is `None` when its
/// coordinates are missing; those map to `0.0`, matching the original's
/// "point has no lat/lon" handling. An empty route also maps every point
/// to `0.0`.
pub fn compute_route_positions(polyline: &[LatLon], points: &[Option<LatLon>]) -> Vec<f64> {
    if polyline.is_empty() {
        return vec![0.0; points.len()];
    }
    let cum = cumulative_arc_length_m(polyline);

    points
        .iter()
        .map(|p| match p {
            None => 0.0,
            Some(point) => {
                let mut min_d = f64::INFINITY;
                let mut nearest_idx = 0usize;
                for (i, vertex) in polyline.iter().enumerate() {
                    let d = haversine_m(*point, *vertex);
                    if d < min_d {
                        min_d = d;
                        nearest_idx = i;
                    }
                }
                cum[nearest_idx]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_same_point_is_zero() {
        let p = LatLon::new(52.0, 13.0);
        assert!(haversine_m(p, p) < 1e-9);
    }

    #[test]
    fn haversine_one_degree_latitude_is_roughly_111km() {
        let a = LatLon::new(0.0, 0.0);
        let b = LatLon::new(1.0, 0.0);
        let d = haversine_m(a, b);
        assert!((d - 111_195.0).abs() < 500.0, "got {d}");
    }

    #[test]
    fn cumulative_arc_length_is_monotonic_and_starts_at_zero() {
        let poly = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 0.01),
            LatLon::new(0.0, 0.02),
        ];
        let cum = cumulative_arc_length_m(&poly);
        assert_eq!(cum.len(), 3);
        assert_eq!(cum[0], 0.0);
        assert!(cum[1] > 0.0 && cum[2] > cum[1]);
    }

    #[test]
    fn empty_route_maps_every_point_to_zero() {
        let positions = compute_route_positions(&[], &[Some(LatLon::new(1.0, 1.0)), None]);
        assert_eq!(positions, vec![0.0, 0.0]);
    }

    #[test]
    fn missing_point_maps_to_zero_even_with_route() {
        let poly = vec![LatLon::new(0.0, 0.0), LatLon::new(0.0, 1.0)];
        let positions = compute_route_positions(&poly, &[None]);
        assert_eq!(positions, vec![0.0]);
    }

    #[test]
    fn nearest_vertex_projection_picks_closest_point_on_route() {
        let poly = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 0.01),
            LatLon::new(0.0, 0.02),
        ];
        let cum = cumulative_arc_length_m(&poly);
        let positions = compute_route_positions(&poly, &[Some(LatLon::new(0.0001, 0.01))]);
        assert_eq!(positions[0], cum[1]);
    }
}
