//! Web-Mercator projection from latitude/longitude to tile indices.

use std::f64::consts::PI;

use crate::error::ProjectionError;
use crate::tile::MAX_ZOOM;

/// Latitude limit of the square Web-Mercator world.
///
/// Latitudes beyond this have no row in the tile grid and are rejected.
pub const MERCATOR_MAX_LAT: f64 = 85.051_128_78;

/// Map a geographic coordinate to its `(x, y)` tile index at `zoom`.
///
/// Uses the standard slippy-map formula:
///
/// ```text
/// n = 2^zoom
/// x = floor((lon + 180) / 360 * n)
/// y = floor(n * (1 - ln(tan(lat) + sec(lat)) / pi) / 2)
/// ```
///
/// Every accepted input lands inside `[0, n)`. The east edge `lon = 180`
/// belongs to the last column, and rows at the Mercator limit stay in the
/// first or last row.
///
/// # Errors
///
/// Latitudes beyond ±[`MERCATOR_MAX_LAT`] (the poles included), longitudes
/// outside `[-180, 180]`, non-finite inputs, and zooms above [`MAX_ZOOM`] are
/// rejected rather than clamped.
pub fn tile_index(lat: f64, lon: f64, zoom: u8) -> Result<(i64, i64), ProjectionError> {
    if zoom > MAX_ZOOM {
        return Err(ProjectionError::InvalidZoom {
            zoom,
            max: MAX_ZOOM,
        });
    }
    if !lat.is_finite() || lat.abs() > MERCATOR_MAX_LAT {
        return Err(ProjectionError::InvalidLatitude(lat));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ProjectionError::InvalidLongitude(lon));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let lat_rad = lat.to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = (n * (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0).floor();

    let last = n as i64 - 1;
    Ok(((x as i64).clamp(0, last), (y as i64).clamp(0, last)))
}
