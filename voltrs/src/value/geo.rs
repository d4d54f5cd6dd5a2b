//! `GeographyPoint` and `Geography` (polygon with holes), ported from the
//! XYZ-on-the-unit-sphere wire representation.

use crate::buffer::{BufferView, OwnedBuffer};
use crate::error::{ClientError, Result};

const NULL_COORDINATE: f64 = 360.0;
/// Sub-millimeter precision, a reasonable default epsilon for
/// [`GeographyPoint::approximately_equal`].
pub const DEFAULT_EPSILON: f64 = 1.0e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeographyPoint {
    longitude: f64,
    latitude: f64,
}

impl GeographyPoint {
    /// `longitude` in `[-180, 180]`, `latitude` in `[-90, 90]`. Values of
    /// exactly +/-180 longitude are both allowed, to admit points
    /// arbitrarily close to either side of the antimeridian.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        if latitude > 90.0 || longitude < -180.0 {
            return Err(ClientError::CoordinateOutOfRange("latitude"));
        }
        if longitude > 180.0 || latitude < -90.0 {
            return Err(ClientError::CoordinateOutOfRange("longitude"));
        }
        Ok(GeographyPoint {
            longitude,
            latitude,
        })
    }

    pub fn null() -> Self {
        GeographyPoint {
            longitude: NULL_COORDINATE,
            latitude: NULL_COORDINATE,
        }
    }

    pub fn is_null(&self) -> bool {
        self.longitude == NULL_COORDINATE && self.latitude == NULL_COORDINATE
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn approximately_equal(&self, other: &GeographyPoint, epsilon: f64) -> bool {
        if self.is_null() || other.is_null() {
            return self.is_null() == other.is_null();
        }
        let lat_close = (self.latitude - other.latitude).abs() <= epsilon;
        if !lat_close {
            return false;
        }
        // At the poles longitude is meaningless.
        if (self.latitude - 90.0).abs() <= epsilon || (self.latitude + 90.0).abs() <= epsilon {
            return true;
        }
        let mut lon_diff = (self.longitude - other.longitude).abs();
        if lon_diff > 180.0 {
            lon_diff = 360.0 - lon_diff;
        }
        lon_diff <= epsilon
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> GeographyPoint {
        let latitude = z.asin().to_degrees();
        let longitude = y.atan2(x).to_degrees();
        GeographyPoint {
            longitude,
            latitude,
        }
    }

    pub fn to_xyz(&self) -> (f64, f64, f64) {
        let lon = self.longitude.to_radians();
        let lat = self.latitude.to_radians();
        (lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }
}

/// A single ring of a polygon: a closed loop whose first and last points
/// coincide. The outer ring winds one way and holes wind the other; this
/// is produced by reversing every ring but the first on deserialization.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Ring {
    points: Vec<GeographyPoint>,
}

impl Ring {
    pub fn new(points: Vec<GeographyPoint>) -> Self {
        Ring { points }
    }

    pub fn points(&self) -> &[GeographyPoint] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    fn reverse_interior(&mut self) {
        if self.points.len() > 2 {
            self.points[1..self.points.len() - 1].reverse();
        }
    }

    pub fn approximately_equal(&self, other: &Ring, epsilon: f64) -> bool {
        if self.points.len() != other.points.len() {
            return false;
        }
        self.points
            .iter()
            .zip(other.points.iter())
            .all(|(a, b)| a.approximately_equal(b, epsilon))
    }

    fn serialize_to(&self, buf: &mut OwnedBuffer, reverse: bool) -> Result<()> {
        buf.write_i8(0)?;
        buf.write_i32(self.points.len() as i32 - 1)?;
        let indices: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((1..self.points.len()).rev())
        } else {
            Box::new(0..self.points.len() - 1)
        };
        for idx in indices {
            let (x, y, z) = self.points[idx].to_xyz();
            buf.write_f64(x)?;
            buf.write_f64(y)?;
            buf.write_f64(z)?;
        }
        buf.write_bytes(&[0u8; 38])?;
        Ok(())
    }
}

/// A polygon with holes: the first ring is the outer boundary, every
/// subsequent ring is a hole.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Geography {
    rings: Vec<Ring>,
}

impl Geography {
    pub fn new(rings: Vec<Ring>) -> Self {
        Geography { rings }
    }

    pub fn null() -> Self {
        Geography { rings: Vec::new() }
    }

    pub fn is_null(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn approximately_equal(&self, other: &Geography, epsilon: f64) -> bool {
        if self.rings.len() != other.rings.len() {
            return false;
        }
        self.rings
            .iter()
            .zip(other.rings.iter())
            .all(|(a, b)| a.approximately_equal(b, epsilon))
    }

    pub fn serialize_to(&self, buf: &mut OwnedBuffer) -> Result<()> {
        if self.is_null() {
            buf.write_i32(-1)?;
            return Ok(());
        }
        let start = buf.position();
        buf.write_i32(0)?; // placeholder for size
        buf.write_i8(0)?;
        buf.write_i8(1)?;
        buf.write_i8(0)?;
        buf.write_i32(self.rings.len() as i32)?;
        for (idx, ring) in self.rings.iter().enumerate() {
            ring.serialize_to(buf, idx > 0)?;
        }
        buf.write_bytes(&[0u8; 33])?;
        let size = buf.position() - start;
        buf.put_i32(start, size as i32 - 4)?;
        Ok(())
    }

    pub fn deserialize_from(view: &mut BufferView<'_>) -> Result<Geography> {
        let len = view.read_i32()?;
        if len == -1 {
            return Ok(Geography::null());
        }
        let _ = view.read_i8()?;
        let _ = view.read_i8()?;
        let _ = view.read_i8()?;
        let num_rings = view.read_i32()?;
        if num_rings < 0 {
            return Err(ClientError::protocol("negative ring count"));
        }
        let mut rings = Vec::with_capacity(num_rings as usize);
        for idx in 0..num_rings {
            let _ = view.read_i8()?;
            let num_verts = view.read_i32()?;
            if num_verts < 3 {
                return Err(ClientError::protocol("ring has fewer than 3 vertices"));
            }
            let mut points = Vec::with_capacity(num_verts as usize + 1);
            for _ in 0..num_verts {
                let x = view.read_f64()?;
                let y = view.read_f64()?;
                let z = view.read_f64()?;
                points.push(GeographyPoint::from_xyz(x, y, z));
            }
            let _ = view.read_bytes(38)?;
            points.push(points[0]);
            let mut ring = Ring::new(points);
            if idx > 0 {
                ring.reverse_interior();
            }
            rings.push(ring);
        }
        let _ = view.read_bytes(33)?;
        Ok(Geography { rings })
    }
}

#[cfg(feature = "geo-types")]
mod geo_types_interop {
    use super::{Geography, GeographyPoint, Ring};
    use crate::error::{ClientError, Result};

    impl TryFrom<geo_types::Point<f64>> for GeographyPoint {
        type Error = ClientError;

        fn try_from(value: geo_types::Point<f64>) -> Result<Self> {
            GeographyPoint::new(value.x(), value.y())
        }
    }

    impl TryFrom<GeographyPoint> for geo_types::Point<f64> {
        type Error = ClientError;

        fn try_from(value: GeographyPoint) -> Result<Self> {
            if value.is_null() {
                return Err(ClientError::CoordinateOutOfRange(
                    "cannot convert a NULL point to geo_types::Point",
                ));
            }
            Ok(geo_types::Point::new(value.longitude, value.latitude))
        }
    }

    impl TryFrom<geo_types::LineString<f64>> for Ring {
        type Error = ClientError;

        fn try_from(value: geo_types::LineString<f64>) -> Result<Self> {
            let points = value
                .points()
                .map(GeographyPoint::try_from)
                .collect::<Result<Vec<_>>>()?;
            Ok(Ring::new(points))
        }
    }

    impl TryFrom<&Ring> for geo_types::LineString<f64> {
        type Error = ClientError;

        fn try_from(value: &Ring) -> Result<Self> {
            let coords = value
                .points
                .iter()
                .map(|p| geo_types::Point::try_from(*p).map(|pt| pt.0))
                .collect::<Result<Vec<_>>>()?;
            Ok(geo_types::LineString::new(coords))
        }
    }

    impl TryFrom<geo_types::Polygon<f64>> for Geography {
        type Error = ClientError;

        fn try_from(value: geo_types::Polygon<f64>) -> Result<Self> {
            let (exterior, interiors) = value.into_inner();
            let mut rings = Vec::with_capacity(1 + interiors.len());
            rings.push(Ring::try_from(exterior)?);
            for interior in interiors {
                rings.push(Ring::try_from(interior)?);
            }
            Ok(Geography::new(rings))
        }
    }

    impl TryFrom<&Geography> for geo_types::Polygon<f64> {
        type Error = ClientError;

        fn try_from(value: &Geography) -> Result<Self> {
            if value.is_null() {
                return Err(ClientError::CoordinateOutOfRange(
                    "cannot convert a NULL geography to geo_types::Polygon",
                ));
            }
            let exterior = geo_types::LineString::try_from(&value.rings[0])?;
            let interiors = value.rings[1..]
                .iter()
                .map(geo_types::LineString::try_from)
                .collect::<Result<Vec<_>>>()?;
            Ok(geo_types::Polygon::new(exterior, interiors))
        }
    }
}
