//! Best-effort geometry metrics for display.
//!
//! Geometries are kept as raw GeoJSON values: the map layer understands them
//! as-is and the metrics below only need to walk coordinate arrays. Malformed
//! input yields `None`, never an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kilometres per degree, applied uniformly to both axes.
pub const KM_PER_DEGREE: f64 = 111.32;

// ─── Geometry ────────────────────────────────────────────────────────────────

/// A GeoJSON geometry, feature or feature collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Geometry(pub Value);

impl From<Value> for Geometry {
  fn from(value: Value) -> Self { Self(value) }
}

impl Geometry {
  pub fn bounding_box(&self) -> Option<BoundingBox> { compute_bounding_box(self) }

  pub fn approx_area_km2(&self) -> Option<f64> { compute_approx_area_km2(self) }

  pub fn metrics(&self) -> ShapeMetrics {
    ShapeMetrics {
      bbox:     self.bounding_box(),
      area_km2: self.approx_area_km2(),
    }
  }
}

/// Metrics computed once per geometry and cached beside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeMetrics {
  pub bbox:     Option<BoundingBox>,
  pub area_km2: Option<f64>,
}

// ─── Bounding box ────────────────────────────────────────────────────────────

/// `[min_lon, min_lat, max_lon, max_lat]`, serialised as a four-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 4]", from = "[f64; 4]")]
pub struct BoundingBox {
  pub min_lon: f64,
  pub min_lat: f64,
  pub max_lon: f64,
  pub max_lat: f64,
}

impl BoundingBox {
  fn point(lon: f64, lat: f64) -> Self {
    Self { min_lon: lon, min_lat: lat, max_lon: lon, max_lat: lat }
  }

  fn extend(&mut self, lon: f64, lat: f64) {
    self.min_lon = self.min_lon.min(lon);
    self.min_lat = self.min_lat.min(lat);
    self.max_lon = self.max_lon.max(lon);
    self.max_lat = self.max_lat.max(lat);
  }

  pub fn as_array(&self) -> [f64; 4] {
    [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
  }
}

impl From<BoundingBox> for [f64; 4] {
  fn from(b: BoundingBox) -> Self { b.as_array() }
}

impl From<[f64; 4]> for BoundingBox {
  fn from([min_lon, min_lat, max_lon, max_lat]: [f64; 4]) -> Self {
    Self { min_lon, min_lat, max_lon, max_lat }
  }
}

/// Min/max longitude and latitude over every position in `geometry`.
///
/// Walks nested coordinate arrays of any depth, descending through
/// `coordinates`, `geometries`, `geometry` and `features`. Returns `None` when
/// no valid position is found.
pub fn compute_bounding_box(geometry: &Geometry) -> Option<BoundingBox> {
  let mut acc: Option<BoundingBox> = None;
  walk_positions(&geometry.0, &mut |lon, lat| {
    acc = Some(match acc {
      Some(mut b) => {
        b.extend(lon, lat);
        b
      }
      None => BoundingBox::point(lon, lat),
    });
  });
  acc
}

fn walk_positions(value: &Value, visit: &mut impl FnMut(f64, f64)) {
  match value {
    Value::Array(items) => match position(items) {
      Some((lon, lat)) => visit(lon, lat),
      None => items.iter().for_each(|item| walk_positions(item, visit)),
    },
    Value::Object(map) => {
      for key in ["coordinates", "geometries", "geometry", "features"] {
        if let Some(child) = map.get(key) {
          walk_positions(child, visit);
        }
      }
    }
    _ => {}
  }
}

/// `[lon, lat, ...]` with finite numbers; extra dimensions are ignored.
fn position(items: &[Value]) -> Option<(f64, f64)> {
  let [Value::Number(lon), Value::Number(lat), ..] = items else {
    return None;
  };
  let (lon, lat) = (lon.as_f64()?, lat.as_f64()?);
  (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
}

// ─── Area ────────────────────────────────────────────────────────────────────

/// Approximate area in km²: planar shoelace over each polygon's exterior ring
/// in degrees, scaled by [`KM_PER_DEGREE`]².
///
/// Holes are ignored and longitude is not foreshortened by latitude, so the
/// figure overstates area away from the equator. Only polygonal geometries
/// contribute; `None` when there are none.
pub fn compute_approx_area_km2(geometry: &Geometry) -> Option<f64> {
  let mut rings = Vec::new();
  collect_exterior_rings(&geometry.0, &mut rings);
  if rings.is_empty() {
    return None;
  }
  let square_degrees: f64 = rings.iter().map(|ring| shoelace(ring)).sum();
  Some(square_degrees * KM_PER_DEGREE * KM_PER_DEGREE)
}

fn collect_exterior_rings(value: &Value, rings: &mut Vec<Vec<(f64, f64)>>) {
  let Some(map) = value.as_object() else { return };
  let kind = map.get("type").and_then(Value::as_str).unwrap_or_default();

  match kind {
    "Polygon" => rings.extend(children(map, "coordinates").first().and_then(ring)),
    "MultiPolygon" => rings.extend(
      children(map, "coordinates")
        .iter()
        .filter_map(|polygon| polygon.as_array()?.first().and_then(ring)),
    ),
    "GeometryCollection" => {
      children(map, "geometries").iter().for_each(|g| collect_exterior_rings(g, rings))
    }
    "FeatureCollection" => {
      children(map, "features").iter().for_each(|f| collect_exterior_rings(f, rings))
    }
    "Feature" => {
      if let Some(g) = map.get("geometry") {
        collect_exterior_rings(g, rings);
      }
    }
    _ => {}
  }
}

fn children<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
  map
    .get(key)
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or_default()
}

/// A ring of at least three valid positions.
fn ring(value: &Value) -> Option<Vec<(f64, f64)>> {
  let points = value
    .as_array()?
    .iter()
    .map(|p| position(p.as_array()?))
    .collect::<Option<Vec<_>>>()?;
  (points.len() >= 3).then_some(points)
}

/// Planar area of a ring, closed or open.
fn shoelace(ring: &[(f64, f64)]) -> f64 {
  let twice: f64 = ring
    .iter()
    .zip(ring.iter().cycle().skip(1))
    .map(|((x1, y1), (x2, y2))| x1 * y2 - x2 * y1)
    .sum();
  twice.abs() / 2.0
}
