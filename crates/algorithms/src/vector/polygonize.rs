//! Raster to polygon conversion
//!
//! Connected regions of equal (integer-truncated) value become one feature
//! each. Region outlines are traced along cell edges, so every vertex lies
//! on a cell corner.

use geo::orient::{Direction, Orient};
use geo::{Contains, Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use slopeclass_core::raster::Raster;
use slopeclass_core::vector::{AttributeValue, Feature, FeatureCollection};
use slopeclass_core::{Error, Result};
use std::collections::{HashMap, VecDeque};

/// Which neighbours join cells into one region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge neighbours only
    #[default]
    Four,
    /// Edge and corner neighbours
    Eight,
}

/// Parameters for polygonization
#[derive(Debug, Clone)]
pub struct PolygonizeParams {
    /// Attribute receiving the region value
    pub field: String,
    pub connectivity: Connectivity,
}

impl Default for PolygonizeParams {
    fn default() -> Self {
        Self {
            field: "DN".to_string(),
            connectivity: Connectivity::Four,
        }
    }
}

/// Corner in pixel space: x = column, y = row (y grows downwards)
type Vertex = (i64, i64);

/// Boundary edge, oriented with the region on its right-hand side
#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
}

impl Edge {
    fn direction(&self) -> Vertex {
        (self.to.0 - self.from.0, self.to.1 - self.from.1)
    }
}

// Turns in y-down pixel space
fn turn_right(d: Vertex) -> Vertex {
    (-d.1, d.0)
}

fn turn_left(d: Vertex) -> Vertex {
    (d.1, -d.0)
}

const NO_REGION: u32 = u32::MAX;

/// Polygonize a raster.
///
/// Cells are grouped by the integer part of their value. No-data cells are
/// not polygonized. Each region yields one feature whose geometry is a
/// polygon (with holes where other regions are enclosed) and whose
/// `params.field` attribute holds the region value.
pub fn polygonize(raster: &Raster<f64>, params: &PolygonizeParams) -> Result<FeatureCollection> {
    if params.field.trim().is_empty() {
        return Err(Error::InvalidParameter {
            name: "field",
            value: params.field.clone(),
            reason: "field name must not be empty".into(),
        });
    }

    let (rows, cols) = raster.shape();
    let values: Vec<Option<i64>> = raster
        .data()
        .indexed_iter()
        .map(|((r, c), _)| {
            raster
                .valid_at(r, c)
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64)
        })
        .collect();

    let (labels, region_values) = label_regions(&values, rows, cols, params.connectivity);
    let edges = boundary_edges(&labels, rows, cols, region_values.len());

    tracing::debug!(
        "Polygonizing {}x{}: {} region(s) ({:?}-connected)",
        cols,
        rows,
        region_values.len(),
        params.connectivity
    );

    let transform = raster.transform();
    let to_geo = |v: &Vertex| {
        let (x, y) = transform.apply(v.0 as f64, v.1 as f64);
        Coord { x, y }
    };

    let mut collection = FeatureCollection::with_crs(raster.crs().cloned());
    for (region, value) in region_values.iter().enumerate() {
        let rings = trace_rings(&edges[region], params.connectivity);
        let polygons = assemble(rings);

        let mut geo_polygons: Vec<Polygon<f64>> = polygons
            .into_iter()
            .map(|(outer, holes)| {
                let exterior = LineString::new(outer.iter().map(to_geo).collect());
                let interiors = holes
                    .iter()
                    .map(|h| LineString::new(h.iter().map(to_geo).collect()))
                    .collect();
                Polygon::new(exterior, interiors).orient(Direction::Default)
            })
            .collect();

        let geometry: Geometry<f64> = if geo_polygons.len() == 1 {
            geo_polygons.remove(0).into()
        } else {
            MultiPolygon::new(geo_polygons).into()
        };

        let mut feature = Feature::new(geometry);
        feature.set_property(params.field.clone(), AttributeValue::Int(*value));
        collection.push(feature);
    }

    Ok(collection)
}

/// Flood-fill labelling; returns per-cell region ids and each region's value
fn label_regions(
    values: &[Option<i64>],
    rows: usize,
    cols: usize,
    connectivity: Connectivity,
) -> (Vec<u32>, Vec<i64>) {
    let offsets: &[(isize, isize)] = match connectivity {
        Connectivity::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
        Connectivity::Eight => &[
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ],
    };

    let mut labels = vec![NO_REGION; rows * cols];
    let mut region_values = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..rows * cols {
        let Some(value) = values[start] else { continue };
        if labels[start] != NO_REGION {
            continue;
        }

        let id = region_values.len() as u32;
        region_values.push(value);
        labels[start] = id;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let (r, c) = ((idx / cols) as isize, (idx % cols) as isize);
            for &(dr, dc) in offsets {
                let (nr, nc) = (r + dr, c + dc);
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }
                let n = nr as usize * cols + nc as usize;
                if labels[n] == NO_REGION && values[n] == Some(value) {
                    labels[n] = id;
                    queue.push_back(n);
                }
            }
        }
    }

    (labels, region_values)
}

/// Cell sides separating a region from anything else, grouped by region
fn boundary_edges(labels: &[u32], rows: usize, cols: usize, regions: usize) -> Vec<Vec<Edge>> {
    let mut edges = vec![Vec::new(); regions];
    let label_at = |r: isize, c: isize| {
        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            NO_REGION
        } else {
            labels[r as usize * cols + c as usize]
        }
    };

    for r in 0..rows as isize {
        for c in 0..cols as isize {
            let id = label_at(r, c);
            if id == NO_REGION {
                continue;
            }
            let (x, y) = (c as i64, r as i64);
            let region = &mut edges[id as usize];
            if label_at(r - 1, c) != id {
                region.push(Edge { from: (x, y), to: (x + 1, y) });
            }
            if label_at(r, c + 1) != id {
                region.push(Edge { from: (x + 1, y), to: (x + 1, y + 1) });
            }
            if label_at(r + 1, c) != id {
                region.push(Edge { from: (x + 1, y + 1), to: (x, y + 1) });
            }
            if label_at(r, c - 1) != id {
                region.push(Edge { from: (x, y + 1), to: (x, y) });
            }
        }
    }

    edges
}

/// Chain a region's boundary edges into closed rings (first vertex not repeated)
fn trace_rings(edges: &[Edge], connectivity: Connectivity) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut ring = vec![edges[start].from];
        let mut current = start;

        loop {
            let edge = edges[current];
            let d = edge.direction();
            // At a corner shared by diagonal cells, 4-connectivity keeps
            // them apart (hug the cell) and 8-connectivity joins them
            let preference = match connectivity {
                Connectivity::Four => [turn_right(d), d, turn_left(d)],
                Connectivity::Eight => [turn_left(d), d, turn_right(d)],
            };

            let candidates = outgoing.get(&edge.to).map(Vec::as_slice).unwrap_or(&[]);
            let next = preference.iter().find_map(|want| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| (i == start || !used[i]) && edges[i].direction() == *want)
            });

            match next {
                Some(i) if i == start => break,
                Some(i) => {
                    used[i] = true;
                    ring.push(edges[i].from);
                    current = i;
                }
                // Open chain; cannot happen for edges of a closed boundary
                None => break,
            }
        }

        rings.push(ring);
    }

    rings.into_iter().map(remove_collinear).collect()
}

fn remove_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let here = ring[i];
            let next = ring[(i + 1) % n];
            let cross = (here.0 - prev.0) * (next.1 - here.1) - (here.1 - prev.1) * (next.0 - here.0);
            cross != 0
        })
        .map(|i| ring[i])
        .collect()
}

/// Twice the signed area in pixel space; positive for outer rings
fn signed_area2(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum()
}

fn closed(ring: &[Vertex]) -> Vec<Vertex> {
    let mut out = ring.to_vec();
    if let Some(&first) = ring.first() {
        out.push(first);
    }
    out
}

/// Group rings into (outer, holes) polygons, rings closed
fn assemble(rings: Vec<Vec<Vertex>>) -> Vec<(Vec<Vertex>, Vec<Vec<Vertex>>)> {
    let (outers, holes): (Vec<_>, Vec<_>) = rings
        .into_iter()
        .filter(|r| r.len() >= 3)
        .partition(|r| signed_area2(r) > 0);

    let mut polygons: Vec<(Vec<Vertex>, Vec<Vec<Vertex>>)> =
        outers.iter().map(|o| (closed(o), Vec::new())).collect();

    if polygons.len() == 1 {
        polygons[0].1 = holes.iter().map(|h| closed(h)).collect();
        return polygons;
    }

    let shapes: Vec<Polygon<f64>> = polygons
        .iter()
        .map(|(outer, _)| {
            Polygon::new(
                LineString::from(outer.iter().map(|&(x, y)| (x as f64, y as f64)).collect::<Vec<_>>()),
                vec![],
            )
        })
        .collect();

    for hole in holes {
        // Centre of the cell on the hole side of its first edge
        let (a, b) = (hole[0], hole[1]);
        let left = turn_left((b.0 - a.0, b.1 - a.1));
        let probe = Point::new(
            (a.0 + b.0) as f64 / 2.0 + left.0 as f64 * 0.5,
            (a.1 + b.1) as f64 / 2.0 + left.1 as f64 * 0.5,
        );
        if let Some(k) = shapes.iter().position(|s| s.contains(&probe)) {
            polygons[k].1.push(closed(&hole));
        }
    }

    polygons
}
