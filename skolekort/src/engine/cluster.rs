//! Greedy grid clustering of point features.
//!
//! Works level by level from the deepest zoom up: at every zoom each not yet visited node absorbs
//! the unvisited nodes within the cluster radius, and the weighted center of the group becomes a
//! node of the next level. Cluster ids encode the index of the origin node and its zoom level, so
//! children and expansion zoom are resolved without extra lookup tables.

use ahash::AHashMap;
use serde_json::{Map, Value};
use skolekort_types::{mercator, LngLat};

use crate::error::MapError;

/// Clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterOptions {
    /// Lowest zoom level clusters are built for.
    pub min_zoom: u8,
    /// Highest zoom level points are clustered at. Above it every point is shown individually.
    pub max_zoom: u8,
    /// Cluster radius in pixels.
    pub radius: f64,
    /// Tile extent the radius is measured against.
    pub extent: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 14,
            radius: 50.0,
            extent: mercator::TILE_SIZE,
        }
    }
}

/// What a node of the index stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Single input point, by its index in the input.
    Point(usize),
    /// Aggregate of several points.
    Cluster {
        /// Cluster id.
        id: u64,
        /// Number of input points in the cluster.
        count: u64,
    },
}

/// Node of one zoom level of the index.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    x: f64,
    y: f64,
    kind: NodeKind,
    parent: Option<u64>,
}

impl ClusterNode {
    /// Position of the node. For clusters it is the mean position of the aggregated points.
    pub fn position(&self) -> LngLat {
        mercator::unproject(self.x, self.y)
    }

    /// What the node stands for.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    fn count(&self) -> u64 {
        match self.kind {
            NodeKind::Point(_) => 1,
            NodeKind::Cluster { count, .. } => count,
        }
    }
}

/// Clustering index over a set of point features.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    options: ClusterOptions,
    properties: Vec<Map<String, Value>>,
    // Level `z` holds the nodes visible at zoom `z`. The last level holds the input points.
    levels: Vec<Vec<ClusterNode>>,
}

impl ClusterIndex {
    /// Builds the index.
    pub fn new(points: Vec<(LngLat, Map<String, Value>)>, options: ClusterOptions) -> Self {
        let mut properties = Vec::with_capacity(points.len());
        let mut nodes = Vec::with_capacity(points.len());
        for (index, (position, props)) in points.into_iter().enumerate() {
            let (x, y) = mercator::project(position);
            nodes.push(ClusterNode {
                x,
                y,
                kind: NodeKind::Point(index),
                parent: None,
            });
            properties.push(props);
        }

        let depth = options.max_zoom as usize + 2;
        let mut levels = vec![Vec::new(); depth];
        levels[depth - 1] = nodes;

        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let z = zoom as usize;
            let clustered = cluster_level(&mut levels[z + 1], zoom, &options);
            levels[z] = clustered;
        }

        Self {
            options,
            properties,
            levels,
        }
    }

    /// Clustering parameters.
    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Properties of the input point with the given index.
    pub fn point_properties(&self, index: usize) -> Option<&Map<String, Value>> {
        self.properties.get(index)
    }

    /// Nodes visible at the given zoom.
    pub fn nodes(&self, zoom: f64) -> &[ClusterNode] {
        &self.levels[self.limit_zoom(zoom)]
    }

    /// Properties of a node as they are exposed to layers: a copy of the point properties, or the
    /// cluster properties (`cluster`, `cluster_id`, `point_count`, `point_count_abbreviated`).
    pub fn node_properties(&self, node: &ClusterNode) -> Map<String, Value> {
        match node.kind {
            NodeKind::Point(index) => self.properties.get(index).cloned().unwrap_or_default(),
            NodeKind::Cluster { id, count } => {
                let mut props = Map::new();
                props.insert("cluster".into(), true.into());
                props.insert("cluster_id".into(), id.into());
                props.insert("point_count".into(), count.into());
                props.insert("point_count_abbreviated".into(), abbreviate_count(count));
                props
            }
        }
    }

    /// Direct children of a cluster: the nodes it was built from.
    pub fn children(&self, cluster_id: u64) -> Result<Vec<&ClusterNode>, MapError> {
        let origin_zoom = (cluster_id % 32) as usize;
        let origin_index = (cluster_id >> 5) as usize;
        let level = self
            .levels
            .get(origin_zoom)
            .filter(|level| origin_index < level.len() && origin_zoom > 0)
            .ok_or(MapError::UnknownCluster(cluster_id))?;

        let children: Vec<_> = level
            .iter()
            .filter(|node| node.parent == Some(cluster_id))
            .collect();

        if children.is_empty() {
            return Err(MapError::UnknownCluster(cluster_id));
        }

        Ok(children)
    }

    /// Lowest zoom at which the cluster breaks into more than one node.
    pub fn expansion_zoom(&self, cluster_id: u64) -> Result<f64, MapError> {
        let mut cluster_id = cluster_id;
        let mut zoom = (cluster_id % 32) as i64 - 1;
        while zoom <= self.options.max_zoom as i64 {
            let children = self.children(cluster_id)?;
            zoom += 1;
            if children.len() != 1 {
                break;
            }

            match children[0].kind {
                NodeKind::Cluster { id, .. } => cluster_id = id,
                NodeKind::Point(_) => break,
            }
        }

        Ok(zoom as f64)
    }

    fn limit_zoom(&self, zoom: f64) -> usize {
        let deepest = self.options.max_zoom as f64 + 1.0;
        let zoom = if zoom.is_finite() { zoom.floor() } else { 0.0 };
        zoom.clamp(self.options.min_zoom as f64, deepest) as usize
    }
}

/// Label form of a point count: `950`, `1.5k`, `12k`.
pub fn abbreviate_count(count: u64) -> Value {
    if count >= 10_000 {
        Value::String(format!("{}k", (count as f64 / 1000.0).round()))
    } else if count >= 1000 {
        Value::String(format!("{}k", (count as f64 / 100.0).round() / 10.0))
    } else {
        Value::from(count)
    }
}

fn cluster_level(
    nodes: &mut [ClusterNode],
    zoom: u8,
    options: &ClusterOptions,
) -> Vec<ClusterNode> {
    let r = options.radius / (options.extent * 2f64.powi(zoom as i32));
    let cell = |x: f64, y: f64| ((x / r).floor() as i64, (y / r).floor() as i64);

    let mut grid: AHashMap<(i64, i64), Vec<usize>> = AHashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        grid.entry(cell(node.x, node.y)).or_default().push(index);
    }

    let mut visited = vec![false; nodes.len()];
    let mut result = Vec::new();

    for index in 0..nodes.len() {
        if visited[index] {
            continue;
        }
        visited[index] = true;

        let (x, y) = (nodes[index].x, nodes[index].y);
        let (cx, cy) = cell(x, y);
        let mut neighbors = Vec::new();
        for gx in cx - 1..=cx + 1 {
            for gy in cy - 1..=cy + 1 {
                let Some(candidates) = grid.get(&(gx, gy)) else {
                    continue;
                };
                for &candidate in candidates {
                    if visited[candidate] {
                        continue;
                    }
                    let dx = nodes[candidate].x - x;
                    let dy = nodes[candidate].y - y;
                    if dx * dx + dy * dy <= r * r {
                        neighbors.push(candidate);
                    }
                }
            }
        }

        if neighbors.is_empty() {
            let mut node = nodes[index].clone();
            node.parent = None;
            result.push(node);
            continue;
        }

        let id = ((index as u64) << 5) + zoom as u64 + 1;
        let mut count = nodes[index].count();
        let mut wx = x * count as f64;
        let mut wy = y * count as f64;
        nodes[index].parent = Some(id);

        for neighbor in neighbors {
            visited[neighbor] = true;
            let node = &mut nodes[neighbor];
            let weight = node.count();
            wx += node.x * weight as f64;
            wy += node.y * weight as f64;
            count += weight;
            node.parent = Some(id);
        }

        result.push(ClusterNode {
            x: wx / count as f64,
            y: wy / count as f64,
            kind: NodeKind::Cluster { id, count },
            parent: None,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use skolekort_types::lnglat;

    use super::*;

    fn point(lng: f64, lat: f64) -> (LngLat, Map<String, Value>) {
        (lnglat!(lng, lat), Map::new())
    }

    fn aarhus_cluster() -> ClusterIndex {
        ClusterIndex::new(
            vec![
                point(10.20, 56.15),
                point(10.21, 56.15),
                point(10.22, 56.16),
                point(12.57, 55.68),
            ],
            ClusterOptions::default(),
        )
    }

    #[test]
    fn close_points_merge_at_low_zoom() {
        let index = aarhus_cluster();
        let nodes = index.nodes(3.0);
        let counts: u64 = nodes.iter().map(|n| n.count()).sum();
        assert_eq!(counts, 4);
        assert!(nodes.len() < 4);
    }

    #[test]
    fn all_points_are_separate_above_max_zoom() {
        let index = aarhus_cluster();
        let nodes = index.nodes(20.0);
        assert_eq!(nodes.len(), 4);
        assert!(nodes.iter().all(|n| matches!(n.kind(), NodeKind::Point(_))));
    }

    #[test]
    fn cluster_center_is_weighted_mean() {
        let index = ClusterIndex::new(
            vec![point(10.0, 56.0), point(10.0002, 56.0)],
            ClusterOptions::default(),
        );
        let nodes = index.nodes(5.0);
        assert_eq!(nodes.len(), 1);
        assert_abs_diff_eq!(nodes[0].position().lng(), 10.0001, epsilon = 1e-9);
    }

    #[test]
    fn expansion_zoom_splits_cluster() {
        let index = aarhus_cluster();
        let zoom = 5.0;
        let cluster = index
            .nodes(zoom)
            .iter()
            .find_map(|n| match n.kind() {
                NodeKind::Cluster { id, .. } => Some(id),
                _ => None,
            })
            .expect("cluster at zoom 5");

        let expansion = index.expansion_zoom(cluster).expect("known cluster");
        assert!(expansion > zoom);
        let visible = index.nodes(expansion);
        assert!(visible.iter().all(|n| n.count() < 3));
        assert!(index.nodes(expansion - 1.0).len() < visible.len());
    }

    #[test]
    fn children_cover_cluster() {
        let index = aarhus_cluster();
        for node in index.nodes(2.0) {
            if let NodeKind::Cluster { id, count } = node.kind() {
                let children = index.children(id).expect("children");
                assert_eq!(children.iter().map(|c| c.count()).sum::<u64>(), count);
            }
        }
    }

    #[test]
    fn unknown_cluster() {
        let index = aarhus_cluster();
        assert!(matches!(
            index.expansion_zoom(999_999),
            Err(MapError::UnknownCluster(999_999))
        ));
    }

    #[test]
    fn cluster_properties() {
        let index = aarhus_cluster();
        let node = index
            .nodes(0.0)
            .iter()
            .find(|n| n.count() > 1)
            .expect("cluster")
            .clone();
        let props = index.node_properties(&node);
        assert_eq!(props["cluster"], Value::Bool(true));
        assert!(props["cluster_id"].is_u64());
        assert_eq!(props["point_count"], Value::from(node.count()));
    }

    #[test]
    fn abbreviations() {
        assert_eq!(abbreviate_count(950), Value::from(950u64));
        assert_eq!(abbreviate_count(1000), Value::String("1k".into()));
        assert_eq!(abbreviate_count(1540), Value::String("1.5k".into()));
        assert_eq!(abbreviate_count(12_400), Value::String("12k".into()));
    }
}
