//! Hierarchical density clustering of sentence embeddings
//!
//! Mutual-reachability minimum spanning tree, single-linkage hierarchy,
//! condensed tree, then excess-of-mass cluster selection. The root may be
//! selected as the only cluster, in which case only its most persistent
//! points keep the label and the rest become noise.

use papertrail_common::errors::{AppError, Result};

/// Cap for `1 / distance` when points coincide
const MAX_LAMBDA: f64 = 1e12;

/// Cluster label per point, `None` for noise
pub(crate) type Labels = Vec<Option<usize>>;

#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Debug, Default)]
struct CondensedTree {
    /// Parent cluster, `None` for the root
    parent: Vec<Option<usize>>,
    /// Lambda at which each cluster appeared
    birth: Vec<f64>,
    stability: Vec<f64>,
    /// Largest lambda of any row directly under each cluster
    max_child_lambda: Vec<f64>,
    /// (cluster, lambda) at which each point left the tree
    exits: Vec<(usize, f64)>,
}

impl CondensedTree {
    fn add_cluster(&mut self, parent: Option<usize>, birth: f64) -> usize {
        self.parent.push(parent);
        self.birth.push(birth);
        self.stability.push(0.0);
        self.max_child_lambda.push(0.0);
        self.parent.len() - 1
    }

    fn record(&mut self, cluster: usize, lambda: f64, size: usize) {
        self.stability[cluster] += (lambda - self.birth[cluster]) * size as f64;
        if lambda > self.max_child_lambda[cluster] {
            self.max_child_lambda[cluster] = lambda;
        }
    }

    fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.parent.len()];
        for (cluster, parent) in self.parent.iter().enumerate() {
            if let Some(p) = parent {
                children[*p].push(cluster);
            }
        }
        children
    }
}

/// Label `points`; every point gets a cluster or noise
pub(crate) fn cluster(
    points: &[Vec<f32>],
    min_cluster_size: usize,
    allow_single_cluster: bool,
) -> Result<Labels> {
    let n = points.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if n == 1 {
        return Ok(vec![Some(0)]);
    }
    let min_cluster_size = min_cluster_size.max(2);

    let distances = distance_matrix(points)?;
    let core = core_distances(&distances, min_cluster_size);
    let edges = mutual_reachability_mst(&distances, &core);
    let merges = single_linkage(n, edges);
    let tree = condense(n, &merges, min_cluster_size);
    let selected = select_clusters(&tree, allow_single_cluster);

    Ok(label_points(&tree, &selected))
}

fn distance_matrix(points: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
    let n = points.len();
    let dim = points[0].len();
    let mut distances = vec![vec![0.0f64; n]; n];

    for i in 0..n {
        if points[i].len() != dim {
            return Err(AppError::DimensionMismatch {
                expected: dim,
                got: points[i].len(),
            });
        }
        for j in (i + 1)..n {
            let d = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| {
                    let diff = f64::from(*a) - f64::from(*b);
                    diff * diff
                })
                .sum::<f64>()
                .sqrt();
            if !d.is_finite() {
                return Err(AppError::Clustering {
                    message: format!("non-finite distance between sentences {} and {}", i, j),
                });
            }
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }

    Ok(distances)
}

/// Distance to the k-th nearest point, counting the point itself
fn core_distances(distances: &[Vec<f64>], k: usize) -> Vec<f64> {
    distances
        .iter()
        .map(|row| {
            let mut sorted = row.clone();
            sorted.sort_by(f64::total_cmp);
            sorted[(k - 1).min(sorted.len() - 1)]
        })
        .collect()
}

/// Prim's algorithm over the dense mutual-reachability graph
fn mutual_reachability_mst(distances: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = distances.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = distances[current][j].max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
        }

        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < best[next]) {
                next = j;
            }
        }

        edges.push((from[next], next, best[next]));
        in_tree[next] = true;
        current = next;
    }

    edges
}

/// Dendrogram as in scipy linkage: merge `k` creates node `n + k`
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);

    for (k, (a, b, distance)) in edges.into_iter().enumerate() {
        let left = find(&mut parent, a);
        let right = find(&mut parent, b);
        let node = n + k;
        parent[left] = node;
        parent[right] = node;
        size[node] = size[left] + size[right];
        merges.push(Merge {
            left,
            right,
            distance,
            size: size[node],
        });
    }

    merges
}

fn find(parent: &mut [usize], x: usize) -> usize {
    let mut root = x;
    while parent[root] != root {
        root = parent[root];
    }
    let mut node = x;
    while parent[node] != root {
        let next = parent[node];
        parent[node] = root;
        node = next;
    }
    root
}

fn condense(n: usize, merges: &[Merge], min_cluster_size: usize) -> CondensedTree {
    let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

    let mut tree = CondensedTree {
        exits: vec![(0, 0.0); n],
        ..Default::default()
    };
    let root = tree.add_cluster(None, 0.0);

    let mut stack = vec![(2 * n - 2, root)];
    while let Some((node, cluster)) = stack.pop() {
        if node < n {
            let lambda = tree.max_child_lambda[cluster];
            tree.record(cluster, lambda, 1);
            tree.exits[node] = (cluster, lambda);
            continue;
        }

        let merge = merges[node - n];
        let lambda = if merge.distance > 0.0 {
            (1.0 / merge.distance).min(MAX_LAMBDA)
        } else {
            MAX_LAMBDA
        };
        let (left_size, right_size) = (node_size(merge.left), node_size(merge.right));
        let left_big = left_size >= min_cluster_size;
        let right_big = right_size >= min_cluster_size;

        match (left_big, right_big) {
            (true, true) => {
                tree.record(cluster, lambda, left_size + right_size);
                let left = tree.add_cluster(Some(cluster), lambda);
                let right = tree.add_cluster(Some(cluster), lambda);
                stack.push((merge.right, right));
                stack.push((merge.left, left));
            }
            (true, false) => {
                drop_points(&mut tree, n, merges, merge.right, cluster, lambda);
                stack.push((merge.left, cluster));
            }
            (false, true) => {
                drop_points(&mut tree, n, merges, merge.left, cluster, lambda);
                stack.push((merge.right, cluster));
            }
            (false, false) => {
                drop_points(&mut tree, n, merges, merge.left, cluster, lambda);
                drop_points(&mut tree, n, merges, merge.right, cluster, lambda);
            }
        }
    }

    tree
}

/// Every leaf under `node` leaves `cluster` at `lambda`
fn drop_points(
    tree: &mut CondensedTree,
    n: usize,
    merges: &[Merge],
    node: usize,
    cluster: usize,
    lambda: f64,
) {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if node < n {
            tree.record(cluster, lambda, 1);
            tree.exits[node] = (cluster, lambda);
        } else {
            let merge = merges[node - n];
            stack.push(merge.left);
            stack.push(merge.right);
        }
    }
}

/// Excess-of-mass selection; children always have larger ids than parents
fn select_clusters(tree: &CondensedTree, allow_single_cluster: bool) -> Vec<bool> {
    let count = tree.parent.len();
    let children = tree.children();
    let mut stability = tree.stability.clone();
    let mut selected = vec![false; count];

    for cluster in (0..count).rev() {
        if cluster == 0 && !allow_single_cluster {
            continue;
        }

        let subtree: f64 = children[cluster].iter().map(|&c| stability[c]).sum();
        if !children[cluster].is_empty() && subtree > stability[cluster] {
            stability[cluster] = subtree;
        } else {
            selected[cluster] = true;
            let mut stack = children[cluster].clone();
            while let Some(descendant) = stack.pop() {
                selected[descendant] = false;
                stack.extend_from_slice(&children[descendant]);
            }
        }
    }

    selected
}

fn label_points(tree: &CondensedTree, selected: &[bool]) -> Labels {
    let mut label_of = vec![None; selected.len()];
    let mut next = 0;
    for (cluster, &is_selected) in selected.iter().enumerate() {
        if is_selected {
            label_of[cluster] = Some(next);
            next += 1;
        }
    }

    let root_only = selected[0];

    tree.exits
        .iter()
        .map(|&(cluster, lambda)| {
            let mut current = Some(cluster);
            while let Some(c) = current {
                if selected[c] {
                    break;
                }
                current = tree.parent[c];
            }

            match current {
                Some(0) if root_only => {
                    (lambda >= tree.max_child_lambda[0]).then_some(0)
                }
                Some(c) => label_of[c],
                None => None,
            }
        })
        .collect()
}
