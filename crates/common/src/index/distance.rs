//! Vector math used by the index and the chunker

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Squared Euclidean distance. Callers guarantee equal lengths.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0;
    let n = a.len().min(b.len());
    let mut i = 0;

    // Unrolling 4
    while i + 3 < n {
        let d0 = a[i] - b[i];
        let d1 = a[i + 1] - b[i + 1];
        let d2 = a[i + 2] - b[i + 2];
        let d3 = a[i + 3] - b[i + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
        i += 4;
    }

    while i < n {
        let d = a[i] - b[i];
        sum += d * d;
        i += 1;
    }

    sum
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let ma = magnitude(a);
    let mb = magnitude(b);
    if ma == 0.0 || mb == 0.0 {
        return 0.0;
    }
    dot / (ma * mb)
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let mag = magnitude(v);
    if mag > 0.0 {
        for x in v.iter_mut() {
            *x /= mag;
        }
    }
}

/// Arithmetic mean of the selected rows
pub fn mean_of(rows: &[Vec<f32>], indices: &[usize]) -> Option<Vec<f32>> {
    let first = rows.get(*indices.first()?)?;
    let mut mean = vec![0.0f32; first.len()];

    for &i in indices {
        let row = rows.get(i)?;
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }

    let n = indices.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    Some(mean)
}
