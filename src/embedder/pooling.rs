//! Mean pooling of token-level encoder output into one sentence vector.

/// Average `rows` (one per token) column-wise.
///
/// Every row is weighted equally; attention masking is not applied since
/// the local path never pads. Returns an empty vector for an empty matrix.
#[must_use]
pub fn mean_pool(rows: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let mut sums = vec![0.0f32; first.len()];
    for row in rows {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += value;
        }
    }

    let count = rows.len() as f32;
    for sum in &mut sums {
        *sum /= count;
    }
    sums
}
