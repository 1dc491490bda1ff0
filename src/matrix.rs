use crate::errors::SamplingError;

/// Transpose an M x N row-major matrix into its N x M counterpart.
///
/// A matrix with no rows, or whose first row is empty, transposes to an empty matrix.
pub fn transpose_matrix<T: Clone>(matrix: &[Vec<T>]) -> Result<Vec<Vec<T>>, SamplingError> {
    let Some(n) = matrix.first().map(Vec::len).filter(|&n| n > 0) else {
        return Ok(vec![]);
    };

    if let Some((row, r)) = matrix.iter().enumerate().find(|(_, r)| r.len() != n) {
        return Err(SamplingError::InvalidDimension {
            reason: format!("row {row} has {} columns, expected {n}", r.len()),
        });
    }

    Ok((0..n)
        .map(|i| matrix.iter().map(|row| row[i].clone()).collect())
        .collect())
}

/// Inclusive ascending range `[min, min + 1, ..., max]`; empty when `min > max`.
pub fn create_x_array(min: i64, max: i64) -> Vec<i64> {
    (min..=max).collect()
}

/// `create_x_array` starting from 0.
pub fn create_x_array_to(max: i64) -> Vec<i64> {
    create_x_array(0, max)
}

#[test]
fn test_transpose() {
    let m = vec![vec![1, 2, 3], vec![4, 5, 6]];
    let t = transpose_matrix(&m).unwrap();
    assert_eq!(t, vec![vec![1, 4], vec![2, 5], vec![3, 6]]);
    assert_eq!(transpose_matrix(&t).unwrap(), m);
}

#[test]
fn test_transpose_empty() {
    let no_rows: Vec<Vec<f64>> = vec![];
    assert!(transpose_matrix(&no_rows).unwrap().is_empty());

    let no_cols: Vec<Vec<f64>> = vec![vec![], vec![]];
    assert!(transpose_matrix(&no_cols).unwrap().is_empty());
}

#[test]
fn test_transpose_ragged() {
    let ragged = vec![vec![1.0, 2.0], vec![3.0]];
    assert_eq!(
        transpose_matrix(&ragged),
        Err(SamplingError::InvalidDimension {
            reason: "row 1 has 1 columns, expected 2".to_string()
        })
    );
}

#[test]
fn test_create_x_array() {
    assert_eq!(create_x_array(1, 5), vec![1, 2, 3, 4, 5]);
    assert!(create_x_array(5, 1).is_empty());
    assert_eq!(create_x_array(-1, 1), vec![-1, 0, 1]);
    assert_eq!(create_x_array_to(3), vec![0, 1, 2, 3]);
}
