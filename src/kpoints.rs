use crate::error::{Result, TbError};
use ndarray::Array2;

/// Generate a uniform, Γ-centred k-mesh in fractional coordinates.
///
/// The last axis runs fastest, so for `k_mesh = [2, 3]` the rows are
/// `(0,0), (0,1/3), (0,2/3), (1/2,0), ...`. The result is typically the
/// k-points a [`Processor`](crate::Processor) carries through to every batch.
pub fn gen_kmesh(k_mesh: &[usize]) -> Result<Array2<f64>> {
    let dim = k_mesh.len();
    if !(1..=3).contains(&dim) {
        return Err(TbError::InvalidDimension {
            dim,
            supported: vec![1, 2, 3],
        });
    }
    if k_mesh.iter().any(|&n| n == 0) {
        return Err(TbError::InvalidConfiguration(format!(
            "every k-mesh direction needs at least one point, got {:?}",
            k_mesh
        )));
    }
    let nk: usize = k_mesh.iter().product();
    let mut kvec = Array2::<f64>::zeros((nk, dim));
    for (ik, mut k) in kvec.outer_iter_mut().enumerate() {
        // 把 ik 拆成每个方向上的指标
        let mut rest = ik;
        for r0 in (0..dim).rev() {
            let n = k_mesh[r0];
            k[r0] = (rest % n) as f64 / n as f64;
            rest /= n;
        }
    }
    Ok(kvec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gen_kmesh() {
        let kmesh = gen_kmesh(&[2, 3]).unwrap();
        assert_eq!(kmesh.shape(), &[6, 2]);
        assert_relative_eq!(kmesh[[1, 1]], 1.0 / 3.0);
        assert_relative_eq!(kmesh[[3, 0]], 0.5);
        assert_relative_eq!(kmesh[[3, 1]], 0.0);
        assert_relative_eq!(kmesh[[5, 1]], 2.0 / 3.0);
    }

    #[test]
    fn test_gen_kmesh_gamma_only() {
        let kmesh = gen_kmesh(&[1, 1, 1]).unwrap();
        assert_eq!(kmesh.shape(), &[1, 3]);
        assert!(kmesh.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_gen_kmesh_rejects_bad_input() {
        assert!(matches!(
            gen_kmesh(&[2, 2, 2, 2]),
            Err(TbError::InvalidDimension { dim: 4, .. })
        ));
        assert!(matches!(gen_kmesh(&[]), Err(TbError::InvalidDimension { .. })));
        assert!(matches!(
            gen_kmesh(&[3, 0]),
            Err(TbError::InvalidConfiguration(_))
        ));
    }
}
