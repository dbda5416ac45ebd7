//!这个是给 batch 张量的数值类型提供泛型支持的模块
use num_traits::identities::Zero;
use std::fmt::{Debug, Display};

/// Element type of the batched tensors handed to the networks.
///
/// Structures always compute their descriptors in `f64`; the processor casts
/// them once, when a batch is assembled.
pub trait TensorFloat: Copy + Clone + Zero + Debug + Display + PartialOrd + Send + Sync {
    fn from_f64(x: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl TensorFloat for f32 {
    #[inline(always)]
    fn from_f64(x: f64) -> Self {
        x as f32
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl TensorFloat for f64 {
    #[inline(always)]
    fn from_f64(x: f64) -> Self {
        x
    }
    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_round_trip_small_integers() {
        // frame indices are stored in the float tensor, they must survive the cast
        for i in 0..1024_usize {
            assert_eq!(f32::from_f64(i as f64).to_f64(), i as f64);
        }
    }
}
