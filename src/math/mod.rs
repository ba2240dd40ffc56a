// This file is part of flandmark-rs, a facial landmark detector implementing the method described in the following paper:
//
//      Detector of Facial Landmarks Learned by the Structured Output SVM,
//      Michal Uricar, Vojtech Franc, Vaclav Hlavac.
//      In VISAPP 2012.
//
// flandmark-rs is distributed under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use num::traits::{Float, NumCast};

pub fn vector_inner_product<T: Float>(left: &[T], right: &[T]) -> T {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right.iter())
        .fold(T::zero(), |acc, (&l, &r)| acc + l * r)
}

/// Inner product of a real vector with an integer one, as used by the deformation costs.
pub fn mixed_inner_product<T: Float>(left: &[T], right: &[i32]) -> T {
    debug_assert_eq!(left.len(), right.len());
    left.iter().zip(right.iter()).fold(T::zero(), |acc, (&l, &r)| {
        acc + l * <T as NumCast>::from(r).unwrap_or_else(T::zero)
    })
}

/// Inner product of `w` with a one-hot encoded vector given by its nonzero indices.
pub fn sparse_gather_sum<T: Float>(w: &[T], indices: &[u32]) -> T {
    indices
        .iter()
        .fold(T::zero(), |acc, &index| acc + w[index as usize])
}

/// Index and value of the maximum, the first one wins ties.
pub fn argmax<T: Float>(values: &[T]) -> Option<(usize, T)> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, max)) if !(v > max) => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// `floor(value + 0.5)`, `None` when the result does not fit into an `i32`.
#[inline]
pub fn round_half_up<T: Float>(value: T) -> Option<i32> {
    let half = T::from(0.5)?;
    (value + half).floor().to_i32()
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_vector_inner_product() {
        let vec = vec![1.0, 2.0, 3.0];
        assert_eq!(14.0, vector_inner_product(&vec, &vec));
    }

    #[test]
    fn test_mixed_inner_product() {
        let w = vec![0.5, -1.0, 2.0];
        assert_eq!(-1.5, mixed_inner_product(&w, &[1, 4, 1]));
    }

    #[test]
    fn test_sparse_gather_sum() {
        let w = vec![1.0, 2.0, 4.0, 8.0];
        assert_eq!(13.0, sparse_gather_sum(&w, &[0, 2, 3]));
        assert_eq!(0.0, sparse_gather_sum(&w, &[]));
    }

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(Some((1, 3.0)), argmax(&[1.0, 3.0, 3.0, -2.0]));
        assert_eq!(None, argmax::<f64>(&[]));
        assert_eq!(Some((0, f64::NEG_INFINITY)), argmax(&[f64::NEG_INFINITY]));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(Some(3), round_half_up(2.5));
        assert_eq!(Some(2), round_half_up(2.49));
        assert_eq!(Some(-2), round_half_up(-2.5));
        assert_eq!(Some(-3), round_half_up(-2.51));
    }

    #[test]
    fn test_round_half_up_out_of_range() {
        assert_eq!(Some(i32::MAX), round_half_up(<f64 as From<i32>>::from(i32::MAX)));
        assert_eq!(None, round_half_up(4.0e9));
        assert_eq!(None, round_half_up(-4.0e9));
        assert_eq!(None, round_half_up(f64::NAN));
        assert_eq!(None, round_half_up(f64::INFINITY));
    }
}
