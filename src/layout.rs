//! Physical layouts for buffers of 3-component vectors.
//!
//! Interleaved keeps x, y, z of one vector next to each other (x0,y0,z0,x1,...)
//! so a work item reads its triple in as few memory transactions as possible.
//! NativeVector stores one padded hardware vector per triple and relies on the
//! device's wide loads instead. Which one a build uses is fixed by the
//! `vector-type` feature through [`ActiveLayout`].

use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;

use crate::{
    error::VKVec3Error,
    real::{DeviceReal, HostScalar, Real},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutMode {
    Interleaved,
    NativeVector,
}

pub trait Layout3: 'static {
    type Scalar: DeviceReal;
    /// The unit the device buffer is an array of.
    type Element: Pod;

    const MODE: LayoutMode;
    const ELEMENTS_PER_VECTOR: usize;
    /// Scalars occupied by one vector, padding included.
    const COMPONENTS_PER_VECTOR: usize;

    fn pack<R: HostScalar>(xs: &[R], ys: &[R], zs: &[R]) -> Vec<Self::Element>;

    /// Unpacks `staging` into the first `staging.len() / ELEMENTS_PER_VECTOR`
    /// entries of each output.
    fn unpack<R: HostScalar>(staging: &[Self::Element], xs: &mut [R], ys: &mut [R], zs: &mut [R]);

    /// Device footprint of `count` vectors. Counts whose footprint does not
    /// fit in memory are an allocation error.
    fn byte_size(count: usize) -> Result<u64, VKVec3Error> {
        Self::element_count(count)?
            .checked_mul(std::mem::size_of::<Self::Element>())
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or_else(|| too_large(count))
    }

    fn element_count(count: usize) -> Result<usize, VKVec3Error> {
        count
            .checked_mul(Self::ELEMENTS_PER_VECTOR)
            .ok_or_else(|| too_large(count))
    }

    fn zeroed_staging(count: usize) -> Result<Vec<Self::Element>, VKVec3Error> {
        Ok(vec![Self::Element::zeroed(); Self::element_count(count)?])
    }
}

fn too_large(count: usize) -> VKVec3Error {
    VKVec3Error::Allocation(format!("{} vectors exceed the addressable buffer size", count))
}

pub struct Interleaved<S = Real>(PhantomData<S>);

pub struct NativeVector<S = Real>(PhantomData<S>);

impl<S: DeviceReal> Layout3 for Interleaved<S> {
    type Scalar = S;
    type Element = S;

    const MODE: LayoutMode = LayoutMode::Interleaved;
    const ELEMENTS_PER_VECTOR: usize = 3;
    const COMPONENTS_PER_VECTOR: usize = 3;

    fn pack<R: HostScalar>(xs: &[R], ys: &[R], zs: &[R]) -> Vec<S> {
        xs.iter()
            .zip(ys)
            .zip(zs)
            .flat_map(|((x, y), z)| [x.to_device::<S>(), y.to_device(), z.to_device()])
            .collect()
    }

    fn unpack<R: HostScalar>(staging: &[S], xs: &mut [R], ys: &mut [R], zs: &mut [R]) {
        for (i, v) in staging.chunks_exact(3).enumerate() {
            xs[i] = R::from_device(v[0]);
            ys[i] = R::from_device(v[1]);
            zs[i] = R::from_device(v[2]);
        }
    }
}

impl<S: DeviceReal> Layout3 for NativeVector<S> {
    type Scalar = S;
    type Element = S::Vec3;

    const MODE: LayoutMode = LayoutMode::NativeVector;
    const ELEMENTS_PER_VECTOR: usize = 1;
    const COMPONENTS_PER_VECTOR: usize = std::mem::size_of::<S::Vec3>() / std::mem::size_of::<S>();

    fn pack<R: HostScalar>(xs: &[R], ys: &[R], zs: &[R]) -> Vec<S::Vec3> {
        xs.iter()
            .zip(ys)
            .zip(zs)
            .map(|((x, y), z)| S::vec3(x.to_device(), y.to_device(), z.to_device()))
            .collect()
    }

    fn unpack<R: HostScalar>(staging: &[S::Vec3], xs: &mut [R], ys: &mut [R], zs: &mut [R]) {
        for (i, v) in staging.iter().enumerate() {
            let [x, y, z] = S::components(v);
            xs[i] = R::from_device(x);
            ys[i] = R::from_device(y);
            zs[i] = R::from_device(z);
        }
    }
}

#[cfg(feature = "vector-type")]
pub type ActiveLayout = NativeVector<Real>;

#[cfg(not(feature = "vector-type"))]
pub type ActiveLayout = Interleaved<Real>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::real::Float3;

    #[test]
    fn interleaved_packs_components_adjacently() {
        let packed = Interleaved::<f32>::pack(&[1.0f64, 2.0], &[3.0, 4.0], &[5.0, 6.0]);
        assert_eq!(packed, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn native_vector_packs_one_padded_element_per_vector() {
        let packed = NativeVector::<f32>::pack(&[1.0f32, 2.0], &[3.0, 4.0], &[5.0, 6.0]);
        assert_eq!(
            packed,
            vec![
                Float3 { s: [1.0, 3.0, 5.0, 0.0] },
                Float3 { s: [2.0, 4.0, 6.0, 0.0] },
            ]
        );
    }

    #[test]
    fn byte_size_counts_padding() {
        assert_eq!(Interleaved::<f32>::byte_size(10).unwrap(), 10 * 3 * 4);
        assert_eq!(Interleaved::<f64>::byte_size(10).unwrap(), 10 * 3 * 8);
        assert_eq!(NativeVector::<f32>::byte_size(10).unwrap(), 10 * 4 * 4);
        assert_eq!(NativeVector::<f64>::byte_size(10).unwrap(), 10 * 4 * 8);

        assert_eq!(NativeVector::<f32>::COMPONENTS_PER_VECTOR, 4);
        assert_eq!(Interleaved::<f64>::COMPONENTS_PER_VECTOR, 3);
    }

    #[test]
    fn oversized_counts_are_allocation_errors() {
        // overflows the element count
        assert!(matches!(
            Interleaved::<f32>::byte_size(usize::MAX / 2),
            Err(VKVec3Error::Allocation(_))
        ));
        // element count fits, byte count does not
        assert!(matches!(
            Interleaved::<f32>::byte_size(usize::MAX / 12 + 2),
            Err(VKVec3Error::Allocation(_))
        ));
        assert!(matches!(
            NativeVector::<f64>::byte_size(usize::MAX / 16),
            Err(VKVec3Error::Allocation(_))
        ));
        assert!(matches!(
            Interleaved::<f64>::zeroed_staging(usize::MAX / 2),
            Err(VKVec3Error::Allocation(_))
        ));
    }

    #[test]
    fn unpack_leaves_tail_untouched() {
        let staging = Interleaved::<f64>::pack(&[7.0f64], &[8.0], &[9.0]);
        let (mut xs, mut ys, mut zs) = (vec![-1.0f64; 2], vec![-1.0f64; 2], vec![-1.0f64; 2]);
        Interleaved::<f64>::unpack(&staging, &mut xs, &mut ys, &mut zs);
        assert_eq!(xs, vec![7.0, -1.0]);
        assert_eq!(ys, vec![8.0, -1.0]);
        assert_eq!(zs, vec![9.0, -1.0]);
    }

    #[test]
    fn zeroed_staging_is_all_zero() {
        let zeros = NativeVector::<f64>::zeroed_staging(3).unwrap();
        assert_eq!(zeros.len(), 3);
        assert!(zeros.iter().all(|v| v.s == [0.0; 4]));
    }
}
