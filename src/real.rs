//! Scalar types on both sides of the host/device boundary.
//!
//! The device scalar is fixed per build (`Real`). Host arrays may use any
//! [`HostScalar`]; values pass through `f64` on the way, so a `f64` host value
//! stored in an `f32` device buffer is rounded exactly once.

use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

#[cfg(feature = "double-precision")]
pub type Real = f64;

#[cfg(not(feature = "double-precision"))]
pub type Real = f32;

/// Three `f32` lanes padded to four, laid out like OpenCL/GLSL `float3`.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Float3 {
    pub s: [f32; 4],
}

/// Three `f64` lanes padded to four, laid out like `double3`.
#[repr(C, align(32))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Double3 {
    pub s: [f64; 4],
}

/// A scalar type a device buffer can store.
pub trait DeviceReal: Pod + Debug + PartialEq + Send + Sync + 'static {
    /// The padded hardware vector holding one (x, y, z) triple.
    type Vec3: Pod + Debug + Send + Sync + 'static;

    const NAME: &'static str;

    fn narrow(value: f64) -> Self;
    fn widen(self) -> f64;

    fn vec3(x: Self, y: Self, z: Self) -> Self::Vec3;
    fn components(v: &Self::Vec3) -> [Self; 3];
}

impl DeviceReal for f32 {
    type Vec3 = Float3;

    const NAME: &'static str = "f32";

    fn narrow(value: f64) -> Self {
        value as f32
    }

    fn widen(self) -> f64 {
        self as f64
    }

    fn vec3(x: Self, y: Self, z: Self) -> Float3 {
        Float3 {
            s: [x, y, z, 0.0],
        }
    }

    fn components(v: &Float3) -> [Self; 3] {
        [v.s[0], v.s[1], v.s[2]]
    }
}

impl DeviceReal for f64 {
    type Vec3 = Double3;

    const NAME: &'static str = "f64";

    fn narrow(value: f64) -> Self {
        value
    }

    fn widen(self) -> f64 {
        self
    }

    fn vec3(x: Self, y: Self, z: Self) -> Double3 {
        Double3 {
            s: [x, y, z, 0.0],
        }
    }

    fn components(v: &Double3) -> [Self; 3] {
        [v.s[0], v.s[1], v.s[2]]
    }
}

/// A numeric type host coordinate arrays can be held in.
pub trait HostScalar: Copy {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    fn to_device<S: DeviceReal>(self) -> S {
        S::narrow(self.to_f64())
    }

    fn from_device<S: DeviceReal>(value: S) -> Self {
        Self::from_f64(value.widen())
    }
}

macro_rules! impl_host_scalar {
    ($($t:ty),*) => {
        $(
            impl HostScalar for $t {
                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_host_scalar!(f32, f64, i32, i64, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_vectors_match_hardware_sizes() {
        assert_eq!(std::mem::size_of::<Float3>(), 16);
        assert_eq!(std::mem::align_of::<Float3>(), 16);
        assert_eq!(std::mem::size_of::<Double3>(), 32);
        assert_eq!(std::mem::align_of::<Double3>(), 32);
    }

    #[test]
    fn double_to_float_rounds_once() {
        let value = 0.1f64;
        let stored: f32 = value.to_device();
        assert_eq!(stored, 0.1f32);
        assert_eq!(f64::from_device(stored), 0.1f32 as f64);
    }

    #[test]
    fn vec3_pads_fourth_lane_with_zero() {
        let v = f32::vec3(1.0, 2.0, 3.0);
        assert_eq!(v.s, [1.0, 2.0, 3.0, 0.0]);
        assert_eq!(f32::components(&v), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn integers_convert_through_device_scalar() {
        let stored: f64 = 42i32.to_device();
        assert_eq!(stored, 42.0);
        assert_eq!(i32::from_device(stored), 42);
    }
}
