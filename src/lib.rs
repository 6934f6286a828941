//! vkvec3 - device buffers of 3-component vectors for GPU simulations
//!
//! Positions, spins and fields live on the device as N (x, y, z) triples. The
//! physical layout (interleaved scalars or padded hardware vectors) and the
//! scalar precision are chosen at build time; calling code sees the same
//! `Vector3Buffer` API either way. Buffers run on Vulkan or, without a usable
//! driver, on host memory.

mod buffer;

mod config;

mod device;

mod error;

mod layout;

mod memory_tracker;

mod real;

mod session;

pub mod gpu;

pub mod host;

pub use buffer::Vector3Buffer;
pub use config::GpuConfig;
pub use device::{CommandQueue, DeviceContext, DeviceMemory, MemFlags};
pub use error::VKVec3Error;
pub use layout::{ActiveLayout, Interleaved, Layout3, LayoutMode, NativeVector};
pub use real::{DeviceReal, Double3, Float3, HostScalar, Real};
pub use session::{GpuSession, HostSession, Session};
