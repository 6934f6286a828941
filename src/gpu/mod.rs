pub mod gpu_memory;
pub mod info;
pub mod queue;
pub mod vk_gpu;

pub use gpu_memory::GPUMemory;
pub use info::GpuInfo;
pub use queue::GpuQueue;
pub use vk_gpu::Gpu;

use vulkanalia::vk;

use crate::error::VKVec3Error;

pub(crate) fn allocation_error(what: &'static str) -> impl Fn(vk::ErrorCode) -> VKVec3Error {
    move |code| VKVec3Error::Allocation(format!("{}: {:?}", what, code))
}

pub(crate) fn transfer_error(what: &'static str) -> impl Fn(vk::ErrorCode) -> VKVec3Error {
    move |code| VKVec3Error::Transfer(format!("{}: {:?}", what, code))
}
