use thiserror::Error;

#[derive(Error, Debug)]
pub enum VKVec3Error {
    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(&'static str),

    #[error("Host arrays differ in length: xs={xs}, ys={ys}, zs={zs}")]
    LengthMismatch { xs: usize, ys: usize, zs: usize },

    #[error("Insufficient capacity: required {required}, available {available}")]
    InsufficientCapacity { required: u64, available: u64 },

    #[error("Buffer has no device storage")]
    Unallocated,

    #[error("Vulkan error: {0}")]
    Vulkan(String),

    #[error("Failed to load Vulkan: {0}")]
    VulkanLoad(String),

    #[error("Config error: {0}")]
    Config(String),
}

// Convert vk::Result (Vulkan return codes) into VKVec3Error
impl From<vulkanalia::vk::Result> for VKVec3Error {
    fn from(r: vulkanalia::vk::Result) -> Self {
        VKVec3Error::Vulkan(format!("vk::Result: {:?}", r))
    }
}

impl From<vulkanalia::vk::ErrorCode> for VKVec3Error {
    fn from(c: vulkanalia::vk::ErrorCode) -> Self {
        VKVec3Error::Vulkan(format!("vk::ErrorCode: {:?}", c))
    }
}
