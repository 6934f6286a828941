use std::sync::Arc;

use crate::{
    buffer::Vector3Buffer,
    config::GpuConfig,
    device::{CommandQueue, DeviceContext, MemFlags},
    error::VKVec3Error,
    gpu::{Gpu, GpuQueue},
    host::{HostContext, HostQueue},
    layout::Layout3,
    real::HostScalar,
};

/// A context and the queue commands for it go through.
///
/// Create one when the simulation sets up its device and drop it at teardown.
/// Buffers allocated through a session must be released or dropped before the
/// session is; on the Vulkan backend they keep the device alive otherwise.
pub struct Session<C, Q> {
    queue: Q,
    context: C,
}

pub type HostSession = Session<HostContext, HostQueue>;

pub type GpuSession = Session<Arc<Gpu>, GpuQueue>;

impl HostSession {
    pub fn host() -> Self {
        Self::new(HostContext::new(), HostQueue::new())
    }
}

impl GpuSession {
    pub fn vulkan(config: &GpuConfig) -> Result<Self, VKVec3Error> {
        let gpu = Gpu::new(config)?;
        let queue = gpu.create_queue()?;
        Ok(Self::new(gpu, queue))
    }
}

impl<C, Q> Session<C, Q>
where
    C: DeviceContext,
    Q: CommandQueue<Memory = C::Memory>,
{
    pub fn new(context: C, queue: Q) -> Self {
        Self { queue, context }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn allocate<L: Layout3>(
        &self,
        flags: MemFlags,
        count: usize,
    ) -> Result<Vector3Buffer<C::Memory, L>, VKVec3Error> {
        Vector3Buffer::new(&self.context, flags, count)
    }

    pub fn upload<L: Layout3, R: HostScalar>(
        &self,
        flags: MemFlags,
        xs: &[R],
        ys: &[R],
        zs: &[R],
    ) -> Result<Vector3Buffer<C::Memory, L>, VKVec3Error> {
        Vector3Buffer::from_host(&self.context, &self.queue, flags, xs, ys, zs)
    }

    pub fn zero<L: Layout3>(&self, buffer: &mut Vector3Buffer<C::Memory, L>) -> Result<(), VKVec3Error> {
        buffer.zero(&self.queue)
    }

    pub fn finish(&self) -> Result<(), VKVec3Error> {
        self.queue.finish()
    }

    pub fn into_parts(self) -> (C, Q) {
        (self.context, self.queue)
    }
}
