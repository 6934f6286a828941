use std::marker::PhantomData;

use bytemuck::Zeroable;
use log::{debug, warn};

use crate::{
    device::{CommandQueue, DeviceContext, DeviceMemory, MemFlags},
    error::VKVec3Error,
    layout::{ActiveLayout, Layout3, LayoutMode},
    real::{DeviceReal, HostScalar},
};

/// Device buffer holding `len()` vectors of three components.
///
/// The physical layout is the type parameter `L`, which defaults to the layout
/// the crate was built with. Every operation blocks until the device has
/// finished with it.
///
/// Storage is freed by [`release`](Self::release) or when the buffer is
/// dropped, whichever comes first.
pub struct Vector3Buffer<M: DeviceMemory, L: Layout3 = ActiveLayout> {
    storage: Option<M>,

    // number of vectors
    n_elems: usize,

    buffer_size: u64,

    _layout: PhantomData<fn() -> L>,
}

impl<M: DeviceMemory, L: Layout3> Vector3Buffer<M, L> {
    /// Allocates room for `count` vectors without writing anything,
    /// e.g. for buffers a kernel fills in.
    pub fn new<C>(ctx: &C, flags: MemFlags, count: usize) -> Result<Self, VKVec3Error>
    where
        C: DeviceContext<Memory = M>,
    {
        let buffer_size = L::byte_size(count)?;
        let storage = ctx.create_buffer(flags, buffer_size)?;

        debug!(
            "Allocated {} bytes for {} vectors ({:?}, {})",
            buffer_size,
            count,
            L::MODE,
            <L::Scalar as DeviceReal>::NAME
        );

        Ok(Self {
            storage: Some(storage),
            n_elems: count,
            buffer_size,
            _layout: PhantomData,
        })
    }

    /// Allocates room for `xs.len()` vectors and writes the host coordinates.
    ///
    /// Each value is converted to the device scalar on the way, so an `f64`
    /// host array stored in an `f32` buffer loses precision. The three arrays
    /// must have the same length.
    pub fn from_host<C, Q, R>(
        ctx: &C,
        queue: &Q,
        flags: MemFlags,
        xs: &[R],
        ys: &[R],
        zs: &[R],
    ) -> Result<Self, VKVec3Error>
    where
        C: DeviceContext<Memory = M>,
        Q: CommandQueue<Memory = M>,
        R: HostScalar,
    {
        if xs.len() != ys.len() || xs.len() != zs.len() {
            return Err(VKVec3Error::LengthMismatch {
                xs: xs.len(),
                ys: ys.len(),
                zs: zs.len(),
            });
        }

        let buffer = Self::new(ctx, flags, xs.len())?;
        if buffer.buffer_size == 0 {
            return Ok(buffer);
        }

        let staging = L::pack(xs, ys, zs);
        queue.write_buffer(
            buffer.buffer()?,
            true,
            0,
            bytemuck::cast_slice(&staging),
        )?;

        Ok(buffer)
    }

    /// Reads the buffer back into the first `len()` entries of each output.
    /// Outputs are not resized.
    pub fn copy_to_host<Q, R>(
        &self,
        queue: &Q,
        xs: &mut [R],
        ys: &mut [R],
        zs: &mut [R],
    ) -> Result<(), VKVec3Error>
    where
        Q: CommandQueue<Memory = M>,
        R: HostScalar,
    {
        let storage = self.buffer()?;

        let available = xs.len().min(ys.len()).min(zs.len());
        if available < self.n_elems {
            return Err(VKVec3Error::InsufficientCapacity {
                required: self.n_elems as u64,
                available: available as u64,
            });
        }

        if self.buffer_size == 0 {
            return Ok(());
        }

        let mut staging = L::zeroed_staging(self.n_elems)?;
        queue.read_buffer(storage, 0, bytemuck::cast_slice_mut(&mut staging))?;

        L::unpack(&staging, xs, ys, zs);
        Ok(())
    }

    pub fn to_host_vecs<Q, R>(&self, queue: &Q) -> Result<(Vec<R>, Vec<R>, Vec<R>), VKVec3Error>
    where
        Q: CommandQueue<Memory = M>,
        R: HostScalar + Default,
    {
        let mut xs = vec![R::default(); self.n_elems];
        let mut ys = vec![R::default(); self.n_elems];
        let mut zs = vec![R::default(); self.n_elems];

        self.copy_to_host(queue, &mut xs, &mut ys, &mut zs)?;

        Ok((xs, ys, zs))
    }

    /// Copies this buffer into the start of `dst` and waits for the queue to drain.
    pub fn copy_to_device<Q>(&self, queue: &Q, dst: &mut Self) -> Result<(), VKVec3Error>
    where
        Q: CommandQueue<Memory = M>,
    {
        let src_storage = self.buffer()?;
        let dst_storage = dst.buffer()?;

        if dst.buffer_size < self.buffer_size {
            return Err(VKVec3Error::InsufficientCapacity {
                required: self.buffer_size,
                available: dst.buffer_size,
            });
        }

        if self.buffer_size == 0 {
            return Ok(());
        }

        queue.copy_buffer(src_storage, dst_storage, 0, 0, self.buffer_size)?;
        queue.finish()
    }

    /// Allocates a new buffer of the same length and copies this one into it.
    pub fn duplicate<C, Q>(&self, ctx: &C, queue: &Q, flags: MemFlags) -> Result<Self, VKVec3Error>
    where
        C: DeviceContext<Memory = M>,
        Q: CommandQueue<Memory = M>,
    {
        self.buffer()?;

        let mut copy = Self::new(ctx, flags, self.n_elems)?;
        self.copy_to_device(queue, &mut copy)?;
        Ok(copy)
    }

    /// Overwrites every vector with (0, 0, 0).
    ///
    /// Uses the queue's fill command when it has one, otherwise writes a host
    /// array of zeros. Returns once the queue has drained either way.
    pub fn zero<Q>(&mut self, queue: &Q) -> Result<(), VKVec3Error>
    where
        Q: CommandQueue<Memory = M>,
    {
        let storage = self.buffer()?;

        if self.buffer_size == 0 {
            return Ok(());
        }

        let zero = L::Element::zeroed();
        match queue.fill_buffer(storage, bytemuck::bytes_of(&zero), 0, self.buffer_size) {
            Ok(()) => {}
            Err(VKVec3Error::CapabilityUnavailable(what)) => {
                warn!("{} unavailable, zeroing {} bytes from host", what, self.buffer_size);

                let zeros = L::zeroed_staging(self.n_elems)?;
                queue.write_buffer(storage, false, 0, bytemuck::cast_slice(&zeros))?;
            }
            Err(err) => return Err(err),
        }

        queue.finish()
    }

    /// The device memory, to bind as a kernel argument.
    pub fn buffer(&self) -> Result<&M, VKVec3Error> {
        self.storage.as_ref().ok_or(VKVec3Error::Unallocated)
    }

    /// Frees the device storage. Calling it again does nothing.
    pub fn release(&mut self) {
        if let Some(storage) = self.storage.take() {
            debug!("Released {} bytes ({} vectors)", storage.size(), self.n_elems);
        }

        self.n_elems = 0;
        self.buffer_size = 0;
    }

    pub fn len(&self) -> usize {
        self.n_elems
    }

    pub fn is_empty(&self) -> bool {
        self.n_elems == 0
    }

    pub fn byte_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    pub fn layout_mode(&self) -> LayoutMode {
        L::MODE
    }

    pub fn components_per_vector(&self) -> usize {
        L::COMPONENTS_PER_VECTOR
    }
}

impl<M: DeviceMemory, L: Layout3> Default for Vector3Buffer<M, L> {
    fn default() -> Self {
        Self {
            storage: None,
            n_elems: 0,
            buffer_size: 0,
            _layout: PhantomData,
        }
    }
}

impl<M: DeviceMemory, L: Layout3> std::fmt::Debug for Vector3Buffer<M, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vector3Buffer")
            .field("n_elems", &self.n_elems)
            .field("buffer_size", &self.buffer_size)
            .field("layout", &L::MODE)
            .field("allocated", &self.storage.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::{HostContext, HostMemory, HostQueue},
        layout::{Interleaved, NativeVector},
    };

    #[test]
    fn unallocated_by_default() {
        let buffer: Vector3Buffer<HostMemory> = Vector3Buffer::default();
        assert!(!buffer.is_allocated());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.byte_size(), 0);
        assert!(matches!(buffer.buffer(), Err(VKVec3Error::Unallocated)));
    }

    #[test]
    fn new_sizes_per_layout() {
        let ctx = HostContext::unlimited();

        let interleaved: Vector3Buffer<HostMemory, Interleaved<f32>> =
            Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, 5).unwrap();
        assert_eq!(interleaved.byte_size(), 5 * 3 * 4);
        assert_eq!(interleaved.buffer().unwrap().size(), 5 * 3 * 4);
        assert_eq!(interleaved.layout_mode(), LayoutMode::Interleaved);

        let native: Vector3Buffer<HostMemory, NativeVector<f64>> =
            Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, 5).unwrap();
        assert_eq!(native.byte_size(), 5 * 4 * 8);
        assert_eq!(native.components_per_vector(), 4);
        assert_eq!(native.layout_mode(), LayoutMode::NativeVector);
    }

    #[test]
    fn oversized_count_is_an_allocation_error() {
        let ctx = HostContext::unlimited();

        for count in [usize::MAX / 4, usize::MAX / 12 + 2] {
            let result: Result<Vector3Buffer<HostMemory, Interleaved<f32>>, _> =
                Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, count);
            assert!(matches!(result, Err(VKVec3Error::Allocation(_))));
        }

        let result: Result<Vector3Buffer<HostMemory, NativeVector<f64>>, _> =
            Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, usize::MAX / 16);
        assert!(matches!(result, Err(VKVec3Error::Allocation(_))));

        assert_eq!(ctx.allocated_bytes(), 0);
    }

    #[test]
    fn failed_write_leaves_nothing_allocated() {
        struct FailingQueue;

        impl CommandQueue for FailingQueue {
            type Memory = HostMemory;

            fn write_buffer(&self, _: &HostMemory, _: bool, _: u64, _: &[u8]) -> Result<(), VKVec3Error> {
                Err(VKVec3Error::Transfer("device lost".to_string()))
            }

            fn read_buffer(&self, _: &HostMemory, _: u64, _: &mut [u8]) -> Result<(), VKVec3Error> {
                Ok(())
            }

            fn copy_buffer(&self, _: &HostMemory, _: &HostMemory, _: u64, _: u64, _: u64) -> Result<(), VKVec3Error> {
                Ok(())
            }

            fn finish(&self) -> Result<(), VKVec3Error> {
                Ok(())
            }
        }

        let ctx = HostContext::unlimited();
        let result: Result<Vector3Buffer<HostMemory>, _> =
            Vector3Buffer::from_host(&ctx, &FailingQueue, MemFlags::READ_WRITE, &[1.0f32], &[2.0], &[3.0]);

        assert!(matches!(result, Err(VKVec3Error::Transfer(_))));
        assert_eq!(ctx.allocated_bytes(), 0);
    }

    #[test]
    fn zero_falls_back_without_fill() {
        let ctx = HostContext::unlimited();
        let queue = HostQueue::without_fill();

        let mut buffer: Vector3Buffer<HostMemory> =
            Vector3Buffer::from_host(&ctx, &queue, MemFlags::READ_WRITE, &[1.0f32], &[2.0], &[3.0]).unwrap();
        buffer.zero(&queue).unwrap();

        assert_eq!(queue.stats().fills(), 0);
        assert_eq!(queue.stats().writes(), 2);
        assert_eq!(queue.stats().finishes(), 1);
    }
}
