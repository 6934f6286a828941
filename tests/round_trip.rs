use rand::{Rng, SeedableRng, rngs::StdRng};

use vkvec3::{
    ActiveLayout, Interleaved, Layout3, LayoutMode, MemFlags, NativeVector, VKVec3Error,
    Vector3Buffer,
    host::{HostContext, HostMemory, HostQueue},
};

fn random_coords(rng: &mut StdRng, n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut coords = || -> Vec<f64> { (0..n).map(|_| rng.random_range(-1.0e3..1.0e3)).collect() };
    (coords(), coords(), coords())
}

fn round_trip<L: Layout3>(xs: &[f64], ys: &[f64], zs: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let ctx = HostContext::unlimited();
    let queue = HostQueue::new();

    let buffer: Vector3Buffer<HostMemory, L> =
        Vector3Buffer::from_host(&ctx, &queue, MemFlags::READ_WRITE, xs, ys, zs).unwrap();
    assert_eq!(buffer.len(), xs.len());

    buffer.to_host_vecs(&queue).unwrap()
}

fn rounded_to_f32(values: &[f64]) -> Vec<f64> {
    values.iter().map(|&v| v as f32 as f64).collect()
}

#[test]
fn two_vectors_come_back_unchanged() {
    let xs = [1.0, 2.0];
    let ys = [3.0, 4.0];
    let zs = [5.0, 6.0];

    let (rx, ry, rz) = round_trip::<ActiveLayout>(&xs, &ys, &zs);

    assert_eq!(rx, vec![1.0, 2.0]);
    assert_eq!(ry, vec![3.0, 4.0]);
    assert_eq!(rz, vec![5.0, 6.0]);
}

#[test]
fn double_precision_layouts_are_exact() {
    let mut rng = StdRng::seed_from_u64(1);
    let (xs, ys, zs) = random_coords(&mut rng, 257);

    for (rx, ry, rz) in [
        round_trip::<Interleaved<f64>>(&xs, &ys, &zs),
        round_trip::<NativeVector<f64>>(&xs, &ys, &zs),
    ] {
        assert_eq!(rx, xs);
        assert_eq!(ry, ys);
        assert_eq!(rz, zs);
    }
}

#[test]
fn single_precision_rounds_each_value_once() {
    let mut rng = StdRng::seed_from_u64(2);
    let (xs, ys, zs) = random_coords(&mut rng, 513);

    for (rx, ry, rz) in [
        round_trip::<Interleaved<f32>>(&xs, &ys, &zs),
        round_trip::<NativeVector<f32>>(&xs, &ys, &zs),
    ] {
        assert_eq!(rx, rounded_to_f32(&xs));
        assert_eq!(ry, rounded_to_f32(&ys));
        assert_eq!(rz, rounded_to_f32(&zs));
    }
}

#[test]
fn layouts_agree_on_logical_contents() {
    let mut rng = StdRng::seed_from_u64(3);
    let (xs, ys, zs) = random_coords(&mut rng, 100);

    assert_eq!(
        round_trip::<Interleaved<f32>>(&xs, &ys, &zs),
        round_trip::<NativeVector<f32>>(&xs, &ys, &zs)
    );
}

#[test]
fn byte_size_follows_layout_footprint() {
    let ctx = HostContext::unlimited();

    for n in [0usize, 1, 7, 1000] {
        let interleaved: Vector3Buffer<HostMemory, Interleaved<f32>> =
            Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, n).unwrap();
        let native: Vector3Buffer<HostMemory, NativeVector<f64>> =
            Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, n).unwrap();

        assert_eq!(
            interleaved.byte_size(),
            (n * interleaved.components_per_vector() * std::mem::size_of::<f32>()) as u64
        );
        assert_eq!(
            native.byte_size(),
            (n * native.components_per_vector() * std::mem::size_of::<f64>()) as u64
        );
        assert_eq!(interleaved.layout_mode(), LayoutMode::Interleaved);
        assert_eq!(native.layout_mode(), LayoutMode::NativeVector);
    }
}

#[test]
fn host_scalar_types_convert_both_ways() {
    let ctx = HostContext::unlimited();
    let queue = HostQueue::new();

    let buffer: Vector3Buffer<HostMemory, Interleaved<f64>> =
        Vector3Buffer::from_host(&ctx, &queue, MemFlags::READ_ONLY, &[1i32, -2], &[3, 4], &[5, 6])
            .unwrap();

    let (xs, ys, zs) = buffer.to_host_vecs::<_, f32>(&queue).unwrap();
    assert_eq!(xs, vec![1.0, -2.0]);
    assert_eq!(ys, vec![3.0, 4.0]);
    assert_eq!(zs, vec![5.0, 6.0]);
}

#[test]
fn copy_to_host_keeps_extra_capacity() {
    let ctx = HostContext::unlimited();
    let queue = HostQueue::new();

    let buffer: Vector3Buffer<HostMemory> =
        Vector3Buffer::from_host(&ctx, &queue, MemFlags::READ_WRITE, &[1.0f32], &[2.0], &[3.0])
            .unwrap();

    let (mut xs, mut ys, mut zs) = (vec![9.0f32; 3], vec![9.0f32; 3], vec![9.0f32; 3]);
    buffer.copy_to_host(&queue, &mut xs, &mut ys, &mut zs).unwrap();

    assert_eq!(xs, vec![1.0, 9.0, 9.0]);
    assert_eq!(ys, vec![2.0, 9.0, 9.0]);
    assert_eq!(zs, vec![3.0, 9.0, 9.0]);
}

#[test]
fn mismatched_lengths_are_rejected_before_allocating() {
    let ctx = HostContext::unlimited();
    let queue = HostQueue::new();

    let result: Result<Vector3Buffer<HostMemory>, _> = Vector3Buffer::from_host(
        &ctx,
        &queue,
        MemFlags::READ_WRITE,
        &[1.0f64, 2.0],
        &[3.0],
        &[5.0, 6.0],
    );

    match result {
        Err(VKVec3Error::LengthMismatch { xs, ys, zs }) => assert_eq!((xs, ys, zs), (2, 1, 2)),
        other => panic!("expected LengthMismatch, got {:?}", other),
    }
    assert_eq!(ctx.allocated_bytes(), 0);
    assert_eq!(queue.stats().writes(), 0);
}

#[test]
fn short_output_arrays_are_rejected() {
    let ctx = HostContext::unlimited();
    let queue = HostQueue::new();

    let buffer: Vector3Buffer<HostMemory> = Vector3Buffer::from_host(
        &ctx,
        &queue,
        MemFlags::READ_WRITE,
        &[1.0f64, 2.0, 3.0],
        &[4.0, 5.0, 6.0],
        &[7.0, 8.0, 9.0],
    )
    .unwrap();

    let (mut xs, mut ys, mut zs) = (vec![0.0f64; 3], vec![0.0f64; 2], vec![0.0f64; 3]);
    let err = buffer
        .copy_to_host(&queue, &mut xs, &mut ys, &mut zs)
        .unwrap_err();

    assert!(matches!(
        err,
        VKVec3Error::InsufficientCapacity {
            required: 3,
            available: 2
        }
    ));
    assert_eq!(queue.stats().reads(), 0);
}

#[test]
fn empty_buffer_operations_are_trivial() {
    let ctx = HostContext::unlimited();
    let queue = HostQueue::new();
    let empty: [f64; 0] = [];

    let mut buffer: Vector3Buffer<HostMemory> =
        Vector3Buffer::from_host(&ctx, &queue, MemFlags::READ_WRITE, &empty, &empty, &empty)
            .unwrap();
    assert!(buffer.is_allocated());
    assert!(buffer.is_empty());
    assert_eq!(buffer.byte_size(), 0);

    let (xs, ys, zs) = buffer.to_host_vecs::<_, f64>(&queue).unwrap();
    assert!(xs.is_empty() && ys.is_empty() && zs.is_empty());

    let mut other: Vector3Buffer<HostMemory> =
        Vector3Buffer::new(&ctx, MemFlags::READ_WRITE, 0).unwrap();
    buffer.copy_to_device(&queue, &mut other).unwrap();
    buffer.zero(&queue).unwrap();

    let copy = buffer.duplicate(&ctx, &queue, MemFlags::READ_WRITE).unwrap();
    assert_eq!(copy.len(), 0);

    buffer.release();
    assert!(!buffer.is_allocated());
}
