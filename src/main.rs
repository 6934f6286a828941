use rand::{Rng, SeedableRng, rngs::StdRng};

use vkvec3::{
    CommandQueue, DeviceContext, GpuConfig, GpuSession, HostSession, MemFlags, Session,
    VKVec3Error, Vector3Buffer,
};

const PARTICLES: usize = 100_000;

fn main() -> Result<(), VKVec3Error> {
    env_logger::init();

    match vkvec3::gpu::Gpu::available_gpus() {
        Ok(gpus) => {
            for gpu in &gpus {
                println!(
                    "GPU {}: {} ({:?}, {} MB)",
                    gpu.index(),
                    gpu.name(),
                    gpu.device_type(),
                    gpu.total_memory() / (1024 * 1024)
                );
            }
        }
        Err(err) => println!("No Vulkan devices: {}", err),
    }

    match GpuSession::vulkan(&GpuConfig::default()) {
        Ok(session) => {
            println!("Running on Vulkan");
            run(&session)
        }
        Err(err) => {
            println!("Vulkan unavailable ({}), running on host memory", err);
            run(&HostSession::host())
        }
    }
}

fn run<C, Q>(session: &Session<C, Q>) -> Result<(), VKVec3Error>
where
    C: DeviceContext,
    Q: CommandQueue<Memory = C::Memory>,
{
    let mut rng = StdRng::seed_from_u64(42);
    let mut positions = || -> Vec<f64> { (0..PARTICLES).map(|_| rng.random_range(-1.0..1.0)).collect() };
    let (xs, ys, zs) = (positions(), positions(), positions());

    let mut source: Vector3Buffer<C::Memory> =
        session.upload(MemFlags::READ_WRITE, &xs, &ys, &zs)?;
    println!(
        "Uploaded {} vectors, {} bytes ({:?} layout)",
        source.len(),
        source.byte_size(),
        source.layout_mode()
    );

    let mut copy = source.duplicate(session.context(), session.queue(), MemFlags::READ_WRITE)?;
    let (cx, cy, cz) = copy.to_host_vecs::<_, f64>(session.queue())?;

    let max_error = xs
        .iter()
        .zip(&cx)
        .chain(ys.iter().zip(&cy))
        .chain(zs.iter().zip(&cz))
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    println!("Round trip through device copy, max error {:e}", max_error);

    session.zero(&mut copy)?;
    let (zx, zy, zz) = copy.to_host_vecs::<_, f64>(session.queue())?;
    let all_zero = zx.iter().chain(&zy).chain(&zz).all(|&v| v == 0.0);
    println!("Zeroed copy reads back all zero: {}", all_zero);

    copy.release();
    source.release();
    session.finish()
}
