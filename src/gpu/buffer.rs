// gpu/buffer.rs — Storage buffers for the sweep and their readback.
//
// The sweep kernels work on flat `array<f32>` storage buffers rather than
// textures: source views have per-view sizes and channel counts, and the
// cost volume is a 3D array, neither of which maps cleanly onto a 2D
// texture binding. Pixels are uploaded planar (channel-major, then row-major,
// no row padding), so there is no COPY_BYTES_PER_ROW_ALIGNMENT to respect.
//
// READBACK
// ────────
// A STORAGE buffer cannot be mapped directly. `read_f32` copies it into a
// MAP_READ | COPY_DST staging buffer, maps that with `map_async`, blocks on
// `device.poll(Maintain::Wait)`, and converts the mapped bytes with
// bytemuck. The copy is queued after every previously submitted command, so
// reading a kernel's output only requires that the kernel was submitted
// first.

use wgpu::util::DeviceExt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::Image;

/// Size in bytes of `len` f32 values.
#[inline]
pub fn f32_bytes(len: usize) -> u64 {
    (len * std::mem::size_of::<f32>()) as u64
}

/// Append channel planes to `dst` in planar order, returning the offset
/// (in f32 elements) where they start.
pub fn append_planes(dst: &mut Vec<f32>, planes: &[Image<f32>]) -> u32 {
    let offset = dst.len() as u32;
    for p in planes {
        if p.stride() == p.width() {
            dst.extend_from_slice(p.as_slice());
        } else {
            for y in 0..p.height() {
                dst.extend_from_slice(p.row(y));
            }
        }
    }
    offset
}

/// Read-only storage buffer holding `data`.
///
/// wgpu rejects zero-sized bindings, so an empty slice becomes one zero.
pub fn storage_from_f32(gpu: &GpuDevice, label: &str, data: &[f32]) -> wgpu::Buffer {
    let contents: &[f32] = if data.is_empty() { &[0.0] } else { data };
    gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(contents),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

/// Storage buffer of `data`'s raw bytes (structs, u32 arrays).
pub fn storage_from_pod<T: bytemuck::Pod>(gpu: &GpuDevice, label: &str, data: &[T]) -> wgpu::Buffer {
    gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

/// Kernel-writable buffer of `len` f32 values that can be read back.
pub fn storage_output(gpu: &GpuDevice, label: &str, len: usize) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: f32_bytes(len.max(1)),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

/// Copy the first `len` f32 values of `src` back to the CPU.
///
/// **Synchronous**: stalls until the GPU has finished all submitted work.
pub fn read_f32(gpu: &GpuDevice, src: &wgpu::Buffer, len: usize) -> Result<Vec<f32>, GpuError> {
    let bytes = f32_bytes(len);
    if bytes == 0 {
        return Ok(Vec::new());
    }

    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback staging"),
        size: bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("read_f32") });
    encoder.copy_buffer_to_buffer(src, 0, &staging, 0, bytes);
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        // The receiver only disappears if this function already returned.
        let _ = tx.send(r);
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| GpuError::Readback(format!("map callback never fired: {e}")))?
        .map_err(|e| GpuError::Readback(e.to_string()))?;

    let out = {
        let mapped = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, f32>(&mapped).to_vec()
    };
    staging.unmap();
    Ok(out)
}
