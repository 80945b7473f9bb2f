//! Cross-module coverage for the GPU runtime's pure-logic pieces (§4.5):
//! workgroup tiling, buffer flag resolution, command-stream barrier
//! bookkeeping, and device selection. None of this needs a Vulkan loader —
//! it's plain arithmetic and bookkeeping over the same types `GpuRuntime`
//! uses internally, so it's covered here without `#[ignore]`.
#![cfg(feature = "gpu")]

use richard::gpu::device::{apply_workgroup_cap_override, pick_best, DeviceKind};
use richard::gpu::tiling::tile_workgroups;
use richard::gpu::{BarrierTracker, GpuBufferFlags};

#[test]
fn tiling_and_device_selection_compose_for_a_discrete_gpu() {
    let devices = vec![("igpu-0", DeviceKind::Integrated), ("dgpu-0", DeviceKind::Discrete), ("cpu-0", DeviceKind::Cpu)];
    let chosen = pick_best(devices).unwrap();
    assert_eq!(chosen, "dgpu-0");

    let device_cap = 256;
    let effective_cap = apply_workgroup_cap_override(device_cap, Some(64));
    assert_eq!(effective_cap, 64);

    let (workgroup_size, num_workgroups) = tile_workgroups([256, 256, 1], effective_cap, [effective_cap; 3]);
    assert_eq!(workgroup_size[0] * num_workgroups[0], 256);
    assert_eq!(workgroup_size[1] * num_workgroups[1], 256);
    assert!(workgroup_size[0] * workgroup_size[1] * workgroup_size[2] <= effective_cap);
}

#[test]
fn override_only_tightens_the_devices_own_cap() {
    assert_eq!(apply_workgroup_cap_override(128, Some(256)), 128);
    assert_eq!(apply_workgroup_cap_override(128, None), 128);
    assert_eq!(apply_workgroup_cap_override(128, Some(32)), 32);
}

#[test]
fn a_dense_layers_forward_then_backward_dispatch_chain_needs_two_barriers() {
    let mut tracker = BarrierTracker::new();
    let weights = 0;
    let input = 1;
    let activations = 2;
    let deltas = 3;

    // forward: reads input+weights, writes activations.
    let first = tracker.queue_shader(&[input, weights], &[activations]);
    assert!(first.is_empty(), "nothing was written yet, so nothing needs a barrier");

    // backward: reads activations (written above) and weights, writes deltas.
    let second = tracker.queue_shader(&[activations, weights], &[deltas]);
    assert_eq!(second, vec![activations]);

    tracker.flush();
    assert!(tracker.active_writes().is_empty());

    // after a flush, the same dependency needs a barrier again.
    tracker.queue_shader(&[], &[activations]);
    let third = tracker.queue_shader(&[activations], &[deltas]);
    assert_eq!(third, vec![activations]);
}

#[test]
fn buffer_flag_resolution_matches_the_frequent_host_access_fast_path() {
    let plan = richard::gpu::flags::resolve(GpuBufferFlags::FREQUENT_HOST_ACCESS);
    assert_eq!(plan.memory_kind, richard::gpu::MemoryKind::DeviceLocalHostVisible);
    assert!(plan.host_mapped);

    let device_local_plan = richard::gpu::flags::resolve(GpuBufferFlags::LARGE);
    assert_eq!(device_local_plan.memory_kind, richard::gpu::MemoryKind::DeviceLocal);
    assert!(!device_local_plan.host_mapped);
}
