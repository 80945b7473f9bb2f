//! Device selection priority (§4.5 "Device selection"). Kept free of `ash`
//! types so the ordering itself is exercised without a Vulkan instance; the
//! `ash`-backed half in `gpu::mod` maps `vk::PhysicalDeviceType` onto
//! `DeviceKind` and calls `pick_best`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

fn priority(kind: DeviceKind) -> u32 {
    match kind {
        DeviceKind::Discrete => 0,
        DeviceKind::Integrated => 1,
        DeviceKind::Virtual => 2,
        DeviceKind::Cpu => 3,
        DeviceKind::Other => 4,
    }
}

/// Picks the device with the lowest-priority `DeviceKind`, preferring the
/// first one enumerated among ties.
pub fn pick_best<T>(devices: impl IntoIterator<Item = (T, DeviceKind)>) -> Option<T> {
    devices
        .into_iter()
        .enumerate()
        .min_by_key(|(index, (_, kind))| (priority(*kind), *index))
        .map(|(_, (device, _))| device)
}

/// A `maxWorkgroupSize` config override tightens, never loosens, the
/// device-reported invocation cap.
pub fn apply_workgroup_cap_override(device_cap: u32, override_cap: Option<u32>) -> u32 {
    match override_cap {
        Some(requested) => device_cap.min(requested),
        None => device_cap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_beats_integrated_regardless_of_enumeration_order() {
        let devices = vec![("igpu", DeviceKind::Integrated), ("dgpu", DeviceKind::Discrete)];
        assert_eq!(pick_best(devices), Some("dgpu"));
    }

    #[test]
    fn first_enumerated_wins_a_tie() {
        let devices = vec![("a", DeviceKind::Discrete), ("b", DeviceKind::Discrete)];
        assert_eq!(pick_best(devices), Some("a"));
    }

    #[test]
    fn empty_enumeration_yields_none() {
        let devices: Vec<(&str, DeviceKind)> = vec![];
        assert_eq!(pick_best(devices), None);
    }

    #[test]
    fn override_only_tightens_the_cap() {
        assert_eq!(apply_workgroup_cap_override(1024, Some(256)), 256);
        assert_eq!(apply_workgroup_cap_override(1024, Some(4096)), 1024);
        assert_eq!(apply_workgroup_cap_override(1024, None), 1024);
    }
}
