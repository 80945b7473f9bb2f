//! Workgroup tiling: picks `(workgroupSize, numWorkgroups)` for a shader's
//! total invocation grid (§4.5, §8 "Workgroup tiling"). Pure arithmetic, no
//! device handle required, so it is exercised directly by tests without a
//! Vulkan instance.

/// Starting from `workgroup_size = work_size`, repeatedly halves the
/// largest dimension by its lowest prime divisor until the total
/// invocation count fits within `invocation_cap` and each dimension fits
/// `per_dim_cap`. Panics (a fatal, caller-visible condition per §8) if no
/// such tiling exists.
pub fn tile_workgroups(work_size: [u32; 3], invocation_cap: u32, per_dim_cap: [u32; 3]) -> ([u32; 3], [u32; 3]) {
    let mut workgroup_size = work_size;
    loop {
        let total: u64 = workgroup_size.iter().map(|&d| d as u64).product();
        let fits_cap = total <= invocation_cap as u64;
        let fits_dims = workgroup_size.iter().zip(per_dim_cap).all(|(&d, cap)| d <= cap);
        if fits_cap && fits_dims {
            break;
        }

        let (axis, _) = workgroup_size
            .iter()
            .enumerate()
            .max_by_key(|(_, &d)| d)
            .expect("workgroup_size has three elements");
        let divisor = lowest_prime_divisor(workgroup_size[axis]);
        assert!(
            divisor > 1,
            "no workgroup tiling fits device caps for work_size {work_size:?}"
        );
        workgroup_size[axis] /= divisor;
    }

    let mut num_workgroups = [0u32; 3];
    for i in 0..3 {
        assert_eq!(
            work_size[i] % workgroup_size[i],
            0,
            "workgroup_size[{i}] must evenly divide work_size[{i}]"
        );
        num_workgroups[i] = work_size[i] / workgroup_size[i];
    }

    for i in 0..3 {
        debug_assert_eq!(workgroup_size[i] * num_workgroups[i], work_size[i]);
    }
    (workgroup_size, num_workgroups)
}

fn lowest_prime_divisor(n: u32) -> u32 {
    if n <= 1 {
        return 1;
    }
    let mut candidate = 2u32;
    while candidate * candidate <= n {
        if n % candidate == 0 {
            return candidate;
        }
        candidate += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiling_invariant_holds_when_work_size_already_fits() {
        let (wg, n) = tile_workgroups([8, 8, 1], 256, [256, 256, 64]);
        assert_eq!(wg, [8, 8, 1]);
        assert_eq!(n, [1, 1, 1]);
        for i in 0..3 {
            assert_eq!(wg[i] * n[i], [8, 8, 1][i]);
        }
    }

    #[test]
    fn tiling_halves_largest_dimension_until_it_fits_the_cap() {
        let (wg, n) = tile_workgroups([64, 1, 1], 32, [256, 256, 64]);
        let total: u32 = wg.iter().product();
        assert!(total <= 32);
        for i in 0..3 {
            assert_eq!(wg[i] * n[i], [64, 1, 1][i]);
        }
    }

    #[test]
    fn tiling_respects_per_dimension_caps() {
        let (wg, n) = tile_workgroups([100, 1, 1], 1024, [16, 256, 64]);
        assert!(wg[0] <= 16);
        assert_eq!(wg[0] * n[0], 100);
    }

    #[test]
    fn lowest_prime_divisor_of_prime_is_itself() {
        assert_eq!(lowest_prime_divisor(17), 17);
        assert_eq!(lowest_prime_divisor(1), 1);
        assert_eq!(lowest_prime_divisor(12), 2);
    }
}
