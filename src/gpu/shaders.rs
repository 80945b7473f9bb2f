//! Stable shader set names and the binding/specialization-constant
//! descriptors that describe each shader's ABI to `GpuRuntime::add_shader`
//! (§4.5 "Shader set", §6.6 "GPU shader ABI"). The shaders themselves are
//! precompiled `.spv` files loaded by filename; building them from source is
//! out of scope here.

/// One entry of the stable shader set, named after the `.spv` file it
/// expects to find in the shader directory.
pub const DENSE_SHADERS: &[&str] = &[
    "dense_eval_forward",
    "dense_train_forward",
    "dense_backprop_delta",
    "dense_backprop_input_delta",
    "dense_update_params",
];

pub const OUTPUT_SHADERS: &[&str] = &[
    "output_eval_forward",
    "output_train_forward",
    "output_backprop_delta",
    "output_backprop_input_delta",
    "output_update_params",
];

pub const CONVOLUTIONAL_SHADERS: &[&str] = &[
    "convolutional_eval_forward",
    "convolutional_train_forward",
    "convolutional_backprop_delta",
    "convolutional_backprop_input_delta",
    "convolutional_backprop_param_deltas",
    "convolutional_update_params",
];

pub const MAX_POOLING_SHADERS: &[&str] = &[
    "max_pooling_eval_forward",
    "max_pooling_train_forward",
    "max_pooling_backprop",
];

pub const COMPUTE_COSTS_SHADER: &str = "compute_costs";

/// Every stable shader name, for `GpuRuntime::load_shader_set` to preload.
pub fn all_shader_names() -> impl Iterator<Item = &'static str> {
    DENSE_SHADERS
        .iter()
        .chain(OUTPUT_SHADERS)
        .chain(CONVOLUTIONAL_SHADERS)
        .chain(MAX_POOLING_SHADERS)
        .chain(std::iter::once(&COMPUTE_COSTS_SHADER))
        .copied()
}

/// A storage or uniform buffer binding declared by a shader, in descriptor
/// set binding-index order.
#[derive(Debug, Clone, Copy)]
pub struct BufferBinding {
    pub slot: u32,
    pub readonly: bool,
}

/// A specialization constant's scalar type. `Bool` is encoded as a 4-byte
/// `uint32` per §6.6.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecConstantType {
    U32,
    F32,
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub enum SpecConstantValue {
    U32(u32),
    F32(f32),
    Bool(bool),
}

impl SpecConstantValue {
    fn ty(self) -> SpecConstantType {
        match self {
            SpecConstantValue::U32(_) => SpecConstantType::U32,
            SpecConstantValue::F32(_) => SpecConstantType::F32,
            SpecConstantValue::Bool(_) => SpecConstantType::Bool,
        }
    }

    fn to_le_bytes(self) -> [u8; 4] {
        match self {
            SpecConstantValue::U32(v) => v.to_le_bytes(),
            SpecConstantValue::F32(v) => v.to_le_bytes(),
            SpecConstantValue::Bool(v) => (v as u32).to_le_bytes(),
        }
    }
}

/// `(constant_id, offset_into_data, size)` matching `VkSpecializationMapEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecMapEntry {
    pub constant_id: u32,
    pub offset: u32,
    pub size: u32,
}

/// Packs `local_size_x/y/z` (ids 0..2, always `u32`) followed by the
/// caller's own specialization constants (ids starting at 3) into one
/// tightly packed blob, per §4.5/§6.6. Every scalar is 4 bytes regardless of
/// `SpecConstantType`, so offsets are simply `4 * index`.
pub fn pack_specialization_data(workgroup_size: [u32; 3], user_constants: &[SpecConstantValue]) -> (Vec<u8>, Vec<SpecMapEntry>) {
    let mut data = Vec::with_capacity((3 + user_constants.len()) * 4);
    let mut entries = Vec::with_capacity(3 + user_constants.len());

    for (id, dim) in workgroup_size.into_iter().enumerate() {
        let offset = data.len() as u32;
        data.extend_from_slice(&dim.to_le_bytes());
        entries.push(SpecMapEntry { constant_id: id as u32, offset, size: 4 });
    }

    for (index, constant) in user_constants.iter().enumerate() {
        let offset = data.len() as u32;
        data.extend_from_slice(&constant.to_le_bytes());
        entries.push(SpecMapEntry { constant_id: 3 + index as u32, offset, size: 4 });
        debug_assert!(matches!(constant.ty(), SpecConstantType::U32 | SpecConstantType::F32 | SpecConstantType::Bool));
    }

    (data, entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_size_occupies_reserved_slots_0_through_2() {
        let (data, entries) = pack_specialization_data([8, 4, 1], &[]);
        assert_eq!(entries.len(), 3);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.constant_id, i as u32);
            assert_eq!(entry.offset, (i * 4) as u32);
            assert_eq!(entry.size, 4);
        }
        assert_eq!(data.len(), 12);
        assert_eq!(u32::from_le_bytes(data[0..4].try_into().unwrap()), 8);
    }

    #[test]
    fn user_constants_start_at_slot_3_and_bool_is_four_bytes() {
        let (data, entries) = pack_specialization_data(
            [1, 1, 1],
            &[SpecConstantValue::F32(0.5), SpecConstantValue::Bool(true)],
        );
        assert_eq!(entries[3].constant_id, 3);
        assert_eq!(entries[4].constant_id, 4);
        assert_eq!(data.len(), (3 + 2) * 4);
        assert_eq!(u32::from_le_bytes(data[16..20].try_into().unwrap()), 1);
    }
}
