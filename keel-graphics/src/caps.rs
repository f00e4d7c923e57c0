bitflags::bitflags! {
    /// Optional device features.
    #[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
    pub struct Features: u32 {
        const TEXTURE_COMPRESSION_BC = 1 << 0;
        const TEXTURE_COMPRESSION_ETC2 = 1 << 1;
        const TEXTURE_COMPRESSION_ASTC = 1 << 2;
        const DEPTH32FLOAT_STENCIL8 = 1 << 3;
        /// Presentation without vertical sync may tear.
        const TEARING = 1 << 4;
        const INDIRECT_FIRST_INSTANCE = 1 << 5;
        const SHADER_FLOAT16 = 1 << 6;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_array_layers: u32,
    pub max_buffer_size: u64,
    pub max_color_attachments: u32,
    pub max_bind_groups: u32,
    pub max_vertex_buffers: u32,
    pub min_uniform_buffer_offset_alignment: u32,
    /// Bit `n` is set when `2^n` samples are supported.
    pub sample_count_mask: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_texture_dimension_1d: 16384,
            max_texture_dimension_2d: 16384,
            max_texture_dimension_3d: 2048,
            max_texture_array_layers: 2048,
            max_buffer_size: 1 << 32,
            max_color_attachments: 8,
            max_bind_groups: 4,
            max_vertex_buffers: 16,
            min_uniform_buffer_offset_alignment: 256,
            sample_count_mask: 0b1111,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    pub features: Features,
    pub limits: Limits,
}

impl DeviceCaps {
    pub fn supports_tearing(&self) -> bool {
        self.features.contains(Features::TEARING)
    }

    pub fn supports_sample_count(&self, count: u32) -> bool {
        count.is_power_of_two() && self.limits.sample_count_mask & count != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_mask() {
        let caps = DeviceCaps::default();
        assert!(caps.supports_sample_count(1));
        assert!(caps.supports_sample_count(8));
        assert!(!caps.supports_sample_count(16));
        assert!(!caps.supports_sample_count(3));
    }
}
