//! Physical adapters reported by backend enumeration.

use crate::Backend;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    /// Software rasterizer (WARP, SwiftShader, llvmpipe).
    Cpu,
    Unknown,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum GpuVendor {
    Amd,
    Intel,
    Nvidia,
    Microsoft,
    Arm,
    ImgTec,
    Qualcomm,
    Apple,
    Unknown,
}

impl GpuVendor {
    pub const AMD_ID: u32 = 0x1002;
    pub const INTEL_ID: u32 = 0x8086;
    pub const NVIDIA_ID: u32 = 0x10DE;
    pub const MICROSOFT_ID: u32 = 0x1414;
    pub const ARM_ID: u32 = 0x13B5;
    pub const IMGTEC_ID: u32 = 0x1010;
    pub const QUALCOMM_ID: u32 = 0x5143;
    pub const APPLE_ID: u32 = 0x106B;

    pub fn from_id(vendor_id: u32) -> Self {
        match vendor_id {
            Self::AMD_ID => Self::Amd,
            Self::INTEL_ID => Self::Intel,
            Self::NVIDIA_ID => Self::Nvidia,
            Self::MICROSOFT_ID => Self::Microsoft,
            Self::ARM_ID => Self::Arm,
            Self::IMGTEC_ID => Self::ImgTec,
            Self::QUALCOMM_ID => Self::Qualcomm,
            Self::APPLE_ID => Self::Apple,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphicsAdapter {
    pub backend: Backend,
    pub vendor_id: u32,
    pub device_id: u32,
    pub name: String,
    pub kind: AdapterKind,
    pub driver_description: String,
}

impl GraphicsAdapter {
    pub fn vendor(&self) -> GpuVendor {
        GpuVendor::from_id(self.vendor_id)
    }

    pub fn is_software(&self) -> bool {
        self.kind == AdapterKind::Cpu
    }

    /// Rank used to order adapters, lower is preferred.
    fn rank(&self, preference: crate::PowerPreference) -> u32 {
        use crate::PowerPreference as Pp;
        match (self.kind, preference) {
            (AdapterKind::Discrete, Pp::HighPerformance) => 0,
            (AdapterKind::Integrated, Pp::HighPerformance) => 1,
            (AdapterKind::Integrated, Pp::LowPower) => 0,
            (AdapterKind::Discrete, Pp::LowPower) => 1,
            (AdapterKind::Unknown, _) => 2,
            (AdapterKind::Cpu, _) => 3,
        }
    }
}

impl std::fmt::Display for GraphicsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}, {:04x}:{:04x}, {})",
            self.name, self.kind, self.vendor_id, self.device_id, self.backend
        )
    }
}

/// Orders enumerated adapters into selection candidates.
///
/// Software adapters are dropped unless nothing else is available. When the
/// backend honours a power preference the candidates are stably sorted by
/// it, otherwise enumeration order is kept.
pub fn order_adapters(
    adapters: Vec<GraphicsAdapter>,
    preference: crate::PowerPreference,
    honours_preference: bool,
) -> Vec<GraphicsAdapter> {
    let has_hardware = adapters.iter().any(|a| !a.is_software());
    let mut candidates: Vec<_> = adapters
        .into_iter()
        .filter(|a| !has_hardware || !a.is_software())
        .collect();
    if honours_preference {
        candidates.sort_by_key(|a| a.rank(preference));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PowerPreference;

    fn adapter(name: &str, kind: AdapterKind) -> GraphicsAdapter {
        GraphicsAdapter {
            backend: Backend::Vulkan,
            vendor_id: GpuVendor::NVIDIA_ID,
            device_id: 1,
            name: name.to_string(),
            kind,
            driver_description: String::new(),
        }
    }

    fn names(adapters: &[GraphicsAdapter]) -> Vec<&str> {
        adapters.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn software_adapters_are_filtered() {
        let ordered = order_adapters(
            vec![
                adapter("warp", AdapterKind::Cpu),
                adapter("igpu", AdapterKind::Integrated),
            ],
            PowerPreference::HighPerformance,
            true,
        );
        assert_eq!(names(&ordered), ["igpu"]);
    }

    #[test]
    fn software_adapter_kept_when_alone() {
        let ordered = order_adapters(
            vec![adapter("llvmpipe", AdapterKind::Cpu)],
            PowerPreference::HighPerformance,
            true,
        );
        assert_eq!(names(&ordered), ["llvmpipe"]);
    }

    #[test]
    fn power_preference_ordering() {
        let adapters = vec![
            adapter("igpu", AdapterKind::Integrated),
            adapter("dgpu", AdapterKind::Discrete),
        ];
        let high = order_adapters(adapters.clone(), PowerPreference::HighPerformance, true);
        assert_eq!(names(&high), ["dgpu", "igpu"]);
        let low = order_adapters(adapters.clone(), PowerPreference::LowPower, true);
        assert_eq!(names(&low), ["igpu", "dgpu"]);
        let unordered = order_adapters(adapters, PowerPreference::HighPerformance, false);
        assert_eq!(names(&unordered), ["igpu", "dgpu"]);
    }

    #[test]
    fn known_vendors() {
        assert_eq!(GpuVendor::from_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_id(0x5143), GpuVendor::Qualcomm);
        assert_eq!(GpuVendor::from_id(0xdead), GpuVendor::Unknown);
    }
}
