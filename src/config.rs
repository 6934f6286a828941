use crate::error::VKVec3Error;

/// Settings for opening a Vulkan device session.
#[derive(Clone, Debug)]
pub struct GpuConfig {
    /// Physical device to open. `None` picks the first discrete GPU, then the largest.
    pub device_index: Option<usize>,
    /// Use `vkCmdFillBuffer` for zero fills. When off, zeroing writes a host array instead.
    pub native_fill: bool,
    /// Share of the device-local heap buffers may claim, in (0, 1].
    pub memory_fraction: f32,
    /// Size of the host-visible staging buffer used for device-local transfers.
    pub staging_bytes: u64,
}

impl GpuConfig {
    pub fn validate(&self) -> Result<(), VKVec3Error> {
        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            return Err(VKVec3Error::Config(format!(
                "memory_fraction must be in (0, 1], got {}",
                self.memory_fraction
            )));
        }

        if self.staging_bytes == 0 {
            return Err(VKVec3Error::Config(
                "staging_bytes must be greater than zero".to_string(),
            ));
        }

        // vkCmdCopyBuffer offsets stay word aligned when chunks are
        if self.staging_bytes % 4 != 0 {
            return Err(VKVec3Error::Config(format!(
                "staging_bytes must be a multiple of 4, got {}",
                self.staging_bytes
            )));
        }

        Ok(())
    }

    pub fn with_device(mut self, index: usize) -> Self {
        self.device_index = Some(index);
        self
    }

    pub fn without_native_fill(mut self) -> Self {
        self.native_fill = false;
        self
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            native_fill: true,
            memory_fraction: 0.6, // same headroom the host budget uses
            staging_bytes: 16 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GpuConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        for fraction in [0.0, -0.5, 1.5, f32::NAN] {
            let config = GpuConfig {
                memory_fraction: fraction,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(VKVec3Error::Config(_))));
        }
    }

    #[test]
    fn rejects_unaligned_staging() {
        let config = GpuConfig {
            staging_bytes: 1023,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VKVec3Error::Config(_))));

        let config = GpuConfig {
            staging_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VKVec3Error::Config(_))));
    }

    #[test]
    fn builders_set_fields() {
        let config = GpuConfig::default().with_device(2).without_native_fill();
        assert_eq!(config.device_index, Some(2));
        assert!(!config.native_fill);
    }
}
