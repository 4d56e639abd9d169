//! Allocator configuration
//!
//! Page size is a trade-off:
//! - Smaller pages waste less memory when a frame uploads little
//! - Larger pages rotate less often and push fewer requests onto the
//!   oversized path

use crate::error::{ForgeResult, PageForgeError};

/// Default capacity of every pooled page (2MB)
pub const DEFAULT_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// Placement alignment required for constant-buffer views
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Environment variable overriding the page size in bytes
pub const PAGE_SIZE_ENV: &str = "PAGEFORGE_PAGE_SIZE";

/// Environment variable overriding the default alignment in bytes
pub const DEFAULT_ALIGNMENT_ENV: &str = "PAGEFORGE_DEFAULT_ALIGNMENT";

/// Environment variable overriding the number of pages created up front
pub const WARM_PAGES_ENV: &str = "PAGEFORGE_WARM_PAGES";

/// Preset page sizes for common workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePreset {
    /// 64KB pages, for tools and light scenes
    Small,
    /// 2MB pages, the default
    Medium,
    /// 8MB pages, for heavy per-frame streaming
    Large,
    /// Explicit page size in bytes
    Custom { page_size: u64 },
}

impl PagePreset {
    pub fn page_size(self) -> u64 {
        match self {
            PagePreset::Small => 64 * 1024,
            PagePreset::Medium => DEFAULT_PAGE_SIZE,
            PagePreset::Large => 8 * 1024 * 1024,
            PagePreset::Custom { page_size } => page_size,
        }
    }
}

/// Configuration for a [`DynamicBufferAllocator`](super::DynamicBufferAllocator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Capacity of every pooled page in bytes
    pub page_size: u64,
    /// Alignment used by `allocate_default`
    pub default_alignment: u64,
    /// Pages created at initialization (the first becomes current)
    pub warm_pages: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            page_size: DEFAULT_PAGE_SIZE,
            default_alignment: CONSTANT_BUFFER_ALIGNMENT,
            warm_pages: 1,
        }
    }
}

impl AllocatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_preset(preset: PagePreset) -> Self {
        Self::default().with_page_size(preset.page_size())
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_default_alignment(mut self, alignment: u64) -> Self {
        self.default_alignment = alignment;
        self
    }

    pub fn with_warm_pages(mut self, warm_pages: usize) -> Self {
        self.warm_pages = warm_pages;
        self
    }

    /// Build a configuration from `PAGEFORGE_*` environment variables
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> ForgeResult<Self> {
        let mut config = Self::default();
        if let Some(page_size) = read_env_u64(PAGE_SIZE_ENV)? {
            config.page_size = page_size;
        }
        if let Some(alignment) = read_env_u64(DEFAULT_ALIGNMENT_ENV)? {
            config.default_alignment = alignment;
        }
        if let Some(warm_pages) = read_env_u64(WARM_PAGES_ENV)? {
            config.warm_pages = warm_pages as usize;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ForgeResult<()> {
        if self.page_size == 0 {
            return Err(PageForgeError::InvalidConfiguration(
                "page_size must be > 0".to_string(),
            ));
        }
        if self.default_alignment > 1 && !self.default_alignment.is_power_of_two() {
            return Err(PageForgeError::InvalidAlignment(self.default_alignment));
        }
        if self.warm_pages == 0 {
            return Err(PageForgeError::InvalidConfiguration(
                "warm_pages must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env_u64(name: &str) -> ForgeResult<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            PageForgeError::InvalidConfiguration(format!("{}={:?}: {}", name, raw, e))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(PAGE_SIZE_ENV);
        std::env::remove_var(DEFAULT_ALIGNMENT_ENV);
        std::env::remove_var(WARM_PAGES_ENV);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AllocatorConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.default_alignment, CONSTANT_BUFFER_ALIGNMENT);
        assert_eq!(config.warm_pages, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(PagePreset::Small.page_size(), 65536);
        assert_eq!(PagePreset::Medium.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(PagePreset::Large.page_size(), 8 * 1024 * 1024);
        assert_eq!(PagePreset::Custom { page_size: 4096 }.page_size(), 4096);
        assert_eq!(
            AllocatorConfig::from_preset(PagePreset::Small).page_size,
            65536
        );
    }

    #[test]
    fn test_invalid_configs() {
        let invalid = vec![
            AllocatorConfig::new().with_page_size(0),
            AllocatorConfig::new().with_default_alignment(48),
            AllocatorConfig::new().with_warm_pages(0),
        ];
        for config in invalid {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var(PAGE_SIZE_ENV, "65536");
        std::env::set_var(WARM_PAGES_ENV, "4");
        let config = AllocatorConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.page_size, 65536);
        assert_eq!(config.warm_pages, 4);
        assert_eq!(config.default_alignment, CONSTANT_BUFFER_ALIGNMENT);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        std::env::set_var(DEFAULT_ALIGNMENT_ENV, "sixteen");
        let result = AllocatorConfig::from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(PageForgeError::InvalidConfiguration(_))
        ));
    }
}
