//! Capture session options.
//!
//! Every field has a default tuned for the Karabiner virtual-HID driver;
//! the passthrough binary can also load the whole struct from a TOML file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// IOService registry name the virtual-HID driver root registers under.
pub const DEFAULT_DRIVER_SERVICE: &str =
    "org_pqrs_driver_Karabiner_VirtualHIDDevice_VirtualHIDRoot";

/// Product name the virtual keyboard reports. The matcher skips it so a
/// session never captures its own injected output.
pub const DEFAULT_VIRTUAL_PRODUCT: &str = "Karabiner VirtualHIDKeyboard";

/// HID country code applied by the locale re-initialization (33 = US).
pub const DEFAULT_COUNTRY_CODE: u8 = 33;

const DEFAULT_READY_POLL_INTERVAL_MS: u64 = 100;

/// Options accepted by `Session::grab`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrabOptions {
    /// Capture only devices with exactly this product name. `None` captures
    /// every keyboard except the virtual one.
    pub product_filter: Option<String>,

    /// HID country code for the locale re-initialization performed once the
    /// driver reports ready.
    pub country_code: u8,

    /// Interval between driver readiness probes, in milliseconds.
    pub ready_poll_interval_ms: u64,

    /// Upper bound on the readiness poll. `None` polls until ready.
    pub ready_timeout_ms: Option<u64>,

    /// IOService registry name of the virtual-HID driver root.
    pub driver_service_name: String,

    /// Product name of the driver's virtual keyboard.
    pub virtual_product_name: String,
}

impl Default for GrabOptions {
    fn default() -> GrabOptions {
        GrabOptions {
            product_filter: None,
            country_code: DEFAULT_COUNTRY_CODE,
            ready_poll_interval_ms: DEFAULT_READY_POLL_INTERVAL_MS,
            ready_timeout_ms: None,
            driver_service_name: DEFAULT_DRIVER_SERVICE.to_string(),
            virtual_product_name: DEFAULT_VIRTUAL_PRODUCT.to_string(),
        }
    }
}

impl GrabOptions {
    /// Matcher decision for a discovered device's product name.
    ///
    /// The virtual keyboard's own product is always refused; with a filter
    /// set, only an exact match is accepted.
    pub fn wants_product(&self, product: &str) -> bool {
        if product == self.virtual_product_name {
            return false;
        }
        match &self.product_filter {
            Some(filter) => product == filter,
            None => true,
        }
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_karabiner_driver() {
        let options = GrabOptions::default();
        assert_eq!(options.driver_service_name, DEFAULT_DRIVER_SERVICE);
        assert_eq!(options.virtual_product_name, DEFAULT_VIRTUAL_PRODUCT);
        assert_eq!(options.country_code, 33);
        assert_eq!(options.ready_poll_interval(), Duration::from_millis(100));
        assert_eq!(options.ready_timeout(), None);
        assert_eq!(options.product_filter, None);
    }

    #[test]
    fn matcher_refuses_the_virtual_product() {
        let options = GrabOptions::default();
        assert!(options.wants_product("Apple Internal Keyboard / Trackpad"));
        assert!(!options.wants_product(DEFAULT_VIRTUAL_PRODUCT));
    }

    #[test]
    fn matcher_with_filter_accepts_exact_matches_only() {
        let options = GrabOptions {
            product_filter: Some("USB Keyboard".to_string()),
            ..GrabOptions::default()
        };
        assert!(options.wants_product("USB Keyboard"));
        assert!(!options.wants_product("USB Keyboard 2"));
        assert!(!options.wants_product("Apple Internal Keyboard / Trackpad"));
        // The virtual product loses even when named by the filter.
        let options = GrabOptions {
            product_filter: Some(DEFAULT_VIRTUAL_PRODUCT.to_string()),
            ..GrabOptions::default()
        };
        assert!(!options.wants_product(DEFAULT_VIRTUAL_PRODUCT));
    }

    #[test]
    fn toml_file_overrides_a_subset_of_fields() {
        let options: GrabOptions = toml::from_str(
            r#"
            product_filter = "Matias Ergo Pro Keyboard"
            ready_timeout_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(
            options.product_filter.as_deref(),
            Some("Matias Ergo Pro Keyboard")
        );
        assert_eq!(options.ready_timeout(), Some(Duration::from_millis(3000)));
        // Untouched fields keep their defaults.
        assert_eq!(options.country_code, DEFAULT_COUNTRY_CODE);
        assert_eq!(options.driver_service_name, DEFAULT_DRIVER_SERVICE);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let result = toml::from_str::<GrabOptions>("product = \"typo\"\n");
        assert!(result.is_err());
    }
}
