//! Vendor customization hook.
//!
//! A vendor distribution can rebrand the extension and contribute an extra
//! option value provider. The vendor crate, if linked, registers its
//! implementation during process init; when nothing registers, default
//! branding and the default provider chain apply.

use std::sync::{Arc, OnceLock};

use crate::config::OptionValueProvider;

/// Base product identity, used when no vendor is registered.
pub const DISTRO_PRODUCT_NAME: &str = "outpost";
pub const DISTRO_VERSION: &str = env!("CARGO_PKG_VERSION");

pub trait VendorCustomizations: Send + Sync {
    fn vendor_name(&self) -> &str;
    fn distribution_name(&self) -> &str;
    fn distribution_version(&self) -> &str;
    fn user_agent(&self) -> String;

    /// An extra provider for the chain, with its priority. `None` keeps the
    /// default chain as-is.
    fn option_value_provider(&self) -> Option<(i32, Arc<dyn OptionValueProvider>)>;
}

static VENDOR: OnceLock<Arc<dyn VendorCustomizations>> = OnceLock::new();

/// Register the vendor implementation. First registration wins; returns
/// false if one was already installed.
pub fn register_vendor_customizations(vendor: Arc<dyn VendorCustomizations>) -> bool {
    let installed = VENDOR.set(vendor).is_ok();
    if installed {
        if let Some(vendor) = VENDOR.get() {
            tracing::debug!(
                vendor = vendor.vendor_name(),
                distribution = vendor.distribution_name(),
                "vendor customizations registered"
            );
        }
    }
    installed
}

/// The registered vendor, if any.
pub fn vendor_customizations() -> Option<Arc<dyn VendorCustomizations>> {
    VENDOR.get().cloned()
}
