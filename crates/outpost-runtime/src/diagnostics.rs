//! Human-readable configuration dump.
//!
//! Rendered into the host's info surface: distribution identity, every
//! option's effective value, and the ini entries backing them. Secret
//! options never show their value.

use std::fmt::Write;

use outpost_core::config::{
    option_metadata, ConfigurationManager, ConfigurationSnapshot, OptionValueProvider,
};
use outpost_core::vendor::{vendor_customizations, DISTRO_PRODUCT_NAME, DISTRO_VERSION};

pub fn render_info(manager: &ConfigurationManager, snapshot: &ConfigurationSnapshot) -> String {
    let mut out = String::new();

    match vendor_customizations() {
        Some(vendor) => {
            let _ = writeln!(out, "{}", vendor.distribution_name());
            let _ = writeln!(out, "Version: {}", vendor.distribution_version());
            let _ = writeln!(out, "Distro base version: {DISTRO_VERSION}");
        }
        None => {
            let _ = writeln!(out, "{DISTRO_PRODUCT_NAME}");
            let _ = writeln!(out, "Version: {DISTRO_VERSION}");
        }
    }

    let _ = writeln!(out, "\nEffective configuration (revision {})", snapshot.revision);
    for option in option_metadata() {
        let value = if option.secret {
            "***".to_string()
        } else {
            manager
                .display_value(option.key, snapshot)
                .unwrap_or_default()
        };
        let _ = writeln!(out, "  {:<26} {}", option.key, value);
    }

    let _ = writeln!(out, "\nIni entries");
    for option in option_metadata() {
        let value = match manager.chain().ini_value(option.ini_name) {
            Some(_) if option.secret => "***".to_string(),
            Some(value) => value,
            None => "(unset)".to_string(),
        };
        let _ = writeln!(out, "  {:<50} {}", option.ini_name, value);
    }

    out
}
