//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one upstream, with unique, non-empty names
/// - At least one primary (non-backup) server per upstream
/// - Positive weights and no duplicate server addresses in an upstream
/// - `sticky` not combined with another balancer on the same upstream
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.upstreams.is_empty() {
        errors.push("at least one upstream must be defined".to_string());
    }

    let mut upstream_names = HashSet::new();

    for upstream in &config.upstreams {
        if upstream.name.is_empty() {
            errors.push("upstream name cannot be empty".to_string());
        }

        if !upstream_names.insert(upstream.name.as_str()) {
            errors.push(format!("duplicate upstream name: {}", upstream.name));
        }

        // Only one balancer may own an upstream's peer initialization.
        if upstream.sticky.is_some() && upstream.balancer.is_some() {
            errors.push(format!(
                "upstream '{}' cannot combine sticky with another balancer",
                upstream.name
            ));
        }

        if !upstream.servers.iter().any(|s| !s.backup) {
            errors.push(format!(
                "upstream '{}' must have at least one non-backup server",
                upstream.name
            ));
        }

        let mut addresses = HashSet::new();
        for server in &upstream.servers {
            if server.weight == 0 {
                errors.push(format!(
                    "server {} in upstream '{}' has weight 0 (must be >= 1)",
                    server.address, upstream.name
                ));
            }

            if !addresses.insert(server.address) {
                errors.push(format!(
                    "server {} appears more than once in upstream '{}'",
                    server.address, upstream.name
                ));
            }
        }
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
