//! Spec validation, duration parsing and test-resource naming.

use crate::config::OperatorConfig;
use crate::controller::error::TestFailure;
use crate::crd::restore_test::RestoreTest;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Kubernetes DNS-label length limit for namespace names.
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Namespaces a restore test may never target.
pub const PROTECTED_NAMESPACES: &[&str] = &[
    "default",
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "velero",
];

/// Parse a duration string of the form `<integer><unit>`, unit one of
/// d, h, m, s. "24h" parses to 86400 seconds; anything else is an
/// `InvalidDuration` failure.
pub fn parse_duration(input: &str) -> Result<Duration, TestFailure> {
    let normalized = input.trim().to_ascii_lowercase();
    let invalid = || TestFailure::InvalidDuration(input.to_string());

    let unit = normalized.chars().last().ok_or_else(invalid)?;
    let number_str = &normalized[..normalized.len() - unit.len_utf8()];
    if number_str.is_empty() || !number_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let number: u64 = number_str.parse().map_err(|_| invalid())?;

    let seconds = match unit {
        'd' => number.checked_mul(86400),
        'h' => number.checked_mul(3600),
        'm' => number.checked_mul(60),
        's' => Some(number),
        _ => None,
    }
    .ok_or_else(invalid)?;

    Ok(Duration::from_secs(seconds))
}

/// Generate a unique, DNS-safe namespace name for one test run.
///
/// `<prefix>-<sanitized backup>-<timestamp>`; when that would exceed the
/// 63-character limit (or the backup name sanitizes away entirely), the
/// backup portion is replaced by a stable content-hash suffix instead of
/// being truncated.
pub fn generate_test_namespace_name(
    backup_name: &str,
    prefix: &str,
    now: DateTime<Utc>,
) -> String {
    let timestamp = now.format("%Y%m%d%H%M%S").to_string();
    let safe = sanitize_name_fragment(backup_name, 30);

    if !safe.is_empty() {
        let candidate = format!("{prefix}-{safe}-{timestamp}");
        if candidate.len() <= MAX_NAMESPACE_LEN {
            return candidate;
        }
    }

    let hash = fnv1a_hex(backup_name.as_bytes());
    let short = format!("{prefix}-{}-{timestamp}", &hash[..8]);
    if short.len() <= MAX_NAMESPACE_LEN {
        return short;
    }

    // Pathologically long prefix: shrink it, keep the unique parts.
    let budget = MAX_NAMESPACE_LEN - (8 + timestamp.len() + 2);
    format!("{}-{}-{timestamp}", &prefix[..budget], &hash[..8])
}

/// Generated restore name: `restore-test-<backup>-<timestamp>`, with the
/// backup portion sanitized the same way as namespace names.
pub fn generate_restore_name(backup_name: &str, now: DateTime<Utc>) -> String {
    let timestamp = now.format("%Y%m%d%H%M%S");
    let safe = sanitize_name_fragment(backup_name, 30);
    if safe.is_empty() {
        format!(
            "restore-test-{}-{timestamp}",
            &fnv1a_hex(backup_name.as_bytes())[..8]
        )
    } else {
        format!("restore-test-{safe}-{timestamp}")
    }
}

/// Lowercase, replace anything outside [a-z0-9-], bound the length, strip
/// leading/trailing hyphens.
fn sanitize_name_fragment(name: &str, max_len: usize) -> String {
    let mut sanitized: String = name
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    sanitized.truncate(max_len);
    sanitized.trim_matches('-').to_string()
}

/// Stable FNV-1a hash rendered as fixed-width hex.
fn fnv1a_hex(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_NAMESPACE_LEN
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// The test namespace must be a valid DNS label and disjoint from protected
/// system namespaces.
pub fn validate_target_namespace(
    namespace: &str,
    config: &OperatorConfig,
) -> Result<(), TestFailure> {
    if !is_dns_label(namespace) {
        return Err(TestFailure::InvalidSpec(format!(
            "restore namespace {namespace:?} is not a valid DNS label"
        )));
    }

    let protected = PROTECTED_NAMESPACES
        .iter()
        .any(|p| *p == namespace)
        || namespace == config.operator_namespace
        || namespace == config.velero_namespace;
    if protected {
        return Err(TestFailure::InvalidSpec(format!(
            "restore namespace {namespace} is protected"
        )));
    }

    Ok(())
}

/// Runtime constraints the CRD schema cannot enforce.
pub fn validate_spec(rt: &RestoreTest, config: &OperatorConfig) -> Result<(), TestFailure> {
    if rt.spec.backup_name.trim().is_empty() {
        return Err(TestFailure::InvalidSpec(
            "spec.backupName is required".to_string(),
        ));
    }

    if let Some(ttl) = &rt.spec.ttl {
        parse_duration(ttl)?;
    }

    if let Some(namespace) = &rt.spec.restore_namespace {
        validate_target_namespace(namespace, config)?;
    }

    Ok(())
}
