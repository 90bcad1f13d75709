//! JVM heap size override parsing
//!
//! Containers running a JVM may declare `OVERRIDE_JVM_HEAP_SIZE` using the
//! JVM's `-Xmx` notation. `m` and `g` are binary units there, so `512m` means
//! 512Mi and `2g` means 2Gi, never the decimal SI values.

use crate::models::ResourceAmount;
use crate::quantity::parse_bytes;
use k8s_openapi::api::core::v1::EnvVar;

/// Environment variable holding the heap size override
pub const OVERRIDE_JVM_HEAP_SIZE_ENV: &str = "OVERRIDE_JVM_HEAP_SIZE";

/// Convert a JVM-style size (`512m`, `2G`, `1048576`) into a quantity string
fn to_binary_quantity(value: &str) -> Option<String> {
    let (digits, unit) = match value.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&value[..idx], Some(c.to_ascii_lowercase())),
        _ => (value, None),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    match unit {
        None => Some(digits.to_string()),
        Some('m') => Some(format!("{digits}Mi")),
        Some('g') => Some(format!("{digits}Gi")),
        Some(_) => None,
    }
}

/// Parse the value of an `OVERRIDE_JVM_HEAP_SIZE` variable into bytes
pub fn parse_jvm_heap_size(value: &str) -> Option<ResourceAmount> {
    let quantity = to_binary_quantity(value)?;
    parse_bytes(&quantity).ok()
}

/// Find and parse the container's heap size override.
///
/// Returns `None` when the variable is absent, set through `valueFrom`, or
/// does not match `DIGITS [mMgG]?`.
pub fn find_container_override_jvm_heap_size_env(env: &[EnvVar]) -> Option<ResourceAmount> {
    env.iter()
        .find(|var| var.name == OVERRIDE_JVM_HEAP_SIZE_ENV)
        .and_then(|var| var.value.as_deref())
        .and_then(parse_jvm_heap_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, value: &str) -> Vec<EnvVar> {
        vec![EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }]
    }

    fn bytes(quantity: &str) -> Option<ResourceAmount> {
        Some(parse_bytes(quantity).unwrap())
    }

    #[test]
    fn test_mebibyte_suffix() {
        let result = find_container_override_jvm_heap_size_env(&env(OVERRIDE_JVM_HEAP_SIZE_ENV, "512m"));
        assert_eq!(result, bytes("512Mi"));
        assert_eq!(result, Some(ResourceAmount(512 * 1024 * 1024)));
    }

    #[test]
    fn test_gibibyte_suffix() {
        let result = find_container_override_jvm_heap_size_env(&env(OVERRIDE_JVM_HEAP_SIZE_ENV, "2g"));
        assert_eq!(result, bytes("2Gi"));
    }

    #[test]
    fn test_suffix_is_case_insensitive() {
        assert_eq!(parse_jvm_heap_size("500M"), bytes("500Mi"));
        assert_eq!(parse_jvm_heap_size("4G"), bytes("4Gi"));
    }

    #[test]
    fn test_raw_bytes() {
        let result =
            find_container_override_jvm_heap_size_env(&env(OVERRIDE_JVM_HEAP_SIZE_ENV, "1048576"));
        assert_eq!(result, Some(ResourceAmount(1_048_576)));
    }

    #[test]
    fn test_invalid_values() {
        for value in ["invalid", "", "m", "512k", "512Mi", "1.5g", "-512m", " 512m"] {
            assert_eq!(
                find_container_override_jvm_heap_size_env(&env(OVERRIDE_JVM_HEAP_SIZE_ENV, value)),
                None,
                "value {value:?} should not parse"
            );
        }
    }

    #[test]
    fn test_variable_not_set() {
        assert_eq!(
            find_container_override_jvm_heap_size_env(&env("SOME_OTHER_ENV_VAR", "value")),
            None
        );
        assert_eq!(find_container_override_jvm_heap_size_env(&[]), None);
    }

    #[test]
    fn test_value_from_reference_is_ignored() {
        let env = vec![EnvVar {
            name: OVERRIDE_JVM_HEAP_SIZE_ENV.to_string(),
            value: None,
            value_from: None,
        }];
        assert_eq!(find_container_override_jvm_heap_size_env(&env), None);
    }
}
