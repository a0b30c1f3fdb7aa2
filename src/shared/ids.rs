use getrandom::getrandom;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

/// Builds `<prefix>-<base36 timestamp>-<4 random base36 chars>`.
pub fn generate_compact_id(prefix: &str, now: i64) -> Result<String, String> {
    let timestamp = u64::try_from(now)
        .map_err(|_| format!("{prefix} id requires a non-negative timestamp"))?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes)
        .map_err(|err| format!("failed to generate {prefix} id randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % ID_SUFFIX_SPACE;
    Ok(format!(
        "{prefix}-{}-{}",
        base36_encode_u64(timestamp),
        base36_encode_fixed_u32(sample, 4)
    ))
}

/// Step ids are derived from their chain position so a deliverable can never
/// hold two rows for the same step number.
pub fn step_id_for(deliverable_id: &str, step_number: u32) -> String {
    format!("{deliverable_id}-step-{step_number}")
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_ids_carry_prefix_and_timestamp() {
        let id = generate_compact_id("tpl", 36).expect("generate");
        let parts = id.split('-').collect::<Vec<_>>();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "tpl");
        assert_eq!(parts[1], "10");
        assert_eq!(parts[2].len(), 4);
        validate_identifier_value("template id", &id).expect("generated id is valid");
    }

    #[test]
    fn compact_ids_reject_negative_timestamps() {
        let err = generate_compact_id("tpl", -1).expect_err("negative timestamp");
        assert!(err.contains("non-negative"));
    }

    #[test]
    fn identifier_validation_rejects_whitespace_and_empty_values() {
        assert!(validate_identifier_value("org id", "").is_err());
        assert!(validate_identifier_value("org id", "acme corp").is_err());
        assert!(validate_identifier_value("org id", "acme_corp-1").is_ok());
    }
}
