use orgwarden_core::DomainError;

/// Trimmed, non-empty, at most `max` characters.
pub(crate) fn required_text(
    field: &str,
    value: &str,
    max: usize,
    errors: &mut Vec<DomainError>,
) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.push(DomainError::validation(field, "must not be empty"));
    } else if value.chars().count() > max {
        errors.push(DomainError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    value.to_string()
}

/// Trimmed, possibly empty, at most `max` characters.
pub(crate) fn optional_text(
    field: &str,
    value: &str,
    max: usize,
    errors: &mut Vec<DomainError>,
) -> String {
    let value = value.trim();
    if value.chars().count() > max {
        errors.push(DomainError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    value.to_string()
}
