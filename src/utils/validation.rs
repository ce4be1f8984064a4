use crate::utils::error::{BackupError, Result};
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> BackupError {
    BackupError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        // secrets pass through here too, so never echo the value
        return Err(invalid(
            field_name,
            "",
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// Azure container names: 3-63 chars of lowercase letters, digits and single
/// hyphens, starting and ending with a letter or digit.
pub fn validate_azure_container_name(field_name: &str, name: &str) -> Result<()> {
    static CONTAINER_NAME: OnceLock<Regex> = OnceLock::new();
    let re = CONTAINER_NAME.get_or_init(|| {
        Regex::new(r"^[a-z0-9](?:[a-z0-9]|-[a-z0-9])*$").expect("static regex is valid")
    });

    if name.len() < 3 || name.len() > 63 {
        return Err(invalid(
            field_name,
            name,
            "Container name must be between 3 and 63 characters",
        ));
    }
    if !re.is_match(name) {
        return Err(invalid(
            field_name,
            name,
            "Container name can only contain lowercase letters, numbers and single hyphens",
        ));
    }
    Ok(())
}

/// The archive filename is rendered with strftime, so an unknown `%` specifier
/// would only surface when the run is already writing. Reject it up front.
pub fn validate_filename_template(field_name: &str, template: &str) -> Result<()> {
    validate_non_empty_string(field_name, template)?;

    if template.contains('/') || template.contains('\\') {
        return Err(invalid(
            field_name,
            template,
            "Filename cannot contain path separators, use --output.prefix instead",
        ));
    }

    if StrftimeItems::new(template).any(|item| matches!(item, Item::Error)) {
        return Err(invalid(
            field_name,
            template,
            "Filename template contains an invalid strftime specifier",
        ));
    }

    Ok(())
}
