//! Input validation and sanitization functions for panelguard
//!
//! Everything that ends up in the state document or on a command line passes
//! through here first.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Maximum stored length of free-text fields (reason, target, actor, action)
pub const MAX_TEXT_LEN: usize = 128;

/// Sanitizes free text for storage and display.
///
/// Removes control characters (newlines, escapes) so entries cannot forge
/// extra lines in terminal or log output, trims surrounding whitespace and
/// caps the length at `max_chars` characters.
///
/// # Examples
///
/// ```
/// use panelguard::validators::sanitize_text;
///
/// assert_eq!(sanitize_text("  SSH brute force  ", 64), "SSH brute force");
/// assert_eq!(sanitize_text("a\nb\x1b[31m", 64), "ab[31m");
/// ```
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Validates a rule source as an IP address or CIDR network.
///
/// Returns the canonical textual form (`10.0.0.1`, `2001:db8::/32`).
///
/// # Errors
///
/// Returns `Err` if the input is empty or not an address/network.
pub fn validate_source_ip(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Source address cannot be empty".to_string());
    }

    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }

    trimmed
        .parse::<IpNetwork>()
        .map(|net| net.to_string())
        .map_err(|_| format!("'{trimmed}' is not a valid IP address or CIDR network"))
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        return Err(format!("Invalid range: {start} > {end}"));
    }

    Ok((start, end))
}

/// Validates a configured port entry: `"22"` or `"8000-9000"`.
///
/// Returns the entry without surrounding whitespace so that `" 22"` is stored
/// (and scored) as `"22"`.
///
/// # Errors
///
/// Returns `Err` if the entry is not a decimal port or a valid range.
pub fn validate_port_spec(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    let parse = |s: &str| {
        s.trim()
            .parse::<u16>()
            .map_err(|_| format!("'{s}' is not a port number (1-65535)"))
    };

    if let Some((start, end)) = trimmed.split_once('-') {
        let (start, end) = validate_port_range(parse(start)?, parse(end)?)?;
        Ok(format!("{start}-{end}"))
    } else {
        let port = validate_port(parse(trimmed)?)?;
        Ok(port.to_string())
    }
}
