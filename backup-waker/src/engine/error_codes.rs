//! Engine error codes and their messages.
//!
//! Engine failures carry a 32-bit result code; only the low 16 bits identify
//! the condition.

/// Message for a known engine error code.
pub fn describe(code: u32) -> Option<&'static str> {
    let message = match code & 0xFFFF {
        // configuration manager
        0x0300 => "Corrupt configuration file",
        0x0301 => "Configuration file not found",
        0x0302 => "Configuration file already exists",
        0x0303 => "Configuration file not loaded",
        0x0304 => "Target is not connected",
        0x0305 => "Configuration already loaded",
        0x0306 => "Target verification failed",
        0x0307 => "Target not configured",
        0x0308 => "Target lacks sufficient free space",
        0x0309 => "Target not usable for backups",
        0x030A => "Rehydration not possible in currently configured state",
        0x0310 => "Changing target recommendation is not allowed",
        0x0311 => "Target was rehydrated on another computer",
        0x0312 => "Legacy backup target not supported",
        0x0313 => "Legacy backup target validation result is not supported",
        0x0314 => "Legacy backup user was fully excluded from backups",
        0x0315 => "Legacy backup not found",

        // backup service
        0x0600 => "Backups are blocked for the given configuration",
        0x0601 => "Backups are not configured for the user",
        0x0602 => "Specified configuration is disabled by the user",
        0x0603 => "Specified configuration is disabled by Group Policy",
        0x0604 => "Fatal configuration error, backup cannot be started",
        0x0605 => "Specified configuration is undergoing rehydration",
        _ => return None,
    };
    Some(message)
}

/// First `0x`-prefixed hex token in `text`, if any.
pub fn extract_code(text: &str) -> Option<u32> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | ':'))
        .filter_map(|token| token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")))
        .find_map(|hex| u32::from_str_radix(hex, 16).ok())
}

/// Message for a failure: the table entry if the code is known, else the
/// fallback text.
pub fn message_for(code: Option<u32>, fallback: &str) -> String {
    code.and_then(describe)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
