//! Response-line classification and the switch config grammar.

use pedal_link_core::SwitchAction;

/// Identity string the device reports in response to [`INFO_COMMAND`].
pub const DEVICE_SIGNATURE: &str = "foot_switch_pro-v1.0";

/// Handshake query command.
pub const INFO_COMMAND: &str = "INFO";

/// A recognized device response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Identity-verification response carrying the signature.
    Identity(String),
    /// `SWITCH <n>: <cfg>` - a switch reported its action.
    SwitchConfig {
        /// Switch number.
        switch: u32,
        /// Decoded action.
        action: SwitchAction,
    },
    /// `BANK <n>: <name>` - a bank reported its name.
    BankName {
        /// Bank index.
        index: u32,
        /// Display name, rest of the line.
        name: String,
    },
}

/// Classify one complete, trimmed line.
///
/// Fixed literal/prefix matching, first match wins. Unrecognized lines
/// return `None` so unknown device output passes through silently.
#[must_use]
pub fn parse_line(line: &str) -> Option<Response> {
    if line == DEVICE_SIGNATURE {
        return Some(Response::Identity(line.to_string()));
    }
    if let Some(rest) = line.strip_prefix("SWITCH ") {
        return parse_switch_line(rest);
    }
    if let Some(rest) = line.strip_prefix("BANK ") {
        return parse_bank_line(rest);
    }
    None
}

fn parse_switch_line(rest: &str) -> Option<Response> {
    let (number, cfg) = rest.split_once(':')?;
    let switch: u32 = number.trim().parse().ok()?;
    let cfg = cfg.trim();
    if cfg.is_empty() {
        return None;
    }
    Some(Response::SwitchConfig {
        switch,
        action: parse_switch_action(cfg),
    })
}

fn parse_bank_line(rest: &str) -> Option<Response> {
    let (number, name) = rest.split_once(':')?;
    let index: u32 = number.trim().parse().ok()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Response::BankName {
        index,
        name: name.to_string(),
    })
}

/// Decode the `<cfg>` value of a `SWITCH` line.
///
/// Longest meaningful prefix first; exact `NONE`, unrecognized configs
/// and unparsable integers all fall back to [`SwitchAction::None`]
/// (protocol tolerance over strictness). Malformed integers only emit a
/// debug-level diagnostic.
#[must_use]
pub fn parse_switch_action(cfg: &str) -> SwitchAction {
    if let Some(rest) = cfg.strip_prefix("NOTE ") {
        return match rest.trim().parse::<u8>() {
            Ok(value) => SwitchAction::Note { value },
            Err(_) => {
                tracing::debug!(config = cfg, "unparsable NOTE value");
                SwitchAction::None
            }
        };
    }
    if let Some(rest) = cfg.strip_prefix("CC ") {
        let mut parts = rest.split_whitespace();
        let number = parts.next().and_then(|p| p.parse::<u8>().ok());
        let value = parts.next().and_then(|p| p.parse::<u8>().ok());
        return match (number, value) {
            (Some(number), Some(value)) => SwitchAction::ControlChange { number, value },
            _ => {
                tracing::debug!(config = cfg, "unparsable CC values");
                SwitchAction::None
            }
        };
    }
    if let Some(label) = cfg.strip_prefix("KEY ") {
        return SwitchAction::Key {
            label: label.to_string(),
        };
    }
    if let Some(rest) = cfg.strip_prefix("BANK_SEL ") {
        return match rest.trim().parse::<u32>() {
            Ok(bank) => SwitchAction::BankSelect { bank },
            Err(_) => {
                tracing::debug!(config = cfg, "unparsable BANK_SEL index");
                SwitchAction::None
            }
        };
    }
    match cfg {
        "BANK_NEXT" => SwitchAction::BankNext,
        "BANK_PREV" => SwitchAction::BankPrevious,
        _ => SwitchAction::None,
    }
}
