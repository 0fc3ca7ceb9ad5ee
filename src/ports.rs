use std::collections::BTreeSet;

use crate::error::PortSpecError;

/// Port specification used when the caller does not provide one.
pub const DEFAULT_PORT_SPEC: &str = "1-65535";

/// Parse a port specification into a sorted, deduplicated list of TCP ports (1..=65535).
///
/// Grammar: `item (',' item)*` where `item` is either a single port (`80`) or an
/// inclusive range (`8000-8010`). Whitespace around items and range bounds is ignored.
/// A range whose start is greater than its end is rejected, not swapped.
pub fn parse_port_spec(s: &str) -> Result<Vec<u16>, PortSpecError> {
    let mut ports = BTreeSet::new();

    for raw in s.split(',') {
        let token = raw.trim();

        if let Some((a, b)) = token.split_once('-') {
            let start = parse_port_str(token, a.trim())?;
            let end = parse_port_str(token, b.trim())?;
            if start > end {
                return Err(PortSpecError::invalid(
                    token,
                    format!("range start {start} is greater than end {end}"),
                ));
            }
            ports.extend(start..=end);
            continue;
        }

        ports.insert(parse_port_str(token, token)?);
    }

    Ok(ports.into_iter().collect())
}

/// Every TCP port, `1..=65535`.
pub fn full_range() -> Vec<u16> {
    (1..=u16::MAX).collect()
}

fn parse_port_str(token: &str, s: &str) -> Result<u16, PortSpecError> {
    let val: u32 = s
        .parse::<u32>()
        .map_err(|e| PortSpecError::invalid(token, format!("`{s}` is not a port number: {e}")))?;
    if val == 0 || val > 65535 {
        return Err(PortSpecError::invalid(token, format!("port out of range: {val}")));
    }
    Ok(val as u16)
}
