//! Property Normalizer (C5): converts heterogeneous BACnet values into
//! the uniform `{value, type}` shape `NormalizedValue`.
//!
//! Two deliberate choices worth calling out:
//! - `align-intervals`, `daylight-savings-status`, and
//!   `protocol-services-supported` assign their computed boolean rather
//!   than merely comparing it, so the result is actually used.
//! - `object-list`, `protocol-object-types-supported`, and
//!   `protocol-services-supported` store the sorted list itself rather
//!   than discarding a sort's result.

use crate::domain::value_objects::{BacnetValue, NormalizedValue};
use serde_json::json;
use tracing::warn;

/// Normalize one property's raw value. Never fails outwardly: any
/// internal error is logged and folded into the `"not-supported"`
/// sentinel, including around the recipient-list and COV-subscription
/// branches where the raw encoding is most likely to be malformed.
pub fn normalize_property(property: &str, value: &BacnetValue) -> NormalizedValue {
    let result = match property {
        "object-list" => normalize_string_list(value, true),
        "protocol-object-types-supported" => normalize_semicolon_list(value),
        "protocol-services-supported" => normalize_semicolon_list(value),
        "restart-notification-recipients"
        | "utc-time-synchronization-recipients"
        | "time-synchronization-recipients" => normalize_recipients(property, value),
        "time-of-device-restart" | "last-restore-time" => normalize_date_time(value),
        "device-uuid" => normalize_uuid(value),
        "align-intervals" | "daylight-savings-status" => normalize_boolean_coded(value),
        "active-cov-subscriptions" => normalize_cov_subscriptions(value),
        _ => Ok(NormalizedValue::new(json!(display(value)), "string")),
    };

    result.unwrap_or_else(|property| {
        warn!(property = %property, "normalization failed, using not-supported sentinel");
        NormalizedValue::not_supported()
    })
}

fn as_list(value: &BacnetValue) -> Option<&[BacnetValue]> {
    match value {
        BacnetValue::List(items) => Some(items),
        _ => None,
    }
}

fn display(value: &BacnetValue) -> String {
    match value {
        BacnetValue::Boolean(b) => b.to_string(),
        BacnetValue::Unsigned(u) => u.to_string(),
        BacnetValue::Integer(i) => i.to_string(),
        BacnetValue::Real(r) => r.to_string(),
        BacnetValue::Double(d) => d.to_string(),
        BacnetValue::CharacterString(s) => s.clone(),
        BacnetValue::Enumerated(s) => s.clone(),
        BacnetValue::ObjectIdentifier(id) => id.to_string(),
        BacnetValue::OctetString(bytes) => hex::encode(bytes),
        BacnetValue::BitString(bits) => bits.iter().map(|b| if *b { '1' } else { '0' }).collect(),
        BacnetValue::Date(s) | BacnetValue::Time(s) => s.clone(),
        BacnetValue::List(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        BacnetValue::Null => String::new(),
    }
}

fn normalize_string_list(value: &BacnetValue, sort: bool) -> Result<NormalizedValue, &'static str> {
    let items = as_list(value).ok_or("expected a list")?;
    let mut strings: Vec<String> = items.iter().map(display).collect();
    if sort {
        strings.sort();
    }
    Ok(NormalizedValue::new(json!(strings), "list"))
}

fn normalize_semicolon_list(value: &BacnetValue) -> Result<NormalizedValue, &'static str> {
    let raw = display(value);
    let mut tokens: Vec<&str> = raw.split(';').filter(|t| !t.is_empty()).collect();
    tokens.sort_unstable();
    Ok(NormalizedValue::new(json!(tokens), "list"))
}

/// `oct2Address`: decode a BACnet MAC-address octet string into the
/// `"a.b.c.d:port"` / decimal / verbatim forms by octet length.
pub fn decode_mac_address(octets: &[u8]) -> Option<String> {
    match octets.len() {
        0 | 1 => None,
        2 => Some(octets[1].to_string()),
        7 => {
            let port = ((octets[5] as u16) << 8) | octets[6] as u16;
            Some(format!(
                "{}.{}.{}.{}:{}",
                octets[1], octets[2], octets[3], octets[4], port
            ))
        }
        _ => Some(hex::encode(octets)),
    }
}

/// Decode a device UUID octet string: render each octet's decimal value
/// and concatenate them in order.
pub fn decode_uuid(octets: &[u8]) -> String {
    octets.iter().map(|b| b.to_string()).collect()
}

fn recipient_address(value: &BacnetValue) -> Option<String> {
    match value {
        BacnetValue::OctetString(bytes) => decode_mac_address(bytes),
        other => Some(display(other)),
    }
}

fn normalize_recipients(property: &str, value: &BacnetValue) -> Result<NormalizedValue, &'static str> {
    let items = as_list(value).ok_or("expected a list of recipients")?;
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let pair = as_list(item).ok_or("expected (device, address) pair")?;
        let (device, address) = match pair {
            [device, address] => (display(device), recipient_address(address)),
            _ => return Err("malformed recipient entry"),
        };
        let address = address.ok_or_else(|| {
            warn!(%property, "recipient address could not be decoded");
            "address decode failed"
        })?;
        entries.push(json!({ "device": device, "address": address }));
    }
    Ok(NormalizedValue::new(json!(entries), "list"))
}

fn normalize_date_time(value: &BacnetValue) -> Result<NormalizedValue, &'static str> {
    let items = as_list(value).ok_or("expected [date, time]")?;
    match items {
        [BacnetValue::Date(date), BacnetValue::Time(time)] => {
            Ok(NormalizedValue::new(json!(format!("{date} {time}")), "string"))
        }
        _ => Err("malformed date/time pair"),
    }
}

fn normalize_uuid(value: &BacnetValue) -> Result<NormalizedValue, &'static str> {
    match value {
        BacnetValue::OctetString(bytes) => {
            Ok(NormalizedValue::new(json!(decode_uuid(bytes)), "uuid"))
        }
        _ => Err("device-uuid is not an octet string"),
    }
}

/// Normalizes to an explicit boolean rather than passing the raw value
/// through, so callers never see anything but `true`/`false` here.
fn normalize_boolean_coded(value: &BacnetValue) -> Result<NormalizedValue, &'static str> {
    let truthy = match value {
        BacnetValue::Boolean(b) => *b,
        BacnetValue::Unsigned(u) => *u != 0,
        BacnetValue::Integer(i) => *i != 0,
        BacnetValue::Enumerated(s) => matches!(s.as_str(), "active" | "true" | "True"),
        _ => return Err("unrecognized boolean-coded value"),
    };
    Ok(NormalizedValue::new(json!(truthy), "boolean"))
}

fn normalize_cov_subscriptions(value: &BacnetValue) -> Result<NormalizedValue, &'static str> {
    let items = as_list(value).ok_or("expected a list of subscriptions")?;
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let fields = as_list(item).ok_or("malformed subscription entry")?;
        let (device, property_reference, time_remaining, cov_increment) = match fields {
            [device, property_reference, time_remaining, cov_increment] => (
                recipient_address(device).ok_or("subscription device address decode failed")?,
                display(property_reference),
                display(time_remaining),
                display(cov_increment),
            ),
            _ => return Err("malformed subscription entry"),
        };
        entries.push(json!({
            "device": device,
            "propertyReference": property_reference,
            "timeRemaining": time_remaining,
            "covIncrement": cov_increment,
        }));
    }
    Ok(NormalizedValue::new(json!(entries), "list"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PointObjectId;

    #[test]
    fn object_list_is_sorted_and_stringified() {
        let value = BacnetValue::List(vec![
            BacnetValue::ObjectIdentifier(PointObjectId::new("analog-input", 2)),
            BacnetValue::ObjectIdentifier(PointObjectId::new("analog-input", 1)),
        ]);
        let normalized = normalize_property("object-list", &value);
        assert_eq!(
            normalized.value,
            json!(["analog-input,1", "analog-input,2"])
        );
    }

    #[test]
    fn protocol_services_supported_splits_and_sorts() {
        let value = BacnetValue::CharacterString("read-property;who-is;i-am".into());
        let normalized = normalize_property("protocol-services-supported", &value);
        assert_eq!(normalized.value, json!(["i-am", "read-property", "who-is"]));
    }

    #[test]
    fn seven_octet_mac_decodes_to_ip_and_port() {
        let octets = [0u8, 192, 0, 2, 10, 0xBA, 0xC0];
        assert_eq!(
            decode_mac_address(&octets),
            Some("192.0.2.10:47808".to_string())
        );
    }

    #[test]
    fn two_octet_mac_decodes_to_decimal() {
        assert_eq!(decode_mac_address(&[0, 42]), Some("42".to_string()));
    }

    #[test]
    fn short_mac_decodes_to_none() {
        assert_eq!(decode_mac_address(&[]), None);
        assert_eq!(decode_mac_address(&[1]), None);
    }

    #[test]
    fn unrecognized_property_falls_back_to_string() {
        let normalized = normalize_property("vendor-name", &BacnetValue::CharacterString("Acme".into()));
        assert_eq!(normalized.value, json!("Acme"));
        assert_eq!(normalized.kind, "string");
    }

    #[test]
    fn malformed_recipient_list_yields_not_supported() {
        let value = BacnetValue::List(vec![BacnetValue::Null]);
        let normalized = normalize_property("restart-notification-recipients", &value);
        assert_eq!(normalized.kind, "not-supported");
    }
}
