// src/api/webhooks.rs
//
// Checkout webhook from the payment provider. The raw body is
// HMAC-SHA256-signed with the shared webhook key; payloads arrive as JSON or
// form-encoded depending on provider config, and field names vary between
// their API versions, so parsing and normalization are separate pure steps
// (and unit-testable without a server).

use actix_web::{post, web, HttpRequest, HttpResponse};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::affiliates::{self, ConversionOutcome};
use crate::AppState;

pub fn sign_hmac_sha256_hex(secret: &str, data: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    // Constant-time comparison of the MAC bytes.
    mac.verify_slice(&provided).is_ok()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Accepts JSON or `application/x-www-form-urlencoded` bodies. Form values
/// are percent-decoded; pairs without `=` are skipped, not treated as a
/// parse failure.
pub fn parse_webhook_body(body: &[u8]) -> Option<Value> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return Some(value);
    }

    let text = std::str::from_utf8(body).ok()?;
    let mut map = serde_json::Map::new();
    for pair in text.split('&') {
        let Some((k, v)) = pair.split_once('=') else {
            continue;
        };
        map.insert(percent_decode(k), Value::String(percent_decode(v)));
    }
    Some(Value::Object(map))
}

#[derive(Debug, Default, PartialEq)]
pub struct CheckoutEvent {
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub amount_cents: Option<i64>,
    pub referral_code: Option<String>,
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(k).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

/// Flattens the provider's payload variants into one event shape.
pub fn normalize_payload(value: &Value) -> CheckoutEvent {
    let amount_cents = ["amountCents", "amount_cents"]
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

    CheckoutEvent {
        order_id: first_str(value, &["orderId", "order_id", "contractId"]),
        status: first_str(value, &["status"]),
        amount_cents,
        referral_code: first_str(value, &["referralCode", "referral_code", "code"]),
    }
}

pub fn is_succeeded(event: &CheckoutEvent) -> bool {
    matches!(
        event.status.as_deref(),
        Some("succeeded") | Some("success") | Some("paid") | Some("completed")
    )
}

#[post("/checkout")]
pub async fn checkout_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let signature = req
        .headers()
        .get("X-Webhook-Signature")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if !verify_signature(&state.checkout_webhook_key, &body, signature) {
        return HttpResponse::Unauthorized().json(json!({"error": "invalid signature"}));
    }

    let Some(payload) = parse_webhook_body(&body) else {
        return HttpResponse::BadRequest().json(json!({"error": "unparseable payload"}));
    };

    let event = normalize_payload(&payload);

    if !is_succeeded(&event) {
        // Failed or unknown status: acknowledge so the provider stops retrying.
        return HttpResponse::Ok().json(json!({"ok": true, "ignored": true}));
    }

    let (Some(order_id), Some(code), Some(amount_cents)) =
        (event.order_id, event.referral_code, event.amount_cents)
    else {
        // Paid order without attribution data; nothing to accrue.
        return HttpResponse::Ok().json(json!({"ok": true, "ignored": true}));
    };

    match affiliates::record_conversion(&state.pool, &order_id, &code, amount_cents).await {
        Ok(ConversionOutcome::Accrued { commission_cents }) => {
            log::info!("conversion accrued order_id={order_id} commission_cents={commission_cents}");
            HttpResponse::Ok().json(json!({"ok": true}))
        }
        Ok(ConversionOutcome::AlreadyRecorded) => {
            HttpResponse::Ok().json(json!({"ok": true, "idempotent": true}))
        }
        Ok(ConversionOutcome::NoAttribution) => {
            // Unknown code: acknowledged, not an error the provider can fix.
            HttpResponse::Ok().json(json!({"ok": true, "ignored": true}))
        }
        Err(e) => {
            log::error!("record_conversion error order_id={order_id}: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"orderId":"abc"}"#;
        let sig = sign_hmac_sha256_hex("secret", body);
        assert!(verify_signature("secret", body, &sig));
        assert!(verify_signature("secret", body, &sig.to_uppercase()));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("secret", b"tampered", &sig));
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let body = br#"{"orderId":"abc"}"#;
        let sig = sign_hmac_sha256_hex("secret", body);
        assert!(!verify_signature("secret", body, &sig[..32]));
        assert!(!verify_signature("secret", body, &sig[..63]));
        assert!(!verify_signature("secret", body, "not-hex-at-all"));
        assert!(!verify_signature("secret", body, ""));
    }

    #[test]
    fn form_values_are_percent_decoded() {
        let body = b"order_id=ab%2Fcd&status=paid&amount_cents=1200&code=ff00aa11&note=two+words";
        let raw = parse_webhook_body(body).expect("parse form");
        let event = normalize_payload(&raw);
        assert_eq!(event.order_id.as_deref(), Some("ab/cd"));
        assert_eq!(event.amount_cents, Some(1200));
        assert_eq!(raw["note"], json!("two words"));
    }

    #[test]
    fn bare_form_keys_do_not_abort_the_parse() {
        let body = b"livemode&order_id=abc&status=paid&amount_cents=500&code=ff00aa11";
        let raw = parse_webhook_body(body).expect("parse form");
        let event = normalize_payload(&raw);
        assert_eq!(event.order_id.as_deref(), Some("abc"));
        assert_eq!(event.amount_cents, Some(500));
        assert!(is_succeeded(&event));
    }

    #[test]
    fn normalizes_json_payload_aliases() {
        let raw = json!({
            "contractId": "7ea82675",
            "status": "completed",
            "amountCents": 5000,
            "referralCode": "ab12cd34"
        });
        let event = normalize_payload(&raw);
        assert_eq!(event.order_id.as_deref(), Some("7ea82675"));
        assert_eq!(event.amount_cents, Some(5000));
        assert_eq!(event.referral_code.as_deref(), Some("ab12cd34"));
        assert!(is_succeeded(&event));
    }

    #[test]
    fn parses_form_encoded_body() {
        let body = b"order_id=abc&status=paid&amount_cents=1200&code=ff00aa11";
        let raw = parse_webhook_body(body).expect("parse form");
        let event = normalize_payload(&raw);
        assert_eq!(event.order_id.as_deref(), Some("abc"));
        assert_eq!(event.amount_cents, Some(1200));
        assert_eq!(event.referral_code.as_deref(), Some("ff00aa11"));
        assert!(is_succeeded(&event));
    }

    #[test]
    fn failed_status_is_not_succeeded() {
        for status in ["failed", "canceled", "pending"] {
            let event = normalize_payload(&json!({"orderId": "x", "status": status}));
            assert!(!is_succeeded(&event), "{status} treated as success");
        }
    }
}
