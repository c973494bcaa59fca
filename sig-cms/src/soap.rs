//! SOAP envelope construction and parsing for XMDS calls.
//!
//! Same "locate `Body`, unwrap the single action element, give the caller
//! its inner XML" approach as any hand-rolled SOAP action invoker, just not
//! namespace-prefix-sensitive since XMDS servers are inconsistent about
//! SOAP namespace prefixes in the wild.

use crate::error::{Error, Result};

const ENVELOPE_OPEN: &str = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><SOAP-ENV:Body>"#;
const ENVELOPE_CLOSE: &str = "</SOAP-ENV:Body></SOAP-ENV:Envelope>";

/// Builds a SOAP request body for one XMDS `action`, with `args` written as
/// flat child elements in call order (XMDS actions take positional simple
/// arguments, unlike UPnP's named-arg `ActionResponse`).
pub fn build_soap_request(action: &str, args: &[(&str, &str)]) -> String {
    let mut body = String::new();
    body.push_str(ENVELOPE_OPEN);
    body.push_str(&format!("<{action} xmlns=\"urn:xmds\">"));
    for (name, value) in args {
        body.push_str(&format!("<{name}>{}</{name}>", escape_xml(value)));
    }
    body.push_str(&format!("</{action}>"));
    body.push_str(ENVELOPE_CLOSE);
    body
}

/// Result of unwrapping a SOAP envelope: the action-response tag name and
/// its raw inner XML, left for the caller to parse with whatever typed
/// shape that operation needs (mirrors the `<options>` raw-capture trick in
/// `sig_types::xlf`).
pub struct SoapResponse {
    pub action: String,
    pub inner_xml: String,
}

/// Parses a SOAP response, unwrapping `Envelope`/`Body` regardless of
/// namespace prefix and surfacing `Fault` elements as [`Error::SoapFault`].
pub fn parse_soap_response(xml: &str) -> Result<SoapResponse> {
    let body_inner = extract_tagged(xml, "Body").ok_or_else(|| {
        Error::Protocol("SOAP response has no Body element".to_string())
    })?;

    if let Some(fault_inner) = extract_tagged(body_inner, "Fault") {
        let message = extract_tagged(fault_inner, "faultstring")
            .unwrap_or("unknown SOAP fault")
            .trim()
            .to_string();
        return Err(Error::SoapFault(message));
    }

    let (action, inner_xml) = extract_first_element(body_inner)
        .ok_or_else(|| Error::Protocol("SOAP Body has no action element".to_string()))?;

    Ok(SoapResponse {
        action,
        inner_xml: inner_xml.to_string(),
    })
}

/// Finds the first element anywhere in `xml` whose local name (ignoring any
/// `ns:` prefix) is `tag`, and returns its inner content.
fn extract_tagged<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let mut rest = xml;
    loop {
        let open = rest.find('<')?;
        let after = &rest[open + 1..];
        let tag_end = after.find(['>', ' '])?;
        let candidate = &after[..tag_end];
        let local = candidate.rsplit(':').next().unwrap_or(candidate);
        if local == tag && !candidate.starts_with('/') {
            let gt = after.find('>')?;
            let body_start = &after[gt + 1..];
            let close_tag = format!("</{candidate}>");
            let close_idx = body_start.find(&close_tag)?;
            return Some(&body_start[..close_idx]);
        }
        rest = &after[tag_end..];
    }
}

/// Returns `(local_tag_name, inner_content)` of the first child element in
/// `xml`, skipping leading whitespace/text nodes.
fn extract_first_element(xml: &str) -> Option<(String, &str)> {
    let open = xml.find('<')?;
    let after = &xml[open + 1..];
    let tag_end = after.find(['>', ' ', '/'])?;
    let candidate = &after[..tag_end];
    let local = candidate.rsplit(':').next().unwrap_or(candidate).to_string();
    let gt = after.find('>')?;
    if after.as_bytes()[gt - 1] == b'/' {
        return Some((local, ""));
    }
    let body_start = &after[gt + 1..];
    let close_tag = format!("</{candidate}>");
    let close_idx = body_start.find(&close_tag)?;
    Some((local, &body_start[..close_idx]))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_with_positional_args() {
        let xml = build_soap_request(
            "RegisterDisplay",
            &[("hardwareKey", "abc"), ("clientType", "linux")],
        );
        assert!(xml.contains("<hardwareKey>abc</hardwareKey>"));
        assert!(xml.contains("<clientType>linux</clientType>"));
        assert!(xml.contains("<RegisterDisplay"));
    }

    #[test]
    fn parses_response_action_and_inner_xml() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
            <SOAP-ENV:Body>
                <RegisterDisplayResponse><status>ready</status></RegisterDisplayResponse>
            </SOAP-ENV:Body>
        </SOAP-ENV:Envelope>"#;
        let resp = parse_soap_response(xml).unwrap();
        assert_eq!(resp.action, "RegisterDisplayResponse");
        assert!(resp.inner_xml.contains("<status>ready</status>"));
    }

    #[test]
    fn surfaces_soap_fault() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
            <SOAP-ENV:Body>
                <SOAP-ENV:Fault><faultstring>bad hardware key</faultstring></SOAP-ENV:Fault>
            </SOAP-ENV:Body>
        </SOAP-ENV:Envelope>"#;
        let err = parse_soap_response(xml).unwrap_err();
        assert!(matches!(err, Error::SoapFault(msg) if msg == "bad hardware key"));
    }
}
