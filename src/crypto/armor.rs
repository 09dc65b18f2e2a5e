// ABOUTME: ASCII armor for messages, detached signatures and public keys
// ABOUTME: Base64 bodies wrapped at 64 columns between strict BEGIN/END lines

use base64::{engine::general_purpose::STANDARD, Engine};

const LINE_WIDTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmorKind {
    Message,
    Signature,
    PublicKey,
}

impl ArmorKind {
    fn label(self) -> &'static str {
        match self {
            ArmorKind::Message => "ACCOUNT EXPORT MESSAGE",
            ArmorKind::Signature => "ACCOUNT EXPORT SIGNATURE",
            ArmorKind::PublicKey => "ACCOUNT EXPORT PUBLIC KEY",
        }
    }

    fn begin(self) -> String {
        format!("-----BEGIN {}-----", self.label())
    }

    fn end(self) -> String {
        format!("-----END {}-----", self.label())
    }
}

/// Armor `body`. Output always ends with a newline.
pub fn encode(kind: ArmorKind, body: &[u8]) -> String {
    let encoded = STANDARD.encode(body);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 80);
    out.push_str(&kind.begin());
    out.push('\n');
    // base64 output is ASCII, so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&kind.end());
    out.push('\n');
    out
}

/// Strip armor of the expected kind. Any deviation from the format is `None`.
///
/// CRLF line endings are accepted; nothing but whitespace may follow the
/// END line.
pub fn decode(kind: ArmorKind, armored: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(armored).ok()?;
    let mut lines = text.lines();

    let begin = kind.begin();
    if lines.next()? != begin {
        return None;
    }

    let end = kind.end();
    let mut body = String::with_capacity(text.len());
    let mut closed = false;
    for line in lines.by_ref() {
        if line == end {
            closed = true;
            break;
        }
        if line.is_empty() || line.len() > LINE_WIDTH {
            return None;
        }
        body.push_str(line);
    }
    if !closed || lines.any(|rest| !rest.trim().is_empty()) {
        return None;
    }

    STANDARD.decode(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wraps_lines() {
        let armored = encode(ArmorKind::Signature, &[7u8; 100]);
        let lines: Vec<&str> = armored.lines().collect();
        assert_eq!(lines[0], "-----BEGIN ACCOUNT EXPORT SIGNATURE-----");
        assert_eq!(lines.last().copied(), Some("-----END ACCOUNT EXPORT SIGNATURE-----"));
        assert!(lines[1..lines.len() - 1].iter().all(|l| l.len() <= 64));
        assert_eq!(decode(ArmorKind::Signature, armored.as_bytes()).unwrap(), vec![7u8; 100]);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let armored = encode(ArmorKind::Message, b"payload");
        assert!(decode(ArmorKind::Signature, armored.as_bytes()).is_none());
    }

    #[test]
    fn test_crlf_is_accepted() {
        let armored = encode(ArmorKind::Message, b"payload").replace('\n', "\r\n");
        assert_eq!(decode(ArmorKind::Message, armored.as_bytes()).unwrap(), b"payload");
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let mut armored = encode(ArmorKind::Message, b"payload");
        armored.push_str("extra\n");
        assert!(decode(ArmorKind::Message, armored.as_bytes()).is_none());
    }

    #[test]
    fn test_missing_end_is_rejected() {
        let armored = encode(ArmorKind::Message, b"payload");
        let truncated: String = armored.lines().take(2).collect::<Vec<_>>().join("\n");
        assert!(decode(ArmorKind::Message, truncated.as_bytes()).is_none());
    }
}
