//! Distinguished name and filter value helpers (RFC 4514 / RFC 4515).

/// Escape special characters in LDAP filter values (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// Characters that must be escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
    let char_count = value.chars().count();
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == char_count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Reverse RFC 4514 escaping: `\,` style pairs and `\2c` style hex pairs.
#[must_use]
pub fn unescape_dn_value(value: &str) -> String {
    let mut bytes: Vec<u8> = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            let hex = raw
                .get(i + 1..i + 3)
                .filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    bytes.push(byte);
                    i += 3;
                }
                None => {
                    bytes.push(raw[i + 1]);
                    i += 2;
                }
            }
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// The leading relative distinguished name of a DN, split from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadingRdn {
    /// RDN attribute type, e.g. `CN`.
    pub attribute: String,
    /// Unescaped RDN value, e.g. `Doe, John`.
    pub value: String,
    /// Remainder of the DN, e.g. `OU=Users,DC=example,DC=com`.
    pub parent: String,
}

/// Split a DN at its first unescaped comma.
///
/// Returns `None` when the DN has no `attr=value` leading component.
#[must_use]
pub fn split_leading_rdn(dn: &str) -> Option<LeadingRdn> {
    let mut escaped = false;
    let mut split_at = None;

    for (idx, ch) in dn.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }

    let (rdn, parent) = match split_at {
        Some(idx) => (&dn[..idx], dn[idx + 1..].trim_start()),
        None => (dn, ""),
    };

    let (attribute, value) = rdn.split_once('=')?;
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return None;
    }

    Some(LeadingRdn {
        attribute: attribute.to_string(),
        value: unescape_dn_value(value),
        parent: parent.to_string(),
    })
}

/// Check whether `dn` equals `base` or lies beneath it (case-insensitive).
#[must_use]
pub fn is_within(dn: &str, base: &str) -> bool {
    if base.is_empty() {
        return true;
    }
    let dn = dn.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    dn == base || dn.ends_with(&format!(",{base}"))
}
