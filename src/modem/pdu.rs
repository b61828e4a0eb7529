//! Payload codecs for the cellular messaging encodings the modem speaks:
//! the GSM 03.38 7-bit packed alphabet (USSD requests and replies) and
//! UCS-2 (non-Latin message bodies), plus the hex framing both travel in.

/// GSM 03.38 basic character set, indexed by septet value.
const GSM_BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', 'Δ', '_',
    'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1b}', 'Æ', 'æ', 'ß', 'É', ' ', '!', '"',
    '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', '0', '1', '2', '3', '4',
    '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', '¡', 'A', 'B', 'C', 'D', 'E', 'F',
    'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j',
    'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö',
    'ñ', 'ü', 'à',
];

/// Escape septet introducing the extension table.
const ESCAPE: u8 = 0x1b;

/// Carriage return, the padding septet when packing leaves seven spare bits.
const CR: u8 = 0x0d;

/// GSM 03.38 extension table, reached through [`ESCAPE`].
const GSM_EXTENSION: [(u8, char); 9] = [
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2f, '\\'),
    (0x3c, '['),
    (0x3d, '~'),
    (0x3e, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

/// Encode text into the packed 7-bit representation: each character becomes a
/// septet (two for extension-table characters), and septets are packed
/// little-endian, seven bits per character. Characters outside the alphabet
/// are substituted with `?` rather than failing.
pub fn encode_7bit(text: &str) -> Vec<u8> {
    let mut septets = Vec::with_capacity(text.len());
    for ch in text.chars() {
        if let Some(idx) = GSM_BASIC.iter().position(|&c| c == ch) {
            if idx as u8 != ESCAPE {
                septets.push(idx as u8);
                continue;
            }
        }
        if let Some(&(code, _)) = GSM_EXTENSION.iter().find(|&&(_, c)| c == ch) {
            septets.push(ESCAPE);
            septets.push(code);
        } else {
            septets.push(0x3f);
        }
    }
    pack_septets(&septets)
}

/// Decode packed 7-bit data back into text.
pub fn decode_7bit(data: &[u8]) -> String {
    let mut septets = unpack_septets(data);
    // An exact multiple of seven octets yields one septet more than the
    // encoder was given, so the last septet there is padding: CR per the
    // alphabet's convention, zero from legacy encoders.
    if !data.is_empty() && data.len() % 7 == 0 {
        if let Some(&last) = septets.last() {
            if last == CR || last == 0 {
                septets.pop();
            }
        }
    }
    let mut out = String::new();
    let mut escaped = false;
    for septet in septets {
        if escaped {
            escaped = false;
            let ch = GSM_EXTENSION
                .iter()
                .find(|&&(code, _)| code == septet)
                .map(|&(_, c)| c)
                .unwrap_or(' ');
            out.push(ch);
        } else if septet == ESCAPE {
            escaped = true;
        } else {
            out.push(GSM_BASIC[septet as usize]);
        }
    }
    out
}

fn pack_septets(septets: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(septets.len() * 7 / 8 + 1);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &septet in septets {
        acc |= u32::from(septet) << bits;
        bits += 7;
        while bits >= 8 {
            out.push((acc & 0xff) as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        if bits == 1 {
            // Seven spare bits in the final octet; pad with CR so the
            // decoder can tell padding from a real trailing '@'.
            acc |= u32::from(CR) << 1;
        }
        out.push((acc & 0xff) as u8);
    }
    out
}

fn unpack_septets(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 8 / 7);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        acc |= u32::from(byte) << bits;
        bits += 8;
        while bits >= 7 {
            out.push((acc & 0x7f) as u8);
            acc >>= 7;
            bits -= 7;
        }
    }
    out
}

/// Decode a buffer of 16-bit big-endian code units. Returns `None` for odd
/// lengths or invalid surrogate sequences.
pub fn decode_ucs2(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Render bytes as the uppercase hex string the wire dialect expects.
pub fn hex_upper(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Decode a hex string (either case) into bytes.
pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if !text.is_ascii() || text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}
