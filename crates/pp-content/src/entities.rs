//! HTML character-reference decoding.

/// Longest reference name the decoder recognises, e.g. `#x0010FFFF` with
/// leading zeros. Anything longer is left as literal text.
const MAX_ENTITY_LEN: usize = 32;

/// Decodes character references until none are left.
///
/// Uploaded games are frequently escaped more than once by the forms that
/// store them, so `&amp;lt;` must come out as `<`, not `&lt;`. Decoding runs
/// in one pass: every `;` written to the output re-examines the output tail,
/// so a reference produced by an earlier decode is reduced as soon as it is
/// complete. Each `;` looks back at most [`MAX_ENTITY_LEN`] bytes, which keeps
/// the cost linear in the input.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        push_reducing(&mut out, ch);
    }
    out
}

fn push_reducing(out: &mut String, ch: char) {
    let mut pending = Some(ch);
    while let Some(ch) = pending.take() {
        out.push(ch);
        if ch == ';' {
            pending = reduce_tail(out);
        }
    }
}

/// Replaces a reference ending at the trailing `;` with nothing and returns
/// the character it stands for.
fn reduce_tail(out: &mut String) -> Option<char> {
    let bytes = out.as_bytes();
    let semi = bytes.len().checked_sub(1)?;
    let floor = semi.saturating_sub(MAX_ENTITY_LEN + 1);
    let amp = (floor..semi)
        .rev()
        .find_map(|index| match bytes.get(index) {
            Some(b'&') => Some(Some(index)),
            Some(b';') => Some(None),
            _ => None,
        })
        .flatten()?;

    let decoded = decode_entity(out.get(amp + 1..semi)?)?;
    out.truncate(amp);
    Some(decoded)
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" | "AMP" => Some('&'),
        "lt" | "LT" => Some('<'),
        "gt" | "GT" => Some('>'),
        "quot" | "QUOT" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let value = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            match value {
                0 => Some(char::REPLACEMENT_CHARACTER),
                value => Some(char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER)),
            }
        }
    }
}
