/// Nucleotide helpers: reverse complement, ambiguity checks and the
/// reversible UID used to name isomiR sequences.
use anyhow::{bail, Result};

/// Alphabet for UID codes. Index is the base-4 value of a trinucleotide
/// (A=0, C=1, G=2, T=3, first base most significant).
const UID_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz+_";

/// Reverse complement a DNA/RNA sequence. `U` is treated as `T`;
/// unknown characters pass through unchanged.
pub fn reverse_complement(seq: &str) -> String {
    seq.bytes()
        .rev()
        .map(|b| {
            let c = match b.to_ascii_uppercase() {
                b'A' => b'T',
                b'T' | b'U' => b'A',
                b'C' => b'G',
                b'G' => b'C',
                _ => b,
            };
            c as char
        })
        .collect()
}

/// True if the sequence contains an ambiguous base call
pub fn has_ambiguous_base(seq: &str) -> bool {
    seq.bytes().any(|b| b == b'N' || b == b'n')
}

fn base_value(b: u8) -> Option<usize> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// Build the UID for a sequence: `iso-<len>-<code>`.
///
/// Each trinucleotide becomes one character. A trailing partial codon is
/// padded with `A` and followed by the number of padding bases, so the
/// encoding is reversible with [`read_uid`].
pub fn make_id(seq: &str) -> Result<String> {
    let bytes = seq.as_bytes();
    let mut code = String::with_capacity(bytes.len() / 3 + 2);

    for chunk in bytes.chunks(3) {
        let mut value = 0usize;
        for i in 0..3 {
            let v = match chunk.get(i) {
                Some(&b) => match base_value(b) {
                    Some(v) => v,
                    None => bail!("Cannot build UID: invalid base '{}' in {}", b as char, seq),
                },
                None => 0,
            };
            value = value * 4 + v;
        }
        code.push(UID_ALPHABET[value] as char);
        if chunk.len() < 3 {
            code.push_str(&(3 - chunk.len()).to_string());
        }
    }

    Ok(format!("iso-{}-{}", bytes.len(), code))
}

/// Decode a UID produced by [`make_id`] back into its sequence
pub fn read_uid(uid: &str) -> Result<String> {
    let mut parts = uid.splitn(3, '-');
    let (prefix, len, code) = match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(l), Some(c)) => (p, l, c),
        _ => bail!("Malformed UID: {}", uid),
    };
    if prefix != "iso" {
        bail!("Malformed UID (missing iso prefix): {}", uid);
    }
    let len: usize = len
        .parse()
        .map_err(|_| anyhow::anyhow!("Malformed UID length in {}", uid))?;

    let mut seq = String::with_capacity(len + 2);
    for c in code.bytes() {
        if c.is_ascii_digit() && seq.len() >= len {
            continue;
        }
        let value = match UID_ALPHABET.iter().position(|&a| a == c) {
            Some(v) => v,
            None => bail!("Malformed UID character '{}' in {}", c as char, uid),
        };
        seq.push(BASES[value / 16]);
        seq.push(BASES[(value / 4) % 4]);
        seq.push(BASES[value % 4]);
    }

    if seq.len() < len {
        bail!("UID {} decodes to fewer than {} bases", uid, len);
    }
    seq.truncate(len);
    Ok(seq)
}
